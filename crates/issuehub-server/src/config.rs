use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub upload_dir: PathBuf,
    pub admin: Option<AdminBootstrap>,
    pub payment_api_base: String,
    pub payment_secret_key: String,
    pub payment_timeout: Duration,
    pub client_url: String,
    pub boost_price: i64,
    pub premium_price: i64,
    pub currency: String,
}

/// Admin account created on first start when both email and password are set.
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any `ISSUEHUB_*` key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| {
            lookup(&format!("ISSUEHUB_{}", name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let jwt_secret = var("JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("ISSUEHUB_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let admin = match (var("ADMIN_EMAIL"), var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminBootstrap {
                name: or("ADMIN_NAME", "Administrator"),
                email: email.to_lowercase(),
                password,
            }),
            _ => None,
        };

        Ok(Self {
            host: or("HOST", "0.0.0.0"),
            port: parse(&or("PORT", "3000"), "PORT")?,
            db_path: or("DB_PATH", "issuehub.db").into(),
            jwt_secret,
            token_ttl: chrono::Duration::hours(parse(&or("TOKEN_TTL_HOURS", "168"), "TOKEN_TTL_HOURS")?),
            upload_dir: or("UPLOAD_DIR", "./uploads").into(),
            admin,
            payment_api_base: or("PAYMENT_API_BASE", "https://api.stripe.com"),
            payment_secret_key: or("PAYMENT_SECRET_KEY", ""),
            payment_timeout: Duration::from_secs(parse(
                &or("PAYMENT_TIMEOUT_SECS", "10"),
                "PAYMENT_TIMEOUT_SECS",
            )?),
            client_url: or("CLIENT_URL", "http://localhost:5173")
                .trim_end_matches('/')
                .to_string(),
            boost_price: parse(&or("BOOST_PRICE", "500"), "BOOST_PRICE")?,
            premium_price: parse(&or("PREMIUM_PRICE", "2000"), "PREMIUM_PRICE")?,
            currency: or("CURRENCY", "usd").to_lowercase(),
        })
    }
}

fn parse<T>(value: &str, name: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("ISSUEHUB_{} has an invalid value: {:?}", name, value))
}
