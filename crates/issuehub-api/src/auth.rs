use std::sync::LazyLock;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use issuehub_db::Database;
use issuehub_db::models::NewUser;
use issuehub_types::Role;
use issuehub_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};

use crate::error::{ApiError, ApiResult};
use crate::responses::user_summary;
use crate::state::{AppState, blocking};
use crate::uploads::MultipartForm;

pub const MIN_PASSWORD_LEN: usize = 8;

/// POST /register: JSON sign-up for a citizen account.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let avatar_url = req.avatar_url.filter(|url| !url.trim().is_empty());
    create_citizen(&state, req.name, req.email, req.password, avatar_url).await
}

/// POST /register/citizen: multipart sign-up with an optional avatar image.
pub async fn register_citizen(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let form = MultipartForm::read(multipart, &state.uploads, "avatar").await?;
    let name = form.required("name")?;
    let email = form.required("email")?;
    let password = form.required("password")?;
    create_citizen(&state, name, email, password, form.image_url).await
}

async fn create_citizen(
    state: &AppState,
    name: String,
    email: String,
    password: String,
    avatar_url: Option<String>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let (name, email) = validate_account(&name, &email, &password)?;

    let user = NewUser {
        id: Uuid::new_v4(),
        name,
        email,
        password_hash: hash_password(&password)?,
        role: Role::Citizen,
        avatar_url,
        phone: None,
    };
    let created = insert_user(state, user).await?;

    let token = create_token(state, created.id, created.role)?;
    info!("Citizen {} registered", created.id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user_summary(&created),
        }),
    ))
}

/// Insert a new account. A taken email, including one registered by a
/// concurrent request, is a conflict.
pub(crate) async fn insert_user(
    state: &AppState,
    user: NewUser,
) -> ApiResult<issuehub_db::models::UserRow> {
    blocking(state, move |db| {
        if !db.create_user(&user)? {
            return Ok(Err(ApiError::Conflict("email is already registered".into())));
        }
        Ok(db.get_user_by_id(user.id)?.ok_or(ApiError::UserNotFound))
    })
    .await?
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();
    let user = blocking(&state, move |db| db.get_user_by_email(&email)).await?;
    let Some(user) = user else {
        // Unknown emails still pay for one verification
        verify_against_dummy(&req.password);
        return Err(ApiError::Unauthenticated("invalid email or password".into()));
    };

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password).map_err(|e| {
        warn!("Corrupt password hash for user {}: {}", user.id, e);
        ApiError::Internal
    })?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthenticated("invalid email or password".into()))?;

    if user.blocked {
        return Err(ApiError::AccountBlocked);
    }

    let token = create_token(&state, user.id, user.role)?;

    Ok(Json(AuthResponse {
        token,
        user: user_summary(&user),
    }))
}

/// Check the fields every account needs. Returns the trimmed name and
/// normalised email.
pub fn validate_account(name: &str, email: &str, password: &str) -> ApiResult<(String, String)> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name is required"));
    }

    let email = normalize_email(email)?;
    validate_password(password)?;
    Ok((name.to_string(), email))
}

/// Trim and lowercase an email, rejecting anything without `local@domain.tld`.
pub fn normalize_email(email: &str) -> ApiResult<String> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(ApiError::validation("a valid email is required"));
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> ApiResult<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Hash password with Argon2id
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("issuehub-unknown-account").ok());

fn verify_against_dummy(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref().and_then(|h| PasswordHash::new(h).ok()) {
        let _ = Argon2::default().verify_password(password.as_bytes(), &hash);
    }
}

fn create_token(state: &AppState, user_id: Uuid, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        role,
        exp: (chrono::Utc::now() + state.token_ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )?;

    Ok(token)
}

/// Create the configured admin account on first start. An existing account
/// with the same email is left as is.
pub fn ensure_admin(db: &Database, name: &str, email: &str, password: &str) -> anyhow::Result<bool> {
    if let Some(existing) = db.get_user_by_email(email)? {
        if existing.role != Role::Admin {
            warn!("Bootstrap admin email {} belongs to a {} account", email, existing.role);
        }
        return Ok(false);
    }

    let created = db.create_user(&NewUser {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: email.to_lowercase(),
        password_hash: hash_password(password)?,
        role: Role::Admin,
        avatar_url: None,
        phone: None,
    })?;
    if created {
        info!("Bootstrap admin {} created", email);
    }
    Ok(created)
}
