//! Payment provider seam. Only the checkout contract matters here: create a
//! hosted checkout session carrying our metadata, then re-fetch it by id to
//! learn whether it was paid.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use issuehub_types::PaymentKind;

use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,

    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("checkout session not found")]
    SessionNotFound,

    #[error("provider rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::SessionNotFound => ApiError::not_found("checkout session"),
            other => {
                warn!("Payment provider error: {}", other);
                ApiError::PaymentProviderUnavailable(other.to_string())
            }
        }
    }
}

/// What we ask the provider to charge, and the metadata it echoes back.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub kind: PaymentKind,
    pub payer_id: Uuid,
    pub payer_email: String,
    pub issue_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub product_name: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// Provider-side view of a checkout session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSession {
    pub id: String,
    #[serde(default)]
    pub payment_status: String,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ProviderSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    pub fn kind(&self) -> Option<PaymentKind> {
        self.metadata.get("kind")?.parse().ok()
    }

    pub fn payer_id(&self) -> Option<Uuid> {
        self.metadata.get("user_id")?.parse().ok()
    }

    pub fn issue_id(&self) -> Option<Uuid> {
        self.metadata.get("issue_id")?.parse().ok()
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout(&self, req: &CheckoutRequest) -> Result<CheckoutSession, ProviderError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<ProviderSession, ProviderError>;
}

/// Stripe-style checkout API over HTTPS.
pub struct HttpPaymentProvider {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpPaymentProvider {
    pub fn new(base_url: String, secret_key: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    async fn read_session(response: reqwest::Response) -> Result<ProviderSession, ProviderError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::SessionNotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<ProviderSession>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(e.to_string())
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn create_checkout(&self, req: &CheckoutRequest) -> Result<CheckoutSession, ProviderError> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), req.success_url.clone()),
            ("cancel_url".into(), req.cancel_url.clone()),
            ("customer_email".into(), req.payer_email.clone()),
            ("line_items[0][quantity]".into(), "1".into()),
            ("line_items[0][price_data][currency]".into(), req.currency.clone()),
            ("line_items[0][price_data][unit_amount]".into(), req.amount.to_string()),
            ("line_items[0][price_data][product_data][name]".into(), req.product_name.clone()),
            ("metadata[kind]".into(), req.kind.as_str().into()),
            ("metadata[user_id]".into(), req.payer_id.to_string()),
        ];
        if let Some(issue_id) = req.issue_id {
            form.push(("metadata[issue_id]".into(), issue_id.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;

        let session = Self::read_session(response).await?;
        debug!(session = %session.id, kind = %req.kind, "checkout session created");
        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<ProviderSession, ProviderError> {
        let response = self
            .client
            .get(format!("{}/v1/checkout/sessions/{}", self.base_url, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(transport_error)?;

        Self::read_session(response).await
    }
}
