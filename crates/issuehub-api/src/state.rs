use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use issuehub_db::Database;

use crate::error::{ApiError, ApiResult};
use crate::provider::PaymentProvider;
use crate::uploads::Uploads;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub uploads: Uploads,
    pub payments: Arc<dyn PaymentProvider>,
    pub payment_settings: PaymentSettings,
}

/// Prices are in the currency's minor unit (cents).
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub boost_amount: i64,
    pub premium_amount: i64,
    pub currency: String,
    /// Upper bound on any single provider round trip.
    pub provider_timeout: Duration,
    /// Front-end base URL the provider redirects back to.
    pub client_url: String,
}

/// Run blocking store work off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}
