use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::warn;
use uuid::Uuid;

use issuehub_db::models::UserRow;
use issuehub_types::api::Claims;
use issuehub_types::{Role, Subscription};

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, blocking};

/// The authenticated caller, resolved fresh from the users table on every
/// request so blocks and role changes take effect immediately.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub subscription: Subscription,
    pub avatar_url: Option<String>,
}

impl From<UserRow> for Principal {
    fn from(user: UserRow) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            subscription: user.subscription,
            avatar_url: user.avatar_url,
        }
    }
}

/// Extract and validate JWT from Authorization header, then load the user.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthenticated("missing bearer token".into()))?;

    let principal = resolve_principal(&state, token).await?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

pub async fn resolve_principal(state: &AppState, token: &str) -> ApiResult<Principal> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ApiError::Unauthenticated(format!("invalid token: {}", e)))?
    .claims;

    let user = blocking(state, move |db| db.get_user_by_id(claims.sub))
        .await?
        .ok_or(ApiError::UserNotFound)?;

    if user.blocked {
        warn!("Blocked user {} attempted access", user.id);
        return Err(ApiError::AccountBlocked);
    }

    Ok(user.into())
}
