use std::future::Future;

use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::{info, warn};
use uuid::Uuid;

use issuehub_db::models::{NewPayment, PaymentOutcome};
use issuehub_types::api::{
    BoostSessionRequest, CheckoutSessionResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};
use issuehub_types::{IssueStatus, PaymentKind, Priority, Role, Subscription};

use crate::error::{ApiError, ApiResult};
use crate::middleware::Principal;
use crate::policy::require_owner;
use crate::provider::{CheckoutRequest, ProviderError, ProviderSession};
use crate::state::{AppState, blocking};

/// POST /payment/boost/create-session
pub async fn create_boost_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<BoostSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let issue_id = req.issue_id;
    let issue = blocking(&state, move |db| db.get_issue(issue_id))
        .await?
        .ok_or_else(|| ApiError::not_found("issue"))?;

    require_owner(&principal, issue.owner_id)?;
    if issue.priority == Priority::High {
        return Err(ApiError::InvalidOperation(
            "issue is already high priority".into(),
        ));
    }
    if matches!(issue.status, IssueStatus::Resolved | IssueStatus::Rejected) {
        return Err(ApiError::InvalidOperation(format!(
            "cannot boost an issue that is {}",
            issue.status
        )));
    }

    let settings = &state.payment_settings;
    let checkout = CheckoutRequest {
        kind: PaymentKind::Boost,
        payer_id: principal.id,
        payer_email: principal.email.clone(),
        issue_id: Some(issue_id),
        amount: settings.boost_amount,
        currency: settings.currency.clone(),
        product_name: format!("Priority boost: {}", issue.title),
        success_url: success_url(&settings.client_url, PaymentKind::Boost),
        cancel_url: format!("{}/issues/{}", settings.client_url, issue_id),
    };
    let session = with_timeout(&state, state.payments.create_checkout(&checkout)).await?;

    info!("Boost session {} opened for issue {} by {}", session.id, issue_id, principal.id);
    Ok(Json(CheckoutSessionResponse {
        session_id: session.id,
        url: session.url,
    }))
}

/// POST /payment/verify: confirm a boost session and raise the issue's priority.
pub async fn verify_boost(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<VerifyPaymentRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = fetch_paid_session(&state, &req.session_id, PaymentKind::Boost).await?;

    let issue_id = session
        .issue_id()
        .ok_or_else(|| ApiError::PaymentMismatch("session does not name an issue".into()))?;
    let payer_id = session
        .payer_id()
        .ok_or_else(|| ApiError::PaymentMismatch("session does not name a payer".into()))?;

    let settings = &state.payment_settings;
    let payment = NewPayment {
        id: Uuid::new_v4(),
        session_id: session.id.clone(),
        kind: PaymentKind::Boost,
        user_id: payer_id,
        issue_id: Some(issue_id),
        amount: session.amount_total.unwrap_or(settings.boost_amount),
        currency: session
            .currency
            .clone()
            .unwrap_or_else(|| settings.currency.clone()),
    };

    let outcome = blocking(&state, move |db| db.apply_boost_payment(&payment)).await?;
    let applied = match outcome {
        PaymentOutcome::Applied => {
            info!(
                "Issue {} boosted via session {} (verified by {})",
                issue_id, session.id, principal.id
            );
            true
        }
        PaymentOutcome::AlreadyApplied => false,
        PaymentOutcome::TargetClosed => {
            warn!(
                "Boost session {} paid for issue {} after it was closed; priority left as is",
                session.id, issue_id
            );
            false
        }
        PaymentOutcome::TargetMissing => return Err(ApiError::not_found("issue")),
    };

    Ok(Json(VerifyPaymentResponse {
        success: true,
        applied,
        kind: PaymentKind::Boost,
        issue_id: Some(issue_id),
    }))
}

/// POST /payment/premium/create-session
pub async fn create_premium_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    if principal.role != Role::Citizen {
        return Err(ApiError::forbidden("only citizens can subscribe"));
    }
    if principal.subscription == Subscription::Premium {
        return Err(ApiError::InvalidOperation("already subscribed to premium".into()));
    }

    let settings = &state.payment_settings;
    let checkout = CheckoutRequest {
        kind: PaymentKind::Premium,
        payer_id: principal.id,
        payer_email: principal.email.clone(),
        issue_id: None,
        amount: settings.premium_amount,
        currency: settings.currency.clone(),
        product_name: "Premium subscription".into(),
        success_url: success_url(&settings.client_url, PaymentKind::Premium),
        cancel_url: format!("{}/profile", settings.client_url),
    };
    let session = with_timeout(&state, state.payments.create_checkout(&checkout)).await?;

    info!("Premium session {} opened by {}", session.id, principal.id);
    Ok(Json(CheckoutSessionResponse {
        session_id: session.id,
        url: session.url,
    }))
}

/// POST /payment/premium/verify: confirm the caller's own premium purchase.
pub async fn verify_premium(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<VerifyPaymentRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = fetch_paid_session(&state, &req.session_id, PaymentKind::Premium).await?;

    if session.payer_id() != Some(principal.id) {
        warn!(
            "Premium session {} presented by {} who is not its payer",
            session.id, principal.id
        );
        return Err(ApiError::PaymentMismatch(
            "session was paid by another account".into(),
        ));
    }

    let settings = &state.payment_settings;
    let currency_matches = session
        .currency
        .as_deref()
        .is_some_and(|c| c.eq_ignore_ascii_case(&settings.currency));
    if session.amount_total != Some(settings.premium_amount) || !currency_matches {
        return Err(ApiError::PaymentMismatch(format!(
            "expected {} {}",
            settings.premium_amount, settings.currency
        )));
    }

    let payment = NewPayment {
        id: Uuid::new_v4(),
        session_id: session.id.clone(),
        kind: PaymentKind::Premium,
        user_id: principal.id,
        issue_id: None,
        amount: settings.premium_amount,
        currency: settings.currency.clone(),
    };
    let outcome = blocking(&state, move |db| db.apply_premium_payment(&payment)).await?;
    let applied = match outcome {
        PaymentOutcome::Applied => true,
        PaymentOutcome::AlreadyApplied | PaymentOutcome::TargetClosed => false,
        PaymentOutcome::TargetMissing => return Err(ApiError::UserNotFound),
    };

    if applied {
        info!("User {} upgraded to premium via session {}", principal.id, session.id);
    }
    Ok(Json(VerifyPaymentResponse {
        success: true,
        applied,
        kind: PaymentKind::Premium,
        issue_id: None,
    }))
}

/// Re-fetch a session from the provider and check it is paid and of the
/// expected kind.
async fn fetch_paid_session(
    state: &AppState,
    session_id: &str,
    expected: PaymentKind,
) -> ApiResult<ProviderSession> {
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(ApiError::validation("session_id is required"));
    }

    let session = with_timeout(state, state.payments.retrieve_session(session_id)).await?;
    if !session.is_paid() {
        return Err(ApiError::PaymentIncomplete(format!(
            "payment status is {}",
            if session.payment_status.is_empty() {
                "unknown"
            } else {
                session.payment_status.as_str()
            }
        )));
    }
    if session.kind() != Some(expected) {
        return Err(ApiError::PaymentMismatch(format!(
            "session is not a {} payment",
            expected
        )));
    }
    Ok(session)
}

/// Bound a provider call by the configured timeout.
async fn with_timeout<T>(
    state: &AppState,
    call: impl Future<Output = Result<T, ProviderError>>,
) -> ApiResult<T> {
    match tokio::time::timeout(state.payment_settings.provider_timeout, call).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => Err(ProviderError::Timeout.into()),
    }
}

fn success_url(client_url: &str, kind: PaymentKind) -> String {
    // {CHECKOUT_SESSION_ID} is substituted by the provider
    format!(
        "{}/payment/success?session_id={{CHECKOUT_SESSION_ID}}&type={}",
        client_url, kind
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_url_keeps_provider_placeholder() {
        assert_eq!(
            success_url("http://localhost:5173", PaymentKind::Boost),
            "http://localhost:5173/payment/success?session_id={CHECKOUT_SESSION_ID}&type=boost"
        );
    }
}
