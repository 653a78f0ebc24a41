use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use issuehub_types::Role;
use issuehub_types::api::{IssueListQuery, StaffStatusRequest};

use crate::error::{ApiError, ApiResult};
use crate::issues::{build_filter, list_page};
use crate::middleware::Principal;
use crate::policy::{require_assignee, require_role};
use crate::responses::issue_response;
use crate::state::{AppState, blocking};

/// GET /staff/issues: the full board, same filters as the citizen listing.
pub async fn list_issues(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<IssueListQuery>,
) -> ApiResult<impl IntoResponse> {
    require_role(&principal, Role::Staff)?;
    let filter = build_filter(query, None, None)?;
    list_page(&state, filter).await
}

/// GET /staff/issues/my-assigned
pub async fn my_assigned(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<IssueListQuery>,
) -> ApiResult<impl IntoResponse> {
    require_role(&principal, Role::Staff)?;
    let filter = build_filter(query, None, Some(principal.id))?;
    list_page(&state, filter).await
}

/// PATCH /staff/issue/{id}/status: the assignee marks in-progress work resolved.
pub async fn update_status(
    State(state): State<AppState>,
    Path(issue_id): Path<Uuid>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<StaffStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let issue = blocking(&state, move |db| db.get_issue(issue_id))
        .await?
        .ok_or_else(|| ApiError::not_found("issue"))?;

    require_assignee(&principal, issue.assigned_staff_id)?;
    if issue.assigned_staff_id.is_none() {
        return Err(ApiError::InvalidTransition(
            "issue has no assignee; assign it first".into(),
        ));
    }
    if !issue.status.can_advance_to(req.status) {
        return Err(ApiError::InvalidTransition(format!(
            "cannot move an issue from {} to {}",
            issue.status, req.status
        )));
    }

    let message = req
        .note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("Status changed to {}", req.status));

    let (from, to) = (issue.status, req.status);
    let actor = principal.name.clone();
    let detail = blocking(&state, move |db| {
        if !db.transition_issue(issue_id, from, to, &message, &actor)? {
            return Ok(None);
        }
        db.get_issue_detail(issue_id)
    })
    .await?
    .ok_or_else(|| ApiError::InvalidTransition("issue changed while updating".into()))?;

    info!("Issue {} moved {} -> {} by {}", issue_id, from, to, principal.id);
    Ok(Json(issue_response(detail)))
}
