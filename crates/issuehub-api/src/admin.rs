use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use issuehub_db::models::{NewUser, StaffUpdate, StaffUpdateOutcome};
use issuehub_types::api::{
    AssignRequest, CreateStaffRequest, IssueListQuery, RejectRequest, UpdateStaffRequest,
    UserListQuery, UserSummary,
};
use issuehub_types::{IssueStatus, Role};

use crate::auth::{
    hash_password, insert_user, normalize_email, validate_account, validate_password,
};
use crate::error::{ApiError, ApiResult};
use crate::issues::{build_filter, list_page};
use crate::middleware::Principal;
use crate::policy::require_role;
use crate::responses::{issue_response, payment_response, user_summary};
use crate::state::{AppState, blocking};

const DEFAULT_REJECT_MESSAGE: &str = "Issue rejected by admin";

// -- Users --

pub async fn list_users(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<impl IntoResponse> {
    require_role(&principal, Role::Admin)?;
    let users = blocking(&state, move |db| db.list_users(query.role)).await?;
    Ok(Json(users.iter().map(user_summary).collect::<Vec<_>>()))
}

pub async fn block_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    set_blocked(&state, &principal, user_id, true).await
}

pub async fn unblock_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    set_blocked(&state, &principal, user_id, false).await
}

async fn set_blocked(
    state: &AppState,
    principal: &Principal,
    user_id: Uuid,
    blocked: bool,
) -> ApiResult<Json<UserSummary>> {
    require_role(principal, Role::Admin)?;

    let target = blocking(state, move |db| db.get_user_by_id(user_id))
        .await?
        .ok_or(ApiError::UserNotFound)?;
    if target.role == Role::Admin {
        return Err(ApiError::InvalidOperation(
            "admin accounts cannot be blocked".into(),
        ));
    }

    let user = blocking(state, move |db| {
        db.set_blocked(user_id, blocked)?;
        db.get_user_by_id(user_id)
    })
    .await?
    .ok_or(ApiError::UserNotFound)?;

    info!(
        "User {} {} by {}",
        user_id,
        if blocked { "blocked" } else { "unblocked" },
        principal.id
    );
    Ok(Json(user_summary(&user)))
}

// -- Staff --

pub async fn list_staff(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    require_role(&principal, Role::Admin)?;
    let staff = blocking(&state, |db| db.list_users(Some(Role::Staff))).await?;
    Ok(Json(staff.iter().map(user_summary).collect::<Vec<_>>()))
}

pub async fn create_staff(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateStaffRequest>,
) -> ApiResult<impl IntoResponse> {
    require_role(&principal, Role::Admin)?;
    let (name, email) = validate_account(&req.name, &req.email, &req.password)?;

    let staff = insert_user(
        &state,
        NewUser {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash: hash_password(&req.password)?,
            role: Role::Staff,
            avatar_url: non_blank(req.avatar_url),
            phone: non_blank(req.phone),
        },
    )
    .await?;

    info!("Staff {} created by {}", staff.id, principal.id);
    Ok((StatusCode::CREATED, Json(user_summary(&staff))))
}

pub async fn update_staff(
    State(state): State<AppState>,
    Path(staff_id): Path<Uuid>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<UpdateStaffRequest>,
) -> ApiResult<impl IntoResponse> {
    require_role(&principal, Role::Admin)?;

    let name = match req.name {
        Some(name) if name.trim().is_empty() => {
            return Err(ApiError::validation("name cannot be empty"));
        }
        other => other.map(|n| n.trim().to_string()),
    };
    let email = req.email.as_deref().map(normalize_email).transpose()?;
    let password_hash = match req.password.as_deref() {
        Some(password) => {
            validate_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let update = StaffUpdate {
        name,
        email,
        phone: non_blank(req.phone),
        avatar_url: non_blank(req.avatar_url),
        password_hash,
    };

    let updated = blocking(&state, move |db| {
        match db.update_staff(staff_id, &update)? {
            StaffUpdateOutcome::Updated => {}
            StaffUpdateOutcome::NotFound => return Ok(Err(ApiError::not_found("staff member"))),
            StaffUpdateOutcome::EmailTaken => {
                return Ok(Err(ApiError::Conflict("email is already registered".into())));
            }
        }
        Ok(db
            .get_user_by_id(staff_id)?
            .ok_or_else(|| ApiError::not_found("staff member")))
    })
    .await??;

    info!("Staff {} updated by {}", staff_id, principal.id);
    Ok(Json(user_summary(&updated)))
}

pub async fn delete_staff(
    State(state): State<AppState>,
    Path(staff_id): Path<Uuid>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    require_role(&principal, Role::Admin)?;

    let deleted = blocking(&state, move |db| db.delete_staff(staff_id)).await?;
    if !deleted {
        return Err(ApiError::not_found("staff member"));
    }

    info!("Staff {} deleted by {}", staff_id, principal.id);
    Ok(Json(serde_json::json!({ "success": true })))
}

// -- Issues --

pub async fn list_issues(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<IssueListQuery>,
) -> ApiResult<impl IntoResponse> {
    require_role(&principal, Role::Admin)?;
    let filter = build_filter(query, None, None)?;
    list_page(&state, filter).await
}

/// PATCH /admin/issue/assign/{id}: hand the issue to a staff member and
/// move it into progress.
pub async fn assign_issue(
    State(state): State<AppState>,
    Path(issue_id): Path<Uuid>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<impl IntoResponse> {
    require_role(&principal, Role::Admin)?;

    let staff_id = req.staff_id;
    let (issue, staff) = blocking(&state, move |db| {
        Ok((db.get_issue(issue_id)?, db.get_user_by_id(staff_id)?))
    })
    .await?;
    let issue = issue.ok_or_else(|| ApiError::not_found("issue"))?;
    let staff = staff
        .filter(|u| u.role == Role::Staff)
        .ok_or_else(|| ApiError::InvalidOperation("assignee must be a staff member".into()))?;
    if staff.blocked {
        return Err(ApiError::InvalidOperation(
            "cannot assign to a blocked staff member".into(),
        ));
    }
    if !issue.status.can_assign() {
        return Err(ApiError::InvalidTransition(format!(
            "cannot assign an issue that is {}",
            issue.status
        )));
    }

    let actor = principal.name.clone();
    let from = issue.status;
    let detail = blocking(&state, move |db| {
        if !db.assign_issue(issue_id, from, staff.id, &staff.name, &actor)? {
            return Ok(None);
        }
        db.get_issue_detail(issue_id)
    })
    .await?
    .ok_or_else(|| ApiError::InvalidTransition("issue changed while assigning".into()))?;

    info!("Issue {} assigned to {} by {}", issue_id, staff_id, principal.id);
    Ok(Json(issue_response(detail)))
}

/// PATCH /admin/issue/reject/{id}: body is optional; an empty reason falls
/// back to a default timeline message.
pub async fn reject_issue(
    State(state): State<AppState>,
    Path(issue_id): Path<Uuid>,
    Extension(principal): Extension<Principal>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    require_role(&principal, Role::Admin)?;

    let issue = blocking(&state, move |db| db.get_issue(issue_id))
        .await?
        .ok_or_else(|| ApiError::not_found("issue"))?;
    if !issue.status.can_reject() {
        return Err(ApiError::InvalidTransition("issue is already rejected".into()));
    }

    let req: RejectRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RejectRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::validation(format!("invalid reject body: {}", e)))?
    };
    let message = req
        .reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_REJECT_MESSAGE.to_string());

    let actor = principal.name.clone();
    let from = issue.status;
    let detail = blocking(&state, move |db| {
        if !db.transition_issue(issue_id, from, IssueStatus::Rejected, &message, &actor)? {
            return Ok(None);
        }
        db.get_issue_detail(issue_id)
    })
    .await?
    .ok_or_else(|| ApiError::InvalidTransition("issue changed while rejecting".into()))?;

    info!("Issue {} rejected by {}", issue_id, principal.id);
    Ok(Json(issue_response(detail)))
}

// -- Payments --

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    require_role(&principal, Role::Admin)?;
    let payments = blocking(&state, |db| db.list_payments()).await?;
    Ok(Json(
        payments.into_iter().map(payment_response).collect::<Vec<_>>(),
    ))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
