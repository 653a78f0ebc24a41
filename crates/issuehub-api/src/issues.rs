use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use issuehub_db::models::{CreateIssueOutcome, IssueEdit, IssueFilter, NewComment, NewIssue};
use issuehub_types::api::{
    CommentRequest, IssueListQuery, IssueListResponse, LatestResolvedQuery, ReactRequest,
    UpdateIssueRequest, UpvoteResponse,
};
use issuehub_types::{IssueStatus, Priority, Role, Subscription};

use crate::error::{ApiError, ApiResult};
use crate::middleware::Principal;
use crate::policy::{require_owner, require_role};
use crate::responses::issue_response;
use crate::state::{AppState, blocking};
use crate::uploads::MultipartForm;

/// Lifetime number of issues a free-tier citizen may report.
pub const FREE_ISSUE_QUOTA: u32 = 3;

const DEFAULT_PAGE_SIZE: u32 = 8;
const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_RESOLVED_FEED: u32 = 6;
const MAX_RESOLVED_FEED: u32 = 50;
const MAX_REACTION_LEN: usize = 32;

/// POST /issues (multipart with title, description, category, location, image).
pub async fn create_issue(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    require_role(&principal, Role::Citizen)?;

    let form = MultipartForm::read(multipart, &state.uploads, "image").await?;
    let title = form.required("title")?;
    let description = form.required("description")?;
    let category = form.required("category")?;
    let location = form.required("location")?;

    let premium = principal.subscription == Subscription::Premium;
    let (priority, timeline_message) = if premium {
        (Priority::High, "Issue reported by premium citizen (high priority)")
    } else {
        (Priority::Normal, "Issue reported by citizen")
    };
    let quota = (principal.role == Role::Citizen && !premium).then_some(FREE_ISSUE_QUOTA);

    let issue = NewIssue {
        id: Uuid::new_v4(),
        owner_id: principal.id,
        citizen_name: principal.name.clone(),
        title,
        description,
        category,
        location,
        priority,
        image_url: form.image_url,
        created_at: chrono::Utc::now(),
        timeline_message: timeline_message.to_string(),
    };
    let issue_id = issue.id;

    let detail = blocking(&state, move |db| match db.create_issue(&issue, quota)? {
        CreateIssueOutcome::QuotaExceeded => Ok(None),
        CreateIssueOutcome::Created => db.get_issue_detail(issue.id),
    })
    .await?
    .ok_or(ApiError::QuotaExceeded {
        limit: FREE_ISSUE_QUOTA,
    })?;

    info!("Issue {} reported by {} ({})", issue_id, principal.id, priority);
    Ok((StatusCode::CREATED, Json(issue_response(detail))))
}

/// GET /issues: filtered, ranked, paginated listing.
pub async fn list_issues(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<IssueListQuery>,
) -> ApiResult<impl IntoResponse> {
    let owner = query.mine.then_some(principal.id);
    let filter = build_filter(query, owner, None)?;
    list_page(&state, filter).await
}

/// Translate query parameters into store constraints. Unset, blank and
/// `"all"` values mean no constraint.
pub fn build_filter(
    query: IssueListQuery,
    owner_id: Option<Uuid>,
    assigned_staff_id: Option<Uuid>,
) -> ApiResult<IssueFilter> {
    fn constraint(value: Option<String>) -> Option<String> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
    }

    let status = constraint(query.status)
        .map(|s| {
            s.parse::<IssueStatus>()
                .map_err(|e| ApiError::validation(e.to_string()))
        })
        .transpose()?;

    Ok(IssueFilter {
        owner_id,
        assigned_staff_id,
        category: constraint(query.category),
        status,
        search: query
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        page: query.page.unwrap_or(1).max(1),
        limit: query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE),
    })
}

pub async fn list_page(state: &AppState, filter: IssueFilter) -> ApiResult<Json<IssueListResponse>> {
    let (page, limit) = (filter.page, filter.limit);
    let result = blocking(state, move |db| db.list_issues(&filter)).await?;

    Ok(Json(IssueListResponse {
        total_pages: result.total.div_ceil(limit as u64),
        total: result.total,
        page,
        limit,
        issues: result.issues.into_iter().map(issue_response).collect(),
    }))
}

pub async fn get_issue(
    State(state): State<AppState>,
    Path(issue_id): Path<Uuid>,
    Extension(_principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let detail = blocking(&state, move |db| db.get_issue_detail(issue_id))
        .await?
        .ok_or_else(|| ApiError::not_found("issue"))?;
    Ok(Json(issue_response(detail)))
}

/// PUT /issues/{id}: owner edit while the issue is still pending.
pub async fn update_issue(
    State(state): State<AppState>,
    Path(issue_id): Path<Uuid>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<UpdateIssueRequest>,
) -> ApiResult<impl IntoResponse> {
    let issue = blocking(&state, move |db| db.get_issue(issue_id))
        .await?
        .ok_or_else(|| ApiError::not_found("issue"))?;

    require_owner(&principal, issue.owner_id)?;
    if !issue.status.is_editable() {
        return Err(ApiError::InvalidTransition(format!(
            "cannot edit an issue that is {}",
            issue.status
        )));
    }

    let required = |value: String, field: &str| -> ApiResult<String> {
        let value = value.trim().to_string();
        if value.is_empty() {
            return Err(ApiError::validation(format!("{} is required", field)));
        }
        Ok(value)
    };
    let edit = IssueEdit {
        title: required(req.title, "title")?,
        description: required(req.description, "description")?,
        category: required(req.category, "category")?,
        location: required(req.location, "location")?,
    };

    let actor = principal.name.clone();
    let detail = blocking(&state, move |db| {
        if !db.edit_issue(issue_id, &edit, &actor)? {
            return Ok(None);
        }
        db.get_issue_detail(issue_id)
    })
    .await?
    .ok_or_else(|| ApiError::InvalidTransition("issue changed while editing".into()))?;

    Ok(Json(issue_response(detail)))
}

/// DELETE /issues/{id}: owner while pending, admin regardless.
pub async fn delete_issue(
    State(state): State<AppState>,
    Path(issue_id): Path<Uuid>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let issue = blocking(&state, move |db| db.get_issue(issue_id))
        .await?
        .ok_or_else(|| ApiError::not_found("issue"))?;

    require_owner(&principal, issue.owner_id)?;
    let only_if_pending = principal.role != Role::Admin;
    if only_if_pending && !issue.status.is_editable() {
        return Err(ApiError::InvalidTransition(format!(
            "cannot delete an issue that is {}",
            issue.status
        )));
    }

    let deleted = blocking(&state, move |db| db.delete_issue(issue_id, only_if_pending)).await?;
    if !deleted {
        return Err(ApiError::InvalidTransition("issue changed while deleting".into()));
    }

    info!("Issue {} deleted by {}", issue_id, principal.id);
    Ok(Json(serde_json::json!({ "success": true })))
}

/// POST /issues/{id}/react: replaces any earlier reaction by the caller.
pub async fn react(
    State(state): State<AppState>,
    Path(issue_id): Path<Uuid>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<ReactRequest>,
) -> ApiResult<impl IntoResponse> {
    let kind = req.kind.trim().to_string();
    if kind.is_empty() || kind.chars().count() > MAX_REACTION_LEN {
        return Err(ApiError::validation("reaction type is required"));
    }

    let user_id = principal.id;
    let kind_stored = kind.clone();
    let found = blocking(&state, move |db| db.set_reaction(issue_id, user_id, &kind_stored)).await?;
    if !found {
        return Err(ApiError::not_found("issue"));
    }

    Ok(Json(serde_json::json!({ "success": true, "type": kind })))
}

/// POST /issues/{id}/comment: append-only.
pub async fn comment(
    State(state): State<AppState>,
    Path(issue_id): Path<Uuid>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<impl IntoResponse> {
    let text = req.text.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::validation("comment cannot be empty"));
    }

    let comment = NewComment {
        user_id: principal.id,
        name: principal.name,
        avatar_url: principal.avatar_url,
        body: text,
    };
    let found = blocking(&state, move |db| db.add_comment(issue_id, &comment)).await?;
    if !found {
        return Err(ApiError::not_found("issue"));
    }

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "success": true }))))
}

/// POST /issues/{id}/upvote: toggle; owners cannot upvote their own issue.
pub async fn upvote(
    State(state): State<AppState>,
    Path(issue_id): Path<Uuid>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let user_id = principal.id;
    let toggled = blocking(&state, move |db| {
        // The owner never changes, so this read cannot race the toggle
        let Some(issue) = db.get_issue(issue_id)? else {
            return Ok(Err(ApiError::not_found("issue")));
        };
        if issue.owner_id == user_id {
            return Ok(Err(ApiError::InvalidOperation(
                "cannot upvote your own issue".into(),
            )));
        }
        Ok(db
            .toggle_upvote(issue_id, user_id)?
            .ok_or_else(|| ApiError::not_found("issue")))
    })
    .await??;

    let (upvoted, upvotes) = toggled;
    Ok(Json(UpvoteResponse { upvoted, upvotes }))
}

/// GET /issues/resolved/latest: public feed of recent fixes.
pub async fn latest_resolved(
    State(state): State<AppState>,
    Query(query): Query<LatestResolvedQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RESOLVED_FEED)
        .clamp(1, MAX_RESOLVED_FEED);
    let issues = blocking(&state, move |db| db.latest_resolved(limit)).await?;
    Ok(Json(issues.into_iter().map(issue_response).collect::<Vec<_>>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_defaults_and_all_values() {
        let filter = build_filter(
            IssueListQuery {
                category: Some("all".into()),
                status: Some("ALL".into()),
                search: Some("  ".into()),
                page: Some(0),
                ..Default::default()
            },
            None,
            None,
        )
        .unwrap();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, DEFAULT_PAGE_SIZE);
        assert!(filter.category.is_none());
        assert!(filter.status.is_none());
        assert!(filter.search.is_none());
    }

    #[test]
    fn filter_parses_status_and_clamps_limit() {
        let filter = build_filter(
            IssueListQuery {
                status: Some("in-progress".into()),
                limit: Some(10_000),
                ..Default::default()
            },
            None,
            None,
        )
        .unwrap();
        assert_eq!(filter.status, Some(IssueStatus::InProgress));
        assert_eq!(filter.limit, MAX_PAGE_SIZE);

        let bad = build_filter(
            IssueListQuery {
                status: Some("closed".into()),
                ..Default::default()
            },
            None,
            None,
        );
        assert!(matches!(bad, Err(ApiError::Validation(_))));
    }
}
