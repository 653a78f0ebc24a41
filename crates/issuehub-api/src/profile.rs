use axum::{
    Extension, Json,
    extract::{Multipart, State},
    response::IntoResponse,
};

use crate::error::{ApiError, ApiResult};
use crate::middleware::Principal;
use crate::responses::user_summary;
use crate::state::{AppState, blocking};
use crate::uploads::MultipartForm;

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let user = blocking(&state, move |db| db.get_user_by_id(principal.id))
        .await?
        .ok_or(ApiError::UserNotFound)?;
    Ok(Json(user_summary(&user)))
}

/// PUT /api/profile with multipart name and avatar parts. Omitted parts keep their
/// current value. A new name is also shown on the user's existing issues.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let form = MultipartForm::read(multipart, &state.uploads, "avatar").await?;
    let name = form.text("name");
    let avatar_url = form.image_url;

    let user_id = principal.id;
    let user = blocking(&state, move |db| {
        if !db.update_profile(user_id, name.as_deref(), avatar_url.as_deref())? {
            return Ok(None);
        }
        db.get_user_by_id(user_id)
    })
    .await?
    .ok_or(ApiError::UserNotFound)?;

    Ok(Json(user_summary(&user)))
}
