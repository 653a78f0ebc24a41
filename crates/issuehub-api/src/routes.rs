use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::uploads::{MAX_IMAGE_SIZE, UPLOADS_ROUTE};
use crate::{admin, auth, issues, payments, profile, staff};

/// Room for one maximum-size image plus the form's text fields.
const MAX_BODY_SIZE: usize = MAX_IMAGE_SIZE + 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/register", post(auth::register))
        .route("/register/citizen", post(auth::register_citizen))
        .route("/login", post(auth::login))
        .route("/issues/resolved/latest", get(issues::latest_resolved));

    let protected_routes = Router::new()
        .route("/issues", get(issues::list_issues).post(issues::create_issue))
        .route(
            "/issues/{id}",
            get(issues::get_issue)
                .put(issues::update_issue)
                .delete(issues::delete_issue),
        )
        .route("/issues/{id}/react", post(issues::react))
        .route("/issues/{id}/comment", post(issues::comment))
        .route("/issues/{id}/upvote", post(issues::upvote))
        .route(
            "/api/profile",
            get(profile::get_profile).put(profile::update_profile),
        )
        // Admin
        .route("/admin/users", get(admin::list_users))
        .route("/admin/user/block/{id}", patch(admin::block_user))
        .route("/admin/user/unblock/{id}", patch(admin::unblock_user))
        .route("/admin/staff", get(admin::list_staff).post(admin::create_staff))
        .route(
            "/admin/staff/{id}",
            put(admin::update_staff).delete(admin::delete_staff),
        )
        .route("/admin/issues", get(admin::list_issues))
        .route("/admin/issue/assign/{id}", patch(admin::assign_issue))
        .route("/admin/issue/reject/{id}", patch(admin::reject_issue))
        .route("/admin/payments", get(admin::list_payments))
        // Staff
        .route("/staff/issues", get(staff::list_issues))
        .route("/staff/issues/my-assigned", get(staff::my_assigned))
        .route("/staff/issue/{id}/status", patch(staff::update_status))
        // Payments
        .route(
            "/payment/boost/create-session",
            post(payments::create_boost_session),
        )
        .route("/payment/verify", post(payments::verify_boost))
        .route(
            "/payment/premium/create-session",
            post(payments::create_premium_session),
        )
        .route("/payment/premium/verify", post(payments::verify_premium))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service(UPLOADS_ROUTE, ServeDir::new(state.uploads.dir()))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
