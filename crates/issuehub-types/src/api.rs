use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{IssueStatus, PaymentKind, Priority, Role, Subscription};

// -- JWT Claims --

/// Signed identity carried in the bearer token. The role is a hint only;
/// the resolver always reloads the user row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub subscription: Subscription,
    pub blocked: bool,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub issues_created: u32,
    pub created_at: DateTime<Utc>,
}

// -- Issues --

#[derive(Debug, Deserialize)]
pub struct UpdateIssueRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactRequest {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct UpvoteResponse {
    pub upvoted: bool,
    pub upvotes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignedStaff {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reaction {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub user_id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub status: IssueStatus,
    pub message: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub citizen_name: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub status: IssueStatus,
    pub priority: Priority,
    pub assigned_staff: Option<AssignedStaff>,
    pub upvotes: Vec<Uuid>,
    pub reactions: Vec<Reaction>,
    pub comments: Vec<Comment>,
    pub timeline: Vec<TimelineEntry>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IssueListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub mine: bool,
}

#[derive(Debug, Serialize)]
pub struct IssueListResponse {
    pub issues: Vec<IssueResponse>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Deserialize)]
pub struct LatestResolvedQuery {
    pub limit: Option<u32>,
}

// -- Admin / staff --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignRequest {
    pub staff_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StaffStatusRequest {
    pub status: IssueStatus,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateStaffRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateStaffRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
}

// -- Payments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoostSessionRequest {
    pub issue_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CheckoutSessionResponse {
    pub session_id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyPaymentRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    /// False when the session had already been applied by an earlier call.
    pub applied: bool,
    pub kind: PaymentKind,
    pub issue_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub session_id: String,
    pub kind: PaymentKind,
    pub user_id: Uuid,
    pub issue_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
