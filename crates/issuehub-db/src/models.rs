//! Database row types: these map directly to SQLite rows.
//! Distinct from issuehub-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use issuehub_types::{IssueStatus, PaymentKind, Priority, Role, Subscription};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub subscription: Subscription,
    pub blocked: bool,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub issues_created: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
}

/// Partial staff update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct StaffUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IssueRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub citizen_name: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub status: IssueStatus,
    pub priority: Priority,
    pub assigned_staff_id: Option<Uuid>,
    pub assigned_staff_name: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewIssue {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub citizen_name: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub priority: Priority,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// First timeline entry, recorded in the same transaction as the insert.
    pub timeline_message: String,
}

#[derive(Debug, Clone)]
pub struct IssueEdit {
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
}

#[derive(Debug, Clone)]
pub struct ReactionRow {
    pub issue_id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub issue_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub user_id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct TimelineRow {
    pub issue_id: Uuid,
    pub status: IssueStatus,
    pub message: String,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

/// An issue together with all of its sub-resources.
#[derive(Debug, Clone)]
pub struct IssueDetail {
    pub issue: IssueRow,
    pub upvotes: Vec<Uuid>,
    pub reactions: Vec<ReactionRow>,
    pub comments: Vec<CommentRow>,
    pub timeline: Vec<TimelineRow>,
}

/// Listing constraints. `None` means unconstrained; pages are 1-based.
#[derive(Debug, Clone)]
pub struct IssueFilter {
    pub owner_id: Option<Uuid>,
    pub assigned_staff_id: Option<Uuid>,
    pub category: Option<String>,
    pub status: Option<IssueStatus>,
    pub search: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl Default for IssueFilter {
    fn default() -> Self {
        Self {
            owner_id: None,
            assigned_staff_id: None,
            category: None,
            status: None,
            search: None,
            page: 1,
            limit: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuePage {
    pub issues: Vec<IssueDetail>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateIssueOutcome {
    Created,
    QuotaExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaffUpdateOutcome {
    Updated,
    /// No staff account has this id.
    NotFound,
    /// The requested email belongs to another account.
    EmailTaken,
}

#[derive(Debug, Clone)]
pub struct PaymentRow {
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

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: Uuid,
    pub session_id: String,
    pub kind: PaymentKind,
    pub user_id: Uuid,
    pub issue_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Applied,
    /// The session was recorded by an earlier call; nothing changed.
    AlreadyApplied,
    /// The issue or user the payment targets no longer exists.
    TargetMissing,
    /// The payment was recorded, but the issue is already resolved or
    /// rejected and was left as it is.
    TargetClosed,
}
