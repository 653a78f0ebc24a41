pub mod api;
pub mod models;

pub use models::{IssueStatus, PaymentKind, Priority, Role, Subscription};
