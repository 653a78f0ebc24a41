pub mod admin;
pub mod auth;
pub mod error;
pub mod issues;
pub mod middleware;
pub mod payments;
pub mod policy;
pub mod profile;
pub mod provider;
pub mod responses;
pub mod routes;
pub mod staff;
pub mod state;
pub mod uploads;

pub use routes::router;
pub use state::{AppState, AppStateInner, PaymentSettings};
