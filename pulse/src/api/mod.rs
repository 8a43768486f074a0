//! Read-only HTTP surface for dashboards and other consumers.

pub mod error;
pub mod handlers;
pub mod router;

pub use error::ApiError;
pub use router::{AppState, create_router};
