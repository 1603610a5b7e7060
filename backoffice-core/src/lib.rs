//! backoffice-core: shared infrastructure for the agency back-office services.

pub mod error;
pub mod middleware;
pub mod observability;

pub use axum;
pub use tracing;
pub use validator;
