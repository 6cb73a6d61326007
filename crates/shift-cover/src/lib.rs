//! Shift coverage for care facilities: sick-call intake, ranked replacement outreach, and
//! assignment, exposed as a library and an axum router.

pub mod auth;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;

pub use error::AppError;
