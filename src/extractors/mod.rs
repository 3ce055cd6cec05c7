//! Request extractors.

pub mod auth;
pub mod json_params;
pub mod payload;

pub use auth::{AuthToken, Session};
pub use json_params::JsonParams;
pub use payload::Payload;
