//! Tubeline API Library
//!
//! Identity, session and social-graph backend for the Tubeline video platform.

pub mod accounts;
pub mod auth;
pub mod channels;
pub mod config;
pub mod error;
pub mod media;
pub mod routes;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
