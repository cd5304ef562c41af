//! Tubeline Shared Types and Utilities
//!
//! Domain records, error kinds and database helpers shared by the Tubeline crates.

pub mod db;
pub mod error;
pub mod types;

pub use db::*;
pub use error::*;
pub use types::*;
