//! ObjectIO Common - shared types and conventions
//!
//! Carries the ambient stack (identifiers, error taxonomy, logging and
//! config conventions) that the placement engine and the TS cache crates
//! both build on.

pub mod config;
pub mod error;
pub mod types;

pub use config::{EngineConfig, LoggingConfig, init_tracing};
pub use error::{Error, Result};
pub use types::ObjectId;
