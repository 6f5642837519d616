//! # Warden Common
//!
//! Shared types, errors, and constants used across Warden components.
//!
//! ## Modules
//! - `types` - Core data structures (ActionPolicy, FailureKey, Verdict, etc.)
//! - `error` - Common error types
//! - `constants` - Shared configuration defaults and request field names

pub mod constants;
pub mod error;
pub mod types;

pub use error::WardenError;
pub use types::*;
