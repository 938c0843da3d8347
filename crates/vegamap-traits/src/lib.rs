//! # Vegamap Traits
//!
//! Boundary types and trait definitions for the vegamap sensitivity engine.
//!
//! This crate contains the types that cross the engine boundary and the one
//! trait through which the engine talks to the outside world. Implementations
//! of [`ValuationClient`] live in separate extension crates.
//!
//! ## Module Structure
//!
//! - [`ids`]: Identifier types (instruments, runs)
//! - [`instrument`]: The term sheet handed to the engine
//! - [`valuation`]: Typed valuation request/response and the [`ValuationClient`] trait
//! - [`config`]: Engine configuration loaded from TOML
//! - [`error`]: Boundary and validation errors
//!
//! ## Dependency Injection
//!
//! The engine receives its valuation client explicitly:
//!
//! ```ignore
//! let client: Arc<dyn ValuationClient> = Arc::new(RestValuationClient::new(url, timeout)?);
//! let orchestrator = BatchOrchestrator::new(config, client)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod ids;
pub mod instrument;
pub mod valuation;

// Re-export commonly used types
pub use error::{TraitError, ValidationError};
pub use ids::*;
pub use valuation::ValuationClient;
