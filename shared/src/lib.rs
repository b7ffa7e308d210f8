//! Shared types for the cluster configurator
//!
//! Contains the cluster inventory model, firewall rule types, run
//! identifiers and the tracing setup used by the configurator binary.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
