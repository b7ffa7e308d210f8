//! Cluster configurator for a coordination service and a distributed storage system
//!
//! Given a set of already provisioned nodes and a designated master, this
//! library writes the storage system's configuration to every node in
//! parallel, starts the coordination service on the master and opens the
//! storage monitoring port in the master's network groups.

pub mod cluster;
pub mod config;
pub mod configurator;
pub mod core;
pub mod error;
pub mod report;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use cluster::{Master, Node, from_inventory, worker_addresses};
pub use config::{BootstrapSettings, FailurePolicy};
pub use configurator::Configurator;
pub use self::core::{DEFAULT_POOL_SIZE, JobBatch, WorkerPool};
pub use error::{BootstrapError, BootstrapResult};
pub use report::{JobFailure, JobOutcome, PhaseKind, PhaseReport, RunReport};
pub use traits::{CommandOutput, NetworkControl, RemoteChannel};
