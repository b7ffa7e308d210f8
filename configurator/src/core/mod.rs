//! Core fan-out machinery
//!
//! The worker pool and phase barrier, the configuration templates, and the
//! per-node jobs that run inside the pool.

pub mod pool;
pub mod tasks;
pub mod templates;

pub use pool::{DEFAULT_POOL_SIZE, JobBatch, WorkerPool};
pub use templates::{Template, TemplateContext};
