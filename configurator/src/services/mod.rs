//! Service implementations
//!
//! Real implementations of the collaborator traits. These are the production
//! implementations that reach actual machines.

pub mod firewall;
pub mod ssh;

#[cfg(test)]
mod tests;

pub use firewall::IptablesNetworkControl;
pub use ssh::{SshChannel, SshOptions};
