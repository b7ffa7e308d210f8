//! Collaborator trait definitions with mockall annotations for testing
//!
//! The configurator never talks to machines directly. Every remote effect goes
//! through one of these traits so the fan-out logic can be exercised against
//! mocks or in-memory fakes.

use shared::PortRule;

use crate::error::BootstrapResult;

/// Captured result of a remote shell command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }
}

/// Remote command and file channel to a single node
///
/// Implementations must be safe to share between concurrently running
/// per-node jobs, although in practice each job only touches its own node.
#[mockall::automock]
#[async_trait::async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Run a shell command on the node
    ///
    /// # Returns
    /// The captured output. A non-zero exit status or a transport failure is
    /// returned as an error.
    async fn execute(&self, command: &str) -> BootstrapResult<CommandOutput>;

    /// Replace the full contents of a file on the node
    ///
    /// The file is opened, written and closed within the call; the content is
    /// durable on the node once this returns `Ok`.
    async fn write_file(&self, path: &str, contents: &str) -> BootstrapResult<()>;
}

/// Cluster network control: query and mutate inbound firewall rules
#[mockall::automock]
#[async_trait::async_trait]
pub trait NetworkControl: Send + Sync {
    /// Whether `group` already permits traffic matching `rule`
    async fn has_permission(&self, group: &str, rule: &PortRule) -> BootstrapResult<bool>;

    /// Add `rule` to `group`
    async fn authorize(&self, group: &str, rule: &PortRule) -> BootstrapResult<()>;
}
