//! iptables-backed network control
//!
//! Each network group maps to an iptables chain on the master. Checking uses
//! `iptables -C`, which exits with status 1 when the rule is absent.

use std::sync::Arc;

use async_trait::async_trait;
use shared::{PortRule, Protocol};

use crate::error::{BootstrapError, BootstrapResult};
use crate::traits::{NetworkControl, RemoteChannel};

const RULE_ABSENT: i32 = 1;

/// [NetworkControl] that edits iptables chains through a remote channel
pub struct IptablesNetworkControl {
    channel: Arc<dyn RemoteChannel>,
    program: String,
}

impl IptablesNetworkControl {
    pub fn new(channel: Arc<dyn RemoteChannel>) -> Self {
        Self {
            channel,
            program: "iptables".to_string(),
        }
    }

    /// Override the iptables binary, e.g. `sudo iptables` (fluent API)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Full command applying `action` (`-C`, `-A`) for `rule` in `group`
    pub fn rule_command(&self, action: &str, group: &str, rule: &PortRule) -> String {
        let mut command = format!(
            "{} {} {} -p {} -s {}",
            self.program,
            action,
            group,
            rule.protocol.as_str(),
            rule.cidr
        );
        if rule.protocol != Protocol::Icmp {
            command.push_str(&format!(" --dport {}", rule.port_range()));
        }
        command.push_str(" -j ACCEPT");
        command
    }
}

#[async_trait]
impl NetworkControl for IptablesNetworkControl {
    async fn has_permission(&self, group: &str, rule: &PortRule) -> BootstrapResult<bool> {
        match self.channel.execute(&self.rule_command("-C", group, rule)).await {
            Ok(_) => Ok(true),
            Err(BootstrapError::RemoteCommand {
                exit_code: Some(RULE_ABSENT),
                ..
            }) => Ok(false),
            Err(e) => Err(BootstrapError::firewall(group, e.to_string())),
        }
    }

    async fn authorize(&self, group: &str, rule: &PortRule) -> BootstrapResult<()> {
        self.channel
            .execute(&self.rule_command("-A", group, rule))
            .await
            .map(|_| ())
            .map_err(|e| BootstrapError::firewall(group, e.to_string()))
    }
}
