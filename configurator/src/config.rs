//! Run settings: install locations, pool sizing, firewall rule and policies
//!
//! ## Configuration Sources
//! Settings start from built-in defaults matching the stock package layout
//! and are then overridden from:
//! 1. `.env` file in the current directory or parent directories (if present)
//! 2. System environment variables
//! 3. Command line flags (applied by the binary)
//!
//! ## Environment Variables
//! - `CONFIGURATOR_ACCUMULO_HOME`: storage system install root
//! - `CONFIGURATOR_ZOOKEEPER_HOME`: coordination service install root
//! - `CONFIGURATOR_POOL_SIZE`: concurrent per-node jobs
//! - `CONFIGURATOR_TASK_TIMEOUT_SECS`: per-job deadline, `0` disables it
//! - `CONFIGURATOR_MONITOR_PORT`: monitoring port opened on the master

use std::time::Duration;

use shared::{PortRule, Protocol, SharedError, SharedResult};

use crate::core::pool::DEFAULT_POOL_SIZE;

/// What to do when some nodes fail within a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Record the failures in the run report and carry on with the next phase
    #[default]
    BestEffort,
    /// Abort the run once a phase barrier reports any failed node
    Strict,
}

/// Settings for one configuration run
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapSettings {
    pub accumulo_home: String,
    pub zookeeper_home: String,
    pub zookeeper_data_dir: String,
    pub pool_size: usize,
    pub task_timeout: Option<Duration>,
    pub monitor_port: u16,
    pub monitor_protocol: Protocol,
    pub monitor_cidr: String,
    pub failure_policy: FailurePolicy,
    pub start_storage: bool,
    pub open_firewall: bool,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            accumulo_home: "/opt/accumulo".to_string(),
            zookeeper_home: "/opt/zookeeper".to_string(),
            zookeeper_data_dir: "/var/lib/zookeeper".to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            task_timeout: Some(Duration::from_secs(300)),
            monitor_port: 50095,
            monitor_protocol: Protocol::Tcp,
            monitor_cidr: "0.0.0.0/0".to_string(),
            failure_policy: FailurePolicy::BestEffort,
            start_storage: false,
            open_firewall: true,
        }
    }
}

/// Example configuration files copied into the active configuration directory
pub const EXAMPLE_CONFIG_FILES: [&str; 4] = [
    "accumulo-metrics.xml",
    "log4j.properties",
    "generic_logger.xml",
    "monitor_logger.xml",
];

fn join(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}

impl BootstrapSettings {
    /// Defaults overridden by `.env` and process environment variables
    pub fn from_env() -> SharedResult<Self> {
        // A missing .env file is fine
        let _ = dotenv::dotenv();
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides<L>(mut self, lookup: L) -> SharedResult<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        if let Some(home) = lookup("CONFIGURATOR_ACCUMULO_HOME") {
            self.accumulo_home = home;
        }
        if let Some(home) = lookup("CONFIGURATOR_ZOOKEEPER_HOME") {
            self.zookeeper_home = home;
        }
        if let Some(size) = lookup("CONFIGURATOR_POOL_SIZE") {
            self.pool_size = parse_var("CONFIGURATOR_POOL_SIZE", &size)?;
        }
        if let Some(secs) = lookup("CONFIGURATOR_TASK_TIMEOUT_SECS") {
            let secs: u64 = parse_var("CONFIGURATOR_TASK_TIMEOUT_SECS", &secs)?;
            self.task_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(port) = lookup("CONFIGURATOR_MONITOR_PORT") {
            self.monitor_port = parse_var("CONFIGURATOR_MONITOR_PORT", &port)?;
        }
        Ok(self)
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_task_timeout(mut self, task_timeout: Option<Duration>) -> Self {
        self.task_timeout = task_timeout;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn with_start_storage(mut self, start_storage: bool) -> Self {
        self.start_storage = start_storage;
        self
    }

    pub fn with_open_firewall(mut self, open_firewall: bool) -> Self {
        self.open_firewall = open_firewall;
        self
    }

    pub fn with_monitor_port(mut self, monitor_port: u16) -> Self {
        self.monitor_port = monitor_port;
        self
    }

    pub fn accumulo_conf(&self) -> String {
        join(&self.accumulo_home, "conf")
    }

    pub fn zoo_cfg_path(&self) -> String {
        join(&self.zookeeper_home, "conf/zoo.cfg")
    }

    pub fn env_file_path(&self) -> String {
        join(&self.accumulo_conf(), "accumulo-env.sh")
    }

    pub fn site_file_path(&self) -> String {
        join(&self.accumulo_conf(), "accumulo-site.xml")
    }

    pub fn masters_file_path(&self) -> String {
        join(&self.accumulo_conf(), "masters")
    }

    pub fn workers_file_path(&self) -> String {
        join(&self.accumulo_conf(), "slaves")
    }

    pub fn create_data_dir_command(&self) -> String {
        format!("mkdir -p {}", self.zookeeper_data_dir)
    }

    pub fn start_coordination_command(&self) -> String {
        format!("{} start", join(&self.zookeeper_home, "bin/zkServer.sh"))
    }

    pub fn start_storage_command(&self) -> String {
        join(&self.accumulo_home, "bin/start-all.sh")
    }

    /// Commands of the post-install phase, in execution order
    pub fn copy_files_commands(&self) -> Vec<String> {
        let conf = self.accumulo_conf();
        let examples = join(&conf, "examples/1GB/standalone");

        let mut commands = vec![join(&self.accumulo_home, "bin/config.sh")];
        commands.extend(
            EXAMPLE_CONFIG_FILES
                .iter()
                .map(|file| format!("cp {} {}/", join(&examples, file), conf)),
        );
        commands
    }

    /// Inbound rule for the monitoring page
    pub fn monitor_rule(&self) -> PortRule {
        PortRule::single_port(self.monitor_protocol, self.monitor_port, self.monitor_cidr.clone())
    }
}

fn parse_var<T: std::str::FromStr>(field: &str, value: &str) -> SharedResult<T> {
    value.trim().parse().map_err(|_| SharedError::InvalidConfig {
        field: field.to_string(),
        value: value.to_string(),
    })
}
