//! Main entry point for the configurator binary
//!
//! Loads a cluster inventory, wires real SSH channels and iptables network
//! control into the configurator, and runs the full pipeline.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;

use configurator::{
    services::{IptablesNetworkControl, SshChannel, SshOptions},
    BootstrapSettings, Configurator, FailurePolicy, RemoteChannel, WorkerPool,
};
use shared::{logging, ClusterInventory};

/// Configure a provisioned Accumulo/ZooKeeper cluster over SSH
#[derive(Parser)]
#[command(name = "configurator")]
#[command(about = "Pushes coordination and storage configuration to every cluster node")]
pub struct Args {
    /// Cluster inventory JSON file (master and node list)
    #[arg(long)]
    pub inventory: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Tracing endpoint URL that receives per-node events
    #[arg(long)]
    pub trace_ep: Option<String>,

    /// Remote user for SSH connections
    #[arg(long, default_value = "root")]
    pub ssh_user: String,

    /// Private key passed to ssh with -i
    #[arg(long)]
    pub ssh_identity: Option<String>,

    /// SSH port on every node
    #[arg(long, default_value = "22")]
    pub ssh_port: u16,

    /// Concurrent per-node jobs (overrides CONFIGURATOR_POOL_SIZE)
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Per-job deadline in seconds, 0 disables it (overrides CONFIGURATOR_TASK_TIMEOUT_SECS)
    #[arg(long)]
    pub task_timeout_secs: Option<u64>,

    /// Abort at the first phase in which any node fails
    #[arg(long)]
    pub strict: bool,

    /// Start the storage service on the master after configuration
    #[arg(long)]
    pub start_storage: bool,

    /// Leave the master's firewall untouched
    #[arg(long)]
    pub skip_firewall: bool,

    /// Write the run report as JSON to this file
    #[arg(long)]
    pub report: Option<String>,
}

impl Args {
    fn apply(&self, mut settings: BootstrapSettings) -> BootstrapSettings {
        if let Some(pool_size) = self.pool_size {
            settings = settings.with_pool_size(pool_size);
        }
        if let Some(secs) = self.task_timeout_secs {
            settings = settings.with_task_timeout((secs > 0).then(|| Duration::from_secs(secs)));
        }
        if self.strict {
            settings = settings.with_failure_policy(FailurePolicy::Strict);
        }
        let start_storage = self.start_storage || settings.start_storage;
        let open_firewall = settings.open_firewall && !self.skip_firewall;
        settings
            .with_start_storage(start_storage)
            .with_open_firewall(open_firewall)
    }

    fn ssh_options(&self) -> SshOptions {
        SshOptions::default()
            .with_user(&self.ssh_user)
            .with_identity(self.ssh_identity.clone())
            .with_port(self.ssh_port)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let trace_endpoint = args.trace_ep.as_ref().map(|url| logging::TracingEndpoint::new(url.clone()));
    logging::init_tracing_with_endpoint_and_level(trace_endpoint, Some(&args.log_level));

    let settings = args.apply(BootstrapSettings::from_env().context("invalid environment configuration")?);
    tracing::debug!(?settings, "Resolved settings");

    let inventory = ClusterInventory::from_file(&args.inventory)
        .with_context(|| format!("failed to load inventory {}", args.inventory))?;
    inventory.validate()?;

    let options = args.ssh_options();
    let (master, nodes) = configurator::from_inventory(&inventory, |host| {
        Arc::new(SshChannel::new(host.alias.clone(), host.connect_host(), options.clone())) as Arc<dyn RemoteChannel>
    });

    let network = IptablesNetworkControl::new(Arc::clone(master.channel()));
    let pool = WorkerPool::new(settings.pool_size).with_task_timeout(settings.task_timeout);
    let configurator = Configurator::new(pool.clone(), network, settings);

    // Ctrl-C cancels queued and running jobs; the current phase still drains
    let cancel_pool = pool.clone();
    let run_id = configurator.run_id();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            logging::log_shutdown(&run_id, "interrupt received, cancelling outstanding jobs");
            cancel_pool.cancel();
        }
    });

    let report = match configurator.configure(&master, &nodes).await {
        Ok(report) => report,
        Err(e) => {
            logging::log_error(&run_id, "Cluster configuration failed", &e);
            return Err(e.into());
        }
    };

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("failed to write report {path}"))?;
    }

    let failed = report.failed_nodes();
    if !failed.is_empty() {
        anyhow::bail!("{} node(s) not fully configured: {}", failed.len(), failed.join(", "));
    }

    logging::log_shutdown(&run_id, "configuration complete");
    Ok(())
}
