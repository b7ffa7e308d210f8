//! Fan-out configurator
//!
//! Drives a cluster through a fixed pipeline: master-only coordination service
//! setup, then five phases that each fan one job per node out to the worker
//! pool and wait on the phase barrier, then the optional storage start and the
//! monitoring port. Phases never overlap: every job of a phase has completed
//! before the first job of the next phase is submitted.

use std::future::Future;
use std::sync::Arc;

use shared::{RunId, logging, node_info, node_warn};

use crate::cluster::{Master, Node, worker_addresses};
use crate::config::{BootstrapSettings, FailurePolicy};
use crate::core::pool::WorkerPool;
use crate::core::tasks;
use crate::core::templates::{ACCUMULO_ENV, ACCUMULO_SITE, ALL_TEMPLATES, TemplateContext, ZOO_CFG};
use crate::error::{BootstrapError, BootstrapResult};
use crate::report::{PhaseKind, PhaseReport, RunReport};
use crate::traits::NetworkControl;

/// Cluster configurator with an injected worker pool and network control
pub struct Configurator<N>
where
    N: NetworkControl + 'static,
{
    pool: WorkerPool,
    network: N,
    settings: BootstrapSettings,
    run_id: RunId,
}

impl<N> Configurator<N>
where
    N: NetworkControl + 'static,
{
    /// Create a configurator that runs per-node jobs on `pool`
    pub fn new(pool: WorkerPool, network: N, settings: BootstrapSettings) -> Self {
        Self {
            pool,
            network,
            settings,
            run_id: RunId::new(),
        }
    }

    /// Build the pool from the settings' size and timeout
    pub fn from_settings(network: N, settings: BootstrapSettings) -> Self {
        let pool = WorkerPool::new(settings.pool_size).with_task_timeout(settings.task_timeout);
        Self::new(pool, network, settings)
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn settings(&self) -> &BootstrapSettings {
        &self.settings
    }

    /// Run the full pipeline against `master` and `nodes`
    ///
    /// Failures of individual per-node jobs are handled according to the
    /// configured [FailurePolicy]. Failures of master-only steps and of the
    /// firewall update abort the run; nodes already configured are left as-is.
    pub async fn configure(&self, master: &Master, nodes: &[Node]) -> BootstrapResult<RunReport> {
        logging::log_startup(
            &self.run_id,
            &format!("cluster configuration of {} node(s), master {}", nodes.len(), master.alias()),
        );

        let context = self.context_for(master)?;

        self.install_coordination(master).await?;
        self.start_coordination(master).await?;

        let mut report = RunReport {
            run_id: self.run_id,
            phases: self.run_phases(master, nodes, context).await?,
            ..Default::default()
        };

        if self.settings.start_storage {
            self.start_storage(master).await?;
            report.storage_started = true;
        }

        if self.settings.open_firewall {
            report.rules_added = self.open_monitor_port(master).await?;
        }

        let url = self.monitor_url(master);
        node_info!(master.alias(), "Accumulo monitor page: {}", url);
        report.monitor_url = Some(url);

        let failed = report.failed_nodes();
        if failed.is_empty() {
            logging::log_success(&self.run_id, &format!("Configured {} node(s)", nodes.len()));
        } else {
            logging::log_warning(
                &self.run_id,
                "Configuration incomplete",
                &format!("{} node(s) failed: {}", failed.len(), failed.join(", ")),
            );
        }

        Ok(report)
    }

    /// Run only the five fan-out phases
    pub async fn configure_nodes(&self, master: &Master, nodes: &[Node]) -> BootstrapResult<Vec<PhaseReport>> {
        let context = self.context_for(master)?;
        self.run_phases(master, nodes, context).await
    }

    /// Create the coordination data directory and write its configuration
    pub async fn install_coordination(&self, master: &Master) -> BootstrapResult<()> {
        node_info!(master.alias(), "Configuring Zookeeper...");
        let channel = master.channel();

        let mkdir = self.settings.create_data_dir_command();
        self.guarded(&mkdir, channel.execute(&mkdir)).await?;

        let zoo_cfg = ZOO_CFG.render(&TemplateContext::new())?;
        let path = self.settings.zoo_cfg_path();
        self.guarded(&path, channel.write_file(&path, &zoo_cfg)).await?;
        Ok(())
    }

    /// Start the coordination service on the master
    pub async fn start_coordination(&self, master: &Master) -> BootstrapResult<()> {
        node_info!(master.alias(), "Starting zookeeper...");
        let command = self.settings.start_coordination_command();
        self.guarded(&command, master.channel().execute(&command)).await?;
        Ok(())
    }

    /// Start the storage service on the master
    ///
    /// Not part of [Self::configure] unless `start_storage` is set.
    pub async fn start_storage(&self, master: &Master) -> BootstrapResult<()> {
        node_info!(master.alias(), "Starting accumulo...");
        let command = self.settings.start_storage_command();
        self.guarded(&command, master.channel().execute(&command)).await?;
        Ok(())
    }

    /// Permit inbound access to the monitoring port in every master network group
    ///
    /// A group that already allows the rule is left untouched, so calling this
    /// repeatedly adds the rule at most once per group. Returns the number of
    /// rules added.
    pub async fn open_monitor_port(&self, master: &Master) -> BootstrapResult<usize> {
        let rule = self.settings.monitor_rule();
        let groups = master.network_groups();
        if groups.is_empty() {
            node_warn!(master.alias(), "⚠️ Master has no network groups; {} not opened", rule);
            return Ok(0);
        }

        let mut added = 0;
        for group in groups {
            if self.network.has_permission(group, &rule).await? {
                node_info!(master.alias(), "🔓 {} already permits {}", group, rule);
                continue;
            }
            self.network.authorize(group, &rule).await?;
            node_info!(master.alias(), "🔓 Authorized {} in {}", rule, group);
            added += 1;
        }
        Ok(added)
    }

    /// URL of the storage service's monitoring page
    pub fn monitor_url(&self, master: &Master) -> String {
        format!("http://{}:{}", master.public_name(), self.settings.monitor_port)
    }

    /// Capture the master's address once and check every template against it
    fn context_for(&self, master: &Master) -> BootstrapResult<Arc<TemplateContext>> {
        let context = TemplateContext::for_master(master.private_address());
        for template in ALL_TEMPLATES {
            template.validate(&context)?;
        }
        Ok(Arc::new(context))
    }

    async fn run_phases(
        &self,
        master: &Master,
        nodes: &[Node],
        context: Arc<TemplateContext>,
    ) -> BootstrapResult<Vec<PhaseReport>> {
        let workers = Arc::new(worker_addresses(master, nodes));
        let commands = Arc::new(self.settings.copy_files_commands());
        let master_address = master.private_address();

        let mut reports = Vec::with_capacity(PhaseKind::ALL.len());
        for phase in PhaseKind::ALL {
            logging::log_progress(&self.run_id, &phase.to_string(), phase.description());

            let mut batch = self.pool.batch();
            for node in nodes {
                let node = node.clone();
                let job_id = node.alias().to_string();
                match phase {
                    PhaseKind::Env => batch.submit(
                        job_id,
                        tasks::write_template(node, ACCUMULO_ENV, self.settings.env_file_path(), context.clone()),
                    ),
                    PhaseKind::Site => batch.submit(
                        job_id,
                        tasks::write_template(node, ACCUMULO_SITE, self.settings.site_file_path(), context.clone()),
                    ),
                    PhaseKind::Masters => batch.submit(
                        job_id,
                        tasks::write_masters(node, self.settings.masters_file_path(), master_address),
                    ),
                    PhaseKind::Workers => batch.submit(
                        job_id,
                        tasks::write_workers(node, self.settings.workers_file_path(), workers.clone()),
                    ),
                    PhaseKind::CopyFiles => batch.submit(job_id, tasks::run_commands(node, commands.clone())),
                }
            }

            let report = PhaseReport::new(phase, batch.wait(nodes.len()).await?);
            self.check_phase(&report)?;
            reports.push(report);
        }

        Ok(reports)
    }

    fn check_phase(&self, report: &PhaseReport) -> BootstrapResult<()> {
        let failed = report.failed();
        for (node, failure) in &failed {
            node_warn!(node, "⚠️ Phase {} {}", report.phase, failure);
        }

        if self.pool.is_cancelled() {
            return Err(BootstrapError::Cancelled);
        }

        if !failed.is_empty() && self.settings.failure_policy == FailurePolicy::Strict {
            return Err(BootstrapError::PhaseFailed {
                phase: report.phase,
                nodes: failed.iter().map(|(node, _)| node.to_string()).collect(),
            });
        }

        Ok(())
    }

    /// Apply the pool's deadline and cancellation to a driver-level step
    async fn guarded<T, F>(&self, operation: &str, step: F) -> BootstrapResult<T>
    where
        F: Future<Output = BootstrapResult<T>>,
    {
        let cancel = self.pool.cancellation_token();
        let bounded = async {
            match self.pool.task_timeout() {
                Some(after) => tokio::time::timeout(after, step)
                    .await
                    .map_err(|_| BootstrapError::Timeout {
                        operation: operation.to_string(),
                        after,
                    })?,
                None => step.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BootstrapError::Cancelled),
            result = bounded => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{CommandOutput, MockNetworkControl, MockRemoteChannel, RemoteChannel};
    use std::time::Duration;
    use tracing_test::traced_test;

    fn master_with(channel: MockRemoteChannel, groups: &[&str]) -> Master {
        let node = Node::new("master", "10.0.0.1".parse().unwrap(), Arc::new(channel));
        Master::new(
            node,
            "ec2-54-1-2-3.compute-1.amazonaws.com",
            groups.iter().map(|g| g.to_string()).collect(),
        )
    }

    fn configurator(network: MockNetworkControl) -> Configurator<MockNetworkControl> {
        Configurator::new(WorkerPool::new(4), network, BootstrapSettings::default())
    }

    #[tokio::test]
    async fn test_install_coordination_writes_zoo_cfg() {
        let mut channel = MockRemoteChannel::new();
        channel
            .expect_execute()
            .withf(|cmd| cmd == "mkdir -p /var/lib/zookeeper")
            .times(1)
            .returning(|_| Ok(CommandOutput::success("")));
        channel
            .expect_write_file()
            .withf(|path, contents| path == "/opt/zookeeper/conf/zoo.cfg" && contents.contains("clientPort=2181"))
            .times(1)
            .returning(|_, _| Ok(()));

        let master = master_with(channel, &["INPUT"]);
        configurator(MockNetworkControl::new())
            .install_coordination(&master)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_monitor_port_only_when_missing() {
        let mut network = MockNetworkControl::new();
        network
            .expect_has_permission()
            .withf(|group, _| group == "INPUT")
            .returning(|_, _| Ok(true));
        network
            .expect_has_permission()
            .withf(|group, _| group == "accumulo-cluster")
            .returning(|_, _| Ok(false));
        network
            .expect_authorize()
            .withf(|group, rule| group == "accumulo-cluster" && rule.from_port == 50095 && rule.to_port == 50095)
            .times(1)
            .returning(|_, _| Ok(()));

        let master = master_with(MockRemoteChannel::new(), &["INPUT", "accumulo-cluster"]);
        let added = configurator(network).open_monitor_port(&master).await.unwrap();
        assert_eq!(added, 1);
    }

    #[tokio::test]
    async fn test_open_monitor_port_without_groups() {
        let mut network = MockNetworkControl::new();
        network.expect_has_permission().times(0);
        network.expect_authorize().times(0);

        let master = master_with(MockRemoteChannel::new(), &[]);
        assert_eq!(configurator(network).open_monitor_port(&master).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_firewall_error_propagates() {
        let mut network = MockNetworkControl::new();
        network
            .expect_has_permission()
            .returning(|group, _| Err(BootstrapError::firewall(group, "permission denied")));

        let master = master_with(MockRemoteChannel::new(), &["INPUT"]);
        let err = configurator(network).open_monitor_port(&master).await.unwrap_err();
        assert!(matches!(err, BootstrapError::Firewall { .. }));
    }

    #[tokio::test]
    async fn test_monitor_url() {
        let master = master_with(MockRemoteChannel::new(), &[]);
        assert_eq!(
            configurator(MockNetworkControl::new()).monitor_url(&master),
            "http://ec2-54-1-2-3.compute-1.amazonaws.com:50095"
        );
    }

    struct SlowChannel;

    #[async_trait::async_trait]
    impl RemoteChannel for SlowChannel {
        async fn execute(&self, _command: &str) -> BootstrapResult<CommandOutput> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(CommandOutput::success(""))
        }

        async fn write_file(&self, _path: &str, _contents: &str) -> BootstrapResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_master_step_timeout() {
        let node = Node::new("master", "10.0.0.1".parse().unwrap(), Arc::new(SlowChannel));
        let master = Master::new(node, "ec2-1.example.com", vec![]);
        let pool = WorkerPool::new(1).with_task_timeout(Some(Duration::from_millis(20)));
        let configurator = Configurator::new(pool, MockNetworkControl::new(), BootstrapSettings::default());

        let err = configurator.start_coordination(&master).await.unwrap_err();
        match err {
            BootstrapError::Timeout { operation, after } => {
                assert_eq!(operation, "/opt/zookeeper/bin/zkServer.sh start");
                assert_eq!(after, Duration::from_millis(20));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_pool_rejects_master_steps() {
        let mut channel = MockRemoteChannel::new();
        channel.expect_execute().times(0);

        let master = master_with(channel, &[]);
        let configurator = configurator(MockNetworkControl::new());
        configurator.pool().cancel();

        let err = configurator.start_storage(&master).await.unwrap_err();
        assert!(matches!(err, BootstrapError::Cancelled));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_configure_logs_monitor_url() {
        let mut channel = MockRemoteChannel::new();
        channel.expect_execute().returning(|_| Ok(CommandOutput::success("")));
        channel.expect_write_file().returning(|_, _| Ok(()));

        let mut network = MockNetworkControl::new();
        network.expect_has_permission().returning(|_, _| Ok(false));
        network.expect_authorize().times(1).returning(|_, _| Ok(()));

        let master = master_with(channel, &["INPUT"]);
        let nodes = vec![master.node().clone()];

        let report = configurator(network).configure(&master, &nodes).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.rules_added, 1);
        assert!(!report.storage_started);
        assert!(logs_contain(
            "Accumulo monitor page: http://ec2-54-1-2-3.compute-1.amazonaws.com:50095"
        ));
    }
}
