//! Test helpers and in-memory collaborators for configurator tests
//!
//! [RecordingChannel] keeps a per-node file map and appends every remote
//! effect to a cluster-wide [EventLog] with start and finish instants, so
//! tests can check ordering across nodes. [FakeNetwork] is a security group
//! registry that only ever grows.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use configurator::{
    BootstrapError, BootstrapResult, BootstrapSettings, CommandOutput, Configurator, Master, NetworkControl, Node,
    PhaseKind, RemoteChannel, WorkerPool,
};
use shared::PortRule;

use super::fixtures::TestFixtures;

/// What a remote effect did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Write { path: String },
    Execute { command: String },
}

/// One recorded remote effect
#[derive(Debug, Clone)]
pub struct Event {
    pub node: String,
    pub action: Action,
    pub started: Instant,
    pub finished: Instant,
}

impl Event {
    /// Fan-out phase this effect belongs to, `None` for master-only steps
    pub fn phase(&self) -> Option<PhaseKind> {
        let settings = TestFixtures::settings();
        match &self.action {
            Action::Write { path } if *path == settings.env_file_path() => Some(PhaseKind::Env),
            Action::Write { path } if *path == settings.site_file_path() => Some(PhaseKind::Site),
            Action::Write { path } if *path == settings.masters_file_path() => Some(PhaseKind::Masters),
            Action::Write { path } if *path == settings.workers_file_path() => Some(PhaseKind::Workers),
            Action::Execute { command } if settings.copy_files_commands().contains(command) => {
                Some(PhaseKind::CopyFiles)
            }
            _ => None,
        }
    }
}

/// Cluster-wide ordered record of remote effects
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl EventLog {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Instant {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Instant::now()
    }

    fn leave(&self, node: &str, action: Action, started: Instant) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(Event {
            node: node.to_string(),
            action,
            started,
            finished: Instant::now(),
        });
    }

    /// Events of the given node, in completion order
    pub fn for_node(&self, node: &str) -> Vec<Event> {
        self.events().into_iter().filter(|e| e.node == node).collect()
    }
}

/// In-memory [RemoteChannel] for a single node
pub struct RecordingChannel {
    node: String,
    log: EventLog,
    files: Mutex<HashMap<String, String>>,
    delay: Duration,
    fail_on: Option<String>,
}

impl RecordingChannel {
    pub fn new(node: impl Into<String>, log: EventLog) -> Self {
        Self {
            node: node.into(),
            log,
            files: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            fail_on: None,
        }
    }

    /// Sleep this long inside every call (fluent API)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every write or command whose target contains `needle` (fluent API)
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on = Some(needle.into());
        self
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    fn should_fail(&self, target: &str) -> bool {
        self.fail_on.as_deref().is_some_and(|needle| target.contains(needle))
    }
}

#[async_trait]
impl RemoteChannel for RecordingChannel {
    async fn execute(&self, command: &str) -> BootstrapResult<CommandOutput> {
        let started = self.log.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failed = self.should_fail(command);
        self.log.leave(
            &self.node,
            Action::Execute {
                command: command.to_string(),
            },
            started,
        );

        if failed {
            return Err(BootstrapError::RemoteCommand {
                node: self.node.clone(),
                command: command.to_string(),
                exit_code: Some(1),
                stderr: "simulated failure".to_string(),
            });
        }
        Ok(CommandOutput::success(""))
    }

    async fn write_file(&self, path: &str, contents: &str) -> BootstrapResult<()> {
        let started = self.log.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failed = self.should_fail(path);
        if !failed {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), contents.to_string());
        }
        self.log.leave(&self.node, Action::Write { path: path.to_string() }, started);

        if failed {
            return Err(BootstrapError::FileWrite {
                node: self.node.clone(),
                path: path.to_string(),
                message: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Security group registry: group name to permitted rules
#[derive(Clone, Default)]
pub struct FakeNetwork {
    groups: Arc<Mutex<HashMap<String, Vec<PortRule>>>>,
    authorizations: Arc<AtomicUsize>,
}

impl FakeNetwork {
    pub fn rules(&self, group: &str) -> Vec<PortRule> {
        self.groups.lock().unwrap().get(group).cloned().unwrap_or_default()
    }

    pub fn authorizations(&self) -> usize {
        self.authorizations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkControl for FakeNetwork {
    async fn has_permission(&self, group: &str, rule: &PortRule) -> BootstrapResult<bool> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .get(group)
            .is_some_and(|rules| rules.contains(rule)))
    }

    async fn authorize(&self, group: &str, rule: &PortRule) -> BootstrapResult<()> {
        self.authorizations.fetch_add(1, Ordering::SeqCst);
        self.groups
            .lock()
            .unwrap()
            .entry(group.to_string())
            .or_default()
            .push(rule.clone());
        Ok(())
    }
}

/// A master, its workers, and direct handles to every node's channel
pub struct TestCluster {
    pub master: Master,
    pub nodes: Vec<Node>,
    pub channels: HashMap<String, Arc<RecordingChannel>>,
    pub log: EventLog,
    pub network: FakeNetwork,
}

impl TestCluster {
    pub fn channel(&self, alias: &str) -> &RecordingChannel {
        &self.channels[alias]
    }

    pub fn worker_addresses(&self) -> Vec<IpAddr> {
        self.nodes
            .iter()
            .skip(1)
            .map(Node::private_address)
            .collect()
    }

    pub fn configurator(&self, pool_size: usize) -> Configurator<FakeNetwork> {
        self.configurator_with(pool_size, TestFixtures::settings())
    }

    pub fn configurator_with(&self, pool_size: usize, settings: BootstrapSettings) -> Configurator<FakeNetwork> {
        Configurator::new(WorkerPool::new(pool_size), self.network.clone(), settings)
    }
}

/// Builder for test clusters with sensible defaults
pub struct ClusterBuilder {
    workers: usize,
    delay: Duration,
    failing: HashMap<String, String>,
}

impl ClusterBuilder {
    /// One master plus two workers, no delays, no failures
    pub fn new() -> Self {
        Self {
            workers: 2,
            delay: Duration::ZERO,
            failing: HashMap::new(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make `alias` fail on any target containing `needle`
    pub fn failing(mut self, alias: &str, needle: &str) -> Self {
        self.failing.insert(alias.to_string(), needle.to_string());
        self
    }

    pub fn build(self) -> TestCluster {
        let log = EventLog::default();
        let mut channels = HashMap::new();
        let mut nodes = Vec::new();

        let mut hosts = vec![(TestFixtures::MASTER_ALIAS.to_string(), TestFixtures::master_address())];
        hosts.extend(TestFixtures::workers(self.workers));

        for (alias, address) in hosts {
            let mut channel = RecordingChannel::new(alias.clone(), log.clone()).with_delay(self.delay);
            if let Some(needle) = self.failing.get(&alias) {
                channel = channel.failing_on(needle.clone());
            }
            let channel = Arc::new(channel);
            channels.insert(alias.clone(), Arc::clone(&channel));
            nodes.push(Node::new(alias, address, channel));
        }

        let master = Master::new(
            nodes[0].clone(),
            TestFixtures::MASTER_DNS,
            vec![TestFixtures::MASTER_GROUP.to_string()],
        );

        TestCluster {
            master,
            nodes,
            channels,
            log,
            network: FakeNetwork::default(),
        }
    }
}

/// Assert that no effect of a phase started before every effect of the
/// previous phase had finished
pub fn assert_phases_sequential(events: &[Event]) {
    for pair in PhaseKind::ALL.windows(2) {
        let (earlier, later) = (pair[0], pair[1]);
        let earlier_end = events
            .iter()
            .filter(|e| e.phase() == Some(earlier))
            .map(|e| e.finished)
            .max();
        let later_start = events
            .iter()
            .filter(|e| e.phase() == Some(later))
            .map(|e| e.started)
            .min();

        if let (Some(end), Some(start)) = (earlier_end, later_start) {
            assert!(end <= start, "phase {later} started before phase {earlier} finished");
        }
    }
}
