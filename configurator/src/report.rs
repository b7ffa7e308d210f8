//! Per-job, per-phase and per-run outcome reporting

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use shared::RunId;

/// The fan-out phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseKind {
    Env,
    Site,
    Masters,
    Workers,
    CopyFiles,
}

impl PhaseKind {
    pub const ALL: [PhaseKind; 5] = [
        PhaseKind::Env,
        PhaseKind::Site,
        PhaseKind::Masters,
        PhaseKind::Workers,
        PhaseKind::CopyFiles,
    ];

    /// Progress message logged when the phase starts
    pub fn description(&self) -> &'static str {
        match self {
            PhaseKind::Env => "Configuring Accumulo Env...",
            PhaseKind::Site => "Configuring Accumulo Site...",
            PhaseKind::Masters => "Configuring masters file...",
            PhaseKind::Workers => "Configuring slaves file...",
            PhaseKind::CopyFiles => "Additional configuration (logging and monitoring)...",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseKind::Env => "env",
            PhaseKind::Site => "site",
            PhaseKind::Masters => "masters",
            PhaseKind::Workers => "workers",
            PhaseKind::CopyFiles => "copy-files",
        };
        f.write_str(name)
    }
}

/// Why a single job did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum JobFailure {
    /// The job returned an error
    Failed(String),
    /// The job exceeded the per-task deadline
    TimedOut(Duration),
    /// The pool's cancellation token fired before the job finished
    Cancelled,
    /// The job panicked
    Panicked(String),
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFailure::Failed(message) => write!(f, "failed: {message}"),
            JobFailure::TimedOut(after) => write!(f, "timed out after {after:?}"),
            JobFailure::Cancelled => f.write_str("cancelled"),
            JobFailure::Panicked(message) => write!(f, "panicked: {message}"),
        }
    }
}

/// Completion record for one submitted job
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub result: Result<(), JobFailure>,
    pub elapsed: Duration,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregate of every job in one phase
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: PhaseKind,
    pub outcomes: Vec<JobOutcome>,
}

impl PhaseReport {
    pub fn new(phase: PhaseKind, outcomes: Vec<JobOutcome>) -> Self {
        Self { phase, outcomes }
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.job_id.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<(&str, &JobFailure)> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.result {
                Ok(()) => None,
                Err(failure) => Some((o.job_id.as_str(), failure)),
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(JobOutcome::is_success)
    }
}

/// Everything a configuration run did
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub phases: Vec<PhaseReport>,
    pub storage_started: bool,
    pub rules_added: usize,
    pub monitor_url: Option<String>,
}

impl RunReport {
    /// True when every job in every phase succeeded
    pub fn is_complete(&self) -> bool {
        self.phases.iter().all(PhaseReport::is_complete)
    }

    pub fn phase(&self, kind: PhaseKind) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == kind)
    }

    /// Aliases of nodes that failed in at least one phase, in first-seen order
    pub fn failed_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = Vec::new();
        for phase in &self.phases {
            for (node, _) in phase.failed() {
                if !nodes.iter().any(|n| n == node) {
                    nodes.push(node.to_string());
                }
            }
        }
        nodes
    }
}
