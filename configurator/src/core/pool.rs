//! Bounded worker pool with per-phase counting barriers
//!
//! A [WorkerPool] owns a semaphore with a fixed number of permits and is
//! reused for every phase of a run. Each phase opens a [JobBatch], submits one
//! job per node and then calls [JobBatch::wait], which returns only after every
//! job of the batch has finished. Jobs that fail, time out, are cancelled or
//! panic still count towards the barrier; their failure is recorded in the
//! returned [JobOutcome] instead of being lost.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::{BootstrapError, BootstrapResult};
use crate::report::{JobFailure, JobOutcome};

/// The default number of concurrently executing jobs.
pub const DEFAULT_POOL_SIZE: usize = 20;

/// Fixed-size pool of execution slots shared by every batch created from it.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    max_workers: usize,
    task_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl Default for WorkerPool {
    fn default() -> Self {
        WorkerPool::new(DEFAULT_POOL_SIZE)
    }
}

impl WorkerPool {
    /// Creates a pool allowing `max_workers` jobs to run at once.
    ///
    /// A size of zero is treated as one.
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            task_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Deadline applied to each job once it holds a slot (fluent API)
    pub fn with_task_timeout(mut self, task_timeout: Option<Duration>) -> Self {
        self.task_timeout = task_timeout;
        self
    }

    /// Use an externally owned cancellation token (fluent API)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every queued and running job of every batch.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Open a new batch of jobs backed by this pool's slots.
    pub fn batch(&self) -> JobBatch {
        JobBatch {
            semaphore: Arc::clone(&self.semaphore),
            task_timeout: self.task_timeout,
            cancel: self.cancel.clone(),
            set: JoinSet::new(),
            job_ids: HashMap::new(),
            submitted: 0,
        }
    }
}

/// One round of submitted jobs and the barrier that closes it.
pub struct JobBatch {
    semaphore: Arc<Semaphore>,
    task_timeout: Option<Duration>,
    cancel: CancellationToken,
    set: JoinSet<(usize, JobOutcome)>,
    job_ids: HashMap<Id, (usize, String)>,
    submitted: usize,
}

impl JobBatch {
    /// Queue `job` under `job_id` without blocking the caller.
    ///
    /// The job starts as soon as a pool slot is free.
    pub fn submit<F>(&mut self, job_id: impl Into<String>, job: F)
    where
        F: Future<Output = BootstrapResult<()>> + Send + 'static,
    {
        let job_id = job_id.into();
        let seq = self.submitted;
        let semaphore = Arc::clone(&self.semaphore);
        let cancel = self.cancel.clone();
        let task_timeout = self.task_timeout;
        let outcome_id = job_id.clone();

        let handle = self.set.spawn(async move {
            let (result, elapsed) = run_job(semaphore, cancel, task_timeout, job).await;
            (
                seq,
                JobOutcome {
                    job_id: outcome_id,
                    result,
                    elapsed,
                },
            )
        });

        self.job_ids.insert(handle.id(), (seq, job_id));
        self.submitted += 1;
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Block until every submitted job has completed.
    ///
    /// Outcomes are returned in submission order. The batch is always fully
    /// drained before returning, so no job of this batch can overlap with work
    /// started afterwards. If `expected` differs from the number of submitted
    /// jobs the phase is incomplete and [BootstrapError::BarrierMismatch] is
    /// returned.
    pub async fn wait(mut self, expected: usize) -> BootstrapResult<Vec<JobOutcome>> {
        let mut outcomes = Vec::with_capacity(self.submitted);

        while let Some(joined) = self.set.join_next_with_id().await {
            match joined {
                Ok((_, (seq, outcome))) => outcomes.push((seq, outcome)),
                Err(err) => {
                    let (seq, job_id) = self
                        .job_ids
                        .remove(&err.id())
                        .unwrap_or((usize::MAX, String::from("unknown")));
                    let failure = if err.is_panic() {
                        JobFailure::Panicked(panic_message(err.into_panic()))
                    } else {
                        JobFailure::Cancelled
                    };
                    outcomes.push((
                        seq,
                        JobOutcome {
                            job_id,
                            result: Err(failure),
                            elapsed: Duration::ZERO,
                        },
                    ));
                }
            }
        }

        if self.submitted != expected {
            return Err(BootstrapError::BarrierMismatch {
                expected,
                submitted: self.submitted,
            });
        }

        outcomes.sort_by_key(|(seq, _)| *seq);
        Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
    }
}

async fn run_job<F>(
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    task_timeout: Option<Duration>,
    job: F,
) -> (Result<(), JobFailure>, Duration)
where
    F: Future<Output = BootstrapResult<()>> + Send + 'static,
{
    // Hold onto the permit until the job finishes executing
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return (Err(JobFailure::Cancelled), Duration::ZERO),
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return (Err(JobFailure::Cancelled), Duration::ZERO),
        },
    };

    let started = Instant::now();
    let bounded = async {
        match task_timeout {
            Some(limit) => match tokio::time::timeout(limit, job).await {
                Ok(result) => result.map_err(|e| JobFailure::Failed(e.to_string())),
                Err(_) => Err(JobFailure::TimedOut(limit)),
            },
            None => job.await.map_err(|e| JobFailure::Failed(e.to_string())),
        }
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(JobFailure::Cancelled),
        result = bounded => result,
    };

    (result, started.elapsed())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("non-string panic payload")
    }
}
