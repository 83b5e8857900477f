//! Bounded-concurrency execution of benchmark tasks.
//!
//! A fixed number of workers pull tasks from a shared pending list and run
//! each to completion before pulling the next, so at most `concurrency`
//! tasks are ever in flight. Failures are recorded and never retried.

use async_trait::async_trait;
use bt_types::{BtResult, Task};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Runs a single task. Implementations do their own I/O waiting.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    async fn execute(&self, task: Task) -> BtResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of tasks in flight. Values below 1 are treated as 1.
    pub concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

impl SchedulerConfig {
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }
}

/// Progress notifications emitted while a schedule runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SweepEvent {
    Started {
        total: usize,
        workers: usize,
    },
    TaskStarted {
        task: Task,
        worker: usize,
    },
    TaskCompleted {
        task: Task,
        finished: usize,
        total: usize,
    },
    TaskFailed {
        task: Task,
        error: String,
        finished: usize,
        total: usize,
    },
    Finished {
        completed: usize,
        failed: usize,
    },
}

/// A task that did not complete successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task: Task,
    pub error: String,
}

/// Outcome of a whole schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub total: usize,
    pub completed: Vec<Task>,
    pub failed: Vec<TaskFailure>,
}

impl ScheduleSummary {
    pub fn finished(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

/// Executes a set of tasks with bounded parallelism.
pub struct TaskScheduler<E: TaskExecutor> {
    executor: Arc<E>,
    config: SchedulerConfig,
    events: Option<Sender<SweepEvent>>,
}

impl<E: TaskExecutor> TaskScheduler<E> {
    pub fn new(executor: Arc<E>, config: SchedulerConfig) -> Self {
        Self {
            executor,
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Sender<SweepEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run every task exactly once and wait until all have finished.
    ///
    /// Tasks are taken from the end of `tasks`, which makes the launch order
    /// deterministic for a given input.
    pub async fn run(&self, tasks: Vec<Task>) -> ScheduleSummary {
        let total = tasks.len();
        let workers = self.config.concurrency.max(1).min(total);

        info!(total, workers, "starting task schedule");
        emit(&self.events, SweepEvent::Started { total, workers });

        let pending = Arc::new(Mutex::new(tasks));
        let summary = Arc::new(Mutex::new(ScheduleSummary {
            total,
            ..Default::default()
        }));

        let mut set = JoinSet::new();
        for worker in 0..workers {
            let pending = Arc::clone(&pending);
            let summary = Arc::clone(&summary);
            let executor = Arc::clone(&self.executor);
            let events = self.events.clone();

            set.spawn(async move {
                loop {
                    let next = pending.lock().pop();
                    let Some(task) = next else { break };

                    emit(&events, SweepEvent::TaskStarted { task, worker });
                    let result = executor.execute(task).await;

                    let mut progress = summary.lock();
                    match result {
                        Ok(()) => {
                            progress.completed.push(task);
                            let finished = progress.finished();
                            info!(task = %task, "completed {finished}/{total}");
                            emit(
                                &events,
                                SweepEvent::TaskCompleted {
                                    task,
                                    finished,
                                    total,
                                },
                            );
                        }
                        Err(e) => {
                            let error = e.to_string();
                            progress.failed.push(TaskFailure {
                                task,
                                error: error.clone(),
                            });
                            let finished = progress.finished();
                            warn!(task = %task, error = %error, "task failed ({finished}/{total})");
                            emit(
                                &events,
                                SweepEvent::TaskFailed {
                                    task,
                                    error,
                                    finished,
                                    total,
                                },
                            );
                        }
                    }
                }
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "scheduler worker terminated abnormally");
            }
        }

        // Only reachable when every worker died: account for the leftovers.
        let leftovers: Vec<Task> = pending.lock().drain(..).collect();
        let mut summary = summary.lock().clone();
        for task in leftovers {
            summary.failed.push(TaskFailure {
                task,
                error: "no worker left to run task".to_string(),
            });
        }

        info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            "task schedule finished"
        );
        emit(
            &self.events,
            SweepEvent::Finished {
                completed: summary.completed.len(),
                failed: summary.failed.len(),
            },
        );

        summary
    }
}

fn emit(events: &Option<Sender<SweepEvent>>, event: SweepEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is listening any more.
        let _ = tx.send(event);
    }
}
