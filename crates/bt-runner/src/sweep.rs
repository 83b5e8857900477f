//! Bulk benchmarking of many tasks without optimization.

use bt_types::{Catalog, ConfigId, Task};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::build::{BuildCache, BuildKey, BuildRequest};
use crate::executor::BenchmarkExecutor;
use crate::process::ProcessRunner;
use crate::scheduler::{SchedulerConfig, SweepEvent, TaskFailure, TaskScheduler};
use crate::sink::ResultSink;

/// A configuration that could not be built; its tasks were not run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildFailure {
    pub config_id: ConfigId,
    pub dimension: u32,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: Vec<TaskFailure>,
    pub build_failures: Vec<BuildFailure>,
}

/// Builds every configuration a task set needs, then runs the tasks through
/// a [`TaskScheduler`].
///
/// Builds happen before the pool starts, so no worker ever recompiles.
pub struct Sweep {
    catalog: Arc<Catalog>,
    builds: Arc<BuildCache>,
    runner: ProcessRunner,
    sink: Arc<dyn ResultSink>,
    config: SchedulerConfig,
    events: Option<Sender<SweepEvent>>,
}

impl Sweep {
    pub fn new(
        catalog: Arc<Catalog>,
        builds: Arc<BuildCache>,
        runner: ProcessRunner,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            catalog,
            builds,
            runner,
            sink,
            config: SchedulerConfig::default(),
            events: None,
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: Sender<SweepEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn run(&self, tasks: Vec<Task>) -> SweepSummary {
        let mut summary = SweepSummary {
            total: tasks.len(),
            ..Default::default()
        };

        // Group by build so each distinct build happens once.
        let mut groups: BTreeMap<BuildKey, (BuildRequest, Vec<Task>)> = BTreeMap::new();
        for task in tasks {
            let request = self.catalog.config(task.config_id).and_then(|config| {
                let benchmark = self.catalog.benchmark(task.benchmark_id)?;
                Ok(BuildRequest::for_config(config, benchmark.dimension))
            });

            match request {
                Ok(request) => {
                    groups
                        .entry(request.key())
                        .or_insert_with(|| (request, Vec::new()))
                        .1
                        .push(task);
                }
                Err(e) => {
                    error!(task = %task, error = %e, "task skipped");
                    summary.failed.push(TaskFailure {
                        task,
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut runnable = Vec::new();
        for (request, group) in groups.into_values() {
            match self.builds.ensure_compiled(&request).await {
                Ok(_) => runnable.extend(group),
                Err(e) => {
                    let error = e.to_string();
                    summary.build_failures.push(BuildFailure {
                        config_id: request.config_id,
                        dimension: request.dimension,
                        error: error.clone(),
                    });
                    summary
                        .failed
                        .extend(group.into_iter().map(|task| TaskFailure {
                            task,
                            error: error.clone(),
                        }));
                }
            }
        }
        runnable.sort();

        info!(
            runnable = runnable.len(),
            skipped = summary.failed.len(),
            "builds ready, starting benchmarks"
        );

        let executor = Arc::new(BenchmarkExecutor::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.builds),
            self.runner.clone(),
            Arc::clone(&self.sink),
        ));
        let mut scheduler = TaskScheduler::new(executor, self.config);
        if let Some(events) = &self.events {
            scheduler = scheduler.with_events(events.clone());
        }

        let schedule = scheduler.run(runnable).await;
        summary.completed = schedule.completed.len();
        summary.failed.extend(schedule.failed);
        summary
    }
}
