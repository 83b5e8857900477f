//! Running catalog tasks against built artifacts.

use async_trait::async_trait;
use bt_types::{BenchmarkDef, BtResult, Catalog, RunResult, Task};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::build::{BuildCache, BuildRequest};
use crate::process::{Invocation, ProcessRunner};
use crate::reporter::parse_reporter_output;
use crate::scheduler::TaskExecutor;
use crate::sink::ResultSink;

/// Run `benchmark` against `artifact` and parse its reporter blocks.
///
/// A crashed process is logged and whatever it printed is still parsed.
pub async fn run_benchmark(
    runner: &ProcessRunner,
    task: Task,
    artifact: &Path,
    benchmark: &BenchmarkDef,
) -> BtResult<RunResult> {
    let invocation = Invocation::new(
        artifact.display().to_string(),
        benchmark.dataset.clone(),
        benchmark.reporters.clone(),
    );

    let output = runner.run(&invocation).await?;
    if output.crashed() {
        warn!(
            task = %task,
            exit_code = ?output.exit_code,
            stderr = %output.stderr.trim(),
            "benchmark crashed, using partial output"
        );
    }

    let result = parse_reporter_output(&output.stdout, &benchmark.reporters)?;
    debug!(task = %task, records = result.record_count(), "benchmark output parsed");
    Ok(result)
}

/// [`TaskExecutor`] for sweeps: looks the task up in the catalog, runs it
/// against its (already built) artifact and forwards the result to a sink.
pub struct BenchmarkExecutor {
    catalog: Arc<Catalog>,
    builds: Arc<BuildCache>,
    runner: ProcessRunner,
    sink: Arc<dyn ResultSink>,
}

impl BenchmarkExecutor {
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
        }
    }

    pub async fn run_task(&self, task: Task) -> BtResult<RunResult> {
        let config = self.catalog.config(task.config_id)?;
        let benchmark = self.catalog.benchmark(task.benchmark_id)?;

        let request = BuildRequest::for_config(config, benchmark.dimension);
        let artifact = self.builds.ensure_compiled(&request).await?;

        run_benchmark(&self.runner, task, &artifact, benchmark).await
    }
}

#[async_trait]
impl TaskExecutor for BenchmarkExecutor {
    async fn execute(&self, task: Task) -> BtResult<()> {
        let result = self.run_task(task).await?;
        self.sink.record(&task, &result).await
    }
}
