//! Scoring derived option sets by building and benchmarking them.

use async_trait::async_trait;
use bt_runner::{run_benchmark, BuildCache, BuildRequest, ProcessRunner};
use bt_types::{validation_error, BtResult, Catalog, MetricSelector, OptionSet, Task};
use std::sync::Arc;
use tracing::{debug, warn};

/// Expensive scoring of one option set. Lower is better.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, options: &OptionSet) -> BtResult<f64>;

    /// Name of the quantity being minimized, for reporting.
    fn metric(&self) -> &str {
        "score"
    }
}

/// Builds each task's configuration with the candidate options and sums the
/// per-benchmark minimum of the timing metric.
///
/// Taking the minimum of repeated samples suppresses run-to-run noise. If
/// any benchmark yields no samples at all, the score is `+inf`.
pub struct BenchmarkEvaluator {
    catalog: Arc<Catalog>,
    tasks: Vec<Task>,
    builds: Arc<BuildCache>,
    runner: ProcessRunner,
    selector: MetricSelector,
}

impl BenchmarkEvaluator {
    pub fn new(
        catalog: Arc<Catalog>,
        tasks: Vec<Task>,
        builds: Arc<BuildCache>,
        runner: ProcessRunner,
    ) -> BtResult<Self> {
        if tasks.is_empty() {
            return Err(validation_error!("at least one task is required"));
        }
        for task in &tasks {
            catalog.config(task.config_id)?;
            catalog.benchmark(task.benchmark_id)?;
        }

        Ok(Self {
            catalog,
            tasks,
            builds,
            runner,
            selector: MetricSelector::default(),
        })
    }

    pub fn with_selector(mut self, selector: MetricSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }
}

#[async_trait]
impl Evaluator for BenchmarkEvaluator {
    async fn evaluate(&self, options: &OptionSet) -> BtResult<f64> {
        let mut total = 0.0;

        for &task in &self.tasks {
            let config = self.catalog.config(task.config_id)?;
            let benchmark = self.catalog.benchmark(task.benchmark_id)?;

            let request =
                BuildRequest::for_config(config, benchmark.dimension).with_overrides(options);
            let artifact = self.builds.ensure_compiled(&request).await?;

            let result = run_benchmark(&self.runner, task, &artifact, benchmark).await?;
            match result.min_sample(&self.selector)? {
                Some(min) => {
                    debug!(task = %task, min, "benchmark scored");
                    total += min;
                }
                None => {
                    warn!(
                        task = %task,
                        metric = %self.selector.metric,
                        "no samples of metric, candidate is unscorable"
                    );
                    return Ok(f64::INFINITY);
                }
            }
        }

        Ok(total)
    }

    fn metric(&self) -> &str {
        &self.selector.metric
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use bt_runner::Builder;
    use bt_types::{BenchmarkDef, BtError, CatalogError, ConfigDef, ReporterSpec};
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    /// "Builds" a shell script printing two timing samples: `M + 5` and
    /// `M + n` for dataset `data<n>`.
    struct ScriptBuilder {
        dir: PathBuf,
    }

    #[async_trait]
    impl Builder for ScriptBuilder {
        async fn build(&self, request: &BuildRequest) -> BtResult<PathBuf> {
            let max: i64 = request
                .options
                .get("M")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let path = self
                .dir
                .join(format!("lib{}.so", request.key().artifact_stem()));
            let printf = "printf 'name\\tvalue\\nPAPI_REAL_NSEC\\t%s\\nPAPI_REAL_NSEC\\t%s\\n'";
            let script = format!("{printf} {} $(( {max} + ${{1#data}} ))\n", max + 5);
            std::fs::write(&path, script)?;
            Ok(path)
        }
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.add_config(ConfigDef {
            id: 1,
            index: "rtree".to_string(),
            options: BTreeMap::new(),
        });
        for id in [1, 3] {
            catalog.add_benchmark(BenchmarkDef {
                id,
                dataset: PathBuf::from(format!("data{id}")),
                dimension: 2,
                reporters: vec![ReporterSpec::new("papi", "1")],
            });
        }
        catalog
    }

    fn evaluator(dir: &Path, tasks: Vec<Task>) -> (BenchmarkEvaluator, Arc<BuildCache>) {
        let builds = Arc::new(BuildCache::new(Arc::new(ScriptBuilder {
            dir: dir.to_path_buf(),
        })));
        let evaluator = BenchmarkEvaluator::new(
            Arc::new(catalog()),
            tasks,
            builds.clone(),
            ProcessRunner::new("sh"),
        )
        .unwrap();
        (evaluator, builds)
    }

    fn options(max: i64) -> OptionSet {
        vec![("M".to_string(), max), ("m".to_string(), 2)]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn sums_per_benchmark_minimums() {
        let dir = tempfile::tempdir().unwrap();
        let (evaluator, builds) = evaluator(dir.path(), vec![Task::new(1, 1), Task::new(1, 3)]);

        // Benchmark 1: min(15, 11) = 11; benchmark 3: min(15, 13) = 13.
        let score = evaluator.evaluate(&options(10)).await.unwrap();
        assert_eq!(score, 24.0);

        // Same configuration and dimension: one build serves both benchmarks.
        assert_eq!(builds.stats().builds, 1);
        assert_eq!(builds.stats().reused, 1);

        evaluator.evaluate(&options(20)).await.unwrap();
        assert_eq!(builds.stats().builds, 2);
    }

    #[tokio::test]
    async fn missing_metric_scores_infinity() {
        let dir = tempfile::tempdir().unwrap();
        let (evaluator, _) = evaluator(dir.path(), vec![Task::new(1, 1)]);
        assert_eq!(evaluator.metric(), "PAPI_REAL_NSEC");
        let evaluator =
            evaluator.with_selector(MetricSelector::default().with_metric("PAPI_L1_DCM"));
        assert_eq!(evaluator.metric(), "PAPI_L1_DCM");

        let score = evaluator.evaluate(&options(10)).await.unwrap();
        assert!(score.is_infinite());
    }

    #[test]
    fn rejects_empty_or_unknown_tasks() {
        let builds = Arc::new(BuildCache::new(Arc::new(ScriptBuilder {
            dir: PathBuf::from("."),
        })));
        let catalog = Arc::new(catalog());

        let empty = BenchmarkEvaluator::new(
            catalog.clone(),
            Vec::new(),
            builds.clone(),
            ProcessRunner::new("sh"),
        );
        assert!(matches!(empty, Err(BtError::Validation(_))));

        let runner = ProcessRunner::new("sh");
        let unknown = BenchmarkEvaluator::new(catalog, vec![Task::new(1, 4)], builds, runner);
        assert!(matches!(
            unknown,
            Err(BtError::Catalog(CatalogError::BenchmarkNotFound { benchmark_id: 4 }))
        ));
    }
}
