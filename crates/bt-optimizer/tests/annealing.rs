use async_trait::async_trait;
use bt_optimizer::{
    AnnealConfig, AnnealEvent, Annealer, BenchmarkEvaluator, EvaluationCache, Evaluator,
    OptionDeriver, ParameterSpaceValidator, Step,
};
use bt_types::{BtResult, OptionSet, ParameterPoint};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Deterministic score: sum of the derived `M` and `m`.
#[derive(Default)]
struct SumEvaluator {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Evaluator for SumEvaluator {
    async fn evaluate(&self, options: &OptionSet) -> BtResult<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let max = options.get("M").unwrap_or_default();
        let min = options.get("m").unwrap_or_default();
        Ok((max + min) as f64)
    }
}

fn start() -> ParameterPoint {
    ParameterPoint::new().with("M", 50).with("m", 40)
}

#[tokio::test]
async fn finds_no_worse_than_start_and_stays_valid() {
    let deriver = OptionDeriver::new();
    let start_score = {
        let options = deriver.derive(&start());
        (options.get("M").unwrap() + options.get("m").unwrap()) as f64
    };
    assert_eq!(start_score, 70.0);

    for seed in 0..5 {
        let validator = ParameterSpaceValidator::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut annealer = Annealer::new(
            EvaluationCache::new(SumEvaluator::default(), OptionDeriver::new()),
            validator.clone(),
        )
        .with_config(AnnealConfig::default().with_seed(seed))
        .with_events(tx);

        let outcome = annealer.run(start()).await.unwrap();

        assert!(outcome.best.score <= start_score);
        assert!(validator.is_valid(&outcome.best.point));
        assert!(outcome.iterations >= 20);

        // The best score reported along the way never increases.
        let mut best = start_score;
        for event in rx.try_iter() {
            if let AnnealEvent::Iteration {
                candidate: Some(candidate),
                step: Step::Accepted { new_best: true, .. },
                ..
            } = event
            {
                assert!(candidate.score < best);
                assert!(validator.is_valid(&candidate.point));
                best = candidate.score;
            }
        }
        assert_eq!(best, outcome.best.score);
    }
}

#[tokio::test]
async fn restrictions_bound_the_search() {
    let validator = ParameterSpaceValidator::new()
        .with_restrictions(&["M % 2 == 0", "M >= 10"])
        .unwrap();
    let mut annealer = Annealer::new(
        EvaluationCache::new(SumEvaluator::default(), OptionDeriver::new()),
        validator.clone(),
    )
    .with_config(AnnealConfig::default().with_seed(7));

    let outcome = annealer.run(start()).await.unwrap();

    let best_max = outcome.best.point.get("M").unwrap();
    assert!(best_max >= 10);
    assert_eq!(best_max % 2, 0);
    assert!(outcome.best.score <= 70.0);
}

#[tokio::test]
async fn repeated_points_are_not_reevaluated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let evaluator = SumEvaluator {
        calls: calls.clone(),
    };
    // Only 25 points satisfy the restrictions.
    let validator = ParameterSpaceValidator::new()
        .with_restrictions(&["48 <= M <= 52", "38 <= m <= 42"])
        .unwrap();
    let cache = EvaluationCache::new(evaluator, OptionDeriver::new());
    let mut annealer = Annealer::new(cache, validator)
        .with_config(AnnealConfig::default().with_seed(5).with_max_iterations(200));

    let outcome = annealer.run(start()).await.unwrap();

    let distinct = calls.load(Ordering::SeqCst) as u64;
    assert!(distinct <= 25);
    assert_eq!(outcome.cache.misses, distinct);
    assert!(outcome.cache.hits > 0);
}

#[cfg(unix)]
mod benchmarked {
    use super::*;
    use bt_runner::{BuildCache, BuildRequest, Builder, ProcessRunner};
    use bt_types::{BenchmarkDef, Catalog, ConfigDef, ReporterSpec, Task};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    /// Produces a script reporting two samples, `M + m + 3` and `M + m`.
    struct ScriptBuilder {
        dir: PathBuf,
    }

    #[async_trait]
    impl Builder for ScriptBuilder {
        async fn build(&self, request: &BuildRequest) -> BtResult<PathBuf> {
            let value = |name: &str| -> i64 {
                request
                    .options
                    .get(name)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_default()
            };
            let time = value("M") + value("m");
            let path = self
                .dir
                .join(format!("lib{}.so", request.key().artifact_stem()));
            std::fs::write(
                &path,
                format!(
                    "printf 'name\\tvalue\\nPAPI_REAL_NSEC\\t{}\\nPAPI_REAL_NSEC\\t{time}\\n'\n",
                    time + 3
                ),
            )?;
            Ok(path)
        }
    }

    #[tokio::test]
    async fn anneals_through_builds_and_benchmark_runs() {
        let dir = tempfile::tempdir().unwrap();

        let mut catalog = Catalog::new();
        catalog.add_config(ConfigDef {
            id: 4,
            index: "rtree".to_string(),
            options: BTreeMap::from([("M".to_string(), serde_json::json!(16))]),
        });
        catalog.add_benchmark(BenchmarkDef {
            id: 8,
            dataset: PathBuf::from("uniform"),
            dimension: 3,
            reporters: vec![ReporterSpec::new("papi", "1")],
        });

        let builds = Arc::new(BuildCache::new(Arc::new(ScriptBuilder {
            dir: dir.path().to_path_buf(),
        })));
        let evaluator = BenchmarkEvaluator::new(
            Arc::new(catalog),
            vec![Task::new(4, 8)],
            builds.clone(),
            ProcessRunner::new("sh"),
        )
        .unwrap();

        let mut annealer = Annealer::new(
            EvaluationCache::new(evaluator, OptionDeriver::new()),
            ParameterSpaceValidator::new(),
        )
        .with_config(AnnealConfig::default().with_seed(9).with_max_iterations(12));

        let outcome = annealer.run(start()).await.unwrap();

        assert!(outcome.best.score <= 70.0);
        // Distinct points can derive identical options and share a build.
        assert!(builds.stats().builds >= 1);
        assert!(builds.stats().builds <= outcome.cache.misses);
        assert_eq!(builds.stats().failures, 0);
    }
}
