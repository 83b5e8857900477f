mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use bt_optimizer::{
    AnnealConfig, Annealer, BenchmarkEvaluator, EvaluationCache, OptionDeriver,
    ParameterSpaceValidator,
};
use bt_runner::{
    source_commit, BuildCache, CmakeBuilder, CmakeBuilderConfig, JsonLinesSink, ProcessRunner,
    SchedulerConfig, Sweep,
};
use bt_types::{Catalog, MetricSelector, ParameterPoint};

use crate::cli::{CliArgs, Command, OptimizeArgs, SweepArgs};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let catalog = Catalog::load(&args.catalog)
        .with_context(|| format!("failed to load catalog {}", args.catalog.display()))?;
    let catalog = Arc::new(catalog);

    let builder = CmakeBuilder::new(
        CmakeBuilderConfig::default()
            .with_build_dir(&args.build_dir)
            .with_source_dir(&args.source_dir),
    );
    let builds = Arc::new(BuildCache::new(Arc::new(builder)));
    let runner = ProcessRunner::new(&args.bench);

    match args.command {
        Command::Sweep(sweep) => {
            let commit = source_commit(&args.build_dir.join(&args.source_dir)).await;
            run_sweep(catalog, builds, runner, commit, sweep).await
        }
        Command::Optimize(optimize) => run_optimize(catalog, builds, runner, optimize).await,
    }
}

async fn run_sweep(
    catalog: Arc<Catalog>,
    builds: Arc<BuildCache>,
    runner: ProcessRunner,
    commit: Option<String>,
    args: SweepArgs,
) -> Result<()> {
    let tasks = catalog
        .expand_tasks(&args.tasks)
        .context("invalid task arguments")?;
    let sink = JsonLinesSink::open(&args.output)
        .await
        .with_context(|| format!("failed to open {}", args.output.display()))?
        .with_commit(commit.clone());

    info!(
        tasks = tasks.len(),
        jobs = args.jobs,
        output = %args.output.display(),
        commit = commit.as_deref().unwrap_or("unknown"),
        "starting sweep"
    );

    let summary = Sweep::new(catalog, builds, runner, Arc::new(sink))
        .with_config(SchedulerConfig::default().with_concurrency(args.jobs))
        .run(tasks)
        .await;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !summary.failed.is_empty() {
        anyhow::bail!(
            "{} of {} tasks failed",
            summary.failed.len(),
            summary.total
        );
    }
    Ok(())
}

async fn run_optimize(
    catalog: Arc<Catalog>,
    builds: Arc<BuildCache>,
    runner: ProcessRunner,
    args: OptimizeArgs,
) -> Result<()> {
    let tasks = catalog
        .expand_tasks(&args.tasks)
        .context("invalid task arguments")?;
    let start =
        ParameterPoint::parse_assignments(&args.params).context("invalid parameter arguments")?;
    let validator = ParameterSpaceValidator::new()
        .with_restrictions(&args.restrictions)
        .context("invalid restriction")?;

    let evaluator = BenchmarkEvaluator::new(catalog, tasks, builds, runner)?
        .with_selector(MetricSelector::default().with_metric(&args.metric));

    let mut config = AnnealConfig::default()
        .with_decay(args.decay)
        .with_max_unsuccessful(args.max_unsuccessful)
        .with_max_resample_attempts(args.max_resample_attempts);
    config.max_iterations = args.max_iterations;
    config.seed = args.seed;

    let cache = EvaluationCache::new(evaluator, OptionDeriver::new());
    let mut annealer = Annealer::new(cache, validator).with_config(config);

    let outcome = match annealer.run(start).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(best) = annealer.best_so_far() {
                error!(point = %best.point, score = best.score, "best point before failure");
                println!("{}", serde_json::to_string_pretty(best)?);
            }
            return Err(e).context("optimization failed");
        }
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
