use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Benchmark sweeps and parameter optimization for spatial index builds.
#[derive(Parser, Debug)]
#[command(name = "benchtune", version, about)]
pub struct CliArgs {
    /// Catalog of configurations, benchmarks and suites (JSON)
    #[arg(long, env = "BENCHTUNE_CATALOG", default_value = "catalog.json", global = true)]
    pub catalog: PathBuf,

    /// Out-of-source build directory
    #[arg(long, env = "BENCHTUNE_BUILD_DIR", default_value = "build", global = true)]
    pub build_dir: PathBuf,

    /// Source directory passed to cmake, relative to the build directory
    #[arg(long, env = "BENCHTUNE_SOURCE_DIR", default_value = "..", global = true)]
    pub source_dir: PathBuf,

    /// Benchmark driver executable
    #[arg(long, env = "BENCHTUNE_BENCH", default_value = "build/bench", global = true)]
    pub bench: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build and benchmark every task, recording each run
    Sweep(SweepArgs),
    /// Search tuning parameters minimizing the summed runtime of tasks
    Optimize(OptimizeArgs),
}

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Tasks as <config>:<benchmark>, or a suite id
    #[arg(required = true, value_name = "TASK")]
    pub tasks: Vec<String>,

    /// Benchmarks run in parallel
    #[arg(long, short = 'j', env = "BENCHTUNE_JOBS", default_value_t = 1)]
    pub jobs: usize,

    /// File receiving one JSON line per run
    #[arg(long, short = 'o', default_value = "results.jsonl")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct OptimizeArgs {
    /// Tasks to optimize for, as <config>:<benchmark> or a suite id
    #[arg(long = "task", short = 't', required = true, value_name = "TASK")]
    pub tasks: Vec<String>,

    /// Parameters to search and their start values, as <name>:<value>
    #[arg(required = true, value_name = "PARAM")]
    pub params: Vec<String>,

    /// Boolean restrictions over the parameters, e.g. "M % 2 == 0"
    #[arg(long = "restriction", short = 'r', value_name = "EXPR")]
    pub restrictions: Vec<String>,

    /// Reporter metric minimized
    #[arg(long, default_value = "PAPI_REAL_NSEC")]
    pub metric: String,

    /// Temperature decay per iteration
    #[arg(long, default_value_t = 0.97)]
    pub decay: f64,

    /// Consecutive rejections before stopping
    #[arg(long, default_value_t = 20)]
    pub max_unsuccessful: u32,

    /// Invalid neighbors drawn before an iteration gives up
    #[arg(long, default_value_t = 1000)]
    pub max_resample_attempts: u32,

    /// Stop after this many iterations even if not converged
    #[arg(long)]
    pub max_iterations: Option<u64>,

    /// Seed for a reproducible search
    #[arg(long)]
    pub seed: Option<u64>,
}
