//! # bt-runner
//!
//! Execution side of BenchTune: launching the external benchmark, parsing its
//! reporter output, compiling configurations once per run, and running many
//! benchmark tasks with bounded parallelism.

mod build;
mod executor;
mod process;
mod reporter;
mod scheduler;
mod sink;
mod sweep;

pub use build::{
    BuildCache, BuildKey, BuildRequest, BuildStats, Builder, CmakeBuilder, CmakeBuilderConfig,
};
pub use executor::{run_benchmark, BenchmarkExecutor};
pub use process::{Invocation, ProcessOutput, ProcessRunner};
pub use reporter::parse_reporter_output;
pub use scheduler::{
    ScheduleSummary, SchedulerConfig, SweepEvent, TaskExecutor, TaskFailure, TaskScheduler,
};
pub use sink::{source_commit, JsonLinesSink, MemorySink, ResultSink, RunRecord};
pub use sweep::{BuildFailure, Sweep, SweepSummary};
