use thiserror::Error;

/// Main error type for the BenchTune system
#[derive(Error, Debug)]
pub enum BtError {
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors raised while compiling a configuration
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Failed to launch build step `{step}`: {message}")]
    LaunchFailed { step: String, message: String },

    #[error("Build step `{step}` failed for config {config_id} with exit code {exit_code:?}")]
    StepFailed {
        config_id: u64,
        step: String,
        exit_code: Option<i32>,
    },

    #[error("Build artifact missing for config {config_id}: {path}")]
    ArtifactMissing { config_id: u64, path: String },
}

/// Errors raised while launching a benchmark process
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn {executable}: {message}")]
    SpawnFailed { executable: String, message: String },

    #[error("Failed to collect output of {executable}: {message}")]
    OutputFailed { executable: String, message: String },
}

/// Errors raised while parsing reporter output
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Reporter {reporter}: record {line} has {found} fields, header has {expected}")]
    FieldCountMismatch {
        reporter: String,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Output has {found} reporter blocks but only {expected} reporters were requested")]
    UnexpectedBlocks { expected: usize, found: usize },

    #[error("Reporter {reporter}: field `{field}` value `{value}` is not numeric")]
    NotNumeric {
        reporter: String,
        field: String,
        value: String,
    },

    #[error("Malformed reporter output: {message}")]
    Malformed { message: String },

    #[error("Invalid reporter specification `{spec}`: expected <name>:<arguments>")]
    InvalidSpec { spec: String },
}

impl From<csv::Error> for ReportError {
    fn from(err: csv::Error) -> Self {
        ReportError::Malformed {
            message: err.to_string(),
        }
    }
}

/// Errors raised by the parameter search
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Restriction `{expression}` could not be parsed: {message}")]
    InvalidRestriction { expression: String, message: String },

    #[error("Restriction `{expression}` could not be evaluated: {message}")]
    RestrictionEvaluation { expression: String, message: String },

    #[error("Invalid parameter specification `{spec}`: expected <name>:<start value>")]
    InvalidParameter { spec: String },

    #[error("Start point {point} is rejected by the parameter space constraints")]
    InvalidStart { point: String },

    #[error("Start point {point} produced no samples of metric {metric}")]
    UnscorableStart { point: String, metric: String },

    #[error("Nothing to optimize: {message}")]
    Empty { message: String },
}

/// Errors raised by catalog lookups
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Config not found: {config_id}")]
    ConfigNotFound { config_id: u64 },

    #[error("Benchmark not found: {benchmark_id}")]
    BenchmarkNotFound { benchmark_id: u64 },

    #[error("Suite not found: {suite_id}")]
    SuiteNotFound { suite_id: u64 },

    #[error("Invalid task specification `{spec}`: expected <config>:<benchmark> or a suite id")]
    InvalidTask { spec: String },
}

/// Result type alias for BenchTune operations
pub type BtResult<T> = Result<T, BtError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::BtError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::BtError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::BtError::Config(format!($($arg)*))
    };
}
