//! # bt-optimizer
//!
//! Parameter search for BenchTune.
//!
//! Candidate points are checked against domain rules and user restrictions,
//! converted into build options, scored by building and benchmarking them
//! (memoized per point), and explored with simulated annealing.

mod annealer;
mod cache;
mod deriver;
mod evaluator;
mod restriction;
mod validator;

pub use annealer::{
    acceptance_probability, AnnealConfig, AnnealEvent, AnnealOutcome, AnnealState, Annealer, Step,
};
pub use cache::{CacheStats, EvaluationCache};
pub use deriver::{absolute_min_fill, OptionDeriver};
pub use evaluator::{BenchmarkEvaluator, Evaluator};
pub use restriction::Restriction;
pub use validator::{DomainNames, ParameterSpaceValidator, MAX_MIN_FILL_PERCENT, MIN_MAX_ENTRIES};
