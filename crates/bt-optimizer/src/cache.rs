//! Memoized scoring of parameter points.

use bt_types::{BtResult, CanonicalKey, ParameterPoint};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::deriver::OptionDeriver;
use crate::evaluator::Evaluator;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

/// Scores parameter points, running the evaluator at most once per distinct
/// point.
///
/// Entries are keyed by the point's [`CanonicalKey`] and compared by full
/// string equality. Nothing is ever evicted during a run.
pub struct EvaluationCache<E: Evaluator> {
    evaluator: E,
    deriver: OptionDeriver,
    scores: HashMap<CanonicalKey, f64>,
    stats: CacheStats,
}

impl<E: Evaluator> EvaluationCache<E> {
    pub fn new(evaluator: E, deriver: OptionDeriver) -> Self {
        Self {
            evaluator,
            deriver,
            scores: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Score of `point`, evaluating its derived options on a miss.
    ///
    /// Failed evaluations are not stored.
    pub async fn evaluate(&mut self, point: &ParameterPoint) -> BtResult<f64> {
        let key = point.canonical_key();

        if let Some(&score) = self.scores.get(&key) {
            self.stats.hits += 1;
            info!(point = %point, score, "cache hit");
            return Ok(score);
        }

        self.stats.misses += 1;
        let options = self.deriver.derive(point);
        info!(point = %point, options = %options, "evaluating");

        let score = self.evaluator.evaluate(&options).await?;
        self.scores.insert(key, score);
        Ok(score)
    }

    pub fn get(&self, point: &ParameterPoint) -> Option<f64> {
        self.scores.get(&point.canonical_key()).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn deriver(&self) -> &OptionDeriver {
        &self.deriver
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }
}
