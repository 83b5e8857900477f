//! Simulated annealing over integer parameter points.

use bt_types::{internal_error, BtResult, ParameterPoint, SearchError, Solution};
use crossbeam_channel::Sender;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStats, EvaluationCache};
use crate::evaluator::Evaluator;
use crate::validator::ParameterSpaceValidator;

/// Annealing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnealConfig {
    /// Multiplicative cooling applied after every iteration.
    pub decay: f64,
    /// Consecutive rejections after which the search has converged.
    pub max_unsuccessful: u32,
    /// Invalid neighbors drawn before an iteration gives up.
    pub max_resample_attempts: u32,
    /// Hard cap on iterations, if any.
    pub max_iterations: Option<u64>,
    /// Seed for a reproducible run; entropy-seeded otherwise.
    pub seed: Option<u64>,
}

impl Default for AnnealConfig {
    fn default() -> Self {
        Self {
            decay: 0.97,
            max_unsuccessful: 20,
            max_resample_attempts: 1000,
            max_iterations: None,
            seed: None,
        }
    }
}

impl AnnealConfig {
    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    pub fn with_max_unsuccessful(mut self, n: u32) -> Self {
        self.max_unsuccessful = n;
        self
    }

    pub fn with_max_resample_attempts(mut self, n: u32) -> Self {
        self.max_resample_attempts = n;
        self
    }

    pub fn with_max_iterations(mut self, n: u64) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Probability of moving to a candidate `delta` worse than the current
/// solution.
///
/// Improvements are always taken. Once the temperature is no longer a
/// normal positive number nothing else is. [`AnnealState`] freezes earlier,
/// relative to its start temperature.
pub fn acceptance_probability(delta: f64, temperature: f64) -> f64 {
    if delta < 0.0 {
        return 1.0;
    }
    if delta.is_nan() || !temperature.is_normal() || temperature < 0.0 {
        return 0.0;
    }
    (-delta / temperature).exp()
}

/// What one iteration did with its candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Step {
    Accepted { delta: f64, new_best: bool },
    Rejected { delta: f64 },
    /// Resampling gave up before finding a valid candidate.
    NoValidNeighbor,
}

/// The annealing bookkeeping, independent of how candidates are produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnealState {
    pub current: Solution,
    pub best: Solution,
    pub temperature: f64,
    /// Below this temperature only strict improvements are accepted.
    pub freeze_below: f64,
    pub iteration: u64,
    /// Rejections since the last acceptance.
    pub unsuccessful: u32,
    pub accepted: u64,
    pub rejected: u64,
    pub exhausted_neighbors: u64,
}

impl AnnealState {
    /// Start at `start`, with its score as the initial temperature. The
    /// search freezes once cooling has lost the precision of that score.
    pub fn new(start: Solution) -> Self {
        Self {
            temperature: start.score,
            freeze_below: start.score * f64::EPSILON,
            best: start.clone(),
            current: start,
            iteration: 0,
            unsuccessful: 0,
            accepted: 0,
            rejected: 0,
            exhausted_neighbors: 0,
        }
    }

    /// Apply one iteration. `draw` is a uniform sample in `[0, 1)`.
    pub fn advance(&mut self, candidate: Option<Solution>, draw: f64, decay: f64) -> Step {
        self.iteration += 1;

        let step = match candidate {
            None => {
                self.exhausted_neighbors += 1;
                self.unsuccessful += 1;
                Step::NoValidNeighbor
            }
            Some(candidate) => {
                let delta = candidate.score - self.current.score;
                let probability = if self.is_frozen() {
                    0.0
                } else {
                    acceptance_probability(delta, self.temperature)
                };
                if delta < 0.0 || draw < probability {
                    // Best moves only on strict improvement over itself.
                    let new_best = candidate.score < self.best.score;
                    if new_best {
                        self.best = candidate.clone();
                    }
                    self.current = candidate;
                    self.unsuccessful = 0;
                    self.accepted += 1;
                    Step::Accepted { delta, new_best }
                } else {
                    self.unsuccessful += 1;
                    self.rejected += 1;
                    Step::Rejected { delta }
                }
            }
        };

        self.temperature *= decay;
        step
    }

    pub fn is_frozen(&self) -> bool {
        self.temperature < self.freeze_below
    }

    pub fn is_converged(&self, max_unsuccessful: u32) -> bool {
        self.unsuccessful >= max_unsuccessful
    }
}

/// Progress notifications emitted while annealing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnnealEvent {
    Started {
        start: Solution,
        temperature: f64,
    },
    Iteration {
        iteration: u64,
        candidate: Option<Solution>,
        step: Step,
        temperature: f64,
        unsuccessful: u32,
    },
    Converged {
        best: Solution,
        iterations: u64,
    },
}

/// Result of a finished search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnealOutcome {
    pub best: Solution,
    pub iterations: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub exhausted_neighbors: u64,
    pub final_temperature: f64,
    pub cache: CacheStats,
}

/// Gaussian perturbation of every coordinate, with spreads fixed by the
/// start point.
struct Neighborhood {
    spreads: Vec<(String, Normal<f64>)>,
}

impl Neighborhood {
    fn around(start: &ParameterPoint) -> BtResult<Self> {
        let spreads = start
            .iter()
            .map(|(name, value)| -> BtResult<(String, Normal<f64>)> {
                let std_dev = (0.5 * value as f64).abs();
                let normal = Normal::new(0.0, std_dev)
                    .map_err(|e| internal_error!("invalid spread for {name}: {e}"))?;
                Ok((name.to_string(), normal))
            })
            .collect::<BtResult<Vec<_>>>()?;
        Ok(Self { spreads })
    }

    fn sample<R: Rng>(&self, current: &ParameterPoint, rng: &mut R) -> ParameterPoint {
        self.spreads
            .iter()
            .map(|(name, normal)| {
                let center = current.get(name).unwrap_or_default() as f64;
                (name.clone(), (center + normal.sample(&mut *rng)).round() as i64)
            })
            .collect()
    }
}

/// Searches for the parameter point with the lowest score.
pub struct Annealer<E: Evaluator> {
    cache: EvaluationCache<E>,
    validator: ParameterSpaceValidator,
    config: AnnealConfig,
    events: Option<Sender<AnnealEvent>>,
    best: Option<Solution>,
}

impl<E: Evaluator> Annealer<E> {
    pub fn new(cache: EvaluationCache<E>, validator: ParameterSpaceValidator) -> Self {
        Self {
            cache,
            validator,
            config: AnnealConfig::default(),
            events: None,
            best: None,
        }
    }

    pub fn with_config(mut self, config: AnnealConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: Sender<AnnealEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &AnnealConfig {
        &self.config
    }

    pub fn cache(&self) -> &EvaluationCache<E> {
        &self.cache
    }

    /// Best solution of the latest run, kept when that run failed midway.
    pub fn best_so_far(&self) -> Option<&Solution> {
        self.best.as_ref()
    }

    pub async fn run(&mut self, start: ParameterPoint) -> BtResult<AnnealOutcome> {
        self.best = None;
        if start.is_empty() {
            return Err(SearchError::Empty {
                message: "no parameters given".to_string(),
            }
            .into());
        }
        if !self.validator.check(&start)? {
            return Err(SearchError::InvalidStart {
                point: start.to_string(),
            }
            .into());
        }

        let neighborhood = Neighborhood::around(&start)?;
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let start_score = self.cache.evaluate(&start).await?;
        if !start_score.is_finite() {
            return Err(SearchError::UnscorableStart {
                point: start.to_string(),
                metric: self.cache.evaluator().metric().to_string(),
            }
            .into());
        }

        let mut state = AnnealState::new(Solution::new(start, start_score));
        self.best = Some(state.best.clone());
        info!(
            start = %state.current.point,
            score = start_score,
            decay = self.config.decay,
            "starting annealing"
        );
        self.emit(AnnealEvent::Started {
            start: state.current.clone(),
            temperature: state.temperature,
        });

        while !state.is_converged(self.config.max_unsuccessful) {
            if let Some(limit) = self.config.max_iterations {
                if state.iteration >= limit {
                    warn!(limit, "iteration limit reached before convergence");
                    break;
                }
            }

            let neighbor = self.valid_neighbor(&neighborhood, &state.current.point, &mut rng);
            let candidate = match neighbor {
                Some(point) => {
                    let scored = self.cache.evaluate(&point).await;
                    match scored {
                        Ok(score) => Some(Solution::new(point, score)),
                        Err(e) => {
                            error!(
                                iteration = state.iteration + 1,
                                candidate = %point,
                                best = %state.best.point,
                                score = state.best.score,
                                error = %e,
                                "candidate evaluation failed, stopping"
                            );
                            return Err(e);
                        }
                    }
                }
                None => None,
            };

            let temperature = state.temperature;
            let draw: f64 = rng.gen();
            let step = state.advance(candidate.clone(), draw, self.config.decay);
            if let Step::Accepted { new_best: true, .. } = step {
                self.best = Some(state.best.clone());
            }

            match (&step, &candidate) {
                (Step::Accepted { delta, new_best }, Some(c)) => {
                    info!(
                        iteration = state.iteration,
                        point = %c.point,
                        score = c.score,
                        delta,
                        temperature,
                        "accepted"
                    );
                    if *new_best {
                        info!(
                            iteration = state.iteration,
                            point = %c.point,
                            score = c.score,
                            "new best"
                        );
                    }
                }
                (Step::Rejected { delta }, Some(c)) => {
                    info!(
                        iteration = state.iteration,
                        point = %c.point,
                        score = c.score,
                        delta,
                        temperature,
                        unsuccessful = state.unsuccessful,
                        "rejected"
                    );
                }
                _ => {
                    warn!(
                        iteration = state.iteration,
                        attempts = self.config.max_resample_attempts,
                        unsuccessful = state.unsuccessful,
                        "no valid neighbor found"
                    );
                }
            }

            self.emit(AnnealEvent::Iteration {
                iteration: state.iteration,
                candidate,
                step,
                temperature: state.temperature,
                unsuccessful: state.unsuccessful,
            });
        }

        info!(
            best = %state.best.point,
            score = state.best.score,
            iterations = state.iteration,
            "annealing finished"
        );
        self.emit(AnnealEvent::Converged {
            best: state.best.clone(),
            iterations: state.iteration,
        });

        Ok(AnnealOutcome {
            best: state.best,
            iterations: state.iteration,
            accepted: state.accepted,
            rejected: state.rejected,
            exhausted_neighbors: state.exhausted_neighbors,
            final_temperature: state.temperature,
            cache: self.cache.stats(),
        })
    }

    /// Draw neighbors of `current` until one passes the validator.
    fn valid_neighbor(
        &self,
        neighborhood: &Neighborhood,
        current: &ParameterPoint,
        rng: &mut StdRng,
    ) -> Option<ParameterPoint> {
        for _ in 0..self.config.max_resample_attempts {
            let candidate = neighborhood.sample(current, rng);
            if self.validator.is_valid(&candidate) {
                return Some(candidate);
            }
            debug!(candidate = %candidate, "candidate rejected by constraints");
        }
        None
    }

    fn emit(&self, event: AnnealEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deriver::OptionDeriver;
    use async_trait::async_trait;
    use bt_types::{BtError, OptionSet};

    fn solution(score: f64) -> Solution {
        Solution::new(ParameterPoint::new().with("M", score as i64), score)
    }

    #[test]
    fn improvements_always_accepted() {
        for temperature in [1e6, 1.0, 1e-300, 0.0, -1.0] {
            assert_eq!(acceptance_probability(-0.5, temperature), 1.0);
        }
    }

    #[test]
    fn uphill_probability_vanishes_as_temperature_drops() {
        let mut last = acceptance_probability(10.0, 1e6);
        assert!(last < 1.0);
        for temperature in [1e3, 10.0, 1.0, 1e-3, 1e-6] {
            let p = acceptance_probability(10.0, temperature);
            assert!(p <= last);
            last = p;
        }
        assert!(last < 1e-100);
        assert_eq!(acceptance_probability(10.0, 0.0), 0.0);
        assert_eq!(acceptance_probability(0.0, f64::MIN_POSITIVE / 4.0), 0.0);
        assert_eq!(acceptance_probability(f64::INFINITY, 10.0), 0.0);
        assert_eq!(acceptance_probability(f64::NAN, 10.0), 0.0);
    }

    #[test]
    fn improvement_accepted_even_with_worst_draw() {
        let mut state = AnnealState::new(solution(100.0));
        state.temperature = 1e-9;

        let step = state.advance(Some(solution(90.0)), 0.999_999, 0.97);
        assert_eq!(
            step,
            Step::Accepted {
                delta: -10.0,
                new_best: true
            }
        );
        assert_eq!(state.best.score, 90.0);
        assert_eq!(state.current.score, 90.0);
    }

    #[test]
    fn rejection_counter_resets_only_on_acceptance() {
        let mut state = AnnealState::new(solution(100.0));

        // exp(-50/100) ~ 0.61, so a high draw rejects and a low one accepts.
        for expected in 1..=3 {
            let step = state.advance(Some(solution(150.0)), 0.99, 1.0);
            assert!(matches!(step, Step::Rejected { .. }));
            assert_eq!(state.unsuccessful, expected);
        }
        state.advance(None, 0.0, 1.0);
        assert_eq!(state.unsuccessful, 4);

        let step = state.advance(Some(solution(150.0)), 0.01, 1.0);
        assert_eq!(
            step,
            Step::Accepted {
                delta: 50.0,
                new_best: false
            }
        );
        assert_eq!(state.unsuccessful, 0);
        assert_eq!(state.current.score, 150.0);
        assert_eq!(state.best.score, 100.0);
        assert_eq!((state.accepted, state.rejected, state.exhausted_neighbors), (1, 3, 1));
    }

    #[test]
    fn best_never_gets_worse() {
        let mut state = AnnealState::new(solution(100.0));
        state.advance(Some(solution(150.0)), 0.0, 1.0);
        // Better than current but worse than best.
        let step = state.advance(Some(solution(120.0)), 0.5, 1.0);
        assert_eq!(
            step,
            Step::Accepted {
                delta: -30.0,
                new_best: false
            }
        );
        assert_eq!(state.best.score, 100.0);
        assert_eq!(state.current.score, 120.0);
    }

    #[test]
    fn cools_every_iteration() {
        let mut state = AnnealState::new(solution(100.0));
        state.advance(Some(solution(50.0)), 0.5, 0.5);
        state.advance(Some(solution(500.0)), 0.99, 0.5);
        state.advance(None, 0.5, 0.5);
        assert_eq!(state.temperature, 12.5);
        assert_eq!(state.iteration, 3);
    }

    #[test]
    fn freezes_relative_to_start_temperature() {
        let mut state = AnnealState::new(solution(100.0));
        assert!(!state.is_frozen());

        // Still a normal float, but too cold to accept anything but gains.
        state.temperature = 100.0 * f64::EPSILON / 2.0;
        assert!(state.is_frozen());
        let step = state.advance(Some(solution(100.0)), 0.0, 0.97);
        assert_eq!(step, Step::Rejected { delta: 0.0 });

        let step = state.advance(Some(solution(99.0)), 0.999, 0.97);
        assert!(matches!(step, Step::Accepted { new_best: true, .. }));
    }

    #[test]
    fn converges_at_threshold() {
        let mut state = AnnealState::new(solution(100.0));
        state.temperature = 0.0;
        for _ in 0..19 {
            state.advance(Some(solution(100.0)), 0.0, 0.97);
            assert!(!state.is_converged(20));
        }
        state.advance(Some(solution(100.0)), 0.0, 0.97);
        assert!(state.is_converged(20));
    }

    struct ConstantEvaluator(f64);

    #[async_trait]
    impl Evaluator for ConstantEvaluator {
        async fn evaluate(&self, _options: &OptionSet) -> BtResult<f64> {
            Ok(self.0)
        }
    }

    fn constant_annealer(score: f64, restrictions: &[&str]) -> Annealer<ConstantEvaluator> {
        let validator = ParameterSpaceValidator::new()
            .with_restrictions(restrictions)
            .unwrap();
        Annealer::new(
            EvaluationCache::new(ConstantEvaluator(score), OptionDeriver::new()),
            validator,
        )
    }

    fn start() -> ParameterPoint {
        ParameterPoint::new().with("M", 50).with("m", 40)
    }

    #[tokio::test]
    async fn constant_score_terminates() {
        let config = AnnealConfig::default().with_seed(11);
        let mut annealer = constant_annealer(7.0, &[]).with_config(config);

        let outcome = annealer.run(start()).await.unwrap();

        // Equal scores are taken until 0.97^k drops below f64::EPSILON
        // (k = 1184), then the next 20 candidates are rejected.
        assert!(outcome.iterations > 1150 && outcome.iterations < 1250);
        assert_eq!(outcome.rejected, 20);
        assert_eq!(outcome.accepted, outcome.iterations - 20);
        assert_eq!(outcome.best.score, 7.0);
        assert_eq!(outcome.best.point, start());
    }

    #[tokio::test]
    async fn slow_cooling_still_terminates() {
        for decay in [0.95, 0.99] {
            let config = AnnealConfig::default().with_decay(decay).with_seed(2);
            let mut annealer = constant_annealer(7.0, &[]).with_config(config);
            let outcome = annealer.run(start()).await.unwrap();

            let freeze = (f64::EPSILON.ln() / decay.ln()).ceil() as u64;
            assert!(outcome.iterations <= freeze + 25, "decay {decay}");
            assert_eq!(outcome.rejected, 20);
        }
    }

    #[tokio::test]
    async fn unsatisfiable_neighborhood_counts_as_rejection() {
        // Only the start point itself satisfies the restriction.
        let start = start().with("x", 1_000_000_000);
        let mut annealer = constant_annealer(7.0, &["x == 1000000000"]).with_config(
            AnnealConfig::default()
                .with_max_resample_attempts(10)
                .with_seed(3),
        );

        let outcome = annealer.run(start.clone()).await.unwrap();
        assert_eq!(outcome.iterations, 20);
        assert_eq!(outcome.exhausted_neighbors, 20);
        assert_eq!(outcome.best.point, start);
        assert_eq!(outcome.cache.misses, 1);
    }

    #[tokio::test]
    async fn iteration_cap_stops_early() {
        let mut annealer = constant_annealer(7.0, &[]).with_config(
            AnnealConfig::default()
                .with_max_iterations(5)
                .with_seed(1),
        );
        let outcome = annealer.run(start()).await.unwrap();
        assert_eq!(outcome.iterations, 5);
    }

    #[tokio::test]
    async fn seeded_runs_are_reproducible() {
        let config = AnnealConfig::default().with_max_iterations(30).with_seed(42);
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut first = constant_annealer(7.0, &[]).with_config(config.clone()).with_events(tx);
        first.run(start()).await.unwrap();
        let (tx, rx2) = crossbeam_channel::unbounded();
        let mut second = constant_annealer(7.0, &[]).with_config(config).with_events(tx);
        second.run(start()).await.unwrap();

        let a: Vec<AnnealEvent> = rx.try_iter().collect();
        let b: Vec<AnnealEvent> = rx2.try_iter().collect();
        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
        assert!(matches!(a.first(), Some(AnnealEvent::Started { .. })));
        assert!(matches!(a.last(), Some(AnnealEvent::Converged { iterations: 30, .. })));
    }

    #[tokio::test]
    async fn invalid_start_is_an_error() {
        let mut annealer = constant_annealer(7.0, &["M > 100"]);
        let err = annealer.run(start()).await.unwrap_err();
        assert!(matches!(err, BtError::Search(SearchError::InvalidStart { .. })));

        let mut annealer = constant_annealer(7.0, &[]);
        let err = annealer.run(ParameterPoint::new().with("M", 1)).await.unwrap_err();
        assert!(matches!(err, BtError::Search(SearchError::InvalidStart { .. })));

        let err = annealer.run(ParameterPoint::new()).await.unwrap_err();
        assert!(matches!(err, BtError::Search(SearchError::Empty { .. })));
    }

    /// Scores `M`, naming its metric, and fails on points with `M` above
    /// `fail_above`.
    struct TimingEvaluator {
        fail_above: i64,
        unscorable: bool,
    }

    #[async_trait]
    impl Evaluator for TimingEvaluator {
        async fn evaluate(&self, options: &OptionSet) -> BtResult<f64> {
            let max = options.get("M").unwrap_or_default();
            if max > self.fail_above {
                return Err(internal_error!("build failed for M={max}"));
            }
            Ok(if self.unscorable { f64::INFINITY } else { max as f64 })
        }

        fn metric(&self) -> &str {
            "PAPI_REAL_NSEC"
        }
    }

    fn timing_annealer(fail_above: i64, unscorable: bool) -> Annealer<TimingEvaluator> {
        Annealer::new(
            EvaluationCache::new(
                TimingEvaluator {
                    fail_above,
                    unscorable,
                },
                OptionDeriver::new(),
            ),
            ParameterSpaceValidator::new(),
        )
    }

    #[tokio::test]
    async fn unscorable_start_is_an_error() {
        let mut annealer = constant_annealer(f64::INFINITY, &[]);
        let err = annealer.run(start()).await.unwrap_err();
        assert!(matches!(err, BtError::Search(SearchError::UnscorableStart { .. })));
        assert!(annealer.best_so_far().is_none());

        let mut annealer = timing_annealer(i64::MAX, true);
        match annealer.run(start()).await.unwrap_err() {
            BtError::Search(SearchError::UnscorableStart { metric, point }) => {
                assert_eq!(metric, "PAPI_REAL_NSEC");
                assert_eq!(point, start().to_string());
            }
            other => panic!("expected an unscorable start, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_candidate_keeps_best_so_far() {
        // Any neighbor with M above 50 fails; the spread of 25 reaches one
        // quickly.
        let config = AnnealConfig::default().with_seed(4);
        let mut annealer = timing_annealer(50, false).with_config(config);

        let err = annealer.run(start()).await.unwrap_err();
        assert!(matches!(err, BtError::Internal(_)));

        let best = annealer.best_so_far().unwrap();
        assert!(best.score <= 50.0);
        assert!(best.point.get("M").unwrap() <= 50);
    }
}
