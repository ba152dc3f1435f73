use std::collections::HashSet;
use std::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{Behaviour, InferenceLevel, RepeatMode, Tradeoff, TunerConfig};
use crate::error::{Result, TunerError};
use crate::inference::InferenceAdvisor;
use crate::models::{Chunk, ChunkFeatures, CompressionParams, TrialResult};
use crate::tuner::monitor::{PerformanceMonitor, Trial};
use crate::tuner::scoring::{Scored, TradeoffScorer};
use crate::tuner::space::{ParameterSpace, Scope};

/// Where the search stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Warmup,
    Explore,
    Exploit,
    HardStop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Warmup => "warmup",
            Phase::Explore => "explore",
            Phase::Exploit => "exploit",
            Phase::HardStop => "hardstop",
        };
        f.write_str(name)
    }
}

/// Anything that can time a batch of candidates against a chunk.
pub trait TrialRunner {
    /// Outcomes in candidate order.
    fn run(&mut self, candidates: &[CompressionParams], chunk: &Chunk) -> Vec<(CompressionParams, Result<Trial>)>;
}

impl TrialRunner for PerformanceMonitor {
    fn run(&mut self, candidates: &[CompressionParams], chunk: &Chunk) -> Vec<(CompressionParams, Result<Trial>)> {
        self.measure_batch(candidates, chunk)
    }
}

/// Search progress, updated once per chunk.
#[derive(Debug, Clone)]
pub struct SearchState {
    /// Best params with their latest measurement and score.
    pub best: Option<Scored>,
    /// Highest score ever accepted; never decreases.
    pub best_score: f64,
    /// Consecutive explore chunks without a new best.
    pub non_improving: usize,
    /// Chunks delivered so far.
    pub chunk_index: usize,
    /// Phase the next chunk is processed in.
    pub phase: Phase,
    /// Chunks spent in the current exploit dwell.
    pub dwell: usize,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            best: None,
            best_score: f64::NEG_INFINITY,
            non_improving: 0,
            chunk_index: 0,
            phase: Phase::Warmup,
            dwell: 0,
        }
    }
}

/// One candidate trial, kept for the session's trial log.
#[derive(Debug, Clone, Serialize)]
pub struct TrialRecord {
    pub chunk_index: usize,
    pub phase: Phase,
    pub params: CompressionParams,
    pub result: Option<TrialResult>,
    pub score: Option<f64>,
    pub error: Option<String>,
    /// Whether this trial's output was handed back for the chunk.
    pub delivered: bool,
}

/// The output chosen for one chunk.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub trial: Trial,
    /// Phase the chunk was processed in.
    pub phase: Phase,
}

/// The warmup / explore / exploit / hard-stop state machine.
pub struct SearchController {
    space: ParameterSpace,
    scorer: TradeoffScorer,
    advisor: InferenceAdvisor,
    tradeoff: Tradeoff,
    behaviour: Behaviour,
    breadth: usize,
    rng: StdRng,
    state: SearchState,
    tried: HashSet<CompressionParams>,
    predicted: HashSet<CompressionParams>,
    refresh_predictions: bool,
    log: Vec<TrialRecord>,
}

impl SearchController {
    pub fn new(config: &TunerConfig, space: ParameterSpace, advisor: InferenceAdvisor) -> Self {
        Self {
            scorer: TradeoffScorer::new(config.tradeoff.clone(), config.perf_mode, config.tie_epsilon),
            tradeoff: config.tradeoff.clone(),
            behaviour: config.behaviour,
            breadth: config.search_breadth.max(1),
            rng: StdRng::seed_from_u64(config.seed),
            state: SearchState::default(),
            tried: HashSet::new(),
            predicted: HashSet::new(),
            refresh_predictions: false,
            log: Vec::new(),
            space,
            advisor,
        }
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn best_params(&self) -> Option<CompressionParams> {
        self.state.best.map(|b| b.params)
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn advisor(&self) -> &InferenceAdvisor {
        &self.advisor
    }

    pub fn trial_log(&self) -> &[TrialRecord] {
        &self.log
    }

    /// Drop the inference model; the search carries on without it.
    pub fn release_model(&mut self) {
        self.advisor.release();
    }

    /// Choose params for `chunk`, trialing candidates through `runner` as the phase requires.
    pub fn process(&mut self, chunk: &Chunk, runner: &mut dyn TrialRunner) -> Result<Delivery> {
        let phase = self.state.phase;
        let trial = match phase {
            Phase::Warmup => self.warmup(chunk, runner)?,
            Phase::Explore => self.explore(chunk, runner)?,
            Phase::Exploit | Phase::HardStop => {
                let trial = self.deliver_best(phase, chunk, runner)?;
                self.after_exploit(phase);
                trial
            }
        };
        self.state.chunk_index += 1;
        Ok(Delivery { trial, phase })
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.state.phase != phase {
            info!(
                chunk = self.state.chunk_index,
                from = %self.state.phase,
                to = %phase,
                "search phase changed"
            );
        }
        self.state.phase = phase;
    }

    fn scope(&self) -> Scope {
        match self.behaviour.repeat_mode {
            RepeatMode::Current => Scope::Current,
            RepeatMode::None | RepeatMode::All => Scope::All,
        }
    }

    fn predictions(&mut self, chunk: &Chunk) -> Vec<CompressionParams> {
        if !self.advisor.has_model() {
            return Vec::new();
        }
        let features = ChunkFeatures::extract(chunk);
        let predicted = self
            .advisor
            .predict(&features, &self.tradeoff, &self.space)
            .unwrap_or_default();
        self.predicted.extend(predicted.iter().copied());
        predicted
    }

    /// Trial `candidates`, log every outcome and return the successes with
    /// their log positions, scored after all of them were observed.
    fn trial(
        &mut self,
        phase: Phase,
        candidates: &[CompressionParams],
        chunk: &Chunk,
        runner: &mut dyn TrialRunner,
    ) -> Vec<(usize, Scored, Trial)> {
        if candidates.is_empty() {
            return Vec::new();
        }
        self.tried.extend(candidates.iter().copied());

        let outcomes = runner.run(candidates, chunk);
        for (_, outcome) in &outcomes {
            if let Ok(trial) = outcome {
                self.scorer.observe(&trial.result);
            }
        }

        let mut successes = Vec::new();
        for (params, outcome) in outcomes {
            let index = self.log.len();
            match outcome {
                Ok(trial) => {
                    let scored = self.scorer.scored(params, trial.result);
                    self.log.push(TrialRecord {
                        chunk_index: self.state.chunk_index,
                        phase,
                        params,
                        result: Some(trial.result),
                        score: Some(scored.score),
                        error: None,
                        delivered: false,
                    });
                    successes.push((index, scored, trial));
                }
                Err(e) => self.log.push(TrialRecord {
                    chunk_index: self.state.chunk_index,
                    phase,
                    params,
                    result: None,
                    score: None,
                    error: Some(e.to_string()),
                    delivered: false,
                }),
            }
        }
        successes
    }

    fn take_preferred(&self, mut successes: Vec<(usize, Scored, Trial)>) -> Option<(usize, Scored, Trial)> {
        let scored: Vec<Scored> = successes.iter().map(|(_, s, _)| *s).collect();
        let pick = self.scorer.pick_best(&scored)?;
        Some(successes.swap_remove(pick))
    }

    fn deliver(&mut self, log_index: usize, trial: Trial) -> Trial {
        if let Some(record) = self.log.get_mut(log_index) {
            record.delivered = true;
        }
        trial
    }

    fn accept(&mut self, best: Scored) {
        info!(
            chunk = self.state.chunk_index,
            params = %best.params.display(),
            score = best.score,
            ratio = best.result.ratio(),
            "new best params"
        );
        self.state.best = Some(best);
        self.state.best_score = self.state.best_score.max(best.score);
        self.advisor.record_outcome(self.predicted.contains(&best.params));
    }

    fn warmup(&mut self, chunk: &Chunk, runner: &mut dyn TrialRunner) -> Result<Trial> {
        let seed = self.space.sanitize(self.space.seed()).ok_or_else(|| {
            TunerError::Config(format!(
                "requested params {} are not valid",
                self.space.seed().display()
            ))
        })?;
        let predictions = self.predictions(chunk);

        let successes = if self.advisor.level() == InferenceLevel::Mandatory && !predictions.is_empty() {
            let first = self.trial(Phase::Warmup, &predictions, chunk, runner);
            if first.is_empty() {
                debug!("every prediction failed, falling back to the requested params");
                self.trial(Phase::Warmup, &[seed], chunk, runner)
            } else {
                first
            }
        } else {
            let mut candidates = vec![seed];
            candidates.extend(predictions.into_iter().filter(|p| *p != seed));
            self.trial(Phase::Warmup, &candidates, chunk, runner)
        };

        let (log_index, best, trial) = self
            .take_preferred(successes)
            .ok_or(TunerError::NoViableConfiguration(self.state.chunk_index))?;
        self.accept(best);

        if self.behaviour.nhards_before_stop == 0 {
            self.set_phase(Phase::HardStop);
        } else {
            self.set_phase(Phase::Explore);
        }
        Ok(self.deliver(log_index, trial))
    }

    fn explore(&mut self, chunk: &Chunk, runner: &mut dyn TrialRunner) -> Result<Trial> {
        let best = self
            .state
            .best
            .ok_or(TunerError::NoViableConfiguration(self.state.chunk_index))?;

        // The best is re-measured on this chunk so challengers face the same data
        let mut batch: Vec<CompressionParams> = vec![best.params];
        if self.refresh_predictions {
            self.refresh_predictions = false;
            for p in self.predictions(chunk) {
                if !self.tried.contains(&p) && !batch.contains(&p) {
                    batch.push(p);
                }
            }
        }

        let untried: Vec<CompressionParams> = self
            .space
            .neighbors_in(&best.params, self.scope())
            .into_iter()
            .filter(|p| !self.tried.contains(p) && !batch.contains(p))
            .collect();
        batch.extend(untried.choose_multiple(&mut self.rng, self.breadth).copied());

        let mut successes = self.trial(Phase::Explore, &batch, chunk, runner);
        let incumbent = successes
            .iter()
            .position(|(_, s, _)| s.params == best.params)
            .map(|i| successes.remove(i));

        let scored: Vec<Scored> = successes.iter().map(|(_, s, _)| *s).collect();
        let top = self.scorer.pick_best(&scored);

        let Some((log_index, current, trial)) = incumbent else {
            // Best failed here: keep it and hand back this chunk's preferred candidate
            self.stall();
            let (log_index, _, trial) = top
                .map(|i| successes.remove(i))
                .ok_or(TunerError::NoViableConfiguration(self.state.chunk_index))?;
            return Ok(self.deliver(log_index, trial));
        };

        if let Some(top) = top.filter(|&i| self.scorer.improves(&scored[i], &current)) {
            let (log_index, winner, trial) = successes.remove(top);
            self.accept(winner);
            self.state.non_improving = 0;
            return Ok(self.deliver(log_index, trial));
        }

        self.state.best = Some(current);
        self.stall();
        Ok(self.deliver(log_index, trial))
    }

    /// Count a chunk without a new best; stop searching once there are enough.
    fn stall(&mut self) {
        self.state.non_improving += 1;
        debug!(
            chunk = self.state.chunk_index,
            non_improving = self.state.non_improving,
            "no improvement this chunk"
        );
        if self.state.non_improving >= self.behaviour.nhards_before_stop {
            self.set_phase(Phase::HardStop);
        }
    }

    /// Trial the best params once and refresh their measurement.
    fn deliver_best(&mut self, phase: Phase, chunk: &Chunk, runner: &mut dyn TrialRunner) -> Result<Trial> {
        let best = self
            .state
            .best
            .ok_or(TunerError::NoViableConfiguration(self.state.chunk_index))?;

        let (log_index, fresh, trial) = self
            .trial(phase, &[best.params], chunk, runner)
            .pop()
            .ok_or(TunerError::NoViableConfiguration(self.state.chunk_index))?;
        self.state.best = Some(fresh);
        Ok(self.deliver(log_index, trial))
    }

    fn after_exploit(&mut self, phase: Phase) {
        if self.behaviour.repeat_mode == RepeatMode::None {
            return;
        }
        match phase {
            Phase::HardStop if self.behaviour.repeat_interval == 0 => self.restart(),
            Phase::HardStop => {
                self.state.dwell = 0;
                self.set_phase(Phase::Exploit);
            }
            Phase::Exploit => {
                self.state.dwell += 1;
                if self.state.dwell >= self.behaviour.repeat_interval {
                    self.restart();
                }
            }
            Phase::Warmup | Phase::Explore => {}
        }
    }

    /// Re-enter exploration around the current best.
    fn restart(&mut self) {
        self.state.non_improving = 0;
        self.state.dwell = 0;
        self.tried.clear();
        if let Some(best) = self.state.best {
            self.tried.insert(best.params);
        }
        self.refresh_predictions = self.behaviour.repeat_mode == RepeatMode::All;
        self.set_phase(Phase::Explore);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{Model, ModelEntry};
    use crate::models::{CodecId, FilterId, ParamSeed, Pinned};

    /// Runner whose results come from a function of the params.
    struct Scripted<F> {
        outcome: F,
        calls: Vec<Vec<CompressionParams>>,
    }

    impl<F> Scripted<F>
    where
        F: FnMut(&CompressionParams) -> Option<TrialResult>,
    {
        fn new(outcome: F) -> Self {
            Self {
                outcome,
                calls: Vec::new(),
            }
        }
    }

    impl<F> TrialRunner for Scripted<F>
    where
        F: FnMut(&CompressionParams) -> Option<TrialResult>,
    {
        fn run(&mut self, candidates: &[CompressionParams], _chunk: &Chunk) -> Vec<(CompressionParams, Result<Trial>)> {
            self.calls.push(candidates.to_vec());
            candidates
                .iter()
                .map(|p| {
                    let outcome = match (self.outcome)(p) {
                        Some(result) => Ok(Trial {
                            params: *p,
                            result,
                            compressed: vec![0; result.csize],
                        }),
                        None => Err(TunerError::CodecTrial {
                            params: p.display(),
                            reason: "scripted failure".to_string(),
                        }),
                    };
                    (*p, outcome)
                })
                .collect()
        }
    }

    fn result(csize: usize, ctime: f64) -> TrialResult {
        TrialResult {
            ctime_secs: ctime,
            dtime_secs: None,
            csize,
            nbytes: 1000,
            quality: None,
        }
    }

    fn flat(_: &CompressionParams) -> Option<TrialResult> {
        Some(result(500, 0.01))
    }

    fn seed_params() -> CompressionParams {
        CompressionParams {
            codec: CodecId::Zstd,
            filter: FilterId::Shuffle,
            level: 1,
            blocksize: 64 * 1024,
            typesize: 8,
            nthreads: 1,
        }
    }

    /// Zstd pinned at its lowest level with one thread: under flat results
    /// no neighbor can win even the tie-break.
    fn seed() -> ParamSeed {
        ParamSeed::new(seed_params()).with_pinned(Pinned {
            codec: true,
            ..Pinned::default()
        })
    }

    fn config(nhards: usize, repeat_mode: RepeatMode, repeat_interval: usize) -> TunerConfig {
        TunerConfig {
            tradeoff: Tradeoff::ratio_speed(1.0).unwrap(),
            behaviour: Behaviour {
                nhards_before_stop: nhards,
                repeat_mode,
                repeat_interval,
            },
            perf_mode: crate::config::PerfMode::Compression,
            ..TunerConfig::default()
        }
    }

    fn controller(config: &TunerConfig, seed: &ParamSeed) -> SearchController {
        SearchController::new(config, ParameterSpace::new(seed), InferenceAdvisor::disabled())
    }

    fn chunk() -> Chunk {
        Chunk::new(&[7u8; 64], 8)
    }

    #[test]
    fn test_warmup_trials_seed_then_explores() {
        let cfg = config(3, RepeatMode::None, 0);
        let mut ctl = controller(&cfg, &seed());
        let mut runner = Scripted::new(flat);

        let delivery = ctl.process(&chunk(), &mut runner).unwrap();
        assert_eq!(delivery.phase, Phase::Warmup);
        assert_eq!(delivery.trial.params, seed().params);
        assert_eq!(ctl.phase(), Phase::Explore);
        assert_eq!(runner.calls[0], vec![seed().params]);
    }

    #[test]
    fn test_hard_stop_after_non_improving_chunks() {
        let nhards = 4;
        let cfg = config(nhards, RepeatMode::None, 0);
        let mut ctl = controller(&cfg, &seed());
        let mut runner = Scripted::new(flat);

        ctl.process(&chunk(), &mut runner).unwrap();
        for i in 0..nhards {
            assert_eq!(ctl.phase(), Phase::Explore, "chunk {}", i + 1);
            ctl.process(&chunk(), &mut runner).unwrap();
        }
        assert_eq!(ctl.phase(), Phase::HardStop);

        // No search once stopped: one exploit trial per chunk
        let before = runner.calls.len();
        for _ in 0..5 {
            let delivery = ctl.process(&chunk(), &mut runner).unwrap();
            assert_eq!(delivery.phase, Phase::HardStop);
            assert_eq!(delivery.trial.params, seed().params);
        }
        assert_eq!(runner.calls.len(), before + 5);
        assert!(runner.calls[before..].iter().all(|c| c.len() == 1));
    }

    #[test]
    fn test_zero_nhards_goes_straight_to_hard_stop() {
        let cfg = config(0, RepeatMode::None, 0);
        let mut ctl = controller(&cfg, &seed());
        ctl.process(&chunk(), &mut Scripted::new(flat)).unwrap();
        assert_eq!(ctl.phase(), Phase::HardStop);
    }

    #[test]
    fn test_improvement_is_delivered_and_resets_counter() {
        let cfg = config(5, RepeatMode::None, 0);
        let mut ctl = controller(&cfg, &seed());
        // Higher zstd levels compress better
        let mut runner = Scripted::new(|p: &CompressionParams| {
            Some(result(1000 - 50 * p.level as usize, 0.01))
        });

        ctl.process(&chunk(), &mut runner).unwrap();
        let mut improved = false;
        for _ in 0..20 {
            let delivery = ctl.process(&chunk(), &mut runner).unwrap();
            if delivery.trial.params.level > seed().params.level {
                improved = true;
            }
        }
        assert!(improved);
        assert!(ctl.best_params().unwrap().level > seed().params.level);
    }

    #[test]
    fn test_best_score_never_decreases() {
        let cfg = config(6, RepeatMode::All, 1);
        let mut ctl = controller(&cfg, &seed());
        let mut runner = Scripted::new(|p: &CompressionParams| {
            let csize = 300 + (p.blocksize / 1024 + p.level as usize * 7 + p.nthreads * 13) % 400;
            Some(result(csize, 0.001 * p.level as f64))
        });

        let mut last = f64::NEG_INFINITY;
        for _ in 0..60 {
            ctl.process(&chunk(), &mut runner).unwrap();
            assert!(ctl.state().best_score >= last);
            last = ctl.state().best_score;
        }
    }

    #[test]
    fn test_repeat_all_dwells_then_explores_again() {
        let cfg = config(1, RepeatMode::All, 2);
        let mut ctl = controller(&cfg, &seed());
        let mut runner = Scripted::new(flat);

        ctl.process(&chunk(), &mut runner).unwrap(); // warmup
        ctl.process(&chunk(), &mut runner).unwrap(); // explore, no gain
        assert_eq!(ctl.phase(), Phase::HardStop);
        ctl.process(&chunk(), &mut runner).unwrap();
        assert_eq!(ctl.phase(), Phase::Exploit);
        ctl.process(&chunk(), &mut runner).unwrap();
        assert_eq!(ctl.phase(), Phase::Exploit);
        ctl.process(&chunk(), &mut runner).unwrap();
        assert_eq!(ctl.phase(), Phase::Explore);
        assert_eq!(ctl.state().non_improving, 0);
    }

    #[test]
    fn test_repeat_current_keeps_codec_and_filter() {
        let cfg = TunerConfig {
            search_breadth: 8,
            ..config(2, RepeatMode::Current, 0)
        };
        let mut ctl = controller(&cfg, &seed());
        let mut runner = Scripted::new(flat);

        for _ in 0..12 {
            ctl.process(&chunk(), &mut runner).unwrap();
        }
        for call in &runner.calls {
            for p in call {
                assert_eq!(p.codec, CodecId::Zstd);
                assert_eq!(p.filter, FilterId::Shuffle);
            }
        }
    }

    #[test]
    fn test_pinned_fields_never_change() {
        let seed = seed().with_pinned(Pinned {
            codec: true,
            blocksize: true,
            ..Pinned::default()
        });
        let cfg = TunerConfig {
            search_breadth: 16,
            ..config(3, RepeatMode::All, 0)
        };
        let mut ctl = controller(&cfg, &seed);
        let mut runner = Scripted::new(|p: &CompressionParams| {
            Some(result(900 - 40 * p.level as usize, 0.01))
        });

        for _ in 0..15 {
            let delivery = ctl.process(&chunk(), &mut runner).unwrap();
            assert_eq!(delivery.trial.params.codec, CodecId::Zstd);
            assert_eq!(delivery.trial.params.blocksize, 64 * 1024);
        }
    }

    #[test]
    fn test_failed_exploit_falls_back_to_chunk_candidate() {
        let cfg = config(5, RepeatMode::None, 0);
        let mut ctl = controller(&cfg, &seed());
        let seed_params = seed().params;
        let mut warm = true;
        let mut runner = Scripted::new(move |p: &CompressionParams| {
            if *p == seed_params && !warm {
                return None;
            }
            warm = false;
            Some(result(500, 0.01))
        });

        ctl.process(&chunk(), &mut runner).unwrap();
        let delivery = ctl.process(&chunk(), &mut runner).unwrap();
        assert_ne!(delivery.trial.params, seed_params);
        assert!(ctl.trial_log().iter().any(|r| r.error.is_some()));
    }

    fn level_seed(level: u8) -> ParamSeed {
        ParamSeed::new(CompressionParams {
            level,
            ..seed_params()
        })
        .with_pinned(Pinned {
            codec: true,
            filter: true,
            blocksize: true,
            ..Pinned::default()
        })
    }

    #[test]
    fn test_slightly_worse_neighbor_does_not_replace_best() {
        let cfg = config(3, RepeatMode::None, 0);
        let mut ctl = controller(&cfg, &level_seed(9));
        // Each level below 9 loses 0.8% of its ratio, inside the tie epsilon
        let mut runner = Scripted::new(|p: &CompressionParams| {
            let ratio = 4.0 * 0.992_f64.powi(9 - i32::from(p.level));
            Some(result((1000.0 / ratio).round() as usize, 0.01))
        });

        for _ in 0..4 {
            ctl.process(&chunk(), &mut runner).unwrap();
            assert_eq!(ctl.best_params().unwrap().level, 9);
        }
        assert_eq!(ctl.phase(), Phase::HardStop);
        assert_eq!(ctl.state().non_improving, 3);
        assert_float_absolute_eq!(ctl.state().best.unwrap().score, 1.0, 1e-9);
    }

    /// Ratio scales with the chunk's first byte and grows 10% per level.
    struct ChunkScaled;

    impl TrialRunner for ChunkScaled {
        fn run(&mut self, candidates: &[CompressionParams], chunk: &Chunk) -> Vec<(CompressionParams, Result<Trial>)> {
            let factor = f64::from(chunk.as_bytes()[0]);
            candidates
                .iter()
                .map(|p| {
                    let ratio = factor * (1.0 + 0.1 * f64::from(p.level));
                    let r = result((1000.0 / ratio).round() as usize, 0.01);
                    let trial = Trial {
                        params: *p,
                        result: r,
                        compressed: vec![0; r.csize],
                    };
                    (*p, Ok(trial))
                })
                .collect()
        }
    }

    #[test]
    fn test_candidates_compared_on_same_chunk_as_best() {
        let cfg = config(3, RepeatMode::None, 0);
        let mut ctl = controller(&cfg, &level_seed(5));
        let mut runner = ChunkScaled;

        // The first chunk compresses three times better than the rest
        ctl.process(&Chunk::new(&[3u8; 64], 8), &mut runner).unwrap();
        let later = Chunk::new(&[1u8; 64], 8);
        for _ in 0..12 {
            ctl.process(&later, &mut runner).unwrap();
        }

        assert_eq!(ctl.best_params().unwrap().level, 9);
        assert_eq!(ctl.phase(), Phase::HardStop);
        // Best carries its measurement on the later data
        assert_float_absolute_eq!(ctl.state().best.unwrap().result.ratio(), 1.9, 0.01);
    }

    #[test]
    fn test_nothing_viable_is_an_error() {
        let cfg = config(5, RepeatMode::None, 0);
        let mut ctl = controller(&cfg, &seed());
        let outcome = ctl.process(&chunk(), &mut Scripted::new(|_: &CompressionParams| None));
        assert!(matches!(outcome, Err(TunerError::NoViableConfiguration(0))));
    }

    #[test]
    fn test_mandatory_trials_predictions_before_seed() {
        let predicted = CompressionParams {
            codec: CodecId::Lz4,
            filter: FilterId::Delta,
            level: 1,
            blocksize: 32 * 1024,
            typesize: 8,
            nthreads: 1,
        };
        let model = Model::new(vec![ModelEntry {
            features: ChunkFeatures::extract(&chunk()),
            tradeoff: Tradeoff::ratio_speed(1.0).unwrap(),
            ranked: vec![predicted],
        }]);
        let cfg = config(5, RepeatMode::None, 0);
        let advisor = InferenceAdvisor::with_model(InferenceLevel::Mandatory, model, 3);
        let space = ParameterSpace::new(&ParamSeed::new(seed_params()));
        let mut ctl = SearchController::new(&cfg, space, advisor);
        let mut runner = Scripted::new(flat);

        let delivery = ctl.process(&chunk(), &mut runner).unwrap();
        assert_eq!(runner.calls[0], vec![predicted]);
        assert_eq!(delivery.trial.params, predicted);
        assert_eq!(ctl.advisor().stats().accepted, 1);
    }
}
