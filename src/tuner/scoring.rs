use std::cmp::Ordering;

use crate::config::{PerfMode, Tradeoff};
use crate::models::{CompressionParams, TrialResult};

/// A trial result together with the score it earned.
#[derive(Debug, Clone, Copy)]
pub struct Scored {
    pub params: CompressionParams,
    pub result: TrialResult,
    pub score: f64,
}

/// Turns trial results into a single scalar per the tradeoff weights.
///
/// The score is
/// `w_ratio * ratio / best_ratio + w_speed * speed / best_speed + w_quality * quality`,
/// where the bases are the best ratio and throughput observed so far in the
/// session. Scores therefore stay comparable across chunks whatever the
/// absolute data scale, and a trial that sets a new record scores above 1 on
/// that term until the base catches up.
#[derive(Debug, Clone)]
pub struct TradeoffScorer {
    tradeoff: Tradeoff,
    perf_mode: PerfMode,
    epsilon: f64,
    best_ratio: f64,
    best_throughput: f64,
}

/// `value` as a fraction of the session best; before any observation a
/// value is its own base. Zero over zero counts as a full score.
fn relative(value: f64, best: f64) -> f64 {
    let base = if best > 0.0 { best } else { value };
    if base > 0.0 { value / base } else { 1.0 }
}

impl TradeoffScorer {
    pub fn new(tradeoff: Tradeoff, perf_mode: PerfMode, epsilon: f64) -> Self {
        Self {
            tradeoff,
            perf_mode,
            epsilon,
            best_ratio: 0.0,
            best_throughput: 0.0,
        }
    }

    /// Current normalization bases: (best ratio, best throughput).
    pub fn bases(&self) -> (f64, f64) {
        (self.best_ratio, self.best_throughput)
    }

    /// Fold a result into the session-best bases.
    pub fn observe(&mut self, result: &TrialResult) {
        self.best_ratio = self.best_ratio.max(result.ratio());
        self.best_throughput = self.best_throughput.max(result.throughput(self.perf_mode));
    }

    pub fn score(&self, result: &TrialResult) -> f64 {
        self.tradeoff.ratio_weight() * relative(result.ratio(), self.best_ratio)
            + self.tradeoff.speed_weight()
                * relative(result.throughput(self.perf_mode), self.best_throughput)
            + self.tradeoff.quality_weight() * result.quality_or_lossless()
    }

    pub fn scored(&self, params: CompressionParams, result: TrialResult) -> Scored {
        Scored {
            params,
            result,
            score: self.score(&result),
        }
    }

    /// Whether `challenger` beats `incumbent` by more than epsilon. Ties never do.
    pub fn improves(&self, challenger: &Scored, incumbent: &Scored) -> bool {
        challenger.score - incumbent.score > self.epsilon
    }

    /// Fewer threads first, then a lower level.
    fn tie_break(a: &Scored, b: &Scored) -> Ordering {
        b.params
            .nthreads
            .cmp(&a.params.nthreads)
            .then(b.params.level.cmp(&a.params.level))
    }

    /// Preference between two scored candidates.
    ///
    /// Scores further apart than epsilon decide. Otherwise fewer threads
    /// wins, then a lower level; anything else is a tie.
    pub fn compare(&self, a: &Scored, b: &Scored) -> Ordering {
        if self.improves(a, b) {
            Ordering::Greater
        } else if self.improves(b, a) {
            Ordering::Less
        } else {
            Self::tie_break(a, b)
        }
    }

    /// Index of the preferred candidate.
    ///
    /// 1. Find the best raw score
    /// 2. Keep finalists within epsilon of it
    /// 3. Settle by fewer threads, lower level, higher score, then first seen
    pub fn pick_best(&self, candidates: &[Scored]) -> Option<usize> {
        let best_score = candidates
            .iter()
            .map(|c| c.score)
            .fold(f64::NEG_INFINITY, f64::max);

        let threshold = best_score - self.epsilon;
        let mut finalists: Vec<usize> = (0..candidates.len())
            .filter(|&i| candidates[i].score >= threshold)
            .collect();

        finalists.sort_by(|&i, &j| {
            let (a, b) = (&candidates[i], &candidates[j]);
            Self::tie_break(b, a)
                .then(b.score.total_cmp(&a.score))
                .then(i.cmp(&j))
        });

        finalists.first().copied()
    }

    /// Candidate indices from most to least preferred.
    pub fn rank(&self, candidates: &[Scored]) -> Vec<usize> {
        let mut remaining: Vec<usize> = (0..candidates.len()).collect();
        let mut order = Vec::with_capacity(candidates.len());
        while !remaining.is_empty() {
            let pool: Vec<Scored> = remaining.iter().map(|&i| candidates[i]).collect();
            let Some(pos) = self.pick_best(&pool) else {
                break;
            };
            order.push(remaining.remove(pos));
        }
        order
    }
}
