use std::collections::VecDeque;

/// Baseline reported while the recent ring is still empty; keeps the
/// visual-impact signal calm at the start of an attempt.
pub const EMPTY_BASELINE_SCORE: f64 = 93.0;

/// One judged result: a 0–100 score and the weight it carries toward the
/// attempt accuracy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreEvent {
    pub score: f64,
    pub weight: f64,
}

/// Running weighted accuracy for one attempt, plus a bounded ring of recent
/// events feeding the deviation-based "impact" signal. The official
/// accuracy is the weighted mean over every event so far; the ring only
/// shapes visual feedback.
#[derive(Debug, Clone)]
pub struct ScoreKeeper {
    total_weighted_score: f64,
    total_weight: f64,
    miss_count: u32,
    history_len: usize,
    recent: VecDeque<ScoreEvent>,
}

impl ScoreKeeper {
    pub fn new(history_len: usize) -> Self {
        Self {
            total_weighted_score: 0.0,
            total_weight: 0.0,
            miss_count: 0,
            history_len,
            recent: VecDeque::with_capacity(history_len),
        }
    }

    pub fn reset(&mut self) {
        self.total_weighted_score = 0.0;
        self.total_weight = 0.0;
        self.miss_count = 0;
        self.recent.clear();
    }

    /// Records one score event and returns its visual impact: how far the
    /// event fell below the recent baseline, weighted, floored at zero.
    pub fn record(&mut self, score: f64, weight: f64) -> f64 {
        let impact = ((self.recent_baseline() - score) * weight).max(0.0);
        self.total_weighted_score += score * weight;
        self.total_weight += weight;
        if self.history_len > 0 {
            if self.recent.len() == self.history_len {
                self.recent.pop_front();
            }
            self.recent.push_back(ScoreEvent { score, weight });
        }
        impact
    }

    pub fn count_miss(&mut self) {
        self.miss_count += 1;
    }

    /// Official running accuracy; 100 before the first judged event.
    pub fn accuracy(&self) -> f64 {
        if self.total_weight <= 0.0 {
            100.0
        } else {
            self.total_weighted_score / self.total_weight
        }
    }

    pub fn miss_count(&self) -> u32 {
        self.miss_count
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Weighted mean of the recent ring, or the calm default when empty.
    pub fn recent_baseline(&self) -> f64 {
        let weight: f64 = self.recent.iter().map(|e| e.weight).sum();
        if weight <= 0.0 {
            return EMPTY_BASELINE_SCORE;
        }
        self.recent.iter().map(|e| e.score * e.weight).sum::<f64>() / weight
    }
}
