use crate::chart::{ParsedNote, NUM_LANES};
use crate::judge::{accuracy, JudgeConfig, JudgeWindow};
use crate::note::{Note, NoteKind, NoteState};
use crate::score::ScoreKeeper;
use crate::timing::{TimingData, TIMING_EPSILON};
use log::{debug, info};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

/// Calibration taps quantize to this grid (8th notes).
const CALIBRATION_GRID_BEATS: f64 = 0.5;

/// Host-integration bugs; content-shaped problems never raise.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JudgeError {
    #[error("lane index {0} out of range (expected 0..{NUM_LANES})")]
    InvalidLane(usize),
}

/// What a key-down resolved to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyDownOutcome {
    /// Pre-chart press absorbed by the latency estimator.
    Calibration { raw_error_ms: f64, accepted: bool },
    /// A pending note in the pressed lane was judged.
    Judged { score: f64, error_ms: f64 },
    /// Nothing hittable anywhere near the press.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyUpOutcome {
    /// The hold's release was scored against its tail.
    Released { score: f64, error_ms: f64 },
    /// Let go before the release window opened.
    Dropped,
    /// No active hold in that lane.
    Ignored,
}

/// A judged transition, drained by the presentation layer. Plain data; the
/// core never calls into rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub lane: usize,
    pub beat: f64,
    pub kind: NoteKind,
    pub state: NoteState,
    pub score: f64,
    /// Signed raw timing error; `None` for timeouts and forced misses.
    pub error_ms: Option<f64>,
    /// Deviation below the recent baseline, weighted; drives feedback
    /// intensity only.
    pub impact: f64,
}

/// Attempt-wide snapshot for display consumers.
#[derive(Debug, Clone)]
pub struct JudgeSummary {
    pub accuracy: f64,
    pub miss_count: u32,
    pub input_offset_ms: f64,
    pub state_counts: FxHashMap<NoteState, u32>,
}

// Running latency estimate: cumulative mean of every raw hit error this
// attempt, unless the player pinned a fixed offset.
#[derive(Debug, Clone)]
struct InputCalibration {
    hit_errors_ms: Vec<f64>,
    dynamic_offset_ms: f64,
    default_offset_ms: f64,
    fixed_offset_ms: Option<f64>,
}

impl InputCalibration {
    fn new(default_offset_ms: f64, fixed_offset_ms: Option<f64>) -> Self {
        Self {
            hit_errors_ms: Vec::new(),
            dynamic_offset_ms: default_offset_ms,
            default_offset_ms,
            fixed_offset_ms,
        }
    }

    // A fixed lock survives resets; the running mean does not.
    fn reset(&mut self) {
        self.hit_errors_ms.clear();
        self.dynamic_offset_ms = self.default_offset_ms;
    }

    fn record(&mut self, raw_error_ms: f64) {
        self.hit_errors_ms.push(raw_error_ms);
        self.dynamic_offset_ms =
            self.hit_errors_ms.iter().sum::<f64>() / self.hit_errors_ms.len() as f64;
    }

    fn offset_ms(&self) -> f64 {
        self.fixed_offset_ms.unwrap_or(self.dynamic_offset_ms)
    }
}

/// The judge for one attempt: owns the live note list, the score
/// accumulators and the latency estimator. One instance per attempt;
/// [`JudgeEngine::reset`] recycles it for the next one. All operations take
/// the current player time read by the host at call time.
#[derive(Debug)]
pub struct JudgeEngine {
    timing: Arc<TimingData>,
    chart: Vec<ParsedNote>,
    config: JudgeConfig,
    notes: Vec<Note>,
    scores: ScoreKeeper,
    calibration: InputCalibration,
    min_judge_time: f64,
    first_judgable_time: f64,
    /// On a mid-song start this stays false until the first key press, and
    /// overdue notes are quietly retired instead of missed; an attempt from
    /// the top judges from the first frame.
    is_judging: bool,
    events: Vec<NoteEvent>,
}

impl JudgeEngine {
    pub fn new(timing: Arc<TimingData>, chart: Vec<ParsedNote>, config: JudgeConfig) -> Self {
        let calibration =
            InputCalibration::new(config.default_input_offset_ms, config.fixed_input_offset_ms);
        let scores = ScoreKeeper::new(config.score_history_len);
        let mut engine = Self {
            timing,
            chart,
            config,
            notes: Vec::new(),
            scores,
            calibration,
            min_judge_time: f64::NEG_INFINITY,
            first_judgable_time: f64::INFINITY,
            is_judging: false,
            events: Vec::new(),
        };
        engine.reset(0.0);
        engine
    }

    /// Rebuilds every note from the chart for a fresh attempt starting at
    /// `start_beat`. Notes scheduled before the start are retired as
    /// irrelevant rather than missed.
    pub fn reset(&mut self, start_beat: f64) {
        // Epsilon keeps a note exactly on the start beat judgeable.
        self.min_judge_time = self.timing.time_at_beat(start_beat) - TIMING_EPSILON;

        self.notes.clear();
        for parsed in &self.chart {
            let time = self.timing.time_at_beat(parsed.beat);
            let (end_beat, end_time) = if parsed.kind.is_sustained() {
                match parsed.tail_beat {
                    Some(tail) => (Some(tail), Some(self.timing.time_at_beat(tail))),
                    None => (None, Some(f64::INFINITY)),
                }
            } else {
                (None, None)
            };
            let state = if time > self.min_judge_time {
                NoteState::Pending
            } else {
                NoteState::Irrelevant
            };
            self.notes.push(Note {
                beat: parsed.beat,
                time,
                lane: parsed.lane,
                kind: parsed.kind,
                state,
                end_beat,
                end_time,
            });
        }
        self.notes.sort_by(|a, b| {
            a.time
                .partial_cmp(&b.time)
                .unwrap_or(Ordering::Equal)
                .then(a.lane.cmp(&b.lane))
        });

        self.first_judgable_time = self
            .notes
            .iter()
            .find(|n| n.state == NoteState::Pending)
            .map(|n| n.time - self.head_window(n.kind).miss_ms / 1000.0)
            .unwrap_or(f64::INFINITY);

        self.scores.reset();
        self.calibration.reset();
        self.is_judging = start_beat <= TIMING_EPSILON;
        self.events.clear();

        let irrelevant = self.notes.iter().filter(|n| n.state == NoteState::Irrelevant).count();
        info!(
            "judging reset: {} notes ({} before start), offset {:.1}ms",
            self.notes.len(),
            irrelevant,
            self.calibration.offset_ms()
        );
    }

    /// Discrete press in `lane` at the current player time (seconds).
    ///
    /// Before the first judgeable note becomes hittable this is a
    /// calibration tap; afterwards the nearest pending note in the lane is
    /// judged, and in strict mode pending notes in other lanes within their
    /// miss window are punished as wrong-key misses.
    pub fn on_key_down(
        &mut self,
        lane: usize,
        player_time: f64,
    ) -> Result<KeyDownOutcome, JudgeError> {
        if lane >= NUM_LANES {
            return Err(JudgeError::InvalidLane(lane));
        }
        self.is_judging = true;

        if player_time < self.first_judgable_time {
            return Ok(self.calibration_tap(player_time));
        }

        let mut best: Option<(usize, f64)> = None;
        for (i, n) in self.notes.iter().enumerate() {
            if n.lane != lane || n.state != NoteState::Pending {
                continue;
            }
            let abs_ms = ((player_time - n.time) * 1000.0).abs();
            match best {
                Some((_, best_ms)) if abs_ms >= best_ms => {}
                _ => best = Some((i, abs_ms)),
            }
        }

        let mut outcome = KeyDownOutcome::Ignored;
        if let Some((index, abs_ms)) = best {
            let window = self.head_window(self.notes[index].kind);
            // Far boundary is exclusive: an error of exactly the miss
            // window does not count as a hit.
            if abs_ms < window.miss_ms {
                outcome = self.judge_head(index, player_time, window);
            }
        }

        if self.config.strict {
            self.punish_cross_lane(lane, player_time);
        }
        Ok(outcome)
    }

    /// Discrete release in `lane` at the current player time (seconds).
    pub fn on_key_up(
        &mut self,
        lane: usize,
        player_time: f64,
    ) -> Result<KeyUpOutcome, JudgeError> {
        if lane >= NUM_LANES {
            return Err(JudgeError::InvalidLane(lane));
        }
        let Some(index) = self
            .notes
            .iter()
            .position(|n| n.lane == lane && n.state == NoteState::Active)
        else {
            return Ok(KeyUpOutcome::Ignored);
        };

        let end_time = self.notes[index].end_time.unwrap_or(f64::INFINITY);
        let release = self.config.hold_release;
        if player_time < end_time - release.miss_ms / 1000.0 {
            // Let go before the release window opened: a dropped hold.
            self.notes[index].state = NoteState::MissedRelease;
            let weight = self.config.hold_release_weight;
            let impact = self.scores.record(0.0, weight);
            self.push_event(index, 0.0, None, impact);
            debug!("hold dropped: lane={lane} beat={:.3}", self.notes[index].beat);
            return Ok(KeyUpOutcome::Dropped);
        }

        let raw_ms = (player_time - end_time) * 1000.0;
        let calibrated = raw_ms - self.calibration.offset_ms();
        let score = accuracy(calibrated.abs(), release.perfect_ms, release.miss_ms);
        self.notes[index].state = NoteState::Hit;
        let impact = self.scores.record(score, self.config.hold_release_weight);
        self.push_event(index, score, Some(raw_ms), impact);
        debug!(
            "hold released: lane={lane} beat={:.3} err_ms={raw_ms:.2} score={score:.1}",
            self.notes[index].beat
        );
        Ok(KeyUpOutcome::Released { score, error_ms: raw_ms })
    }

    /// Per-frame poll. Pending notes past their miss window time out (or
    /// are quietly retired, one per call, while no key has been pressed
    /// yet); active holds past their tail's window are dropped.
    pub fn tick(&mut self, player_time: f64) {
        for index in 0..self.notes.len() {
            if self.notes[index].time > player_time {
                // Sorted by time: nothing further can be overdue.
                break;
            }
            if self.notes[index].state != NoteState::Pending {
                continue;
            }
            let window = self.head_window(self.notes[index].kind);
            if (player_time - self.notes[index].time) * 1000.0 <= window.miss_ms {
                continue;
            }
            if !self.is_judging {
                self.notes[index].state = NoteState::Irrelevant;
                break;
            }
            self.miss_note(index);
        }

        let release_miss_s = self.config.hold_release.miss_ms / 1000.0;
        for index in 0..self.notes.len() {
            if self.notes[index].state != NoteState::Active {
                continue;
            }
            let end_time = self.notes[index].end_time.unwrap_or(f64::INFINITY);
            if end_time.is_finite() && player_time > end_time + release_miss_s {
                self.notes[index].state = NoteState::MissedRelease;
                let impact = self.scores.record(0.0, self.config.hold_release_weight);
                self.push_event(index, 0.0, None, impact);
                debug!(
                    "hold timed out: lane={} beat={:.3}",
                    self.notes[index].lane, self.notes[index].beat
                );
            }
        }
    }

    /// Ends the attempt. A hold still engaged at the end of the song gets
    /// full release credit, whether or not it ever had a tail.
    pub fn finish(&mut self) {
        for index in 0..self.notes.len() {
            if self.notes[index].state == NoteState::Active {
                self.notes[index].state = NoteState::Hit;
                let impact = self.scores.record(100.0, self.config.hold_release_weight);
                self.push_event(index, 100.0, None, impact);
            }
        }
    }

    /// Pins the latency estimate, or un-pins it back to the running mean.
    pub fn set_fixed_offset(&mut self, fixed_offset_ms: Option<f64>) {
        self.calibration.fixed_offset_ms = fixed_offset_ms;
    }

    pub fn accuracy(&self) -> f64 {
        self.scores.accuracy()
    }

    pub fn miss_count(&self) -> u32 {
        self.scores.miss_count()
    }

    pub fn input_offset_ms(&self) -> f64 {
        self.calibration.offset_ms()
    }

    pub fn is_judging(&self) -> bool {
        self.is_judging
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Takes all judged transitions accumulated since the last drain.
    pub fn drain_events(&mut self) -> Vec<NoteEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn summary(&self) -> JudgeSummary {
        let mut state_counts: FxHashMap<NoteState, u32> = FxHashMap::default();
        for n in &self.notes {
            *state_counts.entry(n.state).or_insert(0) += 1;
        }
        JudgeSummary {
            accuracy: self.scores.accuracy(),
            miss_count: self.scores.miss_count(),
            input_offset_ms: self.calibration.offset_ms(),
            state_counts,
        }
    }

    #[inline(always)]
    fn head_window(&self, kind: NoteKind) -> JudgeWindow {
        if kind.is_sustained() { self.config.hold_head } else { self.config.tap }
    }

    // Quantize the press to the nearest half-beat grid point and feed the
    // estimator when the error is plausible latency.
    fn calibration_tap(&mut self, player_time: f64) -> KeyDownOutcome {
        let beat = self.timing.beat_at_time(player_time);
        let lower = (beat / CALIBRATION_GRID_BEATS).floor() * CALIBRATION_GRID_BEATS;
        let upper = lower + CALIBRATION_GRID_BEATS;
        let err_lower = player_time - self.timing.time_at_beat(lower);
        let err_upper = player_time - self.timing.time_at_beat(upper);
        let raw_s = if err_lower.abs() <= err_upper.abs() { err_lower } else { err_upper };
        let raw_error_ms = raw_s * 1000.0;

        let accepted = raw_error_ms > self.config.calibration_accept_min_ms
            && raw_error_ms < self.config.calibration_accept_max_ms;
        if accepted {
            self.calibration.record(raw_error_ms);
            debug!(
                "calibration tap: err_ms={raw_error_ms:.2} offset={:.2}",
                self.calibration.offset_ms()
            );
        }
        KeyDownOutcome::Calibration { raw_error_ms, accepted }
    }

    fn judge_head(
        &mut self,
        index: usize,
        player_time: f64,
        window: JudgeWindow,
    ) -> KeyDownOutcome {
        let raw_ms = (player_time - self.notes[index].time) * 1000.0;
        self.calibration.record(raw_ms);
        let calibrated = raw_ms - self.calibration.offset_ms();
        let score = accuracy(calibrated.abs(), window.perfect_ms, window.miss_ms);

        if self.notes[index].kind.is_sustained() {
            // At most one hold may be engaged per lane; a stale one (the
            // host lost its key-up) is resolved as dropped first.
            let lane = self.notes[index].lane;
            if let Some(stale) = self
                .notes
                .iter()
                .position(|n| n.lane == lane && n.state == NoteState::Active)
            {
                self.notes[stale].state = NoteState::MissedRelease;
                let impact = self.scores.record(0.0, self.config.hold_release_weight);
                self.push_event(stale, 0.0, None, impact);
            }
            self.notes[index].state = NoteState::Active;
        } else {
            self.notes[index].state = NoteState::Hit;
        }

        let impact = self.scores.record(score, self.config.tap_note_weight);
        self.push_event(index, score, Some(raw_ms), impact);
        debug!(
            "hit: lane={} beat={:.3} err_ms={raw_ms:.2} cal_ms={calibrated:.2} score={score:.1}",
            self.notes[index].lane, self.notes[index].beat
        );
        KeyDownOutcome::Judged { score, error_ms: raw_ms }
    }

    // Strict mode: a press also condemns every still-pending note in the
    // OTHER lanes that was close enough to hit, as if a wrong string had
    // been struck on a real instrument.
    fn punish_cross_lane(&mut self, pressed_lane: usize, player_time: f64) {
        for index in 0..self.notes.len() {
            let n = &self.notes[index];
            if n.lane == pressed_lane || n.state != NoteState::Pending {
                continue;
            }
            let window = self.head_window(n.kind);
            if ((player_time - n.time) * 1000.0).abs() < window.miss_ms {
                debug!("strict miss: lane={} beat={:.3}", n.lane, n.beat);
                self.miss_note(index);
            }
        }
    }

    // Zero-score the head (and the release, for sustained notes).
    fn miss_note(&mut self, index: usize) {
        self.notes[index].state = NoteState::Missed;
        self.scores.count_miss();
        let impact = self.scores.record(0.0, self.config.tap_note_weight);
        if self.notes[index].kind.is_sustained() {
            self.scores.record(0.0, self.config.hold_release_weight);
        }
        self.push_event(index, 0.0, None, impact);
        debug!(
            "miss: lane={} beat={:.3}",
            self.notes[index].lane, self.notes[index].beat
        );
    }

    fn push_event(&mut self, index: usize, score: f64, error_ms: Option<f64>, impact: f64) {
        let n = &self.notes[index];
        self.events.push(NoteEvent {
            lane: n.lane,
            beat: n.beat,
            kind: n.kind,
            state: n.state,
            score,
            error_ms,
            impact,
        });
    }
}
