//! Timing and judgement core for 4-panel rhythm charts.
//!
//! The crate turns a chart's tempo map (BPM changes, stops, warps) into a
//! single beat↔seconds mapping ([`timing::TimingData`]), removes content
//! that can never be heard ([`skips`]), and judges player input against it
//! in real time ([`engine::JudgeEngine`]) with automatic latency
//! calibration. Rendering, audio and persistence live in the host; the core
//! only exchanges plain data with them.

pub mod chart;
pub mod engine;
pub mod judge;
pub mod note;
pub mod score;
pub mod skips;
pub mod timing;

pub use chart::{build_notes, parse_measures, ParsedNote, NUM_LANES};
pub use engine::{JudgeEngine, JudgeError, JudgeSummary, KeyDownOutcome, KeyUpOutcome, NoteEvent};
pub use judge::{accuracy, JudgeConfig, JudgeWindow};
pub use note::{Note, NoteKind, NoteState};
pub use score::ScoreKeeper;
pub use skips::{neutralize_skipped, skipped_intervals, BeatInterval};
pub use timing::{BpmChange, StopSegment, TempoEvent, TimingData, WarpSegment};
