use crate::timing::{BpmChange, StopSegment, TimingData, WarpSegment, TIMING_EPSILON};
use log::info;

/// A half-open beat range `(start, end]` that is never audible. The start
/// boundary itself still plays: notes on a warp's or negative stop's
/// triggering beat ring normally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatInterval {
    pub start: f64,
    pub end: f64,
}

impl BeatInterval {
    #[inline(always)]
    pub fn contains(&self, beat: f64) -> bool {
        beat > self.start + TIMING_EPSILON && beat <= self.end + TIMING_EPSILON
    }
}

/// Computes the merged set of beat ranges skipped by warps and by
/// negative-duration stops.
///
/// A warp of length L skips `(beat, beat+L]` directly. A negative stop
/// deletes `|duration|` seconds of real time; the equivalent beat span is
/// resolved on an auxiliary timeline with every negative stop coerced to
/// zero (that map stays monotonic, so the reverse query is meaningful).
pub fn skipped_intervals(
    bpms: &[BpmChange],
    stops: &[StopSegment],
    warps: &[WarpSegment],
) -> Vec<BeatInterval> {
    let mut intervals = Vec::new();

    for w in warps {
        if w.length > 0.0 {
            intervals.push(BeatInterval { start: w.beat, end: w.beat + w.length });
        }
    }

    if stops.iter().any(|s| s.duration < 0.0) {
        let coerced: Vec<StopSegment> = stops
            .iter()
            .map(|s| StopSegment { beat: s.beat, duration: s.duration.max(0.0) })
            .collect();
        let aux = TimingData::from_lists(bpms, &coerced, warps);
        for s in stops.iter().filter(|s| s.duration < 0.0) {
            let t0 = aux.time_at_beat(s.beat);
            let end = aux.beat_at_time(t0 - s.duration);
            if end > s.beat + TIMING_EPSILON {
                intervals.push(BeatInterval { start: s.beat, end });
            }
        }
    }

    merge_intervals(&mut intervals);
    if !intervals.is_empty() {
        info!("{} skipped beat ranges", intervals.len());
    }
    intervals
}

// Sort by start and coalesce overlapping or adjacent ranges.
fn merge_intervals(intervals: &mut Vec<BeatInterval>) {
    intervals.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));
    let mut merged: Vec<BeatInterval> = Vec::with_capacity(intervals.len());
    for iv in intervals.drain(..) {
        match merged.last_mut() {
            Some(last) if iv.start <= last.end + TIMING_EPSILON => {
                if iv.end > last.end {
                    last.end = iv.end;
                }
            }
            _ => merged.push(iv),
        }
    }
    *intervals = merged;
}

#[inline(always)]
pub fn is_beat_skipped(intervals: &[BeatInterval], beat: f64) -> bool {
    intervals.iter().any(|iv| iv.contains(beat))
}

/// Blanks out every line of the measure grid whose beat falls inside a
/// skipped range, so those notes never reach the judge. Idempotent:
/// neutralized lines are all-`'0'` and stay that way.
pub fn neutralize_skipped(measures: &mut [Vec<String>], intervals: &[BeatInterval]) {
    if intervals.is_empty() {
        return;
    }
    for (measure_index, measure) in measures.iter_mut().enumerate() {
        let rows = measure.len();
        if rows == 0 {
            continue;
        }
        for (row, line) in measure.iter_mut().enumerate() {
            let beat = measure_index as f64 * 4.0 + (row as f64 / rows as f64) * 4.0;
            if is_beat_skipped(intervals, beat) && line.contains(|c| c != '0') {
                *line = "0".repeat(line.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warp_skips_half_open_range() {
        let intervals = skipped_intervals(
            &[BpmChange { beat: 0.0, bpm: 120.0 }],
            &[],
            &[WarpSegment { beat: 8.0, length: 4.0 }],
        );
        assert_eq!(intervals.len(), 1);
        // The triggering beat itself still plays.
        assert!(!is_beat_skipped(&intervals, 8.0));
        assert!(is_beat_skipped(&intervals, 8.1));
        assert!(is_beat_skipped(&intervals, 12.0));
        assert!(!is_beat_skipped(&intervals, 12.1));
    }

    #[test]
    fn negative_stop_resolves_to_beat_span() {
        // At 120 bpm, deleting 1s of time swallows 2 beats.
        let intervals = skipped_intervals(
            &[BpmChange { beat: 0.0, bpm: 120.0 }],
            &[StopSegment { beat: 4.0, duration: -1.0 }],
            &[],
        );
        assert_eq!(intervals.len(), 1);
        assert!((intervals[0].start - 4.0).abs() < 1e-6);
        assert!((intervals[0].end - 6.0).abs() < 1e-6);
        assert!(!is_beat_skipped(&intervals, 4.0));
        assert!(is_beat_skipped(&intervals, 5.0));
        assert!(!is_beat_skipped(&intervals, 6.5));
    }

    #[test]
    fn negative_stop_span_respects_other_stops() {
        // A positive stop inside the deleted span eats part of the deleted
        // time, so fewer beats are swallowed.
        let intervals = skipped_intervals(
            &[BpmChange { beat: 0.0, bpm: 120.0 }],
            &[
                StopSegment { beat: 4.0, duration: -1.0 },
                StopSegment { beat: 5.0, duration: 0.5 },
            ],
            &[],
        );
        assert_eq!(intervals.len(), 1);
        assert!((intervals[0].end - 5.0).abs() < 1e-6);
    }

    #[test]
    fn overlapping_intervals_merge() {
        let intervals = skipped_intervals(
            &[BpmChange { beat: 0.0, bpm: 120.0 }],
            &[],
            &[
                WarpSegment { beat: 4.0, length: 4.0 },
                WarpSegment { beat: 6.0, length: 6.0 },
                WarpSegment { beat: 20.0, length: 1.0 },
            ],
        );
        assert_eq!(intervals.len(), 2);
        assert!((intervals[0].start - 4.0).abs() < 1e-9);
        assert!((intervals[0].end - 12.0).abs() < 1e-9);
    }

    #[test]
    fn neutralization_is_idempotent() {
        let warps = [WarpSegment { beat: 1.0, length: 2.0 }];
        let intervals =
            skipped_intervals(&[BpmChange { beat: 0.0, bpm: 120.0 }], &[], &warps);
        let mut measures = vec![vec![
            "1000".to_string(), // beat 0.0
            "0100".to_string(), // beat 1.0 (trigger: survives)
            "0010".to_string(), // beat 2.0 (skipped)
            "0001".to_string(), // beat 3.0 (skipped)
        ]];
        neutralize_skipped(&mut measures, &intervals);
        let once = measures.clone();
        neutralize_skipped(&mut measures, &intervals);
        assert_eq!(measures, once);
        assert_eq!(measures[0][0], "1000");
        assert_eq!(measures[0][1], "0100");
        assert_eq!(measures[0][2], "0000");
        assert_eq!(measures[0][3], "0000");
    }
}
