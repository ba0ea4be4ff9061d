use crate::note::NoteKind;
use log::warn;
use smallvec::SmallVec;

/// Fixed 4-panel layout.
pub const NUM_LANES: usize = 4;

pub const BEATS_PER_MEASURE: f64 = 4.0;

/// An immutable note read from the grid; the judge engine turns these into
/// live [`crate::note::Note`] entities per attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedNote {
    pub beat: f64,
    pub lane: usize,
    pub kind: NoteKind,
    /// Closing tail for sustained heads; `None` when the head stays open to
    /// the end of the chart.
    pub tail_beat: Option<f64>,
}

/// Splits a raw note block into measures of non-blank lines. Measures are
/// `,`-separated; a measure with no rows is dropped without advancing the
/// measure counter.
pub fn parse_measures(raw: &str) -> Vec<Vec<String>> {
    raw.split(',')
        .map(|measure| {
            measure
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|rows: &Vec<String>| !rows.is_empty())
        .collect()
}

/// Beat of row `row` in measure `measure_index` with `rows` rows total.
#[inline(always)]
pub fn beat_for_row(measure_index: usize, row: usize, rows: usize) -> f64 {
    measure_index as f64 * BEATS_PER_MEASURE
        + (row as f64 / rows as f64) * BEATS_PER_MEASURE
}

// Pass-1 record: one non-empty grid symbol, in grid order.
#[derive(Debug, Clone, Copy)]
enum RawSymbol {
    Head(NoteKind),
    Tail,
}

/// Builds the note list from a (possibly skip-neutralized) measure grid.
///
/// Two passes: the first flattens the grid into per-symbol records in grid
/// order, the second pairs hold/roll heads with tails by index. A tail
/// closes the most recent open head in its lane; a tail with no open head
/// is ignored; a head with no tail stays open-ended.
pub fn build_notes(measures: &[Vec<String>]) -> Vec<ParsedNote> {
    let mut raw: Vec<(f64, usize, RawSymbol)> = Vec::new();
    for (measure_index, rows) in measures.iter().enumerate() {
        let count = rows.len();
        for (row, line) in rows.iter().enumerate() {
            let beat = beat_for_row(measure_index, row, count);
            if line.chars().count() != NUM_LANES {
                warn!(
                    "measure {measure_index} row {row}: {} symbols, expected {NUM_LANES}",
                    line.chars().count()
                );
            }
            for (lane, symbol) in line.chars().take(NUM_LANES).enumerate() {
                let sym = match symbol {
                    '0' => continue,
                    '1' => RawSymbol::Head(NoteKind::Tap),
                    '2' => RawSymbol::Head(NoteKind::Hold),
                    '4' => RawSymbol::Head(NoteKind::Roll),
                    '3' => RawSymbol::Tail,
                    // Outside the judged alphabet: tolerated, not judged.
                    _ => continue,
                };
                raw.push((beat, lane, sym));
            }
        }
    }

    let mut notes: Vec<ParsedNote> = Vec::with_capacity(raw.len());
    let mut open: [SmallVec<[usize; 2]>; NUM_LANES] = Default::default();
    for &(beat, lane, sym) in &raw {
        match sym {
            RawSymbol::Head(kind) => {
                if kind.is_sustained() {
                    open[lane].push(notes.len());
                }
                notes.push(ParsedNote { beat, lane, kind, tail_beat: None });
            }
            RawSymbol::Tail => match open[lane].pop() {
                Some(head) => notes[head].tail_beat = Some(beat),
                None => warn!("tail at beat {beat} lane {lane} closes nothing"),
            },
        }
    }
    notes
}
