/// What a note asks of the player: one press, or a press held to a tail.
/// Rolls share the hold state machine here; the distinction is kept for
/// display consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteKind {
    Tap,
    Hold,
    Roll,
}

impl NoteKind {
    #[inline(always)]
    pub const fn is_sustained(self) -> bool {
        matches!(self, Self::Hold | Self::Roll)
    }
}

/// Per-note judging state.
///
/// Taps: `Pending -> Hit | Missed | Irrelevant`.
/// Holds: `Pending -> Active -> Hit | MissedRelease`, or `Pending -> Missed`
/// (a missed head forfeits the release too), or `Pending -> Irrelevant`.
/// `Irrelevant` and the terminal states never revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteState {
    Pending,
    Active,
    Hit,
    Missed,
    MissedRelease,
    Irrelevant,
}

impl NoteState {
    #[inline(always)]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Hit | Self::Missed | Self::MissedRelease | Self::Irrelevant)
    }
}

/// One judgeable note of the current attempt. Owned exclusively by the
/// judge engine; rebuilt from the chart on every reset.
#[derive(Debug, Clone)]
pub struct Note {
    pub beat: f64,
    pub time: f64,
    pub lane: usize,
    pub kind: NoteKind,
    pub state: NoteState,
    /// Tail position for sustained notes; `None` for taps.
    pub end_beat: Option<f64>,
    /// Tail time for sustained notes; `f64::INFINITY` when the head never
    /// closes before the end of the chart. `None` for taps.
    pub end_time: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sustained_kinds() {
        assert!(!NoteKind::Tap.is_sustained());
        assert!(NoteKind::Hold.is_sustained());
        assert!(NoteKind::Roll.is_sustained());
    }

    #[test]
    fn terminal_states() {
        assert!(!NoteState::Pending.is_terminal());
        assert!(!NoteState::Active.is_terminal());
        assert!(NoteState::Hit.is_terminal());
        assert!(NoteState::Missed.is_terminal());
        assert!(NoteState::MissedRelease.is_terminal());
        assert!(NoteState::Irrelevant.is_terminal());
    }
}
