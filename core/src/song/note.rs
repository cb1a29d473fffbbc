//! A single note event inside a [`super::note_row::NoteRow`].

use serde::{Deserialize, Serialize};

/// One dimension of MPE (MIDI Polyphonic Expression) automation recorded on a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MpeDimension {
    PitchBend,
    ChannelPressure,
    Timbre,
}

/// A single "stolen param" automation point recorded against a note, expressed as an offset
/// from the note's own `pos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MpeNode {
    pub tick_offset: i64,
    pub dimension: MpeDimension,
    /// 14-bit-resolution value, stored pre-scaled; rendering (out of scope) interprets it.
    pub value: i16,
}

/// Raw `Note::probability` byte. Opaque on the wire; decode with [`Probability::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probability(pub u8);

/// Decoded meaning of a [`Probability`] byte, per the decoding table this crate commits to
/// (spec §1B): `0` means "always play", `1..=20` is a one-in-N-ish percentage gate, and
/// anything above 20 names an iteration group (a fill/mute group evaluated against the current
/// loop-repeat count rather than randomly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbabilityKind {
    Always,
    /// `percent` in `5..=100`, in steps of 5 (value 1 = 5%, value 20 = 100%).
    Threshold { percent: u32 },
    IterationGroup { group: u8 },
}

impl Probability {
    pub const ALWAYS: Probability = Probability(0);

    pub fn decode(self) -> ProbabilityKind {
        match self.0 {
            0 => ProbabilityKind::Always,
            1..=20 => ProbabilityKind::Threshold {
                percent: self.0 as u32 * 5,
            },
            v => ProbabilityKind::IterationGroup { group: v - 20 },
        }
    }
}

/// A note event: `pos` is relative to its owning row's start, in ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pos: i64,
    pub length: i64,
    pub velocity: u8,
    pub probability: Probability,
    pub lift: u8,
    /// `true` if `pos + length` exceeds the row length and the note's tail wraps around to the
    /// start of the next loop instead of being clipped.
    pub wraps: bool,
    pub mpe: Vec<MpeNode>,
}

impl Note {
    pub fn new(pos: i64, length: i64, velocity: u8) -> Self {
        Self {
            pos,
            length,
            velocity,
            probability: Probability::ALWAYS,
            lift: 0,
            wraps: false,
            mpe: Vec::new(),
        }
    }

    /// End position, *not* clamped to row length — callers check `wraps` to decide whether this
    /// exceeding `row_length` is a real wraparound or an invariant violation.
    pub fn end_pos(&self) -> i64 {
        self.pos + self.length
    }

    /// Invariant check used when inserting into a [`super::note_row::NoteRow`]: either the note
    /// fits within the row, or it's explicitly marked as wrapping.
    pub fn fits_in_row(&self, row_length: i64) -> bool {
        self.wraps || self.end_pos() <= row_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_decoding_table() {
        assert_eq!(Probability(0).decode(), ProbabilityKind::Always);
        assert_eq!(Probability(1).decode(), ProbabilityKind::Threshold { percent: 5 });
        assert_eq!(Probability(20).decode(), ProbabilityKind::Threshold { percent: 100 });
        assert_eq!(Probability(21).decode(), ProbabilityKind::IterationGroup { group: 1 });
        assert_eq!(Probability(127).decode(), ProbabilityKind::IterationGroup { group: 107 });
    }

    #[test]
    fn fits_in_row_respects_wrap_flag() {
        let mut n = Note::new(90, 20, 100);
        assert!(!n.fits_in_row(96));
        n.wraps = true;
        assert!(n.fits_in_row(96));
    }
}
