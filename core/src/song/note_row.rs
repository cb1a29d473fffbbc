//! One pitch (or drum) lane inside an `InstrumentClip`.

use super::note::Note;
use super::param_manager::ParamManager;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// What a [`NoteRow`] plays: a fixed MIDI pitch (Synth clips) or a Kit drum, referenced by a
/// lightweight id rather than owning the drum (drums live on the Kit `Output`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteRowTarget {
    Pitch(u8),
    Drum(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRow {
    pub target: NoteRowTarget,
    /// Sorted ascending by `Note::pos`. Kept sorted by insertion, never re-sorted wholesale, to
    /// avoid an allocation-heavy sort on the render path (rows are only mutated off the audio
    /// thread anyway, but the invariant is cheap to keep either way).
    notes: Vec<Note>,
    pub muted: bool,
    pub solo: bool,
    /// May differ from the owning Clip's `loop_length`, enabling polyrhythms.
    pub loop_length: i64,
    pub expression: ParamManager,
}

impl NoteRow {
    pub fn new(target: NoteRowTarget, loop_length: i64) -> Self {
        Self {
            target,
            notes: Vec::new(),
            muted: false,
            solo: false,
            loop_length,
            expression: ParamManager::default(),
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Inserts `note`, keeping [`Self::notes`] sorted by `pos`. Rejects notes that don't fit the
    /// row unless explicitly marked wrapping (data-model invariant in spec §3).
    pub fn insert_note(&mut self, note: Note) -> Result<usize, CoreError> {
        if !note.fits_in_row(self.loop_length) {
            return Err(CoreError::Generic(
                "note position + length exceeds row length and is not marked as wrapping",
            ));
        }
        let idx = self.notes.partition_point(|n| n.pos < note.pos);
        self.notes.insert(idx, note);
        Ok(idx)
    }

    pub fn remove_note_at(&mut self, index: usize) -> Option<Note> {
        if index < self.notes.len() {
            Some(self.notes.remove(index))
        } else {
            None
        }
    }

    /// Notes whose `pos` lies in `[from, to)`, the exact window `PlaybackEngine` scans each
    /// tick (spec §4.2 step 2). `to` may exceed `loop_length` only for a single in-flight tick
    /// range that crosses the loop boundary; callers split at the wrap point themselves.
    pub fn notes_in_range(&self, from: i64, to: i64) -> impl Iterator<Item = (usize, &Note)> {
        let start = self.notes.partition_point(|n| n.pos < from);
        self.notes[start..]
            .iter()
            .enumerate()
            .map(move |(i, n)| (start + i, n))
            .take_while(move |(_, n)| n.pos < to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_sorted_order() {
        let mut row = NoteRow::new(NoteRowTarget::Pitch(60), 96);
        row.insert_note(Note::new(50, 10, 100)).unwrap();
        row.insert_note(Note::new(10, 10, 100)).unwrap();
        row.insert_note(Note::new(30, 10, 100)).unwrap();
        let positions: Vec<_> = row.notes().iter().map(|n| n.pos).collect();
        assert_eq!(positions, vec![10, 30, 50]);
    }

    #[test]
    fn rejects_note_exceeding_row_length() {
        let mut row = NoteRow::new(NoteRowTarget::Pitch(60), 96);
        let bad = Note::new(90, 20, 100);
        assert!(row.insert_note(bad).is_err());
    }

    #[test]
    fn notes_in_range_is_half_open() {
        let mut row = NoteRow::new(NoteRowTarget::Pitch(60), 96);
        row.insert_note(Note::new(0, 4, 100)).unwrap();
        row.insert_note(Note::new(24, 4, 100)).unwrap();
        row.insert_note(Note::new(48, 4, 100)).unwrap();
        let hits: Vec<_> = row.notes_in_range(0, 24).map(|(_, n)| n.pos).collect();
        assert_eq!(hits, vec![0]);
    }
}
