//! Held-note tracking for the MIDI harmonizer's chord channel (spec §4.5).

/// Sorted, deduplicated held-note array capped at 16 entries, plus its derived pitch-class set.
/// Grounded on the teacher corpus's fixed-capacity active-note trackers, adapted here to stay
/// sorted (voice-leading and the diatonic-interval voice both want chord tones in order) rather
/// than press order.
#[derive(Debug, Clone, Default)]
pub struct ChordState {
    held: Vec<u8>,
    pitch_classes: [bool; 12],
}

const MAX_HELD: usize = 16;

static_assertions::const_assert!(MAX_HELD <= 127);

impl ChordState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_on(&mut self, note: u8) {
        if self.held.contains(&note) || self.held.len() >= MAX_HELD {
            return;
        }
        let pos = self.held.partition_point(|&n| n < note);
        self.held.insert(pos, note);
        self.recompute_pitch_classes();
    }

    pub fn note_off(&mut self, note: u8) {
        self.held.retain(|&n| n != note);
        self.recompute_pitch_classes();
    }

    pub fn reset(&mut self) {
        self.held.clear();
        self.pitch_classes = [false; 12];
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn held_notes(&self) -> &[u8] {
        &self.held
    }

    pub fn pitch_classes(&self) -> &[bool; 12] {
        &self.pitch_classes
    }

    fn recompute_pitch_classes(&mut self) {
        self.pitch_classes = [false; 12];
        for &note in &self.held {
            self.pitch_classes[(note % 12) as usize] = true;
        }
    }

    /// Every MIDI pitch 0..=127 whose pitch class is held, ascending (spec §4.5 step 2).
    pub fn expanded_chord_tones(&self) -> Vec<u8> {
        (0u8..=127).filter(|n| self.pitch_classes[(n % 12) as usize]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_dedups_and_stays_sorted() {
        let mut chord = ChordState::new();
        chord.note_on(67);
        chord.note_on(60);
        chord.note_on(60);
        chord.note_on(64);
        assert_eq!(chord.held_notes(), &[60, 64, 67]);
    }

    #[test]
    fn note_off_recomputes_pitch_classes() {
        let mut chord = ChordState::new();
        chord.note_on(60);
        chord.note_on(64);
        chord.note_off(60);
        assert!(!chord.pitch_classes()[0]);
        assert!(chord.pitch_classes()[4]);
    }

    #[test]
    fn expanded_tones_cover_every_octave_of_each_pitch_class() {
        let mut chord = ChordState::new();
        chord.note_on(60); // C
        let tones = chord.expanded_chord_tones();
        assert!(tones.contains(&0));
        assert!(tones.contains(&12));
        assert!(tones.contains(&120));
        assert!(!tones.contains(&61));
    }

    #[test]
    fn caps_at_sixteen_held_notes() {
        let mut chord = ChordState::new();
        for n in 0..20u8 {
            chord.note_on(n);
        }
        assert_eq!(chord.held_notes().len(), MAX_HELD);
    }

    #[test]
    fn reset_clears_everything() {
        let mut chord = ChordState::new();
        chord.note_on(60);
        chord.reset();
        assert!(chord.is_empty());
        assert_eq!(chord.expanded_chord_tones().len(), 0);
    }
}
