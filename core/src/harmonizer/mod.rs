//! MIDI harmonizer: chord-tracking note snapping with voice-leading and a parallel
//! diatonic-interval voice (spec §4.5).

pub mod chord;
pub mod config;

use chord::ChordState;
use config::{diatonic_interval_voice, scale_degrees, DiatonicInterval, HarmonizeConfig, HarmonizeMode, Tightness};

fn clamp_midi(value: i32) -> u8 {
    value.clamp(0, 127) as u8
}

/// Picks the expanded chord tone the base `mode` selects for `input` (spec §4.5 step 3,
/// `Strict` branch, also reused by `Scale`/`Loose`/`Extensions` when they fall back to it).
fn snap_strict(input: u8, tones: &[u8], mode: HarmonizeMode, scale_root: u8) -> u8 {
    match mode {
        HarmonizeMode::Nearest => nearest_tone(input, tones),
        HarmonizeMode::RoundDown => tones.iter().rev().find(|&&t| t <= input).copied().unwrap_or(tones[0]),
        HarmonizeMode::RoundUp => tones.iter().find(|&&t| t >= input).copied().unwrap_or(*tones.last().unwrap()),
        HarmonizeMode::Root => {
            let candidates: Vec<u8> = tones.iter().copied().filter(|t| t % 12 == scale_root % 12).collect();
            if candidates.is_empty() {
                nearest_tone(input, tones)
            } else {
                nearest_tone(input, &candidates)
            }
        }
        HarmonizeMode::Root5th => {
            let fifth_pc = (scale_root + 7) % 12;
            let candidates: Vec<u8> = tones.iter().copied().filter(|t| t % 12 == scale_root % 12 || t % 12 == fifth_pc).collect();
            if candidates.is_empty() {
                nearest_tone(input, tones)
            } else {
                nearest_tone(input, &candidates)
            }
        }
    }
}

/// Nearest tone to `input`, ties broken upward by ascending scan order (scenario S2).
fn nearest_tone(input: u8, tones: &[u8]) -> u8 {
    let mut best = tones[0];
    let mut best_d = (tones[0] as i32 - input as i32).abs();
    for &tone in &tones[1..] {
        let d = (tone as i32 - input as i32).abs();
        if d < best_d || (d == best_d && tone > best) {
            best = tone;
            best_d = d;
        }
    }
    best
}

/// Voice-leading re-selection (spec §4.5 step 4): among expanded chord tones within 7 semitones
/// of `input`, pick the one minimizing `2*|candidate-input| + |candidate-last_output|`.
fn apply_voice_leading(input: u8, tones: &[u8], last_output: u8) -> u8 {
    let candidates: Vec<u8> = tones.iter().copied().filter(|&t| (t as i32 - input as i32).abs() <= 7).collect();
    if candidates.is_empty() {
        return nearest_tone(input, tones);
    }
    let mut best = candidates[0];
    let mut best_score = 2 * (best as i32 - input as i32).abs() + (best as i32 - last_output as i32).abs();
    for &c in &candidates[1..] {
        let score = 2 * (c as i32 - input as i32).abs() + (c as i32 - last_output as i32).abs();
        if score < best_score {
            best = c;
            best_score = score;
        }
    }
    best
}

/// Pure, deterministic harmonization (spec §4.5, Testable Property 6). Does not consult or
/// mutate any `ActiveNote` table — that bookkeeping lives in [`Harmonizer`].
pub fn harmonize(input: u8, chord: &ChordState, config: &HarmonizeConfig, last_output: Option<u8>) -> u8 {
    if chord.is_empty() {
        return clamp_midi(input as i32 + config.transpose as i32);
    }
    let tones = chord.expanded_chord_tones();
    let input_pc_in_scale = scale_degrees(config.scale_bits).contains(&(input % 12));

    let base = match config.tightness {
        Tightness::Strict => snap_strict(input, &tones, config.mode, config.scale_root),
        Tightness::Scale => {
            if input_pc_in_scale {
                input
            } else {
                snap_strict(input, &tones, config.mode, config.scale_root)
            }
        }
        Tightness::Loose => {
            if tones.contains(&input) {
                input
            } else if tones.iter().any(|&t| (t as i32 - input as i32).abs() <= 1) {
                snap_strict(input, &tones, config.mode, config.scale_root)
            } else {
                input
            }
        }
        Tightness::Extensions => {
            let is_avoid_note = tones.iter().any(|&t| t.checked_add(1) == Some(input));
            if tones.contains(&input) {
                input
            } else if is_avoid_note {
                snap_strict(input, &tones, config.mode, config.scale_root)
            } else {
                input
            }
        }
    };

    let voiced = match (config.voice_leading, last_output) {
        (true, Some(last)) => apply_voice_leading(input, &tones, last),
        _ => base,
    };

    clamp_midi(voiced as i32 + config.transpose as i32)
}

/// Per-input-note bookkeeping so `noteOff` can release the correct output note even if the chord
/// has since changed (spec §4.5 "Note lifecycle").
#[derive(Debug, Clone, Copy)]
struct ActiveNote {
    output: u8,
    velocity: u8,
}

/// What a caller must do in response to a `note_on`/`note_off` call: emit these MIDI events, in
/// order, to the output transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmonizerEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
}

/// Per-channel harmonizer state: the chord, the 128-entry `ActiveNote` tables for the primary and
/// diatonic-interval voices, and the `lastOutput` used for voice-leading (spec §4.5).
#[derive(Debug)]
pub struct ChannelState {
    chord: ChordState,
    active: [Option<ActiveNote>; 128],
    interval_active: [Option<ActiveNote>; 128],
    last_output: Option<u8>,
    /// Physically-held chord-channel notes, tracked independently of `chord` so latch can tell
    /// "all keys released" (count reaches zero) from "chord still has notes because it's
    /// latched" (spec §4.5 "Latch").
    physically_held: Vec<u8>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            chord: ChordState::new(),
            active: [None; 128],
            interval_active: [None; 128],
            last_output: None,
            physically_held: Vec::new(),
        }
    }
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chord(&self) -> &ChordState {
        &self.chord
    }

    /// A chord-channel key went down. Handles latch's replace-on-first-press-after-full-release
    /// rule (spec §4.5).
    pub fn chord_note_on(&mut self, note: u8, config: &HarmonizeConfig) {
        if config.latch && self.physically_held.is_empty() {
            self.chord.reset();
        }
        if !self.physically_held.contains(&note) {
            self.physically_held.push(note);
        }
        self.chord.note_on(note);
    }

    /// A chord-channel key went up. Under latch, the chord itself is left untouched (it persists
    /// until the next chord starts); otherwise it tracks the keys 1:1.
    pub fn chord_note_off(&mut self, note: u8, config: &HarmonizeConfig) {
        self.physically_held.retain(|&n| n != note);
        if !config.latch {
            self.chord.note_off(note);
        }
    }

    /// A melody-channel key went down: harmonizes `input` and returns the events to emit.
    /// Implements stuck-note prevention (spec §4.5 failure semantics): a second note-on for an
    /// input still marked active force-releases the previous output first.
    pub fn note_on(&mut self, input: u8, velocity: u8, config: &HarmonizeConfig) -> Vec<HarmonizerEvent> {
        let mut events = Vec::new();
        if let Some(stuck) = self.active[input as usize].take() {
            events.push(HarmonizerEvent::NoteOff { note: stuck.output });
        }
        let output = harmonize(input, &self.chord, config, self.last_output);
        self.active[input as usize] = Some(ActiveNote { output, velocity });
        self.last_output = Some(output);
        events.push(HarmonizerEvent::NoteOn { note: output, velocity });

        if let Some(stuck) = self.interval_active[input as usize].take() {
            events.push(HarmonizerEvent::NoteOff { note: stuck.output });
        }
        if let Some(interval_out) = diatonic_interval_voice(input, config.scale_root, config.scale_bits, config.diatonic_interval) {
            self.interval_active[input as usize] = Some(ActiveNote { output: interval_out, velocity });
            events.push(HarmonizerEvent::NoteOn { note: interval_out, velocity });
        }
        events
    }

    /// A melody-channel key went up: releases whatever output note(s) `note_on` emitted for this
    /// input, regardless of how the chord has changed since.
    pub fn note_off(&mut self, input: u8) -> Vec<HarmonizerEvent> {
        let mut events = Vec::new();
        if let Some(active) = self.active[input as usize].take() {
            events.push(HarmonizerEvent::NoteOff { note: active.output });
        }
        if let Some(active) = self.interval_active[input as usize].take() {
            events.push(HarmonizerEvent::NoteOff { note: active.output });
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Tightness;

    fn triad() -> ChordState {
        let mut c = ChordState::new();
        c.note_on(60);
        c.note_on(64);
        c.note_on(67);
        c
    }

    #[test]
    fn empty_chord_passes_through_with_transpose() {
        let chord = ChordState::new();
        let config = HarmonizeConfig { transpose: 5, ..Default::default() };
        assert_eq!(harmonize(60, &chord, &config, None), 65);
    }

    #[test]
    fn s2_strict_nearest_with_upward_tie_break() {
        let chord = triad();
        let config = HarmonizeConfig { mode: HarmonizeMode::Nearest, tightness: Tightness::Strict, ..Default::default() };
        assert_eq!(harmonize(66, &chord, &config, None), 67);
        assert_eq!(harmonize(68, &chord, &config, None), 67);
        assert_eq!(harmonize(62, &chord, &config, None), 64);
    }

    #[test]
    fn s3_voice_leading_prefers_lower_total_motion() {
        let chord = triad();
        let config = HarmonizeConfig { mode: HarmonizeMode::Nearest, voice_leading: true, ..Default::default() };
        assert_eq!(harmonize(66, &chord, &config, Some(60)), 64);
    }

    #[test]
    fn determinism_same_inputs_same_output() {
        let chord = triad();
        let config = HarmonizeConfig::default();
        let a = harmonize(66, &chord, &config, Some(60));
        let b = harmonize(66, &chord, &config, Some(60));
        assert_eq!(a, b);
    }

    #[test]
    fn loose_tightness_passes_through_notes_far_from_any_chord_tone() {
        let chord = triad();
        let config = HarmonizeConfig { tightness: Tightness::Loose, ..Default::default() };
        assert_eq!(harmonize(61, &chord, &config, None), 60); // within 1 semitone of C -> snap
        assert_eq!(harmonize(70, &chord, &config, None), 70); // far from any tone -> pass through
    }

    #[test]
    fn note_balance_matches_after_a_chord_change_mid_hold() {
        let mut channel = ChannelState::new();
        let config = HarmonizeConfig::default();
        channel.chord_note_on(60, &config);
        channel.chord_note_on(64, &config);
        channel.chord_note_on(67, &config);
        let on_events = channel.note_on(62, 100, &config);
        let note_ons = on_events.iter().filter(|e| matches!(e, HarmonizerEvent::NoteOn { .. })).count();

        channel.chord_note_on(65, &config); // chord changes while input note still held

        let off_events = channel.note_off(62);
        let note_offs = off_events.iter().filter(|e| matches!(e, HarmonizerEvent::NoteOff { .. })).count();
        assert_eq!(note_ons, note_offs);
    }

    #[test]
    fn stuck_note_prevention_releases_previous_output_on_repeated_note_on() {
        let mut channel = ChannelState::new();
        let config = HarmonizeConfig::default();
        channel.chord_note_on(60, &config);
        let first = channel.note_on(62, 100, &config);
        assert!(!first.iter().any(|e| matches!(e, HarmonizerEvent::NoteOff { .. })));

        let second = channel.note_on(62, 100, &config);
        assert!(second.iter().any(|e| matches!(e, HarmonizerEvent::NoteOff { .. })));
    }

    #[test]
    fn latch_holds_chord_after_release_and_replaces_on_next_fresh_press() {
        let mut channel = ChannelState::new();
        let config = HarmonizeConfig { latch: true, ..Default::default() };
        channel.chord_note_on(60, &config);
        channel.chord_note_on(64, &config);
        channel.chord_note_off(60, &config);
        channel.chord_note_off(64, &config);
        assert!(!channel.chord().is_empty(), "latched chord must persist after release");

        channel.chord_note_on(67, &config); // first press after full release replaces
        assert_eq!(channel.chord().held_notes(), &[67]);
    }
}
