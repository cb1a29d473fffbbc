//! Harmonizer configuration (spec §4.5).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmonizeMode {
    Nearest,
    RoundDown,
    RoundUp,
    Root,
    Root5th,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tightness {
    Strict,
    Scale,
    Loose,
    Extensions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiatonicInterval {
    Off,
    ThirdAbove,
    ThirdBelow,
    SixthAbove,
    SixthBelow,
    /// Treated as a single non-directional +12 semitones, unlike the 3rd/6th (the contract names
    /// no "above"/"below" variant for the octave voice).
    Octave,
}

impl DiatonicInterval {
    /// Signed scale-degree offset, or `None` for the chromatic octave voice (which bypasses
    /// scale-degree arithmetic entirely).
    fn degree_offset(self) -> Option<i32> {
        match self {
            DiatonicInterval::Off => None,
            DiatonicInterval::ThirdAbove => Some(2),
            DiatonicInterval::ThirdBelow => Some(-2),
            DiatonicInterval::SixthAbove => Some(5),
            DiatonicInterval::SixthBelow => Some(-5),
            DiatonicInterval::Octave => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HarmonizeConfig {
    pub mode: HarmonizeMode,
    pub tightness: Tightness,
    pub voice_leading: bool,
    pub scale_root: u8,
    /// 12-bit scale bitfield, bit 0 = root.
    pub scale_bits: u16,
    /// -24..=24.
    pub transpose: i8,
    pub diatonic_interval: DiatonicInterval,
    pub chord_channel: u8,
    pub probability: u8,
    pub latch: bool,
}

impl Default for HarmonizeConfig {
    fn default() -> Self {
        Self {
            mode: HarmonizeMode::Nearest,
            tightness: Tightness::Strict,
            voice_leading: false,
            scale_root: 0,
            scale_bits: 0xAB5, // C major
            transpose: 0,
            diatonic_interval: DiatonicInterval::Off,
            chord_channel: 0,
            probability: 255,
            latch: false,
        }
    }
}

/// Scale degrees (pitch classes, ascending) encoded by `scale_bits`, per spec §4.5.
pub fn scale_degrees(scale_bits: u16) -> Vec<u8> {
    (0u8..12).filter(|&pc| scale_bits & (1 << pc) != 0).collect()
}

/// The diatonic-interval voice for `input` (spec §4.5 "Diatonic-interval voice"): index the
/// input's scale position, offset by `interval`'s fixed number of scale degrees, output the MIDI
/// value at the new scale position, or `None` if out of range or `input`'s pitch class isn't in
/// the scale.
pub fn diatonic_interval_voice(input: u8, scale_root: u8, scale_bits: u16, interval: DiatonicInterval) -> Option<u8> {
    if interval == DiatonicInterval::Octave {
        let shifted = input as i32 + 12;
        return (0..=127).contains(&shifted).then_some(shifted as u8);
    }
    let offset = interval.degree_offset()?;
    let degrees = scale_degrees(scale_bits);
    if degrees.is_empty() {
        return None;
    }
    let relative = (input as i32 - scale_root as i32).rem_euclid(12);
    let octave = (input as i32 - scale_root as i32).div_euclid(12);
    let idx = degrees.iter().position(|&d| d as i32 == relative)?;

    let total = idx as i32 + offset;
    let degree_count = degrees.len() as i32;
    let octave_delta = total.div_euclid(degree_count);
    let new_idx = total.rem_euclid(degree_count) as usize;

    let result = scale_root as i32 + (octave + octave_delta) * 12 + degrees[new_idx] as i32;
    (0..=127).contains(&result).then_some(result as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_third_above_c_major() {
        // scenario S1
        assert_eq!(diatonic_interval_voice(60, 0, 0xAB5, DiatonicInterval::ThirdAbove), Some(64));
        assert_eq!(diatonic_interval_voice(62, 0, 0xAB5, DiatonicInterval::ThirdAbove), Some(65));
        assert_eq!(diatonic_interval_voice(64, 0, 0xAB5, DiatonicInterval::ThirdAbove), Some(67));
    }

    #[test]
    fn third_below_is_the_inverse_of_third_above_in_degree_space() {
        let up = diatonic_interval_voice(60, 0, 0xAB5, DiatonicInterval::ThirdAbove).unwrap();
        let back = diatonic_interval_voice(up, 0, 0xAB5, DiatonicInterval::ThirdBelow).unwrap();
        assert_eq!(back, 60);
    }

    #[test]
    fn octave_is_always_plus_twelve_semitones() {
        assert_eq!(diatonic_interval_voice(60, 0, 0xAB5, DiatonicInterval::Octave), Some(72));
        assert_eq!(diatonic_interval_voice(64, 3, 0x0F0F, DiatonicInterval::Octave), Some(76));
    }

    #[test]
    fn out_of_midi_range_result_is_none() {
        assert_eq!(diatonic_interval_voice(126, 0, 0xAB5, DiatonicInterval::Octave), None);
    }

    #[test]
    fn scale_degrees_decodes_c_major() {
        assert_eq!(scale_degrees(0xAB5), vec![0, 2, 4, 5, 7, 9, 11]);
    }
}
