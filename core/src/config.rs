//! Flash settings blob (spec §6 "Persisted state layout"). Byte layout is hand-packed rather
//! than serde-derived so it matches the existing firmware's fixed-offset binary format
//! bit-for-bit — serde's derive gives no such guarantee across crate versions.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const FLASH_SETTINGS_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashSettings {
    pub default_scale: u8,
    pub keyboard_layout: u8,
    pub audio_clip_record_margins: bool,
    pub record_quantize_level: u8,
    pub sample_browser_preview_mode: u8,
    pub default_velocity: u8,
    pub default_magnitude: u8,
    pub default_bend_range: [u8; 2],
    pub default_session_layout: u8,
    pub grid_unarm_empty_pads: bool,
    pub grid_allow_green_selection: bool,
    pub default_grid_active_mode: u8,
    pub default_metronome_volume: u8,
}

impl Default for FlashSettings {
    fn default() -> Self {
        Self {
            default_scale: 0,
            keyboard_layout: 0,
            audio_clip_record_margins: true,
            record_quantize_level: 0,
            sample_browser_preview_mode: 0,
            default_velocity: 64,
            default_magnitude: 9,
            default_bend_range: [2, 48],
            default_session_layout: 0,
            grid_unarm_empty_pads: true,
            grid_allow_green_selection: false,
            default_grid_active_mode: 0,
            default_metronome_volume: 22,
        }
    }
}

impl FlashSettings {
    /// Packs into the fixed-offset binary layout the existing firmware reads, so users keep
    /// their settings across an upgrade.
    pub fn to_bytes(&self) -> [u8; FLASH_SETTINGS_LEN] {
        let mut buf = [0u8; FLASH_SETTINGS_LEN];
        buf[0] = self.default_scale;
        buf[1] = self.keyboard_layout;
        buf[2] = self.audio_clip_record_margins as u8;
        buf[3] = self.record_quantize_level;
        buf[4] = self.sample_browser_preview_mode;
        buf[5] = self.default_velocity;
        buf[6] = self.default_magnitude;
        buf[7] = self.default_bend_range[0];
        buf[8] = self.default_bend_range[1];
        buf[9] = self.default_session_layout;
        buf[10] = self.grid_unarm_empty_pads as u8;
        buf[11] = self.grid_allow_green_selection as u8;
        buf[12] = self.default_grid_active_mode;
        buf[13] = self.default_metronome_volume;
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, CoreError> {
        if buf.len() < FLASH_SETTINGS_LEN {
            return Err(CoreError::FileCorrupted);
        }
        Ok(Self {
            default_scale: buf[0],
            keyboard_layout: buf[1],
            audio_clip_record_margins: buf[2] != 0,
            record_quantize_level: buf[3],
            sample_browser_preview_mode: buf[4],
            default_velocity: buf[5],
            default_magnitude: buf[6],
            default_bend_range: [buf[7], buf[8]],
            default_session_layout: buf[9],
            grid_unarm_empty_pads: buf[10] != 0,
            grid_allow_green_selection: buf[11] != 0,
            default_grid_active_mode: buf[12],
            default_metronome_volume: buf[13],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let settings = FlashSettings {
            default_scale: 3,
            default_velocity: 100,
            default_bend_range: [1, 24],
            ..Default::default()
        };
        let bytes = settings.to_bytes();
        assert_eq!(FlashSettings::from_bytes(&bytes).unwrap(), settings);
    }

    #[test]
    fn truncated_buffer_is_corrupted_not_a_panic() {
        let bytes = [0u8; 4];
        assert_eq!(FlashSettings::from_bytes(&bytes), Err(CoreError::FileCorrupted));
    }

    #[test]
    fn default_settings_round_trip() {
        let settings = FlashSettings::default();
        assert_eq!(FlashSettings::from_bytes(&settings.to_bytes()).unwrap(), settings);
    }
}
