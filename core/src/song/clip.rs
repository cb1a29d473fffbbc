//! A single musical phrase or audio loop with its own timeline.

use crate::arena::Handle;
use crate::song::note_row::NoteRow;
use crate::song::output::Output;
use crate::song::param_manager::ParamManager;
use serde::{Deserialize, Serialize};

/// Mirrors the session launcher's richer state machine (spec §4.3) down to the three values the
/// data model itself persists. `ArmedToStop` covers both "ordinary" arm-to-stop and
/// "arm-to-stop-at-section-end" — the reason is tracked by the session launcher, not the Clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmState {
    None,
    ArmedToStart,
    ArmedToStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchStyle {
    Default,
    Fill,
    Once,
}

/// A reference to sample audio plus the portion of it an `AudioClip` plays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleHolder {
    pub sample_id: u64,
    pub start_frame: u64,
    pub end_frame: u64,
    pub reversed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentClip {
    pub note_rows: Vec<NoteRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioClip {
    pub sample_holder: Option<SampleHolder>,
    /// `true` while a `SampleRecorder` (external collaborator, §1 Non-goals) is live.
    pub recording: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClipVariant {
    Instrument(InstrumentClip),
    Audio(AudioClip),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub output: Handle<Output>,
    pub loop_length: i64,
    pub last_processed_pos: i64,
    /// `0..=11`, or `None` for "no section" (the `255` sentinel in the original firmware).
    pub section: Option<u8>,
    pub arm_state: ArmState,
    pub launch_style: LaunchStyle,
    pub active_if_no_solo: bool,
    pub soloing_in_session_mode: bool,
    pub colour_offset: i32,
    pub currently_recording_linearly: bool,
    pub param_manager: ParamManager,
    pub variant: ClipVariant,
}

/// Maximum a linear-recording loop length is allowed to double to (spec §4.2), guarding against
/// unbounded doubling eating all of RAM.
pub const MAX_LOOP_LENGTH: i64 = 1 << 20;

impl Clip {
    pub fn new_instrument(output: Handle<Output>, loop_length: i64) -> Self {
        Self {
            output,
            loop_length,
            last_processed_pos: 0,
            section: None,
            arm_state: ArmState::None,
            launch_style: LaunchStyle::Default,
            active_if_no_solo: true,
            soloing_in_session_mode: false,
            colour_offset: 0,
            currently_recording_linearly: false,
            param_manager: ParamManager::default(),
            variant: ClipVariant::Instrument(InstrumentClip { note_rows: Vec::new() }),
        }
    }

    pub fn new_audio(output: Handle<Output>, loop_length: i64) -> Self {
        Self {
            output,
            loop_length,
            last_processed_pos: 0,
            section: None,
            arm_state: ArmState::None,
            launch_style: LaunchStyle::Default,
            active_if_no_solo: true,
            soloing_in_session_mode: false,
            colour_offset: 0,
            currently_recording_linearly: false,
            param_manager: ParamManager::default(),
            variant: ClipVariant::Audio(AudioClip {
                sample_holder: None,
                recording: false,
            }),
        }
    }

    pub fn as_instrument(&self) -> Option<&InstrumentClip> {
        match &self.variant {
            ClipVariant::Instrument(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_instrument_mut(&mut self) -> Option<&mut InstrumentClip> {
        match &mut self.variant {
            ClipVariant::Instrument(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioClip> {
        match &self.variant {
            ClipVariant::Audio(c) => Some(c),
            _ => None,
        }
    }

    /// Data-model invariant (spec §3): `lastProcessedPos` lies in `[0, loopLength)` for active
    /// clips, or `[-count_in, loopLength)` while counting in.
    pub fn position_in_range(&self, count_in: i64) -> bool {
        self.last_processed_pos >= -count_in && self.last_processed_pos < self.loop_length
    }
}
