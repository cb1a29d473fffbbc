//! A sound-producing endpoint: the target of one or more Clips.

use crate::arena::Handle;
use crate::song::clip::Clip;
use crate::song::clip_instance::ClipInstanceTrack;
use serde::{Deserialize, Serialize};

/// A Kit's per-row sound source (one-shot sample or synth voice) — the Kit analogue of a Synth
/// Output's single voice. See spec §1B.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drum {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    Synth,
    Kit { drums: Vec<Drum> },
    MidiOut { channel: u8 },
    Cv { channel: u8 },
    AudioOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub kind: OutputKind,
    pub name: String,
    pub active_clip: Option<Handle<Clip>>,
    pub muted: bool,
    /// Only meaningful for `OutputKind::AudioOutput`.
    pub input_channel: Option<u8>,
    /// Arrangement-view timeline for this Output (spec §3 `ClipInstance`).
    pub instances: ClipInstanceTrack,
}

impl Output {
    pub fn new(kind: OutputKind, name: String) -> Self {
        Self {
            kind,
            name,
            active_clip: None,
            muted: false,
            input_channel: None,
            instances: ClipInstanceTrack::default(),
        }
    }

    pub fn is_kit(&self) -> bool {
        matches!(self.kind, OutputKind::Kit { .. })
    }

    pub fn drums(&self) -> &[Drum] {
        match &self.kind {
            OutputKind::Kit { drums } => drums,
            _ => &[],
        }
    }

    pub fn find_drum(&self, id: u32) -> Option<&Drum> {
        self.drums().iter().find(|d| d.id == id)
    }
}
