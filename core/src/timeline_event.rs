//! Events emitted by [`crate::playback::PlaybackEngine`] and consumed by
//! [`crate::render::RenderBridge`] (spec §4.2–§4.4).

use crate::arena::Handle;
use crate::song::clip::Clip;
use crate::song::note::MpeDimension;
use crate::song::note_row::NoteRowTarget;
use crate::song::param_manager::ParamId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEvent {
    NoteOn {
        clip: Handle<Clip>,
        target: NoteRowTarget,
        velocity: u8,
    },
    NoteOff {
        clip: Handle<Clip>,
        target: NoteRowTarget,
    },
    ExpressionChange {
        clip: Handle<Clip>,
        target: NoteRowTarget,
        dimension: MpeDimension,
        value: i16,
    },
    ParamChange {
        clip: Handle<Clip>,
        param: ParamId,
        value: i32,
    },
    LoopWrap {
        clip: Handle<Clip>,
    },
    LengthExtended {
        clip: Handle<Clip>,
        new_length: i64,
    },
}

impl TimelineEvent {
    /// Ordering rank within a tick/Output/NoteRow bucket: note-on before note-off, per spec
    /// §4.4. Everything else sorts after note events, which is never load-bearing since nothing
    /// else shares a (tick, output, row) key with a note event in practice.
    pub fn note_rank(&self) -> u8 {
        match self {
            TimelineEvent::NoteOn { .. } => 0,
            TimelineEvent::NoteOff { .. } => 1,
            _ => 2,
        }
    }

    pub fn clip(&self) -> Handle<Clip> {
        match self {
            TimelineEvent::NoteOn { clip, .. }
            | TimelineEvent::NoteOff { clip, .. }
            | TimelineEvent::ExpressionChange { clip, .. }
            | TimelineEvent::ParamChange { clip, .. }
            | TimelineEvent::LoopWrap { clip }
            | TimelineEvent::LengthExtended { clip, .. } => *clip,
        }
    }
}

/// A [`TimelineEvent`] tagged with the ordering keys §4.4 requires: `tick`, the emitting
/// Output's index in `Song::output_order`, and (for note-row-scoped events) the NoteRow's index
/// within its Clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEvent {
    pub tick: u64,
    pub output_index: u32,
    /// `u32::MAX` for events not scoped to a single NoteRow (param/loop/length events).
    pub row_index: u32,
    pub event: TimelineEvent,
}

impl QueuedEvent {
    pub fn sort_key(&self) -> (u64, u32, u32, u8) {
        (self.tick, self.output_index, self.row_index, self.event.note_rank())
    }
}
