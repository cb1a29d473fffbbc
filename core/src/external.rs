//! Narrow trait contracts for every collaborator this crate consumes or emits to, per spec §6.
//! None of these traits are implemented here — concrete DSP, MIDI byte framing, display
//! rendering, and SD filesystem access are all out of scope (spec §1 Non-goals); this module
//! exists so the rest of the crate can depend on an interface instead of a concrete device.

use crate::arena::Handle;
use crate::error::CoreError;
use crate::song::clip::Clip;
use crate::timeline_event::TimelineEvent;

/// Drives the master [`crate::clock::Clock`] when its source isn't `Internal` (spec §6 "Clock
/// source interface").
pub trait ClockSource {
    fn current_sample(&self) -> i64;
}

/// Consumes finished timeline events into audio (spec §6 "Audio engine interface"). Emits
/// nothing upward; this crate only ever calls into it, never the reverse.
pub trait AudioEngine {
    fn render_into(&mut self, buffer_l: &mut [f32], buffer_r: &mut [f32], n_samples: usize);
    fn unassign_all_voices(&mut self);
    fn headphones_plugged_in(&self) -> bool;
    fn line_in_plugged_in(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiPort {
    Din,
    UsbUpstream1,
    UsbUpstream2,
    UsbUpstream3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiInEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    PitchBend { channel: u8, value: i16 },
    ChannelPressure { channel: u8, value: u8 },
}

/// Byte-level MIDI send/receive across the four physical ports (spec §6 "MIDI transport").
pub trait MidiTransport {
    fn send_note_on(&mut self, port: MidiPort, channel: u8, note: u8, velocity: u8);
    fn send_note_off(&mut self, port: MidiPort, channel: u8, note: u8, velocity: u8);
    fn poll_incoming(&mut self) -> Vec<(MidiPort, MidiInEvent)>;
}

/// Pad/LED matrix (spec §6): RGB pad output, the tick-square metronome strip, and upward
/// `onPadPress` input. `velocity == 0` on a press event means release, per the contract.
pub trait PadMatrix {
    fn set_pad(&mut self, x: u8, y: u8, r: u8, g: u8, b: u8);
    fn set_tick_squares(&mut self, row_squares: [bool; 8], colors: [(u8, u8, u8); 8]);
    fn blink_led(&mut self, x: u8, y: u8, pattern: u8);
    fn poll_pad_presses(&mut self) -> Vec<(u8, u8, u8)>;
}

/// OLED/7-seg display (spec §6). Both build-time surface variants share this contract.
pub trait Display {
    fn set_text(&mut self, text: &str);
    fn popup_text(&mut self, text: &str);
    fn render_full_screen(&mut self, image: &[u8]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "sd-file-{}", _0)]
pub struct SdFileHandle(pub u32);

/// SD storage shim (spec §6). File formats themselves (song XML, WAV samples, the flash
/// settings blob) are owned by this crate's serialization layer, not by this trait.
pub trait SdStorage {
    fn open_file(&mut self, path: &str) -> Result<SdFileHandle, CoreError>;
    fn read_cluster(&mut self, handle: &SdFileHandle, cluster: u32, buf: &mut [u8]) -> Result<(), CoreError>;
    fn write_cluster(&mut self, handle: &SdFileHandle, cluster: u32, buf: &[u8]) -> Result<(), CoreError>;
    fn enumerate_dir(&mut self, path: &str) -> Result<Vec<String>, CoreError>;
}

/// CV/gate output (spec §6), driven by the DMA/interrupt context described in spec §5 — this
/// crate enqueues intent, it doesn't own the hardware timing.
pub trait CvGate {
    fn set_gate(&mut self, channel: u8, high: bool);
    fn set_cv(&mut self, channel: u8, voltage_millivolts: i32);
}

/// Notifications this crate emits upward to the UI layer (spec §6 "Emitted upward").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpwardNotification {
    ClipNeedsReRendering(Handle<Clip>),
    SampleNeedsReRendering(u64),
    PlaybackEnded,
    PlaybackBacklogged,
    ErrorToUser { error: CoreError, message: String },
}

/// The render bridge's actual hardware-facing sink: everything in [`TimelineEvent`] resolves,
/// eventually, into calls on [`AudioEngine`], [`MidiTransport`], or [`CvGate`]. Kept as a
/// separate trait so `RenderBridge` itself stays decoupled from which physical outputs exist.
pub trait VoiceSink {
    fn dispatch(&mut self, event: &TimelineEvent);
}
