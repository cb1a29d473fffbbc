//! Session launcher: arm/launch state machine, section repeats, overdub creation (spec §4.3).

use std::collections::HashMap;

use tracing::{info, warn};

use crate::arena::Handle;
use crate::playback::PlaybackEngine;
use crate::song::clip::{ArmState, Clip, LaunchStyle};
use crate::song::output::Output;
use crate::song::Song;

/// The five-state machine from spec §4.3. `Clip::ArmState` only distinguishes three of these —
/// `Playing` is "no arm state and this Clip is its Output's `active_clip`", `Idle` is "no arm
/// state and it isn't" — so `SessionLauncher` keeps the fuller picture, including which of the
/// two reasons put a Clip into `ArmedToStop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Idle,
    ArmedToStart,
    Playing,
    ArmedToStop,
    ArmedToStopAtSectionEnd,
}

#[derive(Debug)]
pub struct SessionLauncher {
    /// Non-`Idle`/`Playing` overlay state, keyed by Clip. Absence means the Clip's state is
    /// derived purely from `Output::active_clip` (Playing or Idle).
    armed: HashMap<Handle<Clip>, PlayState>,
    next_launch_event: Option<u64>,
    launch_align_ticks: i64,
}

impl SessionLauncher {
    pub fn new(launch_align_ticks: i64) -> Self {
        Self {
            armed: HashMap::new(),
            next_launch_event: None,
            launch_align_ticks,
        }
    }

    pub fn set_launch_align_ticks(&mut self, ticks: i64) {
        self.launch_align_ticks = ticks;
    }

    pub fn next_launch_event(&self) -> Option<u64> {
        self.next_launch_event
    }

    pub fn state(&self, song: &Song, clip: Handle<Clip>) -> PlayState {
        if let Some(state) = self.armed.get(&clip) {
            return *state;
        }
        let is_active = song
            .clips
            .get(clip)
            .and_then(|c| song.outputs.get(c.output))
            .map(|o| o.active_clip == Some(clip))
            .unwrap_or(false);
        if is_active {
            PlayState::Playing
        } else {
            PlayState::Idle
        }
    }

    /// The first tick at or after `current_tick` that is aligned to `launch_align_ticks` (spec
    /// §4.3: "the first tick at which `tickCount mod launchAlignTicks == 0`").
    fn next_aligned_tick(&self, current_tick: u64) -> u64 {
        let align = self.launch_align_ticks.max(1) as u64;
        current_tick.div_ceil(align) * align
    }

    /// Schedules a launch event if none is pending. Re-scheduling before the pending one fires
    /// is a no-op (spec §4.3: "exactly one launch event is scheduled at a time").
    fn ensure_launch_event_scheduled(&mut self, current_tick: u64) {
        if self.next_launch_event.is_none() {
            self.next_launch_event = Some(self.next_aligned_tick(current_tick));
        }
    }

    /// `Idle -> ArmedToStart` or `Playing -> ArmedToStop`. Fails silently (per spec §4.3 failure
    /// semantics) if a sibling Clip on the same Output is currently recording arrangement.
    pub fn arm_press(&mut self, song: &Song, clip: Handle<Clip>, current_tick: u64, playback: &PlaybackEngine) {
        let output = song.clips.get(clip).map(|c| c.output);
        let blocked = match output {
            Some(output) => !no_sibling_recording(song, output, clip, playback.is_recording_arrangement()),
            None => false,
        };
        if blocked {
            warn!(?clip, "arm press ignored: sibling output is recording arrangement");
            return;
        }
        match self.state(song, clip) {
            PlayState::Idle => {
                self.armed.insert(clip, PlayState::ArmedToStart);
                self.ensure_launch_event_scheduled(current_tick);
            }
            PlayState::Playing => {
                self.armed.insert(clip, PlayState::ArmedToStop);
                self.ensure_launch_event_scheduled(current_tick);
            }
            _ => {}
        }
    }

    /// `ArmedToStart -> Idle`. Cancels the pending launch event only if no other Clip is still
    /// armed to start or stop.
    pub fn unarm_press(&mut self, clip: Handle<Clip>) {
        if self.armed.get(&clip) == Some(&PlayState::ArmedToStart) {
            self.armed.remove(&clip);
            if self.armed.is_empty() {
                self.next_launch_event = None;
            }
        }
    }

    /// Called after the caller has driven `Section::on_loop_wrap` directly (the `Section` itself
    /// doesn't know about Clips) and found the repeat counter exhausted. Arms every Clip in the
    /// section to stop at the next launch event, unless its `launch_style` is `Fill` — per the
    /// open question resolved in this crate's expanded spec, Fill Clips never participate in
    /// section-repeat counting.
    pub fn section_repeat_exhausted(&mut self, song: &Song, section_index: u8, current_tick: u64) {
        let clips: Vec<Handle<Clip>> = song.clips_in_section(section_index).collect();
        for clip in clips {
            let launch_style = song.clips.get(clip).map(|c| c.launch_style);
            if launch_style == Some(LaunchStyle::Fill) {
                continue;
            }
            if self.state(song, clip) == PlayState::Playing {
                self.armed.insert(clip, PlayState::ArmedToStopAtSectionEnd);
                self.ensure_launch_event_scheduled(current_tick);
            }
        }
    }

    /// Call when `tick == next_launch_event()`: fires every pending transition and reschedules
    /// if anything is still armed. Mutates `Clip::arm_state` and, for `ArmedToStart -> Playing`,
    /// resyncs the Clip's position and the Output's `active_clip` pointer.
    pub fn fire_launch_event(&mut self, song: &mut Song, tick: u64) {
        if self.next_launch_event != Some(tick) {
            return;
        }
        self.next_launch_event = None;

        let pending: Vec<(Handle<Clip>, PlayState)> = self.armed.drain().collect();
        for (clip, state) in pending {
            match state {
                PlayState::ArmedToStart => {
                    if let Some(output) = song.clips.get(clip).map(|c| c.output) {
                        if let Some(out) = song.outputs.get_mut(output) {
                            out.active_clip = Some(clip);
                        }
                    }
                    if let Some(c) = song.clips.get_mut(clip) {
                        c.last_processed_pos = 0;
                        c.arm_state = ArmState::None;
                    }
                    info!(?clip, tick, "clip armed-to-start fired: now playing");
                }
                PlayState::ArmedToStop | PlayState::ArmedToStopAtSectionEnd => {
                    if let Some(output) = song.clips.get(clip).map(|c| c.output) {
                        if let Some(out) = song.outputs.get_mut(output) {
                            if out.active_clip == Some(clip) {
                                out.active_clip = None;
                            }
                        }
                    }
                    if let Some(c) = song.clips.get_mut(clip) {
                        c.arm_state = ArmState::None;
                    }
                    info!(?clip, tick, "clip armed-to-stop fired: now idle");
                }
                PlayState::Idle | PlayState::Playing => {}
            }
        }
    }

    /// Creates an overdub Clip on the same Output as `source` (spec §4.3 "Overdub creation").
    /// Armed to start at the next launch event; if `source` hasn't looped yet, `source` is armed
    /// to stop so the overdub follows immediately.
    pub fn create_overdub(
        &mut self,
        song: &mut Song,
        source: Handle<Clip>,
        source_has_looped: bool,
        current_tick: u64,
    ) -> Result<Handle<Clip>, crate::error::CoreError> {
        let (output, loop_length) = song
            .clips
            .get(source)
            .map(|c| (c.output, c.loop_length))
            .ok_or(crate::error::CoreError::Bug("overdub source clip doesn't exist"))?;
        let overdub = Clip::new_instrument(output, loop_length);
        let handle = song.add_session_clip(overdub)?;
        self.armed.insert(handle, PlayState::ArmedToStart);
        if !source_has_looped {
            self.armed.insert(source, PlayState::ArmedToStop);
        }
        self.ensure_launch_event_scheduled(current_tick);
        Ok(handle)
    }
}

/// Whether it's safe to arm a Clip on `output` given `arrangement_recording_active`: `false`
/// only when arrangement recording is underway and some other Clip (not `exclude`, the one
/// being armed) is the Output's currently-captured `active_clip` — the condition that silently
/// blocks `arm_press` (spec §4.3 failure semantics). While recording, an Output's `active_clip`
/// is exactly the sibling being captured into the arrangement timeline (`PlaybackEngine`'s
/// snapshot), so re-arming anything else on the same Output would fight over that one slot.
pub fn no_sibling_recording(song: &Song, output: Handle<Output>, exclude: Handle<Clip>, arrangement_recording_active: bool) -> bool {
    if !arrangement_recording_active {
        return true;
    }
    match song.outputs.get(output).and_then(|o| o.active_clip) {
        Some(active) => active == exclude,
        None => true,
    }
}
