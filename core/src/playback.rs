//! Advances each active Clip's position per tick, emits `TimelineEvent`s, and coordinates
//! session/arrangement transitions (spec §4.2).

use tracing::{error, warn};

use crate::arena::Handle;
use crate::clock::{Clock, ClockSource, PlaybackMode, TickBatch, TimebaseConfig};
use crate::error::CoreError;
use crate::song::clip::{Clip, MAX_LOOP_LENGTH};
use crate::song::clip_instance::ClipInstance;
use crate::song::output::Output;
use crate::song::Song;
use crate::timeline_event::{QueuedEvent, TimelineEvent};

/// Injected so a linear-recording loop-length doubling can fail the way real flash/RAM
/// allocation can (spec §4.2 failure semantics), without this crate owning an actual allocator.
pub trait RamBudget {
    fn try_reserve_for_extension(&mut self, new_length: i64) -> bool;
}

/// Always succeeds; the default for hosts that don't want to model RAM pressure.
#[derive(Debug, Default)]
pub struct UnlimitedRam;

impl RamBudget for UnlimitedRam {
    fn try_reserve_for_extension(&mut self, _new_length: i64) -> bool {
        true
    }
}

/// Snapshot of every Output's `active_clip`, taken when switching from session to arrangement
/// playback so the reverse transition can restore it exactly (spec §4.2).
#[derive(Debug, Clone)]
struct ActiveClipSnapshot {
    entries: Vec<(Handle<Output>, Option<Handle<Clip>>)>,
}

pub struct PlaybackEngine {
    clock: Clock,
    pending: Vec<QueuedEvent>,
    snapshot: Option<ActiveClipSnapshot>,
    /// Last absolute swung tick each Clip was advanced through. Bookkeeping internal to the
    /// engine, not part of the persisted Song (only `Clip::last_processed_pos`, which is
    /// loop-relative, is persisted — spec §3).
    last_tick_index: std::collections::HashMap<Handle<Clip>, u64>,
}

impl PlaybackEngine {
    pub fn new(config: TimebaseConfig) -> Self {
        Self {
            clock: Clock::new(config),
            pending: Vec::new(),
            snapshot: None,
            last_tick_index: std::collections::HashMap::new(),
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// `true` exactly between [`Self::begin_arrangement_recording`] and
    /// [`Self::stop_arrangement_recording`] — used by the session launcher to block arming a
    /// sibling Clip on an Output that's currently being captured into the arrangement (spec
    /// §4.3 failure semantics).
    pub fn is_recording_arrangement(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn set_timebase(&mut self, config: TimebaseConfig) {
        self.clock.set_timebase(config);
    }

    pub fn start(&mut self, mode: PlaybackMode, source: ClockSource, start_sample: i64) {
        self.clock.start(mode, source, start_sample);
        self.last_tick_index.clear();
    }

    /// Halts playback; every active Clip is told to expect no further ticks by resetting
    /// `last_processed_pos`, matching the source's `expectNoFurtherTicks` contract.
    pub fn stop(&mut self, song: &mut Song) {
        self.clock.stop();
        for (_, clip) in song.clips.iter_mut() {
            clip.last_processed_pos = 0;
        }
        self.last_tick_index.clear();
    }

    fn output_index(song: &Song, handle: Handle<Output>) -> u32 {
        song.output_order
            .iter()
            .position(|h| *h == handle)
            .unwrap_or(u32::MAX as usize) as u32
    }

    /// Drains every event queued since the last call.
    pub fn drain_events(&mut self) -> Vec<QueuedEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Advances the clock to `current_sample` and processes every tick due, mutating `song` and
    /// enqueuing `TimelineEvent`s. Returns the batch the clock produced (for `playbackBacklogged`
    /// reporting).
    pub fn advance(&mut self, song: &mut Song, current_sample: i64, ram: &mut impl RamBudget) -> TickBatch {
        let batch = self.clock.advance_to_sample(current_sample);
        if batch.backlogged {
            warn!(tick = batch.first_tick, "playback backlogged, resyncing clip positions");
            self.resync_clip_positions(song, batch.first_tick);
            return batch;
        }
        for i in 0..batch.count {
            let tick = batch.first_tick + i;
            self.process_tick(song, tick, ram);
        }
        batch
    }

    /// Snaps every active Clip's `last_processed_pos` to its loop-relative offset at `tick`
    /// without scanning notes or emitting timeline events for the skipped span (spec §4.1: a
    /// backlog past `MAX_TICK_BACKLOG` means those ticks were dropped, not merely delayed, so
    /// there is nothing to replay). Also resets this engine's per-clip bookkeeping so the next
    /// ordinary tick computes `ticks_since_last` against the resynced tick instead of whatever
    /// pre-backlog tick it last saw.
    fn resync_clip_positions(&mut self, song: &mut Song, tick: u64) {
        let active: Vec<Handle<Clip>> = song.outputs.iter().filter_map(|(_, o)| o.active_clip).collect();
        for clip_handle in active {
            if let Some(clip) = song.clips.get_mut(clip_handle) {
                debug_assert!(clip.loop_length > 0, "Clip::loop_length invariant violated");
                clip.last_processed_pos = (tick as i64) % clip.loop_length;
            }
            self.last_tick_index.insert(clip_handle, tick);
        }
    }

    /// A Clip plays only while it is its Output's `active_clip` (spec §3): the session launcher
    /// is what moves that pointer. Among audible clips, solo overrides ordinary audibility.
    fn is_clip_audible(song: &Song, clip: &Clip, any_clip_soloing: bool) -> bool {
        if any_clip_soloing {
            clip.soloing_in_session_mode
        } else {
            clip.active_if_no_solo
        }
    }

    fn process_tick(&mut self, song: &mut Song, tick: u64, ram: &mut impl RamBudget) {
        let any_clip_soloing = song.clips.iter().any(|(_, c)| c.soloing_in_session_mode);
        let active: Vec<(Handle<Output>, Handle<Clip>)> = song
            .output_order
            .iter()
            .filter_map(|&h| song.outputs.get(h).and_then(|o| o.active_clip).map(|c| (h, c)))
            .collect();
        for (output_handle, clip_handle) in active {
            self.process_clip_tick(song, output_handle, clip_handle, tick, ram, any_clip_soloing);
        }
    }

    /// Implements spec §4.2's per-Clip tick handling: `ticksSinceLast`, `processCurrentPos`,
    /// loop wrap / linear-recording extension.
    fn process_clip_tick(
        &mut self,
        song: &mut Song,
        output_handle: Handle<Output>,
        clip_handle: Handle<Clip>,
        tick: u64,
        ram: &mut impl RamBudget,
        any_clip_soloing: bool,
    ) {
        if song.clips.get(clip_handle).is_none() {
            error!(?clip_handle, "output's active_clip points at a missing clip, silencing");
            return;
        }
        let output_index = Self::output_index(song, output_handle);

        let last_tick = self.last_tick_index.get(&clip_handle).copied().unwrap_or(tick.saturating_sub(1));
        let ticks_since_last = tick.saturating_sub(last_tick).max(1) as i64;
        self.last_tick_index.insert(clip_handle, tick);

        let from = song.clips.get(clip_handle).unwrap().last_processed_pos;
        let to = from + ticks_since_last;

        let audible = Self::is_clip_audible(song, song.clips.get(clip_handle).unwrap(), any_clip_soloing);
        if audible {
            self.scan_note_rows(song, clip_handle, output_index, tick, from, to);
        }

        let mut new_pos = to;
        loop {
            let clip = song.clips.get_mut(clip_handle).unwrap();
            debug_assert!(clip.loop_length > 0, "Clip::loop_length invariant violated");
            if new_pos < clip.loop_length {
                clip.last_processed_pos = new_pos;
                break;
            }
            if clip.currently_recording_linearly {
                let new_length = (clip.loop_length * 2).min(MAX_LOOP_LENGTH);
                if new_length > clip.loop_length && ram.try_reserve_for_extension(new_length) {
                    clip.loop_length = new_length;
                    self.pending.push(QueuedEvent {
                        tick,
                        output_index,
                        row_index: u32::MAX,
                        event: TimelineEvent::LengthExtended {
                            clip: clip_handle,
                            new_length,
                        },
                    });
                    // position keeps advancing past the old boundary, no wrap; loop re-checks
                    // in case the doubled length still isn't enough to contain it.
                    continue;
                } else {
                    error!(?clip_handle, "insufficient ram to extend loop, aborting recording");
                    clip.currently_recording_linearly = false;
                    continue;
                }
            }
            new_pos -= clip.loop_length;
            self.pending.push(QueuedEvent {
                tick,
                output_index,
                row_index: u32::MAX,
                event: TimelineEvent::LoopWrap { clip: clip_handle },
            });
        }
    }

    fn scan_note_rows(
        &mut self,
        song: &Song,
        clip_handle: Handle<Clip>,
        output_index: u32,
        tick: u64,
        from: i64,
        to: i64,
    ) {
        let clip = match song.clips.get(clip_handle) {
            Some(c) => c,
            None => return,
        };
        let instrument = match clip.as_instrument() {
            Some(i) => i,
            None => return,
        };
        for (row_index, row) in instrument.note_rows.iter().enumerate() {
            if row.muted {
                continue;
            }
            for (_, note) in row.notes_in_range(from, to) {
                self.pending.push(QueuedEvent {
                    tick,
                    output_index,
                    row_index: row_index as u32,
                    event: TimelineEvent::NoteOn {
                        clip: clip_handle,
                        target: row.target,
                        velocity: note.velocity,
                    },
                });
            }
            for note in row.notes() {
                let end = note.end_pos();
                if end >= from && end < to {
                    self.pending.push(QueuedEvent {
                        tick,
                        output_index,
                        row_index: row_index as u32,
                        event: TimelineEvent::NoteOff {
                            clip: clip_handle,
                            target: row.target,
                        },
                    });
                }
                for node in &note.mpe {
                    let absolute = note.pos + node.tick_offset;
                    if absolute >= from && absolute < to {
                        self.pending.push(QueuedEvent {
                            tick,
                            output_index,
                            row_index: row_index as u32,
                            event: TimelineEvent::ExpressionChange {
                                clip: clip_handle,
                                target: row.target,
                                dimension: node.dimension,
                                value: node.value,
                            },
                        });
                    }
                }
            }
            for (param, value) in row.expression.changes_in_range(from, to) {
                self.pending.push(QueuedEvent {
                    tick,
                    output_index,
                    row_index: row_index as u32,
                    event: TimelineEvent::ParamChange {
                        clip: clip_handle,
                        param,
                        value,
                    },
                });
            }
        }
        for (param, value) in clip.param_manager.changes_in_range(from, to) {
            self.pending.push(QueuedEvent {
                tick,
                output_index,
                row_index: u32::MAX,
                event: TimelineEvent::ParamChange {
                    clip: clip_handle,
                    param,
                    value,
                },
            });
        }
    }

    /// Begins arrangement recording while session playback is active: captures the current
    /// x-scroll, clones every Output's active session Clip into a `ClipInstance` at that
    /// position, and switches the clock's mode without interrupting audio (spec §4.2).
    pub fn begin_arrangement_recording(&mut self, song: &mut Song, x_scroll: i64) -> Result<(), CoreError> {
        let entries: Vec<(Handle<Output>, Option<Handle<Clip>>)> =
            song.output_order.iter().map(|h| (*h, song.outputs.get(*h).and_then(|o| o.active_clip))).collect();

        for &(output_handle, active_clip) in &entries {
            if let Some(clip_handle) = active_clip {
                let loop_length = song.clips.get(clip_handle).map(|c| c.loop_length).unwrap_or(0);
                if let Some(output) = song.outputs.get_mut(output_handle) {
                    let instance = ClipInstance {
                        pos: x_scroll,
                        length: loop_length,
                        clip: clip_handle,
                    };
                    let _ = output.instances.insert(instance);
                }
            }
        }
        self.snapshot = Some(ActiveClipSnapshot { entries });
        let start_sample = self.clock.sample_time_for_tick(self.clock.current_swung_tick());
        self.clock.start(PlaybackMode::Arrangement, ClockSource::Internal, start_sample);
        Ok(())
    }

    /// Reverses [`Self::begin_arrangement_recording`]: restores every Output's `active_clip` from
    /// the pre-recording snapshot and resumes session playback.
    pub fn stop_arrangement_recording(&mut self, song: &mut Song) {
        let Some(snapshot) = self.snapshot.take() else {
            return;
        };
        for (output_handle, active_clip) in snapshot.entries {
            if let Some(output) = song.outputs.get_mut(output_handle) {
                output.active_clip = active_clip;
            }
        }
        let start_sample = self.clock.sample_time_for_tick(self.clock.current_swung_tick());
        self.clock.start(PlaybackMode::Session, ClockSource::Internal, start_sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::clip::Clip;
    use crate::song::note::Note;
    use crate::song::note_row::{NoteRow, NoteRowTarget};
    use crate::song::output::{Output, OutputKind};

    fn timebase() -> TimebaseConfig {
        TimebaseConfig {
            tempo_bpm: 120.0,
            swing_amount: 0,
            swing_interval: crate::clock::SwingInterval(8),
            sample_rate: 48_000,
        }
    }

    fn song_with_clip(loop_length: i64) -> (Song, Handle<Output>, Handle<Clip>) {
        let mut song = Song::default();
        let output = song.add_output(Output::new(OutputKind::Synth, "lead".into()));
        let mut clip = Clip::new_instrument(output, loop_length);
        let mut row = NoteRow::new(NoteRowTarget::Pitch(60), loop_length);
        row.insert_note(Note::new(0, 4, 100)).unwrap();
        clip.as_instrument_mut().unwrap().note_rows.push(row);
        let clip_handle = song.add_session_clip(clip).unwrap();
        song.outputs.get_mut(output).unwrap().active_clip = Some(clip_handle);
        (song, output, clip_handle)
    }

    #[test]
    fn loop_wrap_fires_exactly_once_after_loop_length_ticks() {
        let (mut song, _output, clip_handle) = song_with_clip(96);
        let mut engine = PlaybackEngine::new(timebase());
        engine.start(PlaybackMode::Session, ClockSource::Internal, 0);
        let mut ram = UnlimitedRam;

        let mut sample = 0i64;
        let mut wraps = 0;
        for _ in 0..500 {
            sample += 64;
            engine.advance(&mut song, sample, &mut ram);
            for event in engine.drain_events() {
                if matches!(event.event, TimelineEvent::LoopWrap { .. }) {
                    wraps += 1;
                }
            }
            if song.clips.get(clip_handle).unwrap().last_processed_pos == 0 && wraps > 0 {
                break;
            }
        }
        assert_eq!(wraps, 1);
        assert_eq!(song.clips.get(clip_handle).unwrap().last_processed_pos, 0);
    }

    #[test]
    fn linear_recording_doubles_length_instead_of_wrapping() {
        let (mut song, _output, clip_handle) = song_with_clip(96);
        song.clips.get_mut(clip_handle).unwrap().currently_recording_linearly = true;
        let mut engine = PlaybackEngine::new(timebase());
        engine.start(PlaybackMode::Session, ClockSource::Internal, 0);
        let mut ram = UnlimitedRam;

        let mut sample = 0i64;
        let mut extended = false;
        for _ in 0..500 {
            sample += 64;
            engine.advance(&mut song, sample, &mut ram);
            for event in engine.drain_events() {
                if let TimelineEvent::LengthExtended { new_length, .. } = event.event {
                    assert_eq!(new_length, 192);
                    extended = true;
                }
                assert!(!matches!(event.event, TimelineEvent::LoopWrap { .. }));
            }
            if extended {
                break;
            }
        }
        assert!(extended);
        assert_eq!(song.clips.get(clip_handle).unwrap().loop_length, 192);
    }

    #[test]
    fn insufficient_ram_aborts_recording_without_crashing() {
        struct NeverRam;
        impl RamBudget for NeverRam {
            fn try_reserve_for_extension(&mut self, _new_length: i64) -> bool {
                false
            }
        }
        let (mut song, _output, clip_handle) = song_with_clip(96);
        song.clips.get_mut(clip_handle).unwrap().currently_recording_linearly = true;
        let mut engine = PlaybackEngine::new(timebase());
        engine.start(PlaybackMode::Session, ClockSource::Internal, 0);
        let mut ram = NeverRam;

        let mut sample = 0i64;
        for _ in 0..500 {
            sample += 64;
            engine.advance(&mut song, sample, &mut ram);
            engine.drain_events();
        }
        assert!(!song.clips.get(clip_handle).unwrap().currently_recording_linearly);
    }

    #[test]
    fn backlog_resyncs_clip_position_instead_of_replaying_skipped_ticks() {
        let (mut song, _output, clip_handle) = song_with_clip(96);
        let mut engine = PlaybackEngine::new(timebase());
        engine.start(PlaybackMode::Session, ClockSource::Internal, 0);
        let mut ram = UnlimitedRam;

        let far_future_sample = engine.clock().sample_time_for_tick(10_000);
        let batch = engine.advance(&mut song, far_future_sample, &mut ram);
        assert!(batch.backlogged);

        let tick = engine.clock().current_swung_tick();
        let expected = (tick as i64) % 96;
        assert_eq!(song.clips.get(clip_handle).unwrap().last_processed_pos, expected);
        // the resync is silent: no loop-wrap/note events for the skipped span.
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn mpe_node_due_in_window_emits_expression_change() {
        use crate::song::note::{MpeDimension, MpeNode};

        let (mut song, _output, clip_handle) = song_with_clip(96);
        {
            let clip = song.clips.get_mut(clip_handle).unwrap();
            let row = &mut clip.as_instrument_mut().unwrap().note_rows[0];
            let mut note = row.remove_note_at(0).unwrap();
            note.mpe.push(MpeNode {
                tick_offset: 2,
                dimension: MpeDimension::PitchBend,
                value: 1000,
            });
            row.insert_note(note).unwrap();
        }
        let mut engine = PlaybackEngine::new(timebase());
        engine.start(PlaybackMode::Session, ClockSource::Internal, 0);
        let mut ram = UnlimitedRam;

        let sample = engine.clock().sample_time_for_tick(3);
        engine.advance(&mut song, sample, &mut ram);
        let expression = engine
            .drain_events()
            .into_iter()
            .find(|e| matches!(e.event, TimelineEvent::ExpressionChange { .. }));
        match expression.expect("expected an ExpressionChange event").event {
            TimelineEvent::ExpressionChange { dimension, value, .. } => {
                assert_eq!(dimension, MpeDimension::PitchBend);
                assert_eq!(value, 1000);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn clip_level_param_automation_emits_param_change() {
        use crate::song::param_manager::ParamId;

        let (mut song, _output, clip_handle) = song_with_clip(96);
        song.clips
            .get_mut(clip_handle)
            .unwrap()
            .param_manager
            .curve_mut(ParamId::Volume)
            .set_point(2, 77);
        let mut engine = PlaybackEngine::new(timebase());
        engine.start(PlaybackMode::Session, ClockSource::Internal, 0);
        let mut ram = UnlimitedRam;

        let sample = engine.clock().sample_time_for_tick(3);
        engine.advance(&mut song, sample, &mut ram);
        let change = engine
            .drain_events()
            .into_iter()
            .find(|e| matches!(e.event, TimelineEvent::ParamChange { .. }));
        match change.expect("expected a ParamChange event").event {
            TimelineEvent::ParamChange { param, value, .. } => {
                assert_eq!(param, ParamId::Volume);
                assert_eq!(value, 77);
            }
            _ => unreachable!(),
        }
    }
}
