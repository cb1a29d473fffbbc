//! The master clock: produces an ordered stream of swung tick events driving all timeline
//! advancement (spec §4.1).

use tracing::warn;

/// Resolution of the internal tick counter: ticks per quarter note. Not user-configurable; the
/// song's `insideWorldTickMagnitude` rescales against it for display/MIDI-clock purposes, which
/// is a render-bridge concern, not the clock's.
pub const TICKS_PER_QUARTER_NOTE: i64 = 96;

/// If the backlog of undelivered ticks exceeds this, `advance_to_sample` skips forward instead
/// of catching up tick-by-tick, and reports `backlogged = true` (spec §4.1 failure semantics).
pub const MAX_TICK_BACKLOG: u64 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Session,
    Arrangement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    Internal,
    MidiClock,
    TriggerClock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwingInterval(pub u8);

#[derive(Debug, Clone, Copy)]
pub struct TimebaseConfig {
    pub tempo_bpm: f64,
    /// -49..49.
    pub swing_amount: i8,
    pub swing_interval: SwingInterval,
    pub sample_rate: u32,
}

impl TimebaseConfig {
    fn samples_per_tick(&self) -> f64 {
        let seconds_per_tick = 60.0 / self.tempo_bpm / TICKS_PER_QUARTER_NOTE as f64;
        seconds_per_tick * self.sample_rate as f64
    }
}

/// Result of advancing the clock by one audio block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickBatch {
    /// First tick due for delivery (inclusive).
    pub first_tick: u64,
    /// Number of ticks due for delivery in order, starting at `first_tick`.
    pub count: u64,
    /// `true` if the engine had to skip forward because the backlog exceeded
    /// [`MAX_TICK_BACKLOG`]; `PlaybackEngine` must resync every active Clip's
    /// `lastProcessedPos` in response.
    pub backlogged: bool,
}

#[derive(Debug)]
pub struct Clock {
    config: TimebaseConfig,
    mode: Option<PlaybackMode>,
    source: ClockSource,
    /// Last tick already delivered to the playback engine.
    swung_tick: u64,
    /// Sample position of `swung_tick == 0`, i.e. of `start()`.
    origin_sample: i64,
}

impl Clock {
    pub fn new(config: TimebaseConfig) -> Self {
        Self {
            config,
            mode: None,
            source: ClockSource::Internal,
            swung_tick: 0,
            origin_sample: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.mode.is_some()
    }

    pub fn mode(&self) -> Option<PlaybackMode> {
        self.mode
    }

    /// Begin playback. Resets `currentSwungTick()` to 0 (spec §4.1).
    pub fn start(&mut self, mode: PlaybackMode, source: ClockSource, start_sample: i64) {
        self.mode = Some(mode);
        self.source = source;
        self.swung_tick = 0;
        self.origin_sample = start_sample;
    }

    /// Halt playback. Does not reset `current_swung_tick()` — callers read the final tick before
    /// tearing down Clips, which need it for `expectNoFurtherTicks` bookkeeping.
    pub fn stop(&mut self) {
        self.mode = None;
    }

    pub fn current_swung_tick(&self) -> u64 {
        self.swung_tick
    }

    pub fn set_timebase(&mut self, config: TimebaseConfig) {
        self.config = config;
    }

    /// Magnitude of the swing offset applied to the tick at `index_in_interval`, in samples.
    /// Bounded below half a tick so tick ordering can never invert.
    fn swing_offset_samples(&self, index_in_interval: u64) -> i64 {
        let half_tick = self.config.samples_per_tick() / 2.0;
        let fraction = self.config.swing_amount.unsigned_abs() as f64 / 50.0;
        let magnitude = (half_tick * fraction) as i64;
        let sign: i64 = if self.config.swing_amount >= 0 { 1 } else { -1 };
        let polarity: i64 = if index_in_interval % 2 == 0 { 1 } else { -1 };
        sign * polarity * magnitude
    }

    /// The absolute sample position at which swung tick `tick` is due.
    pub fn sample_time_for_tick(&self, tick: u64) -> i64 {
        let samples_per_tick = self.config.samples_per_tick();
        let base = self.origin_sample + (tick as f64 * samples_per_tick).round() as i64;
        let interval = self.config.swing_interval.0.max(1) as u64;
        base + self.swing_offset_samples(tick % interval)
    }

    /// Consumed only when `source != Internal`: advances the swung tick counter directly to an
    /// externally-provided index (spec §4.1 `onExternalTickReceived`).
    pub fn on_external_tick_received(&mut self, tick_index: u64) -> TickBatch {
        debug_assert!(self.source != ClockSource::Internal);
        self.advance_to_tick(tick_index)
    }

    /// Internal-clock equivalent of `on_external_tick_received`: advances the clock to whatever
    /// tick is due at `current_sample`, given the clock is running from an internal source.
    pub fn advance_to_sample(&mut self, current_sample: i64) -> TickBatch {
        debug_assert_eq!(self.source, ClockSource::Internal);
        let mut target = self.swung_tick;
        while self.sample_time_for_tick(target + 1) <= current_sample {
            target += 1;
        }
        self.advance_to_tick(target)
    }

    fn advance_to_tick(&mut self, target_tick: u64) -> TickBatch {
        if target_tick <= self.swung_tick {
            return TickBatch {
                first_tick: self.swung_tick + 1,
                count: 0,
                backlogged: false,
            };
        }
        let backlog = target_tick - self.swung_tick;
        if backlog > MAX_TICK_BACKLOG {
            warn!(backlog, "tick backlog exceeded maxTickBacklog, skipping forward");
            self.swung_tick = target_tick;
            return TickBatch {
                first_tick: target_tick,
                count: 1,
                backlogged: true,
            };
        }
        let first_tick = self.swung_tick + 1;
        self.swung_tick = target_tick;
        TickBatch {
            first_tick,
            count: backlog,
            backlogged: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> Clock {
        let config = TimebaseConfig {
            tempo_bpm: 120.0,
            swing_amount: 0,
            swing_interval: SwingInterval(8),
            sample_rate: 48_000,
        };
        let mut c = Clock::new(config);
        c.start(PlaybackMode::Session, ClockSource::Internal, 0);
        c
    }

    #[test]
    fn tick_monotonicity_across_many_advances() {
        let mut c = clock();
        let mut last = 0u64;
        for block in 1..2000i64 {
            let batch = c.advance_to_sample(block * 64);
            if batch.count > 0 {
                assert!(batch.first_tick > last || (last == 0 && batch.first_tick == 1));
                last = c.current_swung_tick();
            }
        }
        assert!(last > 0);
    }

    #[test]
    fn no_swing_means_evenly_spaced_ticks() {
        let c = clock();
        let t0 = c.sample_time_for_tick(0);
        let t1 = c.sample_time_for_tick(1);
        let t2 = c.sample_time_for_tick(2);
        assert_eq!(t1 - t0, t2 - t1);
    }

    #[test]
    fn swing_stays_under_half_a_tick_so_order_never_inverts() {
        let config = TimebaseConfig {
            tempo_bpm: 120.0,
            swing_amount: 49,
            swing_interval: SwingInterval(2),
            sample_rate: 48_000,
        };
        let c = Clock::new(config);
        for t in 0..100u64 {
            let a = c.sample_time_for_tick(t);
            let b = c.sample_time_for_tick(t + 1);
            assert!(b > a, "tick {t} did not strictly precede tick {}", t + 1);
        }
    }

    #[test]
    fn backlog_beyond_threshold_skips_forward_and_flags() {
        let mut c = clock();
        let far_future_sample = c.sample_time_for_tick(1000);
        let batch = c.advance_to_sample(far_future_sample);
        assert!(batch.backlogged);
        assert_eq!(c.current_swung_tick(), 1000);
        // the batch must describe the tick the clock actually jumped to, not the stale tick
        // right after wherever it used to be, or callers resync against the wrong number.
        assert_eq!(batch.first_tick, c.current_swung_tick());
        assert_eq!(batch.count, 1);
    }

    #[test]
    fn identical_inputs_produce_identical_schedule() {
        let c1 = clock();
        let c2 = clock();
        for t in 0..500u64 {
            assert_eq!(c1.sample_time_for_tick(t), c2.sample_time_for_tick(t));
        }
    }
}
