//! Top-level context threaded explicitly through the audio/tick/main-loop callbacks, replacing
//! the original firmware's global singletons (spec §9 design note).

use crossbeam_channel::{Receiver, Sender};

use crate::config::FlashSettings;
use crate::external::UpwardNotification;
use crate::harmonizer::ChannelState as HarmonizerChannelState;
use crate::history::History;
use crate::input::InputArbiter;
use crate::playback::PlaybackEngine;
use crate::render::RenderBridge;
use crate::session::SessionLauncher;
use crate::song::Song;

/// How many `UpwardNotification`s can sit unread before the UI layer is considered backlogged.
/// Bounded so a silent or slow UI thread can't grow this queue without limit.
const NOTIFICATION_CHANNEL_CAPACITY: usize = 64;

/// Bundles everything the three recurring activations described in spec §5 (audio render
/// callback, tick timer, main loop) need, so none of them reach into a global. A single `Context`
/// is constructed once at boot and passed by `&mut` into whichever callback is firing.
pub struct Context<E> {
    pub song: Song,
    pub playback: PlaybackEngine,
    pub session: SessionLauncher,
    pub render_bridge: RenderBridge,
    pub history: History,
    pub input: InputArbiter<E>,
    pub settings: FlashSettings,
    /// One harmonizer channel per MIDI channel (0..16), indexed by channel number.
    pub harmonizer_channels: [HarmonizerChannelState; 16],
    notification_tx: Sender<UpwardNotification>,
    notification_rx: Receiver<UpwardNotification>,
}

impl<E> Context<E> {
    pub fn new(song: Song, playback: PlaybackEngine, render_bridge_capacity: usize) -> Self {
        let (notification_tx, notification_rx) = crossbeam_channel::bounded(NOTIFICATION_CHANNEL_CAPACITY);
        Self {
            song,
            playback,
            session: SessionLauncher::new(crate::clock::TICKS_PER_QUARTER_NOTE),
            render_bridge: RenderBridge::new(render_bridge_capacity),
            history: History::new(),
            input: InputArbiter::new(),
            settings: FlashSettings::default(),
            harmonizer_channels: Default::default(),
            notification_tx,
            notification_rx,
        }
    }

    /// Queues a notification for the UI layer (spec §6 "Emitted upward"). Drops the oldest
    /// unread notification and retries once if the channel is full, mirroring the render
    /// bridge's own overflow handling (spec §4.4).
    pub fn notify(&self, notification: UpwardNotification) {
        if let Err(crossbeam_channel::TrySendError::Full(notification)) = self.notification_tx.try_send(notification) {
            let _ = self.notification_rx.try_recv();
            let _ = self.notification_tx.try_send(notification);
        }
    }

    /// Drains every notification queued since the last call.
    pub fn drain_notifications(&self) -> Vec<UpwardNotification> {
        self.notification_rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TimebaseConfig;

    #[test]
    fn context_constructs_with_sensible_defaults() {
        let song = Song::default();
        let timebase = TimebaseConfig {
            tempo_bpm: 120.0,
            swing_amount: 0,
            swing_interval: crate::clock::SwingInterval(4),
            sample_rate: 48_000,
        };
        let playback = PlaybackEngine::new(timebase);
        let context: Context<()> = Context::new(song, playback, 256);
        assert!(context.session.next_launch_event().is_none());
        assert!(!context.history.can_undo());
    }

    #[test]
    fn notifications_queue_and_drain_in_order() {
        let context: Context<()> = Context::new(Song::default(), PlaybackEngine::new(TimebaseConfig {
            tempo_bpm: 120.0,
            swing_amount: 0,
            swing_interval: crate::clock::SwingInterval(4),
            sample_rate: 48_000,
        }), 256);
        context.notify(crate::external::UpwardNotification::PlaybackEnded);
        context.notify(crate::external::UpwardNotification::PlaybackBacklogged);
        assert_eq!(
            context.drain_notifications(),
            vec![
                crate::external::UpwardNotification::PlaybackEnded,
                crate::external::UpwardNotification::PlaybackBacklogged,
            ]
        );
        assert!(context.drain_notifications().is_empty());
    }
}
