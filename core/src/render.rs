//! Drains queued `TimelineEvent`s each render window and hands them to external collaborators
//! in deterministic order (spec §4.4).

use tracing::warn;

use crate::external::VoiceSink;
use crate::timeline_event::QueuedEvent;

/// Fixed-size ring buffer between the tick path and the render path. Backed by `rtrb`, matching
/// the lock-free SPSC pattern the rest of this crate's corpus uses for realtime-thread handoff,
/// even though here both ends are drained from the same cooperative core (spec §5).
pub struct RenderBridge {
    producer: rtrb::Producer<QueuedEvent>,
    consumer: rtrb::Consumer<QueuedEvent>,
    overflow_count: u64,
}

impl RenderBridge {
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = rtrb::RingBuffer::new(capacity);
        Self {
            producer,
            consumer,
            overflow_count: 0,
        }
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// Pushes `event`. On overflow, drops the oldest not-yet-rendered event and retries once,
    /// per spec §4.4's `BridgeOverflow` semantics.
    pub fn push(&mut self, event: QueuedEvent) {
        if let Err(rtrb::PushError(event)) = self.producer.push(event) {
            warn!("BridgeOverflow: ring buffer full, dropping oldest event");
            self.overflow_count += 1;
            let _ = self.consumer.pop();
            if self.producer.push(event).is_err() {
                warn!("BridgeOverflow: still full after dropping oldest, dropping newest event");
            }
        }
    }

    pub fn push_all(&mut self, events: impl IntoIterator<Item = QueuedEvent>) {
        for event in events {
            self.push(event);
        }
    }

    /// Drains every currently-queued event, sorted by `(tick, output_index, row_index,
    /// noteOnBeforeNoteOff)` per spec §4.4's ordering guarantee.
    pub fn drain_sorted(&mut self) -> Vec<QueuedEvent> {
        let mut events = Vec::with_capacity(self.consumer.slots());
        while let Ok(event) = self.consumer.pop() {
            events.push(event);
        }
        events.sort_by_key(QueuedEvent::sort_key);
        events
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Drains every queued event in `(tick, output, row, noteOnBeforeNoteOff)` order and hands
    /// each to `sink`, which resolves it into the actual `AudioEngine`/`MidiTransport`/`CvGate`
    /// calls (spec §4.4). The only call site of [`VoiceSink::dispatch`] in this crate.
    pub fn dispatch_all(&mut self, sink: &mut impl VoiceSink) {
        for event in self.drain_sorted() {
            sink.dispatch(&event.event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::song::clip::Clip;
    use crate::song::note_row::NoteRowTarget;
    use crate::song::output::{Output, OutputKind};
    use crate::timeline_event::TimelineEvent;

    fn any_clip() -> crate::arena::Handle<Clip> {
        let mut outputs: Arena<Output> = Arena::new();
        let output = outputs.insert(Output::new(OutputKind::Synth, "t".into()));
        let mut clips: Arena<Clip> = Arena::new();
        clips.insert(Clip::new_instrument(output, 96))
    }

    fn note_on(tick: u64, output_index: u32, row_index: u32) -> QueuedEvent {
        QueuedEvent {
            tick,
            output_index,
            row_index,
            event: TimelineEvent::NoteOn {
                clip: any_clip(),
                target: NoteRowTarget::Pitch(60),
                velocity: 100,
            },
        }
    }

    #[test]
    fn drain_sorts_by_tick_then_output_then_row() {
        let mut bridge = RenderBridge::new(16);
        bridge.push(note_on(2, 0, 0));
        bridge.push(note_on(1, 1, 0));
        bridge.push(note_on(1, 0, 1));
        bridge.push(note_on(1, 0, 0));
        let drained = bridge.drain_sorted();
        let keys: Vec<_> = drained.iter().map(|e| (e.tick, e.output_index, e.row_index)).collect();
        assert_eq!(keys, vec![(1, 0, 0), (1, 0, 1), (1, 1, 0), (2, 0, 0)]);
    }

    #[test]
    fn note_on_sorts_before_note_off_at_same_key() {
        let clip = any_clip();
        let mut bridge = RenderBridge::new(16);
        bridge.push(QueuedEvent {
            tick: 5,
            output_index: 0,
            row_index: 0,
            event: TimelineEvent::NoteOff {
                clip,
                target: NoteRowTarget::Pitch(60),
            },
        });
        bridge.push(QueuedEvent {
            tick: 5,
            output_index: 0,
            row_index: 0,
            event: TimelineEvent::NoteOn {
                clip,
                target: NoteRowTarget::Pitch(60),
                velocity: 100,
            },
        });
        let drained = bridge.drain_sorted();
        assert!(matches!(drained[0].event, TimelineEvent::NoteOn { .. }));
        assert!(matches!(drained[1].event, TimelineEvent::NoteOff { .. }));
    }

    #[test]
    fn overflow_drops_oldest_and_keeps_newest() {
        let mut bridge = RenderBridge::new(2);
        bridge.push(note_on(1, 0, 0));
        bridge.push(note_on(2, 0, 0));
        bridge.push(note_on(3, 0, 0));
        assert_eq!(bridge.overflow_count(), 1);
        let drained = bridge.drain_sorted();
        let ticks: Vec<_> = drained.iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![2, 3]);
    }

    #[derive(Default)]
    struct RecordingSink {
        dispatched: Vec<TimelineEvent>,
    }

    impl crate::external::VoiceSink for RecordingSink {
        fn dispatch(&mut self, event: &TimelineEvent) {
            self.dispatched.push(event.clone());
        }
    }

    #[test]
    fn dispatch_all_hands_every_event_to_the_sink_in_sorted_order() {
        let mut bridge = RenderBridge::new(16);
        bridge.push(note_on(2, 0, 0));
        bridge.push(note_on(1, 0, 0));
        let mut sink = RecordingSink::default();
        bridge.dispatch_all(&mut sink);
        assert_eq!(sink.dispatched.len(), 2);
        assert!(bridge.is_empty());
    }
}
