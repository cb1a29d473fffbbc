//! Routes pad/button/encoder events to the current UI layer and guards UI-mode discipline
//! (spec §4.7).

use enumflags2::{bitflags, BitFlags};
use tracing::warn;

/// One of the mutually-exclusive UI modes. Not an exhaustive transcription of the original
/// firmware's ~50 modes — a representative subset covering the transitions this crate's other
/// modules actually drive (session/arrangement interaction, auditioning, animation), with the
/// enum left open to extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UiMode {
    Idle = 0,
    HoldingSectionPad,
    ClipPressedInSongView,
    ClipPressedInArrangerView,
    HoldingClipForOverdub,
    Auditioning,
    ExplodeAnimation,
    EnteringSdRoutine,
}

/// OR-combined flags living in the high bits alongside the exclusive [`UiMode`] (spec §4.7).
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiFlag {
    HorizontalScroll,
    Auditioning,
    Stuttering,
    HoldingHorizontalEncoder,
}

/// Packs the exclusive mode and OR-combined flags into the single 32-bit word spec §4.7
/// describes. Mode occupies the low byte, flags the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiModeWord {
    pub mode: UiMode,
    pub flags: BitFlags<UiFlag>,
}

impl UiModeWord {
    pub fn to_u32(self) -> u32 {
        (self.mode as u32) | ((self.flags.bits() as u32) << 8)
    }
}

impl Default for UiModeWord {
    fn default() -> Self {
        Self {
            mode: UiMode::Idle,
            flags: BitFlags::empty(),
        }
    }
}

/// What kind of model mutation a dispatched handler performs. Used to decide whether it may run
/// while the main thread is already inside the SD-card routine (spec §4.7). Only
/// `PadAuditionStop`, `EncoderScrollOnly`, and `PlaybackStopPanic` are on the exempt allow-list
/// resolved in this crate's expanded spec — they touch only realtime-safe state, never Clip
/// insertion/removal or allocation. Everything else waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    PadAuditionStop,
    EncoderScrollOnly,
    PlaybackStopPanic,
    ClipInsertOrRemove,
    SampleLoad,
    SettingsWrite,
    SongLoad,
}

impl HandlerKind {
    fn is_card_routine_exempt(self) -> bool {
        matches!(
            self,
            HandlerKind::PadAuditionStop | HandlerKind::EncoderScrollOnly | HandlerKind::PlaybackStopPanic
        )
    }
}

/// Returned by a handler instead of running when it would touch SD storage while the card
/// routine is already active and it isn't on the exempt allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemindMeOutsideCardRoutine;

/// A deferred input event, re-posted once the card routine finishes.
#[derive(Debug, Clone)]
pub struct PendingEvent<E> {
    pub event: E,
}

#[derive(Debug)]
pub struct InputArbiter<E> {
    current: UiModeWord,
    in_card_routine: bool,
    deferred: Vec<PendingEvent<E>>,
}

impl<E> Default for InputArbiter<E> {
    fn default() -> Self {
        Self {
            current: UiModeWord::default(),
            in_card_routine: false,
            deferred: Vec::new(),
        }
    }
}

impl<E> InputArbiter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_mode(&self) -> UiModeWord {
        self.current
    }

    /// Transitions to `mode`. Rejects the transition (returning `false`) if a different
    /// non-`Idle` exclusive mode is already active — illegal overlaps must `exitUIMode` first.
    pub fn enter_ui_mode(&mut self, mode: UiMode) -> bool {
        if self.current.mode != UiMode::Idle && self.current.mode != mode {
            warn!(from = ?self.current.mode, to = ?mode, "rejected illegal UI mode overlap");
            return false;
        }
        self.current.mode = mode;
        true
    }

    /// Leaves `mode`, returning to `Idle`. No-op if `mode` isn't the currently active one.
    pub fn exit_ui_mode(&mut self, mode: UiMode) {
        if self.current.mode == mode {
            self.current.mode = UiMode::Idle;
        }
    }

    pub fn set_flag(&mut self, flag: UiFlag) {
        self.current.flags.insert(flag);
    }

    pub fn clear_flag(&mut self, flag: UiFlag) {
        self.current.flags.remove(flag);
    }

    pub fn has_flag(&self, flag: UiFlag) -> bool {
        self.current.flags.contains(flag)
    }

    pub fn enter_card_routine(&mut self) {
        self.in_card_routine = true;
    }

    pub fn exit_card_routine(&mut self) -> Vec<PendingEvent<E>> {
        self.in_card_routine = false;
        std::mem::take(&mut self.deferred)
    }

    /// Guards a handler that would touch SD storage. If the card routine is active and
    /// `handler` isn't exempt, defers `event` and returns `Err(RemindMeOutsideCardRoutine)`;
    /// the caller must re-post `event` once [`Self::exit_card_routine`] drains the deferred list.
    pub fn guard_card_access(&mut self, handler: HandlerKind, event: E) -> Result<(), RemindMeOutsideCardRoutine> {
        if self.in_card_routine && !handler.is_card_routine_exempt() {
            self.deferred.push(PendingEvent { event });
            return Err(RemindMeOutsideCardRoutine);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entering_a_second_exclusive_mode_is_rejected() {
        let mut arbiter: InputArbiter<()> = InputArbiter::new();
        assert!(arbiter.enter_ui_mode(UiMode::HoldingSectionPad));
        assert!(!arbiter.enter_ui_mode(UiMode::Auditioning));
        assert_eq!(arbiter.current_mode().mode, UiMode::HoldingSectionPad);
    }

    #[test]
    fn exiting_returns_to_idle_and_allows_a_new_mode() {
        let mut arbiter: InputArbiter<()> = InputArbiter::new();
        arbiter.enter_ui_mode(UiMode::HoldingSectionPad);
        arbiter.exit_ui_mode(UiMode::HoldingSectionPad);
        assert_eq!(arbiter.current_mode().mode, UiMode::Idle);
        assert!(arbiter.enter_ui_mode(UiMode::Auditioning));
    }

    #[test]
    fn flags_are_independent_of_the_exclusive_mode() {
        let mut arbiter: InputArbiter<()> = InputArbiter::new();
        arbiter.enter_ui_mode(UiMode::HoldingSectionPad);
        arbiter.set_flag(UiFlag::HorizontalScroll);
        assert!(arbiter.has_flag(UiFlag::HorizontalScroll));
        assert_eq!(arbiter.current_mode().mode, UiMode::HoldingSectionPad);
    }

    #[test]
    fn exempt_handlers_run_during_card_routine() {
        let mut arbiter: InputArbiter<&'static str> = InputArbiter::new();
        arbiter.enter_card_routine();
        assert!(arbiter.guard_card_access(HandlerKind::PlaybackStopPanic, "panic").is_ok());
        assert!(arbiter.guard_card_access(HandlerKind::PadAuditionStop, "audition").is_ok());
        assert!(arbiter.guard_card_access(HandlerKind::EncoderScrollOnly, "scroll").is_ok());
    }

    #[test]
    fn non_exempt_handler_is_deferred_and_reposted_after_card_routine() {
        let mut arbiter: InputArbiter<&'static str> = InputArbiter::new();
        arbiter.enter_card_routine();
        let result = arbiter.guard_card_access(HandlerKind::ClipInsertOrRemove, "insert clip");
        assert_eq!(result, Err(RemindMeOutsideCardRoutine));

        let reposted = arbiter.exit_card_routine();
        assert_eq!(reposted.len(), 1);
        assert_eq!(reposted[0].event, "insert clip");
    }

    #[test]
    fn outside_card_routine_every_handler_runs_immediately() {
        let mut arbiter: InputArbiter<&'static str> = InputArbiter::new();
        assert!(arbiter.guard_card_access(HandlerKind::SongLoad, "load").is_ok());
    }
}
