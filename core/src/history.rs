//! Action / undo log (spec §4.6). Grounded on the teacher's `base::history::History`, but
//! recomposed around per-mutation `Consequence` records (reverse/forward) instead of whole-state
//! snapshots, per the contract's "each mutation appends one or more Consequence records".

use std::collections::VecDeque;
use std::fmt::Debug;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::CoreError;
use crate::song::Song;

/// Same-type actions begun within this window of each other coalesce into one Action.
pub const COALESCENCE_WINDOW: Duration = Duration::from_millis(500);

/// Upper bound on how many completed Actions the undo ring remembers.
pub const MAX_HISTORY_ACTIONS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    NoteEdit,
    ClipEdit,
    ClipCreate,
    ClipDelete,
    ParamEdit,
    SongStructure,
}

/// One reversible side effect of a mutation. Implementors capture whatever state they need to
/// undo themselves; `History` never inspects `Song` directly.
pub trait Consequence: Debug {
    fn reverse(&self, song: &mut Song) -> Result<(), CoreError>;
    fn forward(&self, song: &mut Song) -> Result<(), CoreError>;
}

/// Simulates the allocator running out of room for a new `Consequence`, without this crate
/// owning a real allocator — the same injectable-budget pattern `playback::RamBudget` uses for
/// linear-recording extension.
pub trait HistoryRamBudget {
    fn try_reserve_for_consequence(&mut self) -> bool;
}

#[derive(Debug, Default)]
pub struct UnlimitedHistoryRam;
impl HistoryRamBudget for UnlimitedHistoryRam {
    fn try_reserve_for_consequence(&mut self) -> bool {
        true
    }
}

#[derive(Debug)]
struct Action {
    action_type: ActionType,
    consequences: Vec<Box<dyn Consequence>>,
    last_touched: Instant,
    /// Set when a `Consequence` couldn't be recorded for lack of RAM (spec §4.6 failure
    /// semantics): the action is missing part of its own history from this point forward.
    partial: bool,
}

#[derive(Debug)]
pub struct History {
    undo_stack: VecDeque<Action>,
    redo_stack: Vec<Action>,
    current: Option<Action>,
    /// Set once undo has reversed a `partial` Action; further `undo()` calls refuse to proceed
    /// past it, since the gap in that Action's record makes the state before it unreliable to
    /// reconstruct (spec §4.6: "subsequent undo stops at that boundary").
    partial_boundary: bool,
}

impl Default for History {
    fn default() -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            current: None,
            partial_boundary: false,
        }
    }
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_undo(&self) -> bool {
        !self.partial_boundary && (self.current.is_some() || !self.undo_stack.is_empty())
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Starts (or coalesces into) an Action of `action_type`. A same-type Action already being
    /// built within [`COALESCENCE_WINDOW`] of its last touch absorbs this call instead of
    /// starting a new one (spec §4.6 coalescence rules).
    pub fn begin_action(&mut self, action_type: ActionType, now: Instant) {
        if let Some(action) = &self.current {
            if action.action_type == action_type && now.duration_since(action.last_touched) < COALESCENCE_WINDOW {
                return;
            }
            self.flush_current();
        }
        self.redo_stack.clear();
        self.current = Some(Action {
            action_type,
            consequences: Vec::new(),
            last_touched: now,
            partial: false,
        });
    }

    /// Appends a `Consequence` to the Action currently being built. No-op if no Action is open
    /// (a bug in the caller, not a user-facing failure) or if that Action already went partial.
    pub fn record(&mut self, consequence: Box<dyn Consequence>, now: Instant, ram: &mut dyn HistoryRamBudget) {
        let Some(action) = self.current.as_mut() else {
            warn!("history record() called with no open action");
            return;
        };
        if action.partial {
            return;
        }
        if !ram.try_reserve_for_consequence() {
            warn!(action_type = ?action.action_type, "RAM exhausted recording a consequence, marking action partial");
            action.partial = true;
            return;
        }
        action.consequences.push(consequence);
        action.last_touched = now;
    }

    fn flush_current(&mut self) {
        if let Some(action) = self.current.take() {
            if !action.consequences.is_empty() {
                if self.undo_stack.len() == MAX_HISTORY_ACTIONS {
                    self.undo_stack.pop_front();
                }
                self.undo_stack.push_back(action);
            }
        }
    }

    /// Reverses the most recent Action's consequences, in reverse order, against `song`.
    pub fn undo(&mut self, song: &mut Song) -> Result<(), CoreError> {
        if self.partial_boundary {
            return Err(CoreError::Generic("undo log is partial beyond this point"));
        }
        self.flush_current();
        let Some(action) = self.undo_stack.pop_back() else {
            return Err(CoreError::Generic("nothing to undo"));
        };
        for consequence in action.consequences.iter().rev() {
            consequence.reverse(song)?;
        }
        if action.partial {
            self.partial_boundary = true;
        }
        self.redo_stack.push(action);
        Ok(())
    }

    /// Replays the most recently undone Action's consequences, in original order, against
    /// `song`.
    pub fn redo(&mut self, song: &mut Song) -> Result<(), CoreError> {
        let action = self.redo_stack.pop().ok_or(CoreError::Generic("nothing to redo"))?;
        for consequence in &action.consequences {
            consequence.forward(song)?;
        }
        self.partial_boundary = false;
        self.undo_stack.push_back(action);
        Ok(())
    }

    /// Clears the log entirely. Called before non-undoable structural changes (song load,
    /// factory reset) per spec §4.6.
    pub fn delete_all_logs(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current = None;
        self.partial_boundary = false;
    }
}
