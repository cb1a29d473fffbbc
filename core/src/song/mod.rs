//! The Song/Clip model: the user's composition as a set of Clips hosted by Outputs, plus
//! arrangement-view ClipInstances, plus scalar musical state. See spec §3.

pub mod clip;
pub mod clip_instance;
pub mod note;
pub mod note_row;
pub mod output;
pub mod param_manager;
pub mod section;

use crate::arena::{Arena, Handle};
use crate::error::CoreError;
use clip::Clip;
use output::Output;
use param_manager::ParamManager;
use section::Section;
use serde::{Deserialize, Serialize};

/// Which of the two scrollable/zoomable views a `(xScroll, xZoom)` pair belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationAxis {
    Session,
    Arrangement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwingInterval(pub u8);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub outputs: Arena<Output>,
    /// Insertion order of outputs, since `Arena` iteration order isn't guaranteed stable across
    /// removal/reinsertion.
    pub output_order: Vec<Handle<Output>>,
    /// Session slots.
    pub clips: Arena<Clip>,
    pub session_clip_order: Vec<Handle<Clip>>,

    pub root_note: u8,
    /// 12-bit scale bitfield, bit 0 = root.
    pub mode_notes: u16,
    pub x_scroll: [i64; 2],
    pub x_zoom: [i64; 2],
    pub swing_amount: i8,
    pub swing_interval: SwingInterval,
    pub inside_world_tick_magnitude: i8,
    pub sections: [Section; 12],

    /// Backup pool for `ParamManager`s belonging to hibernating (currently un-attached)
    /// Instruments, so they're never orphaned (spec §3 invariant).
    pub hibernating_param_managers: Vec<(Handle<Output>, ParamManager)>,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            outputs: Arena::new(),
            output_order: Vec::new(),
            clips: Arena::new(),
            session_clip_order: Vec::new(),
            root_note: 0,
            mode_notes: 0b1010_1101_0101, // major scale, arbitrary but valid default
            x_scroll: [0, 0],
            x_zoom: [1, 1],
            swing_amount: 0,
            swing_interval: SwingInterval(4),
            inside_world_tick_magnitude: 1,
            sections: Default::default(),
            hibernating_param_managers: Vec::new(),
        }
    }
}

impl Song {
    pub fn x_scroll(&self, axis: NavigationAxis) -> i64 {
        self.x_scroll[axis as usize]
    }

    pub fn set_x_scroll(&mut self, axis: NavigationAxis, value: i64) {
        self.x_scroll[axis as usize] = value;
    }

    pub fn add_output(&mut self, output: Output) -> Handle<Output> {
        let handle = self.outputs.insert(output);
        self.output_order.push(handle);
        handle
    }

    /// Adds a session Clip. Fails the invariant check if `output` doesn't exist.
    pub fn add_session_clip(&mut self, clip: Clip) -> Result<Handle<Clip>, CoreError> {
        if !self.outputs.contains(clip.output) {
            return Err(CoreError::Bug("clip references an output that doesn't exist"));
        }
        let handle = self.clips.insert(clip);
        self.session_clip_order.push(handle);
        Ok(handle)
    }

    /// Removes a session Clip. Fails with `LastClipCannotRemove` if it is the only Clip on its
    /// Output (spec §4.3 failure semantics) and clears `Output::active_clip` if it pointed here.
    pub fn remove_session_clip(&mut self, handle: Handle<Clip>) -> Result<(), CoreError> {
        let clip = self.clips.get(handle).ok_or(CoreError::Bug("removing a clip that doesn't exist"))?;
        let output_handle = clip.output;
        let sibling_count = self
            .session_clip_order
            .iter()
            .filter(|h| self.clips.get(**h).map(|c| c.output) == Some(output_handle))
            .count();
        if sibling_count <= 1 {
            return Err(CoreError::LastClipCannotRemove);
        }
        self.clips.remove(handle);
        self.session_clip_order.retain(|h| *h != handle);
        if let Some(output) = self.outputs.get_mut(output_handle) {
            if output.active_clip == Some(handle) {
                output.active_clip = None;
            }
        }
        Ok(())
    }

    pub fn section(&self, index: u8) -> Option<&Section> {
        self.sections.get(index as usize)
    }

    pub fn section_mut(&mut self, index: u8) -> Option<&mut Section> {
        self.sections.get_mut(index as usize)
    }

    /// Every Clip whose `section` is `Some(index)`.
    pub fn clips_in_section(&self, index: u8) -> impl Iterator<Item = Handle<Clip>> + '_ {
        self.session_clip_order.iter().copied().filter(move |h| {
            self.clips.get(*h).and_then(|c| c.section) == Some(index)
        })
    }

    /// Checks the cross-entity invariants from spec §3. Intended for debug assertions and
    /// tests, not the realtime path.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        for (handle, output) in self.outputs.iter() {
            if let Some(active) = output.active_clip {
                let clip = self
                    .clips
                    .get(active)
                    .ok_or(CoreError::Bug("output.active_clip points at a missing clip"))?;
                if clip.output != handle {
                    return Err(CoreError::Bug("active clip's output back-reference mismatch"));
                }
            }
        }
        for (_, clip) in self.clips.iter() {
            if !self.outputs.contains(clip.output) {
                return Err(CoreError::Bug("clip references a missing output"));
            }
        }
        Ok(())
    }
}
