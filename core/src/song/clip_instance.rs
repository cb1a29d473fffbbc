//! An arrangement-view placement of a session [`super::clip::Clip`] on an Output's timeline.

use crate::arena::Handle;
use crate::song::clip::Clip;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipInstance {
    pub pos: i64,
    pub length: i64,
    pub clip: Handle<Clip>,
}

impl ClipInstance {
    pub fn end_pos(&self) -> i64 {
        self.pos + self.length
    }

    fn overlaps(&self, other: &ClipInstance) -> bool {
        self.pos < other.end_pos() && other.pos < self.end_pos()
    }
}

/// A sorted, non-overlapping sequence of [`ClipInstance`]s, one per `Output` (spec §3 invariant:
/// "no two instances in one Output overlap; kept sorted by pos and binary-searchable").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClipInstanceTrack {
    instances: Vec<ClipInstance>,
}

impl ClipInstanceTrack {
    pub fn instances(&self) -> &[ClipInstance] {
        &self.instances
    }

    /// Inserts `instance`, maintaining sort order. Rejects it if it overlaps an existing
    /// instance.
    pub fn insert(&mut self, instance: ClipInstance) -> Result<usize, &'static str> {
        let idx = self.instances.partition_point(|i| i.pos < instance.pos);
        let overlaps_left = idx > 0 && self.instances[idx - 1].overlaps(&instance);
        let overlaps_right = idx < self.instances.len() && self.instances[idx].overlaps(&instance);
        if overlaps_left || overlaps_right {
            return Err("clip instance overlaps an existing instance on this output");
        }
        self.instances.insert(idx, instance);
        Ok(idx)
    }

    pub fn remove_at(&mut self, index: usize) -> Option<ClipInstance> {
        if index < self.instances.len() {
            Some(self.instances.remove(index))
        } else {
            None
        }
    }

    /// Binary-searches for the instance active at `pos`, if any.
    pub fn at_pos(&self, pos: i64) -> Option<(usize, &ClipInstance)> {
        let idx = self.instances.partition_point(|i| i.pos <= pos);
        if idx == 0 {
            return None;
        }
        let candidate = &self.instances[idx - 1];
        (candidate.pos <= pos && pos < candidate.end_pos()).then_some((idx - 1, candidate))
    }
}
