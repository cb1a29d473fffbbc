//! Owner of automatable parameter values and their automation curves for a Clip or NoteRow.
//!
//! The DSP that actually reads these values is an external collaborator (spec §1 Non-goals), so
//! this crate only keeps the data honestly: a parameter id, a base value, and a sparse
//! automation curve the render bridge can sample. Never orphaned: every `ParamManager` is
//! either owned by a Clip/NoteRow or parked in `Song::hibernating_param_managers` (spec §3
//! invariant).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParamId {
    Volume,
    Pan,
    FilterCutoff,
    FilterResonance,
    ReverbSend,
    DelaySend,
    Custom(u16),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationPoint {
    pub pos: i64,
    pub value: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomationCurve {
    base_value: i32,
    /// Sorted by `pos`. Empty means "no automation, just `base_value`".
    points: Vec<AutomationPoint>,
}

impl AutomationCurve {
    pub fn with_base(value: i32) -> Self {
        Self {
            base_value: value,
            points: Vec::new(),
        }
    }

    pub fn set_point(&mut self, pos: i64, value: i32) {
        match self.points.binary_search_by_key(&pos, |p| p.pos) {
            Ok(i) => self.points[i].value = value,
            Err(i) => self.points.insert(i, AutomationPoint { pos, value }),
        }
    }

    /// Step-held value at `pos`: the most recent automation point at or before `pos`, else the
    /// base value. Automation curves in the original firmware are piecewise-linear in the DSP
    /// layer; this crate only needs to hand the render bridge "what's in effect right now".
    pub fn value_at(&self, pos: i64) -> i32 {
        match self.points.partition_point(|p| p.pos <= pos) {
            0 => self.base_value,
            i => self.points[i - 1].value,
        }
    }

    /// Automation points landing in `[from, to)`, the tick window the render bridge scans each
    /// tick (mirrors `NoteRow::notes_in_range`).
    pub fn points_in_range(&self, from: i64, to: i64) -> impl Iterator<Item = &AutomationPoint> {
        let start = self.points.partition_point(|p| p.pos < from);
        self.points[start..].iter().take_while(move |p| p.pos < to)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamManager {
    params: BTreeMap<ParamId, AutomationCurve>,
}

impl ParamManager {
    pub fn set_base(&mut self, id: ParamId, value: i32) {
        self.params.entry(id).or_default().base_value = value;
    }

    pub fn curve_mut(&mut self, id: ParamId) -> &mut AutomationCurve {
        self.params.entry(id).or_default()
    }

    pub fn value_at(&self, id: ParamId, pos: i64) -> Option<i32> {
        self.params.get(&id).map(|c| c.value_at(pos))
    }

    /// Every `(ParamId, value)` whose automation curve has a point landing in `[from, to)`, in
    /// `ParamId` order (the map is a `BTreeMap`). When a curve has more than one point in the
    /// window, only the latest (the value actually in effect by `to`) is reported.
    pub fn changes_in_range(&self, from: i64, to: i64) -> Vec<(ParamId, i32)> {
        self.params
            .iter()
            .filter_map(|(&id, curve)| curve.points_in_range(from, to).last().map(|p| (id, p.value)))
            .collect()
    }
}
