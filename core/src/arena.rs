//! Generational arena used for every entity that the source repo represents with a cyclic
//! reference (`Clip` ↔ `Output` ↔ `Song`). Traversal always goes through the owning arena, not
//! a raw pointer, so a stale [`Handle`] (one pointing at a slot that was deleted and reused) is
//! detected instead of aliasing into unrelated data.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::marker::PhantomData;

/// A typed, generation-checked reference into an [`Arena`].
///
/// Copy/Eq/Hash so it can be stored freely (e.g. as `Output::active_clip: Option<Handle<Clip>>`)
/// without borrowing the arena.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}
impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<T> Eq for Handle<T> {}
impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}
impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({}#{})", self.index, self.generation)
    }
}

/// Serialized as the `(index, generation)` pair; round-tripping a `Handle` only makes sense
/// together with the `Arena` it was cut from, which is exactly what `Song` serialization does.
impl<T> Serialize for Handle<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.index, self.generation).serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Handle<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (index, generation) = <(u32, u32)>::deserialize(deserializer)?;
        Ok(Handle::new(index, generation))
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Bump-pool-style store: slots are reused (by index) after removal, but the generation counter
/// is bumped, so any [`Handle`] captured before the removal fails to resolve afterwards instead
/// of silently pointing at whatever got inserted next.
#[derive(Debug, Default)]
pub struct Arena<T> {
    slots: Vec<SlotRepr<T>>,
    free_list: Vec<u32>,
}

// kept as a thin wrapper so Debug doesn't require T: Debug trivially via Option
struct SlotRepr<T>(Slot<T>);
impl<T> std::fmt::Debug for SlotRepr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Slot(gen={}, occupied={})", self.0.generation, self.0.value.is_some())
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> Handle<T> {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize].0;
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            Handle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(SlotRepr(Slot {
                generation: 0,
                value: Some(value),
            }));
            Handle::new(index, 0)
        }
    }

    /// Removes the value behind `handle`, bumping the slot's generation so existing handles to
    /// it become stale. Returns `None` if the handle was already stale.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = &mut self.slots.get_mut(handle.index as usize)?.0;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        Some(value)
    }

    /// Reinserts `value` at the exact slot `handle` names, restoring a handle invalidated by an
    /// earlier `remove`. Used by the undo log (spec §4.6), which must resurrect the very same
    /// `Handle` so other structures still holding it (e.g. `Output::active_clip`) resolve again.
    pub fn reinsert(&mut self, handle: Handle<T>, value: T) {
        if handle.index as usize >= self.slots.len() {
            self.slots.resize_with(handle.index as usize + 1, || {
                SlotRepr(Slot { generation: 0, value: None })
            });
        }
        let slot = &mut self.slots[handle.index as usize].0;
        slot.generation = handle.generation;
        slot.value = Some(value);
        self.free_list.retain(|&i| i != handle.index);
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let slot = &self.slots.get(handle.index as usize)?.0;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let slot = &mut self.slots.get_mut(handle.index as usize)?.0;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.0
                .value
                .as_ref()
                .map(|v| (Handle::new(i as u32, slot.0.generation), v))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.0.generation;
            slot.0
                .value
                .as_mut()
                .map(move |v| (Handle::new(i as u32, generation), v))
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_after_remove_reinsert() {
        let mut arena: Arena<&'static str> = Arena::new();
        let a = arena.insert("a");
        arena.remove(a).unwrap();
        let b = arena.insert("b");
        assert_eq!(arena.get(a), None, "handle to removed slot must not resolve");
        assert_eq!(arena.get(b), Some(&"b"));
    }

    #[test]
    fn iter_skips_removed_slots() {
        let mut arena: Arena<i32> = Arena::new();
        let a = arena.insert(1);
        let _b = arena.insert(2);
        arena.remove(a);
        let values: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2]);
    }
}
