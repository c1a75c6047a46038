//! Slot arena backing one handle kind
//!
//! Slots are reused first-in first-out from a free list and every reuse bumps
//! the slot generation, so a stale handle never resolves to a new occupant.
//! A slot whose generation is used up is retired and never handed out again.

use std::collections::VecDeque;
use std::sync::Arc;

use super::handle::{next_generation, Handle, HandleKind, MAX_INDEX};

struct Slot<T> {
    generation: u16,
    refcount: u32,
    value: Option<Arc<T>>,
}

/// Outcome of releasing one reference
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Release {
    /// Handle did not resolve
    Invalid,
    /// References remain
    Retained(u32),
    /// That was the last reference; the caller must call [`Arena::remove`]
    Last,
}

pub(crate) struct Arena<T> {
    kind: HandleKind,
    slots: Vec<Slot<T>>,
    free: VecDeque<usize>,
}

impl<T> Arena<T> {
    pub(crate) fn new(kind: HandleKind) -> Self {
        Self {
            kind,
            slots: Vec::new(),
            free: VecDeque::new(),
        }
    }

    /// Store a value with refcount 1
    ///
    /// Returns `None` when every addressable slot is occupied.
    pub(crate) fn insert(&mut self, value: Arc<T>) -> Option<Handle> {
        self.insert_with(|_| value)
    }

    /// Store a value built from the handle it will live under
    pub(crate) fn insert_with(&mut self, make: impl FnOnce(Handle) -> Arc<T>) -> Option<Handle> {
        let index = match self.free.pop_front() {
            Some(index) => index,
            None if self.slots.len() <= MAX_INDEX => {
                self.slots.push(Slot {
                    generation: 0,
                    refcount: 0,
                    value: None,
                });
                self.slots.len() - 1
            }
            None => return None,
        };

        let slot = &mut self.slots[index];
        let handle = Handle::new(self.kind, slot.generation, index);
        slot.refcount = 1;
        slot.value = Some(make(handle));
        Some(handle)
    }

    fn slot(&self, handle: Handle) -> Option<&Slot<T>> {
        if handle.kind() != Some(self.kind) {
            return None;
        }
        self.slots
            .get(handle.index())
            .filter(|s| s.generation == handle.generation() && s.refcount > 0)
    }

    fn slot_mut(&mut self, handle: Handle) -> Option<&mut Slot<T>> {
        if handle.kind() != Some(self.kind) {
            return None;
        }
        self.slots
            .get_mut(handle.index())
            .filter(|s| s.generation == handle.generation() && s.refcount > 0)
    }

    pub(crate) fn get(&self, handle: Handle) -> Option<&Arc<T>> {
        self.slot(handle).and_then(|s| s.value.as_ref())
    }

    #[cfg(test)]
    pub(crate) fn refcount(&self, handle: Handle) -> u32 {
        self.slot(handle).map_or(0, |s| s.refcount)
    }

    pub(crate) fn retain(&mut self, handle: Handle) -> bool {
        match self.slot_mut(handle) {
            Some(slot) => {
                slot.refcount = slot.refcount.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Drop one reference; on [`Release::Last`] the slot is still resolvable
    /// until [`Arena::remove`] runs
    pub(crate) fn release(&mut self, handle: Handle) -> Release {
        match self.slot_mut(handle) {
            Some(slot) if slot.refcount > 1 => {
                slot.refcount -= 1;
                Release::Retained(slot.refcount)
            }
            Some(_) => Release::Last,
            None => Release::Invalid,
        }
    }

    /// Invalidate the handle regardless of its refcount
    pub(crate) fn remove(&mut self, handle: Handle) -> Option<Arc<T>> {
        let slot = self.slot_mut(handle)?;
        slot.refcount = 0;
        let value = slot.value.take();
        match next_generation(slot.generation) {
            Some(generation) => {
                slot.generation = generation;
                self.free.push_back(handle.index());
            }
            None => {
                tracing::debug!(slot = handle.index(), kind = self.kind.as_str(), "Slot retired");
            }
        }
        value
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.iter().count()
    }

    /// Live entries in slot order
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Handle, &Arc<T>)> + '_ {
        let kind = self.kind;
        self.slots.iter().enumerate().filter_map(move |(index, slot)| {
            slot.value
                .as_ref()
                .filter(|_| slot.refcount > 0)
                .map(|v| (Handle::new(kind, slot.generation, index), v))
        })
    }

    pub(crate) fn handles(&self) -> Vec<Handle> {
        self.iter().map(|(h, _)| h).collect()
    }
}
