// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Track 9P2000 fids and the legacy fids that back them.
// Author: Lukas Bower

//! Fid table shared by the translator operations.
//!
//! Each 9P2000 fid is backed by the legacy fid with the same number, so only
//! fids that fit in 16 bits can be handed out. Slots are found by linear scan
//! and recycled once no operation or binding claims them.

use std::sync::{Mutex, MutexGuard, PoisonError};

use ninep_codec::Qid;

/// A claimed fid slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Handle {
    fid: u16,
}

impl Handle {
    /// Legacy fid backing this handle.
    pub(crate) fn legacy(self) -> u16 {
        self.fid
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    fid: u16,
    busy: bool,
    allocated: bool,
    qid: Qid,
    offsets: (u64, u64),
}

/// Fid slots guarded by their own lock.
#[derive(Debug, Default)]
pub(crate) struct HandleTable {
    slots: Mutex<Vec<Slot>>,
}

impl HandleTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_slot<T>(&self, handle: Handle, f: impl FnOnce(&mut Slot) -> T) -> Option<T> {
        self.lock()
            .iter_mut()
            .find(|slot| slot.fid == handle.fid)
            .map(f)
    }

    /// Claim the slot for `fid`: the slot already holding it, else the first
    /// unallocated slot, else a new one. Returns `None` for fids that have no
    /// legacy counterpart.
    pub(crate) fn acquire(&self, fid: u32) -> Option<Handle> {
        let fid = u16::try_from(fid).ok()?;
        let mut slots = self.lock();
        let mut free = None;
        for (idx, slot) in slots.iter_mut().enumerate() {
            if slot.fid == fid {
                slot.allocated = true;
                return Some(Handle { fid });
            }
            if free.is_none() && !slot.allocated {
                free = Some(idx);
            }
        }
        match free {
            Some(idx) => {
                slots[idx] = Slot {
                    fid,
                    allocated: true,
                    ..Slot::default()
                };
            }
            None => slots.push(Slot {
                fid,
                allocated: true,
                ..Slot::default()
            }),
        }
        Some(Handle { fid })
    }

    pub(crate) fn is_busy(&self, handle: Handle) -> bool {
        self.with_slot(handle, |slot| slot.busy).unwrap_or(false)
    }

    /// Mark the slot as bound to a legacy resource identified by `qid`.
    pub(crate) fn bind(&self, handle: Handle, qid: Qid) {
        self.with_slot(handle, |slot| {
            slot.busy = true;
            slot.allocated = true;
            slot.qid = qid;
        });
    }

    /// Unbind the slot, leaving it free for reuse.
    pub(crate) fn clear(&self, handle: Handle) {
        self.with_slot(handle, |slot| {
            slot.busy = false;
            slot.allocated = false;
        });
    }

    /// Give back a slot claimed by `acquire` that never became bound.
    pub(crate) fn release_if_idle(&self, handle: Handle) {
        self.with_slot(handle, |slot| {
            if !slot.busy {
                slot.allocated = false;
            }
        });
    }

    pub(crate) fn qid(&self, handle: Handle) -> Qid {
        self.with_slot(handle, |slot| slot.qid).unwrap_or_default()
    }

    pub(crate) fn set_qid(&self, handle: Handle, qid: Qid) {
        self.with_slot(handle, |slot| slot.qid = qid);
    }

    /// Directory read offsets as (9P2000 offset, legacy offset).
    pub(crate) fn offsets(&self, handle: Handle) -> (u64, u64) {
        self.with_slot(handle, |slot| slot.offsets)
            .unwrap_or_default()
    }

    pub(crate) fn set_offsets(&self, handle: Handle, offsets: (u64, u64)) {
        self.with_slot(handle, |slot| slot.offsets = offsets);
    }

    /// Forget every binding, as on a new session.
    pub(crate) fn reset(&self) {
        for slot in self.lock().iter_mut() {
            slot.busy = false;
            slot.allocated = false;
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.lock().len()
    }
}
