// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Track in-flight 9P2000 tags, their flush state and legacy delivery state.
// Author: Lukas Bower

//! Registry of in-flight 9P2000 requests.
//!
//! Every dispatched request owns one entry. A flush takes a second reference
//! on its target so the entry outlives the target's response until the flush
//! has finished with it.
//!
//! Each legacy transaction started for an entry gets a new serial. A flush
//! arms itself against the serial outstanding when its legacy `Tflush` goes
//! out and may only wake that transaction. Forced transactions are never
//! armed against, so their replies are always consumed by their sender.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Handle on a registry entry.
///
/// Tags are matched by serial rather than by wire tag so that a client
/// reusing a tag while an older entry is still held cannot alias it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tag {
    id: u16,
    serial: u64,
}

impl Tag {
    /// Wire tag of the request.
    pub(crate) fn id(self) -> u16 {
        self.id
    }
}

#[derive(Debug)]
struct Entry {
    id: u16,
    serial: u64,
    flushed: bool,
    received: bool,
    settled: bool,
    refs: u32,
    txn: u64,
    forced: bool,
    armed: Option<u64>,
}

#[derive(Debug, Default)]
struct Inner {
    next_serial: u64,
    entries: Vec<Entry>,
}

impl Inner {
    fn entry(&mut self, tag: Tag) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|entry| entry.serial == tag.serial)
    }

    fn insert(&mut self, id: u16) -> Tag {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.entries.push(Entry {
            id,
            serial,
            flushed: false,
            received: false,
            settled: false,
            refs: 1,
            txn: 0,
            forced: false,
            armed: None,
        });
        Tag { id, serial }
    }
}

/// In-flight tag registry guarded by a single lock.
#[derive(Debug, Default)]
pub(crate) struct TagRegistry {
    inner: Mutex<Inner>,
    settled: Condvar,
}

impl TagRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a fresh entry holding one reference.
    #[cfg(test)]
    pub(crate) fn create(&self, id: u16) -> Tag {
        self.lock().insert(id)
    }

    /// Insert an entry for a newly read request. Returns `None` while an
    /// earlier request with the same wire tag is still unanswered.
    pub(crate) fn admit(&self, id: u16) -> Option<Tag> {
        let mut inner = self.lock();
        if inner.entries.iter().any(|entry| entry.id == id && !entry.settled) {
            return None;
        }
        Some(inner.insert(id))
    }

    /// Drop one reference, removing the entry when none remain.
    pub(crate) fn release(&self, tag: Tag) {
        let mut inner = self.lock();
        let Some(pos) = inner.entries.iter().position(|e| e.serial == tag.serial) else {
            return;
        };
        let entry = &mut inner.entries[pos];
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            inner.entries.remove(pos);
            drop(inner);
            self.settled.notify_all();
        }
    }

    /// Find the newest entry for `id`, taking an extra reference on it.
    pub(crate) fn find(&self, id: u16) -> Option<Tag> {
        let mut inner = self.lock();
        let entry = inner.entries.iter_mut().rev().find(|entry| entry.id == id)?;
        entry.refs += 1;
        Some(Tag {
            id: entry.id,
            serial: entry.serial,
        })
    }

    pub(crate) fn mark_flushed(&self, tag: Tag) {
        if let Some(entry) = self.lock().entry(tag) {
            entry.flushed = true;
        }
    }

    #[cfg(test)]
    fn is_flushed(&self, tag: Tag) -> bool {
        self.lock().entry(tag).is_some_and(|entry| entry.flushed)
    }

    /// Start a new legacy transaction for `tag`.
    ///
    /// Returns false, leaving the state untouched, when the request has been
    /// flushed and `force` is not set.
    pub(crate) fn begin_transaction(&self, tag: Tag, force: bool) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.entry(tag) else {
            return force;
        };
        if entry.flushed && !force {
            return false;
        }
        entry.txn += 1;
        entry.forced = force;
        entry.received = false;
        true
    }

    /// Arm a flush against the transaction `tag` has outstanding. Returns
    /// false when there is nothing a legacy flush could cancel: no
    /// transaction yet, its reply already arrived, or it is forced.
    pub(crate) fn arm_flush(&self, tag: Tag) -> bool {
        let mut inner = self.lock();
        match inner.entry(tag) {
            Some(entry) if entry.txn > 0 && !entry.received && !entry.forced => {
                entry.armed = Some(entry.txn);
                true
            }
            _ => false,
        }
    }

    /// Record that the legacy reply for `id` arrived. Returns false when no
    /// request with that tag is in flight.
    pub(crate) fn mark_received(&self, id: u16) -> bool {
        let mut inner = self.lock();
        match inner.entries.iter_mut().rev().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.received = true;
                true
            }
            None => false,
        }
    }

    /// Claim the right to wake `tag` without a reply. Succeeds only while the
    /// transaction a flush was armed against is still the outstanding one.
    pub(crate) fn claim_wakeup(&self, tag: Tag) -> bool {
        let mut inner = self.lock();
        match inner.entry(tag) {
            Some(entry) if !entry.received && entry.armed == Some(entry.txn) => {
                entry.received = true;
                true
            }
            _ => false,
        }
    }

    /// Record that the response for `tag` was written or suppressed.
    pub(crate) fn settle(&self, tag: Tag) {
        if let Some(entry) = self.lock().entry(tag) {
            entry.settled = true;
        }
        self.settled.notify_all();
    }

    /// Block until `tag` has settled or left the registry.
    pub(crate) fn wait_settled(&self, tag: Tag) {
        let mut inner = self.lock();
        while inner.entry(tag).is_some_and(|entry| !entry.settled) {
            inner = self
                .settled
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().entries.len()
    }
}
