// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Hand legacy replies from the demultiplexer to the waiting request.
// Author: Lukas Bower

//! Per-tag single-slot hand-off between the demultiplexer and operations.
//!
//! Each waiting operation registers a zero-capacity channel under its tag.
//! Whoever removes the sender from the map (the demultiplexer with a reply,
//! or a flush with `None`) is the only party that may send on it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::warn;

/// Raw bytes of one legacy reply.
pub(crate) type Message = Vec<u8>;

/// Outcome of waiting on a slot.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The legacy reply for the tag.
    Reply(Message),
    /// A flush cancelled the wait.
    Cancelled,
    /// The demultiplexer went away without answering.
    Lost,
}

/// Receiving end held by the waiting operation.
#[derive(Debug)]
pub(crate) struct Slot {
    rx: Receiver<Option<Message>>,
}

impl Slot {
    /// Block until the slot is answered.
    pub(crate) fn wait(self) -> Delivery {
        match self.rx.recv() {
            Ok(Some(message)) => Delivery::Reply(message),
            Ok(None) => Delivery::Cancelled,
            Err(_) => Delivery::Lost,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    closed: bool,
    slots: HashMap<u16, Sender<Option<Message>>>,
}

/// Table of open slots keyed by legacy tag.
#[derive(Debug, Default)]
pub(crate) struct Rendezvous {
    inner: Mutex<Inner>,
}

impl Rendezvous {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a slot for `tag`. After [`Rendezvous::close`] the slot is
    /// returned already disconnected.
    pub(crate) fn register(&self, tag: u16) -> Slot {
        let (tx, rx) = bounded(0);
        let mut inner = self.lock();
        if !inner.closed && inner.slots.insert(tag, tx).is_some() {
            warn!("tag {tag} already had a waiting transaction; it is now disconnected");
        }
        Slot { rx }
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self, tag: u16) -> bool {
        self.lock().slots.contains_key(&tag)
    }

    /// Hand `message` to the operation waiting on `tag`, blocking until it is
    /// taken. Returns the message back when nobody waits for it.
    pub(crate) fn deliver(&self, tag: u16, message: Message) -> Result<(), Message> {
        let Some(tx) = self.lock().slots.remove(&tag) else {
            return Err(message);
        };
        tx.send(Some(message))
            .map_err(|err| err.into_inner().unwrap_or_default())
    }

    /// Wake the operation waiting on `tag` without a reply. Returns false if
    /// no slot was open.
    pub(crate) fn cancel(&self, tag: u16) -> bool {
        let Some(tx) = self.lock().slots.remove(&tag) else {
            return false;
        };
        tx.send(None).is_ok()
    }

    /// Disconnect every open slot and refuse new ones.
    pub(crate) fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.slots.clear();
    }
}
