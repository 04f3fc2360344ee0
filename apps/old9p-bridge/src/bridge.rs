// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Hold shared gateway state and run legacy request/reply transactions.
// Author: Lukas Bower

use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;
use ninep1_codec::{self as legacy, MessageType};

use crate::config::BridgeConfig;
use crate::handles::HandleTable;
use crate::rendezvous::{Delivery, Rendezvous, Slot};
use crate::supervisor::Reporter;
use crate::tags::{Tag, TagRegistry};
use crate::BridgeError;

/// Outcome of a translator operation that did not produce a reply.
#[derive(Debug)]
pub(crate) enum OpError {
    /// Answer the client with this error text.
    Rejected(String),
    /// The request was flushed; no reply is written.
    Cancelled,
    /// The gateway cannot continue.
    Fatal(BridgeError),
}

impl OpError {
    pub(crate) fn rejected(ename: impl Into<String>) -> Self {
        Self::Rejected(ename.into())
    }
}

impl From<BridgeError> for OpError {
    fn from(err: BridgeError) -> Self {
        Self::Fatal(err)
    }
}

impl From<legacy::CodecError> for OpError {
    fn from(err: legacy::CodecError) -> Self {
        Self::Fatal(err.into())
    }
}

/// State shared by every thread serving one connection.
pub(crate) struct Bridge {
    pub(crate) config: BridgeConfig,
    pub(crate) tags: TagRegistry,
    pub(crate) handles: HandleTable,
    pub(crate) rendezvous: Rendezvous,
    legacy: Mutex<Box<dyn Write + Send>>,
    reporter: Reporter,
}

impl Bridge {
    pub(crate) fn new(
        config: BridgeConfig,
        legacy: Box<dyn Write + Send>,
        reporter: Reporter,
    ) -> Self {
        Self {
            config,
            tags: TagRegistry::new(),
            handles: HandleTable::new(),
            rendezvous: Rendezvous::new(),
            legacy: Mutex::new(legacy),
            reporter,
        }
    }

    fn legacy(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.legacy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn report(&self, err: BridgeError) {
        self.reporter.report(err);
    }

    /// Wake every waiting operation with a lost hand-off.
    pub(crate) fn shutdown(&self) {
        self.rendezvous.close();
    }

    /// Send one legacy request on behalf of `tag` and wait for its reply.
    ///
    /// A legacy `Rerror` becomes [`OpError::Rejected`] with the legacy text.
    /// Fails with [`OpError::Cancelled`] without sending when `tag` has been
    /// flushed.
    pub(crate) fn transact(
        &self,
        tag: Tag,
        body: legacy::RequestBody,
    ) -> Result<legacy::ResponseBody, OpError> {
        self.exchange(tag, body, false)
    }

    /// Like [`Bridge::transact`], but sends even after a flush. Used to
    /// release legacy fids that would otherwise leak.
    pub(crate) fn transact_forced(
        &self,
        tag: Tag,
        body: legacy::RequestBody,
    ) -> Result<legacy::ResponseBody, OpError> {
        self.exchange(tag, body, true)
    }

    /// Send the legacy `Tflush` for `target` on behalf of the flush `tag`.
    ///
    /// The flush is armed against `target`'s outstanding transaction under
    /// the writer lock, so it covers exactly the transactions written before
    /// it. Nothing is sent when no cancellable transaction is outstanding.
    pub(crate) fn transact_flush(&self, tag: Tag, target: Tag) -> Result<(), OpError> {
        let body = legacy::RequestBody::Flush {
            oldtag: target.id(),
        };
        let slot = {
            let mut writer = self.legacy();
            if !self.tags.begin_transaction(tag, false) {
                debug!("tag {} flushed before Tflush", tag.id());
                return Err(OpError::Cancelled);
            }
            if !self.tags.arm_flush(target) {
                debug!("tag {} has nothing outstanding to flush", target.id());
                return Ok(());
            }
            self.send(&mut writer, tag, body)?
        };
        self.receive(tag, slot, MessageType::Rflush).map(|_| ())
    }

    fn exchange(
        &self,
        tag: Tag,
        body: legacy::RequestBody,
        force: bool,
    ) -> Result<legacy::ResponseBody, OpError> {
        let ty = body.message_type();
        let expected = ty.reply().ok_or(BridgeError::LegacyCodec(
            legacy::CodecError::Unsupported(ty as u8),
        ))?;
        let slot = {
            let mut writer = self.legacy();
            // Checked under the writer lock so a flush either sees this
            // transaction's slot or stops it from being sent.
            if !self.tags.begin_transaction(tag, force) {
                debug!("tag {} flushed before {:?}", tag.id(), ty);
                return Err(OpError::Cancelled);
            }
            self.send(&mut writer, tag, body)?
        };
        self.receive(tag, slot, expected)
    }

    /// Register the reply slot for `tag` and write the request. The caller
    /// holds the writer lock.
    fn send(
        &self,
        writer: &mut Box<dyn Write + Send>,
        tag: Tag,
        body: legacy::RequestBody,
    ) -> Result<Slot, OpError> {
        let request = legacy::Request { tag: tag.id(), body };
        let frame = legacy::encode_request(&request)?;
        let slot = self.rendezvous.register(tag.id());
        debug!("=> {request:?}");
        writer
            .write_all(&frame)
            .and_then(|()| writer.flush())
            .map_err(BridgeError::Io)?;
        Ok(slot)
    }

    fn receive(
        &self,
        tag: Tag,
        slot: Slot,
        expected: MessageType,
    ) -> Result<legacy::ResponseBody, OpError> {
        match slot.wait() {
            Delivery::Reply(bytes) => {
                let response = legacy::decode_response(&bytes)?;
                match response.body {
                    legacy::ResponseBody::Error { ename } => Err(OpError::Rejected(ename)),
                    body if body.message_type() == expected => Ok(body),
                    body => Err(unexpected(expected, &body)),
                }
            }
            Delivery::Cancelled => {
                debug!("tag {} woken by flush", tag.id());
                Err(OpError::Cancelled)
            }
            Delivery::Lost => Err(BridgeError::HandoffLost(tag.id()).into()),
        }
    }
}

/// Fatal error for a legacy reply of the wrong type.
pub(crate) fn unexpected(expected: MessageType, got: &legacy::ResponseBody) -> OpError {
    OpError::Fatal(BridgeError::UnexpectedReply {
        expected,
        got: got.message_type(),
    })
}
