// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Read 9P2000 requests, run them on worker threads and write responses.
// Author: Lukas Bower

//! Client-facing server loop.
//!
//! Workers share the client reader. Whenever the worker that just read a
//! request sees no other worker waiting to read, it starts one before
//! handling its request, so a blocked operation never stalls the connection.

use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use log::{debug, warn};
use ninep_codec::{
    decode_request, encode_response, frame_tag, read_frame, write_frame, CodecError, Response,
    ResponseBody,
};

use crate::bridge::{Bridge, OpError};
use crate::tags::Tag;
use crate::BridgeError;

struct Connection {
    bridge: Arc<Bridge>,
    reader: Mutex<Box<dyn Read + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    waiting: AtomicUsize,
}

/// Start serving the client connection.
pub(crate) fn spawn(
    bridge: Arc<Bridge>,
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
) -> io::Result<()> {
    let conn = Arc::new(Connection {
        bridge,
        reader: Mutex::new(reader),
        writer: Mutex::new(writer),
        waiting: AtomicUsize::new(0),
    });
    spawn_worker(conn)
}

fn spawn_worker(conn: Arc<Connection>) -> io::Result<()> {
    conn.waiting.fetch_add(1, Ordering::AcqRel);
    let worker = Arc::clone(&conn);
    let spawned = thread::Builder::new()
        .name("old9p-worker".to_owned())
        .spawn(move || worker.work());
    if spawned.is_err() {
        conn.waiting.fetch_sub(1, Ordering::AcqRel);
    }
    spawned.map(|_| ())
}

fn lock<T: ?Sized>(mutex: &Mutex<Box<T>>) -> MutexGuard<'_, Box<T>> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Connection {
    fn work(self: Arc<Self>) {
        loop {
            // Requests enter the tag registry in wire order, so a flush read
            // right after its target always finds it.
            let (frame, tag) = {
                let mut reader = lock(&self.reader);
                let frame = read_frame(&mut *reader, self.bridge.config.msize);
                let tag = match &frame {
                    Ok(Some(bytes)) => frame_tag(bytes).and_then(|id| self.bridge.tags.admit(id)),
                    _ => None,
                };
                (frame, tag)
            };
            let idle = self.waiting.fetch_sub(1, Ordering::AcqRel) - 1;
            let bytes = match frame {
                Ok(Some(bytes)) => bytes,
                Ok(None) => return self.bridge.report(BridgeError::Hangup),
                Err(err) => return self.bridge.report(read_failure(err)),
            };
            if idle == 0 {
                if let Err(err) = spawn_worker(Arc::clone(&self)) {
                    return self.bridge.report(err.into());
                }
            }
            if let Err(err) = self.handle(&bytes, tag) {
                return self.bridge.report(err);
            }
            if self.waiting.load(Ordering::Acquire) > 0 {
                return;
            }
            self.waiting.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn handle(&self, bytes: &[u8], tag: Option<Tag>) -> Result<(), BridgeError> {
        let outcome = self.serve(bytes, tag);
        // Settled before the reply is visible, so a client reusing the tag
        // as soon as it reads the reply is admitted. A flush waiting on the
        // tag still writes its Rflush after this reply.
        let written = {
            let mut writer = lock(&self.writer);
            if let Some(tag) = tag {
                self.bridge.tags.settle(tag);
            }
            match outcome {
                Ok(Some(response)) => respond(&mut **writer, &response),
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            }
        };
        if let Some(tag) = tag {
            self.bridge.tags.release(tag);
        }
        written
    }

    fn serve(&self, bytes: &[u8], tag: Option<Tag>) -> Result<Option<Response>, BridgeError> {
        let request = match decode_request(bytes) {
            Ok(request) => request,
            Err(CodecError::Unsupported(ty)) => {
                warn!("unsupported message type {ty}");
                return Ok(frame_tag(bytes).map(|tag| Response {
                    tag,
                    body: ResponseBody::error("bad fcall type"),
                }));
            }
            Err(err) => {
                warn!("dropping malformed request: {err}");
                return Ok(None);
            }
        };
        debug!("<- {request:?}");

        // A decoded frame always carries a tag; no entry means the tag is
        // still in use by an unanswered request.
        let Some(tag) = tag else {
            warn!("tag {} already in use", request.tag);
            return Ok(Some(Response {
                tag: request.tag,
                body: ResponseBody::error("tag in use"),
            }));
        };
        let body = match self.bridge.dispatch(tag, request.body) {
            Ok(body) => body,
            Err(OpError::Rejected(ename)) => ResponseBody::Error { ename },
            Err(OpError::Cancelled) => {
                debug!("suppressing reply for flushed tag {}", request.tag);
                return Ok(None);
            }
            Err(OpError::Fatal(err)) => return Err(err),
        };
        Ok(Some(Response {
            tag: request.tag,
            body,
        }))
    }
}

fn respond(mut writer: &mut (dyn Write + Send), response: &Response) -> Result<(), BridgeError> {
    let frame = encode_response(response)?;
    debug!("-> {response:?}");
    write_frame(&mut writer, &frame)?;
    Ok(())
}

// Oversize and undersize frames surface as `InvalidData` wrapping the codec
// error; keep the codec error when it is there.
fn read_failure(err: io::Error) -> BridgeError {
    let is_codec = err
        .get_ref()
        .is_some_and(|inner| inner.is::<CodecError>());
    if err.kind() == ErrorKind::InvalidData && is_codec {
        if let Some(Ok(codec)) = err.into_inner().map(|inner| inner.downcast::<CodecError>()) {
            return BridgeError::Codec(*codec);
        }
        return BridgeError::Io(io::Error::from(ErrorKind::InvalidData));
    }
    BridgeError::Io(err)
}
