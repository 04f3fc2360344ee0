// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Read legacy replies and route each to the request waiting on its tag.
// Author: Lukas Bower

use std::io::{self, ErrorKind, Read};
use std::sync::Arc;
use std::thread;

use log::{debug, warn};
use ninep1_codec::{decode_response, frame_len, MAXFDATA};
use ninep_codec::IOHDRSZ;

use crate::bridge::Bridge;
use crate::config::Framing;
use crate::BridgeError;

const READ_CHUNK: usize = IOHDRSZ as usize + MAXFDATA;

/// Start the demultiplexer thread owning the legacy read side.
pub(crate) fn spawn(bridge: Arc<Bridge>, reader: Box<dyn Read + Send>) -> io::Result<()> {
    let frames = LegacyFrames::new(reader, bridge.config.legacy_framing);
    thread::Builder::new()
        .name("old9p-demux".to_owned())
        .spawn(move || {
            let err = run(&bridge, frames);
            bridge.report(err);
            bridge.shutdown();
        })?;
    Ok(())
}

fn run(bridge: &Bridge, mut frames: LegacyFrames) -> BridgeError {
    loop {
        let bytes = match frames.next_frame() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return BridgeError::LegacyClosed,
            Err(err) => return err,
        };
        let response = match decode_response(&bytes) {
            Ok(response) => response,
            Err(err) => return err.into(),
        };
        debug!("<= {response:?}");
        let tag = response.tag;
        if !bridge.tags.mark_received(tag) {
            debug!("reply for tag {tag} has no request in flight");
        }
        if bridge.rendezvous.deliver(tag, bytes).is_err() {
            warn!("dropping unsolicited legacy reply for tag {tag}");
        }
    }
}

/// Splits the legacy byte stream into whole messages.
pub(crate) struct LegacyFrames {
    reader: Box<dyn Read + Send>,
    framing: Framing,
    buffer: Vec<u8>,
}

impl LegacyFrames {
    pub(crate) fn new(reader: Box<dyn Read + Send>, framing: Framing) -> Self {
        Self {
            reader,
            framing,
            buffer: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Next complete message, or `None` at a clean end of stream.
    pub(crate) fn next_frame(&mut self) -> Result<Option<Vec<u8>>, BridgeError> {
        match self.framing {
            Framing::Stream => self.next_streamed(),
            Framing::PerRead => self.next_read(),
        }
    }

    fn next_streamed(&mut self) -> Result<Option<Vec<u8>>, BridgeError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(len) = frame_len(&self.buffer)? {
                let rest = self.buffer.split_off(len);
                return Ok(Some(std::mem::replace(&mut self.buffer, rest)));
            }
            let n = match self.reader.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::from(ErrorKind::UnexpectedEof).into());
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    fn next_read(&mut self) -> Result<Option<Vec<u8>>, BridgeError> {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    chunk.truncate(n);
                    return Ok(Some(chunk));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
    }
}
