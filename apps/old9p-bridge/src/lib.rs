// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Bridge 9P2000 clients onto a legacy 9P1 file service.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Protocol gateway serving a legacy 9P1 ("old 9P") file service to
//! 9P2000 clients.
//!
//! One client connection is multiplexed onto one legacy connection. Client
//! requests run concurrently on worker threads; a single demultiplexer
//! thread routes legacy replies back to the request that is waiting on the
//! matching tag. Any transport fault ends the gateway.

use std::io::{self, Read, Write};
use std::sync::Arc;

use log::info;
use thiserror::Error;

pub mod config;

mod bridge;
mod convert;
mod demux;
mod handles;
mod ops;
mod rendezvous;
mod server;
mod supervisor;
mod tags;

pub use config::{BridgeConfig, ConfigError, ConfigOverrides, Framing, MAX_MSIZE, MIN_MSIZE};

use bridge::Bridge;
use supervisor::Supervisor;

/// Conditions that end the gateway.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A 9P2000 message could not be encoded or framed.
    #[error("9P2000 codec error: {0}")]
    Codec(#[from] ninep_codec::CodecError),
    /// A legacy message could not be encoded or decoded.
    #[error("bad conversion talking to old system: {0}")]
    LegacyCodec(#[from] ninep1_codec::CodecError),
    /// Reading from or writing to either connection failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// The legacy service answered with the wrong message type.
    #[error("bad message type; expected {expected:?} got {got:?}")]
    UnexpectedReply {
        /// Reply type implied by the request.
        expected: ninep1_codec::MessageType,
        /// Reply type actually received.
        got: ninep1_codec::MessageType,
    },
    /// A request lost its hand-off slot before a reply arrived.
    #[error("reply for tag {0} was never delivered")]
    HandoffLost(u16),
    /// The legacy service closed its connection.
    #[error("legacy service closed the connection")]
    LegacyClosed,
    /// The client closed its connection.
    #[error("client hung up")]
    Hangup,
}

/// A configured gateway, ready to serve one client connection.
#[derive(Debug, Clone)]
pub struct Gateway {
    config: BridgeConfig,
}

impl Gateway {
    /// Create a gateway using `config`.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Borrow the active configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Serve one client until it hangs up or a fatal fault occurs.
    ///
    /// `client_in`/`client_out` carry 9P2000, `legacy_in`/`legacy_out` carry
    /// 9P1. Returns `Ok(())` when the client closes its connection and the
    /// first fatal error otherwise. Threads still blocked on either
    /// connection exit once their stream is closed.
    pub fn serve<CR, CW, LR, LW>(
        &self,
        client_in: CR,
        client_out: CW,
        legacy_in: LR,
        legacy_out: LW,
    ) -> Result<(), BridgeError>
    where
        CR: Read + Send + 'static,
        CW: Write + Send + 'static,
        LR: Read + Send + 'static,
        LW: Write + Send + 'static,
    {
        let supervisor = Supervisor::new();
        let bridge = Arc::new(Bridge::new(
            self.config.clone(),
            Box::new(legacy_out),
            supervisor.reporter(),
        ));
        info!(
            "serving legacy service (msize {}, framing {:?})",
            self.config.msize, self.config.legacy_framing
        );
        demux::spawn(Arc::clone(&bridge), Box::new(legacy_in))?;
        server::spawn(Arc::clone(&bridge), Box::new(client_in), Box::new(client_out))?;
        let outcome = supervisor.wait();
        bridge.shutdown();
        outcome
    }
}
