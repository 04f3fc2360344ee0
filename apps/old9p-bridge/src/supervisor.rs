// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Collect fatal faults from gateway threads and decide how serving ends.
// Author: Lukas Bower

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, info};

use crate::BridgeError;

/// Fault boundary for one served connection.
#[derive(Debug)]
pub(crate) struct Supervisor {
    tx: Sender<BridgeError>,
    rx: Receiver<BridgeError>,
}

/// Cloneable handle used by gateway threads to report faults.
#[derive(Debug, Clone)]
pub(crate) struct Reporter {
    tx: Sender<BridgeError>,
}

impl Reporter {
    /// Report a condition that ends the gateway.
    pub(crate) fn report(&self, err: BridgeError) {
        match &err {
            BridgeError::Hangup => info!("client hung up"),
            other => error!("fatal: {other}"),
        }
        // The supervisor may already have stopped listening.
        let _ = self.tx.send(err);
    }
}

impl Supervisor {
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub(crate) fn reporter(&self) -> Reporter {
        Reporter {
            tx: self.tx.clone(),
        }
    }

    /// Block until the first report; a client hang-up is a clean end.
    pub(crate) fn wait(&self) -> Result<(), BridgeError> {
        match self.rx.recv() {
            Ok(BridgeError::Hangup) | Err(_) => Ok(()),
            Ok(err) => Err(err),
        }
    }
}
