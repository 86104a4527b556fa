use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};

use crate::codec::{WireError, decode, encode};
use crate::message::{FromHeadset, ToHeadset};

/// Builds the reliable, ordered duplex link between the two processes.
///
/// Messages cross as encoded byte frames, so the wire codec is exercised on
/// every send even though both endpoints live in one process.
pub fn channel_pair() -> (OperatorEndpoint, HeadsetEndpoint) {
    let (to_headset_tx, to_headset_rx) = channel();
    let (from_headset_tx, from_headset_rx) = channel();
    (
        OperatorEndpoint {
            tx: to_headset_tx,
            rx: from_headset_rx,
        },
        HeadsetEndpoint {
            tx: from_headset_tx,
            rx: to_headset_rx,
        },
    )
}

pub struct OperatorEndpoint {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl OperatorEndpoint {
    pub fn send(&self, command: &ToHeadset) -> Result<(), WireError> {
        let bytes = encode(command)?;
        self.tx.send(bytes).map_err(|_| WireError::Disconnected)
    }

    /// Next pending report, or `None` when the queue is drained.
    pub fn try_recv(&self) -> Result<Option<FromHeadset>, WireError> {
        recv_frame(&self.rx)
    }
}

pub struct HeadsetEndpoint {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl HeadsetEndpoint {
    pub fn send(&self, report: &FromHeadset) -> Result<(), WireError> {
        let bytes = encode(report)?;
        self.tx.send(bytes).map_err(|_| WireError::Disconnected)
    }

    pub fn try_recv(&self) -> Result<Option<ToHeadset>, WireError> {
        recv_frame(&self.rx)
    }
}

fn recv_frame<T: serde::de::DeserializeOwned>(
    rx: &Receiver<Vec<u8>>,
) -> Result<Option<T>, WireError> {
    match rx.try_recv() {
        Ok(bytes) => Ok(Some(decode(&bytes)?)),
        Err(TryRecvError::Empty) => Ok(None),
        Err(TryRecvError::Disconnected) => Err(WireError::Disconnected),
    }
}
