//! Duplex channel between two agents.
//!
//! The substrate only needs a send half ([`Transport`]) and an in-order inbox.
//! [`message_channel`] builds an in-process pair on unbounded tokio queues:
//! delivery is in send order and at most once, and sending never blocks, so a
//! caller about to park on a lock cell can always post first.

use crate::error::{Result, RpcError};
use crate::message::Envelope;
use tokio::sync::mpsc;

/// Receiving half of a port.
pub type Inbox = mpsc::UnboundedReceiver<Envelope>;

/// Send half of a channel.
pub trait Transport: 'static {
    /// Post an envelope to the peer agent.
    fn post(&self, envelope: Envelope) -> Result<()>;
}

/// Sender bound to the peer's inbox.
#[derive(Debug, Clone)]
pub struct PortSender {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Transport for PortSender {
    fn post(&self, envelope: Envelope) -> Result<()> {
        self.tx.send(envelope).map_err(|rejected| RpcError::ChannelClosed {
            endpoint: rejected.0.message.name().to_string(),
        })
    }
}

impl PortSender {
    /// Whether the peer inbox has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One side of a duplex channel.
#[derive(Debug)]
pub struct MessagePort {
    sender: PortSender,
    inbox: Inbox,
}

impl MessagePort {
    pub fn into_parts(self) -> (PortSender, Inbox) {
        (self.sender, self.inbox)
    }

    pub fn sender(&self) -> &PortSender {
        &self.sender
    }
}

/// Create a connected pair of ports.
pub fn message_channel() -> (MessagePort, MessagePort) {
    let (tx_a, rx_a) = mpsc::unbounded_channel();
    let (tx_b, rx_b) = mpsc::unbounded_channel();
    (
        MessagePort {
            sender: PortSender { tx: tx_b },
            inbox: rx_a,
        },
        MessagePort {
            sender: PortSender { tx: tx_a },
            inbox: rx_b,
        },
    )
}
