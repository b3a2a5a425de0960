//! Per-endpoint buffer for messages that arrive before their handler.

use crate::message::Envelope;
use std::collections::{HashMap, VecDeque};

/// FIFO queues of undeliverable messages, keyed by endpoint name.
///
/// A queue exists only while it holds messages: draining a name removes it.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    queues: HashMap<String, VecDeque<Envelope>>,
}

impl PendingQueue {
    /// Buffer an envelope behind earlier arrivals for the same name.
    ///
    /// Returns the queue depth for that name after the push.
    pub(crate) fn push(&mut self, envelope: Envelope) -> usize {
        let queue = self
            .queues
            .entry(envelope.message.name().to_string())
            .or_default();
        queue.push_back(envelope);
        queue.len()
    }

    /// Remove and return everything buffered for `name`, oldest first.
    pub(crate) fn take(&mut self, name: &str) -> Option<VecDeque<Envelope>> {
        self.queues.remove(name)
    }

    pub(crate) fn len(&self, name: &str) -> usize {
        self.queues.get(name).map_or(0, VecDeque::len)
    }

    pub(crate) fn total(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }
}
