//! Handler registry: endpoint name to local implementation.
//!
//! Two kinds of entries share the namespace. Ordinary handlers stay until
//! replaced or removed. Reply slots belong to one in-flight async call and
//! are consumed by the first message routed to them.

use crate::handler::{Handler, Reply};
use crate::message::Envelope;
use crate::pending::PendingQueue;
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;

/// How an async call ended, as seen by its reply slot.
#[derive(Debug)]
pub(crate) enum ReplyOutcome {
    Resolved(Reply),
    Rejected,
}

pub(crate) type ReplySender = oneshot::Sender<ReplyOutcome>;

/// A registry entry.
pub(crate) enum Registration {
    Handler(Handler),
    Reply(ReplySender),
}

/// Where the dispatcher should send an incoming envelope.
pub(crate) enum Route {
    Handler(Handler, Envelope),
    Reply(ReplySender, Envelope),
    /// No handler: the envelope now sits in the pending queue at this depth.
    Buffered(usize),
}

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    entries: HashMap<String, Registration>,
    pending: PendingQueue,
}

impl HandlerRegistry {
    /// Install `registration` under `name`, replacing any previous entry.
    ///
    /// Returns the messages buffered for `name`, which the caller must replay
    /// in order before handling anything else.
    pub(crate) fn register(
        &mut self,
        name: &str,
        registration: Registration,
    ) -> Option<VecDeque<Envelope>> {
        self.entries.insert(name.to_string(), registration);
        self.pending.take(name)
    }

    pub(crate) fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Resolve the target of an incoming envelope.
    ///
    /// Reply slots are removed as they are routed to.
    pub(crate) fn route(&mut self, envelope: Envelope) -> Route {
        let name = envelope.message.name().to_string();
        match self.entries.get(&name) {
            Some(Registration::Handler(handler)) => Route::Handler(handler.clone(), envelope),
            Some(Registration::Reply(_)) => match self.entries.remove(&name) {
                Some(Registration::Reply(tx)) => Route::Reply(tx, envelope),
                _ => unreachable!("entry checked above"),
            },
            None => Route::Buffered(self.pending.push(envelope)),
        }
    }

    pub(crate) fn pending_len(&self, name: &str) -> usize {
        self.pending.len(name)
    }

    pub(crate) fn pending_total(&self) -> usize {
        self.pending.total()
    }
}
