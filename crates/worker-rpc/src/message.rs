//! Messages exchanged between agents.
//!
//! A [`Message`] is a closed sum of the two call kinds. It travels inside an
//! [`Envelope`] together with any [`Transferable`] resources whose ownership
//! moves to the receiving agent.

use crate::shared::{LockCell, LockState, SharedBuffer};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An owned resource moved alongside a message.
///
/// Ownership leaves the sender entirely; the receiver recovers the concrete
/// type with [`Transferable::downcast`].
pub struct Transferable(Box<dyn Any + Send>);

impl Transferable {
    pub fn new<T: Any + Send>(resource: T) -> Self {
        Self(Box::new(resource))
    }

    /// Take the resource back out as `T`, or return it untouched.
    pub fn downcast<T: Any>(self) -> std::result::Result<T, Self> {
        match self.0.downcast::<T>() {
            Ok(resource) => Ok(*resource),
            Err(other) => Err(Self(other)),
        }
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for Transferable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transferable(..)")
    }
}

/// Non-blocking call, or the reply to one.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncMessage {
    pub name: String,
    pub args: Vec<Value>,
    /// Reply endpoint the sender listens on, if it expects an answer.
    pub ret_id: Option<String>,
    /// Whether the reply should carry the handler's transfer list.
    pub has_transfer: bool,
}

/// Blocking call.
///
/// Dropping an unanswered `SyncMessage` completes its lock cell in the error
/// state, so a caller never waits on a message nobody will process.
#[derive(Debug)]
pub struct SyncMessage {
    pub name: String,
    pub args: Vec<Value>,
    pub lock: Arc<LockCell>,
    pub buf: Option<Arc<SharedBuffer>>,
}

impl Drop for SyncMessage {
    fn drop(&mut self) {
        if self.lock.complete(LockState::Error) {
            tracing::warn!("Sync call {} dropped before completion", self.name);
        }
    }
}

/// Tagged union of the two call kinds.
#[derive(Debug)]
pub enum Message {
    Async(AsyncMessage),
    Sync(SyncMessage),
}

impl Message {
    /// Endpoint name the message is routed by.
    pub fn name(&self) -> &str {
        match self {
            Message::Async(message) => &message.name,
            Message::Sync(message) => &message.name,
        }
    }

    pub fn is_sync(&self) -> bool {
        matches!(self, Message::Sync(_))
    }
}

/// What actually crosses the channel.
#[derive(Debug)]
pub struct Envelope {
    pub message: Message,
    pub transfer: Vec<Transferable>,
}

impl Envelope {
    pub fn new(message: Message, transfer: Vec<Transferable>) -> Self {
        Self { message, transfer }
    }
}
