//! The per-agent RPC instance.
//!
//! An [`Rpc`] owns one side of a channel, the handler registry, the pending
//! message queue, and the reply-id counter. It is `!Send`: it lives on its
//! agent's thread and must be created inside a tokio `LocalSet`, where its
//! listener and handler tasks run.
//!
//! # Deadlock hazard
//!
//! A blocking call parks the calling thread until the peer answers. If the
//! peer's handler in turn makes a blocking call back to the parked agent,
//! both threads wait on each other forever. There is no detection and no
//! timeout; avoiding that cycle is the caller's responsibility.

mod async_call;
mod dispatch;
mod sync_call;

pub use async_call::{Invocation, PendingReply};

use crate::channel::{Inbox, MessagePort, Transport};
use crate::config::reply_endpoint_name;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::handler::{Handler, HandlerTarget, Request};
use crate::message::{Envelope, Message, Transferable};
use crate::registry::{HandlerRegistry, Registration};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct RpcInner {
    name: String,
    transport: Box<dyn Transport>,
    next_ret_id: Cell<u64>,
    registry: RefCell<HandlerRegistry>,
    listener: RefCell<Option<JoinHandle<()>>>,
}

impl Drop for RpcInner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

/// Handle to an RPC instance. Clones share the same instance.
#[derive(Clone)]
pub struct Rpc {
    inner: Rc<RpcInner>,
}

impl fmt::Debug for Rpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rpc")
            .field("name", &self.inner.name)
            .field("next_ret_id", &self.inner.next_ret_id.get())
            .finish()
    }
}

impl Rpc {
    /// Bind an instance named `name` to one side of a channel.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio `LocalSet`.
    pub fn new(port: MessagePort, name: impl Into<String>) -> Self {
        let (sender, inbox) = port.into_parts();
        Self::with_transport(sender, inbox, name)
    }

    /// Bind an instance to a custom send half and an inbox.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio `LocalSet`.
    pub fn with_transport(transport: impl Transport, inbox: Inbox, name: impl Into<String>) -> Self {
        let rpc = Self {
            inner: Rc::new(RpcInner {
                name: name.into(),
                transport: Box::new(transport),
                next_ret_id: Cell::new(0),
                registry: RefCell::new(HandlerRegistry::default()),
                listener: RefCell::new(None),
            }),
        };

        let listener = tokio::task::spawn_local(Self::listen(Rc::downgrade(&rpc.inner), inbox));
        *rpc.inner.listener.borrow_mut() = Some(listener);
        rpc
    }

    async fn listen(inner: Weak<RpcInner>, mut inbox: Inbox) {
        while let Some(envelope) = inbox.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            Rpc { inner }.dispatch(envelope);
        }
        debug!("RPC listener stopped");
    }

    /// Instance name; part of every reply endpoint name it mints.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn next_ret_id(&self) -> String {
        let id = self.inner.next_ret_id.get();
        self.inner.next_ret_id.set(id + 1);
        reply_endpoint_name(&self.inner.name, id)
    }

    pub(crate) fn post(&self, message: Message, transfer: Vec<Transferable>) -> Result<()> {
        debug!(
            "[rpc] {} posting {} ({} transferables)",
            self.inner.name,
            message.name(),
            transfer.len()
        );
        self.inner.transport.post(Envelope::new(message, transfer))
    }

    // ========================================
    // Handler registration
    // ========================================

    /// Register `handler` for `endpoint`, replacing any previous handler.
    ///
    /// Messages buffered for this name are replayed through the dispatcher,
    /// in arrival order, before this returns.
    pub fn register_handler(&self, endpoint: &Endpoint, handler: Handler) {
        self.register(endpoint.name(), Registration::Handler(handler));
    }

    pub(crate) fn register(&self, name: &str, registration: Registration) {
        let replay = self.inner.registry.borrow_mut().register(name, registration);
        if let Some(replay) = replay {
            debug!(
                "[rpc] {} replaying {} buffered message(s) for {}",
                self.inner.name,
                replay.len(),
                name
            );
            for envelope in replay {
                self.dispatch(envelope);
            }
        }
    }

    /// Register a handler that looks up `target[property]` on every call.
    ///
    /// Swapping the slot's handler changes behavior without re-registering.
    /// An empty slot answers `null`.
    pub fn register_handler_ref(&self, endpoint: &Endpoint, target: &HandlerTarget, property: &str) {
        let target = target.clone();
        let property = property.to_string();
        self.register_handler(
            endpoint,
            Handler::new(move |request: Request| {
                let slot = target.get(&property);
                async move {
                    match slot {
                        Some(handler) => handler.call(request).await,
                        None => Ok(Value::Null.into()),
                    }
                }
            }),
        );
    }

    /// Like [`Rpc::register_handler_ref`], deferred until the slot is first set.
    ///
    /// If `target[property]` is already set this registers immediately.
    /// Otherwise the endpoint stays unregistered (its messages buffer) until
    /// a handler is assigned to the slot.
    pub fn register_handler_lazy(&self, endpoint: &Endpoint, target: &HandlerTarget, property: &str) {
        if target.contains(property) {
            self.register_handler_ref(endpoint, target, property);
            return;
        }

        let rpc = Rc::downgrade(&self.inner);
        let weak_target = target.downgrade();
        let endpoint = endpoint.clone();
        let bound_property = property.to_string();
        target.intercept(
            property,
            Rc::new(move || {
                let (Some(inner), Some(target)) = (rpc.upgrade(), weak_target.upgrade()) else {
                    return;
                };
                Rpc { inner }.register_handler_ref(&endpoint, &target, &bound_property);
            }),
        );
    }

    /// Drop the handler for `endpoint`. Later messages buffer again.
    pub fn remove_handler(&self, endpoint: &Endpoint) {
        if !self.inner.registry.borrow_mut().remove(endpoint.name()) {
            warn!(
                "[rpc] {} removing unregistered handler {}",
                self.inner.name,
                endpoint.name()
            );
        }
    }

    pub fn has_handler(&self, endpoint: &Endpoint) -> bool {
        self.inner.registry.borrow().contains(endpoint.name())
    }

    /// Messages waiting for a handler for `endpoint`.
    pub fn pending_messages(&self, endpoint: &Endpoint) -> usize {
        self.inner.registry.borrow().pending_len(endpoint.name())
    }

    /// Messages waiting for any handler.
    pub fn pending_total(&self) -> usize {
        self.inner.registry.borrow().pending_total()
    }

    // ========================================
    // Calls
    // ========================================

    /// Low-level call entry point; prefer [`Rpc::create_call`].
    ///
    /// - Blocking endpoints park this thread until the peer answers and return
    ///   [`Invocation::Completed`].
    /// - Async endpoints with a return value yield [`Invocation::Pending`].
    /// - Fire-and-forget endpoints yield [`Invocation::Posted`].
    pub fn invoke(
        &self,
        endpoint: &Endpoint,
        args: Vec<Value>,
        transfer: Vec<Transferable>,
    ) -> Result<Invocation> {
        if endpoint.is_sync() {
            self.invoke_sync(endpoint, args, transfer)
                .map(Invocation::Completed)
        } else {
            self.invoke_async(endpoint, args, transfer)
        }
    }

    /// Turn an endpoint into a callable.
    pub fn create_call(&self, endpoint: &Endpoint) -> impl Fn(Vec<Value>) -> Result<Invocation> {
        let rpc = self.clone();
        let endpoint = endpoint.clone();
        move |args| rpc.invoke(&endpoint, args, Vec::new())
    }

    /// Callback-style adapter over an async endpoint.
    ///
    /// The returned function posts the call and later hands the resolved
    /// value to `callback`. Failures never reach the callback; they are logged.
    pub fn create_callbackify<C>(&self, endpoint: &Endpoint) -> impl Fn(Vec<Value>, C)
    where
        C: FnOnce(Value) + 'static,
    {
        let call = self.create_call(endpoint);
        let name = endpoint.name().to_string();
        move |args, callback| {
            let pending = match call(args).and_then(Invocation::into_pending) {
                Ok(pending) => pending,
                Err(e) => {
                    warn!("[rpc] callback call {} failed: {}", name, e);
                    return;
                }
            };
            let name = name.clone();
            tokio::task::spawn_local(async move {
                match pending.await {
                    Ok(reply) => callback(reply.into_value()),
                    Err(e) => warn!("[rpc] callback call {} failed: {}", name, e),
                }
            });
        }
    }
}
