//! Inbound message dispatch.
//!
//! Every envelope received on the channel lands here. The handler closure is
//! invoked synchronously, so per-name arrival order is invocation order; its
//! future is then settled on a local task and the outcome is pushed back
//! through the call's reply path.
//!
//! A handler that panics, in either part, is treated like one that returned
//! an error: the caller sees a failed call and the listener keeps running.

use super::Rpc;
use crate::endpoint::Endpoint;
use crate::handler::{Handler, HandlerFuture, Reply, Request};
use crate::message::{AsyncMessage, Envelope, Message, SyncMessage};
use crate::registry::{ReplyOutcome, ReplySender, Route};
use crate::shared::LockState;
use futures::future::{self, FutureExt};
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, warn};

/// Invoke `handler`, turning a panic in its synchronous or asynchronous part
/// into an error outcome.
fn call_contained(handler: &Handler, request: Request) -> HandlerFuture {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.call(request))) {
        Ok(outcome) => AssertUnwindSafe(outcome)
            .catch_unwind()
            .map(|caught| caught.unwrap_or_else(|payload| Err(panic_fault(payload))))
            .boxed_local(),
        Err(payload) => future::ready(Err(panic_fault(payload))).boxed_local(),
    }
}

fn panic_fault(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow::anyhow!("handler panicked: {}", message)
}

impl Rpc {
    pub(crate) fn dispatch(&self, envelope: Envelope) {
        debug!(
            "[rpc] on {} received {}",
            self.inner.name,
            envelope.message.name()
        );

        let route = self.inner.registry.borrow_mut().route(envelope);
        match route {
            Route::Handler(handler, envelope) => self.run_handler(handler, envelope),
            Route::Reply(tx, envelope) => Self::deliver_reply(tx, envelope),
            Route::Buffered(depth) => {
                warn!(
                    "[rpc] on {} buffered message, no handler yet ({} waiting for that name)",
                    self.inner.name, depth
                );
            }
        }
    }

    fn run_handler(&self, handler: Handler, envelope: Envelope) {
        let Envelope { message, transfer } = envelope;
        match message {
            Message::Sync(mut message) => {
                let args = std::mem::take(&mut message.args);
                let outcome = call_contained(&handler, Request { args, transfer });
                tokio::task::spawn_local(async move {
                    let outcome = outcome.await;
                    Self::settle_sync(message, outcome);
                });
            }
            Message::Async(message) => {
                let AsyncMessage {
                    name,
                    args,
                    ret_id,
                    has_transfer,
                } = message;
                let outcome = call_contained(&handler, Request { args, transfer });
                let rpc = self.clone();
                tokio::task::spawn_local(async move {
                    let outcome = outcome.await;
                    rpc.settle_async(&name, ret_id, has_transfer, outcome);
                });
            }
        }
    }

    /// Write the result into the shared buffer and release the blocked caller.
    fn settle_sync(message: SyncMessage, outcome: anyhow::Result<Reply>) {
        let state = match outcome {
            Ok(reply) => match &message.buf {
                Some(buf) => match buf.write_result(&message.name, &reply.data) {
                    Ok(_) => LockState::Success,
                    Err(e) => {
                        error!("[rpc] sync handler {} result rejected: {}", message.name, e);
                        LockState::Error
                    }
                },
                None => LockState::Success,
            },
            Err(e) => {
                error!("[rpc] sync handler {} failed: {:#}", message.name, e);
                LockState::Error
            }
        };
        message.lock.complete(state);
    }

    /// Send the reply message for an async call, if one is expected.
    fn settle_async(
        &self,
        name: &str,
        ret_id: Option<String>,
        has_transfer: bool,
        outcome: anyhow::Result<Reply>,
    ) {
        let Some(ret_id) = ret_id else {
            if let Err(e) = outcome {
                error!("[rpc] handler {} failed: {:#}", name, e);
            }
            return;
        };

        let (args, transfer) = match outcome {
            Ok(reply) => {
                let Reply { data, transfer } = reply;
                let transfer = if has_transfer {
                    transfer
                } else {
                    if !transfer.is_empty() {
                        warn!(
                            "[rpc] handler {} returned transferables for an endpoint without return transfer; dropping them",
                            name
                        );
                    }
                    Vec::new()
                };
                (vec![data, Value::Bool(false)], transfer)
            }
            Err(e) => {
                error!("[rpc] handler {} failed: {:#}", name, e);
                (vec![Value::Null, Value::Bool(true)], Vec::new())
            }
        };

        let reply_endpoint = Endpoint::reply(ret_id);
        if let Err(e) = self.invoke(&reply_endpoint, args, transfer) {
            error!("[rpc] reply for {} not delivered: {}", name, e);
        }
    }

    /// Resolve the future of an async call from its reply message.
    fn deliver_reply(tx: ReplySender, envelope: Envelope) {
        let Envelope { message, transfer } = envelope;
        let outcome = match message {
            Message::Async(message) => {
                let mut args = message.args.into_iter();
                let data = args.next().unwrap_or(Value::Null);
                let is_error = args.next().is_some_and(|flag| flag.as_bool().unwrap_or(false));
                if is_error {
                    ReplyOutcome::Rejected
                } else {
                    ReplyOutcome::Resolved(Reply::with_transfer(data, transfer))
                }
            }
            Message::Sync(message) => {
                warn!("[rpc] blocking call routed to reply endpoint {}", message.name);
                ReplyOutcome::Rejected
            }
        };
        // The receiver is gone if the caller dropped its PendingReply.
        let _ = tx.send(outcome);
    }
}
