//! Non-blocking calls correlated through per-call reply endpoints.

use super::Rpc;
use crate::endpoint::Endpoint;
use crate::error::{Result, RpcError};
use crate::handler::Reply;
use crate::message::{AsyncMessage, Message, Transferable};
use crate::registry::{Registration, ReplyOutcome};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// What a call produced on the calling side.
#[derive(Debug)]
pub enum Invocation {
    /// A blocking call finished; carries the value if the endpoint returns one.
    Completed(Option<Value>),
    /// An async call is in flight.
    Pending(PendingReply),
    /// A fire-and-forget call was posted.
    Posted,
}

impl Invocation {
    pub fn is_pending(&self) -> bool {
        matches!(self, Invocation::Pending(_))
    }

    /// The in-flight reply, or [`RpcError::NotPending`].
    pub fn into_pending(self) -> Result<PendingReply> {
        match self {
            Invocation::Pending(pending) => Ok(pending),
            Invocation::Completed(_) => Err(RpcError::NotPending { kind: "completed" }),
            Invocation::Posted => Err(RpcError::NotPending { kind: "posted" }),
        }
    }

    /// The value of a completed blocking call.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Invocation::Completed(value) => value,
            Invocation::Pending(_) | Invocation::Posted => None,
        }
    }
}

/// Future of an async call's reply.
///
/// Resolves exactly once: to the handler's [`Reply`], to
/// [`RpcError::CallFailed`] if the handler faulted, or to
/// [`RpcError::Disconnected`] if the local instance went away first.
/// There is no timeout.
#[derive(Debug)]
pub struct PendingReply {
    endpoint: String,
    ret_id: String,
    rx: oneshot::Receiver<ReplyOutcome>,
}

impl PendingReply {
    /// Name of the ephemeral reply endpoint this call listens on.
    pub fn ret_id(&self) -> &str {
        &self.ret_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Await the reply and keep only its value.
    pub async fn value(self) -> Result<Value> {
        self.await.map(Reply::into_value)
    }
}

impl Future for PendingReply {
    type Output = Result<Reply>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|outcome| match outcome {
            Ok(ReplyOutcome::Resolved(reply)) => Ok(reply),
            Ok(ReplyOutcome::Rejected) => Err(RpcError::CallFailed {
                endpoint: this.endpoint.clone(),
            }),
            Err(_) => Err(RpcError::Disconnected {
                endpoint: this.endpoint.clone(),
            }),
        })
    }
}

impl Rpc {
    pub(crate) fn invoke_async(
        &self,
        endpoint: &Endpoint,
        args: Vec<Value>,
        transfer: Vec<Transferable>,
    ) -> Result<Invocation> {
        if !endpoint.has_return() {
            self.post(
                Message::Async(AsyncMessage {
                    name: endpoint.name().to_string(),
                    args,
                    ret_id: None,
                    has_transfer: false,
                }),
                transfer,
            )?;
            return Ok(Invocation::Posted);
        }

        let ret_id = self.next_ret_id();
        let (tx, rx) = oneshot::channel();
        self.register(&ret_id, Registration::Reply(tx));

        let posted = self.post(
            Message::Async(AsyncMessage {
                name: endpoint.name().to_string(),
                args,
                ret_id: Some(ret_id.clone()),
                has_transfer: endpoint.has_return_transfer(),
            }),
            transfer,
        );
        if let Err(e) = posted {
            self.inner.registry.borrow_mut().remove(&ret_id);
            return Err(e);
        }

        Ok(Invocation::Pending(PendingReply {
            endpoint: endpoint.name().to_string(),
            ret_id,
            rx,
        }))
    }
}
