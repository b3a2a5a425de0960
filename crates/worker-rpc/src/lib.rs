//! Worker RPC - call across two agents as if calling local functions.
//!
//! Two agents (threads of one process) share a duplex message channel. Each
//! side binds an [`Rpc`] instance to its end, registers [`Handler`]s for the
//! [`Endpoint`]s it serves, and invokes the endpoints the other side serves.
//!
//! - **Blocking calls** post the arguments plus a fresh [`shared::LockCell`]
//!   and optional result buffer, then park the calling thread until the peer
//!   completes the lock.
//! - **Async calls** mint a one-shot reply endpoint (`ret_<name>_<n>`) and
//!   resolve a [`PendingReply`] when the peer posts back to it.
//! - Messages that arrive before their handler is registered are buffered per
//!   endpoint name and replayed, in order, at registration.
//!
//! Remote failures carry no detail across the boundary: a blocking caller
//! gets [`RpcError::CallFailed`], an async caller a rejected future.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use std::sync::mpsc;
//! use worker_rpc::{message_channel, AgentThread, Endpoint, Handler, Invocation, Request};
//!
//! # fn main() -> worker_rpc::Result<()> {
//! let sum = Endpoint::sync("sum", 64);
//! let (main_port, worker_port) = message_channel();
//!
//! let served = sum.clone();
//! let main = AgentThread::spawn("main", main_port, move |rpc| async move {
//!     rpc.register_handler(&served, Handler::from_fn(|req: Request| {
//!         Ok(json!(req.arg::<i64>(0)? + req.arg::<i64>(1)?))
//!     }));
//! })?;
//!
//! let (done_tx, done_rx) = mpsc::channel();
//! let worker = AgentThread::spawn("worker", worker_port, move |rpc| async move {
//!     let total = rpc.invoke(&sum, vec![json!(2), json!(3)], Vec::new());
//!     let _ = done_tx.send(total.map(Invocation::into_value));
//! })?;
//!
//! if let Ok(total) = done_rx.recv() {
//!     assert_eq!(total?, Some(json!(5)));
//! }
//! worker.join()?;
//! main.join()?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod channel;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod message;
pub mod rpc;
pub mod shared;

mod pending;
mod registry;

// Re-export commonly used types
pub use agent::AgentThread;
pub use channel::{message_channel, Inbox, MessagePort, PortSender, Transport};
pub use config::{AgentConfig, RpcConfig};
pub use endpoint::{Endpoint, EndpointKind, EndpointTable};
pub use error::{Result, RpcError};
pub use handler::{Handler, HandlerFuture, HandlerTarget, Reply, Request};
pub use message::{AsyncMessage, Envelope, Message, SyncMessage, Transferable};
pub use rpc::{Invocation, PendingReply, Rpc};
