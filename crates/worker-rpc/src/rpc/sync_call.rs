//! Blocking calls over shared memory.

use super::Rpc;
use crate::endpoint::Endpoint;
use crate::error::{Result, RpcError};
use crate::message::{Message, SyncMessage, Transferable};
use crate::shared::{LockCell, LockState, SharedBuffer};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

impl Rpc {
    /// Post a blocking call and park this thread until the peer completes it.
    ///
    /// While parked, this agent dispatches nothing: handlers, replies and the
    /// listener all wait. See the module docs for the resulting deadlock
    /// hazard.
    pub(crate) fn invoke_sync(
        &self,
        endpoint: &Endpoint,
        args: Vec<Value>,
        transfer: Vec<Transferable>,
    ) -> Result<Option<Value>> {
        endpoint.validate()?;
        let lock = Arc::new(LockCell::new());
        let buf = endpoint
            .buffer_size()
            .map(|capacity| Arc::new(SharedBuffer::with_capacity(capacity)));

        self.post(
            Message::Sync(SyncMessage {
                name: endpoint.name().to_string(),
                args,
                lock: lock.clone(),
                buf: buf.clone(),
            }),
            transfer,
        )?;

        debug!("[rpc] {} blocked on {}", self.inner.name, endpoint.name());
        match lock.wait() {
            LockState::Success => match buf {
                Some(buf) => buf.read_result().map(Some),
                None => Ok(None),
            },
            LockState::Error | LockState::Pending => Err(RpcError::CallFailed {
                endpoint: endpoint.name().to_string(),
            }),
        }
    }
}
