//! Memory shared between two agents for the duration of one blocking call.
//!
//! A blocking call owns two regions:
//!
//! - a [`LockCell`]: a 4-byte state word plus a block/wake pair. The caller
//!   parks on it; the callee transitions it exactly once.
//! - an optional [`SharedBuffer`] holding the encoded result:
//!
//! ```text
//! [u32 LE: len][UTF-8 JSON bytes of len][unused capacity ...]
//! ```
//!
//! Both are allocated fresh by the caller right before posting and are never
//! reused. They require the agents to share an address space (threads of one
//! process); the substrate cannot check that.

use crate::config::RpcConfig;
use crate::error::{Result, RpcError};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

/// State of a lock cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LockState {
    Pending = 0,
    Success = 1,
    Error = 2,
}

impl LockState {
    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => LockState::Pending,
            1 => LockState::Success,
            _ => LockState::Error,
        }
    }
}

/// Lock cell of one blocking call.
#[derive(Debug)]
pub struct LockCell {
    state: AtomicU32,
    parked: Mutex<()>,
    wake: Condvar,
}

impl Default for LockCell {
    fn default() -> Self {
        Self::new()
    }
}

impl LockCell {
    /// A fresh cell in the pending state.
    pub fn new() -> Self {
        Self {
            state: AtomicU32::new(LockState::Pending as u32),
            parked: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    pub fn state(&self) -> LockState {
        LockState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Transition out of pending and wake the waiter.
    ///
    /// Only the first transition wins; returns whether this call made it.
    pub fn complete(&self, outcome: LockState) -> bool {
        debug_assert!(outcome != LockState::Pending);
        let _guard = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        let won = self
            .state
            .compare_exchange(
                LockState::Pending as u32,
                outcome as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        self.wake.notify_all();
        won
    }

    /// Block the current thread until the cell leaves the pending state.
    ///
    /// There is no timeout. If the serving agent never answers, this never
    /// returns.
    pub fn wait(&self) -> LockState {
        let mut guard = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let state = self.state();
            if state != LockState::Pending {
                return state;
            }
            guard = self
                .wake
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Result region of one blocking call.
#[derive(Debug)]
pub struct SharedBuffer {
    bytes: Mutex<Box<[u8]>>,
}

impl SharedBuffer {
    /// Allocate room for `capacity` payload bytes plus the length prefix.
    ///
    /// `capacity` must not exceed [`RpcConfig::MAX_BUFFER_SIZE`]; endpoints
    /// are checked against it before a call allocates.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0u8; capacity + RpcConfig::LENGTH_PREFIX_BYTES].into_boxed_slice()),
        }
    }

    /// Payload bytes available after the length prefix.
    pub fn capacity(&self) -> usize {
        self.lock().len() - RpcConfig::LENGTH_PREFIX_BYTES
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Box<[u8]>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encode `value` as JSON and write the framed result.
    ///
    /// Refuses to write a partial frame when the encoding does not fit.
    pub fn write_result(&self, endpoint: &str, value: &Value) -> Result<usize> {
        let encoded = serde_json::to_vec(value)?;
        let mut bytes = self.lock();
        let capacity = bytes.len() - RpcConfig::LENGTH_PREFIX_BYTES;
        if encoded.len() > capacity {
            return Err(RpcError::ResultOverflow {
                endpoint: endpoint.to_string(),
                required: encoded.len(),
                capacity,
            });
        }

        let declared = u32::try_from(encoded.len()).map_err(|_| RpcError::ResultOverflow {
            endpoint: endpoint.to_string(),
            required: encoded.len(),
            capacity,
        })?;

        let (prefix, payload) = bytes.split_at_mut(RpcConfig::LENGTH_PREFIX_BYTES);
        prefix.copy_from_slice(&declared.to_le_bytes());
        payload[..encoded.len()].copy_from_slice(&encoded);
        Ok(encoded.len())
    }

    /// Decode the framed result written by the serving agent.
    pub fn read_result(&self) -> Result<Value> {
        let bytes = self.lock();
        let (prefix, payload) = bytes.split_at(RpcConfig::LENGTH_PREFIX_BYTES);
        let mut len_buf = [0u8; 4];
        len_buf.copy_from_slice(prefix);
        let declared = u32::from_le_bytes(len_buf) as usize;

        if declared > payload.len() {
            return Err(RpcError::CorruptFrame {
                declared,
                capacity: payload.len(),
            });
        }

        Ok(serde_json::from_slice(&payload[..declared])?)
    }
}
