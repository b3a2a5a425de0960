//! Endpoint descriptors.
//!
//! An [`Endpoint`] names one remote-callable operation and fixes its shape:
//! blocking or not, whether a value comes back, whether that value carries
//! transferable resources, and how many bytes a blocking result may occupy.
//!
//! The name is the only routing key on the wire. Both agents must declare the
//! same shape under the same name; there is no schema negotiation.

use crate::config::RpcConfig;
use crate::error::{Result, RpcError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Call shape of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EndpointKind {
    /// The caller blocks until the serving agent completes the lock cell.
    Sync {
        /// Bytes reserved for the encoded result. `None` (or `0`) means the
        /// call only synchronizes and returns nothing.
        #[serde(default)]
        buffer_size: Option<usize>,
    },
    /// The caller continues immediately.
    Async {
        /// Whether a reply is expected.
        #[serde(default = "default_has_return")]
        has_return: bool,
        /// Whether the reply carries transferable resources.
        #[serde(default)]
        has_return_transfer: bool,
    },
}

fn default_has_return() -> bool {
    true
}

/// Immutable description of one named remote call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    name: String,
    #[serde(flatten)]
    kind: EndpointKind,
}

impl Endpoint {
    /// Blocking endpoint whose result is JSON-encoded into `buffer_size` bytes.
    pub fn sync(name: impl Into<String>, buffer_size: usize) -> Self {
        Self {
            name: name.into(),
            kind: EndpointKind::Sync {
                buffer_size: Some(buffer_size),
            },
        }
    }

    /// Blocking endpoint without a return value.
    pub fn sync_void(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EndpointKind::Sync { buffer_size: None },
        }
    }

    /// Non-blocking endpoint resolving to the handler's value.
    pub fn async_call(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EndpointKind::Async {
                has_return: true,
                has_return_transfer: false,
            },
        }
    }

    /// Non-blocking endpoint whose reply also moves transferable resources.
    pub fn async_with_transfer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EndpointKind::Async {
                has_return: true,
                has_return_transfer: true,
            },
        }
    }

    /// Fire-and-forget endpoint.
    pub fn async_void(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EndpointKind::Async {
                has_return: false,
                has_return_transfer: false,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn is_sync(&self) -> bool {
        matches!(self.kind, EndpointKind::Sync { .. })
    }

    /// Whether the caller gets a value back.
    pub fn has_return(&self) -> bool {
        match self.kind {
            EndpointKind::Sync { .. } => self.buffer_size().is_some(),
            EndpointKind::Async { has_return, .. } => has_return,
        }
    }

    pub fn has_return_transfer(&self) -> bool {
        match self.kind {
            EndpointKind::Sync { .. } => false,
            EndpointKind::Async {
                has_return,
                has_return_transfer,
            } => has_return && has_return_transfer,
        }
    }

    /// Result capacity of a blocking endpoint. A zero size counts as absent.
    pub fn buffer_size(&self) -> Option<usize> {
        match self.kind {
            EndpointKind::Sync { buffer_size } => buffer_size.filter(|size| *size > 0),
            EndpointKind::Async { .. } => None,
        }
    }

    /// Check that the declared result buffer can be framed.
    pub fn validate(&self) -> Result<()> {
        match self.buffer_size() {
            Some(requested) if requested > RpcConfig::MAX_BUFFER_SIZE => {
                Err(RpcError::BufferTooLarge {
                    endpoint: self.name.clone(),
                    requested,
                    max: RpcConfig::MAX_BUFFER_SIZE,
                })
            }
            _ => Ok(()),
        }
    }

    /// Synthesized descriptor for a per-call reply endpoint.
    pub(crate) fn reply(name: String) -> Self {
        Self::async_void(name)
    }
}

/// A name-unique set of endpoint declarations shared by both agents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointTable {
    endpoints: Vec<Endpoint>,
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration.
    ///
    /// Re-declaring an identical endpoint is accepted; declaring a different
    /// shape under an existing name fails with [`RpcError::EndpointConflict`],
    /// an oversized result buffer with [`RpcError::BufferTooLarge`].
    pub fn insert(&mut self, endpoint: Endpoint) -> Result<()> {
        endpoint.validate()?;
        match self.get(endpoint.name()) {
            Some(existing) if *existing == endpoint => Ok(()),
            Some(_) => Err(RpcError::EndpointConflict {
                name: endpoint.name,
            }),
            None => {
                self.endpoints.push(endpoint);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Build a table, failing on the first rejected declaration.
    pub fn try_from_endpoints<I>(endpoints: I) -> Result<Self>
    where
        I: IntoIterator<Item = Endpoint>,
    {
        let mut table = Self::new();
        for endpoint in endpoints {
            table.insert(endpoint)?;
        }
        Ok(table)
    }

    /// Load a table from a JSON array of declarations, validating uniqueness.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let declared: Vec<Endpoint> = serde_json::from_str(json)?;
        Self::try_from_endpoints(declared)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl FromIterator<Endpoint> for EndpointTable {
    /// Collect declarations, skipping (and logging) any that `insert` rejects.
    ///
    /// Use [`EndpointTable::try_from_endpoints`] to fail instead.
    fn from_iter<I: IntoIterator<Item = Endpoint>>(iter: I) -> Self {
        let mut table = Self::new();
        for endpoint in iter {
            let name = endpoint.name.clone();
            if let Err(e) = table.insert(endpoint) {
                warn!("Skipping endpoint declaration {}: {}", name, e);
            }
        }
        table
    }
}
