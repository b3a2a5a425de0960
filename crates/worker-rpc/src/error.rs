//! Error types for the RPC substrate.
//!
//! Remote handler faults never cross the agent boundary with detail: callers
//! only learn that a call failed. Everything else here is a local condition.

use thiserror::Error;

/// Main error type for worker-rpc.
#[derive(Debug, Error)]
pub enum RpcError {
    // Call outcome errors
    #[error("Remote call to {endpoint} failed")]
    CallFailed { endpoint: String },

    #[error("Channel closed while posting {endpoint}")]
    ChannelClosed { endpoint: String },

    #[error("Reply for {endpoint} can no longer arrive: rpc instance dropped")]
    Disconnected { endpoint: String },

    // Shared buffer errors
    #[error("Result for {endpoint} needs {required} bytes, buffer holds {capacity}")]
    ResultOverflow {
        endpoint: String,
        required: usize,
        capacity: usize,
    },

    #[error("Endpoint {endpoint} declares a {requested} byte result buffer, limit is {max}")]
    BufferTooLarge {
        endpoint: String,
        requested: usize,
        max: usize,
    },

    #[error("Result frame declares {declared} bytes, buffer holds {capacity}")]
    CorruptFrame { declared: usize, capacity: usize },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Declaration and usage errors
    #[error("Endpoint {name} declared twice with different shapes")]
    EndpointConflict { name: String },

    #[error("Invocation was {kind}, not a pending reply")]
    NotPending { kind: &'static str },

    #[error("Argument {index}: {message}")]
    UnexpectedArgument { index: usize, message: String },

    // Hosting errors
    #[error("Failed to start agent {name}: {message}")]
    AgentSpawn { name: String, message: String },
}

/// Result type alias for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RpcError {
    /// Whether the failure originated on the remote side of the channel.
    pub fn is_remote(&self) -> bool {
        matches!(self, RpcError::CallFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RpcError::CallFailed {
            endpoint: "sum".into(),
        };
        assert_eq!(err.to_string(), "Remote call to sum failed");
    }

    #[test]
    fn test_json_error_conversion() {
        let err: RpcError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, RpcError::Json { source: Some(_), .. }));
        assert!(!err.is_remote());
    }

    #[test]
    fn test_remote_errors() {
        assert!(RpcError::CallFailed {
            endpoint: "x".into()
        }
        .is_remote());
        assert!(!RpcError::ChannelClosed {
            endpoint: "x".into()
        }
        .is_remote());
    }
}
