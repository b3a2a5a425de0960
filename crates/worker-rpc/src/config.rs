//! Centralized configuration for the RPC substrate.
//!
//! Protocol constants shared by both agents, plus defaults used when hosting
//! an agent on its own thread.

/// Protocol-level constants.
///
/// Both sides of a channel must agree on these; changing one is a wire break.
pub struct RpcConfig;

impl RpcConfig {
    /// Prefix of every ephemeral reply endpoint name (`ret_<channel>_<n>`).
    pub const RET_ID_PREFIX: &'static str = "ret_";
    /// Size of the little-endian length prefix at the head of a sync result buffer.
    pub const LENGTH_PREFIX_BYTES: usize = 4;
    /// Size of the lock cell shared for one blocking call.
    pub const LOCK_CELL_BYTES: usize = 4;
    /// Largest result capacity a blocking endpoint may declare; the frame
    /// length must fit the `u32` prefix.
    pub const MAX_BUFFER_SIZE: usize = u32::MAX as usize - Self::LENGTH_PREFIX_BYTES;
}

/// Defaults for agents hosted by [`crate::agent::AgentThread`].
pub struct AgentConfig;

impl AgentConfig {
    /// Prefix used for agent thread names.
    pub const THREAD_NAME_PREFIX: &'static str = "rpc-agent-";
    /// Result buffer size used by the demo endpoints.
    pub const DEFAULT_BUFFER_SIZE: usize = 64;
}

/// Build the reply endpoint name for the `counter`-th call on `channel`.
pub fn reply_endpoint_name(channel: &str, counter: u64) -> String {
    format!("{}{}_{}", RpcConfig::RET_ID_PREFIX, channel, counter)
}
