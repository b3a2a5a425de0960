//! Endpoint declarations shared by both demo agents.

use worker_rpc::{Endpoint, EndpointTable, Result};

/// Every endpoint the "main" agent serves.
#[derive(Debug, Clone)]
pub struct DemoEndpoints {
    pub add: Endpoint,
    pub add_sync: Endpoint,
    pub console_log: Endpoint,
    pub console_log_sync: Endpoint,
    pub throw_error: Endpoint,
    pub throw_error_sync: Endpoint,
    pub wait: Endpoint,
    pub wait_sync: Endpoint,
    pub test_lazy: Endpoint,
}

impl DemoEndpoints {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            add: Endpoint::async_call("add"),
            add_sync: Endpoint::sync("addSync", buffer_size),
            console_log: Endpoint::async_void("consoleLog"),
            console_log_sync: Endpoint::sync_void("consoleLogSync"),
            throw_error: Endpoint::async_call("throwError"),
            throw_error_sync: Endpoint::sync("throwErrorSync", buffer_size),
            wait: Endpoint::async_call("wait"),
            wait_sync: Endpoint::sync_void("waitSync"),
            test_lazy: Endpoint::async_call("testLazy"),
        }
    }

    /// The declarations as one table; fails on a conflicting or oversized declaration.
    pub fn table(&self) -> Result<EndpointTable> {
        EndpointTable::try_from_endpoints([
            &self.add,
            &self.add_sync,
            &self.console_log,
            &self.console_log_sync,
            &self.throw_error,
            &self.throw_error_sync,
            &self.wait,
            &self.wait_sync,
            &self.test_lazy,
        ]
        .into_iter()
        .cloned())
    }
}
