//! Handlers served by the "main" agent.

use crate::endpoints::DemoEndpoints;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use worker_rpc::{Handler, HandlerTarget, Request, Rpc};

fn add() -> Handler {
    Handler::from_fn(|req: Request| {
        let a: f64 = req.arg(0)?;
        let b: f64 = req.arg(1)?;
        Ok(json!(a + b))
    })
}

fn console_log() -> Handler {
    Handler::from_fn(|req: Request| {
        let line = req
            .args
            .iter()
            .map(|arg| match arg.as_str() {
                Some(text) => text.to_string(),
                None => arg.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        info!("[main] {}", line);
        Ok(())
    })
}

fn throw_error() -> Handler {
    Handler::from_fn(|_req: Request| -> anyhow::Result<()> { anyhow::bail!("Error from main") })
}

fn wait() -> Handler {
    Handler::new(|req: Request| async move {
        let ms: u64 = req.arg(0)?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    })
}

/// Register every demo endpoint on `rpc`.
///
/// `testLazy` is bound to a slot that only gets a handler after `lazy_delay`,
/// so calls made before then wait in the pending queue.
pub async fn serve(rpc: Rpc, endpoints: DemoEndpoints, lazy_delay: Duration) {
    rpc.register_handler(&endpoints.add, add());
    rpc.register_handler(&endpoints.add_sync, add());
    rpc.register_handler(&endpoints.console_log, console_log());
    rpc.register_handler(&endpoints.console_log_sync, console_log());
    rpc.register_handler(&endpoints.throw_error, throw_error());
    rpc.register_handler(&endpoints.throw_error_sync, throw_error());
    rpc.register_handler(&endpoints.wait, wait());
    rpc.register_handler(&endpoints.wait_sync, wait());

    let target = HandlerTarget::new();
    rpc.register_handler_lazy(&endpoints.test_lazy, &target, "testLazy");

    tokio::time::sleep(lazy_delay).await;
    debug!(
        "[main] installing testLazy with {} call(s) waiting",
        rpc.pending_messages(&endpoints.test_lazy)
    );
    target.set("testLazy", add());
}
