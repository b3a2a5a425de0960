//! The "worker" agent's side: call every demo endpoint and print the outcome.

use crate::endpoints::DemoEndpoints;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use worker_rpc::{Endpoint, Invocation, Rpc};

async fn call(rpc: &Rpc, endpoint: &Endpoint, args: Vec<Value>) -> worker_rpc::Result<Option<Value>> {
    match rpc.invoke(endpoint, args, Vec::new())? {
        Invocation::Completed(value) => Ok(value),
        Invocation::Pending(pending) => pending.value().await.map(Some),
        Invocation::Posted => Ok(None),
    }
}

fn report(endpoint: &Endpoint, outcome: &worker_rpc::Result<Option<Value>>, elapsed: Duration) {
    let mode = if endpoint.is_sync() { "sync" } else { "async" };
    match outcome {
        Ok(Some(value)) => println!("{:<15} {:<5} -> {} ({:?})", endpoint.name(), mode, value, elapsed),
        Ok(None) => println!("{:<15} {:<5} -> done ({:?})", endpoint.name(), mode, elapsed),
        Err(e) => println!("{:<15} {:<5} -> error: {} ({:?})", endpoint.name(), mode, e, elapsed),
    }
}

async fn call_and_report(rpc: &Rpc, endpoint: &Endpoint, args: Vec<Value>) {
    let started = Instant::now();
    let outcome = call(rpc, endpoint, args).await;
    report(endpoint, &outcome, started.elapsed());
}

/// Exercise each endpoint once, in declaration order.
pub async fn run(rpc: Rpc, endpoints: DemoEndpoints, wait_ms: u64) -> anyhow::Result<()> {
    // Issued first: waits in the main agent's pending queue until the slot is set.
    let lazy = rpc.invoke(&endpoints.test_lazy, vec![json!(2), json!(3)], Vec::new())?;

    call_and_report(&rpc, &endpoints.add, vec![json!(2), json!(3)]).await;
    call_and_report(&rpc, &endpoints.add_sync, vec![json!(2), json!(3)]).await;
    call_and_report(&rpc, &endpoints.console_log, vec![json!("hello"), json!("world")]).await;
    call_and_report(&rpc, &endpoints.console_log_sync, vec![json!("hello"), json!("sync")]).await;
    call_and_report(&rpc, &endpoints.throw_error, vec![]).await;
    call_and_report(&rpc, &endpoints.throw_error_sync, vec![]).await;
    call_and_report(&rpc, &endpoints.wait, vec![json!(wait_ms)]).await;
    call_and_report(&rpc, &endpoints.wait_sync, vec![json!(wait_ms)]).await;

    let started = Instant::now();
    let outcome = lazy.into_pending()?.value().await.map(Some);
    report(&endpoints.test_lazy, &outcome, started.elapsed());

    let (tx, rx) = oneshot::channel();
    let add_callback = rpc.create_callbackify(&endpoints.add);
    add_callback(vec![json!(20), json!(22)], move |value: Value| {
        println!("{:<15} {:<5} -> {} (callback)", endpoints.add.name(), "async", value);
        let _ = tx.send(());
    });
    rx.await?;

    Ok(())
}
