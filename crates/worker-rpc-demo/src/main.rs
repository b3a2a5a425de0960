//! Worker RPC demo - two agents calling each other over one channel.
//!
//! The "main" agent serves a handful of endpoints; the "worker" agent calls
//! each of them, blocking and non-blocking, and prints what came back.

mod calls;
mod endpoints;
mod handlers;

use anyhow::{Context, Result};
use clap::Parser;
use endpoints::DemoEndpoints;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use worker_rpc::{message_channel, AgentConfig, AgentThread};

#[derive(Parser, Debug)]
#[command(name = "worker-rpc-demo")]
#[command(about = "Blocking and async calls between two agents")]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Bytes reserved for each blocking call's result (0 = no result)
    #[arg(long, default_value_t = AgentConfig::DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Milliseconds the wait endpoints sleep, and the delay before testLazy is installed
    #[arg(long, default_value = "200")]
    wait_ms: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; RUST_LOG overrides --debug
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();

    info!("Starting worker-rpc demo");

    let endpoints = DemoEndpoints::new(args.buffer_size);
    let table = endpoints.table()?;
    debug!("Declared {} endpoints:\n{}", table.len(), table.to_json_string()?);

    let (main_port, worker_port) = message_channel();
    let (done_tx, done_rx) = mpsc::channel();

    let served = endpoints.clone();
    let lazy_delay = Duration::from_millis(args.wait_ms);
    let main = AgentThread::spawn("main", main_port, move |rpc| {
        handlers::serve(rpc, served, lazy_delay)
    })?;

    let wait_ms = args.wait_ms;
    let worker = AgentThread::spawn("worker", worker_port, move |rpc| async move {
        if let Err(e) = calls::run(rpc, endpoints, wait_ms).await {
            error!("Worker stopped early: {}", e);
        }
        let _ = done_tx.send(());
    })?;

    done_rx.recv().context("worker agent exited without finishing")?;

    worker.join()?;
    main.join()?;
    info!("Demo finished");

    Ok(())
}
