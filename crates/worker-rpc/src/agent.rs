//! Hosting an agent on its own OS thread.
//!
//! Each agent gets a current-thread tokio runtime and a `LocalSet`, so its
//! [`Rpc`] bookkeeping never needs locks. Blocking calls park that thread and,
//! with it, everything the agent would otherwise be doing.

use crate::channel::MessagePort;
use crate::config::AgentConfig;
use crate::error::{Result, RpcError};
use crate::rpc::Rpc;
use std::future::Future;
use std::thread;
use tokio::sync::oneshot;
use tokio::task::LocalSet;
use tracing::{debug, error, info};

/// Handle to a running agent thread. Dropping it asks the agent to stop.
pub struct AgentThread {
    name: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl AgentThread {
    /// Start an agent named `name` on `port` and run `setup` on it.
    ///
    /// After `setup` finishes the agent keeps serving incoming calls until
    /// [`AgentThread::shutdown`] is called or the handle is dropped.
    pub fn spawn<F, Fut>(name: impl Into<String>, port: MessagePort, setup: F) -> Result<Self>
    where
        F: FnOnce(Rpc) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let name = name.into();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let agent_name = name.clone();

        let thread = thread::Builder::new()
            .name(format!("{}{}", AgentConfig::THREAD_NAME_PREFIX, name))
            .spawn(move || Self::run(agent_name, port, setup, shutdown_rx))
            .map_err(|e| RpcError::AgentSpawn {
                name: name.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    fn run<F, Fut>(name: String, port: MessagePort, setup: F, mut shutdown_rx: oneshot::Receiver<()>)
    where
        F: FnOnce(Rpc) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Agent {} could not start its runtime: {}", name, e);
                return;
            }
        };

        let local = LocalSet::new();
        local.block_on(&runtime, async move {
            let rpc = Rpc::new(port, name.clone());
            info!("Agent {} started", name);

            tokio::select! {
                _ = setup(rpc.clone()) => {
                    debug!("Agent {} setup finished, serving", name);
                    let _ = (&mut shutdown_rx).await;
                }
                _ = &mut shutdown_rx => {}
            }

            info!("Agent {} shutting down", name);
        });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the agent to stop once it is no longer blocked.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Stop the agent and wait for its thread to exit.
    pub fn join(mut self) -> Result<()> {
        self.shutdown();
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| RpcError::AgentSpawn {
                name: self.name.clone(),
                message: "agent thread panicked".to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Drop for AgentThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
