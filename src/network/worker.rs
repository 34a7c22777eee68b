//! Network Worker
//!
//! The interception layer as an actor. It owns its buckets and is driven
//! through a [`WorkerHandle`]: fetches, commands, install and activation all
//! go through one inbox. Each fetch is answered on its own task so slow
//! requests do not hold up others.
//!
//! Until the worker is activated it does not control clients: requests go
//! straight to the network and nothing is cached.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::SharedClock;
use crate::error::{CacheError, Result};
use crate::network::{
    Fetcher, InterceptedRequest, InterceptedResponse, Interceptor, NetworkConfig, WorkerCommand,
    WorkerReply,
};

/// Inbox capacity.
const INBOX_CAPACITY: usize = 64;

/// Result of activating a bucket version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activation {
    pub version: String,
    /// Buckets of previous versions that were deleted
    pub deleted: Vec<String>,
    pub controlling: bool,
}

enum WorkerMessage {
    Fetch {
        request: InterceptedRequest,
        reply: oneshot::Sender<InterceptedResponse>,
    },
    Command {
        command: WorkerCommand,
        reply: oneshot::Sender<WorkerReply>,
    },
    Install {
        urls: Vec<String>,
        reply: oneshot::Sender<usize>,
    },
    Activate {
        version: String,
        reply: oneshot::Sender<Activation>,
    },
}

// == Network Worker ==
pub struct NetworkWorker {
    interceptor: Interceptor,
    controlling: bool,
    inbox: mpsc::Receiver<WorkerMessage>,
}

impl NetworkWorker {
    /// Starts the worker task.
    ///
    /// # Returns
    /// The handle used to talk to the worker, and the task's JoinHandle. The
    /// task stops once every handle is dropped.
    pub fn spawn(
        config: &NetworkConfig,
        fetcher: Arc<dyn Fetcher>,
        clock: SharedClock,
    ) -> Result<(WorkerHandle, JoinHandle<()>)> {
        let interceptor = Interceptor::new(config, fetcher, clock)?;
        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);

        let worker = NetworkWorker {
            interceptor,
            controlling: false,
            inbox,
        };
        let task = tokio::spawn(worker.run());

        info!("Network worker started with bucket version {}", config.version);
        Ok((WorkerHandle { tx }, task))
    }

    async fn run(mut self) {
        while let Some(message) = self.inbox.recv().await {
            match message {
                WorkerMessage::Fetch { request, reply } => self.dispatch_fetch(request, reply),
                WorkerMessage::Command { command, reply } => {
                    let _ = reply.send(self.execute(command));
                }
                WorkerMessage::Install { urls, reply } => {
                    let stored = self.interceptor.precache(&urls).await;
                    info!("Install precached {} of {} URLs", stored, urls.len());
                    let _ = reply.send(stored);
                }
                WorkerMessage::Activate { version, reply } => {
                    let _ = reply.send(self.activate(version));
                }
            }
        }
        debug!("Network worker inbox closed");
    }

    fn dispatch_fetch(
        &self,
        request: InterceptedRequest,
        reply: oneshot::Sender<InterceptedResponse>,
    ) {
        let interceptor = self.interceptor.clone();
        let controlling = self.controlling;

        tokio::spawn(async move {
            let response = if controlling {
                interceptor.handle(request).await
            } else {
                interceptor.pass_through(&request).await
            };
            if reply.send(response).is_err() {
                debug!("Fetch caller went away before the response was ready");
            }
        });
    }

    fn execute(&self, command: WorkerCommand) -> WorkerReply {
        match command {
            WorkerCommand::ClearCache { cache_type } => {
                let deleted = self.interceptor.buckets().clear(cache_type);
                info!("Cleared buckets {:?}", deleted);
                WorkerReply::Ack { success: true }
            }
            WorkerCommand::GetCacheStats => WorkerReply::Stats {
                stats: self.interceptor.buckets().stats(),
            },
        }
    }

    fn activate(&mut self, version: String) -> Activation {
        let deleted = self.interceptor.buckets().activate(&version);
        if !deleted.is_empty() {
            warn!("Deleted buckets from previous versions: {:?}", deleted);
        }
        self.controlling = true;
        info!("Network worker now controlling clients");

        Activation {
            version,
            deleted,
            controlling: self.controlling,
        }
    }
}

// == Worker Handle ==
/// Cloneable sender side of the worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerMessage>,
}

impl WorkerHandle {
    async fn ask<R>(&self, message: impl FnOnce(oneshot::Sender<R>) -> WorkerMessage) -> Result<R> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(message(reply))
            .await
            .map_err(|_| CacheError::WorkerUnavailable)?;
        response.await.map_err(|_| CacheError::WorkerUnavailable)
    }

    /// Sends a request through the interception layer.
    pub async fn fetch(&self, request: InterceptedRequest) -> Result<InterceptedResponse> {
        self.ask(|reply| WorkerMessage::Fetch { request, reply }).await
    }

    pub async fn command(&self, command: WorkerCommand) -> Result<WorkerReply> {
        self.ask(|reply| WorkerMessage::Command { command, reply }).await
    }

    /// Precaches static URLs into the current version's bucket.
    pub async fn install(&self, urls: Vec<String>) -> Result<usize> {
        self.ask(|reply| WorkerMessage::Install { urls, reply }).await
    }

    /// Makes `version` current, drops every other version's buckets and takes
    /// control of clients.
    pub async fn activate(&self, version: impl Into<String>) -> Result<Activation> {
        let version = version.into();
        self.ask(|reply| WorkerMessage::Activate { version, reply }).await
    }
}
