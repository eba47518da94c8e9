// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Dispatches AppRepository events to a bounded pool of workers.
//!
//! Events for one repository are handled strictly in arrival order, one at a
//! time. Events for different repositories run concurrently, up to the
//! configured number of workers. A periodic resync compares all repositories
//! with the generated objects and feeds the differences back as events.

use super::handlers::Handlers;
use super::queue::KeyedQueue;
use super::retry::RetryConfig;
use crate::config::Config;
use crate::error::ControllerError;
use crate::kubernetes::ObjectStore;
use crate::ownership::RepoIdentity;
use crate::types::AppRepository;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Events that the reconciler and the resync send to the SyncManager
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A repository was seen for the first time
    RepositoryAdded { repo: AppRepository },
    /// The spec of a known repository changed
    RepositoryUpdated { repo: AppRepository },
    /// A repository is gone; only its identity survives
    RepositoryDeleted { identity: RepoIdentity },
    /// Resync found a repository without a schedule
    ScheduleMissing { repo: AppRepository },
    /// Resync found a schedule that no longer matches its repository
    ScheduleDrifted { repo: AppRepository },
    /// Resync found generated objects whose repository no longer exists
    OrphansFound { identity: RepoIdentity },
}

impl SyncEvent {
    /// The repository this event serializes on
    pub fn identity(&self) -> RepoIdentity {
        match self {
            SyncEvent::RepositoryAdded { repo }
            | SyncEvent::RepositoryUpdated { repo }
            | SyncEvent::ScheduleMissing { repo }
            | SyncEvent::ScheduleDrifted { repo } => RepoIdentity::of(repo),
            SyncEvent::RepositoryDeleted { identity } | SyncEvent::OrphansFound { identity } => {
                identity.clone()
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::RepositoryAdded { .. } => "added",
            SyncEvent::RepositoryUpdated { .. } => "updated",
            SyncEvent::RepositoryDeleted { .. } => "deleted",
            SyncEvent::ScheduleMissing { .. } => "schedule-missing",
            SyncEvent::ScheduleDrifted { .. } => "schedule-drifted",
            SyncEvent::OrphansFound { .. } => "orphans-found",
        }
    }
}

/// Central coordinator for AppRepository events.
/// Receives events from the reconciler and hands them to the workers.
pub struct SyncManager<S> {
    handlers: Handlers<S>,
    event_rx: mpsc::Receiver<SyncEvent>,
    workers: usize,
    resync_interval: Duration,
    token: CancellationToken,
}

/// Handle to send events to the SyncManager
#[derive(Clone)]
pub struct SyncManagerHandle {
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncManagerHandle {
    pub async fn send(&self, event: SyncEvent) {
        if let Err(e) = self.event_tx.send(event).await {
            error!("Failed to send event to SyncManager: {}", e);
        }
    }
}

impl<S: ObjectStore> SyncManager<S> {
    pub fn new(store: Arc<S>, config: Config, token: CancellationToken) -> (Self, SyncManagerHandle) {
        let (event_tx, event_rx) = mpsc::channel(256);

        let manager = Self {
            handlers: Handlers::new(store, config.clone(), token.clone()),
            event_rx,
            workers: config.workers.max(1),
            resync_interval: config.resync_interval,
            token,
        };

        let handle = SyncManagerHandle { event_tx };
        (manager, handle)
    }

    pub fn with_retry(self, retry: RetryConfig) -> Self {
        Self {
            handlers: self.handlers.with_retry(retry),
            ..self
        }
    }

    /// Run until cancelled, or until every handle is dropped and all queued
    /// events are handled.
    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            handlers,
            mut event_rx,
            workers,
            resync_interval,
            token,
        } = self;
        let handlers = Arc::new(handlers);

        info!(
            "SyncManager started with {} workers, resync every {:?}",
            workers, resync_interval
        );

        let permits = Arc::new(Semaphore::new(workers));
        let mut queue = KeyedQueue::default();
        let mut tasks: JoinSet<RepoIdentity> = JoinSet::new();
        let mut resync = interval_at(Instant::now() + resync_interval, resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut accepting = true;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(
                        "Shutting down, abandoning {} running and {} queued events",
                        queue.active(),
                        queue.waiting()
                    );
                    tasks.shutdown().await;
                    break;
                }
                Some(joined) = tasks.join_next() => {
                    match joined {
                        Ok(identity) => {
                            if let Some(next) = queue.complete(&identity) {
                                spawn_worker(&mut tasks, &handlers, &permits, next);
                            }
                        }
                        Err(e) => error!("Worker task failed: {}", e),
                    }
                }
                event = event_rx.recv(), if accepting => {
                    match event {
                        Some(event) => {
                            debug!("Queueing {} event for {}", event.kind(), event.identity());
                            if let Some(ready) = queue.push(event) {
                                spawn_worker(&mut tasks, &handlers, &permits, ready);
                            }
                        }
                        None => {
                            debug!("Event channel closed");
                            accepting = false;
                        }
                    }
                }
                _ = resync.tick() => {
                    match handlers.plan_resync().await {
                        Ok(events) => {
                            for event in events {
                                if let Some(ready) = queue.push(event) {
                                    spawn_worker(&mut tasks, &handlers, &permits, ready);
                                }
                            }
                        }
                        Err(ControllerError::Cancelled) => {}
                        Err(e) => error!("Resync failed: {}", e),
                    }
                }
            }

            if !accepting && queue.is_idle() {
                info!("All events handled, SyncManager stopping");
                break;
            }
        }

        Ok(())
    }
}

fn spawn_worker<S: ObjectStore>(
    tasks: &mut JoinSet<RepoIdentity>,
    handlers: &Arc<Handlers<S>>,
    permits: &Arc<Semaphore>,
    event: SyncEvent,
) {
    let handlers = handlers.clone();
    let permits = permits.clone();

    tasks.spawn(async move {
        let identity = event.identity();
        let Ok(_permit) = permits.acquire_owned().await else {
            return identity;
        };

        // A panicking handler must still release its repository
        match AssertUnwindSafe(handlers.handle(&event)).catch_unwind().await {
            Ok(Ok(())) => debug!("Handled {} event for {}", event.kind(), identity),
            Ok(Err(ControllerError::Cancelled)) => {
                debug!("Abandoned {} event for {}", event.kind(), identity)
            }
            Ok(Err(e)) if e.is_retryable() => error!(
                "Dropping {} event for {} after retries: {}",
                event.kind(),
                identity,
                e
            ),
            Ok(Err(e)) => warn!("Failed to handle {} event for {}: {}", event.kind(), identity, e),
            Err(_) => error!("Handler panicked on {} event for {}", event.kind(), identity),
        }
        identity
    });
}
