// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! AppRepository reconciler - watches repositories and notifies the sync manager.
//!
//! The watcher only reports the current state of an object. Telling an
//! addition from an update, and noticing repositories that vanished while the
//! watch was being re-established, needs the last spec seen per repository.

use crate::ownership::RepoIdentity;
use crate::sync::{SyncEvent, SyncManagerHandle};
use crate::types::{AppRepository, AppRepositorySpec};
use futures::StreamExt;
use kube::{Api, Client};
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Turns watch events into Added/Updated/Deleted events
#[derive(Default)]
pub struct ChangeTracker {
    known: HashMap<RepoIdentity, AppRepositorySpec>,
    /// Identities seen since the current re-list started
    relisting: Option<HashSet<RepoIdentity>>,
}

impl ChangeTracker {
    pub fn observe(&mut self, event: watcher::Event<AppRepository>) -> Vec<SyncEvent> {
        match event {
            watcher::Event::Init => {
                self.relisting = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(repo) => {
                if let Some(seen) = self.relisting.as_mut() {
                    seen.insert(RepoIdentity::of(&repo));
                }
                self.applied(repo).into_iter().collect()
            }
            watcher::Event::InitDone => {
                let Some(seen) = self.relisting.take() else {
                    return Vec::new();
                };
                let mut gone: Vec<RepoIdentity> = self
                    .known
                    .keys()
                    .filter(|identity| !seen.contains(*identity))
                    .cloned()
                    .collect();
                gone.sort();
                for identity in &gone {
                    self.known.remove(identity);
                }
                gone.into_iter()
                    .map(|identity| SyncEvent::RepositoryDeleted { identity })
                    .collect()
            }
            watcher::Event::Apply(repo) => self.applied(repo).into_iter().collect(),
            watcher::Event::Delete(repo) => {
                let identity = RepoIdentity::of(&repo);
                self.known.remove(&identity);
                vec![SyncEvent::RepositoryDeleted { identity }]
            }
        }
    }

    fn applied(&mut self, repo: AppRepository) -> Option<SyncEvent> {
        let identity = RepoIdentity::of(&repo);
        match self.known.insert(identity, repo.spec.clone()) {
            None => Some(SyncEvent::RepositoryAdded { repo }),
            Some(previous) if previous != repo.spec => Some(SyncEvent::RepositoryUpdated { repo }),
            // Status or metadata only
            Some(_) => None,
        }
    }
}

pub struct AppRepositoryReconciler {
    client: Client,
    sync_handle: SyncManagerHandle,
    token: CancellationToken,
}

impl AppRepositoryReconciler {
    pub fn new(client: Client, sync_handle: SyncManagerHandle, token: CancellationToken) -> Self {
        Self {
            client,
            sync_handle,
            token,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let repos: Api<AppRepository> = Api::all(self.client.clone());
        let mut tracker = ChangeTracker::default();

        let stream = watcher(repos, watcher::Config::default()).default_backoff();
        let mut stream = std::pin::pin!(stream);

        info!("Watching AppRepositories");
        loop {
            let next = tokio::select! {
                _ = self.token.cancelled() => break,
                next = stream.next() => next,
            };
            match next {
                Some(Ok(event)) => {
                    for sync_event in tracker.observe(event) {
                        debug!("AppRepository {} {}", sync_event.identity(), sync_event.kind());
                        self.sync_handle.send(sync_event).await;
                    }
                }
                Some(Err(e)) => warn!("AppRepository watch error: {}", e),
                None => break,
            }
        }

        info!("AppRepository watch stopped");
        Ok(())
    }
}
