// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Store mutations driven by AppRepository lifecycle events.

use super::manager::SyncEvent;
use super::retry::{retry_with_backoff, RetryConfig};
use crate::config::Config;
use crate::error::{ControllerError, Result};
use crate::jobs::{build_cleanup_run, build_run, build_schedule, schedule_differs};
use crate::kubernetes::ObjectStore;
use crate::ownership::{belongs_to, identity_of, managed_selector, RepoIdentity};
use crate::types::AppRepository;
use kube::{Resource, ResourceExt};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub struct Handlers<S> {
    store: Arc<S>,
    config: Config,
    retry: RetryConfig,
    token: CancellationToken,
}

/// Deleting something already gone is success
fn ignore_not_found(result: Result<()>) -> Result<()> {
    match result {
        Err(ControllerError::NotFound(_)) => Ok(()),
        other => other,
    }
}

fn is_live<K: Resource>(object: &K) -> bool {
    object.meta().deletion_timestamp.is_none()
}

impl<S: ObjectStore> Handlers<S> {
    pub fn new(store: Arc<S>, config: Config, token: CancellationToken) -> Self {
        let retry = RetryConfig::with_max_attempts(config.max_attempts);
        Self {
            store,
            config,
            retry,
            token,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn namespace(&self) -> &str {
        &self.config.management_namespace
    }

    /// Bound a store call by the configured timeout and the shutdown token
    async fn call<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ControllerError::Cancelled),
            res = tokio::time::timeout(self.config.store_timeout, fut) => {
                res.unwrap_or_else(|_| Err(ControllerError::Timeout(what.to_string())))
            }
        }
    }

    async fn retrying<T, F, Fut>(&self, what: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_with_backoff(&self.retry, &self.token, what, operation).await
    }

    pub async fn handle(&self, event: &SyncEvent) -> Result<()> {
        match event {
            SyncEvent::RepositoryAdded { repo } => self.repository_added(repo).await,
            SyncEvent::RepositoryUpdated { repo } => self.repository_updated(repo).await,
            SyncEvent::RepositoryDeleted { identity } => self.repository_deleted(identity).await,
            SyncEvent::ScheduleMissing { repo } | SyncEvent::ScheduleDrifted { repo } => {
                self.retrying("apply schedule", move || self.apply_schedule(repo))
                    .await
            }
            SyncEvent::OrphansFound { identity } => {
                self.retrying("collect orphans", move || self.collect_orphans(identity))
                    .await
            }
        }
    }

    #[instrument(skip(self, repo), fields(repo = %repo.key()))]
    pub async fn repository_added(&self, repo: &AppRepository) -> Result<()> {
        info!("AppRepository added, creating schedule and initial sync job");

        // Also seen on restart, when the stored schedule may predate an edit
        let schedule = self
            .retrying("apply schedule", move || self.apply_schedule(repo))
            .await;
        let run = self
            .retrying("create sync job", move || self.create_sync_job(repo))
            .await;
        schedule.and(run)
    }

    #[instrument(skip(self, repo), fields(repo = %repo.key()))]
    pub async fn repository_updated(&self, repo: &AppRepository) -> Result<()> {
        info!("AppRepository changed, updating schedule and triggering a sync");

        let schedule = self
            .retrying("apply schedule", move || self.apply_schedule(repo))
            .await;
        // A changed URL or credential should not wait for the next tick
        let run = self
            .retrying("create sync job", move || self.create_sync_job(repo))
            .await;
        schedule.and(run)
    }

    #[instrument(skip(self, identity), fields(repo = %identity))]
    pub async fn repository_deleted(&self, identity: &RepoIdentity) -> Result<()> {
        info!("AppRepository deleted, cleaning up");

        let namespace = self.namespace();
        let cleanup = build_cleanup_run(
            &identity.name,
            &identity.namespace,
            namespace,
            &self.config.sync_job,
        );
        let cleanup = &cleanup;
        let created = self
            .retrying("create cleanup job", move || async move {
                match self
                    .call("create cleanup job", self.store.create_job(namespace, cleanup))
                    .await
                {
                    // A generated name makes a second attempt a second job
                    Err(ControllerError::Timeout(what)) => Err(ControllerError::Unconfirmed(what)),
                    other => other,
                }
            })
            .await;
        match created {
            Ok(job) => info!("Created cleanup job {}/{}", namespace, job.name_any()),
            Err(ControllerError::Unconfirmed(_)) => warn!(
                "Creating the cleanup job for {} timed out, it may or may not exist",
                identity
            ),
            Err(e) => error!(
                "Failed to create cleanup job, charts of {} may be left in the database: {}",
                identity, e
            ),
        }

        self.retrying("delete generated objects", move || {
            self.delete_generated(identity)
        })
        .await
    }

    /// Bring the stored schedule in line with the repository.
    ///
    /// A schedule carrying another repository's labels is left alone.
    async fn apply_schedule(&self, repo: &AppRepository) -> Result<()> {
        let namespace = self.namespace();
        let identity = RepoIdentity::of(repo);
        let mut desired = build_schedule(repo, namespace, &self.config.sync_job);
        let name = desired.name_any();

        let observed = self
            .call("get schedule", self.store.get_cron_job(namespace, &name))
            .await?;
        let Some(observed) = observed else {
            return match self
                .call("create schedule", self.store.create_cron_job(namespace, &desired))
                .await
            {
                Ok(_) => {
                    info!("Created CronJob {}/{}", namespace, name);
                    Ok(())
                }
                // Someone created it since our read; read again
                Err(ControllerError::AlreadyExists(msg)) => Err(ControllerError::Conflict(msg)),
                Err(e) => Err(e),
            };
        };

        if !belongs_to(&observed, &identity) {
            error!(
                "CronJob {}/{} is owned by {}, not by {}",
                namespace,
                name,
                identity_of(&observed).map_or_else(|| "nobody".to_string(), |o| o.to_string()),
                identity
            );
            return Err(ControllerError::NameTaken(name));
        }

        if !schedule_differs(&desired, &observed) {
            debug!("CronJob {}/{} is up to date", namespace, name);
            return Ok(());
        }

        desired.metadata.resource_version = observed.metadata.resource_version.clone();
        self.call("replace schedule", self.store.replace_cron_job(namespace, &desired))
            .await?;
        info!("Updated CronJob {}/{}", namespace, name);
        Ok(())
    }

    async fn create_sync_job(&self, repo: &AppRepository) -> Result<()> {
        let namespace = self.namespace();
        let job = build_run(repo, namespace, &self.config.sync_job);

        let created = self
            .call("create sync job", self.store.create_job(namespace, &job))
            .await?;
        info!("Created sync job {}/{}", namespace, created.name_any());
        Ok(())
    }

    /// Delete the schedules and sync jobs labeled for `identity`.
    ///
    /// Only labels decide; a schedule with the expected name may belong to a
    /// repository whose name and namespace render the same. Jobs already
    /// removed by their TTL are simply not listed any more.
    async fn delete_generated(&self, identity: &RepoIdentity) -> Result<()> {
        let namespace = self.namespace();
        let selector = identity.selector();

        let cron_jobs = self
            .call("list schedules", self.store.list_cron_jobs(namespace, &selector))
            .await?;
        for cron_job in cron_jobs.iter().filter(|c| belongs_to(*c, identity)) {
            ignore_not_found(
                self.call(
                    "delete schedule",
                    self.store.delete_cron_job(namespace, &cron_job.name_any()),
                )
                .await,
            )?;
        }

        let jobs = self
            .call("list sync jobs", self.store.list_jobs(namespace, &selector))
            .await?;
        for job in jobs.iter().filter(|j| belongs_to(*j, identity)) {
            ignore_not_found(
                self.call("delete sync job", self.store.delete_job(namespace, &job.name_any()))
                    .await,
            )?;
            debug!("Deleted sync job {}/{}", namespace, job.name_any());
        }

        info!("Deleted objects generated for {}", identity);
        Ok(())
    }

    /// Delete what `identity` left behind, unless the repository came back
    #[instrument(skip(self, identity), fields(repo = %identity))]
    async fn collect_orphans(&self, identity: &RepoIdentity) -> Result<()> {
        let repo = self
            .call(
                "get repository",
                self.store.get_repository(&identity.namespace, &identity.name),
            )
            .await?;
        if repo.is_some() {
            debug!("AppRepository exists, nothing to collect");
            return Ok(());
        }

        info!("Deleting objects orphaned by a removed AppRepository");
        self.delete_generated(identity).await
    }

    /// Compare all repositories with all generated objects and return the
    /// events that heal the differences.
    #[instrument(skip(self))]
    pub async fn plan_resync(&self) -> Result<Vec<SyncEvent>> {
        let namespace = self.namespace();
        let selector = managed_selector();

        let repos = self
            .call("list repositories", self.store.list_repositories())
            .await?;
        let cron_jobs = self
            .call("list schedules", self.store.list_cron_jobs(namespace, &selector))
            .await?;
        let jobs = self
            .call("list sync jobs", self.store.list_jobs(namespace, &selector))
            .await?;

        let repos: Vec<AppRepository> = repos.into_iter().filter(|r| is_live(r)).collect();
        let identities: Vec<RepoIdentity> = repos.iter().map(RepoIdentity::of).collect();

        let mut orphaned = BTreeSet::new();
        for cron_job in cron_jobs.iter().filter(|c| is_live(*c)) {
            if !identities.iter().any(|id| belongs_to(cron_job, id)) {
                orphaned.extend(identity_of(cron_job));
            }
        }
        for job in jobs.iter().filter(|j| is_live(*j)) {
            if !identities.iter().any(|id| belongs_to(job, id)) {
                orphaned.extend(identity_of(job));
            }
        }

        let mut events: Vec<SyncEvent> = orphaned
            .into_iter()
            .map(|identity| SyncEvent::OrphansFound { identity })
            .collect();

        for repo in repos {
            let identity = RepoIdentity::of(&repo);
            let desired = build_schedule(&repo, namespace, &self.config.sync_job);
            let name = desired.name_any();

            match cron_jobs.iter().find(|c| c.name_any() == name) {
                None => {
                    debug!("AppRepository {} has no schedule", identity);
                    events.push(SyncEvent::ScheduleMissing { repo });
                }
                Some(observed) if !belongs_to(observed, &identity) => {
                    warn!("Schedule name {} of {} is taken by another repository", name, identity);
                }
                Some(observed) if schedule_differs(&desired, observed) => {
                    debug!("Schedule of {} drifted", identity);
                    events.push(SyncEvent::ScheduleDrifted { repo });
                }
                Some(_) => {}
            }
        }

        info!(
            "Resync found {} repositories, {} actions to take",
            identities.len(),
            events.len()
        );
        Ok(events)
    }
}
