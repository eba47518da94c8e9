// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Access to the objects the controller reads and writes.
//!
//! Reconciliation only talks to the API server through [`ObjectStore`], so
//! the handlers can be exercised against an in-memory store in tests.

use crate::error::{ControllerError, Result};
use crate::types::AppRepository;
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    Api, Client, ResourceExt,
};
use tracing::{debug, instrument};

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// `Ok(None)` when the repository does not exist
    async fn get_repository(&self, namespace: &str, name: &str) -> Result<Option<AppRepository>>;
    async fn list_repositories(&self) -> Result<Vec<AppRepository>>;

    async fn get_cron_job(&self, namespace: &str, name: &str) -> Result<Option<CronJob>>;
    async fn list_cron_jobs(&self, namespace: &str, selector: &str) -> Result<Vec<CronJob>>;
    async fn create_cron_job(&self, namespace: &str, cron_job: &CronJob) -> Result<CronJob>;
    /// Replace guarded by the `resourceVersion` carried in `cron_job`
    async fn replace_cron_job(&self, namespace: &str, cron_job: &CronJob) -> Result<CronJob>;
    async fn delete_cron_job(&self, namespace: &str, name: &str) -> Result<()>;

    async fn list_jobs(&self, namespace: &str, selector: &str) -> Result<Vec<Job>>;
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job>;
    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()>;
}

/// [`ObjectStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn cron_jobs(&self, namespace: &str) -> Api<CronJob> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    #[instrument(skip(self))]
    async fn get_repository(&self, namespace: &str, name: &str) -> Result<Option<AppRepository>> {
        if namespace.is_empty() {
            // No namespaced path exists for a repository without a namespace
            return Ok(self
                .list_repositories()
                .await?
                .into_iter()
                .find(|r| r.name_any() == name && r.namespace().is_none()));
        }
        let repos: Api<AppRepository> = Api::namespaced(self.client.clone(), namespace);
        Ok(repos.get_opt(name).await?)
    }

    #[instrument(skip(self))]
    async fn list_repositories(&self) -> Result<Vec<AppRepository>> {
        let repos: Api<AppRepository> = Api::all(self.client.clone());
        Ok(repos.list(&ListParams::default()).await?.items)
    }

    #[instrument(skip(self))]
    async fn get_cron_job(&self, namespace: &str, name: &str) -> Result<Option<CronJob>> {
        Ok(self.cron_jobs(namespace).get_opt(name).await?)
    }

    #[instrument(skip(self))]
    async fn list_cron_jobs(&self, namespace: &str, selector: &str) -> Result<Vec<CronJob>> {
        let lp = ListParams::default().labels(selector);
        Ok(self.cron_jobs(namespace).list(&lp).await?.items)
    }

    #[instrument(skip(self, cron_job), fields(name = %cron_job.name_any()))]
    async fn create_cron_job(&self, namespace: &str, cron_job: &CronJob) -> Result<CronJob> {
        let created = self
            .cron_jobs(namespace)
            .create(&PostParams::default(), cron_job)
            .await?;
        debug!("Created CronJob {}/{}", namespace, created.name_any());
        Ok(created)
    }

    #[instrument(skip(self, cron_job), fields(name = %cron_job.name_any()))]
    async fn replace_cron_job(&self, namespace: &str, cron_job: &CronJob) -> Result<CronJob> {
        let name = cron_job
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::Invalid("CronJob without a name".to_string()))?;
        Ok(self
            .cron_jobs(namespace)
            .replace(name, &PostParams::default(), cron_job)
            .await?)
    }

    #[instrument(skip(self))]
    async fn delete_cron_job(&self, namespace: &str, name: &str) -> Result<()> {
        self.cron_jobs(namespace)
            .delete(name, &DeleteParams::background())
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_jobs(&self, namespace: &str, selector: &str) -> Result<Vec<Job>> {
        let lp = ListParams::default().labels(selector);
        Ok(self.jobs(namespace).list(&lp).await?.items)
    }

    #[instrument(skip(self, job), fields(generate_name = ?job.metadata.generate_name))]
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job> {
        let created = self.jobs(namespace).create(&PostParams::default(), job).await?;
        debug!("Created Job {}/{}", namespace, created.name_any());
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()> {
        // Background propagation so the job's pods go with it
        self.jobs(namespace)
            .delete(name, &DeleteParams::background())
            .await?;
        Ok(())
    }
}
