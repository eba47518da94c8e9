// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mock API server for `kube::Client` and an in-memory
//! [`ObjectStore`].

use crate::config::{Config, DatabaseConfig, SyncJobConfig};
use crate::error::{ControllerError, Result};
use crate::kubernetes::ObjectStore;
use crate::types::AppRepository;
use async_trait::async_trait;
use http::{Request, Response};
use http_body_util::BodyExt;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use kube::client::Body;
use kube::{Client, ResourceExt};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
    queries: Arc<Mutex<Vec<String>>>,
    bodies: Arc<Mutex<Vec<String>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            queries: Arc::new(Mutex::new(Vec::new())),
            bodies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.on("POST", path, status, body)
    }

    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PUT", path, status, body)
    }

    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, status, body)
    }

    /// `(method, path)` of every request served so far
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    /// Raw query strings of every request served so far
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// Request bodies of every request served so far, empty for bodiless ones
    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        self.responses
            .lock()
            .unwrap()
            .get(&(method.to_string(), path.to_string()))
            .cloned()
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        self.requests
            .lock()
            .unwrap()
            .push((method.clone(), path.clone()));
        if let Some(query) = req.uri().query() {
            self.queries.lock().unwrap().push(query.to_string());
        }

        let (status, body) = self
            .find_response(&method, &path)
            .unwrap_or_else(|| (404, not_found_json("object", &path)));

        let bodies = self.bodies.clone();
        let request_body = req.into_body();
        Box::pin(async move {
            let bytes: bytes::Bytes = request_body
                .collect()
                .await
                .map_err(|e| tower::BoxError::from(e.to_string()))?
                .to_bytes();
            bodies
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(&bytes).into_owned());

            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a Status response body
pub fn status_json(code: u16, reason: &str, message: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    status_json(404, "NotFound", &format!("{} \"{}\" not found", resource, name))
}

/// Controller configuration for a deployment in the `kubeapps` namespace
pub fn test_config() -> Config {
    Config {
        management_namespace: "kubeapps".to_string(),
        sync_job: SyncJobConfig {
            image: "kubeapps/chart-repo".to_string(),
            command: "/chart-repo".to_string(),
            database: DatabaseConfig {
                db_type: "mongodb".to_string(),
                url: "mongodb.kubeapps".to_string(),
                user: "admin".to_string(),
                name: "assets".to_string(),
                secret_name: "mongodb".to_string(),
                secret_key: "mongodb-root-password".to_string(),
            },
            user_agent_comment: None,
            crontab: "*/10 * * * *".to_string(),
        },
        workers: 2,
        resync_interval: Duration::from_secs(300),
        store_timeout: Duration::from_secs(5),
        max_attempts: 3,
    }
}

/// Store operations, as recorded by [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    GetRepository,
    ListRepositories,
    GetCronJob,
    ListCronJobs,
    CreateCronJob,
    ReplaceCronJob,
    DeleteCronJob,
    ListJobs,
    CreateJob,
    DeleteJob,
}

type Key = (String, String);

#[derive(Default)]
struct State {
    repositories: BTreeMap<Key, AppRepository>,
    cron_jobs: BTreeMap<Key, CronJob>,
    jobs: BTreeMap<Key, Job>,
    next_version: u64,
    failures: HashMap<Op, VecDeque<ControllerError>>,
    stalls: HashMap<Op, usize>,
    calls: Vec<Op>,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn take_failure(&mut self, op: Op) -> Result<()> {
        match self.failures.get_mut(&op).and_then(|f| f.pop_front()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// In-memory [`ObjectStore`] with optimistic concurrency and fault injection
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    let empty = BTreeMap::new();
    let labels = labels.unwrap_or(&empty);
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        match term.split_once('=') {
            Some((k, v)) => labels.get(k).is_some_and(|l| l == v),
            None => labels.contains_key(term),
        }
    })
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_repository(&self, repo: AppRepository) {
        let mut state = self.state.lock().unwrap();
        state
            .repositories
            .insert(key(&repo.repo_namespace(), &repo.name_any()), repo);
    }

    pub fn insert_cron_job(&self, cron_job: CronJob) {
        let mut state = self.state.lock().unwrap();
        let k = key(&cron_job.namespace().unwrap_or_default(), &cron_job.name_any());
        state.cron_jobs.insert(k, cron_job);
    }

    pub fn insert_job(&self, job: Job) {
        let mut state = self.state.lock().unwrap();
        let k = key(&job.namespace().unwrap_or_default(), &job.name_any());
        state.jobs.insert(k, job);
    }

    /// Make the next call of `op` fail with `error`
    pub fn fail_next(&self, op: Op, error: ControllerError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Make the next call of `op` never complete
    pub fn stall_next(&self, op: Op) {
        *self.state.lock().unwrap().stalls.entry(op).or_default() += 1;
    }

    /// Record a call, hanging forever when it was told to stall
    async fn enter(&self, op: Op) {
        let stalled = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(op.clone());
            match state.stalls.get_mut(&op) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if stalled {
            std::future::pending::<()>().await;
        }
    }

    pub fn cron_jobs(&self) -> Vec<CronJob> {
        self.state.lock().unwrap().cron_jobs.values().cloned().collect()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.state.lock().unwrap().jobs.values().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Op> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls().into_iter().filter(|o| *o == op).count()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_repository(&self, namespace: &str, name: &str) -> Result<Option<AppRepository>> {
        self.enter(Op::GetRepository).await;
        let mut state = self.state.lock().unwrap();
        state.take_failure(Op::GetRepository)?;
        Ok(state.repositories.get(&key(namespace, name)).cloned())
    }

    async fn list_repositories(&self) -> Result<Vec<AppRepository>> {
        self.enter(Op::ListRepositories).await;
        let mut state = self.state.lock().unwrap();
        state.take_failure(Op::ListRepositories)?;
        Ok(state.repositories.values().cloned().collect())
    }

    async fn get_cron_job(&self, namespace: &str, name: &str) -> Result<Option<CronJob>> {
        self.enter(Op::GetCronJob).await;
        let mut state = self.state.lock().unwrap();
        state.take_failure(Op::GetCronJob)?;
        Ok(state.cron_jobs.get(&key(namespace, name)).cloned())
    }

    async fn list_cron_jobs(&self, namespace: &str, selector: &str) -> Result<Vec<CronJob>> {
        self.enter(Op::ListCronJobs).await;
        let mut state = self.state.lock().unwrap();
        state.take_failure(Op::ListCronJobs)?;
        Ok(state
            .cron_jobs
            .iter()
            .filter(|((ns, _), c)| ns == namespace && matches_selector(c.metadata.labels.as_ref(), selector))
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn create_cron_job(&self, namespace: &str, cron_job: &CronJob) -> Result<CronJob> {
        self.enter(Op::CreateCronJob).await;
        let mut state = self.state.lock().unwrap();
        state.take_failure(Op::CreateCronJob)?;
        let k = key(namespace, &cron_job.name_any());
        if state.cron_jobs.contains_key(&k) {
            return Err(ControllerError::AlreadyExists(k.1));
        }
        let mut created = cron_job.clone();
        created.metadata.namespace = Some(namespace.to_string());
        created.metadata.resource_version = Some(state.bump());
        state.cron_jobs.insert(k, created.clone());
        Ok(created)
    }

    async fn replace_cron_job(&self, namespace: &str, cron_job: &CronJob) -> Result<CronJob> {
        self.enter(Op::ReplaceCronJob).await;
        let mut state = self.state.lock().unwrap();
        state.take_failure(Op::ReplaceCronJob)?;
        let k = key(namespace, &cron_job.name_any());
        let Some(current) = state.cron_jobs.get(&k) else {
            return Err(ControllerError::NotFound(k.1));
        };
        if current.metadata.resource_version != cron_job.metadata.resource_version {
            return Err(ControllerError::Conflict(k.1));
        }
        let mut replaced = cron_job.clone();
        replaced.metadata.namespace = Some(namespace.to_string());
        replaced.metadata.resource_version = Some(state.bump());
        state.cron_jobs.insert(k, replaced.clone());
        Ok(replaced)
    }

    async fn delete_cron_job(&self, namespace: &str, name: &str) -> Result<()> {
        self.enter(Op::DeleteCronJob).await;
        let mut state = self.state.lock().unwrap();
        state.take_failure(Op::DeleteCronJob)?;
        state
            .cron_jobs
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| ControllerError::NotFound(name.to_string()))
    }

    async fn list_jobs(&self, namespace: &str, selector: &str) -> Result<Vec<Job>> {
        self.enter(Op::ListJobs).await;
        let mut state = self.state.lock().unwrap();
        state.take_failure(Op::ListJobs)?;
        Ok(state
            .jobs
            .iter()
            .filter(|((ns, _), j)| ns == namespace && matches_selector(j.metadata.labels.as_ref(), selector))
            .map(|(_, j)| j.clone())
            .collect())
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job> {
        self.enter(Op::CreateJob).await;
        let mut state = self.state.lock().unwrap();
        state.take_failure(Op::CreateJob)?;
        let version = state.bump();
        let name = match (&job.metadata.name, &job.metadata.generate_name) {
            (Some(name), _) => name.clone(),
            (None, Some(prefix)) => format!("{}{:05}", prefix, version),
            (None, None) => return Err(ControllerError::Invalid("Job without a name".to_string())),
        };
        let k = key(namespace, &name);
        if state.jobs.contains_key(&k) {
            return Err(ControllerError::AlreadyExists(name));
        }
        let mut created = job.clone();
        created.metadata.name = Some(name);
        created.metadata.namespace = Some(namespace.to_string());
        created.metadata.resource_version = Some(version);
        state.jobs.insert(k, created.clone());
        Ok(created)
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()> {
        self.enter(Op::DeleteJob).await;
        let mut state = self.state.lock().unwrap();
        state.take_failure(Op::DeleteJob)?;
        state
            .jobs
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| ControllerError::NotFound(name.to_string()))
    }
}
