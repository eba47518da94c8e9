// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Builders for the schedule, the immediate sync run and the cleanup run.

use super::credentials::{database_password_env, inject};
use super::non_empty;
use super::template::merge;
use crate::config::SyncJobConfig;
use crate::constants::sync_job::{
    CLEANUP_CONTAINER, CONCURRENCY_REPLACE, DELETE_SUBCOMMAND, RESTART_NEVER, RESTART_ON_FAILURE,
    SYNC_CONTAINER, SYNC_SUBCOMMAND,
};
use crate::constants::{cleanup_job_prefix, cron_job_name, sync_job_prefix};
use crate::ownership::RepoIdentity;
use crate::types::AppRepository;
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

/// Namespace segment used in generated object names.
///
/// Cluster-scoped repositories have no namespace of their own, so the
/// management namespace stands in for it.
fn scope_namespace<'a>(repo_namespace: &'a str, management_namespace: &'a str) -> &'a str {
    if repo_namespace.is_empty() {
        management_namespace
    } else {
        repo_namespace
    }
}

/// Recurring sync schedule for a repository
pub fn build_schedule(
    repo: &AppRepository,
    management_namespace: &str,
    config: &SyncJobConfig,
) -> CronJob {
    let identity = RepoIdentity::of(repo);
    let schedule = repo
        .spec
        .interval
        .clone()
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| config.crontab.clone());

    CronJob {
        metadata: ObjectMeta {
            name: Some(cron_job_name(
                scope_namespace(&identity.namespace, management_namespace),
                &identity.name,
            )),
            namespace: Some(management_namespace.to_string()),
            labels: Some(identity.labels()),
            owner_references: owner_references(repo, management_namespace),
            ..Default::default()
        },
        spec: Some(CronJobSpec {
            schedule,
            concurrency_policy: Some(CONCURRENCY_REPLACE.to_string()),
            job_template: JobTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(identity.labels()),
                    ..Default::default()
                }),
                spec: Some(sync_job_spec(repo, config)),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// One-off sync run, created with a server-generated name
pub fn build_run(repo: &AppRepository, management_namespace: &str, config: &SyncJobConfig) -> Job {
    let identity = RepoIdentity::of(repo);

    Job {
        metadata: ObjectMeta {
            generate_name: Some(sync_job_prefix(
                scope_namespace(&identity.namespace, management_namespace),
                &identity.name,
            )),
            namespace: Some(management_namespace.to_string()),
            labels: Some(identity.labels()),
            owner_references: owner_references(repo, management_namespace),
            ..Default::default()
        },
        spec: Some(sync_job_spec(repo, config)),
        status: None,
    }
}

/// Run that removes a deleted repository's data from the database.
///
/// The repository is gone by the time this runs, so there is no owner, and
/// no identity labels either: the job must outlive the garbage collection of
/// everything else generated for the repository.
pub fn build_cleanup_run(
    repo_name: &str,
    repo_namespace: &str,
    management_namespace: &str,
    config: &SyncJobConfig,
) -> Job {
    let mut args = vec![DELETE_SUBCOMMAND.to_string(), repo_name.to_string()];
    args.extend(database_flags(config));

    Job {
        metadata: ObjectMeta {
            generate_name: Some(cleanup_job_prefix(
                scope_namespace(repo_namespace, management_namespace),
                repo_name,
            )),
            namespace: Some(management_namespace.to_string()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    restart_policy: Some(RESTART_NEVER.to_string()),
                    containers: vec![Container {
                        name: CLEANUP_CONTAINER.to_string(),
                        image: Some(config.image.clone()),
                        command: Some(vec![config.command.clone()]),
                        args: Some(args),
                        env: Some(vec![database_password_env(&config.database)]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Whether the stored schedule has drifted from the desired one.
///
/// Compares the whole spec together with the labels and owner references;
/// the resource version is ignored. Fields the API server fills in when
/// they are unset compare equal to their default.
pub fn schedule_differs(desired: &CronJob, observed: &CronJob) -> bool {
    with_server_defaults(desired) != with_server_defaults(observed)
        || desired.metadata.labels != observed.metadata.labels
        || desired.metadata.owner_references != observed.metadata.owner_references
}

fn with_server_defaults(cron_job: &CronJob) -> Option<CronJobSpec> {
    let mut spec = cron_job.spec.clone()?;
    spec.concurrency_policy.get_or_insert_with(|| "Allow".to_string());
    spec.suspend.get_or_insert(false);
    spec.successful_jobs_history_limit.get_or_insert(3);
    spec.failed_jobs_history_limit.get_or_insert(1);

    if let Some(job) = spec.job_template.spec.as_mut() {
        job.backoff_limit.get_or_insert(6);
        job.completions.get_or_insert(1);
        job.parallelism.get_or_insert(1);
        job.completion_mode.get_or_insert_with(|| "NonIndexed".to_string());
        job.suspend.get_or_insert(false);
        if let Some(pod) = job.template.spec.as_mut() {
            default_pod_spec(pod);
        }
    }
    Some(spec)
}

fn default_pod_spec(pod: &mut PodSpec) {
    pod.restart_policy.get_or_insert_with(|| "Always".to_string());
    pod.dns_policy.get_or_insert_with(|| "ClusterFirst".to_string());
    pod.scheduler_name.get_or_insert_with(|| "default-scheduler".to_string());
    pod.security_context.get_or_insert_with(Default::default);
    pod.termination_grace_period_seconds.get_or_insert(30);

    let init_containers = pod.init_containers.iter_mut().flatten();
    for container in pod.containers.iter_mut().chain(init_containers) {
        container
            .termination_message_path
            .get_or_insert_with(|| "/dev/termination-log".to_string());
        container
            .termination_message_policy
            .get_or_insert_with(|| "File".to_string());
        container.resources.get_or_insert_with(Default::default);
        if container.image_pull_policy.is_none() {
            container.image_pull_policy = Some(default_pull_policy(container.image.as_deref()));
        }
        for port in container.ports.iter_mut().flatten() {
            port.protocol.get_or_insert_with(|| "TCP".to_string());
        }
    }

    for volume in pod.volumes.iter_mut().flatten() {
        if let Some(secret) = volume.secret.as_mut() {
            secret.default_mode.get_or_insert(0o644);
        }
        if let Some(config_map) = volume.config_map.as_mut() {
            config_map.default_mode.get_or_insert(0o644);
        }
    }
}

/// Untagged and `latest` images are always pulled
fn default_pull_policy(image: Option<&str>) -> String {
    let image = image.unwrap_or_default();
    if image.contains('@') {
        return "IfNotPresent".to_string();
    }
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    match last_segment.split_once(':') {
        None | Some((_, "latest")) => "Always".to_string(),
        Some(_) => "IfNotPresent".to_string(),
    }
}

fn sync_job_spec(repo: &AppRepository, config: &SyncJobConfig) -> JobSpec {
    JobSpec {
        template: sync_pod_template(repo, config),
        ..Default::default()
    }
}

fn sync_pod_template(repo: &AppRepository, config: &SyncJobConfig) -> PodTemplateSpec {
    let injection = inject(&repo.spec.auth, &config.database);

    let base = PodTemplateSpec {
        metadata: None,
        spec: Some(PodSpec {
            restart_policy: Some(RESTART_ON_FAILURE.to_string()),
            containers: vec![Container {
                name: SYNC_CONTAINER.to_string(),
                image: Some(config.image.clone()),
                command: Some(vec![config.command.clone()]),
                args: Some(sync_args(repo, config)),
                env: non_empty(injection.env),
                volume_mounts: non_empty(injection.volume_mounts),
                ..Default::default()
            }],
            volumes: non_empty(injection.volumes),
            ..Default::default()
        }),
    };

    let mut template = match &repo.spec.sync_job_pod_template {
        Some(overrides) => merge(&base, overrides),
        None => base,
    };

    template
        .metadata
        .get_or_insert_with(ObjectMeta::default)
        .labels
        .get_or_insert_with(Default::default)
        .extend(RepoIdentity::of(repo).labels());
    template
}

fn sync_args(repo: &AppRepository, config: &SyncJobConfig) -> Vec<String> {
    let mut args = vec![SYNC_SUBCOMMAND.to_string()];
    args.extend(database_flags(config));
    if let Some(comment) = &config.user_agent_comment {
        args.push(format!("--user-agent-comment={}", comment));
    }
    args.push(repo.name_any());
    args.push(repo.spec.url.clone());
    args
}

fn database_flags(config: &SyncJobConfig) -> Vec<String> {
    let db = &config.database;
    vec![
        format!("--database-type={}", db.db_type),
        format!("--database-url={}", db.url),
        format!("--database-user={}", db.user),
        format!("--database-name={}", db.name),
    ]
}

/// Owner references are only valid within a namespace, so a repository gets
/// one only when it lives next to the generated objects.
fn owner_references(
    repo: &AppRepository,
    management_namespace: &str,
) -> Option<Vec<OwnerReference>> {
    if repo.namespace().as_deref() != Some(management_namespace) {
        return None;
    }
    repo.controller_owner_ref(&()).map(|owner| {
        vec![OwnerReference {
            block_owner_deletion: Some(true),
            ..owner
        }]
    })
}
