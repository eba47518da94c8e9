// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Identity labels stamped on every generated schedule and sync job
pub mod labels {
    /// Name of the AppRepository that produced the object
    pub const REPO_NAME: &str = "repo-name";
    /// Namespace of the AppRepository that produced the object
    pub const REPO_NAMESPACE: &str = "repo-namespace";
}

/// The operator name used in logs
pub const OPERATOR_NAME: &str = "apprepository-controller";

/// AppRepository API coordinates
pub mod crd {
    pub const GROUP: &str = "kubeapps.com";
    pub const VERSION: &str = "v1alpha1";
    pub const KIND: &str = "AppRepository";

    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Fixed layout of the generated sync containers
pub mod sync_job {
    pub const SYNC_CONTAINER: &str = "sync";
    pub const CLEANUP_CONTAINER: &str = "delete";

    pub const SYNC_SUBCOMMAND: &str = "sync";
    pub const DELETE_SUBCOMMAND: &str = "delete";

    pub const DEFAULT_COMMAND: &str = "/chart-repo";
    pub const DEFAULT_CRONTAB: &str = "*/10 * * * *";

    pub const RESTART_ON_FAILURE: &str = "OnFailure";
    pub const RESTART_NEVER: &str = "Never";
    pub const CONCURRENCY_REPLACE: &str = "Replace";

    pub const DB_PASSWORD_ENV: &str = "DB_PASSWORD";
    pub const AUTH_HEADER_ENV: &str = "AUTHORIZATION_HEADER";

    /// Trust-store directory the sync binary picks extra CAs up from
    pub const CA_MOUNT_PATH: &str = "/usr/local/share/ca-certificates";
    pub const CA_FILE_NAME: &str = "ca.crt";
}

/// Object name for the recurring sync schedule of a repository
pub fn cron_job_name(namespace: &str, repo_name: &str) -> String {
    format!("apprepo-{}-sync-{}", namespace, repo_name)
}

/// `generateName` prefix for one-off sync jobs
pub fn sync_job_prefix(namespace: &str, repo_name: &str) -> String {
    format!("{}-", cron_job_name(namespace, repo_name))
}

/// `generateName` prefix for cleanup jobs
pub fn cleanup_job_prefix(namespace: &str, repo_name: &str) -> String {
    format!("apprepo-{}-cleanup-{}-", namespace, repo_name)
}
