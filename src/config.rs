// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::sync_job::{DEFAULT_COMMAND, DEFAULT_CRONTAB};
use anyhow::{anyhow, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace the controller runs in and creates schedules and jobs in
    pub management_namespace: String,
    pub sync_job: SyncJobConfig,
    /// Number of repositories reconciled in parallel
    pub workers: usize,
    pub resync_interval: Duration,
    /// Upper bound for a single API server call
    pub store_timeout: Duration,
    /// Attempts per event before it is dropped
    pub max_attempts: u32,
}

/// Everything the job synthesizer needs besides the repository itself
#[derive(Debug, Clone, PartialEq)]
pub struct SyncJobConfig {
    pub image: String,
    pub command: String,
    pub database: DatabaseConfig,
    pub user_agent_comment: Option<String>,
    /// Schedule used when a repository does not set its own interval
    pub crontab: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub db_type: String,
    pub url: String,
    pub user: String,
    pub name: String,
    pub secret_name: String,
    pub secret_key: String,
}

impl DatabaseConfig {
    /// Key holding the root password in the secret created by the database chart
    pub fn default_secret_key(db_type: &str) -> &'static str {
        match db_type {
            "postgresql" => "postgresql-password",
            _ => "mongodb-root-password",
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("{} environment variable not set", key))
        };

        let db_type = lookup("DB_TYPE").unwrap_or_else(|| "mongodb".to_string());
        let secret_key = lookup("DB_SECRET_KEY")
            .unwrap_or_else(|| DatabaseConfig::default_secret_key(&db_type).to_string());

        let database = DatabaseConfig {
            url: required("DB_URL")?,
            user: required("DB_USER")?,
            name: required("DB_NAME")?,
            secret_name: required("DB_SECRET_NAME")?,
            secret_key,
            db_type,
        };

        let sync_job = SyncJobConfig {
            image: required("REPO_SYNC_IMAGE")?,
            command: lookup("REPO_SYNC_COMMAND").unwrap_or_else(|| DEFAULT_COMMAND.to_string()),
            database,
            user_agent_comment: lookup("USER_AGENT_COMMENT").filter(|v| !v.is_empty()),
            crontab: lookup("CRONTAB")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_CRONTAB.to_string()),
        };

        Ok(Config {
            management_namespace: required("POD_NAMESPACE")?,
            sync_job,
            workers: parse_or(&lookup, "WORKERS", 4)?,
            resync_interval: Duration::from_secs(parse_or(&lookup, "RESYNC_INTERVAL_SECS", 300)?),
            store_timeout: Duration::from_secs(parse_or(&lookup, "STORE_TIMEOUT_SECS", 30)?),
            max_attempts: parse_or(&lookup, "MAX_ATTEMPTS", 5)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(v) => v
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, v)),
        None => Ok(default),
    }
}
