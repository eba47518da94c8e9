// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Environment and volume additions carrying credentials into sync containers.
//!
//! Secrets are only ever referenced by name and key, never read.

use crate::config::DatabaseConfig;
use crate::constants::sync_job::{AUTH_HEADER_ENV, CA_FILE_NAME, CA_MOUNT_PATH, DB_PASSWORD_ENV};
use crate::types::AppRepositoryAuth;
use k8s_openapi::api::core::v1::{
    EnvVar, EnvVarSource, KeyToPath, SecretKeySelector, SecretVolumeSource, Volume, VolumeMount,
};

/// Additions to apply to the sync container and its pod
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Injection {
    pub env: Vec<EnvVar>,
    pub volumes: Vec<Volume>,
    pub volume_mounts: Vec<VolumeMount>,
}

/// Compute the credential additions for a repository's auth configuration.
///
/// The database password is always present and always first, followed by the
/// authorization header when one is configured.
pub fn inject(auth: &AppRepositoryAuth, database: &DatabaseConfig) -> Injection {
    let mut injection = Injection {
        env: vec![database_password_env(database)],
        ..Default::default()
    };

    if let Some(header) = &auth.header {
        injection
            .env
            .push(secret_env(AUTH_HEADER_ENV, &header.secret_key_ref));
    }

    if let Some(ca) = &auth.custom_ca {
        let selector = &ca.secret_key_ref;
        injection.volumes.push(Volume {
            name: selector.name.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(selector.name.clone()),
                items: Some(vec![KeyToPath {
                    key: selector.key.clone(),
                    path: CA_FILE_NAME.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        });
        injection.volume_mounts.push(VolumeMount {
            name: selector.name.clone(),
            read_only: Some(true),
            mount_path: CA_MOUNT_PATH.to_string(),
            ..Default::default()
        });
    }

    injection
}

/// `DB_PASSWORD` sourced from the configured database secret
pub fn database_password_env(database: &DatabaseConfig) -> EnvVar {
    secret_env(
        DB_PASSWORD_ENV,
        &SecretKeySelector {
            name: database.secret_name.clone(),
            key: database.secret_key.clone(),
            ..Default::default()
        },
    )
}

fn secret_env(name: &str, selector: &SecretKeySelector) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(selector.clone()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
