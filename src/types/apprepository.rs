// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use k8s_openapi::api::core::v1::{PodTemplateSpec, SecretKeySelector};
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[kube(group = "kubeapps.com", version = "v1alpha1", kind = "AppRepository")]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct AppRepositorySpec {
    #[serde(rename = "type")]
    pub repo_type: String,
    pub url: String,
    #[serde(default)]
    pub auth: AppRepositoryAuth,
    /// Partial pod template merged into every generated sync job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_job_pod_template: Option<PodTemplateSpec>,
    /// Cron expression overriding the controller-wide schedule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Bumped by clients to force an immediate resync
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resync_requests: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppRepositoryAuth {
    /// Secret holding the value of the Authorization header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<SecretKeyRef>,
    /// Secret holding a CA certificate to trust for the repository URL
    #[serde(rename = "customCA", skip_serializing_if = "Option::is_none")]
    pub custom_ca: Option<SecretKeyRef>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub secret_key_ref: SecretKeySelector,
}

impl AppRepository {
    /// Namespace of the repository, empty for cluster-scoped repositories
    pub fn repo_namespace(&self) -> String {
        self.namespace().unwrap_or_default()
    }

    /// `namespace/name` key used in logs and work queues
    pub fn key(&self) -> String {
        format!("{}/{}", self.repo_namespace(), self.name_any())
    }
}
