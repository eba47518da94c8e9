// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Label-based correlation between generated objects and their AppRepository.
//!
//! Sync jobs and schedules live in the management namespace while the
//! repository they serve may live anywhere, so owner references only exist in
//! the same-namespace case. The identity labels are the correlation key that
//! always works.

use crate::constants::labels;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// The `(name, namespace)` pair identifying an AppRepository
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoIdentity {
    pub name: String,
    pub namespace: String,
}

impl RepoIdentity {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Identity of an AppRepository-like object
    pub fn of<K: Resource>(repo: &K) -> Self {
        Self::new(repo.name_any(), repo.namespace().unwrap_or_default())
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (labels::REPO_NAME.to_string(), self.name.clone()),
            (labels::REPO_NAMESPACE.to_string(), self.namespace.clone()),
        ])
    }

    /// Label selector matching every object generated for this repository
    pub fn selector(&self) -> String {
        format!(
            "{}={},{}={}",
            labels::REPO_NAME,
            self.name,
            labels::REPO_NAMESPACE,
            self.namespace
        )
    }
}

impl std::fmt::Display for RepoIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Label selector matching every object carrying both identity labels
pub fn managed_selector() -> String {
    format!("{},{}", labels::REPO_NAME, labels::REPO_NAMESPACE)
}

/// Read the producing repository back from an object's identity labels
pub fn identity_of<K: Resource>(object: &K) -> Option<RepoIdentity> {
    let labels = object.meta().labels.as_ref()?;
    Some(RepoIdentity::new(
        labels.get(labels::REPO_NAME)?.clone(),
        labels.get(labels::REPO_NAMESPACE)?.clone(),
    ))
}

/// Check whether `object` was generated for the repository `repo`.
///
/// Only the identity labels are compared; the object's own namespace is
/// irrelevant because generated objects live in the management namespace.
pub fn belongs_to<K: Resource>(object: &K, repo: &RepoIdentity) -> bool {
    identity_of(object).is_some_and(|id| id == *repo)
}
