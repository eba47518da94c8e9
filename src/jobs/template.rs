// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Merging of a user-supplied pod template fragment into a generated one.
//!
//! The merge is explicit per field. The controller owns the identity labels,
//! the restart policy and the name, image, command and args of every generated
//! container; everything else the user sets is carried over.

use super::non_empty;
use crate::constants::labels;
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use kube::api::ObjectMeta;

/// Merge `overrides` into `base`
pub fn merge(base: &PodTemplateSpec, overrides: &PodTemplateSpec) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: merge_metadata(base.metadata.as_ref(), overrides.metadata.as_ref()),
        spec: merge_pod_spec(base.spec.as_ref(), overrides.spec.as_ref()),
    }
}

fn is_identity_label(key: &str) -> bool {
    key == labels::REPO_NAME || key == labels::REPO_NAMESPACE
}

fn merge_metadata(base: Option<&ObjectMeta>, overrides: Option<&ObjectMeta>) -> Option<ObjectMeta> {
    if overrides.is_none() {
        return base.cloned();
    }

    let mut labels = overrides
        .and_then(|m| m.labels.clone())
        .unwrap_or_default();
    for (key, value) in base.and_then(|m| m.labels.as_ref()).into_iter().flatten() {
        if is_identity_label(key) || !labels.contains_key(key) {
            labels.insert(key.clone(), value.clone());
        }
    }

    let mut annotations = base
        .and_then(|m| m.annotations.clone())
        .unwrap_or_default();
    annotations.extend(
        overrides
            .and_then(|m| m.annotations.clone())
            .unwrap_or_default(),
    );

    if labels.is_empty() && annotations.is_empty() {
        return None;
    }

    Some(ObjectMeta {
        labels: (!labels.is_empty()).then_some(labels),
        annotations: (!annotations.is_empty()).then_some(annotations),
        ..Default::default()
    })
}

fn merge_pod_spec(base: Option<&PodSpec>, overrides: Option<&PodSpec>) -> Option<PodSpec> {
    let Some(overrides) = overrides else {
        return base.cloned();
    };
    let base = base.cloned().unwrap_or_default();

    // Affinity, tolerations, node selector, service account and the rest of
    // the pod-level fields are not generated, so they come from the override.
    let mut merged = overrides.clone();
    merged.restart_policy = base.restart_policy;
    merged.containers = merge_containers(base.containers, &overrides.containers);
    merged.volumes = concat(overrides.volumes.as_ref(), base.volumes);
    Some(merged)
}

/// Merge the override fragments into the generated containers.
///
/// A fragment applies to the generated container of the same name; an unnamed
/// fragment applies to the first generated container. Remaining fragments are
/// appended as sidecars.
fn merge_containers(base: Vec<Container>, overrides: &[Container]) -> Vec<Container> {
    let mut used = vec![false; overrides.len()];
    let mut merged = Vec::with_capacity(base.len() + overrides.len());

    for (index, container) in base.into_iter().enumerate() {
        let fragment = overrides.iter().enumerate().position(|(i, o)| {
            !used[i] && (o.name == container.name || (index == 0 && o.name.is_empty()))
        });
        match fragment {
            Some(i) => {
                used[i] = true;
                merged.push(merge_container(container, &overrides[i]));
            }
            None => merged.push(container),
        }
    }

    merged.extend(
        overrides
            .iter()
            .zip(used)
            .filter(|(_, used)| !used)
            .map(|(c, _)| c.clone()),
    );
    merged
}

fn merge_container(base: Container, fragment: &Container) -> Container {
    Container {
        name: base.name,
        image: base.image,
        command: base.command,
        args: base.args,
        env: concat(fragment.env.as_ref(), base.env),
        volume_mounts: concat(fragment.volume_mounts.as_ref(), base.volume_mounts),
        ..fragment.clone()
    }
}

/// User entries first, generated entries after
fn concat<T: Clone>(first: Option<&Vec<T>>, second: Option<Vec<T>>) -> Option<Vec<T>> {
    let mut items: Vec<T> = first.cloned().unwrap_or_default();
    items.extend(second.unwrap_or_default());
    non_empty(items)
}
