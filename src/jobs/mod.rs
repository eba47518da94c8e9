// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Synthesis of the CronJob and Job objects generated for an AppRepository.
//!
//! Everything in here is pure: the same repository and configuration always
//! produce the same objects, which is what makes updating the schedule in
//! place idempotent.

pub mod credentials;
pub mod spec;
pub mod template;

pub use credentials::{inject, Injection};
pub use spec::{build_cleanup_run, build_run, build_schedule, schedule_differs};
pub use template::merge;

/// Collapse an empty list to `None`, the way the API server returns it
pub(crate) fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
