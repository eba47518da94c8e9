// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-repository FIFO queues.
//!
//! At most one event per repository is in flight; the others wait in arrival
//! order. Events for different repositories are independent.

use super::manager::SyncEvent;
use crate::ownership::RepoIdentity;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

#[derive(Default)]
pub struct KeyedQueue {
    /// A key is present while an event for it is in flight
    queues: HashMap<RepoIdentity, VecDeque<SyncEvent>>,
}

impl KeyedQueue {
    /// Queue `event`, returning it back when it can start right away
    pub fn push(&mut self, event: SyncEvent) -> Option<SyncEvent> {
        match self.queues.entry(event.identity()) {
            Entry::Occupied(mut waiting) => {
                waiting.get_mut().push_back(event);
                None
            }
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::new());
                Some(event)
            }
        }
    }

    /// Mark the in-flight event for `identity` done and return the next one
    pub fn complete(&mut self, identity: &RepoIdentity) -> Option<SyncEvent> {
        let waiting = self.queues.get_mut(identity)?;
        match waiting.pop_front() {
            Some(next) => Some(next),
            None => {
                self.queues.remove(identity);
                None
            }
        }
    }

    /// Number of repositories with an event in flight
    pub fn active(&self) -> usize {
        self.queues.len()
    }

    /// Number of events waiting behind an in-flight one
    pub fn waiting(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_idle(&self) -> bool {
        self.queues.is_empty()
    }
}
