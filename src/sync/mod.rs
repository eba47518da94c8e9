// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Event dispatch and the store mutations behind each event.

pub mod handlers;
pub mod manager;
pub mod queue;
pub mod retry;

pub use handlers::Handlers;
pub use manager::{SyncEvent, SyncManager, SyncManagerHandle};
pub use retry::{retry_with_backoff, RetryConfig};
