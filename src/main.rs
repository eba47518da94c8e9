// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use apprepo_controller::config::Config;
use apprepo_controller::constants::OPERATOR_NAME;
use apprepo_controller::kubernetes::{wait_for_apprepository_crd, KubeStore};
use apprepo_controller::reconcilers::AppRepositoryReconciler;
use apprepo_controller::sync::SyncManager;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting {}", OPERATOR_NAME);

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: namespace={}, image={}, workers={}",
        config.management_namespace, config.sync_job.image, config.workers
    );

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for AppRepository CRD to become available...");
    wait_for_apprepository_crd(&client).await?;

    let token = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(token.clone()));

    // Create the sync manager and get a handle for the reconciler
    let store = Arc::new(KubeStore::new(client.clone()));
    let (sync_manager, sync_handle) = SyncManager::new(store, config, token.clone());
    let reconciler = AppRepositoryReconciler::new(client, sync_handle, token.clone());

    info!("Starting reconciler...");

    tokio::try_join!(sync_manager.run(), reconciler.run())?;

    if !token.is_cancelled() {
        warn!("Reconciler stopped unexpectedly");
    }
    info!("{} stopped", OPERATOR_NAME);
    Ok(())
}

async fn shutdown_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received");
    token.cancel();
}
