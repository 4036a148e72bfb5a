//! Keeper Server
//!
//! `keeperd` stores envelope-encrypted secrets for authenticated users:
//! login/password pairs, payment cards, free-form notes, and chunked binary
//! blobs. Metadata lives in SQLite, binary chunks in an S3-compatible object
//! store, and every payload is encrypted under a per-secret data key wrapped
//! by the master key before it reaches either.

mod api;
mod auth;
mod config;
mod pipeline;
mod reaper;
mod state;
mod storage;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use keeper_core::crypto::{EnvelopeCipher, Kms};

use crate::auth::AuthService;
use crate::config::Args;
use crate::state::AppState;
use crate::storage::{MetadataStore, S3ObjectStore, S3Settings};

/// How long active requests and streams get to drain on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&args.log_level)
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(err) = run(args).await {
        tracing::error!(error = %err, "server failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> keeper_core::Result<()> {
    // ── Key Material ──────────────────────────────────────────────────────
    let kms = Arc::new(Kms::load(&args.master_key, &args.encrypted_key)?);
    let cipher = Arc::new(EnvelopeCipher::new(kms));
    tracing::info!("encryption key unwrapped");

    // ── Stores ────────────────────────────────────────────────────────────
    let metadata = Arc::new(MetadataStore::open(&args.db_dsn)?);
    tracing::info!(dsn = %args.db_dsn, "metadata store ready");

    let objects = Arc::new(
        S3ObjectStore::connect(S3Settings {
            endpoint: args.s3_endpoint.clone(),
            access_key: args.s3_access_key.clone(),
            secret_key: args.s3_secret_key.clone(),
            region: args.s3_region.clone(),
            bucket: args.s3_bucket.clone(),
        })
        .await?,
    );
    tracing::info!(endpoint = %args.s3_endpoint, bucket = %args.s3_bucket, "object store ready");

    // ── Services ──────────────────────────────────────────────────────────
    let auth_service = Arc::new(AuthService::new(
        metadata.clone(),
        args.access_secret.as_bytes(),
        args.refresh_secret.as_bytes(),
    ));

    let state = AppState::new(metadata, objects, cipher, auth_service);

    reaper::spawn(state.clone(), args.reaper_interval_secs);

    // ── Serve ─────────────────────────────────────────────────────────────
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&args.address).await?;
    tracing::info!(address = %args.address, "keeperd listening");

    let shutdown = Arc::new(tokio::sync::Notify::new());
    let notify = shutdown.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown requested, draining active requests");
        notify.notify_waiters();
    });

    tokio::select! {
        result = async { server.await } => result.map_err(keeper_core::Error::Io)?,
        _ = async {
            shutdown.notified().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            tracing::warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "grace period elapsed, aborting active streams");
        }
    }

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::warn!(error = %err, "cannot install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
