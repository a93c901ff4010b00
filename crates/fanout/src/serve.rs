// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `fanout serve` command implementation.
//!
//! Opens the database, starts the dispatch scheduler and the HTTP API, and
//! runs both until SIGTERM/SIGINT. The scheduler and the webhook handlers
//! share one database handle; compare-and-swap transitions keep their
//! concurrent writes safe.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fanout_config::model::WhatsAppConfig;
use fanout_config::FanoutConfig;
use fanout_core::types::ChannelCredential;
use fanout_core::{ChannelClient, FanoutError};
use fanout_dispatcher::{ClientFactory, Scheduler};
use fanout_whatsapp::WhatsAppClient;

use crate::engine::Engine;
use crate::http::{self, AppState};

/// Builds a WhatsApp Cloud API client per business credential.
struct WhatsAppClientFactory {
    whatsapp: WhatsAppConfig,
    send_timeout: Duration,
}

impl ClientFactory for WhatsAppClientFactory {
    fn client_for(
        &self,
        credential: &ChannelCredential,
    ) -> Result<Arc<dyn ChannelClient>, FanoutError> {
        Ok(Arc::new(WhatsAppClient::new(
            &self.whatsapp,
            credential,
            self.send_timeout,
        )?))
    }
}

/// Runs the `fanout serve` command until a shutdown signal arrives.
pub async fn run_serve(config: FanoutConfig) -> Result<(), FanoutError> {
    init_tracing(&config.engine.log_level);

    info!(
        name = %config.engine.name,
        database = %config.storage.database_path,
        "starting fanout"
    );
    if config.whatsapp.app_secret.is_none() {
        warn!("webhook signature verification disabled: no whatsapp.app_secret configured");
    }

    let engine = Engine::new(config.clone()).await?;
    let db = engine.database().clone();

    let factory = Arc::new(WhatsAppClientFactory {
        whatsapp: config.whatsapp.clone(),
        send_timeout: Duration::from_secs(config.dispatcher.send_timeout_secs),
    });
    let scheduler = Scheduler::new(db.clone(), config.dispatcher.clone(), factory);

    let cancel = install_signal_handler();
    let scheduler_cancel = cancel.clone();
    let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_cancel).await });

    let state = AppState {
        engine: Arc::new(engine),
        whatsapp: config.whatsapp.clone(),
    };
    let result = http::start_server(&config.http, state, cancel.clone()).await;

    // Server is down (signal or bind failure); stop the scheduler too.
    cancel.cancel();
    match scheduler_task.await {
        Ok(Ok(())) => debug!("scheduler stopped"),
        Ok(Err(e)) => error!(error = %e, "scheduler exited with error"),
        Err(e) => error!(error = %e, "scheduler task panicked"),
    }

    if let Err(e) = db.close().await {
        warn!(error = %e, "database close failed");
    }

    result
}

/// Installs handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] cancelled when either signal arrives.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
    });

    token
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fanout={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
