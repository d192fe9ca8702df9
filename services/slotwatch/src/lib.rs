//! Slotwatch - hospital reservation slot watcher
//!
//! Logs into the hospital portal with a headless browser, polls the
//! reservation schedule endpoint, and sends a Telegram message when new
//! appointment slots open up.

pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod notifier;
pub mod schedule;
pub mod session;
pub mod telegram;

pub use config::{load_config, Config};
pub use error::{Result, SlotwatchError};

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::io::ReqwestHttpClient;
use crate::notifier::Notifier;
use crate::schedule::AvailabilityClient;
use crate::session::ChromeSessionProvider;
use crate::telegram::TelegramNotifier;

/// Run the slotwatch service with the given configuration
pub async fn run(config: Config, once: bool) -> Result<()> {
    config.validate()?;

    let http: Arc<dyn io::HttpClient> = Arc::new(ReqwestHttpClient::default());
    let cancel = CancellationToken::new();

    let sessions = Arc::new(ChromeSessionProvider::new(&config.portal));
    let client = AvailabilityClient::new(
        &config.target,
        Duration::from_millis(config.poll.request_pause_ms),
        Arc::clone(&http),
    );

    // Build notifiers
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();
    for notifier_config in &config.notifiers {
        let notifier: Arc<dyn Notifier> = match notifier_config {
            config::NotifierConfig::Telegram { .. } => {
                Arc::new(TelegramNotifier::new(notifier_config, Arc::clone(&http)))
            }
        };
        notifiers.push(notifier);
    }
    if notifiers.is_empty() {
        tracing::info!("No notifiers configured; found dates will only be logged");
    }

    let mut engine = Engine::new(sessions, client, notifiers, &config, cancel.clone());

    if once {
        engine.cycle().await;
        return Ok(());
    }

    // Setup shutdown handler
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for ctrl-c");
        tracing::info!("Shutdown signal received");
        cancel_for_signal.cancel();
    });

    tracing::info!("Slotwatch engine started");

    // Run the engine (blocks until cancelled)
    engine.run().await;

    tracing::info!("Slotwatch engine stopped");
    Ok(())
}
