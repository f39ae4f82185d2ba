//! Inbox Relay binary entrypoint: API server plus inbox poller sharing one delivery queue.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use relay_common::config::AppConfig;
use relay_notifier::{
    DeliveryQueue, QueueConfig, TwilioCredentials, TwilioLookup, TwilioNotifier,
};
use relay_poller::credentials;
use relay_poller::gmail::GmailSource;
use relay_poller::poller::InboxPoller;

use relay_api::routes::create_router;
use relay_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "relay_api=debug,relay_notifier=debug,relay_poller=info,tower_http=debug",
            )
        }))
        .init();

    tracing::info!("Starting Inbox Relay...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Gmail credentials must be in place before anything starts
    let (_client, token) =
        credentials::authorize(&config.gmail_credentials_path, &config.gmail_token_path)?;
    tracing::info!("Gmail credentials loaded");

    let http = reqwest::Client::new();
    let twilio = TwilioCredentials {
        account_sid: config.twilio_account_sid.clone(),
        auth_token: config.twilio_auth_token.clone(),
    };

    // Delivery queue over WhatsApp
    let notifier = Arc::new(TwilioNotifier::new(
        http.clone(),
        config.twilio_api_url.clone(),
        twilio.clone(),
        config.twilio_whatsapp_number.clone(),
        config.user_whatsapp_number.clone(),
    ));
    let queue_config = QueueConfig::from_millis(config.queue_base_delay_ms, config.queue_max_delay_ms);
    if queue_config.max_delay.is_none() {
        tracing::warn!("QUEUE_MAX_DELAY_MS not set, rate-limit backoff is unbounded");
    }
    let queue = DeliveryQueue::new(notifier, queue_config);

    // Inbox poller
    let shutdown = CancellationToken::new();
    let source = GmailSource::new(http.clone(), config.gmail_api_url.clone(), token.access_token);
    let mut poller = InboxPoller::new(source, queue.clone(), config.poll_interval_ms)
        .with_link_base(config.mail_link_base.clone());
    let poller_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { poller.run(shutdown).await })
    };

    // Build application state
    let verifier = Arc::new(TwilioLookup::new(http, config.twilio_lookup_url.clone(), twilio));
    let state = AppState::new(queue.clone(), verifier);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = poller_task.await {
        tracing::error!(error = %e, "Inbox poller task failed");
    }

    let snapshot = queue.snapshot();
    tracing::info!(
        pending = snapshot.pending,
        sent = snapshot.sent,
        dropped = snapshot.dropped,
        "Shutting down delivery queue"
    );
    queue.shutdown().await;

    tracing::info!("Inbox Relay stopped.");
    Ok(())
}
