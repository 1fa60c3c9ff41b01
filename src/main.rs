use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use hookfold::aggregation::AggregationEngine;
use hookfold::config::Config;
use hookfold::dispatch::Dispatcher;
use hookfold::notify::{HttpNotifier, LogNotifier, Notifier};
use hookfold::server::{build_app, AppState};
use hookfold::shutdown::ShutdownSignal;
use hookfold::storage::{JsonFileRepository, MemoryRepository, SubscriptionRepository};
use hookfold::subscription::SubscriptionStore;

#[tokio::main]
async fn main() {
    // 1. Initialize Logging
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    // 2. Load Configuration
    let config = Config::load().expect("Failed to load configuration");

    let root_secret = if config.webhook.root_secret.is_empty() {
        warn!("webhook.root_secret not set, defaulting to 'dev-secret'. DO NOT USE IN PRODUCTION.");
        "dev-secret".to_string()
    } else {
        config.webhook.root_secret.clone()
    };

    // 3. Subscription Storage
    let repository: Arc<dyn SubscriptionRepository> = match &config.storage.data_dir {
        Some(dir) => {
            Arc::new(JsonFileRepository::new(dir).expect("Failed to open data directory"))
        }
        None => {
            warn!("No storage.data_dir configured, subscriptions will not survive restarts");
            Arc::new(MemoryRepository::new())
        }
    };

    let store = Arc::new(SubscriptionStore::new(repository, root_secret));
    let loaded = store.load().await.expect("Failed to load subscriptions");
    info!(count = loaded, "Subscriptions loaded");

    // 4. Delivery Backend
    let notifier: Arc<dyn Notifier> = match config.delivery.mode.as_str() {
        "http" => {
            let url = config
                .delivery
                .url
                .clone()
                .expect("delivery.url is required for http mode");
            Arc::new(
                HttpNotifier::new(url)
                    .with_timeout(Duration::from_millis(config.delivery.timeout_ms))
                    .with_retries(config.delivery.retries),
            )
        }
        _ => Arc::new(LogNotifier::new()),
    };
    info!(backend = notifier.name(), "Delivery backend ready");

    // 5. Aggregation Engine
    let engine = match config.aggregation.window() {
        Some(window) => {
            info!(
                window_ms = window.as_millis() as u64,
                "Burst coalescing enabled"
            );
            Some(AggregationEngine::new(window, notifier.clone()))
        }
        None => {
            info!("Burst coalescing disabled, events are delivered one by one");
            None
        }
    };

    let dispatcher = Arc::new(Dispatcher::new(store.clone(), engine, notifier));

    // 6. Build Router and Serve
    let state = AppState::new(store, dispatcher.clone(), config.webhook.global_secret.clone());
    let app = build_app(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Hookfold listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listen address");

    let shutdown = ShutdownSignal::new();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
        .expect("Server error");

    let pending = dispatcher.pending_count().await;
    if pending > 0 {
        info!(
            pending,
            "Exiting with aggregations still open; they will not flush"
        );
    }
    info!("Shutdown complete");
}
