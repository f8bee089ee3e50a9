use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use foodfeed_core::{
    classifier::Classifier,
    config::Config,
    enricher::Enricher,
    pipeline::TransactionPipeline,
    ports::FeedStore,
    sync::TransactionSync,
    webhook::{channel, WebhookDispatcher, WebhookWorker},
};
use foodfeed_places::PlacesClient;
use foodfeed_plaid::{PlaidClient, PlaidConfig};
use foodfeed_server::AppState;
use foodfeed_supabase::SupabaseStore;

#[tokio::main]
async fn main() -> Result<(), foodfeed_core::Error> {
    foodfeed_core::logging::init("foodfeed")?;

    let cfg = Config::load()?;

    let plaid = Arc::new(PlaidClient::new(PlaidConfig::from_config(&cfg))?);
    let store: Arc<dyn FeedStore> = Arc::new(SupabaseStore::new(
        &cfg.supabase_url,
        cfg.supabase_service_key.clone(),
        cfg.http_timeout,
    )?);

    let enricher = match &cfg.google_places_api_key {
        Some(key) => Enricher::new(Arc::new(PlacesClient::new(key.clone(), cfg.http_timeout)?))
            .with_max_concurrent_lookups(cfg.enrich_max_concurrency),
        None => {
            tracing::warn!("GOOGLE_PLACES_API_KEY not set; place enrichment disabled");
            Enricher::disabled()
        }
    };

    let classifier = Classifier::new(cfg.classifier_rules()?);
    tracing::info!(rules_version = classifier.rules_version(), "classifier ready");

    let pipeline = TransactionPipeline::new(classifier, enricher);
    let sync = TransactionSync::new(plaid.clone(), store.clone(), pipeline)
        .with_window_days(cfg.sync_window_days);
    let dispatcher = WebhookDispatcher::new(store.clone(), sync);

    let (queue, receiver) = channel(cfg.webhook_queue_capacity);
    let cancel = CancellationToken::new();
    let worker = tokio::spawn(
        WebhookWorker::new(dispatcher, receiver)
            .with_max_in_flight(cfg.webhook_workers)
            .run(cancel.clone()),
    );

    let state = AppState {
        queue,
        link: plaid,
        store,
    };
    let served = foodfeed_server::serve(cfg.bind_addr, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
        tracing::info!("shutdown requested");
    })
    .await;

    cancel.cancel();
    match worker.await {
        Ok(stats) => tracing::info!(
            dispatched = stats.dispatched,
            failed = stats.failed,
            "webhook worker drained"
        ),
        Err(e) => tracing::error!(error = %e, "webhook worker panicked"),
    }

    served.map_err(|e| foodfeed_core::Error::External(format!("http server failed: {e}")))
}
