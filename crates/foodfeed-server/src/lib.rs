//! HTTP surface (axum).
//!
//! Webhook intake acknowledges as soon as the event is queued; account-linking
//! routes call straight through to the provider and store ports.

use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{
    routing::{get, post},
    Router,
};

use foodfeed_core::{
    ports::{FeedStore, LinkProvider},
    webhook::WebhookQueue,
};

pub mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub queue: WebhookQueue,
    pub link: Arc<dyn LinkProvider>,
    pub store: Arc<dyn FeedStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/plaid/create-link-token", post(handlers::create_link_token))
        .route("/api/plaid/exchange-public-token", post(handlers::exchange_public_token))
        .route("/api/plaid/webhook", post(handlers::webhook))
        .with_state(state)
}

pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "http server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("http server stopped");
    Ok(())
}
