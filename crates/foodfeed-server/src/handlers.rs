use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use foodfeed_core::domain::{ItemStatus, LinkedItem, UserId, WebhookEvent};

use crate::AppState;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Deserialize)]
pub struct CreateLinkTokenRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExchangePublicTokenRequest {
    #[serde(default)]
    pub public_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn create_link_token(
    State(state): State<AppState>,
    Json(req): Json<CreateLinkTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(user_id) = non_blank(req.user_id) else {
        return Err(api_error(StatusCode::BAD_REQUEST, "user_id is required"));
    };

    match state.link.create_link_token(&UserId(user_id)).await {
        Ok(link_token) => Ok(Json(json!({ "link_token": link_token }))),
        Err(e) => {
            tracing::error!(error = %e, "creating link token failed");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create link token",
            ))
        }
    }
}

pub async fn exchange_public_token(
    State(state): State<AppState>,
    Json(req): Json<ExchangePublicTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(public_token), Some(user_id)) = (non_blank(req.public_token), non_blank(req.user_id))
    else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "public_token and user_id are required",
        ));
    };

    let exchange = state
        .link
        .exchange_public_token(&public_token)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "public token exchange failed");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to exchange public token",
            )
        })?;

    let item = LinkedItem {
        item_id: exchange.item_id,
        user_id: UserId(user_id),
        access_token: exchange.access_token,
        status: ItemStatus::Active,
        error: None,
    };
    state.store.insert_linked_item(&item).await.map_err(|e| {
        tracing::error!(item_id = %item.item_id, error = %e, "storing linked item failed");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to store access token",
        )
    })?;

    tracing::info!(item_id = %item.item_id, user_id = %item.user_id, "linked new item");
    Ok(Json(json!({ "success": true })))
}

/// Ack as soon as the event is queued; processing happens on the worker.
/// Any JSON body is accepted.
pub async fn webhook(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let event = WebhookEvent::from_payload(payload);
    let webhook_type = event.webhook_type.clone();
    let webhook_code = event.webhook_code.clone();

    if let Err(e) = state.queue.enqueue(event) {
        tracing::error!(%webhook_type, %webhook_code, error = %e, "webhook not queued");
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Failed to handle webhook",
        ));
    }

    tracing::debug!(%webhook_type, %webhook_code, "webhook queued");
    Ok(Json(json!({ "received": true })))
}
