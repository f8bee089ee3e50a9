use std::sync::Arc;

use crate::{
    domain::{LinkedItem, WebhookEvent},
    ports::FeedStore,
    sync::{SyncReport, TransactionSync},
    Result,
};

/// Where an event goes, decided from its type and code alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookRoute {
    SyncTransactions,
    RemoveTransactions,
    RecordItemError,
    /// Known type, unknown code. The item is still resolved first.
    UnhandledCode,
    UnhandledType,
}

impl WebhookRoute {
    pub fn of(event: &WebhookEvent) -> Self {
        match (event.webhook_type.as_str(), event.webhook_code.as_str()) {
            ("TRANSACTIONS", "INITIAL_UPDATE" | "HISTORICAL_UPDATE" | "DEFAULT_UPDATE") => {
                Self::SyncTransactions
            }
            ("TRANSACTIONS", "TRANSACTIONS_REMOVED") => Self::RemoveTransactions,
            ("TRANSACTIONS", _) => Self::UnhandledCode,
            ("ITEM", "ERROR") => Self::RecordItemError,
            ("ITEM", _) => Self::UnhandledCode,
            _ => Self::UnhandledType,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Synced(SyncReport),
    Removed { count: u64 },
    ItemErrorRecorded,
    ItemNotFound,
    Unhandled,
}

/// Routes provider webhooks to the sync, removal and item-status handlers.
///
/// Holds no per-event state; every call stands alone.
#[derive(Clone)]
pub struct WebhookDispatcher {
    store: Arc<dyn FeedStore>,
    sync: TransactionSync,
}

impl WebhookDispatcher {
    pub fn new(store: Arc<dyn FeedStore>, sync: TransactionSync) -> Self {
        Self { store, sync }
    }

    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<DispatchOutcome> {
        tracing::info!(
            webhook_type = %event.webhook_type,
            webhook_code = %event.webhook_code,
            item_id = %event.item_id,
            "received webhook"
        );

        let route = WebhookRoute::of(event);
        if route == WebhookRoute::UnhandledType {
            tracing::info!(webhook_type = %event.webhook_type, "unhandled webhook type");
            return Ok(DispatchOutcome::Unhandled);
        }

        let Some(item) = self.resolve_item(&event.item_id).await else {
            return Ok(DispatchOutcome::ItemNotFound);
        };

        match route {
            WebhookRoute::SyncTransactions => {
                let report = self.sync.sync_user(&item.user_id, &item.access_token).await?;
                tracing::info!(
                    user_id = %item.user_id,
                    fetched = report.fetched,
                    food = report.food,
                    created = report.feed.created,
                    "completed transaction sync"
                );
                Ok(DispatchOutcome::Synced(report))
            }
            WebhookRoute::RemoveTransactions => self.remove_transactions(event, &item).await,
            WebhookRoute::RecordItemError => {
                self.store
                    .mark_item_error(&item.item_id, event.error.as_ref())
                    .await?;
                tracing::warn!(
                    item_id = %item.item_id,
                    user_id = %item.user_id,
                    "item marked as errored"
                );
                Ok(DispatchOutcome::ItemErrorRecorded)
            }
            WebhookRoute::UnhandledCode | WebhookRoute::UnhandledType => {
                tracing::info!(
                    webhook_type = %event.webhook_type,
                    webhook_code = %event.webhook_code,
                    "unhandled webhook code"
                );
                Ok(DispatchOutcome::Unhandled)
            }
        }
    }

    async fn resolve_item(&self, item_id: &str) -> Option<LinkedItem> {
        match self.store.find_linked_item(item_id).await {
            Ok(Some(item)) => Some(item),
            Ok(None) => {
                tracing::warn!(item_id, "webhook for unknown item");
                None
            }
            Err(e) => {
                tracing::error!(item_id, error = %e, "item lookup failed");
                None
            }
        }
    }

    /// Deletes raw rows only; feed items already shown stay as they are.
    async fn remove_transactions(
        &self,
        event: &WebhookEvent,
        item: &LinkedItem,
    ) -> Result<DispatchOutcome> {
        let ids = event.removed_transactions.as_deref().unwrap_or_default();
        if ids.is_empty() {
            return Ok(DispatchOutcome::Removed { count: 0 });
        }

        let count = self
            .store
            .delete_raw_transactions(&item.user_id, ids)
            .await?;
        tracing::info!(
            user_id = %item.user_id,
            requested = ids.len(),
            deleted = count,
            "removed transactions"
        );
        Ok(DispatchOutcome::Removed { count })
    }
}
