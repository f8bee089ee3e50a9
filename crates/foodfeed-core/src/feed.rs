use std::sync::Arc;

use crate::{
    domain::{EnrichedTransaction, FeedItem, UserId},
    ports::FeedStore,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedReport {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Turns processed transactions into feed rows, at most one per transaction id.
#[derive(Clone)]
pub struct FeedMaterializer {
    store: Arc<dyn FeedStore>,
}

impl FeedMaterializer {
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self { store }
    }

    /// Runs serially; each insert is preceded by its own existence check.
    /// Failures are per transaction; the rest of the batch still runs.
    pub async fn create_feed_items(
        &self,
        user_id: &UserId,
        transactions: &[EnrichedTransaction],
    ) -> FeedReport {
        let mut report = FeedReport::default();

        for tx in transactions {
            let transaction_id = tx.transaction.transaction_id.as_str();

            match self.store.find_feed_item(transaction_id).await {
                Ok(Some(_)) => {
                    report.skipped += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        user_id = %user_id,
                        transaction_id,
                        error = %e,
                        "feed item lookup failed"
                    );
                    report.failed += 1;
                    continue;
                }
            }

            let item = FeedItem::from_enriched(user_id, tx);
            match self.store.insert_feed_item(&item).await {
                Ok(()) => report.created += 1,
                Err(e) => {
                    tracing::error!(
                        user_id = %user_id,
                        transaction_id,
                        error = %e,
                        "feed item insert failed"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            user_id = %user_id,
            total = transactions.len(),
            created = report.created,
            skipped = report.skipped,
            failed = report.failed,
            "feed items materialized"
        );
        report
    }
}
