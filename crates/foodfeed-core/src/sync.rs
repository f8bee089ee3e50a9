use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};

use crate::{
    domain::{RawTransactionRow, UserId},
    feed::{FeedMaterializer, FeedReport},
    pipeline::TransactionPipeline,
    ports::{FeedStore, TransactionProvider},
    Result,
};

pub const DEFAULT_WINDOW_DAYS: u32 = 90;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: usize,
    pub stored: usize,
    pub store_failures: usize,
    pub food: usize,
    pub feed: FeedReport,
}

/// Pull a user's recent transactions, persist them raw, and feed the food ones
/// through the pipeline.
#[derive(Clone)]
pub struct TransactionSync {
    provider: Arc<dyn TransactionProvider>,
    store: Arc<dyn FeedStore>,
    pipeline: TransactionPipeline,
    feed: FeedMaterializer,
    window_days: u32,
}

impl TransactionSync {
    pub fn new(
        provider: Arc<dyn TransactionProvider>,
        store: Arc<dyn FeedStore>,
        pipeline: TransactionPipeline,
    ) -> Self {
        Self {
            provider,
            feed: FeedMaterializer::new(store.clone()),
            store,
            pipeline,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }

    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = days;
        self
    }

    pub async fn sync_user(&self, user_id: &UserId, access_token: &str) -> Result<SyncReport> {
        self.sync_user_at(user_id, access_token, Utc::now().date_naive())
            .await
    }

    pub(crate) async fn sync_user_at(
        &self,
        user_id: &UserId,
        access_token: &str,
        today: NaiveDate,
    ) -> Result<SyncReport> {
        let (start, end) = trailing_window(today, self.window_days);
        let transactions = self
            .provider
            .fetch_transactions(access_token, start, end)
            .await?;

        tracing::info!(
            user_id = %user_id,
            count = transactions.len(),
            %start,
            %end,
            "fetched transactions from provider"
        );

        let mut report = SyncReport {
            fetched: transactions.len(),
            ..Default::default()
        };

        for tx in &transactions {
            let row = RawTransactionRow::from_record(user_id, tx);
            match self.store.upsert_raw_transaction(&row).await {
                Ok(()) => report.stored += 1,
                Err(e) => {
                    tracing::error!(
                        user_id = %user_id,
                        transaction_id = %tx.transaction_id,
                        error = %e,
                        "storing raw transaction failed"
                    );
                    report.store_failures += 1;
                }
            }
        }

        let processed = self.pipeline.process(&transactions).await;
        report.food = processed.len();
        tracing::info!(
            user_id = %user_id,
            food = report.food,
            total = report.fetched,
            "filtered food transactions"
        );

        report.feed = self.feed.create_feed_items(user_id, &processed).await;
        Ok(report)
    }
}

/// `[today - days, today]`, inclusive on both ends.
pub fn trailing_window(today: NaiveDate, days: u32) -> (NaiveDate, NaiveDate) {
    let start = today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN);
    (start, today)
}
