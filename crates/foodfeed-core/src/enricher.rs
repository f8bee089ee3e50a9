use std::sync::Arc;

use futures::{future::join_all, stream, StreamExt};

use crate::{
    domain::{EnrichedTransaction, PlaceData, TransactionRecord},
    ports::PlaceLookup,
};

/// Best-effort place enrichment.
///
/// Lookup failures never escape: the transaction is passed through without
/// place data and the failure is logged.
#[derive(Clone)]
pub struct Enricher {
    lookup: Option<Arc<dyn PlaceLookup>>,
    max_concurrent_lookups: Option<usize>,
}

impl Enricher {
    pub fn new(lookup: Arc<dyn PlaceLookup>) -> Self {
        Self {
            lookup: Some(lookup),
            max_concurrent_lookups: None,
        }
    }

    /// Pass-through enricher for deployments without a place lookup key.
    pub fn disabled() -> Self {
        Self {
            lookup: None,
            max_concurrent_lookups: None,
        }
    }

    /// Cap the number of in-flight lookups per batch. `None` means unbounded.
    pub fn with_max_concurrent_lookups(mut self, limit: Option<usize>) -> Self {
        self.max_concurrent_lookups = limit.filter(|n| *n > 0);
        self
    }

    pub async fn enrich(&self, tx: TransactionRecord) -> EnrichedTransaction {
        let Some(lookup) = &self.lookup else {
            return EnrichedTransaction::bare(tx);
        };

        let query = match tx.display_name().map(str::trim) {
            Some(q) if !q.is_empty() => q.to_string(),
            _ => return EnrichedTransaction::bare(tx),
        };

        let search = match lookup.find_place(&query).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(
                    transaction_id = %tx.transaction_id,
                    query = %query,
                    error = %e,
                    "place lookup failed"
                );
                return EnrichedTransaction::bare(tx);
            }
        };

        let Some(place) = search.first_hit() else {
            match search.status.as_str() {
                "OK" | "ZERO_RESULTS" => tracing::debug!(
                    transaction_id = %tx.transaction_id,
                    status = %search.status,
                    "no place match"
                ),
                // REQUEST_DENIED, OVER_QUERY_LIMIT and friends.
                _ => tracing::warn!(
                    transaction_id = %tx.transaction_id,
                    status = %search.status,
                    "place lookup rejected"
                ),
            }
            return EnrichedTransaction::bare(tx);
        };

        let photo_url = place
            .photos
            .first()
            .and_then(|p| lookup.photo_url(&p.photo_reference));
        let location = place.geometry.as_ref().and_then(|g| g.location.as_ref());

        let data = PlaceData {
            place_id: place.place_id.clone(),
            name: place.name.clone(),
            address: place.formatted_address.clone(),
            latitude: location.and_then(|l| l.lat),
            longitude: location.and_then(|l| l.lng),
            photo_url,
        };

        EnrichedTransaction {
            transaction: tx,
            place: Some(data),
        }
    }

    /// Enrich a batch concurrently, waiting for every lookup. Output order
    /// matches input order.
    pub async fn enrich_all(&self, transactions: Vec<TransactionRecord>) -> Vec<EnrichedTransaction> {
        match self.max_concurrent_lookups {
            None => join_all(transactions.into_iter().map(|tx| self.enrich(tx))).await,
            Some(limit) => {
                stream::iter(transactions)
                    .map(|tx| self.enrich(tx))
                    .buffered(limit)
                    .collect()
                    .await
            }
        }
    }
}
