use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{FeedItem, LinkedItem, RawTransactionRow, TransactionRecord, UserId},
    Result,
};

/// Pull side of the aggregation provider.
#[async_trait]
pub trait TransactionProvider: Send + Sync {
    /// All transactions posted in `[start, end]` for one linked item.
    ///
    /// Implementations handle paging; records that fail to decode are dropped
    /// by the adapter rather than failing the whole fetch.
    async fn fetch_transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TransactionRecord>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenExchange {
    pub access_token: String,
    pub item_id: String,
}

/// Account-linking side of the provider. Only the HTTP surface uses this.
#[async_trait]
pub trait LinkProvider: Send + Sync {
    async fn create_link_token(&self, user_id: &UserId) -> Result<String>;
    async fn exchange_public_token(&self, public_token: &str) -> Result<TokenExchange>;
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(default)]
    pub location: Option<LatLng>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacePhoto {
    pub photo_reference: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceCandidate {
    pub place_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub photos: Vec<PlacePhoto>,
}

/// Text-search response: `status` is `"OK"` on a hit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceSearch {
    pub status: String,
    #[serde(default)]
    pub candidates: Vec<PlaceCandidate>,
}

impl PlaceSearch {
    pub fn first_hit(&self) -> Option<&PlaceCandidate> {
        if self.status != "OK" {
            return None;
        }
        self.candidates.first()
    }
}

#[async_trait]
pub trait PlaceLookup: Send + Sync {
    async fn find_place(&self, query: &str) -> Result<PlaceSearch>;

    /// Public URL for a photo reference returned by `find_place`, if one can
    /// be built.
    fn photo_url(&self, photo_reference: &str) -> Option<String>;
}

/// Persistent store port.
///
/// Lookups return `Ok(None)` when no row matches; `Err` is reserved for
/// transport or query failures.
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn find_linked_item(&self, item_id: &str) -> Result<Option<LinkedItem>>;
    async fn insert_linked_item(&self, item: &LinkedItem) -> Result<()>;
    async fn mark_item_error(&self, item_id: &str, error: Option<&Value>) -> Result<()>;

    /// Insert-or-update keyed by `provider_transaction_id`.
    async fn upsert_raw_transaction(&self, row: &RawTransactionRow) -> Result<()>;
    /// Returns the number of rows deleted.
    async fn delete_raw_transactions(&self, user_id: &UserId, ids: &[String]) -> Result<u64>;

    /// Returns the existing feed row id for `transaction_id`, if any.
    async fn find_feed_item(&self, transaction_id: &str) -> Result<Option<String>>;
    async fn insert_feed_item(&self, item: &FeedItem) -> Result<()>;
}
