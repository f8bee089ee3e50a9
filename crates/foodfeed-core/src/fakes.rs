//! In-memory port implementations shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::{
    domain::{FeedItem, ItemStatus, LinkedItem, RawTransactionRow, TransactionRecord, UserId},
    ports::{
        FeedStore, Geometry, LatLng, PlaceCandidate, PlaceLookup, PlacePhoto, PlaceSearch,
        TransactionProvider,
    },
    Error, Result,
};

pub fn record(id: &str, name: &str) -> TransactionRecord {
    TransactionRecord {
        transaction_id: id.to_string(),
        merchant_name: None,
        name: Some(name.to_string()),
        amount: Some(Decimal::new(1250, 2)),
        date: NaiveDate::from_ymd_opt(2024, 5, 1),
        merchant_category_code: None,
        category: None,
        pending: false,
        extra: Map::new(),
    }
}

pub fn user(id: &str) -> UserId {
    UserId(id.to_string())
}

pub fn linked(item_id: &str, user_id: &str) -> LinkedItem {
    LinkedItem {
        item_id: item_id.to_string(),
        user_id: user(user_id),
        access_token: format!("access-{item_id}"),
        status: ItemStatus::Active,
        error: None,
    }
}

enum PlaceBehavior {
    Hit {
        place_id: String,
        photo: Option<String>,
    },
    Fail,
}

#[derive(Default)]
pub struct FakePlaces {
    behaviors: Mutex<HashMap<String, PlaceBehavior>>,
    delays: Mutex<HashMap<String, Duration>>,
    queries: Mutex<Vec<String>>,
}

impl FakePlaces {
    pub fn hit(&self, query: &str, place_id: &str, photo: Option<&str>) {
        self.behaviors.lock().unwrap().insert(
            query.to_string(),
            PlaceBehavior::Hit {
                place_id: place_id.to_string(),
                photo: photo.map(str::to_string),
            },
        );
    }

    pub fn fail(&self, query: &str) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(query.to_string(), PlaceBehavior::Fail);
    }

    pub fn delay(&self, query: &str, d: Duration) {
        self.delays.lock().unwrap().insert(query.to_string(), d);
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaceLookup for FakePlaces {
    async fn find_place(&self, query: &str) -> Result<PlaceSearch> {
        self.queries.lock().unwrap().push(query.to_string());
        let delay = self.delays.lock().unwrap().get(query).copied();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let behaviors = self.behaviors.lock().unwrap();
        match behaviors.get(query) {
            Some(PlaceBehavior::Fail) => Err(Error::External("places unavailable".to_string())),
            Some(PlaceBehavior::Hit { place_id, photo }) => Ok(PlaceSearch {
                status: "OK".to_string(),
                candidates: vec![PlaceCandidate {
                    place_id: place_id.clone(),
                    name: Some(query.to_string()),
                    formatted_address: Some("1 Main St".to_string()),
                    geometry: Some(Geometry {
                        location: Some(LatLng {
                            lat: Some(1.0),
                            lng: Some(2.0),
                        }),
                    }),
                    photos: photo
                        .iter()
                        .map(|r| PlacePhoto {
                            photo_reference: r.clone(),
                        })
                        .collect(),
                }],
            }),
            None => Ok(PlaceSearch {
                status: "ZERO_RESULTS".to_string(),
                candidates: vec![],
            }),
        }
    }

    fn photo_url(&self, photo_reference: &str) -> Option<String> {
        Some(format!("photo://{photo_reference}"))
    }
}

#[derive(Default)]
pub struct FakeProvider {
    transactions: Mutex<Vec<TransactionRecord>>,
    failing: Mutex<bool>,
    calls: Mutex<Vec<(String, NaiveDate, NaiveDate)>>,
}

impl FakeProvider {
    pub fn with(transactions: Vec<TransactionRecord>) -> Self {
        Self {
            transactions: Mutex::new(transactions),
            ..Default::default()
        }
    }

    pub fn set_failing(&self, v: bool) {
        *self.failing.lock().unwrap() = v;
    }

    pub fn calls(&self) -> Vec<(String, NaiveDate, NaiveDate)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionProvider for FakeProvider {
    async fn fetch_transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TransactionRecord>> {
        self.calls
            .lock()
            .unwrap()
            .push((access_token.to_string(), start, end));
        if *self.failing.lock().unwrap() {
            return Err(Error::Provider("ITEM_LOGIN_REQUIRED".to_string()));
        }
        Ok(self.transactions.lock().unwrap().clone())
    }
}

/// In-memory store with per-key failure injection.
#[derive(Default)]
pub struct MemoryStore {
    pub items: Mutex<HashMap<String, LinkedItem>>,
    pub raw: Mutex<HashMap<String, RawTransactionRow>>,
    pub feed: Mutex<Vec<FeedItem>>,
    pub fail_item_lookup: Mutex<bool>,
    pub fail_feed_lookup: Mutex<HashSet<String>>,
    pub fail_feed_insert: Mutex<HashSet<String>>,
    pub fail_raw_upsert: Mutex<HashSet<String>>,
    mutations: AtomicUsize,
}

impl MemoryStore {
    pub fn with_item(item: LinkedItem) -> Self {
        let store = Self::default();
        store
            .items
            .lock()
            .unwrap()
            .insert(item.item_id.clone(), item);
        store
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn feed_ids(&self) -> Vec<String> {
        self.feed
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.transaction_id.clone())
            .collect()
    }

    pub fn raw_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.raw.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn put_raw(&self, row: RawTransactionRow) {
        self.raw
            .lock()
            .unwrap()
            .insert(row.provider_transaction_id.clone(), row);
    }

    fn touch(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn find_linked_item(&self, item_id: &str) -> Result<Option<LinkedItem>> {
        if *self.fail_item_lookup.lock().unwrap() {
            return Err(Error::Store("connection reset".to_string()));
        }
        Ok(self.items.lock().unwrap().get(item_id).cloned())
    }

    async fn insert_linked_item(&self, item: &LinkedItem) -> Result<()> {
        self.touch();
        self.items
            .lock()
            .unwrap()
            .insert(item.item_id.clone(), item.clone());
        Ok(())
    }

    async fn mark_item_error(&self, item_id: &str, error: Option<&Value>) -> Result<()> {
        self.touch();
        if let Some(item) = self.items.lock().unwrap().get_mut(item_id) {
            item.status = ItemStatus::Error;
            item.error = error.cloned();
        }
        Ok(())
    }

    async fn upsert_raw_transaction(&self, row: &RawTransactionRow) -> Result<()> {
        if self
            .fail_raw_upsert
            .lock()
            .unwrap()
            .contains(&row.provider_transaction_id)
        {
            return Err(Error::Store("upsert rejected".to_string()));
        }
        self.touch();
        self.put_raw(row.clone());
        Ok(())
    }

    async fn delete_raw_transactions(&self, user_id: &UserId, ids: &[String]) -> Result<u64> {
        self.touch();
        let mut raw = self.raw.lock().unwrap();
        let before = raw.len();
        raw.retain(|id, row| !(ids.contains(id) && &row.user_id == user_id));
        Ok((before - raw.len()) as u64)
    }

    async fn find_feed_item(&self, transaction_id: &str) -> Result<Option<String>> {
        if self.fail_feed_lookup.lock().unwrap().contains(transaction_id) {
            return Err(Error::Store("lookup timed out".to_string()));
        }
        let feed = self.feed.lock().unwrap();
        Ok(feed
            .iter()
            .position(|f| f.transaction_id == transaction_id)
            .map(|i| format!("feed-{i}")))
    }

    async fn insert_feed_item(&self, item: &FeedItem) -> Result<()> {
        if self
            .fail_feed_insert
            .lock()
            .unwrap()
            .contains(&item.transaction_id)
        {
            return Err(Error::Store("insert rejected".to_string()));
        }
        self.touch();
        self.feed.lock().unwrap().push(item.clone());
        Ok(())
    }
}
