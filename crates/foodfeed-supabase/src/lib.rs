//! Supabase (PostgREST) store adapter.
//!
//! Tables: `plaid_items`, `transactions` (raw, unique on `plaid_transaction_id`)
//! and `feed_items`. Schema management lives elsewhere.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{header, Method, RequestBuilder, Response};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use foodfeed_core::{
    domain::{FeedItem, LinkedItem, RawTransactionRow, UserId},
    errors::Error,
    ports::FeedStore,
    Result,
};

const ITEMS: &str = "plaid_items";
const TRANSACTIONS: &str = "transactions";
const FEED_ITEMS: &str = "feed_items";
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone, Debug)]
pub struct SupabaseStore {
    rest_url: String,
    service_key: String,
    http: reqwest::Client,
}

/// Column layout of the raw `transactions` table.
#[derive(Serialize)]
struct RawTransactionInsert<'a> {
    user_id: &'a str,
    plaid_transaction_id: &'a str,
    merchant_name: Option<&'a str>,
    amount: Option<Decimal>,
    transaction_date: Option<NaiveDate>,
    category: Option<&'a str>,
    raw_data: &'a Value,
}

#[derive(Deserialize)]
struct IdRow {
    id: Value,
}

#[derive(Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl SupabaseStore {
    pub fn new(
        supabase_url: &str,
        service_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Store(format!("supabase http client build failed: {e}")))?;
        Ok(Self {
            rest_url: format!("{}/rest/v1", supabase_url.trim_end_matches('/')),
            service_key: service_key.into(),
            http,
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{table}", self.rest_url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header(header::ACCEPT, "application/json")
    }

    async fn send(&self, what: &str, req: RequestBuilder) -> Result<Response> {
        self.execute(what, req).await.map_err(Error::from)
    }

    async fn execute(
        &self,
        what: &str,
        req: RequestBuilder,
    ) -> std::result::Result<Response, Rejection> {
        let resp = req.send().await.map_err(|e| {
            Rejection::Transport(format!("supabase {what} request error: {e}"))
        })?;
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(rejection(what, status, &body))
    }

    async fn rows<T: DeserializeOwned>(&self, what: &str, resp: Response) -> Result<Vec<T>> {
        resp.json::<Vec<T>>()
            .await
            .map_err(|e| Error::Store(format!("supabase {what} json error: {e}")))
    }
}

fn eq(v: &str) -> String {
    format!("eq.{v}")
}

/// PostgREST `in.(...)` filter with every value double-quoted.
fn in_list(values: &[String]) -> String {
    let quoted = values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({quoted})")
}

/// A failed PostgREST call, keeping the Postgres error code when one was sent.
#[derive(Debug)]
enum Rejection {
    Transport(String),
    Refused {
        what: String,
        status: u16,
        code: Option<String>,
        detail: String,
    },
}

impl Rejection {
    fn is_unique_violation(&self) -> bool {
        matches!(self, Rejection::Refused { code: Some(c), .. } if c == UNIQUE_VIOLATION)
    }
}

impl From<Rejection> for Error {
    fn from(r: Rejection) -> Self {
        match r {
            Rejection::Transport(msg) => Error::Store(msg),
            Rejection::Refused {
                what,
                status,
                code,
                detail,
            } => Error::Store(match code {
                Some(code) => format!("supabase {what} failed: {status} {code} {detail}"),
                None => format!("supabase {what} failed: {status} {detail}"),
            }),
        }
    }
}

fn rejection(what: &str, status: u16, body: &str) -> Rejection {
    let (code, detail) = match serde_json::from_str::<PostgrestError>(body) {
        Ok(e) if !e.code.is_empty() => (Some(e.code), e.message),
        _ => (None, body.chars().take(200).collect()),
    };
    Rejection::Refused {
        what: what.to_string(),
        status,
        code,
        detail,
    }
}

#[async_trait]
impl FeedStore for SupabaseStore {
    async fn find_linked_item(&self, item_id: &str) -> Result<Option<LinkedItem>> {
        let req = self.request(Method::GET, ITEMS).query(&[
            ("select", "item_id,user_id,access_token,status,error".to_string()),
            ("item_id", eq(item_id)),
            ("limit", "1".to_string()),
        ]);
        let resp = self.send("item lookup", req).await?;
        let mut rows: Vec<LinkedItem> = self.rows("item lookup", resp).await?;
        Ok(rows.pop())
    }

    async fn insert_linked_item(&self, item: &LinkedItem) -> Result<()> {
        let req = self
            .request(Method::POST, ITEMS)
            .header("Prefer", "return=minimal")
            .json(item);
        self.send("item insert", req).await?;
        Ok(())
    }

    async fn mark_item_error(&self, item_id: &str, error: Option<&Value>) -> Result<()> {
        let req = self
            .request(Method::PATCH, ITEMS)
            .query(&[("item_id", eq(item_id))])
            .header("Prefer", "return=minimal")
            .json(&json!({ "status": "ERROR", "error": error }));
        self.send("item status update", req).await?;
        Ok(())
    }

    async fn upsert_raw_transaction(&self, row: &RawTransactionRow) -> Result<()> {
        let body = RawTransactionInsert {
            user_id: &row.user_id.0,
            plaid_transaction_id: &row.provider_transaction_id,
            merchant_name: row.merchant_name.as_deref(),
            amount: row.amount,
            transaction_date: row.transaction_date,
            category: row.category.as_deref(),
            raw_data: &row.raw_data,
        };
        let req = self
            .request(Method::POST, TRANSACTIONS)
            .query(&[("on_conflict", "plaid_transaction_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&body);
        self.send("transaction upsert", req).await?;
        Ok(())
    }

    async fn delete_raw_transactions(&self, user_id: &UserId, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let req = self
            .request(Method::DELETE, TRANSACTIONS)
            .query(&[
                ("plaid_transaction_id", in_list(ids)),
                ("user_id", eq(&user_id.0)),
                ("select", "id".to_string()),
            ])
            .header("Prefer", "return=representation");
        let resp = self.send("transaction delete", req).await?;
        let deleted: Vec<IdRow> = self.rows("transaction delete", resp).await?;
        Ok(deleted.len() as u64)
    }

    async fn find_feed_item(&self, transaction_id: &str) -> Result<Option<String>> {
        let req = self.request(Method::GET, FEED_ITEMS).query(&[
            ("select", "id".to_string()),
            ("transaction_id", eq(transaction_id)),
            ("limit", "1".to_string()),
        ]);
        let resp = self.send("feed lookup", req).await?;
        let rows: Vec<IdRow> = self.rows("feed lookup", resp).await?;
        Ok(rows.into_iter().next().map(|r| match r.id {
            Value::String(s) => s,
            other => other.to_string(),
        }))
    }

    async fn insert_feed_item(&self, item: &FeedItem) -> Result<()> {
        let req = self
            .request(Method::POST, FEED_ITEMS)
            .header("Prefer", "return=minimal")
            .json(item);
        match self.execute("feed insert", req).await {
            Ok(_) => Ok(()),
            // Another delivery inserted it first.
            Err(r) if r.is_unique_violation() => {
                tracing::debug!(transaction_id = %item.transaction_id, "feed item already present");
                Ok(())
            }
            Err(r) => Err(r.into()),
        }
    }
}
