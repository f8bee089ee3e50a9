//! Plaid adapter.
//!
//! Implements the `foodfeed-core` provider ports over the Plaid REST API
//! (`/transactions/get`, `/link/token/create`, `/item/public_token/exchange`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use foodfeed_core::{
    config::Config,
    domain::{TransactionRecord, UserId},
    errors::Error,
    ports::{LinkProvider, TokenExchange, TransactionProvider},
    Result,
};

#[derive(Clone, Debug)]
pub struct PlaidConfig {
    pub base_url: String,
    pub client_id: String,
    pub secret: String,
    pub client_name: String,
    pub webhook_url: Option<String>,
    pub page_size: u32,
    pub max_pages: u32,
    pub timeout: Duration,
}

impl PlaidConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            base_url: cfg.plaid_env.base_url().to_string(),
            client_id: cfg.plaid_client_id.clone(),
            secret: cfg.plaid_secret.clone(),
            client_name: cfg.plaid_client_name.clone(),
            webhook_url: cfg.plaid_webhook_url.clone(),
            page_size: cfg.plaid_page_size,
            max_pages: cfg.plaid_max_pages,
            timeout: cfg.http_timeout,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlaidClient {
    cfg: PlaidConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TransactionsPage {
    #[serde(default)]
    transactions: Vec<Value>,
    #[serde(default)]
    total_transactions: usize,
}

#[derive(Deserialize)]
struct LinkTokenResponse {
    link_token: String,
}

#[derive(Deserialize)]
struct ExchangeResponse {
    access_token: String,
    item_id: String,
}

#[derive(Deserialize)]
struct PlaidErrorBody {
    #[serde(default)]
    error_type: String,
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    error_message: String,
}

impl PlaidClient {
    pub fn new(cfg: PlaidConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::Provider(format!("plaid http client build failed: {e}")))?;
        Ok(Self { cfg, http })
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, mut body: Value) -> Result<T> {
        body["client_id"] = Value::String(self.cfg.client_id.clone());
        body["secret"] = Value::String(self.cfg.secret.clone());

        let resp = self
            .http
            .post(format!("{}{path}", self.cfg.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("plaid request error on {path}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Provider(describe_failure(path, status.as_u16(), &text)));
        }

        resp.json::<T>()
            .await
            .map_err(|e| Error::Provider(format!("plaid json error on {path}: {e}")))
    }
}

fn describe_failure(path: &str, status: u16, body: &str) -> String {
    match serde_json::from_str::<PlaidErrorBody>(body) {
        Ok(e) if !e.error_code.is_empty() => format!(
            "plaid {path} failed: {status} {}/{}: {}",
            e.error_type, e.error_code, e.error_message
        ),
        _ => format!(
            "plaid {path} failed: {status} {}",
            body.chars().take(200).collect::<String>()
        ),
    }
}

/// Decode a page leniently. Odd field shapes decode as absent; only records
/// without a usable `transaction_id` are logged and dropped.
fn decode_page(raw: Vec<Value>) -> Vec<TransactionRecord> {
    raw.into_iter()
        .filter_map(|v| {
            let id = v
                .get("transaction_id")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string();
            match serde_json::from_value::<TransactionRecord>(v) {
                Ok(tx) => Some(tx),
                Err(e) => {
                    tracing::warn!(transaction_id = %id, error = %e, "skipping malformed transaction");
                    None
                }
            }
        })
        .collect()
}

fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl TransactionProvider for PlaidClient {
    async fn fetch_transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TransactionRecord>> {
        let mut out = Vec::new();
        let mut offset = 0usize;
        let mut total = 0usize;

        for _ in 0..self.cfg.max_pages {
            let page: TransactionsPage = self
                .post(
                    "/transactions/get",
                    json!({
                        "access_token": access_token,
                        "start_date": format_date(start),
                        "end_date": format_date(end),
                        "options": { "count": self.cfg.page_size, "offset": offset },
                    }),
                )
                .await?;

            total = page.total_transactions;
            let received = page.transactions.len();
            offset += received;
            out.extend(decode_page(page.transactions));

            if received == 0 || offset >= total {
                return Ok(out);
            }
        }

        tracing::warn!(
            fetched = offset,
            total,
            max_pages = self.cfg.max_pages,
            "transaction fetch truncated at page limit"
        );
        Ok(out)
    }
}

#[async_trait]
impl LinkProvider for PlaidClient {
    async fn create_link_token(&self, user_id: &UserId) -> Result<String> {
        let mut body = json!({
            "user": { "client_user_id": user_id.0 },
            "client_name": self.cfg.client_name,
            "products": ["transactions"],
            "country_codes": ["US"],
            "language": "en",
        });
        if let Some(url) = &self.cfg.webhook_url {
            body["webhook"] = Value::String(url.clone());
        }

        let resp: LinkTokenResponse = self.post("/link/token/create", body).await?;
        Ok(resp.link_token)
    }

    async fn exchange_public_token(&self, public_token: &str) -> Result<TokenExchange> {
        let resp: ExchangeResponse = self
            .post(
                "/item/public_token/exchange",
                json!({ "public_token": public_token }),
            )
            .await?;
        Ok(TokenExchange {
            access_token: resp.access_token,
            item_id: resp.item_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn partially_malformed_records_are_kept() {
        let page = vec![
            json!({ "transaction_id": "t1", "name": "Sushi Zen", "amount": 18.2, "date": "2024-05-01",
                    "category": ["Food and Drink", "Restaurants"], "pending": false, "account_id": "a" }),
            json!({ "transaction_id": "t2", "name": "Taco Town", "amount": "not a number",
                    "category": null, "merchant_category_code": 5814 }),
            json!({ "name": "no id", "amount": 1, "date": "2024-05-01" }),
            json!({ "transaction_id": 42, "name": "numeric id" }),
        ];
        let out = decode_page(page);
        let ids: Vec<_> = out.iter().map(|t| t.transaction_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);

        assert_eq!(out[0].amount, Some(Decimal::new(182, 1)));
        assert_eq!(out[0].extra["account_id"], "a");

        assert_eq!(out[1].amount, None);
        assert_eq!(out[1].date, None);
        assert_eq!(out[1].category, None);
        assert_eq!(out[1].merchant_category_code.as_deref(), Some("5814"));
    }

    #[test]
    fn error_body_is_summarized() {
        let body = r#"{"error_type":"ITEM_ERROR","error_code":"ITEM_LOGIN_REQUIRED","error_message":"login required"}"#;
        assert_eq!(
            describe_failure("/transactions/get", 400, body),
            "plaid /transactions/get failed: 400 ITEM_ERROR/ITEM_LOGIN_REQUIRED: login required"
        );
        assert_eq!(
            describe_failure("/transactions/get", 502, "bad gateway"),
            "plaid /transactions/get failed: 502 bad gateway"
        );
    }

    #[test]
    fn dates_use_iso_format() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(format_date(d), "2024-03-02");
    }
}
