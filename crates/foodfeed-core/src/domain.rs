use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Application user id (opaque, owned by the auth layer).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A transaction as delivered by the aggregation provider.
///
/// Only the fields the ingester reasons about are typed; everything else is kept
/// verbatim in `extra` so the raw payload round-trips into storage.
///
/// Only `transaction_id` is required. A typed field holding a value of the
/// wrong shape decodes as absent instead of rejecting the record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub merchant_name: Option<String>,
    /// Raw statement description.
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    /// Provider sign convention: positive is money leaving the account.
    #[serde(default, deserialize_with = "lenient")]
    pub amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient")]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_code")]
    pub merchant_category_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_labels")]
    pub category: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub pending: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v = Value::deserialize(d)?;
    Ok(serde_json::from_value(v).ok())
}

/// Category codes sometimes arrive as bare numbers.
fn lenient_code<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Keeps the string labels of an array; anything else is no labels.
fn lenient_labels<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    })
}

fn lenient_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(matches!(Value::deserialize(d)?, Value::Bool(true)))
}

impl TransactionRecord {
    /// Merchant name, falling back to the raw description when it is missing
    /// or blank.
    pub fn display_name(&self) -> Option<&str> {
        self.merchant_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.name.as_deref())
    }

    /// Category labels flattened the way the raw table stores them.
    pub fn category_line(&self) -> Option<String> {
        self.category.as_ref().map(|c| c.join(", "))
    }

    /// Full provider payload, including fields we do not model.
    pub fn raw_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaceData {
    pub place_id: String,
    pub name: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub photo_url: Option<String>,
}

/// A food transaction, optionally decorated with place metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct EnrichedTransaction {
    pub transaction: TransactionRecord,
    pub place: Option<PlaceData>,
}

impl EnrichedTransaction {
    pub fn bare(transaction: TransactionRecord) -> Self {
        Self {
            transaction,
            place: None,
        }
    }
}

/// Row shape for the `feed_items` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub user_id: UserId,
    pub transaction_id: String,
    pub merchant_name: Option<String>,
    pub amount: Option<Decimal>,
    pub transaction_date: Option<NaiveDate>,
    pub place_id: Option<String>,
    pub place_name: Option<String>,
    pub place_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub photo_url: Option<String>,
    pub is_visible: bool,
    pub show_amount: bool,
}

impl FeedItem {
    /// New feed entry: visible, amount hidden until the user opts in.
    pub fn from_enriched(user_id: &UserId, tx: &EnrichedTransaction) -> Self {
        let place = tx.place.as_ref();
        Self {
            user_id: user_id.clone(),
            transaction_id: tx.transaction.transaction_id.clone(),
            merchant_name: tx.transaction.display_name().map(str::to_string),
            amount: tx.transaction.amount,
            transaction_date: tx.transaction.date,
            place_id: place.map(|p| p.place_id.clone()),
            place_name: place.and_then(|p| p.name.clone()),
            place_address: place.and_then(|p| p.address.clone()),
            latitude: place.and_then(|p| p.latitude),
            longitude: place.and_then(|p| p.longitude),
            photo_url: place.and_then(|p| p.photo_url.clone()),
            is_visible: true,
            show_amount: false,
        }
    }
}

/// Row shape for the raw `transactions` table, keyed by `provider_transaction_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawTransactionRow {
    pub user_id: UserId,
    pub provider_transaction_id: String,
    pub merchant_name: Option<String>,
    pub amount: Option<Decimal>,
    pub transaction_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub raw_data: Value,
}

impl RawTransactionRow {
    pub fn from_record(user_id: &UserId, tx: &TransactionRecord) -> Self {
        Self {
            user_id: user_id.clone(),
            provider_transaction_id: tx.transaction_id.clone(),
            merchant_name: tx.display_name().map(str::to_string),
            amount: tx.amount,
            transaction_date: tx.date,
            category: tx.category_line(),
            raw_data: tx.raw_payload(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemStatus {
    Active,
    Error,
}

/// A linked account connection at the provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkedItem {
    pub item_id: String,
    pub user_id: UserId,
    pub access_token: String,
    pub status: ItemStatus,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Inbound provider webhook payload.
///
/// Every field is optional and tolerant of odd shapes; routing treats an
/// empty type or code as unhandled.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(default, deserialize_with = "lenient_text")]
    pub webhook_type: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub webhook_code: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub item_id: String,
    #[serde(default, deserialize_with = "lenient_labels")]
    pub removed_transactions: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WebhookEvent {
    /// Any JSON body becomes an event; a non-object body is an empty one.
    pub fn from_payload(payload: Value) -> Self {
        serde_json::from_value(payload).unwrap_or_default()
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(lenient_code(d)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transaction_keeps_unknown_fields_for_raw_storage() {
        let tx: TransactionRecord = serde_json::from_value(json!({
            "transaction_id": "t1",
            "name": "SQ *JOES PIZZERIA",
            "amount": 23.5,
            "date": "2024-03-02",
            "account_id": "acc-9",
            "iso_currency_code": "USD"
        }))
        .unwrap();

        assert!(!tx.pending);
        assert_eq!(tx.amount, Some(Decimal::new(235, 1)));
        assert_eq!(tx.display_name(), Some("SQ *JOES PIZZERIA"));

        let raw = tx.raw_payload();
        assert_eq!(raw["account_id"], "acc-9");
        assert_eq!(raw["iso_currency_code"], "USD");
        assert_eq!(raw["transaction_id"], "t1");
    }

    #[test]
    fn feed_item_defaults_hide_amount() {
        let tx: TransactionRecord = serde_json::from_value(json!({
            "transaction_id": "t2",
            "merchant_name": "Blue Bottle",
            "name": "BLUE BOTTLE 0042",
            "amount": 6.25,
            "date": "2024-03-03"
        }))
        .unwrap();
        let enriched = EnrichedTransaction {
            transaction: tx,
            place: Some(PlaceData {
                place_id: "p1".to_string(),
                name: Some("Blue Bottle Coffee".to_string()),
                address: None,
                latitude: Some(37.77),
                longitude: Some(-122.42),
                photo_url: None,
            }),
        };

        let item = FeedItem::from_enriched(&UserId("u1".to_string()), &enriched);
        assert!(item.is_visible);
        assert!(!item.show_amount);
        assert_eq!(item.merchant_name.as_deref(), Some("Blue Bottle"));
        assert_eq!(item.place_id.as_deref(), Some("p1"));
        assert_eq!(item.latitude, Some(37.77));
    }

    #[test]
    fn raw_row_flattens_categories() {
        let tx: TransactionRecord = serde_json::from_value(json!({
            "transaction_id": "t3",
            "name": "Corner Deli",
            "amount": -4,
            "date": "2024-03-04",
            "category": ["Food and Drink", "Restaurants"]
        }))
        .unwrap();

        let row = RawTransactionRow::from_record(&UserId("u1".to_string()), &tx);
        assert_eq!(row.category.as_deref(), Some("Food and Drink, Restaurants"));
        assert_eq!(row.merchant_name.as_deref(), Some("Corner Deli"));
        assert_eq!(row.provider_transaction_id, "t3");
    }

    #[test]
    fn webhook_tolerates_missing_fields() {
        let ev: WebhookEvent =
            serde_json::from_value(json!({ "webhook_type": "AUTH", "environment": "sandbox" }))
                .unwrap();
        assert_eq!(ev.webhook_type, "AUTH");
        assert!(ev.webhook_code.is_empty());
        assert!(ev.removed_transactions.is_none());
        assert_eq!(ev.extra["environment"], "sandbox");
    }

    #[test]
    fn blank_merchant_name_falls_back_to_description() {
        let tx: TransactionRecord = serde_json::from_value(json!({
            "transaction_id": "t4",
            "merchant_name": "",
            "name": "Joe's Pizzeria",
            "amount": 9.75,
            "date": "2024-03-05"
        }))
        .unwrap();
        assert_eq!(tx.display_name(), Some("Joe's Pizzeria"));

        let row = RawTransactionRow::from_record(&UserId("u1".to_string()), &tx);
        assert_eq!(row.merchant_name.as_deref(), Some("Joe's Pizzeria"));
        let item = FeedItem::from_enriched(&UserId("u1".to_string()), &EnrichedTransaction::bare(tx));
        assert_eq!(item.merchant_name.as_deref(), Some("Joe's Pizzeria"));
    }

    #[test]
    fn odd_field_shapes_decode_as_absent() {
        let tx: TransactionRecord = serde_json::from_value(json!({
            "transaction_id": "t5",
            "merchant_name": null,
            "name": "Corner Deli",
            "amount": "n/a",
            "merchant_category_code": 5812,
            "category": ["Food and Drink", null, 3],
            "pending": null,
            "account_id": "acc-1"
        }))
        .unwrap();

        assert_eq!(tx.merchant_name, None);
        assert_eq!(tx.amount, None);
        assert_eq!(tx.date, None);
        assert_eq!(tx.merchant_category_code.as_deref(), Some("5812"));
        assert_eq!(tx.category, Some(vec!["Food and Drink".to_string()]));
        assert!(!tx.pending);
        assert_eq!(tx.extra["account_id"], "acc-1");

        let tx: TransactionRecord =
            serde_json::from_value(json!({ "transaction_id": "t6", "category": null })).unwrap();
        assert_eq!(tx.category, None);

        assert!(serde_json::from_value::<TransactionRecord>(json!({ "name": "no id" })).is_err());
    }

    #[test]
    fn webhook_payload_shapes_never_fail() {
        let ev = WebhookEvent::from_payload(json!({
            "webhook_type": null,
            "webhook_code": "DEFAULT_UPDATE",
            "item_id": 1234,
            "removed_transactions": "t1"
        }));
        assert_eq!(ev.webhook_type, "");
        assert_eq!(ev.item_id, "1234");
        assert_eq!(ev.removed_transactions, None);

        assert_eq!(WebhookEvent::from_payload(json!([1, 2])), WebhookEvent::default());
        assert_eq!(WebhookEvent::from_payload(json!("ping")), WebhookEvent::default());
    }
}
