//! Food transaction classifier.
//!
//! A transaction is food-related when any of these hold, checked in order:
//! - its merchant category code is a food code
//! - one of its category labels is a food label
//! - its merchant/raw name contains a known food merchant
//! - its merchant/raw name contains a food keyword
//!
//! Pending transactions are always rejected; they are classified once they settle.

use std::{collections::HashSet, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{domain::TransactionRecord, Result};

const DEFAULT_CATEGORY_CODES: &[&str] = &[
    "5811", // caterers
    "5812", // eating places, restaurants
    "5813", // bars, taverns, nightclubs
    "5814", // fast food
    "5499", // convenience stores, specialty markets
    "5441", // candy, nut, confectionery
    "5462", // bakeries
    "5310", // discount stores
    "5411", // grocery stores, supermarkets
    "5422", // freezer and locker meat provisioners
    "5451", // dairy products
    "5309", // duty free
];

const DEFAULT_CATEGORY_LABELS: &[&str] = &[
    "food and drink",
    "restaurants",
    "coffee shop",
    "groceries",
    "alcohol and bars",
];

const DEFAULT_MERCHANT_WHITELIST: &[&str] = &[
    "starbucks", "mcdonald", "subway", "chipotle", "dunkin", "panera", "taco bell",
    "burger king", "wendy", "domino", "pizza hut", "kfc", "chick-fil-a", "popeyes",
    "shake shack", "five guys", "in-n-out", "whataburger", "dairy queen", "sonic",
    "panda express", "chili", "applebee", "olive garden", "outback", "red lobster",
    "cheesecake factory", "ihop", "denny", "waffle house", "cracker barrel",
    "whole foods", "trader joe", "kroger", "publix", "safeway", "albertsons",
    "costco", "walmart", "target", "7-eleven", "wawa", "sheetz", "quicktrip",
    "blue bottle", "philz", "peet", "tim horton", "jamba juice", "smoothie king",
    "sweetgreen", "just salad", "dig inn", "cava", "tender greens",
];

const DEFAULT_KEYWORDS: &[&str] = &[
    "restaurant", "cafe", "coffee", "bakery", "diner", "eatery", "grill", "pizzeria",
    "bistro", "steakhouse", "sushi", "taco", "burger", "sandwich", "food", "kitchen",
    "bar", "pub", "tavern", "brewery", "winery", "distillery", "cocktail",
    "grocery", "market", "supermarket", "deli", "convenience", "liquor", "wine", "beer",
    "donut", "bagel", "pastry", "dessert", "ice cream", "yogurt", "smoothie", "juice",
    "bbq", "barbecue", "seafood", "thai", "chinese", "italian", "mexican", "indian",
    "fast food", "takeout", "delivery", "catering",
];

/// Data that drives classification.
///
/// Usually loaded from a JSON file (`CLASSIFIER_RULES_PATH`). Lists missing
/// from the file fall back to the built-in defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRules {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_category_codes")]
    pub category_codes: Vec<String>,
    #[serde(default = "default_category_labels")]
    pub category_labels: Vec<String>,
    #[serde(default = "default_merchant_whitelist")]
    pub merchant_whitelist: Vec<String>,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

fn default_version() -> u32 {
    1
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_category_codes() -> Vec<String> {
    owned(DEFAULT_CATEGORY_CODES)
}

fn default_category_labels() -> Vec<String> {
    owned(DEFAULT_CATEGORY_LABELS)
}

fn default_merchant_whitelist() -> Vec<String> {
    owned(DEFAULT_MERCHANT_WHITELIST)
}

fn default_keywords() -> Vec<String> {
    owned(DEFAULT_KEYWORDS)
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            version: default_version(),
            category_codes: default_category_codes(),
            category_labels: default_category_labels(),
            merchant_whitelist: default_merchant_whitelist(),
            keywords: default_keywords(),
        }
    }
}

impl ClassifierRules {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[derive(Clone, Debug)]
pub struct Classifier {
    version: u32,
    category_codes: HashSet<String>,
    category_labels: HashSet<String>,
    merchant_whitelist: Vec<String>,
    keywords: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierRules::default())
    }
}

impl Classifier {
    pub fn new(rules: ClassifierRules) -> Self {
        Self {
            version: rules.version,
            category_codes: rules
                .category_codes
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            category_labels: normalize(rules.category_labels).into_iter().collect(),
            merchant_whitelist: normalize(rules.merchant_whitelist),
            keywords: normalize(rules.keywords),
        }
    }

    pub fn rules_version(&self) -> u32 {
        self.version
    }

    pub fn is_food_transaction(&self, tx: &TransactionRecord) -> bool {
        if tx.pending {
            return false;
        }

        if let Some(code) = tx.merchant_category_code.as_deref() {
            if self.category_codes.contains(code.trim()) {
                return true;
            }
        }

        if let Some(labels) = &tx.category {
            if labels
                .iter()
                .any(|l| self.category_labels.contains(&l.trim().to_lowercase()))
            {
                return true;
            }
        }

        let name = tx.display_name().unwrap_or("").to_lowercase();
        if self.merchant_whitelist.iter().any(|m| name.contains(m.as_str())) {
            return true;
        }

        self.keywords.iter().any(|k| name.contains(k.as_str()))
    }

    /// Order-preserving filter.
    pub fn filter(&self, transactions: &[TransactionRecord]) -> Vec<TransactionRecord> {
        transactions
            .iter()
            .filter(|tx| self.is_food_transaction(tx))
            .cloned()
            .collect()
    }
}

fn normalize(list: Vec<String>) -> Vec<String> {
    list.into_iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
