//! FoodFeed ingestion core: classify bank transactions as food spend, attach
//! place data, and turn them into feed items.
//!
//! Nothing here speaks HTTP. Plaid, Google Places and Supabase sit behind the
//! traits in [`ports`] and are implemented by the adapter crates.

pub mod classifier;
pub mod config;
pub mod domain;
pub mod enricher;
pub mod errors;
pub mod feed;
pub mod logging;
pub mod pipeline;
pub mod ports;
pub mod sync;
pub mod webhook;

#[cfg(test)]
pub(crate) mod fakes;

pub use errors::{Error, Result};
