//! Google Places adapter (Find Place from Text).

use std::time::Duration;

use async_trait::async_trait;

use foodfeed_core::{
    errors::Error,
    ports::{PlaceLookup, PlaceSearch},
    Result,
};

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";
const PHOTO_MAX_WIDTH: u32 = 400;

#[derive(Clone, Debug)]
pub struct PlacesClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl PlacesClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("places http client build failed: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl PlaceLookup for PlacesClient {
    async fn find_place(&self, query: &str) -> Result<PlaceSearch> {
        let resp = self
            .http
            .get(format!("{}/findplacefromtext/json", self.base_url))
            .query(&[
                ("input", query),
                ("inputtype", "textquery"),
                ("fields", "place_id,name,formatted_address,geometry,photos"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::External(format!("places request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "places lookup failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        resp.json::<PlaceSearch>()
            .await
            .map_err(|e| Error::External(format!("places json error: {e}")))
    }

    fn photo_url(&self, photo_reference: &str) -> Option<String> {
        photo_url(&self.base_url, &self.api_key, photo_reference)
    }
}

fn photo_url(base_url: &str, api_key: &str, photo_reference: &str) -> Option<String> {
    let max_width = PHOTO_MAX_WIDTH.to_string();
    let url = reqwest::Url::parse_with_params(
        &format!("{base_url}/photo"),
        [
            ("maxwidth", max_width.as_str()),
            ("photoreference", photo_reference),
            ("key", api_key),
        ],
    );
    match url {
        Ok(url) => Some(url.into()),
        Err(e) => {
            tracing::warn!(%base_url, error = %e, "cannot build place photo url");
            None
        }
    }
}
