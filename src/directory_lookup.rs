//! Directory cross-check: Foursquare-style places search used as a second,
//! independent listing source. Same outcome vocabulary as the places
//! adapter, weaker default fusion weight.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::Config;
use crate::models::{BusinessSnapshot, VerificationSource};
use crate::places_lookup::{build_search_query, is_good_match};
use crate::sources::{EvidenceSource, RawOutcome};
use crate::verdict::places as outcome;

const SEARCH_FIELDS: &str = "fsq_id,name,location,tel,website,categories";

pub struct DirectoryLookup {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl DirectoryLookup {
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config.directory_api_key.clone()?;
        let base_url = config
            .directory_base_url
            .clone()
            .unwrap_or_else(|| "https://api.foursquare.com".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;
        Some(Self {
            client,
            api_key,
            base_url,
        })
    }

    async fn search(&self, query: &str) -> Result<Option<Value>, String> {
        let response = self
            .client
            .get(format!("{}/v3/places/search", self.base_url))
            .header("Authorization", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("query", query), ("limit", "1"), ("fields", SEARCH_FIELDS)])
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err("rate limited (429)".to_string());
        }
        if status != 200 {
            let text = response.text().await.unwrap_or_default();
            let brief: String = text.chars().take(200).collect();
            return Err(format!("status {}: {}", status, brief));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| format!("bad response body: {}", e))?;
        Ok(data
            .get("results")
            .and_then(|r| r.as_array())
            .and_then(|r| r.first())
            .cloned())
    }
}

#[async_trait]
impl EvidenceSource for DirectoryLookup {
    fn source(&self) -> VerificationSource {
        VerificationSource::DirectoryApi
    }

    async fn check(&self, business: &BusinessSnapshot) -> RawOutcome {
        let query = build_search_query(business);

        let place = match self.search(&query).await {
            Ok(place) => place,
            Err(reason) => {
                tracing::warn!(business = %business.name, reason = %reason, "directory lookup failed");
                return RawOutcome::code(outcome::API_ERROR)
                    .detail(json!({ "query": query, "reason": reason }));
            }
        };

        let Some(place) = place else {
            return RawOutcome::code(outcome::NOT_FOUND).detail(json!({ "query": query }));
        };

        let place_name = place
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default();

        if !is_good_match(&business.name, place_name) {
            return RawOutcome::code(outcome::NOT_FOUND).detail(json!({
                "query": query,
                "mismatched_place": place_name,
            }));
        }

        match place
            .get("website")
            .and_then(|w| w.as_str())
            .filter(|w| !w.is_empty())
        {
            Some(website) => {
                tracing::info!(business = %business.name, website = %website, "directory lists a website");
                RawOutcome::with_website(outcome::WEBSITE_LISTED, website)
                    .detail(json!({ "query": query, "place_name": place_name }))
            }
            None => RawOutcome::code(outcome::LISTING_WITHOUT_WEBSITE)
                .detail(json!({ "query": query, "place_name": place_name })),
        }
    }
}
