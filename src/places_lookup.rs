//! Places cross-check: ask a commercial places API whether it knows this
//! business's website.
//!
//! The mapping import only tags websites for a small fraction of
//! businesses; the places upstream knows the real website for most. If it
//! lists one, the business is not a lead. Requires a provisioned
//! credential; absence simply skips this source.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::Config;
use crate::models::{BusinessSnapshot, VerificationSource};
use crate::sources::{EvidenceSource, RawOutcome};
use crate::verdict::places as outcome;

/// Field masks control pricing — keep to the cheap tier.
const SEARCH_FIELD_MASK: &str =
    "places.id,places.displayName,places.formattedAddress,places.websiteUri,places.nationalPhoneNumber";

const PLACE_STOP_WORDS: [&str; 13] = [
    "the", "a", "an", "and", "&", "of", "in", "at", "to", "for", "-", "le", "la",
];

/// At least half of the significant business-name words must appear in
/// the returned display name, or we refuse the match. Prevents verifying
/// business A with data from business B.
pub fn is_good_match(business_name: &str, place_name: &str) -> bool {
    let significant = |name: &str| -> BTreeSet<String> {
        name.to_lowercase()
            .split_whitespace()
            .filter(|w| !PLACE_STOP_WORDS.contains(w))
            .map(str::to_string)
            .collect()
    };

    let biz_words = significant(business_name);
    let place_words = significant(place_name);
    if biz_words.is_empty() || place_words.is_empty() {
        return false;
    }

    let overlap = biz_words.intersection(&place_words).count();
    overlap as f64 / biz_words.len() as f64 >= 0.5
}

/// Name + address/city gives the upstream the best chance of a correct
/// disambiguation.
pub fn build_search_query(business: &BusinessSnapshot) -> String {
    let mut parts = vec![business.name.clone()];
    if let Some(address) = business.address.as_deref().filter(|a| !a.is_empty()) {
        parts.push(address.to_string());
    } else if let Some(city) = business.city.as_deref().filter(|c| !c.is_empty()) {
        parts.push(city.to_string());
    }
    parts.join(" ")
}

pub struct PlacesLookup {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PlacesLookup {
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config.places_api_key.clone()?;
        let base_url = config
            .places_base_url
            .clone()
            .unwrap_or_else(|| "https://places.googleapis.com".to_string());
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

    async fn text_search(&self, query: &str) -> Result<Option<Value>, String> {
        let body = json!({
            "textQuery": query,
            "maxResultCount": 1,
        });

        let response = self
            .client
            .post(format!("{}/v1/places:searchText", self.base_url))
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", SEARCH_FIELD_MASK)
            .json(&body)
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
            .get("places")
            .and_then(|p| p.as_array())
            .and_then(|p| p.first())
            .cloned())
    }
}

#[async_trait]
impl EvidenceSource for PlacesLookup {
    fn source(&self) -> VerificationSource {
        VerificationSource::PlacesApi
    }

    async fn check(&self, business: &BusinessSnapshot) -> RawOutcome {
        let query = build_search_query(business);

        let place = match self.text_search(&query).await {
            Ok(place) => place,
            Err(reason) => {
                tracing::warn!(business = %business.name, reason = %reason, "places lookup failed");
                return RawOutcome::code(outcome::API_ERROR)
                    .detail(json!({ "query": query, "reason": reason }));
            }
        };

        let Some(place) = place else {
            return RawOutcome::code(outcome::NOT_FOUND).detail(json!({ "query": query }));
        };

        let place_name = place
            .get("displayName")
            .and_then(|d| d.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or_default();

        if !is_good_match(&business.name, place_name) {
            // A different business came back; that settles nothing here.
            return RawOutcome::code(outcome::NOT_FOUND).detail(json!({
                "query": query,
                "mismatched_place": place_name,
            }));
        }

        match place
            .get("websiteUri")
            .and_then(|w| w.as_str())
            .filter(|w| !w.is_empty())
        {
            Some(website) => {
                tracing::info!(business = %business.name, website = %website, "places lists a website");
                RawOutcome::with_website(outcome::WEBSITE_LISTED, website)
                    .detail(json!({ "query": query, "place_name": place_name }))
            }
            None => RawOutcome::code(outcome::LISTING_WITHOUT_WEBSITE)
                .detail(json!({ "query": query, "place_name": place_name })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn snapshot(name: &str, address: Option<&str>, city: Option<&str>) -> BusinessSnapshot {
        BusinessSnapshot {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category: None,
            address: address.map(str::to_string),
            city: city.map(str::to_string),
            country: None,
            website_url: None,
        }
    }

    #[test]
    fn query_prefers_address_over_city() {
        let with_address = snapshot("Morton Motors", Some("12 King St W"), Some("Toronto"));
        assert_eq!(build_search_query(&with_address), "Morton Motors 12 King St W");

        let city_only = snapshot("Morton Motors", None, Some("Toronto"));
        assert_eq!(build_search_query(&city_only), "Morton Motors Toronto");
    }

    #[test]
    fn name_overlap_gating() {
        assert!(is_good_match("Morton Motors", "Morton Motors Ltd"));
        assert!(is_good_match("The Village Cobbler", "Village Cobbler"));
        // Entirely different business.
        assert!(!is_good_match("Morton Motors", "Sunshine Bakery"));
        // Half overlap is the floor.
        assert!(is_good_match("Morton Motors", "Morton Auto Group"));
        assert!(!is_good_match("", "Anything"));
    }
}
