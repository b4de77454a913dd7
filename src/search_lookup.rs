//! Search-engine lookup: query a SearXNG-style meta-search endpoint and
//! decide whether any result is the business's own website.
//!
//! Being blocked or rate-limited is NOT the same as a genuine zero-result
//! answer; both classify inconclusive but keep distinct outcome codes so
//! the difference survives into metrics.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::cache_validator::ValidatedCacheEntry;
use crate::circuit_breaker::{create_upstream_circuit_breaker, UpstreamCircuitBreaker};
use crate::config::Config;
use crate::models::{BusinessSnapshot, VerificationSource};
use crate::sources::{EvidenceSource, RawOutcome};
use crate::verdict::search_engine as outcome;

/// Directories, social networks and aggregators — a result pointing here
/// is never the business's own website.
pub const DIRECTORY_DOMAINS: [&str; 44] = [
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "tiktok.com",
    "youtube.com",
    "pinterest.com",
    "threads.net",
    "yelp.com",
    "yelp.ca",
    "yellowpages.com",
    "yellowpages.ca",
    "tripadvisor.com",
    "bbb.org",
    "trustpilot.com",
    "glassdoor.com",
    "indeed.com",
    "mapquest.com",
    "foursquare.com",
    "zomato.com",
    "talabat.com",
    "deliveroo.com",
    "ubereats.com",
    "doordash.com",
    "google.com",
    "maps.google.com",
    "bing.com",
    "apple.com",
    "crunchbase.com",
    "wikipedia.org",
    "wikidata.org",
    "openstreetmap.org",
    "dnb.com",
    "kompass.com",
    "chamberofcommerce.com",
    "canada411.ca",
    "booking.com",
    "airbnb.com",
    "expedia.com",
    "amazon.com",
    "ebay.com",
    "alibaba.com",
    "etsy.com",
];

const PUBLIC_EMAIL_DOMAINS_QUICK: [&str; 8] = [
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "aol.com",
    "icloud.com",
    "mail.com",
    "protonmail.com",
];

/// Words too generic to confirm a domain belongs to a specific business.
/// "candle" in yankeecandle.com does not tie it to "Candle Night Personal
/// Care", but "morton" in mortonmotor.com does tie it to "Morton Motors".
const GENERIC_BUSINESS_TERMS: [&str; 56] = [
    "fashion", "beauty", "salon", "cafe", "restaurant", "food", "market", "store", "shop",
    "mart", "auto", "dental", "medical", "health", "service", "services", "trading", "general",
    "kitchen", "grill", "pizza", "coffee", "hotel", "travel", "tours", "fitness", "clinic",
    "pharmacy", "mobile", "computer", "digital", "tech", "media", "print", "electric", "care",
    "express", "premium", "classic", "modern", "barber", "nails", "studio", "consulting",
    "properties", "cleaning", "repair", "parts", "supplies", "wholesale", "retail", "logistics",
    "construction", "bakery", "grocery", "laundry",
];

const STOP_WORDS: [&str; 16] = [
    "the", "a", "an", "and", "of", "in", "at", "to", "for", "by", "le", "la", "les", "de", "du",
    "al",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug)]
enum SearchError {
    /// Upstream rate-limited us or the breaker is open.
    Blocked,
    /// Body came back but was not a usable result list.
    Malformed(String),
    /// Network-level failure.
    Upstream(String),
}

pub fn domain_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .map(|h| h.trim_start_matches("www.").to_string())
        .unwrap_or_default()
}

pub fn is_directory_or_social(url: &str) -> bool {
    let domain = domain_from_url(url);
    if domain.is_empty() {
        return true; // can't parse = skip
    }
    DIRECTORY_DOMAINS
        .iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{}", d)))
}

fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn name_words(name: &str) -> BTreeSet<String> {
    normalize_name(name)
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Does this domain likely belong to the business?
///
/// Strict on purpose: full-name substring, 65%+ containment, a 2+ word
/// match, or a single distinctive 7+ char word. Generic single words are
/// never enough.
pub fn domain_contains_name(domain: &str, business_name: &str) -> bool {
    if domain.is_empty() || business_name.is_empty() {
        return false;
    }

    let domain_base = domain
        .split('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
        .replace('-', "");
    let name_clean: String = business_name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    if name_clean.len() >= 7 && domain_base.contains(&name_clean) {
        return true;
    }

    if domain_base.len() >= 6 && name_clean.contains(&domain_base) {
        let overlap_ratio = domain_base.len() as f64 / name_clean.len().max(1) as f64;
        if overlap_ratio >= 0.65 {
            return true;
        }
    }

    let words = name_words(business_name);
    let matching: Vec<&String> = words
        .iter()
        .filter(|w| w.len() >= 4 && domain_base.contains(w.as_str()))
        .collect();

    if matching.len() >= 2 {
        return true;
    }
    if matching.len() == 1 {
        let word = matching[0];
        if !GENERIC_BUSINESS_TERMS.contains(&word.as_str()) && word.len() >= 7 {
            return true;
        }
    }

    false
}

/// Root or near-root URLs only; deep article paths are never a homepage.
fn is_root_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path().trim_matches('/');
    if path.is_empty() {
        return true;
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    segments.len() == 1 && segments[0].len() <= 20
}

/// Queries from broad to specific; the broad one usually wins.
pub fn build_search_queries(business: &BusinessSnapshot) -> Vec<String> {
    let mut queries = Vec::new();
    let name = business.name.trim();
    let city = business.city.as_deref().map(str::trim).filter(|c| !c.is_empty());

    match city {
        Some(city) => queries.push(format!("{} {}", name, city)),
        None => queries.push(name.to_string()),
    }

    let mut words: Vec<String> = name_words(name).into_iter().collect();
    words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    if words.len() >= 2 {
        let short_name = words[..words.len().min(3)].join(" ");
        let query = match city {
            Some(city) => format!("\"{}\" {}", short_name, city),
            None => format!("\"{}\"", short_name),
        };
        if !queries.contains(&query) {
            queries.push(query);
        }
    }

    let quoted = match city {
        Some(city) => format!("\"{}\" {}", name, city),
        None => format!("\"{}\"", name),
    };
    if !queries.contains(&quoted) {
        queries.push(quoted);
    }

    queries
}

/// Find the business's own website in a result list, or None.
///
/// Pass 1 accepts a domain-name match (strongest signal), normalizing
/// deep URLs back to the root. Pass 2 accepts a root URL whose title has
/// strong word overlap; single-word names skip pass 2 entirely.
pub fn extract_business_website(results: &[SearchResult], business_name: &str) -> Option<String> {
    for result in results {
        if result.url.is_empty() || is_directory_or_social(&result.url) {
            continue;
        }
        let domain = domain_from_url(&result.url);
        if PUBLIC_EMAIL_DOMAINS_QUICK.contains(&domain.as_str()) {
            continue;
        }
        if domain_contains_name(&domain, business_name) {
            if is_root_url(&result.url) {
                return Some(result.url.clone());
            }
            let parsed = Url::parse(&result.url).ok()?;
            return Some(format!(
                "{}://{}/",
                parsed.scheme(),
                parsed.host_str().unwrap_or_default()
            ));
        }
    }

    let biz_words = name_words(business_name);
    if biz_words.len() < 2 {
        return None;
    }

    for result in results {
        if result.url.is_empty() || is_directory_or_social(&result.url) {
            continue;
        }
        let domain = domain_from_url(&result.url);
        if PUBLIC_EMAIL_DOMAINS_QUICK.contains(&domain.as_str()) {
            continue;
        }
        if !is_root_url(&result.url) {
            continue;
        }
        let title_words = name_words(&result.title);
        if title_words.is_empty() {
            continue;
        }
        let overlap = biz_words.intersection(&title_words).count();
        if overlap >= 2 && overlap as f64 >= biz_words.len() as f64 * 0.6 {
            return Some(result.url.clone());
        }
    }

    None
}

pub struct SearchLookup {
    client: reqwest::Client,
    endpoint: String,
    breaker: UpstreamCircuitBreaker,
    /// Checksum-validated result cache: a business is often searched by
    /// both this adapter and the AI disambiguator within one run.
    cache: moka::future::Cache<String, String>,
}

impl SearchLookup {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(config.http_user_agent.clone())
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: config.search_endpoint.clone(),
            breaker: create_upstream_circuit_breaker(),
            cache: moka::future::Cache::builder()
                .time_to_live(Duration::from_secs(3600))
                .max_capacity(10_000)
                .build(),
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        use failsafe::futures::CircuitBreaker;

        if let Some(serialized) = self.cache.get(query).await {
            match ValidatedCacheEntry::deserialize_and_validate(&serialized)
                .and_then(|data| serde_json::from_str::<Vec<SearchResult>>(&data).ok())
            {
                Some(results) => return Ok(results),
                None => self.cache.invalidate(query).await,
            }
        }

        let request = async {
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[("q", query), ("format", "json"), ("categories", "general")])
                .send()
                .await
                .map_err(|e| SearchError::Upstream(e.to_string()))?;

            let status = response.status().as_u16();
            if status == 429 {
                return Err(SearchError::Blocked);
            }
            if status != 200 {
                return Err(SearchError::Upstream(format!("status {}", status)));
            }

            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| SearchError::Malformed(e.to_string()))?;
            let items = body
                .get("results")
                .and_then(|r| r.as_array())
                .ok_or_else(|| SearchError::Malformed("missing results array".to_string()))?;

            let mut results = Vec::new();
            let mut seen = BTreeSet::new();
            for item in items.iter().take(20) {
                let url = item
                    .get("url")
                    .and_then(|u| u.as_str())
                    .unwrap_or_default()
                    .to_string();
                if url.is_empty() || !seen.insert(url.clone()) {
                    continue;
                }
                results.push(SearchResult {
                    title: item
                        .get("title")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    url,
                    snippet: item
                        .get("content")
                        .and_then(|c| c.as_str())
                        .unwrap_or_default()
                        .to_string(),
                });
            }
            Ok(results)
        };

        match self.breaker.call(request).await {
            Ok(results) => {
                if let Ok(data) = serde_json::to_string(&results) {
                    self.cache
                        .insert(query.to_string(), ValidatedCacheEntry::new(data).serialize())
                        .await;
                }
                Ok(results)
            }
            Err(failsafe::Error::Rejected) => Err(SearchError::Blocked),
            Err(failsafe::Error::Inner(e)) => Err(e),
        }
    }
}

#[async_trait]
impl EvidenceSource for SearchLookup {
    fn source(&self) -> VerificationSource {
        VerificationSource::SearchEngine
    }

    async fn check(&self, business: &BusinessSnapshot) -> RawOutcome {
        let queries = build_search_queries(business);

        let mut results = Vec::new();
        let mut used_query = String::new();
        for (i, query) in queries.iter().enumerate() {
            match self.search(query).await {
                Ok(batch) if !batch.is_empty() => {
                    results = batch;
                    used_query = query.clone();
                    break;
                }
                Ok(_) => {
                    if i + 1 < queries.len() {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                    }
                }
                Err(SearchError::Blocked) => {
                    tracing::warn!(query = %query, "search upstream blocked or rate-limited");
                    return RawOutcome::code(outcome::BLOCKED_RESPONSE)
                        .detail(json!({ "query": query }));
                }
                Err(SearchError::Malformed(reason)) => {
                    return RawOutcome::code(outcome::MALFORMED_RESPONSE)
                        .detail(json!({ "query": query, "reason": reason }));
                }
                Err(SearchError::Upstream(reason)) => {
                    return RawOutcome::code(outcome::UPSTREAM_ERROR)
                        .detail(json!({ "query": query, "reason": reason }));
                }
            }
        }

        if results.is_empty() {
            return RawOutcome::code(outcome::NO_RESULTS)
                .detail(json!({ "queries_tried": queries.len() }));
        }

        match extract_business_website(&results, &business.name) {
            Some(website) => {
                tracing::info!(business = %business.name, website = %website, "search found website");
                RawOutcome::with_website(outcome::WEBSITE_FOUND, website).detail(json!({
                    "query": used_query,
                    "result_count": results.len(),
                }))
            }
            None => RawOutcome::code(outcome::NO_WEBSITE_IN_RESULTS).detail(json!({
                "query": used_query,
                "result_count": results.len(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn snapshot(name: &str, city: Option<&str>) -> BusinessSnapshot {
        BusinessSnapshot {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category: None,
            address: None,
            city: city.map(str::to_string),
            country: None,
            website_url: None,
        }
    }

    fn result(title: &str, url: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            url: url.to_string(),
            snippet: String::new(),
        }
    }

    #[test]
    fn builds_broad_to_specific_queries() {
        let queries = build_search_queries(&snapshot("Morton Motors", Some("Toronto")));
        assert_eq!(queries[0], "Morton Motors Toronto");
        assert!(queries.iter().any(|q| q.starts_with('"')));
    }

    #[test]
    fn directory_urls_are_filtered() {
        assert!(is_directory_or_social("https://www.yelp.com/biz/morton"));
        assert!(is_directory_or_social("https://m.facebook.com/mortonmotors"));
        assert!(!is_directory_or_social("https://mortonmotors.com"));
        assert!(is_directory_or_social("not a url"));
    }

    #[test]
    fn domain_name_matching_is_strict() {
        assert!(domain_contains_name("sonidentistry.com", "Soni Dentistry"));
        assert!(domain_contains_name("mortonmotor.com", "Morton Motors"));
        assert!(domain_contains_name(
            "thevillagecobbler.ca",
            "Village Cobbler"
        ));
        // Generic single-word overlap is not a match.
        assert!(!domain_contains_name(
            "yankeecandle.com",
            "Candle Night Personal Care"
        ));
        assert!(!domain_contains_name("dubai-fashions.com", "Al Riyan Fashion"));
    }

    #[test]
    fn extracts_domain_match_over_title_match() {
        let results = vec![
            result("Morton Motors - Yelp", "https://www.yelp.com/biz/morton-motors"),
            result("Morton Motors | Used Cars", "https://mortonmotors.com/"),
        ];
        assert_eq!(
            extract_business_website(&results, "Morton Motors"),
            Some("https://mortonmotors.com/".to_string())
        );
    }

    #[test]
    fn deep_urls_normalize_to_root() {
        let results = vec![result(
            "About Morton Motors",
            "https://mortonmotors.com/blog/2024/our-story-so-far",
        )];
        assert_eq!(
            extract_business_website(&results, "Morton Motors"),
            Some("https://mortonmotors.com/".to_string())
        );
    }

    #[test]
    fn title_match_requires_root_url_and_overlap() {
        // Deep article URL: rejected even with a matching title.
        let article = vec![result(
            "Gayne Denture Clinic opens new location",
            "https://citynews.ca/2024/05/01/gayne-denture-clinic-opens",
        )];
        assert_eq!(extract_business_website(&article, "Gayne Denture Clinic"), None);

        // Root URL with strong overlap: accepted.
        let root = vec![result(
            "Gayne Denture Clinic - Home",
            "https://gaynedentures.ca/",
        )];
        assert!(extract_business_website(&root, "Gayne Denture Clinic").is_some());
    }

    #[test]
    fn single_word_names_never_title_match() {
        let results = vec![result("Zowar Restaurant", "https://zowar.net/")];
        // Domain match path still applies, but title-only matching is off
        // for one-word names; "zowar" is 5 chars so the distinctive-word
        // rule (7+) does not fire either.
        assert_eq!(extract_business_website(&results, "Zowar"), None);
    }
}
