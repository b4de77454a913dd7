//! AI disambiguator: ask a language model whether a business has its own
//! website.
//!
//! Two modes. Guess mode sees only business metadata and is instructed to
//! default to "not_sure" — low signal, kept as a fallback. Analysis mode
//! feeds the model real search results and asks it to pick the matching
//! entry or confirm none do; that is the same capability with richer
//! input and is strictly preferred whenever search context is available.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{Config, LlmProvider};
use crate::models::{BusinessSnapshot, VerificationSource};
use crate::sources::{EvidenceSource, RawOutcome};
use crate::verdict::ai_disambiguator as outcome;

const ANALYSIS_SYSTEM_PROMPT: &str = "You are an expert web researcher analyzing search engine results to determine \
if a specific business has its own official website.\n\n\
RULES:\n\
- A real website is a domain the business owns (e.g. joespizza.com, villagecobbler.ca)\n\
- Directory listings (Yelp, Facebook, YellowPages, Google Maps, TripAdvisor, etc.) are NOT real websites\n\
- Social media pages (instagram.com/business, facebook.com/business) are NOT real websites\n\
- If a search result URL contains the business name and is NOT a directory, it's likely their website\n\
- Chain/franchise businesses (McDonald's, Subway, etc.) should be marked 'has_website'\n\n\
Return ONLY a JSON object with:\n\
- status: 'has_website' if search results show they have an official site, \
'no_website' if results clearly show no official site exists, \
or 'not_sure' if evidence is insufficient\n\
- website_url: the official website URL if found, otherwise null\n\
- reason: brief explanation (1 sentence)";

const GUESS_SYSTEM_PROMPT: &str = "You estimate whether a small business has its own website from its metadata \
alone. You have NO search results and NO way to verify.\n\n\
Be strict: answer 'has_website' or 'no_website' ONLY when the metadata makes \
it near-certain (e.g. a well-known chain). Otherwise answer 'not_sure'.\n\n\
Return ONLY a JSON object with:\n\
- status: 'has_website', 'no_website', or 'not_sure'\n\
- website_url: null unless you are certain of the exact URL\n\
- reason: brief explanation (1 sentence)";

/// What the model returned, after JSON validation.
struct LlmAnswer {
    status: String,
    website_url: Option<String>,
    reason: String,
}

pub struct AiDisambiguator {
    client: reqwest::Client,
    provider: LlmProvider,
    api_key: String,
    base_url: String,
    search_endpoint: String,
}

impl AiDisambiguator {
    /// `None` when no LLM credential is configured; the source is then
    /// skipped for the run, it never errors the loop.
    pub fn from_config(config: &Config) -> Option<Self> {
        let provider = config.llm_provider()?;
        let api_key = config.llm_api_key()?.to_string();
        let base_url = match provider {
            LlmProvider::Openrouter => config
                .openrouter_base_url
                .clone()
                .unwrap_or_else(|| "https://openrouter.ai".to_string()),
            LlmProvider::Gemini => config
                .gemini_base_url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            LlmProvider::Groq => config
                .groq_base_url
                .clone()
                .unwrap_or_else(|| "https://api.groq.com".to_string()),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .ok()?;
        Some(Self {
            client,
            provider,
            api_key,
            base_url,
            search_endpoint: config.search_endpoint.clone(),
        })
    }

    /// Fetch search context for analysis mode. Failures just mean guess
    /// mode; the search adapter records its own outcomes separately.
    async fn fetch_search_context(&self, business: &BusinessSnapshot) -> Vec<Value> {
        let query = match business.city.as_deref() {
            Some(city) if !city.is_empty() => format!("{} {}", business.name, city),
            _ => business.name.clone(),
        };
        let response = match self
            .client
            .get(&self.search_endpoint)
            .query(&[("q", query.as_str()), ("format", "json"), ("categories", "general")])
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            _ => return Vec::new(),
        };
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(_) => return Vec::new(),
        };
        body.get("results")
            .and_then(|r| r.as_array())
            .map(|items| {
                items
                    .iter()
                    .take(15)
                    .map(|item| {
                        json!({
                            "title": item.get("title").and_then(|v| v.as_str()).unwrap_or(""),
                            "url": item.get("url").and_then(|v| v.as_str()).unwrap_or(""),
                            "snippet": item
                                .get("content")
                                .and_then(|v| v.as_str())
                                .unwrap_or("")
                                .chars()
                                .take(200)
                                .collect::<String>(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn format_search_results(results: &[Value]) -> String {
        if results.is_empty() {
            return "No search results found.".to_string();
        }
        let mut lines = Vec::new();
        for (i, result) in results.iter().enumerate() {
            let title = result.get("title").and_then(|v| v.as_str()).unwrap_or("");
            let url = result.get("url").and_then(|v| v.as_str()).unwrap_or("");
            let snippet = result.get("snippet").and_then(|v| v.as_str()).unwrap_or("");
            lines.push(format!("{}. [{}]({})", i + 1, title, url));
            if !snippet.is_empty() {
                lines.push(format!("   {}", snippet));
            }
        }
        lines.join("\n")
    }

    fn user_prompt(business: &BusinessSnapshot, search_text: Option<&str>) -> String {
        let location = business
            .city
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or("unknown location");
        let category = business
            .category
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or("business");
        match search_text {
            Some(text) => format!(
                "Business: {}\nLocation: {}\nCategory: {}\n\nSearch Results:\n{}",
                business.name, location, category, text
            ),
            None => format!(
                "Business: {}\nLocation: {}\nCategory: {}",
                business.name, location, category
            ),
        }
    }

    /// One provider round-trip. The raw content must be a JSON object;
    /// anything else is a provider error, not a verdict.
    async fn complete(&self, system: &str, user: &str) -> Result<LlmAnswer, String> {
        let content = match self.provider {
            LlmProvider::Openrouter | LlmProvider::Groq => {
                let path = match self.provider {
                    LlmProvider::Openrouter => "/api/v1/chat/completions",
                    _ => "/openai/v1/chat/completions",
                };
                let model = match self.provider {
                    LlmProvider::Openrouter => "google/gemini-2.5-flash",
                    _ => "llama-3.3-70b-versatile",
                };
                let body = json!({
                    "model": model,
                    "response_format": { "type": "json_object" },
                    "messages": [
                        { "role": "system", "content": system },
                        { "role": "user", "content": user }
                    ],
                    "temperature": 0.1
                });
                let response = self
                    .client
                    .post(format!("{}{}", self.base_url, path))
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| format!("request failed: {}", e))?;
                if !response.status().is_success() {
                    return Err(format!("status {}", response.status().as_u16()));
                }
                let data: Value = response
                    .json()
                    .await
                    .map_err(|e| format!("bad response body: {}", e))?;
                data.get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("message"))
                    .and_then(|m| m.get("content"))
                    .and_then(|c| c.as_str())
                    .ok_or_else(|| "missing message content".to_string())?
                    .to_string()
            }
            LlmProvider::Gemini => {
                let url = format!(
                    "{}/v1beta/models/gemini-2.5-flash:generateContent?key={}",
                    self.base_url, self.api_key
                );
                let body = json!({
                    "system_instruction": { "parts": [{ "text": system }] },
                    "contents": [{ "parts": [{ "text": user }] }],
                    "generationConfig": {
                        "temperature": 0.1,
                        "responseMimeType": "application/json"
                    }
                });
                let response = self
                    .client
                    .post(url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| format!("request failed: {}", e))?;
                if !response.status().is_success() {
                    return Err(format!("status {}", response.status().as_u16()));
                }
                let data: Value = response
                    .json()
                    .await
                    .map_err(|e| format!("bad response body: {}", e))?;
                data.get("candidates")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("content"))
                    .and_then(|c| c.get("parts"))
                    .and_then(|p| p.get(0))
                    .and_then(|p| p.get("text"))
                    .and_then(|t| t.as_str())
                    .ok_or_else(|| "missing candidate text".to_string())?
                    .to_string()
            }
        };

        let parsed: Value =
            serde_json::from_str(&content).map_err(|e| format!("unparseable answer: {}", e))?;
        let status = parsed
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("not_sure");
        // Unknown status strings collapse to not_sure rather than leaking.
        let status = if ["has_website", "no_website", "not_sure"].contains(&status) {
            status.to_string()
        } else {
            "not_sure".to_string()
        };
        Ok(LlmAnswer {
            status,
            website_url: parsed
                .get("website_url")
                .and_then(|u| u.as_str())
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            reason: parsed
                .get("reason")
                .and_then(|r| r.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }
}

#[async_trait]
impl EvidenceSource for AiDisambiguator {
    fn source(&self) -> VerificationSource {
        VerificationSource::AiDisambiguator
    }

    async fn check(&self, business: &BusinessSnapshot) -> RawOutcome {
        let search_results = self.fetch_search_context(business).await;
        let (mode, system, user) = if search_results.is_empty() {
            (
                "guess",
                GUESS_SYSTEM_PROMPT,
                Self::user_prompt(business, None),
            )
        } else {
            let search_text = Self::format_search_results(&search_results);
            (
                "analyze",
                ANALYSIS_SYSTEM_PROMPT,
                Self::user_prompt(business, Some(&search_text)),
            )
        };

        let answer = match self.complete(system, &user).await {
            Ok(answer) => answer,
            Err(reason) => {
                tracing::warn!(
                    business = %business.name,
                    provider = self.provider.as_str(),
                    reason = %reason,
                    "LLM analysis failed"
                );
                return RawOutcome::code(outcome::PROVIDER_ERROR).detail(json!({
                    "provider": self.provider.as_str(),
                    "mode": mode,
                    "reason": reason,
                }));
            }
        };

        let detail = json!({
            "provider": self.provider.as_str(),
            "mode": mode,
            "search_results_count": search_results.len(),
            "reason": answer.reason,
        });

        match answer.status.as_str() {
            "has_website" => match answer.website_url {
                Some(url) => RawOutcome::with_website(outcome::CONFIRMED_WEBSITE, url).detail(detail),
                // A positive claim without a URL settles nothing.
                None => RawOutcome::code(outcome::NOT_SURE).detail(detail),
            },
            "no_website" => RawOutcome::code(outcome::CONFIRMED_ABSENT).detail(detail),
            _ => RawOutcome::code(outcome::NOT_SURE).detail(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn format_search_results_numbering() {
        let results = vec![
            json!({"title": "Joe's Pizza", "url": "https://joespizza.com", "snippet": "Best pizza"}),
            json!({"title": "Joe's on Yelp", "url": "https://yelp.com/biz/joes", "snippet": ""}),
        ];
        let text = AiDisambiguator::format_search_results(&results);
        assert!(text.starts_with("1. [Joe's Pizza](https://joespizza.com)"));
        assert!(text.contains("2. [Joe's on Yelp]"));
        assert!(text.contains("   Best pizza"));
    }

    #[test]
    fn empty_results_format() {
        assert_eq!(
            AiDisambiguator::format_search_results(&[]),
            "No search results found."
        );
    }

    #[test]
    fn user_prompt_includes_metadata() {
        let business = BusinessSnapshot {
            id: Uuid::new_v4(),
            name: "Joe's Pizza".to_string(),
            category: Some("food".to_string()),
            address: None,
            city: Some("Toronto".to_string()),
            country: Some("CA".to_string()),
            website_url: None,
        };
        let prompt = AiDisambiguator::user_prompt(&business, Some("1. [x](y)"));
        assert!(prompt.contains("Business: Joe's Pizza"));
        assert!(prompt.contains("Location: Toronto"));
        assert!(prompt.contains("Category: food"));
        assert!(prompt.contains("Search Results:"));

        let guess = AiDisambiguator::user_prompt(&business, None);
        assert!(!guess.contains("Search Results:"));
    }
}
