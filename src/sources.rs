//! The evidence-source seam: one trait, a fixed set of implementations,
//! and the registry the orchestrator dispatches through.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::ai_disambiguator::AiDisambiguator;
use crate::config::Config;
use crate::directory_lookup::DirectoryLookup;
use crate::domain_prober::DomainProber;
use crate::models::{BusinessSnapshot, VerificationSource};
use crate::places_lookup::PlacesLookup;
use crate::search_lookup::SearchLookup;

/// What an adapter reports for one business check.
///
/// `code` is an open string at this boundary; the classifier immediately
/// normalizes it into the closed verdict enum. Failures of any kind are
/// outcomes, not errors — an adapter never throws into the orchestrator.
#[derive(Debug, Clone)]
pub struct RawOutcome {
    pub code: String,
    pub website_url: Option<String>,
    pub detail: Option<Value>,
}

impl RawOutcome {
    pub fn code(code: &str) -> Self {
        Self {
            code: code.to_string(),
            website_url: None,
            detail: None,
        }
    }

    pub fn with_website(code: &str, url: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            website_url: Some(url.into()),
            detail: None,
        }
    }

    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// One independent, imperfect checker. Callable in any order and safe to
/// retry; the only blocking work an adapter does is network I/O.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    fn source(&self) -> VerificationSource;

    async fn check(&self, business: &BusinessSnapshot) -> RawOutcome;
}

/// Closed mapping from source identifier to adapter instance.
///
/// Sources whose credentials are absent simply do not appear here; the
/// orchestrator skips them without erroring.
pub struct AdapterRegistry {
    adapters: BTreeMap<VerificationSource, Box<dyn EvidenceSource>>,
}

impl AdapterRegistry {
    pub fn from_config(config: &Config) -> Self {
        let mut adapters: BTreeMap<VerificationSource, Box<dyn EvidenceSource>> = BTreeMap::new();

        adapters.insert(
            VerificationSource::DomainGuess,
            Box::new(DomainProber::new(config)),
        );
        adapters.insert(
            VerificationSource::SearchEngine,
            Box::new(SearchLookup::new(config)),
        );

        match AiDisambiguator::from_config(config) {
            Some(adapter) => {
                adapters.insert(VerificationSource::AiDisambiguator, Box::new(adapter));
            }
            None => {
                tracing::warn!("no LLM API key configured; AI disambiguator disabled for this run")
            }
        }
        match PlacesLookup::from_config(config) {
            Some(adapter) => {
                adapters.insert(VerificationSource::PlacesApi, Box::new(adapter));
            }
            None => tracing::warn!("no places API key configured; places adapter disabled"),
        }
        match DirectoryLookup::from_config(config) {
            Some(adapter) => {
                adapters.insert(VerificationSource::DirectoryApi, Box::new(adapter));
            }
            None => tracing::warn!("no directory API key configured; directory adapter disabled"),
        }

        Self { adapters }
    }

    pub fn get(&self, source: VerificationSource) -> Option<&dyn EvidenceSource> {
        self.adapters.get(&source).map(|b| b.as_ref())
    }

    /// Configured sources in dispatch order (prober first).
    pub fn available(&self) -> Vec<VerificationSource> {
        VerificationSource::ALL
            .into_iter()
            .filter(|s| self.adapters.contains_key(s))
            .collect()
    }
}
