use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// The closed set of evidence sources that can check a business.
///
/// The orchestrator dispatches by this enum, never by string name, so a
/// typo cannot silently create a new source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationSource {
    DomainGuess,
    SearchEngine,
    AiDisambiguator,
    PlacesApi,
    DirectoryApi,
}

impl VerificationSource {
    /// Dispatch order: the free, highest-yield prober always runs first.
    pub const ALL: [VerificationSource; 5] = [
        VerificationSource::DomainGuess,
        VerificationSource::SearchEngine,
        VerificationSource::AiDisambiguator,
        VerificationSource::PlacesApi,
        VerificationSource::DirectoryApi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationSource::DomainGuess => "domain_guess",
            VerificationSource::SearchEngine => "search_engine",
            VerificationSource::AiDisambiguator => "ai_disambiguator",
            VerificationSource::PlacesApi => "places_api",
            VerificationSource::DirectoryApi => "directory_api",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "domain_guess" => Some(VerificationSource::DomainGuess),
            "search_engine" => Some(VerificationSource::SearchEngine),
            "ai_disambiguator" => Some(VerificationSource::AiDisambiguator),
            "places_api" => Some(VerificationSource::PlacesApi),
            "directory_api" => Some(VerificationSource::DirectoryApi),
            _ => None,
        }
    }
}

/// Normalized verdict vocabulary — the only thing that survives past the
/// classifier. Raw upstream outcome strings never leak further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    ConclusivePositive,
    ConclusiveNegative,
    Inconclusive,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::ConclusivePositive => "conclusive_positive",
            Verdict::ConclusiveNegative => "conclusive_negative",
            Verdict::Inconclusive => "inconclusive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "conclusive_positive" => Some(Verdict::ConclusivePositive),
            "conclusive_negative" => Some(Verdict::ConclusiveNegative),
            "inconclusive" => Some(Verdict::Inconclusive),
            _ => None,
        }
    }

    pub fn is_conclusive(&self) -> bool {
        !matches!(self, Verdict::Inconclusive)
    }
}

/// Fused trust estimate across all sources that checked one business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Unverified,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Unverified => "unverified",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unverified" => Some(ConfidenceLevel::Unverified),
            "low" => Some(ConfidenceLevel::Low),
            "medium" => Some(ConfidenceLevel::Medium),
            "high" => Some(ConfidenceLevel::High),
            _ => None,
        }
    }
}

/// Whether the business actually has a website, distinct from how much we
/// trust the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict", content = "website_url")]
pub enum HasWebsiteVerdict {
    Positive(String),
    Negative,
    Unknown,
}

/// A business row as imported from the mapping data source.
///
/// Attributes are largely immutable after import; score, confidence and
/// the verification history mutate over time. Rows are never hard-deleted.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Business {
    pub id: Uuid,
    pub source: String,
    pub source_id: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub website_url: Option<String>,
    pub lead_score: Option<f64>,
    pub score_reasons: Option<Value>,
    pub confidence: Option<String>,
    pub scored_at: Option<DateTime<Utc>>,
    pub exported: bool,
    pub created_at: DateTime<Utc>,
}

impl Business {
    /// Detached, adapter-facing view of the row. Adapters only ever see
    /// this snapshot, never the live row.
    pub fn snapshot(&self) -> BusinessSnapshot {
        BusinessSnapshot {
            id: self.id,
            name: self.name.clone().unwrap_or_default(),
            category: self.category.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            country: self.country.clone(),
            website_url: self.website_url.clone(),
        }
    }
}

/// The immutable identity an adapter needs to run one check.
#[derive(Debug, Clone, Serialize)]
pub struct BusinessSnapshot {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub website_url: Option<String>,
}

/// One append-only verification record: (business, source, run).
///
/// `outcome` is the source-specific raw code; `verdict` is the classified
/// three-value form. Records are never mutated, only superseded by newer
/// ones when confidence is recomputed.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VerificationRecord {
    pub id: Uuid,
    pub business_id: Uuid,
    pub source: String,
    pub outcome: String,
    pub verdict: String,
    pub website_url: Option<String>,
    pub detail: Option<Value>,
    pub checked_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn source_kind(&self) -> Option<VerificationSource> {
        VerificationSource::parse(&self.source)
    }

    /// Rows we wrote always carry a valid verdict; anything else (e.g. a
    /// hand-edited row) degrades to inconclusive rather than panicking.
    pub fn verdict_kind(&self) -> Verdict {
        Verdict::parse(&self.verdict).unwrap_or(Verdict::Inconclusive)
    }
}

/// A phone or email captured for a business, tagged by provenance.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BusinessContact {
    pub id: Uuid,
    pub business_id: Uuid,
    pub contact_type: String,
    pub value: String,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A candidate domain linked to a business, with the lifecycle status
/// owned by the domain-validation collaborator. Consumed read-only.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BusinessDomain {
    pub business_id: Uuid,
    pub domain: String,
    pub status: String,
}

/// Per-source lifetime counters surfaced on the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStats {
    pub processed: u64,
    pub websites_found: u64,
    pub no_website_confirmed: u64,
    pub inconclusive: u64,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_round_trip() {
        for source in VerificationSource::ALL {
            assert_eq!(VerificationSource::parse(source.as_str()), Some(source));
        }
        assert_eq!(VerificationSource::parse("carrier_pigeon"), None);
    }

    #[test]
    fn verdict_round_trip() {
        for verdict in [
            Verdict::ConclusivePositive,
            Verdict::ConclusiveNegative,
            Verdict::Inconclusive,
        ] {
            assert_eq!(Verdict::parse(verdict.as_str()), Some(verdict));
        }
    }

    #[test]
    fn confidence_ordering() {
        assert!(ConfidenceLevel::Unverified < ConfidenceLevel::Low);
        assert!(ConfidenceLevel::Low < ConfidenceLevel::Medium);
        assert!(ConfidenceLevel::Medium < ConfidenceLevel::High);
    }

    #[test]
    fn unknown_verdict_degrades_to_inconclusive() {
        let record = VerificationRecord {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            source: "domain_guess".to_string(),
            outcome: "match_found".to_string(),
            verdict: "definitely_maybe".to_string(),
            website_url: None,
            detail: None,
            checked_at: Utc::now(),
        };
        assert_eq!(record.verdict_kind(), Verdict::Inconclusive);
    }
}
