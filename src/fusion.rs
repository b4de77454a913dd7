//! Confidence fusion: reconcile the verification history of one business
//! into a confidence level and a has-website verdict.
//!
//! Only the latest record per source counts — repeated inconclusive
//! retries never accumulate. Two policies live behind one entry point:
//! plain conclusive-source counting and weighted fusion. Weighted is the
//! default and subsumes binary under a {0,1} weight assignment.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::models::{
    ConfidenceLevel, HasWebsiteVerdict, VerificationRecord, VerificationSource, Verdict,
};

/// Confidence contribution of a specific (source, outcome) pair.
///
/// Configuration, not adapter logic: the table can be retuned without
/// touching any adapter. Outcomes missing from the table fall back to
/// 1.0 when conclusive and 0.0 when inconclusive.
#[derive(Debug, Clone)]
pub struct WeightTable {
    weights: HashMap<(VerificationSource, String), f64>,
    pub high_threshold: f64,
    pub medium_threshold: f64,
}

impl Default for WeightTable {
    fn default() -> Self {
        use crate::verdict::{ai_disambiguator, domain_guess, places, search_engine};

        let mut table = Self::empty();
        // A prober negative after exhausting candidates is strong but not
        // airtight; an AI verdict over real search results is stronger.
        table.set(
            VerificationSource::DomainGuess,
            domain_guess::NO_MATCH_AFTER_CANDIDATES,
            0.7,
        );
        table.set(
            VerificationSource::SearchEngine,
            search_engine::NO_WEBSITE_IN_RESULTS,
            0.6,
        );
        table.set(
            VerificationSource::AiDisambiguator,
            ai_disambiguator::CONFIRMED_ABSENT,
            0.9,
        );
        table.set(
            VerificationSource::PlacesApi,
            places::LISTING_WITHOUT_WEBSITE,
            0.8,
        );
        table.set(
            VerificationSource::DirectoryApi,
            places::LISTING_WITHOUT_WEBSITE,
            0.6,
        );
        table
    }
}

impl WeightTable {
    pub fn empty() -> Self {
        Self {
            weights: HashMap::new(),
            high_threshold: 1.5,
            medium_threshold: 0.7,
        }
    }

    pub fn set(&mut self, source: VerificationSource, outcome: &str, weight: f64) {
        self.weights
            .insert((source, outcome.to_string()), weight.clamp(0.0, 1.0));
    }

    /// Weight for one classified record.
    pub fn weight(&self, source: VerificationSource, outcome: &str, verdict: Verdict) -> f64 {
        if let Some(w) = self.weights.get(&(source, outcome.to_string())) {
            return *w;
        }
        if verdict.is_conclusive() {
            1.0
        } else {
            0.0
        }
    }
}

/// How to pick the canonical URL when two sources report different
/// conclusive-positive websites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    MostRecent,
    HighestWeight,
}

#[derive(Debug, Clone)]
pub enum FusionPolicy {
    Binary,
    Weighted(WeightTable),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    PositiveUrlMismatch,
    PositiveVsNegative,
}

/// A disagreement between sources, surfaced rather than dropped.
#[derive(Debug, Clone, Serialize)]
pub struct VerdictConflict {
    pub kind: ConflictKind,
    pub sources: Vec<VerificationSource>,
    pub urls: Vec<String>,
}

/// Latest classified state of one source, for the API surface.
#[derive(Debug, Clone, Serialize)]
pub struct SourceVerdict {
    pub source: VerificationSource,
    pub outcome: String,
    pub verdict: Verdict,
    pub website_url: Option<String>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FusionOutcome {
    pub confidence: ConfidenceLevel,
    pub has_website: HasWebsiteVerdict,
    pub conclusive_sources: usize,
    pub total_weight: f64,
    pub latest: Vec<SourceVerdict>,
    pub conflicts: Vec<VerdictConflict>,
}

pub struct FusionEngine {
    policy: FusionPolicy,
    conflict_policy: ConflictPolicy,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self {
            policy: FusionPolicy::Weighted(WeightTable::default()),
            conflict_policy: ConflictPolicy::MostRecent,
        }
    }
}

impl FusionEngine {
    pub fn new(policy: FusionPolicy, conflict_policy: ConflictPolicy) -> Self {
        Self {
            policy,
            conflict_policy,
        }
    }

    pub fn binary() -> Self {
        Self::new(FusionPolicy::Binary, ConflictPolicy::MostRecent)
    }

    /// Fuse a consistent snapshot of one business's verification history.
    ///
    /// The caller must pass every record it wants considered; fusion
    /// itself reduces to the latest record per source.
    pub fn fuse(&self, records: &[VerificationRecord]) -> FusionOutcome {
        let latest = latest_per_source(records);

        let conclusive_sources = latest
            .values()
            .filter(|r| r.verdict_kind().is_conclusive())
            .count();

        let total_weight = match &self.policy {
            FusionPolicy::Binary => conclusive_sources as f64,
            FusionPolicy::Weighted(table) => latest
                .iter()
                .map(|(source, record)| {
                    table.weight(*source, &record.outcome, record.verdict_kind())
                })
                .sum(),
        };

        let confidence = if latest.is_empty() {
            ConfidenceLevel::Unverified
        } else {
            match &self.policy {
                FusionPolicy::Binary => match conclusive_sources {
                    0 => ConfidenceLevel::Low,
                    1 => ConfidenceLevel::Medium,
                    _ => ConfidenceLevel::High,
                },
                FusionPolicy::Weighted(table) => {
                    if total_weight >= table.high_threshold {
                        ConfidenceLevel::High
                    } else if total_weight >= table.medium_threshold {
                        ConfidenceLevel::Medium
                    } else {
                        ConfidenceLevel::Low
                    }
                }
            }
        };

        let (has_website, conflicts) = self.resolve_website(&latest);

        let latest_view = latest
            .iter()
            .map(|(source, record)| SourceVerdict {
                source: *source,
                outcome: record.outcome.clone(),
                verdict: record.verdict_kind(),
                website_url: record.website_url.clone(),
                checked_at: record.checked_at,
            })
            .collect();

        FusionOutcome {
            confidence,
            has_website,
            conclusive_sources,
            total_weight,
            latest: latest_view,
            conflicts,
        }
    }

    /// Positive evidence wins over negative; the most recent (or highest
    /// weight) positive URL wins among positives. Conflicts are recorded,
    /// never silently discarded.
    fn resolve_website(
        &self,
        latest: &BTreeMap<VerificationSource, &VerificationRecord>,
    ) -> (HasWebsiteVerdict, Vec<VerdictConflict>) {
        let positives: Vec<(VerificationSource, &VerificationRecord)> = latest
            .iter()
            .filter(|(_, r)| r.verdict_kind() == Verdict::ConclusivePositive)
            .map(|(s, r)| (*s, *r))
            .collect();
        let negatives: Vec<VerificationSource> = latest
            .iter()
            .filter(|(_, r)| r.verdict_kind() == Verdict::ConclusiveNegative)
            .map(|(s, _)| *s)
            .collect();

        let mut conflicts = Vec::new();

        if !positives.is_empty() && !negatives.is_empty() {
            let sources: Vec<VerificationSource> = positives
                .iter()
                .map(|(s, _)| *s)
                .chain(negatives.iter().copied())
                .collect();
            tracing::warn!(
                ?sources,
                "conflicting conclusive verdicts; positive evidence wins"
            );
            conflicts.push(VerdictConflict {
                kind: ConflictKind::PositiveVsNegative,
                sources,
                urls: positives
                    .iter()
                    .filter_map(|(_, r)| r.website_url.clone())
                    .collect(),
            });
        }

        let with_urls: Vec<(VerificationSource, &VerificationRecord)> = positives
            .iter()
            .filter(|(_, r)| r.website_url.is_some())
            .copied()
            .collect();

        let distinct_urls: Vec<String> = {
            let mut urls: Vec<String> = with_urls
                .iter()
                .filter_map(|(_, r)| r.website_url.clone())
                .collect();
            urls.sort();
            urls.dedup();
            urls
        };
        if distinct_urls.len() > 1 {
            let sources: Vec<VerificationSource> = with_urls.iter().map(|(s, _)| *s).collect();
            tracing::warn!(?sources, urls = ?distinct_urls, "sources disagree on website URL");
            conflicts.push(VerdictConflict {
                kind: ConflictKind::PositiveUrlMismatch,
                sources,
                urls: distinct_urls,
            });
        }

        let winner: Option<&VerificationRecord> = match self.conflict_policy {
            ConflictPolicy::MostRecent => with_urls
                .iter()
                .max_by_key(|(_, r)| r.checked_at)
                .map(|(_, r)| *r),
            ConflictPolicy::HighestWeight => {
                let table = match &self.policy {
                    FusionPolicy::Weighted(table) => Some(table),
                    FusionPolicy::Binary => None,
                };
                with_urls
                    .iter()
                    .max_by(|a, b| {
                        let wa = table
                            .map(|t| t.weight(a.0, &a.1.outcome, a.1.verdict_kind()))
                            .unwrap_or(1.0);
                        let wb = table
                            .map(|t| t.weight(b.0, &b.1.outcome, b.1.verdict_kind()))
                            .unwrap_or(1.0);
                        wa.partial_cmp(&wb)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then(a.1.checked_at.cmp(&b.1.checked_at))
                    })
                    .map(|(_, r)| *r)
            }
        };

        let verdict = if let Some(record) = winner {
            // with_urls is non-empty here, so the URL is present.
            HasWebsiteVerdict::Positive(record.website_url.clone().unwrap_or_default())
        } else if !positives.is_empty() {
            // Positive verdicts without a captured URL settle nothing.
            HasWebsiteVerdict::Unknown
        } else if !negatives.is_empty() {
            HasWebsiteVerdict::Negative
        } else {
            HasWebsiteVerdict::Unknown
        };

        (verdict, conflicts)
    }
}

/// Reduce a history to the latest record per source. Records with an
/// unknown source label are ignored rather than miscounted.
fn latest_per_source(
    records: &[VerificationRecord],
) -> BTreeMap<VerificationSource, &VerificationRecord> {
    let mut latest: BTreeMap<VerificationSource, &VerificationRecord> = BTreeMap::new();
    for record in records {
        let Some(source) = record.source_kind() else {
            continue;
        };
        match latest.get(&source) {
            Some(existing) if existing.checked_at >= record.checked_at => {}
            _ => {
                latest.insert(source, record);
            }
        }
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn record(
        source: VerificationSource,
        outcome: &str,
        verdict: Verdict,
        url: Option<&str>,
        age_minutes: i64,
    ) -> VerificationRecord {
        VerificationRecord {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            source: source.as_str().to_string(),
            outcome: outcome.to_string(),
            verdict: verdict.as_str().to_string(),
            website_url: url.map(|u| u.to_string()),
            detail: None,
            checked_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    #[test]
    fn empty_history_is_unverified() {
        let outcome = FusionEngine::default().fuse(&[]);
        assert_eq!(outcome.confidence, ConfidenceLevel::Unverified);
        assert_eq!(outcome.has_website, HasWebsiteVerdict::Unknown);
    }

    #[test]
    fn all_inconclusive_is_low() {
        let records = vec![
            record(
                VerificationSource::SearchEngine,
                "no_results",
                Verdict::Inconclusive,
                None,
                10,
            ),
            record(
                VerificationSource::AiDisambiguator,
                "not_sure",
                Verdict::Inconclusive,
                None,
                5,
            ),
        ];
        assert_eq!(
            FusionEngine::default().fuse(&records).confidence,
            ConfidenceLevel::Low
        );
        assert_eq!(
            FusionEngine::binary().fuse(&records).confidence,
            ConfidenceLevel::Low
        );
    }

    #[test]
    fn only_latest_record_per_source_counts() {
        // An old conclusive verdict superseded by a newer inconclusive one
        // must not keep contributing.
        let records = vec![
            record(
                VerificationSource::DomainGuess,
                "no_match_after_candidates",
                Verdict::ConclusiveNegative,
                None,
                120,
            ),
            record(
                VerificationSource::DomainGuess,
                "no_candidates",
                Verdict::Inconclusive,
                None,
                1,
            ),
        ];
        let outcome = FusionEngine::default().fuse(&records);
        assert_eq!(outcome.conclusive_sources, 0);
        assert_eq!(outcome.confidence, ConfidenceLevel::Low);
    }

    #[test]
    fn weighted_thresholds() {
        // 0.7 from the prober negative alone → medium.
        let mut records = vec![record(
            VerificationSource::DomainGuess,
            "no_match_after_candidates",
            Verdict::ConclusiveNegative,
            None,
            30,
        )];
        let engine = FusionEngine::default();
        assert_eq!(engine.fuse(&records).confidence, ConfidenceLevel::Medium);

        // Adding the 0.9 AI negative → 1.6 → high.
        records.push(record(
            VerificationSource::AiDisambiguator,
            "confirmed_absent",
            Verdict::ConclusiveNegative,
            None,
            10,
        ));
        let outcome = engine.fuse(&records);
        assert!((outcome.total_weight - 1.6).abs() < 1e-9);
        assert_eq!(outcome.confidence, ConfidenceLevel::High);
    }

    #[test]
    fn positive_wins_over_negative_and_conflict_is_surfaced() {
        let records = vec![
            record(
                VerificationSource::DomainGuess,
                "match_found",
                Verdict::ConclusivePositive,
                Some("https://joespizza.com"),
                60,
            ),
            record(
                VerificationSource::AiDisambiguator,
                "confirmed_absent",
                Verdict::ConclusiveNegative,
                None,
                5,
            ),
        ];
        let outcome = FusionEngine::default().fuse(&records);
        assert_eq!(
            outcome.has_website,
            HasWebsiteVerdict::Positive("https://joespizza.com".to_string())
        );
        assert_eq!(outcome.confidence, ConfidenceLevel::High);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::PositiveVsNegative);
    }

    #[test]
    fn most_recent_positive_url_wins() {
        let records = vec![
            record(
                VerificationSource::DomainGuess,
                "match_found",
                Verdict::ConclusivePositive,
                Some("https://old-candidate.com"),
                60,
            ),
            record(
                VerificationSource::PlacesApi,
                "website_listed",
                Verdict::ConclusivePositive,
                Some("https://listed-site.com"),
                5,
            ),
        ];
        let outcome = FusionEngine::default().fuse(&records);
        assert_eq!(
            outcome.has_website,
            HasWebsiteVerdict::Positive("https://listed-site.com".to_string())
        );
        assert!(outcome
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::PositiveUrlMismatch));
    }
}
