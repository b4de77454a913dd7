//! Raw outcome vocabulary and the verdict classifier.
//!
//! Each adapter reports an open string code at its boundary; this module
//! owns the fixed mapping from (source, code) to the closed three-value
//! verdict enum. Unknown codes classify as inconclusive, never raise.

use crate::models::{VerificationSource, Verdict};

/// Domain-candidate prober outcome codes.
pub mod domain_guess {
    /// A live, non-parked, content-relevant candidate answered.
    pub const MATCH_FOUND: &str = "match_found";
    /// All generated candidates probed, none was this business's site.
    pub const NO_MATCH_AFTER_CANDIDATES: &str = "no_match_after_candidates";
    /// Name too thin to generate candidates; probing skipped.
    pub const NO_CANDIDATES: &str = "no_candidates";
}

/// Search-engine lookup outcome codes.
pub mod search_engine {
    pub const WEBSITE_FOUND: &str = "website_found";
    /// Results came back but none was an owned business site.
    pub const NO_WEBSITE_IN_RESULTS: &str = "no_website_in_results";
    /// Upstream answered with zero usable results.
    pub const NO_RESULTS: &str = "no_results";
    /// Rate-limited or blocked; distinct from a genuine empty answer.
    pub const BLOCKED_RESPONSE: &str = "blocked_response";
    /// Body was not parseable as a result list.
    pub const MALFORMED_RESPONSE: &str = "malformed_response";
    /// Network-level failure talking to the upstream.
    pub const UPSTREAM_ERROR: &str = "upstream_error";
}

/// AI disambiguator outcome codes.
pub mod ai_disambiguator {
    pub const CONFIRMED_WEBSITE: &str = "confirmed_website";
    pub const CONFIRMED_ABSENT: &str = "confirmed_absent";
    pub const NOT_SURE: &str = "not_sure";
    pub const PROVIDER_ERROR: &str = "provider_error";
}

/// Places / directory cross-check outcome codes (shared vocabulary).
pub mod places {
    pub const WEBSITE_LISTED: &str = "website_listed";
    pub const LISTING_WITHOUT_WEBSITE: &str = "listing_without_website";
    pub const NOT_FOUND: &str = "not_found";
    pub const API_ERROR: &str = "api_error";
}

/// Classify a raw outcome code into a verdict.
///
/// The table is fixed and explicit per source — nothing is inferred at
/// runtime. Total: every string maps to exactly one verdict.
pub fn classify(source: VerificationSource, outcome: &str) -> Verdict {
    match source {
        VerificationSource::DomainGuess => match outcome {
            domain_guess::MATCH_FOUND => Verdict::ConclusivePositive,
            domain_guess::NO_MATCH_AFTER_CANDIDATES => Verdict::ConclusiveNegative,
            _ => Verdict::Inconclusive,
        },
        VerificationSource::SearchEngine => match outcome {
            search_engine::WEBSITE_FOUND => Verdict::ConclusivePositive,
            search_engine::NO_WEBSITE_IN_RESULTS => Verdict::ConclusiveNegative,
            _ => Verdict::Inconclusive,
        },
        VerificationSource::AiDisambiguator => match outcome {
            ai_disambiguator::CONFIRMED_WEBSITE => Verdict::ConclusivePositive,
            ai_disambiguator::CONFIRMED_ABSENT => Verdict::ConclusiveNegative,
            _ => Verdict::Inconclusive,
        },
        VerificationSource::PlacesApi | VerificationSource::DirectoryApi => match outcome {
            places::WEBSITE_LISTED => Verdict::ConclusivePositive,
            places::LISTING_WITHOUT_WEBSITE => Verdict::ConclusiveNegative,
            _ => Verdict::Inconclusive,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_guess_mapping() {
        let src = VerificationSource::DomainGuess;
        assert_eq!(
            classify(src, domain_guess::MATCH_FOUND),
            Verdict::ConclusivePositive
        );
        assert_eq!(
            classify(src, domain_guess::NO_MATCH_AFTER_CANDIDATES),
            Verdict::ConclusiveNegative
        );
        assert_eq!(
            classify(src, domain_guess::NO_CANDIDATES),
            Verdict::Inconclusive
        );
    }

    #[test]
    fn search_engine_mapping() {
        let src = VerificationSource::SearchEngine;
        assert_eq!(
            classify(src, search_engine::WEBSITE_FOUND),
            Verdict::ConclusivePositive
        );
        assert_eq!(
            classify(src, search_engine::NO_WEBSITE_IN_RESULTS),
            Verdict::ConclusiveNegative
        );
        // Blocked and empty both classify inconclusive, but the raw codes
        // stay distinguishable for audit.
        assert_eq!(
            classify(src, search_engine::NO_RESULTS),
            Verdict::Inconclusive
        );
        assert_eq!(
            classify(src, search_engine::BLOCKED_RESPONSE),
            Verdict::Inconclusive
        );
        assert_eq!(
            classify(src, search_engine::MALFORMED_RESPONSE),
            Verdict::Inconclusive
        );
        assert_eq!(
            classify(src, search_engine::UPSTREAM_ERROR),
            Verdict::Inconclusive
        );
    }

    #[test]
    fn ai_disambiguator_mapping() {
        let src = VerificationSource::AiDisambiguator;
        assert_eq!(
            classify(src, ai_disambiguator::CONFIRMED_WEBSITE),
            Verdict::ConclusivePositive
        );
        assert_eq!(
            classify(src, ai_disambiguator::CONFIRMED_ABSENT),
            Verdict::ConclusiveNegative
        );
        assert_eq!(
            classify(src, ai_disambiguator::NOT_SURE),
            Verdict::Inconclusive
        );
        assert_eq!(
            classify(src, ai_disambiguator::PROVIDER_ERROR),
            Verdict::Inconclusive
        );
    }

    #[test]
    fn places_and_directory_share_vocabulary() {
        for src in [
            VerificationSource::PlacesApi,
            VerificationSource::DirectoryApi,
        ] {
            assert_eq!(
                classify(src, places::WEBSITE_LISTED),
                Verdict::ConclusivePositive
            );
            assert_eq!(
                classify(src, places::LISTING_WITHOUT_WEBSITE),
                Verdict::ConclusiveNegative
            );
            assert_eq!(classify(src, places::NOT_FOUND), Verdict::Inconclusive);
        }
    }

    #[test]
    fn unknown_outcomes_are_inconclusive() {
        for src in VerificationSource::ALL {
            assert_eq!(classify(src, "surprise_new_code"), Verdict::Inconclusive);
            assert_eq!(classify(src, ""), Verdict::Inconclusive);
        }
    }
}
