//! Lead scoring: a pure, total function of the business's current state.
//!
//! Base points come from attribute richness and domain qualification;
//! confidence and contact caps can only lower the result. Chain/franchise
//! matches are disqualified outright. Same inputs always produce the same
//! score, so rescoring is cheap and safe to repeat.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use crate::domain_utils::{extract_domain_from_email, is_public_email_domain, normalize_domain};
use crate::models::{Business, BusinessContact, BusinessDomain, ConfidenceLevel};

pub const HIGH_PRIORITY_CATEGORIES: [&str; 2] = ["trades", "contractors"];
pub const MEDIUM_PRIORITY_CATEGORIES: [&str; 5] =
    ["professional_services", "retail", "health", "food", "auto"];

/// Domains of known chains and franchises. A business whose claimed site
/// or linked domain lands here is not a lead, whatever else we know.
pub const KNOWN_CHAIN_DOMAINS: [&str; 16] = [
    "mcdonalds.com",
    "subway.com",
    "starbucks.com",
    "kfc.com",
    "dominos.com",
    "pizzahut.com",
    "burgerking.com",
    "dunkindonuts.com",
    "timhortons.com",
    "7eleven.com",
    "circlek.com",
    "walmart.com",
    "carrefour.com",
    "sparglobal.com",
    "hilton.com",
    "marriott.com",
];

const VERIFIED_UNHOSTED_STATUSES: [&str; 6] = [
    "verified_unhosted",
    "mx_missing",
    "checked",
    "no_mx",
    "enriched",
    "no_contacts",
];
const UNREGISTERED_CANDIDATE_STATUSES: [&str; 1] = ["unregistered_candidate"];
const HOSTED_STATUSES: [&str; 1] = ["hosted"];
const PARKED_STATUSES: [&str; 1] = ["parked"];

/// Ceilings applied after the base score. Only ever lower the result.
#[derive(Debug, Clone, Copy)]
pub struct ScoreCaps {
    /// Unverified businesses cannot outrank verified ones.
    pub unverified_cap: f64,
    /// Checked-but-learned-nothing businesses get a slightly higher lid.
    pub low_confidence_cap: f64,
    /// A lead with no contact channel is not actionable.
    pub no_contact_cap: f64,
}

impl Default for ScoreCaps {
    fn default() -> Self {
        Self {
            unverified_cap: 45.0,
            low_confidence_cap: 60.0,
            no_contact_cap: 20.0,
        }
    }
}

/// Feature set derived from a business's contacts and linked domains.
#[derive(Debug, Clone, Default)]
pub struct ScoringFeatures {
    pub emails: BTreeSet<String>,
    pub business_emails: BTreeSet<String>,
    pub phones: BTreeSet<String>,
    pub domains: BTreeSet<String>,
    pub verified_unhosted_domains: BTreeSet<String>,
    pub unregistered_domains: BTreeSet<String>,
    pub hosted_domains: BTreeSet<String>,
    pub parked_domains: BTreeSet<String>,
    pub domain_status_counts: BTreeMap<String, usize>,
}

impl ScoringFeatures {
    pub fn build(contacts: &[BusinessContact], domains: &[BusinessDomain]) -> Self {
        let mut features = Self::default();

        for contact in contacts {
            let value = contact.value.trim();
            if value.is_empty() {
                continue;
            }
            match contact.contact_type.as_str() {
                "email" => {
                    let email = value.to_lowercase();
                    features.emails.insert(email.clone());
                    if let Some(domain) = extract_domain_from_email(&email) {
                        if !is_public_email_domain(&domain) {
                            features.business_emails.insert(email);
                        }
                    }
                }
                "phone" => {
                    features.phones.insert(value.to_string());
                }
                _ => {}
            }
        }

        for entry in domains {
            let Some(normalized) = normalize_domain(&entry.domain) else {
                continue;
            };
            if is_public_email_domain(&normalized) {
                continue;
            }
            features.domains.insert(normalized.clone());
            let status = entry.status.trim();
            *features
                .domain_status_counts
                .entry(status.to_string())
                .or_insert(0) += 1;

            if VERIFIED_UNHOSTED_STATUSES.contains(&status) {
                features.verified_unhosted_domains.insert(normalized);
            } else if UNREGISTERED_CANDIDATE_STATUSES.contains(&status) {
                features.unregistered_domains.insert(normalized);
            } else if HOSTED_STATUSES.contains(&status) {
                features.hosted_domains.insert(normalized);
            } else if PARKED_STATUSES.contains(&status) {
                features.parked_domains.insert(normalized);
            }
        }

        features
    }

    pub fn contact_count(&self) -> usize {
        self.emails.len() + self.phones.len()
    }
}

/// Why a score came out the way it did; persisted as jsonb for audit.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReasons {
    pub category: Option<String>,
    pub confidence: ConfidenceLevel,
    pub has_email: bool,
    pub has_business_email: bool,
    pub has_phone: bool,
    pub domain_count: usize,
    pub verified_unhosted_domain_count: usize,
    pub unregistered_domain_count: usize,
    pub base_score: f64,
    pub applied_caps: Vec<String>,
    pub disqualified: bool,
    pub disqualification_reasons: Vec<String>,
}

impl ScoreReasons {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn chain_domain_match(business: &Business, features: &ScoringFeatures) -> Option<String> {
    if let Some(claimed) = business
        .website_url
        .as_deref()
        .and_then(normalize_domain)
    {
        if KNOWN_CHAIN_DOMAINS.contains(&claimed.as_str()) {
            return Some(claimed);
        }
    }
    features
        .domains
        .iter()
        .find(|d| KNOWN_CHAIN_DOMAINS.contains(&d.as_str()))
        .cloned()
}

/// Score one business. Total: missing inputs degrade to the lowest
/// contribution, never an error. Result is always within [0, 100].
pub fn score_business(
    business: &Business,
    confidence: ConfidenceLevel,
    features: &ScoringFeatures,
    caps: &ScoreCaps,
) -> (f64, ScoreReasons) {
    let category = business
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    let mut reasons = ScoreReasons {
        category: category.clone(),
        confidence,
        has_email: !features.emails.is_empty(),
        has_business_email: !features.business_emails.is_empty(),
        has_phone: !features.phones.is_empty(),
        domain_count: features.domains.len(),
        verified_unhosted_domain_count: features.verified_unhosted_domains.len(),
        unregistered_domain_count: features.unregistered_domains.len(),
        base_score: 0.0,
        applied_caps: Vec::new(),
        disqualified: false,
        disqualification_reasons: Vec::new(),
    };

    // Outright disqualification: a hosted/parked domain signal means the
    // business has a site after all; a chain match means we never want it.
    if let Some(chain) = chain_domain_match(business, features) {
        reasons.disqualified = true;
        reasons
            .disqualification_reasons
            .push(format!("chain_domain:{}", chain));
        return (0.0, reasons);
    }
    if !features.hosted_domains.is_empty() || !features.parked_domains.is_empty() {
        reasons.disqualified = true;
        if !features.hosted_domains.is_empty() {
            reasons
                .disqualification_reasons
                .push("hosted_domain_signal".to_string());
        }
        if !features.parked_domains.is_empty() {
            reasons
                .disqualification_reasons
                .push("parked_domain_signal".to_string());
        }
        return (0.0, reasons);
    }

    let mut score: f64 = 0.0;

    if business.website_url.is_none() {
        score += 25.0;
    }
    if reasons.has_business_email {
        score += 20.0;
    } else if reasons.has_email {
        score += 5.0;
    }
    if reasons.has_phone {
        score += 15.0;
    }

    if !features.verified_unhosted_domains.is_empty() {
        score += 35.0;
    } else if !features.unregistered_domains.is_empty() {
        score += 20.0;
    } else if !features.domains.is_empty() {
        score += 10.0;
    }

    match category.as_deref() {
        Some(c) if HIGH_PRIORITY_CATEGORIES.contains(&c) => score += 20.0,
        Some(c) if MEDIUM_PRIORITY_CATEGORIES.contains(&c) => score += 10.0,
        Some(_) => score += 5.0,
        None => {}
    }

    reasons.base_score = score.min(100.0);
    let mut capped = reasons.base_score;

    match confidence {
        ConfidenceLevel::Unverified => {
            if capped > caps.unverified_cap {
                capped = caps.unverified_cap;
                reasons.applied_caps.push("unverified_cap".to_string());
            }
        }
        ConfidenceLevel::Low => {
            if capped > caps.low_confidence_cap {
                capped = caps.low_confidence_cap;
                reasons.applied_caps.push("low_confidence_cap".to_string());
            }
        }
        ConfidenceLevel::Medium | ConfidenceLevel::High => {}
    }

    if features.contact_count() == 0 && capped > caps.no_contact_cap {
        capped = caps.no_contact_cap;
        reasons.applied_caps.push("no_contact_cap".to_string());
    }

    (capped.clamp(0.0, 100.0), reasons)
}
