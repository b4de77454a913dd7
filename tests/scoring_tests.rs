/// Lead scoring invariants: bounds, caps, disqualification, idempotence.
use chrono::Utc;
use uuid::Uuid;

use leadscout::models::{Business, BusinessContact, BusinessDomain, ConfidenceLevel};
use leadscout::scoring::{score_business, ScoreCaps, ScoringFeatures};

fn business(website: Option<&str>, category: Option<&str>) -> Business {
    Business {
        id: Uuid::new_v4(),
        source: "osm".to_string(),
        source_id: "node/42".to_string(),
        name: Some("Gayne Denture Clinic".to_string()),
        category: category.map(str::to_string),
        address: Some("12 King St W".to_string()),
        city: Some("Toronto".to_string()),
        country: Some("CA".to_string()),
        website_url: website.map(str::to_string),
        lead_score: None,
        score_reasons: None,
        confidence: None,
        scored_at: None,
        exported: false,
        created_at: Utc::now(),
    }
}

fn contact(kind: &str, value: &str) -> BusinessContact {
    BusinessContact {
        id: Uuid::new_v4(),
        business_id: Uuid::new_v4(),
        contact_type: kind.to_string(),
        value: value.to_string(),
        source: Some("import".to_string()),
        created_at: Utc::now(),
    }
}

fn domain(name: &str, status: &str) -> BusinessDomain {
    BusinessDomain {
        business_id: Uuid::new_v4(),
        domain: name.to_string(),
        status: status.to_string(),
    }
}

fn rich_features() -> ScoringFeatures {
    ScoringFeatures::build(
        &[
            contact("email", "info@gaynedentures.ca"),
            contact("phone", "+14165550100"),
        ],
        &[domain("gaynedentures.ca", "verified_unhosted")],
    )
}

const ALL_LEVELS: [ConfidenceLevel; 4] = [
    ConfidenceLevel::Unverified,
    ConfidenceLevel::Low,
    ConfidenceLevel::Medium,
    ConfidenceLevel::High,
];

#[test]
fn score_is_always_in_bounds() {
    let caps = ScoreCaps::default();
    let feature_sets = [
        ScoringFeatures::default(),
        rich_features(),
        ScoringFeatures::build(&[], &[domain("x.com", "hosted")]),
        ScoringFeatures::build(&[contact("email", "a@gmail.com")], &[]),
    ];
    for confidence in ALL_LEVELS {
        for features in &feature_sets {
            for biz in [business(None, Some("trades")), business(None, None)] {
                let (score, _) = score_business(&biz, confidence, features, &caps);
                assert!((0.0..=100.0).contains(&score), "score {} out of bounds", score);
            }
        }
    }
}

#[test]
fn unverified_businesses_are_capped() {
    let caps = ScoreCaps::default();
    let (score, _) = score_business(
        &business(None, Some("trades")),
        ConfidenceLevel::Unverified,
        &rich_features(),
        &caps,
    );
    assert!(score <= caps.unverified_cap);
}

#[test]
fn low_confidence_cap_sits_above_unverified_cap() {
    let caps = ScoreCaps::default();
    assert!(caps.low_confidence_cap > caps.unverified_cap);

    let (low_score, _) = score_business(
        &business(None, Some("trades")),
        ConfidenceLevel::Low,
        &rich_features(),
        &caps,
    );
    let (unverified_score, _) = score_business(
        &business(None, Some("trades")),
        ConfidenceLevel::Unverified,
        &rich_features(),
        &caps,
    );
    assert!(low_score >= unverified_score);
    assert!(low_score <= caps.low_confidence_cap);
}

#[test]
fn zero_contacts_always_capped() {
    let caps = ScoreCaps::default();
    let no_contacts = ScoringFeatures::build(&[], &[domain("gaynedentures.ca", "verified_unhosted")]);
    for confidence in ALL_LEVELS {
        let (score, reasons) =
            score_business(&business(None, Some("trades")), confidence, &no_contacts, &caps);
        assert!(
            score <= caps.no_contact_cap,
            "confidence {:?}: score {} above contact cap",
            confidence,
            score
        );
        if score == caps.no_contact_cap {
            assert!(reasons.applied_caps.contains(&"no_contact_cap".to_string()));
        }
    }
}

#[test]
fn caps_only_lower_never_raise() {
    let caps = ScoreCaps::default();
    // A sparse business whose base score is already below every cap must
    // keep its base score untouched.
    let sparse = ScoringFeatures::build(&[contact("phone", "+14165550100")], &[]);
    let (score, reasons) = score_business(
        &business(None, None),
        ConfidenceLevel::Unverified,
        &sparse,
        &caps,
    );
    // 25 (no website) + 15 (phone) = 40 < unverified cap 45
    assert_eq!(score, reasons.base_score);
    assert!(reasons.applied_caps.is_empty());
}

#[test]
fn chain_match_forces_zero_regardless_of_everything() {
    let caps = ScoreCaps::default();
    let biz = business(Some("https://www.mcdonalds.com/ca"), Some("food"));
    for confidence in ALL_LEVELS {
        let (score, reasons) = score_business(&biz, confidence, &rich_features(), &caps);
        assert_eq!(score, 0.0);
        assert!(reasons.disqualified);
    }
}

#[test]
fn chain_match_via_linked_domain() {
    let caps = ScoreCaps::default();
    let features = ScoringFeatures::build(
        &[contact("phone", "+14165550100")],
        &[domain("subway.com", "new")],
    );
    let (score, reasons) = score_business(
        &business(None, Some("food")),
        ConfidenceLevel::High,
        &features,
        &caps,
    );
    assert_eq!(score, 0.0);
    assert!(reasons
        .disqualification_reasons
        .iter()
        .any(|r| r.contains("subway.com")));
}

#[test]
fn scoring_is_total_on_missing_inputs() {
    let caps = ScoreCaps::default();
    let mut biz = business(None, None);
    biz.name = None;
    biz.category = None;
    let (score, reasons) =
        score_business(&biz, ConfidenceLevel::Unverified, &ScoringFeatures::default(), &caps);
    assert!((0.0..=100.0).contains(&score));
    assert!(!reasons.disqualified);
    // No contacts at all → contact cap governs.
    assert!(score <= caps.no_contact_cap);
}

#[test]
fn rescoring_same_inputs_is_stable() {
    let caps = ScoreCaps::default();
    let biz = business(None, Some("health"));
    let features = rich_features();
    let runs: Vec<f64> = (0..5)
        .map(|_| score_business(&biz, ConfidenceLevel::Medium, &features, &caps).0)
        .collect();
    assert!(runs.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn higher_confidence_never_scores_lower() {
    let caps = ScoreCaps::default();
    let biz = business(None, Some("trades"));
    let features = rich_features();
    let scores: Vec<f64> = ALL_LEVELS
        .iter()
        .map(|c| score_business(&biz, *c, &features, &caps).0)
        .collect();
    assert!(scores.windows(2).all(|w| w[0] <= w[1]), "scores: {:?}", scores);
}

#[test]
fn score_reasons_serialize_for_audit() {
    let caps = ScoreCaps::default();
    let (_, reasons) = score_business(
        &business(None, Some("trades")),
        ConfidenceLevel::Unverified,
        &rich_features(),
        &caps,
    );
    let json = reasons.to_json();
    assert_eq!(json["confidence"], "unverified");
    assert_eq!(json["has_business_email"], true);
    assert!(json["applied_caps"]
        .as_array()
        .unwrap()
        .contains(&serde_json::json!("unverified_cap")));
}
