/// Integration tests with mocked upstream evidence sources
/// Exercise the adapters end-to-end without hitting real services
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use leadscout::ai_disambiguator::AiDisambiguator;
use leadscout::config::Config;
use leadscout::directory_lookup::DirectoryLookup;
use leadscout::models::{BusinessSnapshot, VerificationSource, Verdict};
use leadscout::places_lookup::PlacesLookup;
use leadscout::search_lookup::SearchLookup;
use leadscout::sources::EvidenceSource;
use leadscout::verdict::{ai_disambiguator, classify, places, search_engine};

/// Helper function to create test config pointing at a mock server
fn create_test_config(mock_uri: &str) -> Config {
    Config {
        database_url: "postgresql://test".to_string(),
        port: 3000,
        search_endpoint: format!("{}/search", mock_uri),
        http_user_agent: "leadscout-test".to_string(),
        places_api_key: Some("test_places_key".to_string()),
        directory_api_key: Some("test_directory_key".to_string()),
        openrouter_api_key: Some("test_llm_key".to_string()),
        gemini_api_key: None,
        groq_api_key: None,
        openrouter_base_url: Some(mock_uri.to_string()),
        gemini_base_url: None,
        groq_base_url: None,
        places_base_url: Some(mock_uri.to_string()),
        directory_base_url: Some(mock_uri.to_string()),
        auto_runner_enabled: false,
    }
}

fn snapshot(name: &str, city: Option<&str>) -> BusinessSnapshot {
    BusinessSnapshot {
        id: Uuid::new_v4(),
        name: name.to_string(),
        category: Some("auto".to_string()),
        address: None,
        city: city.map(str::to_string),
        country: Some("CA".to_string()),
        website_url: None,
    }
}

fn search_results_body(results: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "results": results })
}

// ---------------------------------------------------------------------
// Search-engine lookup
// ---------------------------------------------------------------------

#[tokio::test]
async fn search_finds_website_from_domain_match() {
    let mock_server = MockServer::start().await;

    let body = search_results_body(serde_json::json!([
        {
            "title": "Morton Motors on Yelp",
            "url": "https://www.yelp.ca/biz/morton-motors-toronto",
            "content": "Reviews of Morton Motors"
        },
        {
            "title": "Morton Motors | Used Cars Toronto",
            "url": "https://mortonmotors.com/",
            "content": "Family-owned used car dealership"
        }
    ]));

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&mock_server)
        .await;

    let adapter = SearchLookup::new(&create_test_config(&mock_server.uri()));
    let outcome = adapter.check(&snapshot("Morton Motors", Some("Toronto"))).await;

    assert_eq!(outcome.code, search_engine::WEBSITE_FOUND);
    assert_eq!(
        outcome.website_url.as_deref(),
        Some("https://mortonmotors.com/")
    );
    assert_eq!(
        classify(VerificationSource::SearchEngine, &outcome.code),
        Verdict::ConclusivePositive
    );
}

#[tokio::test]
async fn search_with_only_directories_confirms_no_website() {
    let mock_server = MockServer::start().await;

    let body = search_results_body(serde_json::json!([
        { "title": "Morton Motors - Yelp", "url": "https://www.yelp.ca/biz/morton-motors", "content": "" },
        { "title": "Morton Motors - Facebook", "url": "https://www.facebook.com/mortonmotors", "content": "" }
    ]));

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&mock_server)
        .await;

    let adapter = SearchLookup::new(&create_test_config(&mock_server.uri()));
    let outcome = adapter.check(&snapshot("Morton Motors", Some("Toronto"))).await;

    assert_eq!(outcome.code, search_engine::NO_WEBSITE_IN_RESULTS);
    assert_eq!(
        classify(VerificationSource::SearchEngine, &outcome.code),
        Verdict::ConclusiveNegative
    );
}

#[tokio::test]
async fn search_empty_results_are_inconclusive() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(&search_results_body(serde_json::json!([]))),
        )
        .mount(&mock_server)
        .await;

    let adapter = SearchLookup::new(&create_test_config(&mock_server.uri()));
    let outcome = adapter.check(&snapshot("Morton Motors", Some("Toronto"))).await;

    assert_eq!(outcome.code, search_engine::NO_RESULTS);
    assert_eq!(
        classify(VerificationSource::SearchEngine, &outcome.code),
        Verdict::Inconclusive
    );
}

#[tokio::test]
async fn search_rate_limit_is_blocked_not_empty() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let adapter = SearchLookup::new(&create_test_config(&mock_server.uri()));
    let outcome = adapter.check(&snapshot("Morton Motors", Some("Toronto"))).await;

    // Blocked must be distinguishable from a genuine zero-result answer.
    assert_eq!(outcome.code, search_engine::BLOCKED_RESPONSE);
    assert_eq!(
        classify(VerificationSource::SearchEngine, &outcome.code),
        Verdict::Inconclusive
    );
}

#[tokio::test]
async fn search_garbled_body_is_malformed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>definitely not json</html>"))
        .mount(&mock_server)
        .await;

    let adapter = SearchLookup::new(&create_test_config(&mock_server.uri()));
    let outcome = adapter.check(&snapshot("Morton Motors", Some("Toronto"))).await;

    assert_eq!(outcome.code, search_engine::MALFORMED_RESPONSE);
}

#[tokio::test]
async fn search_circuit_breaker_opens_after_repeated_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let adapter = SearchLookup::new(&create_test_config(&mock_server.uri()));

    // Five consecutive upstream failures trip the breaker. Distinct
    // business names keep the response cache out of the way.
    for i in 0..5 {
        let outcome = adapter
            .check(&snapshot(&format!("Fail Case {}", i), Some("Toronto")))
            .await;
        assert_eq!(outcome.code, search_engine::UPSTREAM_ERROR);
    }

    // The breaker now rejects before the request is even attempted.
    let outcome = adapter.check(&snapshot("After Open", Some("Toronto"))).await;
    assert_eq!(outcome.code, search_engine::BLOCKED_RESPONSE);
}

// ---------------------------------------------------------------------
// AI disambiguator
// ---------------------------------------------------------------------

fn llm_choice_body(content: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "choices": [
            { "message": { "content": content.to_string() } }
        ]
    })
}

#[tokio::test]
async fn ai_analysis_confirms_website() {
    let mock_server = MockServer::start().await;

    let search_body = search_results_body(serde_json::json!([
        { "title": "Joe's Pizza", "url": "https://joespizza.com", "content": "Order online" }
    ]));
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&search_body))
        .mount(&mock_server)
        .await;

    let answer = serde_json::json!({
        "status": "has_website",
        "website_url": "https://joespizza.com",
        "reason": "Result 1 is the business's own domain"
    });
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&llm_choice_body(&answer)))
        .mount(&mock_server)
        .await;

    let adapter = AiDisambiguator::from_config(&create_test_config(&mock_server.uri()))
        .expect("credential configured");
    let outcome = adapter.check(&snapshot("Joe's Pizza", Some("Toronto"))).await;

    assert_eq!(outcome.code, ai_disambiguator::CONFIRMED_WEBSITE);
    assert_eq!(outcome.website_url.as_deref(), Some("https://joespizza.com"));
    let detail = outcome.detail.expect("detail recorded");
    assert_eq!(detail["mode"], "analyze");
    assert_eq!(detail["search_results_count"], 1);
}

#[tokio::test]
async fn ai_without_search_context_uses_guess_mode() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(&search_results_body(serde_json::json!([]))),
        )
        .mount(&mock_server)
        .await;

    let answer = serde_json::json!({
        "status": "not_sure",
        "website_url": null,
        "reason": "Metadata alone is insufficient"
    });
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&llm_choice_body(&answer)))
        .mount(&mock_server)
        .await;

    let adapter = AiDisambiguator::from_config(&create_test_config(&mock_server.uri()))
        .expect("credential configured");
    let outcome = adapter.check(&snapshot("Obscure Shop", None)).await;

    assert_eq!(outcome.code, ai_disambiguator::NOT_SURE);
    assert_eq!(outcome.detail.expect("detail")["mode"], "guess");
}

#[tokio::test]
async fn ai_unknown_status_collapses_to_not_sure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(&search_results_body(serde_json::json!([
                { "title": "x", "url": "https://example.com", "content": "" }
            ]))),
        )
        .mount(&mock_server)
        .await;

    let answer = serde_json::json!({
        "status": "perhaps_maybe",
        "website_url": null,
        "reason": "model invented a status"
    });
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&llm_choice_body(&answer)))
        .mount(&mock_server)
        .await;

    let adapter = AiDisambiguator::from_config(&create_test_config(&mock_server.uri()))
        .expect("credential configured");
    let outcome = adapter.check(&snapshot("Some Shop", None)).await;

    assert_eq!(outcome.code, ai_disambiguator::NOT_SURE);
}

#[tokio::test]
async fn ai_non_json_answer_is_provider_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(&search_results_body(serde_json::json!([]))),
        )
        .mount(&mock_server)
        .await;

    let body = serde_json::json!({
        "choices": [ { "message": { "content": "I think they probably have a website." } } ]
    });
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&mock_server)
        .await;

    let adapter = AiDisambiguator::from_config(&create_test_config(&mock_server.uri()))
        .expect("credential configured");
    let outcome = adapter.check(&snapshot("Some Shop", None)).await;

    assert_eq!(outcome.code, ai_disambiguator::PROVIDER_ERROR);
    assert_eq!(
        classify(VerificationSource::AiDisambiguator, &outcome.code),
        Verdict::Inconclusive
    );
}

#[tokio::test]
async fn ai_upstream_error_is_provider_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(&search_results_body(serde_json::json!([]))),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let adapter = AiDisambiguator::from_config(&create_test_config(&mock_server.uri()))
        .expect("credential configured");
    let outcome = adapter.check(&snapshot("Some Shop", None)).await;

    assert_eq!(outcome.code, ai_disambiguator::PROVIDER_ERROR);
}

#[test]
fn ai_adapter_disabled_without_credentials() {
    let mut config = create_test_config("http://localhost:1");
    config.openrouter_api_key = None;
    config.gemini_api_key = None;
    config.groq_api_key = None;
    assert!(AiDisambiguator::from_config(&config).is_none());
}

// ---------------------------------------------------------------------
// Places cross-check
// ---------------------------------------------------------------------

#[tokio::test]
async fn places_listing_with_website_is_conclusive_positive() {
    let mock_server = MockServer::start().await;

    let body = serde_json::json!({
        "places": [
            {
                "id": "place-1",
                "displayName": { "text": "Morton Motors" },
                "formattedAddress": "12 King St W, Toronto",
                "websiteUri": "https://mortonmotors.com"
            }
        ]
    });
    Mock::given(method("POST"))
        .and(path("/v1/places:searchText"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&mock_server)
        .await;

    let adapter = PlacesLookup::from_config(&create_test_config(&mock_server.uri()))
        .expect("credential configured");
    let outcome = adapter.check(&snapshot("Morton Motors", Some("Toronto"))).await;

    assert_eq!(outcome.code, places::WEBSITE_LISTED);
    assert_eq!(
        outcome.website_url.as_deref(),
        Some("https://mortonmotors.com")
    );
}

#[tokio::test]
async fn places_listing_without_website_is_conclusive_negative() {
    let mock_server = MockServer::start().await;

    let body = serde_json::json!({
        "places": [
            {
                "id": "place-1",
                "displayName": { "text": "Morton Motors Ltd" },
                "formattedAddress": "12 King St W, Toronto"
            }
        ]
    });
    Mock::given(method("POST"))
        .and(path("/v1/places:searchText"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&mock_server)
        .await;

    let adapter = PlacesLookup::from_config(&create_test_config(&mock_server.uri()))
        .expect("credential configured");
    let outcome = adapter.check(&snapshot("Morton Motors", Some("Toronto"))).await;

    assert_eq!(outcome.code, places::LISTING_WITHOUT_WEBSITE);
    assert_eq!(
        classify(VerificationSource::PlacesApi, &outcome.code),
        Verdict::ConclusiveNegative
    );
}

#[tokio::test]
async fn places_name_mismatch_is_not_found() {
    let mock_server = MockServer::start().await;

    let body = serde_json::json!({
        "places": [
            {
                "id": "place-2",
                "displayName": { "text": "Sunshine Bakery" },
                "websiteUri": "https://sunshinebakery.com"
            }
        ]
    });
    Mock::given(method("POST"))
        .and(path("/v1/places:searchText"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&mock_server)
        .await;

    let adapter = PlacesLookup::from_config(&create_test_config(&mock_server.uri()))
        .expect("credential configured");
    let outcome = adapter.check(&snapshot("Morton Motors", Some("Toronto"))).await;

    // A different business's website must never verify this one.
    assert_eq!(outcome.code, places::NOT_FOUND);
    assert!(outcome.website_url.is_none());
}

#[tokio::test]
async fn places_rate_limit_is_api_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/places:searchText"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let adapter = PlacesLookup::from_config(&create_test_config(&mock_server.uri()))
        .expect("credential configured");
    let outcome = adapter.check(&snapshot("Morton Motors", Some("Toronto"))).await;

    assert_eq!(outcome.code, places::API_ERROR);
    assert_eq!(
        classify(VerificationSource::PlacesApi, &outcome.code),
        Verdict::Inconclusive
    );
}

#[test]
fn places_adapter_disabled_without_credential() {
    let mut config = create_test_config("http://localhost:1");
    config.places_api_key = None;
    assert!(PlacesLookup::from_config(&config).is_none());
}

// ---------------------------------------------------------------------
// Directory cross-check
// ---------------------------------------------------------------------

#[tokio::test]
async fn directory_listing_with_website() {
    let mock_server = MockServer::start().await;

    let body = serde_json::json!({
        "results": [
            {
                "fsq_id": "abc",
                "name": "Morton Motors",
                "website": "https://mortonmotors.com"
            }
        ]
    });
    Mock::given(method("GET"))
        .and(path("/v3/places/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&mock_server)
        .await;

    let adapter = DirectoryLookup::from_config(&create_test_config(&mock_server.uri()))
        .expect("credential configured");
    let outcome = adapter.check(&snapshot("Morton Motors", Some("Toronto"))).await;

    assert_eq!(outcome.code, places::WEBSITE_LISTED);
    assert_eq!(
        outcome.website_url.as_deref(),
        Some("https://mortonmotors.com")
    );
}

#[tokio::test]
async fn directory_empty_results_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/places/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&serde_json::json!({ "results": [] })))
        .mount(&mock_server)
        .await;

    let adapter = DirectoryLookup::from_config(&create_test_config(&mock_server.uri()))
        .expect("credential configured");
    let outcome = adapter.check(&snapshot("Morton Motors", Some("Toronto"))).await;

    assert_eq!(outcome.code, places::NOT_FOUND);
}
