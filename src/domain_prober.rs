//! Domain-candidate prober: guess domains from the business name and
//! check whether any of them hosts the business's real website.
//!
//! Free and fast, so it always runs before the paid/rate-limited sources.
//! The hard part is false positives: a live domain is worthless evidence
//! unless the page content actually belongs to this business.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use crate::config::Config;
use crate::models::{BusinessSnapshot, VerificationSource};
use crate::sources::{EvidenceSource, RawOutcome};
use crate::verdict::domain_guess as outcome;

/// Articles and prepositions — sometimes part of brand domains
/// (thevillagecobbler.ca), so they get their own generation track.
const ARTICLE_WORDS: [&str; 16] = [
    "the", "a", "an", "and", "of", "in", "at", "to", "for", "by", "on", "al", "el", "le", "la",
    "de",
];

/// Legal entity suffixes — never part of a domain name.
const ENTITY_SUFFIXES: [&str; 12] = [
    "llc", "ltd", "inc", "corp", "co", "company", "plc", "fzc", "fze", "est", "lp", "llp",
];

/// Generic trade words usually dropped from domain names.
const GENERIC_BUSINESS_WORDS: [&str; 40] = [
    "services", "service", "solutions", "solution", "group", "enterprise", "enterprises",
    "trading", "general", "international", "global", "center", "centre", "shop", "store", "mart",
    "market", "plaza", "mall", "textiles", "tailoring", "upholstery", "supplies", "supply",
    "equipment", "maintenance", "repair", "repairs", "cleaning", "laundry", "salon", "spa",
    "restaurant", "cafe", "bakery", "pharmacy", "clinic", "consulting", "contracting",
    "construction",
];

/// Common words that match on any page in an industry or neighbourhood
/// and therefore identify nothing.
const GENERIC_CONTENT_WORDS: [&str; 32] = [
    "street", "avenue", "road", "drive", "boulevard", "lane", "place", "north", "south", "east",
    "west", "central", "college", "park", "lake", "hill", "city", "town", "village", "first",
    "main", "grand", "new", "old", "royal", "golden", "national", "international", "auto", "home",
    "food", "express",
];

const PARKED_INDICATORS: [&str; 22] = [
    "domain is for sale",
    "buy this domain",
    "parked free",
    "parked by",
    "this domain may be for sale",
    "sedoparking",
    "hugedomains",
    "afternic",
    "domain parking",
    "is available for purchase",
    "for sale</title>",
    "coming soon</title>",
    "under construction</title>",
    "site coming soon",
    "launching soon",
    "premium domain",
    "domain names for sale",
    "domain default page",
    "welcome to nginx",
    "apache2 default page",
    "it works!",
    "this account has been suspended",
];

/// Pages under this size are almost certainly placeholders.
const MIN_REAL_PAGE_BYTES: usize = 500;

fn country_tlds(country: Option<&str>) -> &'static [&'static str] {
    match country.unwrap_or("") {
        "US" => &[".com", ".us", ".net", ".org"],
        "CA" => &[".ca", ".com", ".net"],
        "GB" | "UK" => &[".co.uk", ".com", ".net", ".org"],
        "AU" => &[".com.au", ".com", ".net"],
        "AE" => &[".ae", ".com", ".net"],
        "QA" => &[".qa", ".com", ".net"],
        "SA" => &[".sa", ".com", ".net"],
        "IN" => &[".in", ".com", ".net"],
        _ => &[".com", ".net"],
    }
}

#[derive(Clone, Copy, PartialEq)]
enum CleanMode {
    /// Strip articles and generic words: core brand tokens only.
    Brand,
    /// Keep articles, strip generic words.
    KeepArticles,
    /// Strip only entity suffixes; keeps category words like "laundry".
    KeepCategory,
}

fn clean_business_name(name: &str, mode: CleanMode) -> Vec<String> {
    let lowered = name.to_lowercase().replace('&', " and ");
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|w| w.len() >= 2)
        .filter(|w| match mode {
            CleanMode::Brand => {
                !ARTICLE_WORDS.contains(w)
                    && !ENTITY_SUFFIXES.contains(w)
                    && !GENERIC_BUSINESS_WORDS.contains(w)
            }
            CleanMode::KeepArticles => {
                !ENTITY_SUFFIXES.contains(w) && !GENERIC_BUSINESS_WORDS.contains(w)
            }
            CleanMode::KeepCategory => !ENTITY_SUFFIXES.contains(w),
        })
        .map(str::to_string)
        .collect()
}

/// 'mortonmotors' → ['mortonmotors', 'mortonmotor'] and vice versa.
/// 'dentistry' stays alone — 'dentistrys' is not a useful variant.
fn singular_plural_variants(base: &str) -> Vec<String> {
    let mut variants = vec![base.to_string()];
    if base.len() <= 4 {
        return variants;
    }

    if base.ends_with("ies") && base.len() > 5 {
        variants.push(format!("{}y", &base[..base.len() - 3]));
    } else if base.ends_with("ses") || base.ends_with("xes") || base.ends_with("zes") {
        variants.push(base[..base.len() - 2].to_string());
    } else if base.ends_with('s') && !base.ends_with("ss") {
        variants.push(base[..base.len() - 1].to_string());
    } else if base.ends_with('y') {
        // beauty, pharmacy: adding 's' makes nonsense
    } else if base.ends_with("sh") || base.ends_with("ch") || base.ends_with('x') || base.ends_with('z')
    {
        variants.push(format!("{}es", base));
    } else {
        variants.push(format!("{}s", base));
    }

    variants
}

/// Generate candidate domains from a business name.
///
/// Four generation tracks (brand words, brand + articles, full name with
/// category words, raw joined name), acronym handling, and
/// singular/plural expansion, joined against the country's TLD list.
pub fn generate_candidates(name: &str, country: Option<&str>) -> Vec<String> {
    let words_brand = clean_business_name(name, CleanMode::Brand);
    let words_articles = clean_business_name(name, CleanMode::KeepArticles);
    let words_all = clean_business_name(name, CleanMode::KeepCategory);

    if words_brand.is_empty() && words_articles.is_empty() && words_all.is_empty() {
        return Vec::new();
    }

    let mut tlds: Vec<&str> = country_tlds(country).to_vec();
    if !tlds.contains(&".com") {
        tlds.push(".com");
    }

    let mut bases: BTreeSet<String> = BTreeSet::new();

    for words in [&words_brand, &words_articles] {
        if words.is_empty() {
            continue;
        }

        let full = words.concat();
        if (4..=40).contains(&full.len()) {
            bases.insert(full);
        }

        // First word alone only when it is the whole brand, or very
        // distinctive for a two-word name. Anything looser generates
        // false positives like colborne.com for "Colborne Street
        // United Church".
        if words.len() == 1 && words[0].len() >= 4 {
            bases.insert(words[0].clone());
        } else if words.len() == 2 && words[0].len() >= 10 {
            bases.insert(words[0].clone());
        }

        if words.len() >= 2 {
            let two = format!("{}{}", words[0], words[1]);
            if (4..=30).contains(&two.len()) {
                bases.insert(two);
            }
            let hyphenated = words[..words.len().min(4)].join("-");
            if hyphenated.len() <= 40 {
                bases.insert(hyphenated);
            }
            bases.insert(format!("{}-{}", words[0], words[1]));
        }
        if words.len() >= 3 {
            let three = format!("{}{}{}", words[0], words[1], words[2]);
            if (5..=35).contains(&three.len()) {
                bases.insert(three);
            }
        }
    }

    // Full name with category words ("Dima Laundry" → dimalaundry).
    if !words_all.is_empty() && words_all != words_brand && words_all != words_articles {
        let full = words_all.concat();
        if (5..=40).contains(&full.len()) {
            bases.insert(full);
        }
        if words_all.len() >= 2 {
            let two = format!("{}{}", words_all[0], words_all[1]);
            if (4..=30).contains(&two.len()) {
                bases.insert(two);
            }
        }
    }

    // Raw joined name, punctuation only stripped — catches "curryandco"
    // from "Curry & Co." where the category track strips "co".
    let raw_words: Vec<String> = {
        let lowered = name.to_lowercase().replace('&', "and");
        let cleaned: String = lowered
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
            .collect();
        cleaned
            .split_whitespace()
            .filter(|w| w.len() >= 2)
            .map(str::to_string)
            .collect()
    };
    if raw_words.len() >= 2 {
        let joined = raw_words.concat();
        if (6..=35).contains(&joined.len()) {
            bases.insert(joined);
        }
    }

    // Acronyms in the original name: "GTA Heating" → gtaheating.
    let original_words: Vec<&str> = name.split_whitespace().collect();
    for (i, word) in original_words.iter().enumerate() {
        if word.len() >= 2
            && word.len() <= 5
            && word.chars().all(|c| c.is_ascii_uppercase())
        {
            let remaining = clean_business_name(&original_words[i + 1..].join(" "), CleanMode::Brand);
            if !remaining.is_empty() {
                bases.insert(format!("{}{}", word.to_lowercase(), remaining.concat()));
                bases.insert(format!("{}{}", word.to_lowercase(), remaining[0]));
            }
        }
    }

    // Transliteration variants: drop al-/el- prefixes and trailing vowel
    // patterns common in romanized Arabic names.
    for base in bases.clone() {
        if base.len() > 6 {
            if base.ends_with("ain") || base.ends_with("een") {
                bases.insert(base[..base.len() - 2].to_string());
            }
            for prefix in ["al-", "el-", "al", "el"] {
                if let Some(stripped) = base.strip_prefix(prefix) {
                    if stripped.len() > 3 && !stripped.starts_with('-') {
                        bases.insert(stripped.to_string());
                    }
                }
            }
        }
    }

    // Singular/plural variants for every base (last segment only when
    // hyphenated).
    let mut expanded: BTreeSet<String> = BTreeSet::new();
    for base in &bases {
        if let Some(idx) = base.rfind('-') {
            expanded.insert(base.clone());
            let (head, last) = base.split_at(idx + 1);
            for variant in singular_plural_variants(last) {
                expanded.insert(format!("{}{}", head, variant));
            }
        } else {
            for variant in singular_plural_variants(base) {
                expanded.insert(variant);
            }
        }
    }
    expanded.retain(|b| (3..=40).contains(&b.len()));

    // Longer bases first: more specific candidates get probed and
    // validated before short generic ones.
    let mut ordered: Vec<String> = expanded.into_iter().collect();
    ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut candidates = Vec::new();
    let mut seen = BTreeSet::new();
    for base in &ordered {
        for tld in &tlds {
            let domain = format!("{}{}", base, tld);
            if seen.insert(domain.clone()) {
                candidates.push(domain);
            }
        }
    }
    candidates
}

fn domain_base(host: &str) -> String {
    host.trim_start_matches("www.")
        .split('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
        .replace('-', "")
}

/// Do two hosts plausibly belong to the same business?
///
/// Exact base match and long containment only. Substring-chunk matching
/// is deliberately avoided: "children" is shared by thechildren.com and
/// montrealchildrenshospital.ca, which are different businesses.
pub fn domains_related(original: &str, final_host: &str) -> bool {
    if original.is_empty() || final_host.is_empty() {
        return true; // can't tell, assume related
    }

    let orig = domain_base(original);
    let fin = domain_base(final_host);
    if orig.is_empty() || fin.is_empty() {
        return true;
    }
    if orig == fin {
        return true;
    }

    let (shorter, longer) = if orig.len() <= fin.len() {
        (&orig, &fin)
    } else {
        (&fin, &orig)
    };
    if longer.contains(shorter.as_str()) {
        if shorter.len() as f64 >= longer.len() as f64 * 0.6 {
            return true;
        }
        if longer.starts_with(shorter.as_str()) && shorter.len() >= 10 {
            return true;
        }
    }
    false
}

fn word_in_text(word: &str, text: &str) -> bool {
    let pattern = format!(r"\b{}\b", regex::escape(word));
    if let Ok(re) = Regex::new(&pattern) {
        if re.is_match(text) {
            return true;
        }
    }
    for variant in singular_plural_variants(word) {
        if variant != word {
            let pattern = format!(r"\b{}\b", regex::escape(&variant));
            if let Ok(re) = Regex::new(&pattern) {
                if re.is_match(text) {
                    return true;
                }
            }
        }
    }
    false
}

struct FetchedPage {
    status: u16,
    body: String,
    final_url: String,
    title: String,
}

/// Validate that a live domain is this business's real website.
///
/// The critical false-positive filter: parked pages, unrelated redirects
/// and name collisions must all be rejected before a candidate counts as
/// a match.
pub fn is_valid_business_site(url: &str, business_name: &str, page: &PageView<'_>) -> bool {
    if page.status != 200 {
        return false;
    }

    let original_host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    let final_host = Url::parse(page.final_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    let redirected = !original_host.is_empty()
        && !final_host.is_empty()
        && original_host.trim_start_matches("www.") != final_host.trim_start_matches("www.");

    if redirected && !domains_related(&original_host, &final_host) {
        tracing::debug!(url, final_host = %final_host, "rejected: redirected to unrelated host");
        return false;
    }

    if page.body.len() < MIN_REAL_PAGE_BYTES {
        return false;
    }

    let head: String = page.body.chars().take(8000).collect::<String>().to_lowercase();
    if PARKED_INDICATORS.iter().any(|ind| head.contains(ind)) {
        return false;
    }

    // Content relevance: do the business-name words actually appear?
    let cleaned: String = business_name
        .to_lowercase()
        .replace('&', " and ")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    let name_words: BTreeSet<String> = cleaned
        .split_whitespace()
        .filter(|w| w.len() >= 3 && !["the", "and", "for", "from", "with"].contains(w))
        .map(str::to_string)
        .collect();
    if name_words.is_empty() {
        return true; // can't check, allow it
    }

    let title = page.title.to_lowercase();
    let check_text = format!("{} {}", title, head);

    let matching: BTreeSet<&String> = name_words
        .iter()
        .filter(|w| word_in_text(w.as_str(), &check_text))
        .collect();
    let brand_matches: BTreeSet<&&String> = matching
        .iter()
        .filter(|w| {
            !GENERIC_BUSINESS_WORDS.contains(&w.as_str())
                && !GENERIC_CONTENT_WORDS.contains(&w.as_str())
        })
        .collect();

    if matching.is_empty() {
        tracing::debug!(url, name = business_name, "rejected: no name words on page");
        return false;
    }
    // All matches are generic → coincidental ("B-K Auto Service" words
    // match on any auto site).
    if brand_matches.is_empty() {
        tracing::debug!(url, name = business_name, "rejected: only generic word matches");
        return false;
    }

    if name_words.len() >= 4 && brand_matches.len() < 2 {
        return false;
    }
    if name_words.len() >= 2 {
        let distinctive = brand_matches.iter().any(|w| w.len() >= 5);
        if !distinctive && brand_matches.len() < 2 {
            return false;
        }
        // Title is the strongest signal of what a site is about; require
        // at least one matching word there when a title exists.
        if !title.is_empty() && !matching.iter().any(|w| word_in_text(w.as_str(), &title)) {
            tracing::debug!(url, title = %page.title, "rejected: no name words in title");
            return false;
        }
    } else {
        // Single-word names are the highest collision risk: require the
        // word in the title, not just somewhere in the body.
        let word = name_words.iter().next().map(String::as_str).unwrap_or("");
        if !word_in_text(word, &title) {
            return false;
        }
    }

    true
}

/// Borrowed view of a fetched page for validation.
pub struct PageView<'a> {
    pub status: u16,
    pub body: &'a str,
    pub final_url: &'a str,
    pub title: &'a str,
}

pub struct DomainProber {
    client: reqwest::Client,
    probe_parallelism: usize,
}

impl DomainProber {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(2))
            .danger_accept_invalid_certs(true)
            .user_agent(config.http_user_agent.clone())
            .build()
            .unwrap_or_default();
        Self {
            client,
            probe_parallelism: 10,
        }
    }

    async fn fetch_page(&self, url: &str) -> Option<FetchedPage> {
        let resp = self.client.get(url).send().await.ok()?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp.text().await.unwrap_or_default();
        let title = Regex::new(r"(?is)<title[^>]*>(.*?)</title>")
            .ok()
            .and_then(|re| {
                let head: String = body.chars().take(5000).collect();
                re.captures(&head)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().chars().take(200).collect::<String>())
            })
            .unwrap_or_default();
        Some(FetchedPage {
            status,
            body,
            final_url,
            title,
        })
    }

    async fn probe_candidates(&self, candidates: &[String]) -> Vec<String> {
        let semaphore = Arc::new(Semaphore::new(self.probe_parallelism));
        let mut join_set = JoinSet::new();

        for candidate in candidates {
            let permit = semaphore.clone();
            let client = self.client.clone();
            let domain = candidate.clone();
            join_set.spawn(async move {
                let _permit = permit.acquire_owned().await.ok()?;
                for scheme in ["https", "http"] {
                    let url = format!("{}://{}", scheme, domain);
                    if let Ok(resp) = client.head(&url).send().await {
                        let status = resp.status().as_u16();
                        if (200..400).contains(&status) || status == 403 || status == 405 {
                            return Some(domain);
                        }
                    }
                }
                None
            });
        }

        let mut live = Vec::new();
        while let Some(result) = join_set.join_next().await {
            if let Ok(Some(domain)) = result {
                live.push(domain);
            }
        }
        // Longest base first: most specific candidate wins.
        live.sort_by(|a, b| {
            let la = a.split('.').next().unwrap_or("").len();
            let lb = b.split('.').next().unwrap_or("").len();
            lb.cmp(&la).then_with(|| a.cmp(b))
        });
        live
    }
}

#[async_trait]
impl EvidenceSource for DomainProber {
    fn source(&self) -> VerificationSource {
        VerificationSource::DomainGuess
    }

    async fn check(&self, business: &BusinessSnapshot) -> RawOutcome {
        let candidates = generate_candidates(&business.name, business.country.as_deref());
        if candidates.is_empty() {
            return RawOutcome::code(outcome::NO_CANDIDATES);
        }

        let live = self.probe_candidates(&candidates).await;

        for scheme in ["https", "http"] {
            for domain in &live {
                let url = format!("{}://{}", scheme, domain);
                if let Some(page) = self.fetch_page(&url).await {
                    let view = PageView {
                        status: page.status,
                        body: &page.body,
                        final_url: &page.final_url,
                        title: &page.title,
                    };
                    if is_valid_business_site(&url, &business.name, &view) {
                        tracing::info!(
                            business = %business.name,
                            website = %url,
                            "domain prober found website"
                        );
                        return RawOutcome::with_website(outcome::MATCH_FOUND, url).detail(json!({
                            "candidates_checked": candidates.len(),
                            "live_candidates": live.len(),
                        }));
                    }
                }
            }
        }

        RawOutcome::code(outcome::NO_MATCH_AFTER_CANDIDATES).detail(json!({
            "candidates_checked": candidates.len(),
            "live_candidates": live.len(),
        }))
    }
}
