//! Domain normalization helpers shared by scoring and the adapters.

use url::Url;

pub const PUBLIC_EMAIL_DOMAINS: [&str; 18] = [
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "yahoo.co.uk",
    "yahoo.ae",
    "hotmail.com",
    "outlook.com",
    "live.com",
    "msn.com",
    "icloud.com",
    "me.com",
    "aol.com",
    "protonmail.com",
    "pm.me",
    "mail.com",
    "gmx.com",
    "zoho.com",
    "yandex.com",
];

pub const PUBLIC_EMAIL_DOMAIN_PREFIXES: [&str; 12] = [
    "gmail.",
    "googlemail.",
    "yahoo.",
    "hotmail.",
    "outlook.",
    "live.",
    "icloud.",
    "aol.",
    "protonmail.",
    "yandex.",
    "gmx.",
    "zoho.",
];

/// Normalize a raw domain, URL, or email into a bare lowercase host.
///
/// Returns `None` for values that cannot be a registrable domain.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let value = raw.trim().to_lowercase();
    if value.is_empty() {
        return None;
    }

    let value = if value.contains('@') && !value.contains("://") {
        value.split_once('@')?.1.to_string()
    } else {
        value
    };

    let host = if value.contains("://") {
        Url::parse(&value).ok()?.host_str()?.to_string()
    } else {
        value.split('/').next().unwrap_or_default().to_string()
    };

    let mut host = host.trim().trim_end_matches('.').to_string();
    if let Some(stripped) = host.strip_prefix("www.") {
        host = stripped.to_string();
    }
    if let Some((bare, _port)) = host.split_once(':') {
        host = bare.to_string();
    }

    if !host.contains('.') || host.chars().any(|c| c.is_whitespace()) || host.is_empty() {
        return None;
    }

    Some(host)
}

pub fn extract_domain_from_email(email: &str) -> Option<String> {
    if !email.contains('@') {
        return None;
    }
    normalize_domain(email)
}

pub fn is_public_email_domain(domain: &str) -> bool {
    let candidate = domain.trim().to_lowercase();
    if candidate.is_empty() {
        return false;
    }
    if PUBLIC_EMAIL_DOMAINS.contains(&candidate.as_str()) {
        return true;
    }
    PUBLIC_EMAIL_DOMAIN_PREFIXES
        .iter()
        .any(|prefix| candidate.starts_with(prefix))
}
