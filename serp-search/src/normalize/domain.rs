//! Registrable-domain extraction.
//!
//! The canonical form of a URL is its public suffix plus one label:
//! `https://blog.hubspot.com/x` → `hubspot.com`,
//! `https://shop.bbc.co.uk` → `bbc.co.uk`. Suffixes come from the ICANN
//! section of the Public Suffix List (via `psl`). Private suffixes
//! (`github.io`, `herokuapp.com`, ...) are not treated as suffixes, so all
//! GitHub Pages sites collapse to `github.io`. Hosts under a TLD the list
//! does not know fall back to the last label as suffix.
//!
//! Hosts that are IP addresses, single labels (`localhost`), or bare
//! suffixes (`co.uk`) have no registrable domain.

use std::net::IpAddr;

use psl::Type;
use url::Url;

use crate::types::CanonicalDomain;

/// Extract the canonical registrable domain from `url`.
///
/// Accepts full URLs or bare host strings (`www.HubSpot.com/pricing`);
/// a missing scheme is treated as `http://`. The result is lowercase
/// with any trailing dot removed.
///
/// Returns `None` when no registrable domain can be determined.
///
/// # Examples
///
/// ```
/// use serp_search::normalize::registrable_domain;
///
/// let d = registrable_domain("https://blog.HubSpot.com/crm?utm_source=x").unwrap();
/// assert_eq!(d.as_str(), "hubspot.com");
/// assert_eq!(registrable_domain("https://www.bbc.co.uk/").unwrap().as_str(), "bbc.co.uk");
/// assert!(registrable_domain("http://127.0.0.1:8888/search").is_none());
/// ```
pub fn registrable_domain(url: &str) -> Option<CanonicalDomain> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = if trimmed.contains("://") {
        Url::parse(trimmed).ok()?
    } else {
        Url::parse(&format!("http://{trimmed}")).ok()?
    };

    let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    domain_of_host(&host).map(CanonicalDomain::new_unchecked)
}

/// Apply the suffix-plus-one-label rule to a lowercase host.
fn domain_of_host(host: &str) -> Option<String> {
    if host.is_empty() || is_ip_literal(host) {
        return None;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return None;
    }

    // Purely numeric TLDs are not real domains.
    let tld = labels[labels.len() - 1];
    if tld.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let suffix_labels = icann_suffix_labels(host)?;
    if labels.len() <= suffix_labels {
        return None;
    }

    let start = labels.len() - suffix_labels - 1;
    Some(labels[start..].join("."))
}

/// Number of labels in the ICANN public suffix of `host`.
///
/// A private suffix match is shortened by its leftmost label and looked up
/// again until an ICANN (or unlisted) suffix remains.
fn icann_suffix_labels(host: &str) -> Option<usize> {
    let mut name = host;
    loop {
        let suffix = psl::suffix(name.as_bytes())?;
        let text = std::str::from_utf8(suffix.as_bytes()).ok()?;
        if suffix.typ() != Some(Type::Private) {
            return Some(text.split('.').count());
        }
        name = text.split_once('.')?.1;
    }
}

fn is_ip_literal(host: &str) -> bool {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    bare.parse::<IpAddr>().is_ok()
}
