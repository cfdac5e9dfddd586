//! Core types: provider identity, raw results, and normalised candidates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProviderErrorKind;

/// Search backends the coordinator can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// SearXNG meta-search aggregator (JSON API).
    SearXng,
    /// DuckDuckGo HTML endpoint (scraped).
    DuckDuckGo,
    /// Bing results page (scraped).
    Bing,
    /// Yahoo results page (scraped).
    Yahoo,
    /// Kagi search API (token required).
    Kagi,
}

impl Provider {
    /// Returns the human-readable name of this provider.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SearXng => "SearXNG",
            Self::DuckDuckGo => "DuckDuckGo",
            Self::Bing => "Bing",
            Self::Yahoo => "Yahoo",
            Self::Kagi => "Kagi",
        }
    }

    /// Returns the lowercase identifier used in config files and exports.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::SearXng => "searxng",
            Self::DuckDuckGo => "duckduckgo",
            Self::Bing => "bing",
            Self::Yahoo => "yahoo",
            Self::Kagi => "kagi",
        }
    }

    /// Returns all provider variants.
    pub fn all() -> &'static [Provider] {
        &[
            Self::SearXng,
            Self::DuckDuckGo,
            Self::Bing,
            Self::Yahoo,
            Self::Kagi,
        ]
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::all()
            .iter()
            .find(|p| p.slug() == wanted)
            .copied()
            .ok_or_else(|| {
                let known: Vec<&str> = Self::all().iter().map(Provider::slug).collect();
                format!("unknown provider '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// One entry as returned by a provider, before normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    /// Result URL exactly as the provider reported it (redirect wrappers removed).
    pub url: String,
    /// Result title.
    pub title: String,
    /// Result snippet; empty when the provider does not supply one.
    pub snippet: String,
    /// Which provider returned this entry.
    pub provider: Provider,
    /// 1-based position in the provider's own ordering.
    pub position: usize,
    /// Upstream engines that contributed this entry (SearXNG only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub engines: Vec<String>,
    /// Provider-assigned relevance score, when exposed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// A registrable domain such as `hubspot.com` or `bbc.co.uk`.
///
/// Always lowercase. Two URLs are duplicates iff their canonical domains
/// are equal. Construct through [`crate::normalize::registrable_domain`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalDomain(String);

impl CanonicalDomain {
    pub(crate) fn new_unchecked(domain: String) -> Self {
        Self(domain)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A normalised, deduplicated candidate for one keyword.
///
/// Per keyword and source, ranks form the dense sequence `1..=N`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub keyword: String,
    pub domain: CanonicalDomain,
    /// Dense 1-based rank after deduplication.
    pub rank: usize,
    /// Provider whose ordering produced this rank.
    pub source: Provider,
    /// URL of the best-ranked raw entry for this domain.
    pub url: String,
    /// Raw position of that entry, kept for filtering analysis.
    pub raw_position: usize,
    pub title: String,
    pub snippet: String,
}

/// What happened when the coordinator tried one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Provider answered with a non-empty result set and served the query.
    Served { results: usize },
    /// Provider answered successfully but with zero results.
    Empty,
    /// Provider call failed.
    Failed {
        kind: ProviderErrorKind,
        message: String,
    },
    /// Provider was not called (its circuit is open).
    Skipped { reason: String },
}

/// Provenance entry for one provider in the fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub provider: Provider,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    /// Wall-clock duration of the call in milliseconds (0 when skipped).
    pub elapsed_ms: u64,
}
