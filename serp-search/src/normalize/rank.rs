//! Rank normalisation: raw provider results → dense domain ranking.
//!
//! Results are grouped by registrable domain. The entry with the best
//! (lowest) raw position represents the domain, and the surviving domains
//! are re-ranked densely `1..=N` in raw-position order. Results without a
//! registrable domain are dropped.

use std::collections::HashSet;

use crate::error::{Result, SearchError};
use crate::types::{RankedCandidate, RawResult};

use super::domain::registrable_domain;

/// Normalise one provider's raw results for `keyword`.
///
/// The input may arrive in any order; ties on raw position keep input
/// order. Empty input produces an empty list.
///
/// # Errors
///
/// Returns [`SearchError::Normalization`] if a raw position is 0 (positions
/// are 1-based) or if the produced ranks are not the dense sequence
/// `1..=N`. Both indicate an adapter bug.
///
/// # Examples
///
/// ```
/// use serp_search::{normalize::normalize, Provider, RawResult};
///
/// let raw = |url: &str, position| RawResult {
///     url: url.into(),
///     title: String::new(),
///     snippet: String::new(),
///     provider: Provider::SearXng,
///     position,
///     engines: vec![],
///     score: None,
/// };
/// let ranked = normalize(
///     "crm software",
///     &[
///         raw("https://hubspot.com", 1),
///         raw("https://salesforce.com", 2),
///         raw("https://hubspot.com/pricing", 3),
///     ],
/// )
/// .unwrap();
/// let domains: Vec<_> = ranked.iter().map(|c| (c.domain.as_str(), c.rank)).collect();
/// assert_eq!(domains, vec![("hubspot.com", 1), ("salesforce.com", 2)]);
/// ```
pub fn normalize(keyword: &str, raw: &[RawResult]) -> Result<Vec<RankedCandidate>> {
    if let Some(bad) = raw.iter().find(|r| r.position == 0) {
        return Err(SearchError::Normalization(format!(
            "{} returned raw position 0 for {}",
            bad.provider, bad.url
        )));
    }

    let mut ordered: Vec<&RawResult> = raw.iter().collect();
    ordered.sort_by_key(|r| r.position);

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    let mut dropped = 0usize;

    for result in ordered {
        let Some(domain) = registrable_domain(&result.url) else {
            dropped += 1;
            continue;
        };
        if !seen.insert(domain.clone()) {
            continue;
        }
        candidates.push(RankedCandidate {
            keyword: keyword.to_string(),
            domain,
            rank: candidates.len() + 1,
            source: result.provider,
            url: result.url.clone(),
            raw_position: result.position,
            title: result.title.clone(),
            snippet: result.snippet.clone(),
        });
    }

    if dropped > 0 {
        tracing::debug!(keyword, dropped, "results without a registrable domain dropped");
    }

    verify_dense(&candidates)?;
    Ok(candidates)
}

/// Keep the first `top_n` candidates. Ranks stay dense.
pub fn truncate(mut candidates: Vec<RankedCandidate>, top_n: usize) -> Vec<RankedCandidate> {
    candidates.truncate(top_n);
    candidates
}

fn verify_dense(candidates: &[RankedCandidate]) -> Result<()> {
    for (i, c) in candidates.iter().enumerate() {
        if c.rank != i + 1 {
            return Err(SearchError::Normalization(format!(
                "rank sequence broken at {}: expected {}, got {}",
                c.domain,
                i + 1,
                c.rank
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provider;

    fn raw(url: &str, position: usize) -> RawResult {
        RawResult {
            url: url.to_string(),
            title: format!("Title {position}"),
            snippet: String::new(),
            provider: Provider::DuckDuckGo,
            position,
            engines: vec![],
            score: None,
        }
    }

    fn domains(c: &[RankedCandidate]) -> Vec<&str> {
        c.iter().map(|c| c.domain.as_str()).collect()
    }

    #[test]
    fn crm_software_example() {
        let ranked = normalize(
            "crm software",
            &[
                raw("https://hubspot.com", 1),
                raw("https://salesforce.com", 2),
                raw("https://hubspot.com/pricing", 3),
            ],
        )
        .expect("normalize");
        assert_eq!(domains(&ranked), vec!["hubspot.com", "salesforce.com"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
        assert!(ranked.iter().all(|c| c.keyword == "crm software"));
    }

    #[test]
    fn best_position_wins_regardless_of_input_order() {
        let ranked = normalize(
            "crm",
            &[
                raw("https://www.hubspot.com/pricing", 4),
                raw("https://zoho.com", 2),
                raw("https://blog.hubspot.com/", 1),
            ],
        )
        .expect("normalize");
        assert_eq!(domains(&ranked), vec!["hubspot.com", "zoho.com"]);
        assert_eq!(ranked[0].raw_position, 1);
        assert_eq!(ranked[0].url, "https://blog.hubspot.com/");
    }

    #[test]
    fn ranks_are_dense_after_drops() {
        let ranked = normalize(
            "crm",
            &[
                raw("https://a.com", 1),
                raw("http://localhost/", 2),
                raw("https://a.com/x", 3),
                raw("https://b.com", 7),
                raw("https://c.co.uk", 9),
            ],
        )
        .expect("normalize");
        let ranks: Vec<usize> = ranked.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert_eq!(domains(&ranked), vec!["a.com", "b.com", "c.co.uk"]);
        assert_eq!(ranked[2].raw_position, 9);
    }

    #[test]
    fn sites_under_a_shared_second_level_suffix_stay_distinct() {
        let ranked = normalize(
            "crm",
            &[
                raw("https://www.acme.org.za/", 1),
                raw("https://globex.org.za/crm", 2),
            ],
        )
        .expect("normalize");
        assert_eq!(domains(&ranked), vec!["acme.org.za", "globex.org.za"]);
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn empty_in_empty_out() {
        assert!(normalize("crm", &[]).expect("normalize").is_empty());
    }

    #[test]
    fn zero_position_is_rejected() {
        let err = normalize("crm", &[raw("https://a.com", 0)]).unwrap_err();
        assert!(matches!(err, SearchError::Normalization(_)));
    }

    #[test]
    fn source_comes_from_raw_provider() {
        let ranked = normalize("crm", &[raw("https://a.com", 1)]).expect("normalize");
        assert_eq!(ranked[0].source, Provider::DuckDuckGo);
    }

    #[test]
    fn truncate_keeps_prefix() {
        let ranked = normalize(
            "crm",
            &[raw("https://a.com", 1), raw("https://b.com", 2), raw("https://c.com", 3)],
        )
        .expect("normalize");
        let top = truncate(ranked, 2);
        assert_eq!(domains(&top), vec!["a.com", "b.com"]);
        assert_eq!(truncate(top, 10).len(), 2);
    }
}
