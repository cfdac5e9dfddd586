//! Parsing model output into an ordered domain list.
//!
//! The model is asked for one root domain per line but free text comes
//! back in many shapes: numbered lists, bullets, markdown links, full
//! URLs, comma-separated runs, and reasoning blocks. Every token is
//! cleaned and canonicalised with the same rule used for search results,
//! then matched against the candidate set. The output is always a subset
//! of the candidates, in the model's order, without duplicates.

use std::collections::HashSet;

use serp_search::{registrable_domain, CanonicalDomain, RankedCandidate};

/// Parsed model output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRanking {
    /// Matched candidate domains in the model's order.
    pub domains: Vec<CanonicalDomain>,
    /// Domain-like tokens that matched no candidate, as cleaned.
    pub rejected: Vec<String>,
}

/// Parse `raw_text` against `candidates`.
///
/// Tokens with no domain in them (prose, headings) are ignored. A
/// domain-like token outside the candidate set is rejected. Repeats of an
/// already accepted domain are dropped silently.
pub fn parse_ranking(raw_text: &str, candidates: &[RankedCandidate]) -> ParsedRanking {
    let allowed: HashSet<&CanonicalDomain> = candidates.iter().map(|c| &c.domain).collect();
    let mut seen = HashSet::new();
    let mut parsed = ParsedRanking::default();

    let answer = strip_reasoning(raw_text);
    for token in answer.split(['\n', ',']) {
        let Some(domain) = extract_domain(token) else {
            continue;
        };
        if allowed.contains(&domain) {
            if seen.insert(domain.clone()) {
                parsed.domains.push(domain);
            }
        } else {
            tracing::debug!(token = %domain, "model returned a domain outside the candidate set");
            parsed.rejected.push(domain.into_string());
        }
    }
    parsed
}

/// Remove `<think>...</think>` reasoning.
///
/// Text before the last closing tag is reasoning. An opening tag with no
/// close means the model was cut off mid-thought; everything after it is
/// discarded.
pub fn strip_reasoning(raw_text: &str) -> &str {
    let after_close = match raw_text.rfind("</think>") {
        Some(idx) => &raw_text[idx + "</think>".len()..],
        None => raw_text,
    };
    match after_close.find("<think>") {
        Some(idx) => &after_close[..idx],
        None => after_close,
    }
}

/// Find the first domain-like word in one output token.
fn extract_domain(token: &str) -> Option<CanonicalDomain> {
    let cleaned = strip_list_marker(token.trim());
    cleaned
        .split(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '<' | '>'))
        .map(clean_word)
        .filter(|w| looks_like_domain(w))
        .find_map(registrable_domain)
}

/// Strip a leading bullet or `1.` / `1)` number.
fn strip_list_marker(token: &str) -> &str {
    let token = token.trim_start_matches(['-', '*', '+', '•', '>', '#', ' ', '\t']);
    let digits = token.len() - token.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let rest = &token[digits..];
        if let Some(stripped) = rest.strip_prefix(['.', ')', ':']) {
            return stripped.trim_start();
        }
    }
    token
}

/// Trim markdown emphasis, quotes and trailing punctuation from a word.
fn clean_word(word: &str) -> &str {
    word.trim_matches(|c: char| matches!(c, '*' | '_' | '`' | '"' | '\'' | '“' | '”'))
        .trim_end_matches(['.', ';', ':', '!', '?'])
}

/// A word that could name a host: a dot, and an alphabetic final label of
/// at least two characters once any scheme and path are removed.
fn looks_like_domain(word: &str) -> bool {
    let host = word.split_once("://").map_or(word, |(_, rest)| rest);
    let host = host.split(['/', '?', '#']).next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    match host.rsplit_once('.') {
        Some((head, tld)) => {
            !head.is_empty() && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}
