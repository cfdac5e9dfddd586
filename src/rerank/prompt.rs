//! Prompt construction for re-ranking.

use serp_search::RankedCandidate;

use crate::config::Treatment;

/// Maximum snippet characters shown per candidate.
const SNIPPET_CHARS: usize = 150;

/// Build the re-ranking prompt for `keyword`.
///
/// Under [`Treatment::ShowRank`] candidates appear in SERP order with their
/// positions. Under [`Treatment::HideRank`] they appear sorted by domain
/// with no positions, so the model cannot anchor on the engine's ordering.
pub fn build_prompt(
    keyword: &str,
    candidates: &[RankedCandidate],
    top_n: usize,
    treatment: Treatment,
) -> String {
    let results_text = render_candidates(candidates, treatment);
    format!(
        "Search keyword: {keyword}\n\n\
         Below are search engine results for the above keyword. Re-rank the results \
         and return the top {top_n} software product domains, ordered by relevance \
         to the keyword.\n\n\
         Exclude non-product sites: review aggregators, directories, Wikipedia, news, \
         blogs, forums, YouTube.\n\n\
         Return only root domains, one per line. No explanations.\n\n\
         Search results:\n{results_text}\n\n\
         Re-ranked product domains:"
    )
}

fn render_candidates(candidates: &[RankedCandidate], treatment: Treatment) -> String {
    match treatment {
        Treatment::ShowRank => candidates
            .iter()
            .map(|c| format!("{}. {}", c.rank, describe(c)))
            .collect::<Vec<_>>()
            .join("\n"),
        Treatment::HideRank => {
            let mut sorted: Vec<&RankedCandidate> = candidates.iter().collect();
            sorted.sort_by(|a, b| a.domain.cmp(&b.domain));
            sorted
                .into_iter()
                .map(|c| format!("- {}", describe(c)))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

fn describe(c: &RankedCandidate) -> String {
    let snippet: String = c.snippet.chars().take(SNIPPET_CHARS).collect();
    match (c.title.trim().is_empty(), snippet.trim().is_empty()) {
        (true, true) => format!("[{}]", c.domain),
        (false, true) => format!("[{}] {}", c.domain, c.title.trim()),
        (true, false) => format!("[{}] {}", c.domain, snippet.trim()),
        (false, false) => format!("[{}] {}: {}", c.domain, c.title.trim(), snippet.trim()),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serp_search::{normalize, Provider, RawResult};

    fn candidates() -> Vec<RankedCandidate> {
        let raw = [
            ("https://www.salesforce.com/crm/", "Salesforce CRM"),
            ("https://www.hubspot.com/products/crm", "HubSpot CRM"),
            ("https://zoho.com/crm", "Zoho CRM"),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (url, title))| RawResult {
            url: url.into(),
            title: title.into(),
            snippet: "x".repeat(400),
            provider: Provider::SearXng,
            position: i + 1,
            engines: Vec::new(),
            score: None,
        })
        .collect::<Vec<_>>();
        normalize("crm software", &raw).unwrap()
    }

    #[test]
    fn show_rank_lists_positions_in_serp_order() {
        let prompt = build_prompt("crm software", &candidates(), 10, Treatment::ShowRank);
        assert!(prompt.starts_with("Search keyword: crm software"));
        assert!(prompt.contains("return the top 10 software product domains"));
        let a = prompt.find("1. [salesforce.com] Salesforce CRM").unwrap();
        let b = prompt.find("2. [hubspot.com] HubSpot CRM").unwrap();
        let c = prompt.find("3. [zoho.com] Zoho CRM").unwrap();
        assert!(a < b && b < c);
        assert!(prompt.ends_with("Re-ranked product domains:"));
    }

    #[test]
    fn hide_rank_sorts_alphabetically_without_positions() {
        let prompt = build_prompt("crm software", &candidates(), 10, Treatment::HideRank);
        assert!(!prompt.contains("1. ["));
        let h = prompt.find("- [hubspot.com]").unwrap();
        let s = prompt.find("- [salesforce.com]").unwrap();
        let z = prompt.find("- [zoho.com]").unwrap();
        assert!(h < s && s < z);
    }

    #[test]
    fn snippets_are_truncated() {
        let prompt = build_prompt("crm software", &candidates(), 10, Treatment::ShowRank);
        assert!(prompt.contains(&"x".repeat(SNIPPET_CHARS)));
        assert!(!prompt.contains(&"x".repeat(SNIPPET_CHARS + 1)));
    }
}
