//! AI rank vs traditional rank comparison.
//!
//! [`compare`] outer-joins, per keyword, the post-LLM ranks of one run
//! against the pre-LLM ranks of another (or the same) run. A domain
//! missing from one side gets the "not ranked" sentinel rank instead of a
//! null, so every row has a numeric delta. Sentinel rows stay in the row
//! set but are excluded from every aggregate.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Serialize;
use serp_search::CanonicalDomain;

use crate::error::{HarnessError, Result};
use crate::record::ExperimentRecord;
use crate::stats::{self, Stats};
use crate::store::write_atomic;

/// One (keyword, domain) pair across both rankings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonRow {
    pub keyword: String,
    pub domain: String,
    /// Post-LLM rank, or the sentinel if the model did not rank it.
    pub ai_rank: usize,
    /// Engine rank, or the sentinel if the engine did not return it.
    pub traditional_rank: usize,
    /// `traditional_rank - ai_rank`; positive means the model promoted it.
    pub delta: i64,
    pub ai_ranked: bool,
    pub traditional_ranked: bool,
}

impl ComparisonRow {
    /// True if either side carries the sentinel.
    pub fn is_sentinel(&self) -> bool {
        !(self.ai_ranked && self.traditional_ranked)
    }
}

/// Aggregates over non-sentinel rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonAggregates {
    /// Keywords ranked on both sides.
    pub keywords_compared: usize,
    /// Keywords ranked on one side only; all of their rows are sentinel rows.
    pub keywords_one_sided: usize,
    /// Keywords with no ranks on either side; they produce no rows.
    pub keywords_unranked: usize,
    pub rows: usize,
    pub sentinel_rows: usize,
    pub ai_only: usize,
    pub traditional_only: usize,
    pub promoted: usize,
    pub demoted: usize,
    pub unchanged: usize,
    pub delta: Option<Stats>,
    pub abs_delta: Option<Stats>,
    /// Per-keyword Spearman rho over ranked-on-both-sides domains.
    pub spearman: Option<Stats>,
    pub kendall: Option<Stats>,
}

/// Result of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub rows: Vec<ComparisonRow>,
    pub aggregates: ComparisonAggregates,
}

/// Join AI ranks from `ai_records` with traditional ranks from
/// `traditional_records`.
///
/// The join is a full outer join on (keyword, domain). A keyword present
/// on one side only, or whose re-rank failed, still yields one row per
/// domain with the sentinel on the missing side.
///
/// `not_ranked_rank` is the sentinel; `0` means "worst rank observed for
/// the keyword on either side, plus one". Keywords come in the AI
/// records' order, then traditional-only keywords in their order; domains
/// within a keyword in traditional rank order, then AI-only domains in AI
/// order.
pub fn compare(
    ai_records: &[ExperimentRecord],
    traditional_records: &[ExperimentRecord],
    not_ranked_rank: usize,
) -> Comparison {
    let ai_by_keyword: HashMap<&str, &ExperimentRecord> =
        ai_records.iter().map(|r| (r.keyword.as_str(), r)).collect();
    let traditional: HashMap<&str, &ExperimentRecord> = traditional_records
        .iter()
        .map(|r| (r.keyword.as_str(), r))
        .collect();

    let mut seen = HashSet::new();
    let keywords: Vec<&str> = ai_records
        .iter()
        .chain(traditional_records)
        .map(|r| r.keyword.as_str())
        .filter(|k| seen.insert(*k))
        .collect();

    let mut rows = Vec::new();
    let mut counts = KeywordCounts::default();
    let mut spearman = Vec::new();
    let mut kendall = Vec::new();

    for keyword in keywords {
        let ai = ai_by_keyword
            .get(keyword)
            .copied()
            .and_then(ExperimentRecord::ai_ranks)
            .unwrap_or_default();
        let trad = traditional
            .get(keyword)
            .map(|r| r.traditional_ranks())
            .unwrap_or_default();

        match (ai.is_empty(), trad.is_empty()) {
            (true, true) => {
                tracing::debug!(keyword, "keyword has no ranks on either side");
                counts.unranked += 1;
                continue;
            }
            (false, false) => counts.compared += 1,
            _ => {
                tracing::debug!(
                    keyword,
                    ai = ai.len(),
                    traditional = trad.len(),
                    "keyword ranked on one side only"
                );
                counts.one_sided += 1;
            }
        }

        let keyword_rows = join_keyword(keyword, &ai, &trad, not_ranked_rank);

        let paired: Vec<(f64, f64)> = keyword_rows
            .iter()
            .filter(|r| !r.is_sentinel())
            .map(|r| (r.traditional_rank as f64, r.ai_rank as f64))
            .collect();
        let (x, y): (Vec<f64>, Vec<f64>) = paired.into_iter().unzip();
        if let (Some(rho), Some(tau)) = (stats::spearman(&x, &y), stats::kendall_tau(&x, &y)) {
            spearman.push(rho);
            kendall.push(tau);
        }
        rows.extend(keyword_rows);
    }

    let aggregates = aggregate(&rows, &counts, &spearman, &kendall);
    Comparison { rows, aggregates }
}

#[derive(Debug, Default)]
struct KeywordCounts {
    compared: usize,
    one_sided: usize,
    unranked: usize,
}

fn join_keyword(
    keyword: &str,
    ai: &[(&CanonicalDomain, usize)],
    trad: &[(&CanonicalDomain, usize)],
    not_ranked_rank: usize,
) -> Vec<ComparisonRow> {
    let sentinel = if not_ranked_rank == 0 {
        let worst = ai
            .iter()
            .chain(trad)
            .map(|(_, r)| *r)
            .max()
            .unwrap_or(0);
        worst + 1
    } else {
        not_ranked_rank
    };

    let ai_map: HashMap<&CanonicalDomain, usize> = ai.iter().copied().collect();
    let trad_map: HashMap<&CanonicalDomain, usize> = trad.iter().copied().collect();

    let mut domains: Vec<&CanonicalDomain> = trad.iter().map(|(d, _)| *d).collect();
    domains.extend(ai.iter().map(|(d, _)| *d).filter(|d| !trad_map.contains_key(d)));

    domains
        .into_iter()
        .map(|domain| {
            let ai_rank = ai_map.get(domain).copied();
            let trad_rank = trad_map.get(domain).copied();
            let ai_value = ai_rank.unwrap_or(sentinel);
            let trad_value = trad_rank.unwrap_or(sentinel);
            ComparisonRow {
                keyword: keyword.to_string(),
                domain: domain.to_string(),
                ai_rank: ai_value,
                traditional_rank: trad_value,
                delta: to_i64(trad_value) - to_i64(ai_value),
                ai_ranked: ai_rank.is_some(),
                traditional_ranked: trad_rank.is_some(),
            }
        })
        .collect()
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn aggregate(
    rows: &[ComparisonRow],
    counts: &KeywordCounts,
    spearman: &[f64],
    kendall: &[f64],
) -> ComparisonAggregates {
    let ranked: Vec<&ComparisonRow> = rows.iter().filter(|r| !r.is_sentinel()).collect();
    let deltas: Vec<f64> = ranked.iter().map(|r| r.delta as f64).collect();
    let abs: Vec<f64> = deltas.iter().map(|d| d.abs()).collect();

    ComparisonAggregates {
        keywords_compared: counts.compared,
        keywords_one_sided: counts.one_sided,
        keywords_unranked: counts.unranked,
        rows: rows.len(),
        sentinel_rows: rows.len() - ranked.len(),
        ai_only: rows.iter().filter(|r| r.ai_ranked && !r.traditional_ranked).count(),
        traditional_only: rows.iter().filter(|r| !r.ai_ranked && r.traditional_ranked).count(),
        promoted: ranked.iter().filter(|r| r.delta > 0).count(),
        demoted: ranked.iter().filter(|r| r.delta < 0).count(),
        unchanged: ranked.iter().filter(|r| r.delta == 0).count(),
        delta: stats::describe(&deltas),
        abs_delta: stats::describe(&abs),
        spearman: stats::describe(spearman),
        kendall: stats::describe(kendall),
    }
}

/// Write comparison rows as CSV.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_rows_csv(rows: &[ComparisonRow], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| HarnessError::Persistence(format!("failed to write CSV row: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| HarnessError::Persistence(format!("failed to finish CSV: {e}")))?;
    write_atomic(path, &bytes)
}

/// Render aggregates as a plain-text report.
pub fn render_aggregates(agg: &ComparisonAggregates) -> String {
    let mut out = String::new();
    let rule = "=".repeat(80);
    out.push_str(&format!("{rule}\n  AI vs TRADITIONAL RANK COMPARISON\n{rule}\n"));
    out.push_str(&format!("  Keywords compared:    {}\n", agg.keywords_compared));
    out.push_str(&format!("  Keywords one-sided:   {}\n", agg.keywords_one_sided));
    out.push_str(&format!("  Keywords unranked:    {}\n", agg.keywords_unranked));
    out.push_str(&format!(
        "  Rows:                 {} ({} not ranked on one side: {} AI only, {} traditional only)\n",
        agg.rows, agg.sentinel_rows, agg.ai_only, agg.traditional_only
    ));
    out.push_str(&format!(
        "  Promoted / demoted / unchanged: {} / {} / {}\n",
        agg.promoted, agg.demoted, agg.unchanged
    ));
    if let Some(d) = &agg.delta {
        out.push_str(&format!(
            "  Delta (traditional - AI): mean={:+.2}  median={:+.1}  std={:.2}  range=[{:+.0}, {:+.0}]\n",
            d.mean, d.median, d.std, d.min, d.max
        ));
    }
    if let Some(a) = &agg.abs_delta {
        out.push_str(&format!("  Mean |delta|:         {:.2}\n", a.mean));
    }
    if let (Some(s), Some(k)) = (&agg.spearman, &agg.kendall) {
        out.push_str(&format!(
            "  Spearman rho:         mean={:+.3}  median={:+.3}  (n={} keywords)\n",
            s.mean, s.median, s.n
        ));
        out.push_str(&format!(
            "  Kendall tau:          mean={:+.3}  median={:+.3}\n",
            k.mean, k.median
        ));
    }
    out.push_str(&rule);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::record::fixtures::record;

    fn row<'a>(c: &'a Comparison, domain: &str) -> &'a ComparisonRow {
        c.rows.iter().find(|r| r.domain == domain).unwrap()
    }

    #[test]
    fn promoted_domain_has_positive_delta() {
        let ai = [record("crm software", &["a.com", "b.com", "x.com"], Some(&["x.com", "a.com", "b.com"]))];
        let trad = [record("crm software", &["a.com", "b.com", "x.com"], None)];
        let c = compare(&ai, &trad, 0);
        assert_eq!(row(&c, "x.com").delta, 2);
        assert_eq!(row(&c, "a.com").delta, -1);
        assert_eq!(c.aggregates.promoted, 1);
        assert_eq!(c.aggregates.demoted, 2);
    }

    #[test]
    fn traditional_three_ai_two_is_plus_one() {
        let ai = [record("crm software", &["a.com", "b.com", "c.com"], Some(&["a.com", "c.com"]))];
        let trad = [record("crm software", &["a.com", "b.com", "c.com"], None)];
        let c = compare(&ai, &trad, 0);
        let r = row(&c, "c.com");
        assert_eq!((r.traditional_rank, r.ai_rank, r.delta), (3, 2, 1));
    }

    #[test]
    fn sentinel_rows_kept_but_excluded_from_aggregates() {
        let ai = [record("crm software", &["a.com", "b.com"], Some(&["a.com"]))];
        let trad = [record("crm software", &["a.com", "b.com"], None)];
        let c = compare(&ai, &trad, 0);
        assert_eq!(c.rows.len(), 2);

        let dropped = row(&c, "b.com");
        assert!(dropped.is_sentinel());
        assert!(!dropped.ai_ranked);
        // worst observed rank is 2, so the sentinel is 3
        assert_eq!(dropped.ai_rank, 3);
        assert_eq!(dropped.delta, -1);

        assert_eq!(c.aggregates.sentinel_rows, 1);
        assert_eq!(c.aggregates.traditional_only, 1);
        assert_eq!(c.aggregates.delta.unwrap().n, 1);
        assert_eq!(c.aggregates.unchanged, 1);
        assert_eq!(c.aggregates.demoted, 0);
    }

    #[test]
    fn fixed_sentinel_and_ai_only_domains() {
        let ai = [record("crm software", &["a.com", "z.com"], Some(&["z.com", "a.com"]))];
        let trad = [record("crm software", &["a.com"], None)];
        let c = compare(&ai, &trad, 21);
        let z = row(&c, "z.com");
        assert!(!z.traditional_ranked);
        assert_eq!(z.traditional_rank, 21);
        assert_eq!(z.delta, 20);
        assert_eq!(c.aggregates.ai_only, 1);
        assert_eq!(c.rows.last().unwrap().domain, "z.com");
    }

    #[test]
    fn one_sided_and_failed_keywords_keep_sentinel_rows() {
        let ai = [
            record("crm software", &["a.com"], Some(&["a.com"])),
            record("helpdesk", &["z.com", "f.com"], Some(&[])),
            record("project management", &["p.com"], Some(&["p.com"])),
        ];
        let trad = [
            record("crm software", &["a.com"], None),
            record("helpdesk", &["z.com", "f.com"], None),
            record("email marketing", &["m.com"], None),
        ];
        let c = compare(&ai, &trad, 0);

        let keyed: Vec<(&str, &str, usize, usize)> = c
            .rows
            .iter()
            .map(|r| (r.keyword.as_str(), r.domain.as_str(), r.traditional_rank, r.ai_rank))
            .collect();
        assert_eq!(
            keyed,
            [
                ("crm software", "a.com", 1, 1),
                ("helpdesk", "z.com", 1, 3),
                ("helpdesk", "f.com", 2, 3),
                ("project management", "p.com", 2, 1),
                ("email marketing", "m.com", 1, 2),
            ]
        );

        // Failed re-rank: every traditional domain is unranked on the AI side.
        assert!(c.rows.iter().filter(|r| r.keyword == "helpdesk").all(|r| !r.ai_ranked));
        assert!(!row(&c, "p.com").traditional_ranked);
        assert!(!row(&c, "m.com").ai_ranked);

        assert_eq!(c.aggregates.keywords_compared, 1);
        assert_eq!(c.aggregates.keywords_one_sided, 3);
        assert_eq!(c.aggregates.keywords_unranked, 0);
        assert_eq!(c.aggregates.sentinel_rows, 4);
        assert_eq!(c.aggregates.traditional_only, 3);
        assert_eq!(c.aggregates.ai_only, 1);
        assert_eq!(c.aggregates.delta.unwrap().n, 1);
    }

    #[test]
    fn keywords_without_ranks_produce_no_rows() {
        let ai = [record("crm software", &[], Some(&[]))];
        let trad = [record("crm software", &[], None)];
        let c = compare(&ai, &trad, 0);
        assert!(c.rows.is_empty());
        assert_eq!(c.aggregates.keywords_unranked, 1);
        assert!(c.aggregates.delta.is_none());
    }

    #[test]
    fn correlations_per_keyword() {
        let ai = [record("crm software", &["a.com", "b.com", "c.com"], Some(&["a.com", "b.com", "c.com"]))];
        let trad = [record("crm software", &["a.com", "b.com", "c.com"], None)];
        let c = compare(&ai, &trad, 0);
        assert!((c.aggregates.spearman.unwrap().mean - 1.0).abs() < 1e-9);
        assert!((c.aggregates.kendall.unwrap().mean - 1.0).abs() < 1e-9);
        assert!(render_aggregates(&c.aggregates).contains("Spearman rho"));
    }

    #[test]
    fn rows_csv_written() {
        let ai = [record("crm software", &["a.com", "b.com"], Some(&["b.com"]))];
        let trad = [record("crm software", &["a.com", "b.com"], None)];
        let c = compare(&ai, &trad, 0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmp.csv");
        write_rows_csv(&c.rows, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("keyword,domain,ai_rank,traditional_rank,delta"));
        assert_eq!(content.lines().count(), 3);
    }
}
