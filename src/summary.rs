//! Pre-LLM vs post-LLM summary for a single run.
//!
//! The model's effect on a SERP splits into two parts that raw rank
//! deltas conflate:
//!
//! - filtering: which SERP domains the model keeps at all
//! - reordering: how it orders the domains it keeps
//!
//! [`summarize`] measures both. Reordering metrics (Spearman, Kendall,
//! relative deltas) are computed on the overlap set only.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;

use serde::Serialize;

use crate::context::ExperimentContext;
use crate::record::ExperimentRecord;
use crate::stats::{self, relative_ranks, Stats};

/// SERP positions per filtering bucket.
const BUCKET_WIDTH: usize = 5;

/// Per-keyword view of one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordSummary {
    pub keyword: String,
    pub pre: Vec<String>,
    pub post: Vec<String>,
    pub promoted: Vec<String>,
    pub demoted: Vec<String>,
    pub dropped: Vec<String>,
    pub added: Vec<String>,
    /// `pre_rank - post_rank` for each post domain also in pre, in post order.
    pub raw_deltas: Vec<i64>,
    /// Shift within the overlap set after re-ranking both sides densely.
    pub relative_deltas: Vec<i64>,
    pub overlap: usize,
    pub spearman: Option<f64>,
    pub kendall: Option<f64>,
}

/// Kept vs dropped counts for one SERP position bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionBucket {
    /// First SERP position in the bucket (1, 6, 11, ...).
    pub start: usize,
    pub kept: usize,
    pub dropped: usize,
}

/// Run-level summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub keywords: Vec<KeywordSummary>,
    /// Records without a usable post-LLM ranking.
    pub skipped: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub provider_counts: BTreeMap<String, usize>,
    pub fallback_count: usize,
    pub avg_pre: f64,
    pub avg_post: f64,
    pub avg_overlap: f64,
    /// Overlap as a share of post-LLM domains.
    pub overlap_rate: f64,
    /// Most frequently dropped domains, most first.
    pub most_dropped: Vec<(String, usize)>,
    pub most_added: Vec<(String, usize)>,
    pub kept_positions: Option<Stats>,
    pub dropped_positions: Option<Stats>,
    /// Raw delta expected from filtering alone:
    /// mean kept SERP position minus mean post position.
    pub expected_filter_delta: Option<f64>,
    pub raw_delta: Option<Stats>,
    pub abs_raw_delta: Option<Stats>,
    pub buckets: Vec<PositionBucket>,
    pub spearman: Option<Stats>,
    pub kendall: Option<Stats>,
    pub relative_delta: Option<Stats>,
    pub abs_relative_delta: Option<Stats>,
    pub raw_histogram: BTreeMap<i64, usize>,
    pub relative_histogram: BTreeMap<i64, usize>,
}

/// Summarise pre vs post rankings for every record with a usable re-rank.
pub fn summarize(records: &[ExperimentRecord]) -> RunSummary {
    let mut status_counts = BTreeMap::new();
    let mut provider_counts = BTreeMap::new();
    let mut fallback_count = 0;
    let mut keywords = Vec::new();
    let mut skipped = 0;

    for record in records {
        *status_counts.entry(record.status.to_string()).or_insert(0) += 1;
        if let Some(p) = record.provider_used {
            *provider_counts.entry(p.slug().to_string()).or_insert(0) += 1;
        }
        if record.fallback_taken {
            fallback_count += 1;
        }
        match summarize_keyword(record) {
            Some(k) => keywords.push(k),
            None => skipped += 1,
        }
    }

    let n = keywords.len();
    let total_pre: usize = keywords.iter().map(|k| k.pre.len()).sum();
    let total_post: usize = keywords.iter().map(|k| k.post.len()).sum();
    let total_overlap: usize = keywords.iter().map(|k| k.overlap).sum();
    let per_keyword = |total: usize| if n == 0 { 0.0 } else { total as f64 / n as f64 };

    let mut kept_positions = Vec::new();
    let mut dropped_positions = Vec::new();
    let mut bucket_counts: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
    for k in &keywords {
        let post: HashSet<&str> = k.post.iter().map(String::as_str).collect();
        for (i, d) in k.pre.iter().enumerate() {
            let pos = i + 1;
            let start = (i / BUCKET_WIDTH) * BUCKET_WIDTH + 1;
            let entry = bucket_counts.entry(start).or_insert((0, 0));
            if post.contains(d.as_str()) {
                kept_positions.push(pos as f64);
                entry.0 += 1;
            } else {
                dropped_positions.push(pos as f64);
                entry.1 += 1;
            }
        }
    }

    let raw: Vec<i64> = keywords.iter().flat_map(|k| k.raw_deltas.iter().copied()).collect();
    let relative: Vec<i64> = keywords
        .iter()
        .flat_map(|k| k.relative_deltas.iter().copied())
        .collect();
    let as_f64 = |v: &[i64]| v.iter().map(|d| *d as f64).collect::<Vec<_>>();
    let as_abs = |v: &[i64]| v.iter().map(|d| d.abs() as f64).collect::<Vec<_>>();

    let kept_stats = stats::describe(&kept_positions);
    let expected_filter_delta = kept_stats.map(|ks| ks.mean - (per_keyword(total_post) + 1.0) / 2.0);

    let spearman: Vec<f64> = keywords.iter().filter_map(|k| k.spearman).collect();
    let kendall: Vec<f64> = keywords.iter().filter_map(|k| k.kendall).collect();

    RunSummary {
        skipped,
        status_counts,
        provider_counts,
        fallback_count,
        avg_pre: per_keyword(total_pre),
        avg_post: per_keyword(total_post),
        avg_overlap: per_keyword(total_overlap),
        overlap_rate: if total_post == 0 {
            0.0
        } else {
            total_overlap as f64 / total_post as f64
        },
        most_dropped: top_counts(keywords.iter().flat_map(|k| &k.dropped), 10),
        most_added: top_counts(keywords.iter().flat_map(|k| &k.added), 10),
        kept_positions: kept_stats,
        dropped_positions: stats::describe(&dropped_positions),
        expected_filter_delta,
        raw_delta: stats::describe(&as_f64(&raw)),
        abs_raw_delta: stats::describe(&as_abs(&raw)),
        buckets: bucket_counts
            .into_iter()
            .map(|(start, (kept, dropped))| PositionBucket {
                start,
                kept,
                dropped,
            })
            .collect(),
        spearman: stats::describe(&spearman),
        kendall: stats::describe(&kendall),
        relative_delta: stats::describe(&as_f64(&relative)),
        abs_relative_delta: stats::describe(&as_abs(&relative)),
        raw_histogram: histogram(&raw),
        relative_histogram: histogram(&relative),
        keywords,
    }
}

/// Pre vs post comparison for one record. `None` without a usable re-rank.
pub fn summarize_keyword(record: &ExperimentRecord) -> Option<KeywordSummary> {
    let post_ranks = record.ai_ranks()?;
    let pre: Vec<String> = record.candidates.iter().map(|c| c.domain.to_string()).collect();
    let post: Vec<String> = post_ranks.iter().map(|(d, _)| d.to_string()).collect();

    let pre_rank: HashMap<&str, usize> =
        pre.iter().enumerate().map(|(i, d)| (d.as_str(), i + 1)).collect();
    let post_set: HashSet<&str> = post.iter().map(String::as_str).collect();

    let mut summary = KeywordSummary {
        keyword: record.keyword.clone(),
        promoted: Vec::new(),
        demoted: Vec::new(),
        dropped: pre
            .iter()
            .filter(|d| !post_set.contains(d.as_str()))
            .cloned()
            .collect(),
        added: Vec::new(),
        raw_deltas: Vec::new(),
        relative_deltas: Vec::new(),
        overlap: 0,
        spearman: None,
        kendall: None,
        pre: Vec::new(),
        post: Vec::new(),
    };

    let mut overlap_pre = Vec::new();
    let mut overlap_post = Vec::new();
    for (i, d) in post.iter().enumerate() {
        let post_pos = i + 1;
        match pre_rank.get(d.as_str()) {
            None => summary.added.push(d.clone()),
            Some(&pre_pos) => {
                let delta = pre_pos as i64 - post_pos as i64;
                summary.raw_deltas.push(delta);
                if delta > 0 {
                    summary.promoted.push(d.clone());
                } else if delta < 0 {
                    summary.demoted.push(d.clone());
                }
                overlap_pre.push(pre_pos as f64);
                overlap_post.push(post_pos as f64);
            }
        }
    }

    summary.overlap = overlap_pre.len();
    summary.spearman = stats::spearman(&overlap_pre, &overlap_post);
    summary.kendall = stats::kendall_tau(&overlap_pre, &overlap_post);
    if summary.overlap >= 2 {
        summary.relative_deltas = relative_ranks(&overlap_pre)
            .into_iter()
            .zip(relative_ranks(&overlap_post))
            .map(|(a, b)| (a - b) as i64)
            .collect();
    }
    summary.pre = pre;
    summary.post = post;
    Some(summary)
}

fn top_counts<'a>(items: impl Iterator<Item = &'a String>, limit: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for item in items {
        *counts.entry(item.as_str()).or_insert(0) += 1;
    }
    let mut sorted: Vec<(String, usize)> =
        counts.into_iter().map(|(d, c)| (d.to_string(), c)).collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(limit);
    sorted
}

fn histogram(values: &[i64]) -> BTreeMap<i64, usize> {
    let mut h = BTreeMap::new();
    for v in values {
        *h.entry(*v).or_insert(0) += 1;
    }
    h
}

/// Plain-language reading of a mean Spearman rho.
pub fn interpret_spearman(mean: f64) -> &'static str {
    if mean > 0.7 {
        "The model mostly preserves the engine's relative ordering; its main effect is filtering."
    } else if mean > 0.3 {
        "The model partially preserves the engine's ordering and also reorders kept domains."
    } else if mean > -0.3 {
        "The model shows little correlation with the engine's ordering; it ranks from scratch."
    } else {
        "The model inverts the engine's ordering."
    }
}

/// Render the summary as a plain-text report.
pub fn render_report(summary: &RunSummary, runs: &[ExperimentContext]) -> String {
    let w = 80;
    let rule = "=".repeat(w);
    let thin = "-".repeat(w - 4);
    let mut out = String::new();

    let _ = writeln!(out, "{rule}\n  RANKING COMPARISON: search engine vs LLM re-ranking\n{rule}");
    if let (Some(first), Some(last)) = (runs.first(), runs.last()) {
        let providers: Vec<&str> = first.provider_priority.iter().map(|p| p.slug()).collect();
        let _ = writeln!(out, "  Run:              {} ({})", first.run_name, first.run_id);
        let _ = writeln!(out, "  Providers:        {}", providers.join(" > "));
        let _ = writeln!(
            out,
            "  Re-ranker:        {}",
            first.model.as_deref().unwrap_or("disabled")
        );
        if let Some(t) = first.treatment {
            let _ = writeln!(out, "  Treatment:        {t}");
        }
        let _ = writeln!(
            out,
            "  Host:             {} {}/{}",
            first.hostname.as_deref().unwrap_or("unknown"),
            first.os,
            first.arch
        );
        if let Some(n) = &first.network {
            let _ = writeln!(
                out,
                "  Network:          {} ({}, {}, {}; {})",
                n.public_ip, n.city, n.region, n.country, n.isp
            );
        }
        let _ = writeln!(out, "  Started:          {}", first.started_at.to_rfc3339());
        if let Some(end) = last.finished_at {
            let _ = writeln!(out, "  Finished:         {}", end.to_rfc3339());
        }
        if runs.len() > 1 {
            let _ = writeln!(out, "  Sessions:         {} (resumed)", runs.len());
        }
    }
    let statuses: Vec<String> = summary
        .status_counts
        .iter()
        .map(|(s, n)| format!("{s}={n}"))
        .collect();
    let _ = writeln!(out, "  Records:          {}", statuses.join(" "));
    let providers: Vec<String> = summary
        .provider_counts
        .iter()
        .map(|(p, n)| format!("{p}={n}"))
        .collect();
    let _ = writeln!(
        out,
        "  Served by:        {} (fallback taken {}x)",
        providers.join(" "),
        summary.fallback_count
    );
    let _ = writeln!(out, "{rule}");

    for k in &summary.keywords {
        render_keyword(&mut out, k, &thin);
    }

    if summary.keywords.is_empty() {
        let _ = writeln!(out, "\n  No re-ranked keywords to summarize.");
        return out;
    }

    let _ = writeln!(out, "\n{rule}\n  GLOBAL SUMMARY\n{rule}");
    let _ = writeln!(out, "  Keywords summarized:        {}", summary.keywords.len());
    let _ = writeln!(out, "  Keywords skipped:           {}", summary.skipped);
    let _ = writeln!(out, "  Avg domains/keyword (SERP): {:.1}", summary.avg_pre);
    let _ = writeln!(out, "  Avg domains/keyword (LLM):  {:.1}", summary.avg_post);
    let _ = writeln!(out, "  Avg overlap:                {:.1}", summary.avg_overlap);
    let _ = writeln!(out, "  Overlap rate:               {:.0}%", summary.overlap_rate * 100.0);
    if !summary.most_dropped.is_empty() {
        let _ = writeln!(out, "\n  Most dropped by the model:");
        for (d, c) in &summary.most_dropped {
            let _ = writeln!(out, "    {d:<35} dropped {c}x");
        }
    }
    if !summary.most_added.is_empty() {
        let _ = writeln!(out, "\n  Named by the model but not in the SERP:");
        for (d, c) in &summary.most_added {
            let _ = writeln!(out, "    {d:<35} added {c}x");
        }
    }

    let _ = writeln!(out, "\n{rule}\n  FILTERING: which SERP domains the model keeps\n{rule}");
    if let (Some(ks), Some(ds)) = (&summary.kept_positions, &summary.dropped_positions) {
        let _ = writeln!(
            out,
            "  SERP position of kept domains:    mean={:.1}  median={:.1}  range=[{:.0}, {:.0}]",
            ks.mean, ks.median, ks.min, ks.max
        );
        let _ = writeln!(
            out,
            "  SERP position of dropped domains: mean={:.1}  median={:.1}  range=[{:.0}, {:.0}]",
            ds.mean, ds.median, ds.min, ds.max
        );
    }
    if let Some(expected) = summary.expected_filter_delta {
        let _ = writeln!(out, "  Expected raw delta from filtering alone: {expected:+.1}");
        if let Some(raw) = &summary.raw_delta {
            let _ = writeln!(out, "  Observed mean raw delta:                 {:+.1}", raw.mean);
            let _ = writeln!(
                out,
                "  Residual attributable to reordering:     {:+.1}",
                raw.mean - expected
            );
        }
    }
    if !summary.buckets.is_empty() {
        let _ = writeln!(out, "\n    {:<10} {:>6} {:>8} {:>8}", "Bucket", "Kept", "Dropped", "Keep %");
        for b in &summary.buckets {
            let total = b.kept + b.dropped;
            let pct = if total == 0 {
                0.0
            } else {
                b.kept as f64 / total as f64 * 100.0
            };
            let label = format!("{}-{}", b.start, b.start + BUCKET_WIDTH - 1);
            let _ = writeln!(out, "    {label:<10} {:>6} {:>8} {pct:>7.0}%", b.kept, b.dropped);
        }
    }

    let _ = writeln!(out, "\n{rule}\n  REORDERING: order among shared domains\n{rule}");
    match (&summary.spearman, &summary.kendall) {
        (Some(sp), Some(kt)) => {
            let _ = writeln!(
                out,
                "  Spearman rho: mean={:+.3}  median={:+.3}  std={:.3}  range=[{:+.3}, {:+.3}]",
                sp.mean, sp.median, sp.std, sp.min, sp.max
            );
            let _ = writeln!(
                out,
                "  Kendall tau:  mean={:+.3}  median={:+.3}  std={:.3}  range=[{:+.3}, {:+.3}]",
                kt.mean, kt.median, kt.std, kt.min, kt.max
            );
            let _ = writeln!(out, "  {}", interpret_spearman(sp.mean));
            if let (Some(rel), Some(abs)) = (&summary.relative_delta, &summary.abs_relative_delta) {
                let _ = writeln!(
                    out,
                    "  Relative delta: mean={:+.2}  std={:.2}  mean |delta|={:.2}",
                    rel.mean, rel.std, abs.mean
                );
            }
            render_histogram(&mut out, "Relative reorder delta histogram:", &summary.relative_histogram);
        }
        _ => {
            let _ = writeln!(out, "  Not enough shared domains to compute rank correlations.");
        }
    }

    let _ = writeln!(out, "\n{rule}\n  RAW DELTAS: filtering and reordering combined\n{rule}");
    if let (Some(raw), Some(abs)) = (&summary.raw_delta, &summary.abs_raw_delta) {
        let _ = writeln!(out, "  Observations:  {}", raw.n);
        let _ = writeln!(out, "  Mean delta:    {:+.2}", raw.mean);
        let _ = writeln!(out, "  Median delta:  {:+.1}", raw.median);
        let _ = writeln!(out, "  Std:           {:.2}", raw.std);
        let _ = writeln!(out, "  Mean |delta|:  {:.2}", abs.mean);
        render_histogram(&mut out, "Raw delta histogram:", &summary.raw_histogram);
    }
    let _ = writeln!(out, "{rule}");
    out
}

fn render_keyword(out: &mut String, k: &KeywordSummary, thin: &str) {
    let _ = writeln!(out, "\n  Keyword: {}", k.keyword);
    let _ = writeln!(out, "  {thin}");
    let _ = writeln!(out, "  {:<4} {:<32} {:<32} Delta", "#", "SERP", "LLM re-ranked");
    let pre_rank: HashMap<&str, usize> =
        k.pre.iter().enumerate().map(|(i, d)| (d.as_str(), i + 1)).collect();
    for i in 0..k.pre.len().max(k.post.len()) {
        let pre_d = k.pre.get(i).map_or("", String::as_str);
        let post_d = k.post.get(i).map_or("", String::as_str);
        let change = match (post_d.is_empty(), pre_rank.get(post_d)) {
            (true, _) => String::new(),
            (false, None) => "NEW".to_string(),
            (false, Some(&old)) => {
                let diff = old as i64 - (i + 1) as i64;
                if diff == 0 { "=".to_string() } else { format!("{diff:+}") }
            }
        };
        let _ = writeln!(out, "  {:<4} {pre_d:<32} {post_d:<32} {change}", i + 1);
    }
    let _ = writeln!(out, "  {thin}");
    if !k.raw_deltas.is_empty() {
        let _ = writeln!(out, "  Raw delta vector: {:?}", k.raw_deltas);
    }
    if !k.relative_deltas.is_empty() {
        let _ = writeln!(
            out,
            "  Relative reorder: {:?}  (among {} shared domains)",
            k.relative_deltas, k.overlap
        );
    }
    if let (Some(rho), Some(tau)) = (k.spearman, k.kendall) {
        let _ = writeln!(out, "  Spearman rho={rho:+.3}   Kendall tau={tau:+.3}");
    }
    for (label, list) in [
        ("Promoted", &k.promoted),
        ("Demoted", &k.demoted),
        ("Dropped", &k.dropped),
        ("Added", &k.added),
    ] {
        if !list.is_empty() {
            let _ = writeln!(out, "  {label:<9} {}", list.join(", "));
        }
    }
}

fn render_histogram(out: &mut String, title: &str, h: &BTreeMap<i64, usize>) {
    if h.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n  {title}");
    for (delta, count) in h {
        let _ = writeln!(out, "    {delta:+3}: {count:>3}  {}", "#".repeat(*count));
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::record::fixtures::record;

    #[test]
    fn keyword_summary_splits_filtering_and_reordering() {
        let r = record(
            "crm software",
            &["g2.com", "salesforce.com", "hubspot.com", "zoho.com"],
            Some(&["hubspot.com", "salesforce.com", "zoho.com"]),
        );
        let k = summarize_keyword(&r).unwrap();
        assert_eq!(k.dropped, ["g2.com"]);
        assert!(k.added.is_empty());
        assert_eq!(k.overlap, 3);
        // hubspot 3→1, salesforce 2→2, zoho 4→3
        assert_eq!(k.raw_deltas, [2, 0, 1]);
        assert_eq!(k.promoted, ["hubspot.com", "zoho.com"]);
        assert!(k.demoted.is_empty());
        // within the overlap: hubspot 2→1, salesforce 1→2, zoho 3→3
        assert_eq!(k.relative_deltas, [1, -1, 0]);
        assert!((k.spearman.unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn baseline_records_are_skipped() {
        let records = [
            record("crm software", &["a.com", "b.com"], Some(&["b.com", "a.com"])),
            record("helpdesk", &["z.com"], None),
        ];
        let s = summarize(&records);
        assert_eq!(s.keywords.len(), 1);
        assert_eq!(s.skipped, 1);
        assert_eq!(s.status_counts.get("ok"), Some(&2));
        assert_eq!(s.provider_counts.get("searxng"), Some(&2));
    }

    #[test]
    fn filtering_effect_from_kept_positions() {
        let records = [record(
            "crm software",
            &["g2.com", "capterra.com", "hubspot.com", "zoho.com"],
            Some(&["hubspot.com", "zoho.com"]),
        )];
        let s = summarize(&records);
        // kept SERP positions 3 and 4 (mean 3.5); mean post position 1.5
        assert!((s.expected_filter_delta.unwrap() - 2.0).abs() < 1e-9);
        assert!((s.raw_delta.unwrap().mean - 2.0).abs() < 1e-9);
        assert_eq!(s.most_dropped.len(), 2);
        assert_eq!(s.buckets, [PositionBucket { start: 1, kept: 2, dropped: 2 }]);
        assert!((s.overlap_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn report_renders_sections() {
        let records = [
            record("crm software", &["a.com", "b.com", "c.com"], Some(&["b.com", "a.com", "c.com"])),
            record("helpdesk", &["d.com", "e.com"], Some(&["d.com", "e.com"])),
        ];
        let report = render_report(&summarize(&records), &[]);
        assert!(report.contains("Keyword: crm software"));
        assert!(report.contains("GLOBAL SUMMARY"));
        assert!(report.contains("Spearman rho"));
        assert!(report.contains("RAW DELTAS"));
    }

    #[test]
    fn report_header_shows_network_location() {
        let mut ctx = ExperimentContext::capture("pilot", &crate::config::ExperimentConfig::default());
        ctx.network = Some(crate::context::NetworkLocation {
            public_ip: "192.0.2.10".into(),
            city: "Berlin".into(),
            region: "Berlin".into(),
            country: "Germany".into(),
            isp: "Example GmbH".into(),
            lat: None,
            lon: None,
        });
        let report = render_report(&summarize(&[]), &[ctx]);
        assert!(report.contains("Network:          192.0.2.10 (Berlin, Berlin, Germany; Example GmbH)"));
    }

    #[test]
    fn empty_summary_report() {
        let report = render_report(&summarize(&[]), &[]);
        assert!(report.contains("No re-ranked keywords"));
    }

    #[test]
    fn interpretation_thresholds() {
        assert!(interpret_spearman(0.9).contains("mostly preserves"));
        assert!(interpret_spearman(0.5).contains("partially"));
        assert!(interpret_spearman(0.0).contains("little correlation"));
        assert!(interpret_spearman(-0.8).contains("inverts"));
    }
}
