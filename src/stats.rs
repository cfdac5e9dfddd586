//! Descriptive statistics and rank correlations.

use serde::Serialize;

/// Summary of a sample. Standard deviation is the population form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Describe `values`. `None` for an empty sample.
pub fn describe(values: &[f64]) -> Option<Stats> {
    if values.is_empty() {
        return None;
    }
    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    Some(Stats {
        n,
        mean,
        median,
        std: variance.sqrt(),
        min: sorted[0],
        max: sorted[n - 1],
    })
}

/// Replace each value by its 1-based position in sorted order.
/// Ties keep input order.
pub fn relative_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; values.len()];
    for (rank0, idx) in order.into_iter().enumerate() {
        ranks[idx] = (rank0 + 1) as f64;
    }
    ranks
}

/// Spearman's rho on relative ranks: `1 - 6 * sum(d^2) / (n * (n^2 - 1))`.
///
/// `None` with fewer than two pairs or mismatched lengths.
pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len();
    if n < 2 || n != y.len() {
        return None;
    }
    let rx = relative_ranks(x);
    let ry = relative_ranks(y);
    let d_sq: f64 = rx.iter().zip(&ry).map(|(a, b)| (a - b).powi(2)).sum();
    let n = n as f64;
    Some(1.0 - (6.0 * d_sq) / (n * (n * n - 1.0)))
}

/// Kendall's tau: `(concordant - discordant) / (n * (n - 1) / 2)`.
/// Tied pairs count toward neither.
///
/// `None` with fewer than two pairs or mismatched lengths.
pub fn kendall_tau(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len();
    if n < 2 || n != y.len() {
        return None;
    }
    let mut concordant = 0i64;
    let mut discordant = 0i64;
    for i in 0..n {
        for j in (i + 1)..n {
            let product = (x[i] - x[j]) * (y[i] - y[j]);
            if product > 0.0 {
                concordant += 1;
            } else if product < 0.0 {
                discordant += 1;
            }
        }
    }
    let pairs = (n * (n - 1) / 2) as f64;
    Some((concordant - discordant) as f64 / pairs)
}
