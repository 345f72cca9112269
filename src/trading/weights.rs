//! Inverse-correlation capital weighting across symbols.
//!
//! Assets that move together are penalised: each symbol's raw weight is
//! `1 / (1 + sum |corr(symbol, other)|)`, normalised so the weights sum to 1.

use std::collections::BTreeMap;

use statrs::statistics::Statistics;
use tracing::debug;

/// Symbol to capital fraction.
pub type Weights = BTreeMap<String, f64>;

/// Compute inverse-correlation weights from close-price series.
///
/// Series are aligned by position; lengths may differ. Always returns a defined result:
/// empty for no symbols, 1.0 for a single symbol, equal weights when no aligned returns
/// exist or the raw weights are degenerate.
pub fn correlation_based_weights(prices: &BTreeMap<String, Vec<f64>>) -> Weights {
    if prices.is_empty() {
        return Weights::new();
    }
    if prices.len() == 1 {
        return prices.keys().map(|k| (k.clone(), 1.0)).collect();
    }

    let symbols: Vec<&String> = prices.keys().collect();
    let series: Vec<&Vec<f64>> = prices.values().collect();
    let returns = aligned_returns(&series);

    if returns.first().map_or(true, Vec::is_empty) {
        debug!(symbols = symbols.len(), "No aligned returns, using equal weights");
        return equal_weights(&symbols);
    }

    let n = symbols.len();
    let corr = correlation_matrix(&returns);

    let raw: Vec<f64> = (0..n)
        .map(|i| {
            let penalty: f64 = (0..n).filter(|&j| j != i).map(|j| corr[i][j].abs()).sum();
            (1.0 / (1.0 + penalty)).max(0.0)
        })
        .collect();

    let total: f64 = raw.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        debug!(total, "Degenerate raw weights, using equal weights");
        return equal_weights(&symbols);
    }

    symbols
        .iter()
        .zip(raw)
        .map(|(sym, w)| ((*sym).clone(), w / total))
        .collect()
}

fn equal_weights(symbols: &[&String]) -> Weights {
    let w = 1.0 / symbols.len() as f64;
    symbols.iter().map(|s| ((*s).clone(), w)).collect()
}

/// Simple returns per symbol, keeping only rows where every symbol has a finite return.
///
/// Returns one column per input series; all columns have equal length.
fn aligned_returns(series: &[&Vec<f64>]) -> Vec<Vec<f64>> {
    let rows = series.iter().map(|s| s.len()).min().unwrap_or(0);
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); series.len()];

    for t in 1..rows {
        let row: Vec<f64> = series.iter().map(|s| s[t] / s[t - 1] - 1.0).collect();
        if row.iter().all(|r| r.is_finite()) {
            for (col, r) in columns.iter_mut().zip(row) {
                col.push(r);
            }
        }
    }

    columns
}

/// Pearson correlation matrix; undefined entries (constant or too-short series) become 0.
fn correlation_matrix(columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = columns.len();
    let mut corr = vec![vec![0.0; n]; n];

    for i in 0..n {
        corr[i][i] = 1.0;
        for j in (i + 1)..n {
            let c = pearson(&columns[i], &columns[j]);
            corr[i][j] = c;
            corr[j][i] = c;
        }
    }

    corr
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let cov = x.iter().covariance(y.iter());
    let sx = x.iter().std_dev();
    let sy = y.iter().std_dev();
    let r = cov / (sx * sy);
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(entries: &[(&str, Vec<f64>)]) -> BTreeMap<String, Vec<f64>> {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn total(w: &Weights) -> f64 {
        w.values().sum()
    }

    #[test]
    fn test_empty_input() {
        assert!(correlation_based_weights(&BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_single_symbol_gets_full_weight() {
        let w = correlation_based_weights(&prices(&[("BTC/USD", vec![1.0, 2.0, 3.0])]));
        assert_eq!(w["BTC/USD"], 1.0);

        let w = correlation_based_weights(&prices(&[("ETH/USD", vec![])]));
        assert_eq!(w["ETH/USD"], 1.0);
    }

    #[test]
    fn test_no_aligned_returns_falls_back_to_equal() {
        let w = correlation_based_weights(&prices(&[
            ("A", vec![1.0]),
            ("B", vec![1.0, 2.0, 3.0]),
            ("C", vec![5.0, 6.0]),
        ]));
        for v in w.values() {
            assert!((v - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_correlated_pair_is_penalised() {
        let a = vec![100.0, 101.0, 103.0, 102.0, 105.0, 107.0, 106.0];
        let b: Vec<f64> = a.iter().map(|p| p * 2.0).collect();
        let c = vec![50.0, 49.0, 51.0, 52.0, 50.0, 50.5, 53.0];
        let w = correlation_based_weights(&prices(&[("A", a), ("B", b), ("C", c)]));

        assert!((total(&w) - 1.0).abs() < 1e-9);
        assert!((w["A"] - w["B"]).abs() < 1e-12);
        assert!(w["C"] > w["A"]);
        assert!(w.values().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_constant_series_treated_as_uncorrelated() {
        let w = correlation_based_weights(&prices(&[
            ("FLAT", vec![10.0, 10.0, 10.0, 10.0]),
            ("UP", vec![1.0, 2.0, 3.0, 5.0]),
        ]));
        assert!((w["FLAT"] - 0.5).abs() < 1e-12);
        assert!((w["UP"] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_uneven_lengths_sum_to_one() {
        let w = correlation_based_weights(&prices(&[
            ("A", vec![1.0, 1.1, 1.2, 1.15, 1.3, 1.25]),
            ("B", vec![2.0, 1.9, 2.1, 2.05]),
            ("C", vec![3.0, 3.3, 3.1, 3.2, 3.4]),
        ]));
        assert_eq!(w.len(), 3);
        assert!((total(&w) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_price_rows_are_dropped() {
        let w = correlation_based_weights(&prices(&[
            ("A", vec![0.0, 1.0, 2.0, 3.0, 2.5]),
            ("B", vec![1.0, 2.0, 1.5, 1.8, 2.2]),
        ]));
        assert!((total(&w) - 1.0).abs() < 1e-9);
        assert!(w.values().all(|v| v.is_finite()));
    }
}
