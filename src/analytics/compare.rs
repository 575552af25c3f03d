//! Multi-ticker comparison: series aligned on shared trading days,
//! rebased to 100, with per-ticker stats and a Pearson correlation matrix
//! over daily returns.

use super::metrics::{compute_metrics, PriceMetrics};
use crate::models::DailyBar;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    pub tickers: Vec<String>,
    /// Trading days present for every ticker.
    pub dates: Vec<NaiveDate>,
    pub normalized_prices: BTreeMap<String, Vec<f64>>,
    pub stats: BTreeMap<String, PriceMetrics>,
    /// Row/column order follows `tickers`.
    pub correlation: Vec<Vec<f64>>,
}

/// Pearson correlation of two equally long samples. `None` when either
/// sample is degenerate (fewer than two points or zero variance).
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// Align every series on the intersection of trading days and compare.
/// Returns `None` when fewer than two shared days exist.
pub fn compare_series(series: &HashMap<String, Vec<DailyBar>>) -> Option<ComparisonResult> {
    if series.is_empty() {
        return None;
    }

    let mut tickers: Vec<String> = series.keys().cloned().collect();
    tickers.sort();

    let mut shared: Option<BTreeSet<NaiveDate>> = None;
    for bars in series.values() {
        let dates: BTreeSet<NaiveDate> = bars.iter().map(|b| b.date).collect();
        shared = Some(match shared {
            None => dates,
            Some(prev) => prev.intersection(&dates).copied().collect(),
        });
    }
    let dates: Vec<NaiveDate> = shared.unwrap_or_default().into_iter().collect();
    if dates.len() < 2 {
        return None;
    }

    let mut normalized_prices = BTreeMap::new();
    let mut stats = BTreeMap::new();
    let mut returns: Vec<Vec<f64>> = Vec::with_capacity(tickers.len());

    for ticker in &tickers {
        let by_date: HashMap<NaiveDate, &DailyBar> =
            series[ticker].iter().map(|b| (b.date, b)).collect();
        let aligned: Vec<DailyBar> = dates.iter().map(|d| by_date[d].clone()).collect();

        let base = aligned[0].close;
        if base == 0.0 {
            return None;
        }
        normalized_prices.insert(
            ticker.clone(),
            aligned.iter().map(|b| b.close / base * 100.0).collect(),
        );
        returns.push(super::metrics::daily_returns(&aligned));
        if let Some(m) = compute_metrics(&aligned, 0.0) {
            stats.insert(ticker.clone(), m);
        }
    }

    let n = tickers.len();
    let mut correlation = vec![vec![0.0; n]; n];
    for i in 0..n {
        correlation[i][i] = 1.0;
        for j in (i + 1)..n {
            // Degenerate pairs (a constant return series) report full
            // correlation, matching the NaN-fill the consumers expect.
            let c = pearson(&returns[i], &returns[j]).unwrap_or(1.0);
            correlation[i][j] = c;
            correlation[j][i] = c;
        }
    }

    Some(ComparisonResult {
        tickers,
        dates,
        normalized_prices,
        stats,
        correlation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(ticker: &str, closes: &[(u32, f64)]) -> Vec<DailyBar> {
        closes
            .iter()
            .map(|&(day, close)| DailyBar {
                ticker: ticker.into(),
                date: NaiveDate::from_ymd_opt(2026, 7, day).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 100,
                daily_change_pct: None,
            })
            .collect()
    }

    #[test]
    fn normalizes_to_100_and_correlates_identical_returns() {
        let mut series = HashMap::new();
        series.insert("t1".to_string(), bars("t1", &[(1, 100.0), (2, 110.0), (3, 121.0)]));
        series.insert("t2".to_string(), bars("t2", &[(1, 200.0), (2, 210.0), (3, 231.0)]));

        let result = compare_series(&series).unwrap();
        assert_eq!(result.normalized_prices["t1"], vec![100.0, 110.0, 121.0]);
        let t2 = &result.normalized_prices["t2"];
        assert!((t2[0] - 100.0).abs() < 1e-9);
        assert!((t2[1] - 105.0).abs() < 1e-9);
        assert!((t2[2] - 115.5).abs() < 1e-9);
        // t1's return series is constant, so the pair is degenerate and
        // reports full correlation.
        assert!((result.correlation[0][1] - 1.0).abs() < 1e-9);
        assert!((result.correlation[0][1] - result.correlation[1][0]).abs() < 1e-12);
    }

    #[test]
    fn perfectly_proportional_returns_correlate_to_one() {
        let mut series = HashMap::new();
        series.insert("t1".to_string(), bars("t1", &[(1, 100.0), (2, 110.0), (3, 121.0)]));
        // Same daily return path: +10%, +10%.
        series.insert("t2".to_string(), bars("t2", &[(1, 50.0), (2, 55.0), (3, 60.5)]));

        let result = compare_series(&series).unwrap();
        assert!((result.correlation[0][1] - 1.0).abs() < 1e-9);
        assert_eq!(result.correlation[0][0], 1.0);
        assert_eq!(result.correlation[1][1], 1.0);
    }

    #[test]
    fn alignment_drops_unshared_days() {
        let mut series = HashMap::new();
        series.insert(
            "t1".to_string(),
            bars("t1", &[(1, 100.0), (2, 101.0), (3, 102.0)]),
        );
        series.insert("t2".to_string(), bars("t2", &[(2, 50.0), (3, 51.0)]));

        let result = compare_series(&series).unwrap();
        assert_eq!(result.dates.len(), 2);
        assert_eq!(result.normalized_prices["t1"].len(), 2);
    }

    #[test]
    fn too_few_shared_days_is_none() {
        let mut series = HashMap::new();
        series.insert("t1".to_string(), bars("t1", &[(1, 100.0)]));
        series.insert("t2".to_string(), bars("t2", &[(2, 50.0)]));
        assert!(compare_series(&series).is_none());
    }
}
