//! Investment simulations over stored bar series: lump-sum, monthly DCA
//! and multi-holding portfolios. All arithmetic is integer-share with a
//! cash carry, so results are exactly reproducible.

use crate::models::DailyBar;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Simulations are capped at five years of history.
pub const MAX_SIMULATION_DAYS: i64 = 365 * 5;
pub const MAX_PORTFOLIO_HOLDINGS: usize = 20;
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Serialize)]
pub struct ValuationPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LumpSumResult {
    pub ticker: String,
    /// First trading day on or after the requested buy date.
    pub buy_date: NaiveDate,
    pub buy_price: f64,
    pub shares: i64,
    /// Cash left after the integer-share purchase.
    pub remainder: f64,
    pub invested: f64,
    pub final_value: f64,
    pub profit: f64,
    pub profit_pct: f64,
    pub max_gain_date: Option<NaiveDate>,
    pub max_gain_pct: Option<f64>,
    pub max_loss_date: Option<NaiveDate>,
    pub max_loss_pct: Option<f64>,
    pub valuations: Vec<ValuationPoint>,
}

/// Buy once on the first trading day at/after `buy_date` and hold to the
/// end of the series. `None` when no tradable day exists or the price is
/// unusable.
pub fn run_lump_sum(bars: &[DailyBar], buy_date: NaiveDate, amount: f64) -> Option<LumpSumResult> {
    let start_idx = bars.iter().position(|b| b.date >= buy_date)?;
    let held = &bars[start_idx..];
    let entry = held.first()?;
    if entry.close <= 0.0 || amount <= 0.0 {
        return None;
    }

    let shares = (amount / entry.close).floor() as i64;
    let remainder = amount - shares as f64 * entry.close;

    let valuations: Vec<ValuationPoint> = held
        .iter()
        .map(|b| ValuationPoint {
            date: b.date,
            value: shares as f64 * b.close + remainder,
        })
        .collect();

    let invested = amount;
    let final_value = valuations.last().map(|p| p.value).unwrap_or(amount);

    let mut max_gain: Option<(NaiveDate, f64)> = None;
    let mut max_loss: Option<(NaiveDate, f64)> = None;
    for point in &valuations {
        let pct = (point.value / invested - 1.0) * 100.0;
        if max_gain.map(|(_, g)| pct > g).unwrap_or(true) {
            max_gain = Some((point.date, pct));
        }
        if max_loss.map(|(_, l)| pct < l).unwrap_or(true) {
            max_loss = Some((point.date, pct));
        }
    }

    Some(LumpSumResult {
        ticker: entry.ticker.clone(),
        buy_date: entry.date,
        buy_price: entry.close,
        shares,
        remainder,
        invested,
        final_value,
        profit: final_value - invested,
        profit_pct: (final_value / invested - 1.0) * 100.0,
        max_gain_date: max_gain.map(|(d, _)| d),
        max_gain_pct: max_gain.map(|(_, p)| p),
        max_loss_date: max_loss.map(|(d, _)| d),
        max_loss_pct: max_loss.map(|(_, p)| p),
        valuations,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct DcaMonthRow {
    pub month: String,
    pub buy_date: NaiveDate,
    pub buy_price: f64,
    pub shares_bought: i64,
    pub carry_after: f64,
    pub cumulative_shares: i64,
    pub cumulative_invested: f64,
    pub valuation: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DcaResult {
    pub ticker: String,
    pub monthly_amount: f64,
    pub months: Vec<DcaMonthRow>,
    pub total_invested: f64,
    pub total_shares: i64,
    pub final_carry: f64,
    pub final_value: f64,
    pub profit: f64,
    pub profit_pct: f64,
    /// `total_invested / total_shares`.
    pub avg_buy_price: Option<f64>,
}

fn month_start(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Monthly purchases on the trading day at/after `buy_day`, with the
/// un-invested remainder carried into the next month. `None` when no month
/// produces a tradable day.
pub fn run_dca(
    bars: &[DailyBar],
    monthly_amount: f64,
    start: NaiveDate,
    end: NaiveDate,
    buy_day: u32,
) -> Option<DcaResult> {
    if bars.is_empty() || monthly_amount <= 0.0 {
        return None;
    }

    let mut months = Vec::new();
    let mut carry = 0.0f64;
    let mut total_shares = 0i64;
    let mut total_invested = 0.0f64;

    let (mut year, mut month) = (start.year(), start.month());
    while month_start(year, month)? <= end {
        let target = NaiveDate::from_ymd_opt(year, month, buy_day)?;
        if target >= start || (year, month) == (start.year(), start.month()) {
            // First trading day on or after the buy day; may spill past a
            // holiday stretch.
            let buy_bar = bars
                .iter()
                .find(|b| b.date >= target.max(start) && b.date <= end);
            if let Some(bar) = buy_bar {
                if bar.close > 0.0 {
                    let budget = carry + monthly_amount;
                    let shares = (budget / bar.close).floor() as i64;
                    carry = budget - shares as f64 * bar.close;
                    total_shares += shares;
                    total_invested += monthly_amount;
                    months.push(DcaMonthRow {
                        month: format!("{year}-{month:02}"),
                        buy_date: bar.date,
                        buy_price: bar.close,
                        shares_bought: shares,
                        carry_after: carry,
                        cumulative_shares: total_shares,
                        cumulative_invested: total_invested,
                        valuation: total_shares as f64 * bar.close + carry,
                    });
                }
            }
        }
        let (y, m) = next_month(year, month);
        year = y;
        month = m;
    }

    if months.is_empty() {
        return None;
    }

    let last_close = bars
        .iter()
        .rev()
        .find(|b| b.date <= end)
        .map(|b| b.close)
        .unwrap_or(0.0);
    let final_value = total_shares as f64 * last_close + carry;

    Some(DcaResult {
        ticker: bars[0].ticker.clone(),
        monthly_amount,
        months,
        total_invested,
        total_shares,
        final_carry: carry,
        final_value,
        profit: final_value - total_invested,
        profit_pct: if total_invested > 0.0 {
            (final_value / total_invested - 1.0) * 100.0
        } else {
            0.0
        },
        avg_buy_price: if total_shares > 0 {
            Some(total_invested / total_shares as f64)
        } else {
            None
        },
    })
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortfolioHolding {
    pub ticker: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioResult {
    pub holdings: Vec<PortfolioHolding>,
    pub invested: f64,
    pub final_value: f64,
    pub profit: f64,
    pub profit_pct: f64,
    pub valuations: Vec<ValuationPoint>,
    pub per_ticker: BTreeMap<String, LumpSumResult>,
}

/// Weighted lump-sums per holding aggregated on the union of trading days
/// with forward-filled closes. Weight/holding-count validation happens at
/// the API boundary; this returns `None` when any holding cannot trade.
pub fn run_portfolio(
    series: &HashMap<String, Vec<DailyBar>>,
    holdings: &[PortfolioHolding],
    amount: f64,
    start: NaiveDate,
    end: NaiveDate,
) -> Option<PortfolioResult> {
    let mut per_ticker = BTreeMap::new();
    for holding in holdings {
        let bars = series.get(&holding.ticker)?;
        let in_range: Vec<DailyBar> = bars
            .iter()
            .filter(|b| b.date <= end)
            .cloned()
            .collect();
        let result = run_lump_sum(&in_range, start, amount * holding.weight)?;
        per_ticker.insert(holding.ticker.clone(), result);
    }

    // Union of valuation dates across holdings.
    let mut dates: Vec<NaiveDate> = per_ticker
        .values()
        .flat_map(|r| r.valuations.iter().map(|p| p.date))
        .collect();
    dates.sort_unstable();
    dates.dedup();

    // Forward-fill each holding's value over the union index.
    let mut valuations = Vec::with_capacity(dates.len());
    for &date in &dates {
        let mut total = 0.0;
        for result in per_ticker.values() {
            let value = result
                .valuations
                .iter()
                .take_while(|p| p.date <= date)
                .last()
                .map(|p| p.value)
                // Before the holding's first trade its slice is still cash.
                .unwrap_or(result.invested);
            total += value;
        }
        valuations.push(ValuationPoint { date, value: total });
    }

    let invested: f64 = per_ticker.values().map(|r| r.invested).sum();
    let final_value = valuations.last().map(|p| p.value).unwrap_or(invested);

    Some(PortfolioResult {
        holdings: holdings.to_vec(),
        invested,
        final_value,
        profit: final_value - invested,
        profit_pct: if invested > 0.0 {
            (final_value / invested - 1.0) * 100.0
        } else {
            0.0
        },
        valuations,
        per_ticker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ticker: &str, date: NaiveDate, close: f64) -> DailyBar {
        DailyBar {
            ticker: ticker.into(),
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 100,
            daily_change_pct: None,
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn lump_sum_floors_shares_and_keeps_remainder() {
        let bars = vec![
            bar("t", d(2026, 1, 5), 10000.0),
            bar("t", d(2026, 1, 6), 11000.0),
        ];
        let result = run_lump_sum(&bars, d(2026, 1, 3), 105000.0).unwrap();
        assert_eq!(result.buy_date, d(2026, 1, 5));
        assert_eq!(result.shares, 10);
        assert!((result.remainder - 5000.0).abs() < 1e-9);
        assert!((result.final_value - 115000.0).abs() < 1e-9);
        assert_eq!(result.max_gain_date, Some(d(2026, 1, 6)));
    }

    #[test]
    fn dca_carries_unspent_cash_between_months() {
        // Closes 10000 / 11000 / 9000 on the 1st of three months.
        let bars = vec![
            bar("t", d(2026, 1, 2), 10000.0),
            bar("t", d(2026, 2, 2), 11000.0),
            bar("t", d(2026, 3, 2), 9000.0),
        ];
        let result = run_dca(&bars, 100_000.0, d(2026, 1, 1), d(2026, 3, 31), 1).unwrap();

        assert_eq!(result.months.len(), 3);
        let m = &result.months;
        assert_eq!(m[0].shares_bought, 10);
        assert!((m[0].carry_after - 0.0).abs() < 1e-9);
        assert_eq!(m[1].shares_bought, 9);
        assert!((m[1].carry_after - 1000.0).abs() < 1e-9);
        assert_eq!(m[2].shares_bought, 11);
        assert!((m[2].carry_after - 2000.0).abs() < 1e-9);

        assert_eq!(result.total_shares, 30);
        assert!((result.total_invested - 300_000.0).abs() < 1e-9);
        assert!((result.avg_buy_price.unwrap() - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn dca_buy_date_rolls_to_next_trading_day() {
        // Buy day 15 lands on a holiday; the 17th trades.
        let bars = vec![
            bar("t", d(2026, 1, 14), 10000.0),
            bar("t", d(2026, 1, 17), 10100.0),
        ];
        let result = run_dca(&bars, 50_000.0, d(2026, 1, 1), d(2026, 1, 31), 15).unwrap();
        assert_eq!(result.months[0].buy_date, d(2026, 1, 17));
    }

    #[test]
    fn portfolio_aggregates_weighted_lump_sums() {
        let mut series = HashMap::new();
        series.insert(
            "a".to_string(),
            vec![bar("a", d(2026, 1, 5), 100.0), bar("a", d(2026, 1, 6), 110.0)],
        );
        series.insert(
            "b".to_string(),
            vec![bar("b", d(2026, 1, 5), 200.0), bar("b", d(2026, 1, 7), 180.0)],
        );
        let holdings = vec![
            PortfolioHolding {
                ticker: "a".into(),
                weight: 0.5,
            },
            PortfolioHolding {
                ticker: "b".into(),
                weight: 0.5,
            },
        ];

        let result = run_portfolio(&series, &holdings, 100_000.0, d(2026, 1, 1), d(2026, 1, 31))
            .unwrap();
        assert!((result.invested - 100_000.0).abs() < 1e-9);
        // Union index covers all three dates with forward-filled values.
        assert_eq!(result.valuations.len(), 3);
        // a: 500 shares; b: 250 shares. Day 6: a=55000, b=50000 (ffill).
        let day6 = &result.valuations[1];
        assert!((day6.value - 105_000.0).abs() < 1e-9);
    }

    #[test]
    fn portfolio_missing_series_is_none() {
        let series = HashMap::new();
        let holdings = vec![PortfolioHolding {
            ticker: "a".into(),
            weight: 1.0,
        }];
        assert!(run_portfolio(&series, &holdings, 1000.0, d(2026, 1, 1), d(2026, 1, 31)).is_none());
    }
}
