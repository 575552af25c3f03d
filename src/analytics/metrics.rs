//! Return, volatility, drawdown and Sharpe computations.

use crate::models::DailyBar;
use chrono::NaiveDate;
use serde::Serialize;

/// Short windows produce wild annualizations; below this trading-day count
/// the annualized figures are reported as null.
pub const MIN_ANNUALIZATION_DAYS: usize = 90;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Serialize)]
pub struct PriceMetrics {
    pub ticker: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub trading_days: usize,
    pub start_close: f64,
    pub end_close: f64,
    /// `(close_end / close_start - 1) * 100`.
    pub period_return: f64,
    /// Null below [`MIN_ANNUALIZATION_DAYS`].
    pub annualized_return: Option<f64>,
    /// Std-dev of simple daily returns, percent.
    pub daily_volatility: f64,
    /// Daily volatility scaled by sqrt(252), percent.
    pub annualized_volatility: f64,
    /// Most negative peak-to-trough move, percent (≤ 0).
    pub max_drawdown: f64,
    /// `(annualized_return - rf) / annualized_volatility`; null whenever the
    /// annualized return is null or volatility is zero.
    pub sharpe_ratio: Option<f64>,
}

/// Simple daily returns between consecutive closes, in percent.
pub fn daily_returns(bars: &[DailyBar]) -> Vec<f64> {
    bars.windows(2)
        .filter(|w| w[0].close != 0.0)
        .map(|w| (w[1].close - w[0].close) / w[0].close * 100.0)
        .collect()
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values
        .iter()
        .map(|v| (v - mean).powi(2))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    var.sqrt()
}

/// Maximum drawdown over the close series, percent (≤ 0).
pub fn max_drawdown(bars: &[DailyBar]) -> f64 {
    let mut peak = f64::MIN;
    let mut mdd = 0.0f64;
    for bar in bars {
        peak = peak.max(bar.close);
        if peak > 0.0 {
            mdd = mdd.min((bar.close - peak) / peak * 100.0);
        }
    }
    mdd
}

pub fn annualized_return(period_return: f64, trading_days: usize) -> Option<f64> {
    if trading_days < MIN_ANNUALIZATION_DAYS {
        return None;
    }
    let growth = 1.0 + period_return / 100.0;
    if growth <= 0.0 {
        return Some(-100.0);
    }
    Some((growth.powf(365.0 / trading_days as f64) - 1.0) * 100.0)
}

/// Compute the full metric set for a chronologically ascending bar series.
/// Returns `None` for fewer than two bars.
pub fn compute_metrics(bars: &[DailyBar], risk_free_rate: f64) -> Option<PriceMetrics> {
    let first = bars.first()?;
    let last = bars.last()?;
    if bars.len() < 2 || first.close == 0.0 {
        return None;
    }

    let period_return = (last.close / first.close - 1.0) * 100.0;
    let trading_days = bars.len();
    let ann_return = annualized_return(period_return, trading_days);

    let returns = daily_returns(bars);
    let daily_vol = std_dev(&returns);
    let ann_vol = daily_vol * TRADING_DAYS_PER_YEAR.sqrt();

    let sharpe = match (ann_return, ann_vol) {
        (Some(r), v) if v > 0.0 => Some((r - risk_free_rate) / v),
        _ => None,
    };

    Some(PriceMetrics {
        ticker: first.ticker.clone(),
        start_date: first.date,
        end_date: last.date,
        trading_days,
        start_close: first.close,
        end_close: last.close,
        period_return,
        annualized_return: ann_return,
        daily_volatility: daily_vol,
        annualized_volatility: ann_vol,
        max_drawdown: max_drawdown(bars),
        sharpe_ratio: sharpe,
    })
}
