//! Rule-based insights: per-horizon strategy plus key points and risk
//! flags derived from metrics, recent flows and news.

use super::metrics::{compute_metrics, max_drawdown};
use crate::models::{DailyBar, NewsItem, TradingFlow};
use serde::Serialize;

const SHORT_WINDOW: usize = 7;
const MEDIUM_WINDOW: usize = 30;
const LONG_WINDOW: usize = 90;

const HIGH_VOLATILITY_PCT: f64 = 30.0;
const LOW_VOLATILITY_PCT: f64 = 10.0;
const RISK_VOLATILITY_PCT: f64 = 40.0;
const RISK_DRAWDOWN_PCT: f64 = -10.0;

const RISK_WORDS: &[&str] = &["소송", "규제", "악재", "적자", "리콜", "조사", "제재"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Strategy {
    #[serde(rename = "비중확대")]
    Accumulate,
    #[serde(rename = "보유")]
    Hold,
    #[serde(rename = "관망")]
    Wait,
    #[serde(rename = "비중축소")]
    Reduce,
}

/// Threshold mapping from a window return to a stance.
pub fn strategy_for(period_return: f64) -> Strategy {
    if period_return > 10.0 {
        Strategy::Accumulate
    } else if period_return >= 5.0 {
        Strategy::Hold
    } else if period_return >= -5.0 {
        Strategy::Wait
    } else {
        Strategy::Reduce
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HorizonStrategy {
    pub horizon: &'static str,
    pub window_days: usize,
    pub period_return: Option<f64>,
    pub strategy: Option<Strategy>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Insights {
    pub ticker: String,
    pub strategies: Vec<HorizonStrategy>,
    pub key_points: Vec<String>,
    pub risk_flags: Vec<String>,
}

fn window_return(bars: &[DailyBar], window: usize) -> Option<f64> {
    if bars.len() < 2 {
        return None;
    }
    let slice = &bars[bars.len().saturating_sub(window)..];
    let first = slice.first()?;
    let last = slice.last()?;
    if slice.len() < 2 || first.close == 0.0 {
        return None;
    }
    Some((last.close / first.close - 1.0) * 100.0)
}

/// Assemble insights from ascending bars, recent flows and recent news.
pub fn build_insights(
    ticker: &str,
    bars: &[DailyBar],
    flows: &[TradingFlow],
    news: &[NewsItem],
) -> Insights {
    let strategies = [
        ("short", SHORT_WINDOW),
        ("medium", MEDIUM_WINDOW),
        ("long", LONG_WINDOW),
    ]
    .into_iter()
    .map(|(horizon, window)| {
        let ret = window_return(bars, window);
        HorizonStrategy {
            horizon,
            window_days: window,
            period_return: ret,
            strategy: ret.map(strategy_for),
        }
    })
    .collect();

    let mut key_points = Vec::new();
    let mut risk_flags = Vec::new();

    if let Some(best) = bars
        .iter()
        .filter_map(|b| b.daily_change_pct.map(|c| (b.date, c)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
    {
        key_points.push(format!("{} 최대 일간 상승 {:+.2}%", best.0, best.1));
    }

    if let Some(metrics) = compute_metrics(bars, 0.0) {
        if metrics.annualized_volatility >= HIGH_VOLATILITY_PCT {
            key_points.push(format!(
                "변동성 높음 (연환산 {:.1}%)",
                metrics.annualized_volatility
            ));
        } else if metrics.annualized_volatility <= LOW_VOLATILITY_PCT {
            key_points.push(format!(
                "변동성 낮음 (연환산 {:.1}%)",
                metrics.annualized_volatility
            ));
        }
        if metrics.annualized_volatility >= RISK_VOLATILITY_PCT {
            risk_flags.push(format!(
                "고변동성 구간: 연환산 변동성 {:.1}%",
                metrics.annualized_volatility
            ));
        }
    }

    let foreign_sum: i64 = flows.iter().map(|f| f.foreign_net).sum();
    let institutional_sum: i64 = flows.iter().map(|f| f.institutional_net).sum();
    if !flows.is_empty() {
        let dominant = if foreign_sum.abs() >= institutional_sum.abs() {
            ("외국인", foreign_sum)
        } else {
            ("기관", institutional_sum)
        };
        if dominant.1 != 0 {
            let direction = if dominant.1 > 0 { "순매수" } else { "순매도" };
            key_points.push(format!("{} {} 우위", dominant.0, direction));
        }
    }

    if !news.is_empty() && key_points.len() < 3 {
        key_points.push(format!("최근 뉴스 {}건", news.len()));
    }

    let mdd = max_drawdown(bars);
    if mdd <= RISK_DRAWDOWN_PCT {
        risk_flags.push(format!("기간 내 최대 낙폭 {:.1}%", mdd));
    }

    for item in news {
        if let Some(word) = RISK_WORDS.iter().find(|w| item.title.contains(*w)) {
            risk_flags.push(format!("뉴스 리스크 키워드 '{}': {}", word, item.title));
            break;
        }
    }

    key_points.truncate(3);
    risk_flags.truncate(3);

    Insights {
        ticker: ticker.to_string(),
        strategies,
        key_points,
        risk_flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(closes: &[f64]) -> Vec<DailyBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| DailyBar {
                ticker: "487240".into(),
                date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 100,
                daily_change_pct: if i == 0 { None } else { Some(0.0) },
            })
            .collect()
    }

    #[test]
    fn strategy_thresholds() {
        assert_eq!(strategy_for(12.0), Strategy::Accumulate);
        assert_eq!(strategy_for(7.0), Strategy::Hold);
        assert_eq!(strategy_for(5.0), Strategy::Hold);
        assert_eq!(strategy_for(0.0), Strategy::Wait);
        assert_eq!(strategy_for(-5.0), Strategy::Wait);
        assert_eq!(strategy_for(-8.0), Strategy::Reduce);
    }

    #[test]
    fn strategy_serializes_to_korean_labels() {
        assert_eq!(
            serde_json::to_string(&Strategy::Accumulate).unwrap(),
            "\"비중확대\""
        );
    }

    #[test]
    fn caps_points_and_flags_at_three() {
        let closes: Vec<f64> = (0..100)
            .map(|i| 10000.0 * (1.0 + 0.05 * ((i % 7) as f64 - 3.0)))
            .collect();
        let bars = series(&closes);
        let news: Vec<NewsItem> = (0..5)
            .map(|i| NewsItem {
                ticker: "487240".into(),
                date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
                title: format!("규제 이슈 {i}"),
                url: format!("https://n.example/{i}"),
                source: "s".into(),
                relevance_score: 0.9,
                sentiment: None,
                tags: vec![],
            })
            .collect();
        let insights = build_insights("487240", &bars, &[], &news);
        assert!(insights.key_points.len() <= 3);
        assert!(insights.risk_flags.len() <= 3);
        assert!(!insights.risk_flags.is_empty());
    }

    #[test]
    fn short_horizon_uses_trailing_window() {
        // Flat for a long stretch, then a 20% pop in the last week.
        let mut closes = vec![100.0; 60];
        closes.extend([100.0, 104.0, 108.0, 112.0, 116.0, 120.0]);
        let bars = series(&closes);
        let insights = build_insights("487240", &bars, &[], &[]);
        let short = &insights.strategies[0];
        assert_eq!(short.horizon, "short");
        assert_eq!(short.strategy, Some(Strategy::Accumulate));
    }
}
