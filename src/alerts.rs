//! Alert rule validation, evaluation semantics and trigger recording.
//!
//! Rules are evaluated against the latest close and investor flows;
//! triggers are recorded by the caller (at-least-once delivery), with
//! re-deliveries inside a 60 second window flagged as duplicates but still
//! appended.

use crate::models::{AlertDirection, AlertRule, AlertType, DailyBar, TradingFlow};
use crate::store::{Store, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Re-delivery window for duplicate flagging, seconds.
pub const DUPLICATE_WINDOW_SECS: i64 = 60;

/// Validate the type/direction/target combination of a rule.
pub fn validate_rule(
    alert_type: AlertType,
    direction: AlertDirection,
    target_price: f64,
) -> Result<(), String> {
    match alert_type {
        AlertType::Buy | AlertType::Sell => {
            if target_price <= 0.0 {
                return Err("target_price must be positive for buy/sell alerts".into());
            }
        }
        AlertType::PriceChange => {
            if target_price <= 0.0 || target_price > 100.0 {
                return Err("target_price must be in (0, 100] percent for price_change".into());
            }
        }
        AlertType::TradingSignal => {
            if target_price != 0.0 {
                return Err("target_price must be 0 for trading_signal alerts".into());
            }
        }
    }
    Ok(())
}

/// Evaluate one rule against the latest market data. Returns the trigger
/// message when the rule fires.
pub fn evaluate_rule(
    rule: &AlertRule,
    latest_bar: Option<&DailyBar>,
    latest_flow: Option<&TradingFlow>,
) -> Option<String> {
    if !rule.is_active {
        return None;
    }
    match rule.alert_type {
        AlertType::Buy => {
            let bar = latest_bar?;
            (rule.direction != AlertDirection::Above && bar.close <= rule.target_price).then(|| {
                format!(
                    "{} 매수 알림: 현재가 {:.0} ≤ 목표가 {:.0}",
                    rule.ticker, bar.close, rule.target_price
                )
            })
        }
        AlertType::Sell => {
            let bar = latest_bar?;
            (rule.direction != AlertDirection::Below && bar.close >= rule.target_price).then(|| {
                format!(
                    "{} 매도 알림: 현재가 {:.0} ≥ 목표가 {:.0}",
                    rule.ticker, bar.close, rule.target_price
                )
            })
        }
        AlertType::PriceChange => {
            let bar = latest_bar?;
            let change = bar.daily_change_pct?;
            let fired = match rule.direction {
                AlertDirection::Above => change >= rule.target_price,
                AlertDirection::Below => change <= -rule.target_price,
                AlertDirection::Both => change.abs() >= rule.target_price,
            };
            fired.then(|| {
                format!(
                    "{} 등락 알림: 일간 변동 {:+.2}% (기준 ±{:.1}%)",
                    rule.ticker, change, rule.target_price
                )
            })
        }
        AlertType::TradingSignal => {
            let flow = latest_flow?;
            let both_buying = flow.foreign_net > 0 && flow.institutional_net > 0;
            let both_selling = flow.foreign_net < 0 && flow.institutional_net < 0;
            let fired = match rule.direction {
                AlertDirection::Above => both_buying,
                AlertDirection::Below => both_selling,
                AlertDirection::Both => both_buying || both_selling,
            };
            fired.then(|| {
                format!(
                    "{} 수급 신호: 외국인 {:+}, 기관 {:+}",
                    rule.ticker, flow.foreign_net, flow.institutional_net
                )
            })
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerOutcome {
    pub history_id: i64,
    pub duplicate: bool,
}

/// Append a trigger to the history, flagging 60-second re-deliveries of the
/// same `(rule_id, message)` without dropping them.
pub fn record_trigger(
    store: &Store,
    rule_id: i64,
    ticker: &str,
    alert_type: AlertType,
    message: &str,
    now: DateTime<Utc>,
) -> Result<TriggerOutcome, StoreError> {
    let duplicate = store.has_recent_trigger(rule_id, message, DUPLICATE_WINDOW_SECS, now)?;
    let history_id = store.append_alert_history(rule_id, ticker, alert_type, message, now)?;
    store.mark_rule_triggered(rule_id, now)?;
    Ok(TriggerOutcome {
        history_id,
        duplicate,
    })
}
