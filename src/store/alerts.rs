//! Alert rule and trigger-history persistence.

use super::{opt_ts_from_sql, ts_from_sql, ts_to_sql, Store, StoreResult};
use crate::models::{AlertDirection, AlertHistoryEntry, AlertRule, AlertType};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

impl Store {
    fn row_to_rule(row: &Row) -> rusqlite::Result<AlertRule> {
        let alert_type: String = row.get(2)?;
        let direction: String = row.get(3)?;
        Ok(AlertRule {
            id: row.get(0)?,
            ticker: row.get(1)?,
            alert_type: AlertType::parse(&alert_type).unwrap_or(AlertType::Buy),
            direction: AlertDirection::parse(&direction).unwrap_or(AlertDirection::Both),
            target_price: row.get(4)?,
            memo: row.get(5)?,
            is_active: row.get::<_, i64>(6)? != 0,
            created_at: ts_from_sql(&row.get::<_, String>(7)?)?,
            last_triggered_at: opt_ts_from_sql(row.get(8)?)?,
        })
    }

    const RULE_COLS: &'static str =
        "id, ticker, alert_type, direction, target_price, memo, is_active, created_at, \
         last_triggered_at";

    pub fn create_alert_rule(
        &self,
        ticker: &str,
        alert_type: AlertType,
        direction: AlertDirection,
        target_price: f64,
        memo: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<AlertRule> {
        let id = self.with_conn(|conn| {
            conn.prepare_cached(
                "INSERT INTO alert_rules (ticker, alert_type, direction, target_price, memo, \
                    is_active, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
            )?
            .execute(params![
                ticker,
                alert_type.as_str(),
                direction.as_str(),
                target_price,
                memo,
                ts_to_sql(now),
            ])?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(AlertRule {
            id,
            ticker: ticker.to_string(),
            alert_type,
            direction,
            target_price,
            memo: memo.to_string(),
            is_active: true,
            created_at: now,
            last_triggered_at: None,
        })
    }

    pub fn get_alert_rule(&self, id: i64) -> StoreResult<Option<AlertRule>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM alert_rules WHERE id = ?1",
                Self::RULE_COLS
            ))?;
            let mut rows = stmt.query_map(params![id], Self::row_to_rule)?;
            rows.next().transpose()
        })
    }

    /// Full-row update; returns false when the rule is unknown.
    pub fn update_alert_rule(&self, rule: &AlertRule) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.prepare_cached(
                "UPDATE alert_rules SET ticker = ?2, alert_type = ?3, direction = ?4, \
                    target_price = ?5, memo = ?6, is_active = ?7 \
                 WHERE id = ?1",
            )?
            .execute(params![
                rule.id,
                rule.ticker,
                rule.alert_type.as_str(),
                rule.direction.as_str(),
                rule.target_price,
                rule.memo,
                rule.is_active as i64,
            ])?;
            Ok(changed > 0)
        })
    }

    /// Deleting a rule also deletes its trigger history.
    pub fn delete_alert_rule(&self, id: i64) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute("DELETE FROM alert_rules WHERE id = ?1", params![id])?;
            if removed > 0 {
                tx.execute("DELETE FROM alert_history WHERE rule_id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok(removed > 0)
        })
    }

    pub fn alert_rules(&self, ticker: &str, active_only: bool) -> StoreResult<Vec<AlertRule>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM alert_rules WHERE ticker = ?1 AND (?2 = 0 OR is_active = 1) \
                 ORDER BY created_at DESC, id DESC",
                Self::RULE_COLS
            ))?;
            let result = stmt
                .query_map(params![ticker, active_only as i64], Self::row_to_rule)?
                .collect();
            result
        })
    }

    pub fn mark_rule_triggered(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.prepare_cached("UPDATE alert_rules SET last_triggered_at = ?2 WHERE id = ?1")?
                .execute(params![id, ts_to_sql(at)])?;
            Ok(())
        })
    }

    pub fn append_alert_history(
        &self,
        rule_id: i64,
        ticker: &str,
        alert_type: AlertType,
        message: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<i64> {
        self.with_conn(|conn| {
            conn.prepare_cached(
                "INSERT INTO alert_history (rule_id, ticker, alert_type, message, triggered_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?
            .execute(params![rule_id, ticker, alert_type.as_str(), message, ts_to_sql(at)])?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn alert_history(&self, ticker: &str, limit: usize) -> StoreResult<Vec<AlertHistoryEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, rule_id, ticker, alert_type, message, triggered_at \
                 FROM alert_history WHERE ticker = ?1 \
                 ORDER BY triggered_at DESC, id DESC LIMIT ?2",
            )?;
            let result = stmt
                .query_map(params![ticker, limit as i64], |row| {
                    let alert_type: String = row.get(3)?;
                    Ok(AlertHistoryEntry {
                        id: row.get(0)?,
                        rule_id: row.get(1)?,
                        ticker: row.get(2)?,
                        alert_type: AlertType::parse(&alert_type).unwrap_or(AlertType::Buy),
                        message: row.get(4)?,
                        triggered_at: ts_from_sql(&row.get::<_, String>(5)?)?,
                    })
                })?
                .collect();
            result
        })
    }

    /// True when the same `(rule_id, message)` was recorded within the last
    /// `window_secs` before `now`. Used to flag at-least-once re-deliveries.
    pub fn has_recent_trigger(
        &self,
        rule_id: i64,
        message: &str,
        window_secs: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let cutoff = now - chrono::Duration::seconds(window_secs);
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM alert_history \
                 WHERE rule_id = ?1 AND message = ?2 AND triggered_at >= ?3",
                params![rule_id, message, ts_to_sql(cutoff)],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::test_store;

    #[test]
    fn rule_crud_round_trip() {
        let store = test_store();
        let now = Utc::now();
        let rule = store
            .create_alert_rule("487240", AlertType::Buy, AlertDirection::Below, 9500.0, "진입가", now)
            .unwrap();
        assert!(rule.id > 0);

        let mut updated = rule.clone();
        updated.target_price = 9000.0;
        updated.is_active = false;
        assert!(store.update_alert_rule(&updated).unwrap());

        let fetched = store.get_alert_rule(rule.id).unwrap().unwrap();
        assert_eq!(fetched.target_price, 9000.0);
        assert!(!fetched.is_active);

        assert_eq!(store.alert_rules("487240", true).unwrap().len(), 0);
        assert_eq!(store.alert_rules("487240", false).unwrap().len(), 1);
    }

    #[test]
    fn rule_delete_cascades_history() {
        let store = test_store();
        let now = Utc::now();
        let rule = store
            .create_alert_rule("487240", AlertType::Sell, AlertDirection::Above, 12000.0, "", now)
            .unwrap();
        store
            .append_alert_history(rule.id, "487240", AlertType::Sell, "목표가 도달", now)
            .unwrap();
        assert!(store.delete_alert_rule(rule.id).unwrap());
        assert!(store.alert_history("487240", 10).unwrap().is_empty());
    }

    #[test]
    fn duplicate_window_detection() {
        let store = test_store();
        let now = Utc::now();
        store.append_alert_history(7, "487240", AlertType::Buy, "same", now).unwrap();
        assert!(store.has_recent_trigger(7, "same", 60, now).unwrap());
        assert!(!store.has_recent_trigger(7, "other", 60, now).unwrap());
        let later = now + chrono::Duration::seconds(120);
        assert!(!store.has_recent_trigger(7, "same", 60, later).unwrap());
    }
}
