//! News persistence, deduplicated on `(ticker, url)`.

use super::{date_from_sql, date_to_sql, str_list_from_sql, Store, StoreResult};
use crate::models::{NewsItem, Sentiment};
use chrono::NaiveDate;
use rusqlite::{params, Row};

impl Store {
    /// Upsert a batch of news items. Re-delivered urls update in place, so
    /// the count returned is rows touched, not rows added.
    pub fn upsert_news(&self, items: &[NewsItem]) -> StoreResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for item in items {
                tx.prepare_cached(
                    "INSERT INTO news (ticker, date, title, url, source, relevance_score, sentiment, tags) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                     ON CONFLICT(ticker, url) DO UPDATE SET \
                        date = excluded.date, title = excluded.title, source = excluded.source, \
                        relevance_score = excluded.relevance_score, \
                        sentiment = excluded.sentiment, tags = excluded.tags",
                )?
                .execute(params![
                    item.ticker,
                    date_to_sql(item.date),
                    item.title,
                    item.url,
                    item.source,
                    item.relevance_score,
                    item.sentiment.map(|s| s.as_str()),
                    serde_json::to_string(&item.tags).unwrap_or_else(|_| "[]".into()),
                ])?;
            }
            tx.commit()?;
            Ok(items.len())
        })
    }

    fn row_to_news(row: &Row) -> rusqlite::Result<NewsItem> {
        Ok(NewsItem {
            ticker: row.get(0)?,
            date: date_from_sql(&row.get::<_, String>(1)?)?,
            title: row.get(2)?,
            url: row.get(3)?,
            source: row.get(4)?,
            relevance_score: row.get(5)?,
            sentiment: row
                .get::<_, Option<String>>(6)?
                .as_deref()
                .and_then(Sentiment::parse),
            tags: str_list_from_sql(&row.get::<_, String>(7)?),
        })
    }

    /// News in `[start, end]`, newest first.
    pub fn news(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
        limit: usize,
    ) -> StoreResult<Vec<NewsItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT ticker, date, title, url, source, relevance_score, sentiment, tags \
                 FROM news WHERE ticker = ?1 AND date >= ?2 AND date <= ?3 \
                 ORDER BY date DESC, id DESC LIMIT ?4",
            )?;
            let result = stmt
                .query_map(
                    params![ticker, date_to_sql(start), date_to_sql(end), limit as i64],
                    Self::row_to_news,
                )?
                .collect();
            result
        })
    }

    pub fn recent_news(&self, ticker: &str, limit: usize) -> StoreResult<Vec<NewsItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT ticker, date, title, url, source, relevance_score, sentiment, tags \
                 FROM news WHERE ticker = ?1 ORDER BY date DESC, id DESC LIMIT ?2",
            )?;
            let result = stmt
                .query_map(params![ticker, limit as i64], Self::row_to_news)?
                .collect();
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::test_store;

    fn item(url: &str, title: &str) -> NewsItem {
        NewsItem {
            ticker: "487240".into(),
            date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            title: title.into(),
            url: url.into(),
            source: "연합뉴스".into(),
            relevance_score: 0.8,
            sentiment: Some(Sentiment::Positive),
            tags: vec!["전력".into()],
        }
    }

    #[test]
    fn duplicate_urls_update_in_place() {
        let store = test_store();
        store.upsert_news(&[item("https://n.example/1", "first")]).unwrap();
        store.upsert_news(&[item("https://n.example/1", "updated")]).unwrap();

        let news = store.recent_news("487240", 10).unwrap();
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].title, "updated");
        assert_eq!(news[0].sentiment, Some(Sentiment::Positive));
        assert_eq!(news[0].tags, vec!["전력".to_string()]);
    }
}
