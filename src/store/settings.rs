//! Stored integration secrets backing `/settings/api-keys`.

use super::{Store, StoreResult};
use rusqlite::params;
use std::collections::BTreeMap;

impl Store {
    pub fn api_keys(&self) -> StoreResult<BTreeMap<String, String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached("SELECT service, value FROM api_keys ORDER BY service")?;
            let result = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect();
            result
        })
    }

    /// Upsert the provided keys; an empty value removes the entry.
    pub fn set_api_keys(&self, keys: &BTreeMap<String, String>) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for (service, value) in keys {
                if value.trim().is_empty() {
                    tx.execute("DELETE FROM api_keys WHERE service = ?1", params![service])?;
                } else {
                    tx.prepare_cached(
                        "INSERT INTO api_keys (service, value) VALUES (?1, ?2) \
                         ON CONFLICT(service) DO UPDATE SET value = excluded.value",
                    )?
                    .execute(params![service, value])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::store::tests::test_store;
    use std::collections::BTreeMap;

    #[test]
    fn set_get_and_clear_keys() {
        let store = test_store();
        let mut keys = BTreeMap::new();
        keys.insert("openai".to_string(), "sk-test".to_string());
        store.set_api_keys(&keys).unwrap();
        assert_eq!(store.api_keys().unwrap().get("openai").unwrap(), "sk-test");

        keys.insert("openai".to_string(), String::new());
        store.set_api_keys(&keys).unwrap();
        assert!(store.api_keys().unwrap().is_empty());
    }
}
