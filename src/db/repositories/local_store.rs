use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;

use crate::db::connection::Database;

/// One atomic batch of slot updates.
#[derive(Debug, Default, Clone)]
pub struct LocalWrite {
    pub set: Vec<(String, String)>,
    pub remove: Vec<String>,
}

impl LocalWrite {
    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set.push((key.to_string(), value.into()));
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.remove.push(key.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }

    /// Keys this batch touches, in write order.
    pub fn keys(&self) -> Vec<String> {
        self.set
            .iter()
            .map(|(key, _)| key.clone())
            .chain(self.remove.iter().cloned())
            .collect()
    }
}

impl Database {
    /// Read the given slots. Missing keys are absent from the map.
    pub async fn get_local(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.execute(move |conn| {
            let mut stmt = conn.prepare("SELECT value FROM local_store WHERE key = ?1")?;
            let mut values = HashMap::new();
            for key in keys {
                let mut rows = stmt.query(params![key])?;
                if let Some(row) = rows.next()? {
                    values.insert(key, row.get::<_, String>(0)?);
                }
            }
            Ok(values)
        })
        .await
    }

    /// Apply every set and remove in a single transaction.
    pub async fn write_local(&self, batch: LocalWrite) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open local store transaction")?;
            let now = Utc::now().to_rfc3339();

            for (key, value) in &batch.set {
                tx.execute(
                    "INSERT INTO local_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, value, now],
                )
                .with_context(|| format!("failed to write {key}"))?;
            }
            for key in &batch.remove {
                tx.execute("DELETE FROM local_store WHERE key = ?1", params![key])
                    .with_context(|| format!("failed to remove {key}"))?;
            }

            tx.commit().context("failed to commit local store batch")?;
            Ok(())
        })
        .await
    }
}
