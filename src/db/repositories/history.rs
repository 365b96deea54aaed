use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{connection::Database, helpers::parse_datetime, models::HistoryEntry};

fn row_to_entry(row: &Row) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
        id: row.get("id")?,
        analysis: row.get("analysis")?,
        answer: row.get("answer")?,
        analysis_time_seconds: row.get("analysis_time")?,
        question_type: row.get("question_type")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?, "created_at")?,
    })
}

impl Database {
    /// Append an entry, then drop the oldest rows beyond `cap`.
    pub async fn insert_history(&self, entry: &HistoryEntry, cap: u32) -> Result<()> {
        let record = entry.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO history (id, analysis, answer, analysis_time, question_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.analysis,
                    record.answer,
                    record.analysis_time_seconds,
                    record.question_type,
                    record.created_at.to_rfc3339(),
                ],
            )
            .context("failed to insert history entry")?;
            tx.execute(
                "DELETE FROM history WHERE id NOT IN (
                     SELECT id FROM history ORDER BY created_at DESC, rowid DESC LIMIT ?1
                 )",
                params![cap],
            )
            .context("failed to trim history")?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Newest first.
    pub async fn list_history(&self, limit: u32) -> Result<Vec<HistoryEntry>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, analysis, answer, analysis_time, question_type, created_at
                 FROM history
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?1",
            )?;
            let mut rows = stmt.query(params![limit])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    pub async fn clear_history(&self) -> Result<usize> {
        self.execute(|conn| Ok(conn.execute("DELETE FROM history", [])?))
            .await
    }
}
