use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::util::ensure_directory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationLogEntry {
    pub id: i64,
    pub prompt_template: String,
    pub input: String,
    pub output_filename: String,
    pub output_sha256: String,
    pub model_name: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewGenerationLogEntry<'a> {
    pub prompt_template: &'a str,
    pub input: &'a str,
    pub output_filename: &'a str,
    pub output_sha256: &'a str,
    pub model_name: &'a str,
    pub created_at: &'a str,
}

/// Append-only record of every generation request.
pub struct GenerationLog {
    connection: Connection,
}

impl GenerationLog {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            ensure_directory(parent)?;
        }
        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    pub fn append(&self, entry: &NewGenerationLogEntry<'_>) -> Result<i64> {
        self.connection
            .execute(
                "
                INSERT INTO generation_log(
                  prompt_template, input, output_filename, output_sha256, model_name, created_at
                )
                VALUES(?1, ?2, ?3, ?4, ?5, ?6)
                ",
                params![
                    entry.prompt_template,
                    entry.input,
                    entry.output_filename,
                    entry.output_sha256,
                    entry.model_name,
                    entry.created_at,
                ],
            )
            .context("failed to append generation log row")?;
        Ok(self.connection.last_insert_rowid())
    }

    /// The newest `limit` rows, oldest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<GenerationLogEntry>> {
        let mut statement = self.connection.prepare(
            "
            SELECT id, prompt_template, input, output_filename, output_sha256, model_name, created_at
            FROM (
              SELECT * FROM generation_log ORDER BY id DESC LIMIT ?1
            )
            ORDER BY id ASC
            ",
        )?;

        let mut rows = statement.query(params![limit as i64])?;
        let mut out = Vec::<GenerationLogEntry>::new();
        while let Some(row) = rows.next()? {
            out.push(GenerationLogEntry {
                id: row.get(0)?,
                prompt_template: row.get(1)?,
                input: row.get(2)?,
                output_filename: row.get(3)?,
                output_sha256: row.get(4)?,
                model_name: row.get(5)?,
                created_at: row.get(6)?,
            });
        }

        Ok(out)
    }

    /// Distinct inputs in the order they were first submitted.
    pub fn inputs(&self) -> Result<Vec<String>> {
        let mut statement = self.connection.prepare(
            "
            SELECT input
            FROM generation_log
            GROUP BY input
            ORDER BY MIN(id) ASC
            ",
        )?;

        let inputs = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(inputs)
    }

    pub fn count(&self) -> Result<i64> {
        let count = self
            .connection
            .query_row("SELECT COUNT(*) FROM generation_log", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS generation_log (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              prompt_template TEXT NOT NULL,
              input TEXT NOT NULL,
              output_filename TEXT NOT NULL,
              output_sha256 TEXT NOT NULL DEFAULT '',
              model_name TEXT NOT NULL DEFAULT '',
              created_at TEXT NOT NULL
            );
            ",
        )
        .context("failed to ensure generation log schema")?;
    Ok(())
}
