use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::AdStore;
use crate::record::{AdRecord, PageMetadata};

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS ads (
            page_id         TEXT NOT NULL,
            id              TEXT NOT NULL,
            is_active       BOOLEAN NOT NULL,
            start_date      TEXT,
            end_date        TEXT,
            snapshot_url    TEXT,
            creative_bodies TEXT NOT NULL,
            fetched_at      TEXT NOT NULL,
            raw_data        TEXT NOT NULL,
            PRIMARY KEY (page_id, id)
        );

        CREATE TABLE IF NOT EXISTS page_metadata (
            page_id     TEXT PRIMARY KEY,
            last_synced TEXT NOT NULL,
            total_ads   INTEGER NOT NULL
        );
        ",
    )?;
    Ok(())
}

struct AdRow {
    page_id: String,
    id: String,
    is_active: bool,
    start_date: Option<String>,
    end_date: Option<String>,
    snapshot_url: Option<String>,
    creative_bodies: String,
    fetched_at: String,
    raw_data: String,
}

impl AdRow {
    fn into_record(self) -> Result<AdRecord> {
        Ok(AdRecord {
            creative_bodies: serde_json::from_str(&self.creative_bodies)?,
            fetched_at: parse_ts(&self.fetched_at)?,
            raw_data: serde_json::from_str(&self.raw_data)?,
            id: self.id,
            page_id: self.page_id,
            is_active: self.is_active,
            start_date: self.start_date,
            end_date: self.end_date,
            snapshot_url: self.snapshot_url,
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Bad timestamp {s:?}"))?
        .with_timezone(&Utc))
}

impl AdStore for SqliteStore {
    fn save(&mut self, r: &AdRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO ads
                 (page_id, id, is_active, start_date, end_date, snapshot_url,
                  creative_bodies, fetched_at, raw_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    r.page_id,
                    r.id,
                    r.is_active,
                    r.start_date,
                    r.end_date,
                    r.snapshot_url,
                    serde_json::to_string(&r.creative_bodies)?,
                    r.fetched_at.to_rfc3339(),
                    serde_json::to_string(&r.raw_data)?,
                ],
            )
            .with_context(|| format!("Failed to save ad {}/{}", r.page_id, r.id))?;
        Ok(())
    }

    fn load(&self, page_id: &str, id: &str) -> Result<Option<AdRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT page_id, id, is_active, start_date, end_date, snapshot_url,
                        creative_bodies, fetched_at, raw_data
                 FROM ads WHERE page_id = ?1 AND id = ?2",
                rusqlite::params![page_id, id],
                |row| {
                    Ok(AdRow {
                        page_id: row.get(0)?,
                        id: row.get(1)?,
                        is_active: row.get(2)?,
                        start_date: row.get(3)?,
                        end_date: row.get(4)?,
                        snapshot_url: row.get(5)?,
                        creative_bodies: row.get(6)?,
                        fetched_at: row.get(7)?,
                        raw_data: row.get(8)?,
                    })
                },
            )
            .optional()?;
        row.map(AdRow::into_record).transpose()
    }

    fn save_metadata(&mut self, m: &PageMetadata) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO page_metadata (page_id, last_synced, total_ads)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![m.page_id, m.last_synced.to_rfc3339(), m.total_ads as i64],
            )
            .with_context(|| format!("Failed to save metadata for page {}", m.page_id))?;
        Ok(())
    }

    fn load_metadata(&self, page_id: &str) -> Result<Option<PageMetadata>> {
        let row: Option<(String, String, i64)> = self
            .conn
            .query_row(
                "SELECT page_id, last_synced, total_ads FROM page_metadata WHERE page_id = ?1",
                rusqlite::params![page_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(|(page_id, ts, total)| {
            Ok(PageMetadata {
                page_id,
                last_synced: parse_ts(&ts)?,
                total_ads: total as usize,
            })
        })
        .transpose()
    }

    fn list_pages(&self) -> Result<Vec<PageMetadata>> {
        let mut stmt = self
            .conn
            .prepare("SELECT page_id, last_synced, total_ads FROM page_metadata ORDER BY page_id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(page_id, ts, total)| {
                Ok(PageMetadata {
                    page_id,
                    last_synced: parse_ts(&ts)?,
                    total_ads: total as usize,
                })
            })
            .collect()
    }
}
