//! SQLite archive for finished campaigns.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::debug;

use adbrain_core::error::{AdbrainError, Result};
use adbrain_core::traits::CampaignArchive;
use adbrain_core::types::ArchivedCampaign;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS campaigns (
        id TEXT PRIMARY KEY,
        graph_id TEXT NOT NULL,
        topic TEXT NOT NULL,
        brand TEXT NOT NULL,
        budget REAL NOT NULL,
        market_region TEXT NOT NULL,
        synthesized INTEGER NOT NULL DEFAULT 0,
        snapshot TEXT NOT NULL,
        archived_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_campaigns_archived ON campaigns(archived_at);";

/// One row of `list`, without the snapshot.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CampaignSummary {
    pub id: String,
    pub topic: String,
    pub brand: String,
    pub budget: f64,
    pub market_region: String,
    pub synthesized: bool,
    pub archived_at: DateTime<Utc>,
}

/// SQLite-backed campaign archive. The campaign id is the execution id.
pub struct SqliteArchive {
    conn: Mutex<Connection>,
}

fn db_err(e: impl std::fmt::Display) -> AdbrainError {
    AdbrainError::Database(e.to_string())
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

impl SqliteArchive {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AdbrainError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "Campaign archive opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Store a campaign, replacing any earlier one with the same execution id.
    pub fn save(&self, campaign: &ArchivedCampaign) -> Result<String> {
        let snapshot = serde_json::to_string(&campaign.snapshot)?;
        let conn = self.conn.lock().map_err(db_err)?;
        conn.execute(
            "INSERT OR REPLACE INTO campaigns
                (id, graph_id, topic, brand, budget, market_region, synthesized, snapshot, archived_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                campaign.execution_id,
                campaign.graph_id,
                campaign.topic,
                campaign.brand,
                campaign.budget,
                campaign.market_region,
                campaign.synthesized,
                snapshot,
                campaign.archived_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        debug!(id = %campaign.execution_id, brand = %campaign.brand, "Campaign saved");
        Ok(campaign.execution_id.clone())
    }

    pub fn get(&self, id: &str) -> Result<Option<ArchivedCampaign>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let row = conn
            .query_row(
                "SELECT id, graph_id, topic, brand, budget, market_region, synthesized, snapshot, archived_at
                 FROM campaigns WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, bool>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        let Some((execution_id, graph_id, topic, brand, budget, market_region, synthesized, snapshot, archived_at)) =
            row
        else {
            return Ok(None);
        };

        Ok(Some(ArchivedCampaign {
            execution_id,
            graph_id,
            topic,
            brand,
            budget,
            market_region,
            synthesized,
            snapshot: serde_json::from_str(&snapshot)?,
            archived_at: parse_time(&archived_at),
        }))
    }

    /// Most recently archived first.
    pub fn list(&self, limit: usize) -> Result<Vec<CampaignSummary>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, topic, brand, budget, market_region, synthesized, archived_at
                 FROM campaigns ORDER BY archived_at DESC, rowid DESC LIMIT ?1",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(CampaignSummary {
                    id: row.get(0)?,
                    topic: row.get(1)?,
                    brand: row.get(2)?,
                    budget: row.get(3)?,
                    market_region: row.get(4)?,
                    synthesized: row.get(5)?,
                    archived_at: parse_time(&row.get::<_, String>(6)?),
                })
            })
            .map_err(db_err)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }

    /// Returns whether a campaign was deleted.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(db_err)?;
        let n = conn
            .execute("DELETE FROM campaigns WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(n > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(db_err)?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM campaigns", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(n as usize)
    }
}

impl CampaignArchive for SqliteArchive {
    fn archive(&self, campaign: ArchivedCampaign) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { self.save(&campaign) })
    }
}
