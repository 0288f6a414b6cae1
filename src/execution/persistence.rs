use anyhow::Result;
use chrono::Utc;
use ethers::types::H256;
use rusqlite::{params, Connection};
use crate::execution::guard::IdempotencyGuard;
use crate::execution::types::{AttemptRecord, ResolutionRecord};

pub struct ResolutionDatabase {
    conn: Connection,
}

impl ResolutionDatabase {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS resolutions (
                market_id INTEGER PRIMARY KEY,
                outcome TEXT NOT NULL,
                confidence REAL NOT NULL,
                evidence_hash TEXT NOT NULL,
                tx_hash TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                resolved_at TIMESTAMP NOT NULL
            );

            CREATE TABLE IF NOT EXISTS attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_id INTEGER NOT NULL,
                trigger_source TEXT NOT NULL,
                outcome TEXT,
                confidence REAL,
                admitted INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                attempted_at TIMESTAMP NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_attempts_market_id ON attempts(market_id);
            CREATE INDEX IF NOT EXISTS idx_attempts_attempted_at ON attempts(attempted_at);
            "#
        )?;

        Ok(Self { conn })
    }

    /// Insert a confirmed resolution. Re-recording the same market is a no-op.
    pub fn record_resolution(&self, record: &ResolutionRecord) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO resolutions
                (market_id, outcome, confidence, evidence_hash, tx_hash, block_number, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.market_id as i64,
                record.outcome.label(),
                record.confidence,
                format!("{:?}", H256::from(record.evidence_hash)),
                format!("{:?}", record.tx_hash),
                record.block_number as i64,
                record.resolved_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn record_attempt(&self, attempt: &AttemptRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO attempts (market_id, trigger_source, outcome, confidence, admitted, error, attempted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                attempt.market_id as i64,
                attempt.trigger.to_string(),
                attempt.outcome.map(|o| o.label()),
                attempt.confidence,
                attempt.admitted,
                attempt.error,
                attempt.attempted_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn resolved_market_ids(&self) -> Result<Vec<u64>> {
        let mut stmt = self.conn.prepare("SELECT market_id FROM resolutions ORDER BY market_id")?;
        let ids = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        ids.map(|id| id.map(|id| id as u64).map_err(|e| e.into()))
            .collect()
    }

    pub fn count_resolutions(&self) -> Result<usize> {
        let count: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM resolutions",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    #[cfg(test)]
    pub fn count_attempts_for_market(&self, market_id: u64) -> Result<usize> {
        let count: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM attempts WHERE market_id = ?1",
            params![market_id as i64],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_attempts_today(&self) -> Result<usize> {
        let today = Utc::now().format("%Y-%m-%d").to_string();

        let count: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM attempts WHERE DATE(attempted_at) = ?1",
            params![today],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Reload markets this resolver already committed so a restart never resubmits them.
pub fn restore_processed(db: &ResolutionDatabase, guard: &IdempotencyGuard) -> Result<usize> {
    use tracing::info;

    info!("Restoring processed markets...");

    let ids = db.resolved_market_ids()?;
    for id in &ids {
        guard.mark_processed(*id);
    }

    info!("Restored {} processed markets", ids.len());
    info!("Attempts logged today: {}", db.count_attempts_today()?);
    Ok(ids.len())
}
