//! Report generation log repository.

use std::sync::Arc;

use crate::database::Database;
use crate::error::Result;
use crate::schema::GenerationLog;

const COLUMNS: &str =
    "id, report_id, analysis_id, kind, provider, model, enhanced, output_hash, latency_ms, error, created_at";

#[derive(Clone)]
pub struct GenerationLogRepository {
    db: Arc<Database>,
}

impl GenerationLogRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn insert(&self, log: &GenerationLog) -> Result<()> {
        let client = self.db.client().await?;
        client
            .execute(
                &format!(
                    "INSERT INTO report_generation_logs ({COLUMNS}) \
                     VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)"
                ),
                &[
                    &log.id,
                    &log.report_id,
                    &log.analysis_id,
                    &log.kind.as_str(),
                    &log.provider,
                    &log.model,
                    &log.enhanced,
                    &log.output_hash,
                    &log.latency_ms,
                    &log.error,
                    &log.created_at,
                ],
            )
            .await?;
        Ok(())
    }

    /// Newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<GenerationLog>> {
        let client = self.db.client().await?;
        let rows = client
            .query(
                &format!("SELECT {COLUMNS} FROM report_generation_logs ORDER BY created_at DESC LIMIT $1"),
                &[&limit],
            )
            .await?;
        rows.iter().map(GenerationLog::from_row).collect()
    }
}
