//! AI summary repository.

use std::sync::Arc;

use tokio_postgres::types::Json;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::schema::AiAnalysisRecord;

const COLUMNS: &str = "id, analysis_id, kind, related_analyses, files_analyzed, provider, model, \
    clinical_summary, risk_assessment, confidence_level, enhanced, raw_response, created_at";

#[derive(Clone)]
pub struct AiAnalysisRepository {
    db: Arc<Database>,
}

impl AiAnalysisRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn insert(&self, rec: &AiAnalysisRecord) -> Result<Uuid> {
        let client = self.db.client().await?;
        client
            .execute(
                &format!(
                    "INSERT INTO ai_analyses ({COLUMNS}) \
                     VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)"
                ),
                &[
                    &rec.id,
                    &rec.analysis_id,
                    &rec.kind.as_str(),
                    &Json(&rec.related_analyses),
                    &rec.files_analyzed,
                    &rec.provider,
                    &rec.model,
                    &rec.clinical_summary,
                    &rec.risk_assessment,
                    &rec.confidence_level,
                    &rec.enhanced,
                    &rec.raw_response,
                    &rec.created_at,
                ],
            )
            .await?;
        tracing::debug!(id = %rec.id, kind = rec.kind.as_str(), "AI analysis stored");
        Ok(rec.id)
    }

    /// Most recent summary attached to one analysis.
    pub async fn latest_for_analysis(&self, analysis_id: Uuid) -> Result<Option<AiAnalysisRecord>> {
        let client = self.db.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {COLUMNS} FROM ai_analyses WHERE analysis_id = $1 \
                     ORDER BY created_at DESC LIMIT 1"
                ),
                &[&analysis_id],
            )
            .await?;
        row.as_ref().map(AiAnalysisRecord::from_row).transpose()
    }
}
