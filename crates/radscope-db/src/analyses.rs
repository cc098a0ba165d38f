//! Analysis repository.
//!
//! CRUD, history, category filters, statistics and free-text search over
//! `dicom_analyses`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio_postgres::types::Json;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::schema::{AnalysisRecord, AnalysisStatistics, Category};

/// Rows fetched per searched column.
pub const SEARCH_LIMIT_PER_FIELD: i64 = 20;

/// Columns matched by [`AnalysisRepository::search`].
pub const SEARCH_FIELDS: [&str; 4] =
    ["patient_name", "patient_id", "study_description", "referring_physician"];

const COLUMNS: &str = "id, filename, file_hash, file_size, patient_name, patient_id, patient_sex, \
    patient_age, study_date, modality, study_description, series_description, body_part, confidence, \
    anatomical_landmarks, pathologies, heuristic_findings, recommendations, measurements, locations, \
    image_width, image_height, pixel_spacing, slice_thickness, institution_name, referring_physician, \
    session_id, analyzer_version, created_at";

/// Escape `LIKE` wildcards and wrap the term for a substring match.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Repository for analysis rows.
#[derive(Clone)]
pub struct AnalysisRepository {
    db: Arc<Database>,
}

impl AnalysisRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new analysis and return its id.
    pub async fn insert(&self, rec: &AnalysisRecord) -> Result<Uuid> {
        let client = self.db.client().await?;
        client
            .execute(
                &format!(
                    "INSERT INTO dicom_analyses ({COLUMNS}) VALUES \
                     ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,\
                     $21,$22,$23,$24,$25,$26,$27,$28,$29)"
                ),
                &[
                    &rec.id,
                    &rec.filename,
                    &rec.file_hash,
                    &rec.file_size,
                    &rec.patient_name,
                    &rec.patient_id,
                    &rec.patient_sex,
                    &rec.patient_age,
                    &rec.study_date,
                    &rec.modality,
                    &rec.study_description,
                    &rec.series_description,
                    &rec.body_part,
                    &rec.confidence,
                    &Json(&rec.anatomical_landmarks),
                    &Json(&rec.pathologies),
                    &Json(&rec.heuristic_findings),
                    &Json(&rec.recommendations),
                    &Json(&rec.measurements),
                    &Json(&rec.locations),
                    &rec.image_width,
                    &rec.image_height,
                    &rec.pixel_spacing.map(Json),
                    &rec.slice_thickness,
                    &rec.institution_name,
                    &rec.referring_physician,
                    &rec.session_id,
                    &rec.analyzer_version,
                    &rec.created_at,
                ],
            )
            .await?;
        tracing::debug!(id = %rec.id, body_part = %rec.body_part, "Analysis stored");
        Ok(rec.id)
    }

    /// Find an analysis by ID.
    pub async fn find(&self, id: Uuid) -> Result<Option<AnalysisRecord>> {
        let client = self.db.client().await?;
        let row = client
            .query_opt(&format!("SELECT {COLUMNS} FROM dicom_analyses WHERE id = $1"), &[&id])
            .await?;
        row.as_ref().map(AnalysisRecord::from_row).transpose()
    }

    /// Newest first.
    pub async fn history(&self, limit: i64, offset: i64) -> Result<Vec<AnalysisRecord>> {
        let client = self.db.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM dicom_analyses ORDER BY created_at DESC LIMIT $1 OFFSET $2"
                ),
                &[&limit, &offset],
            )
            .await?;
        rows.iter().map(AnalysisRecord::from_row).collect()
    }

    /// Exact match on one whitelisted column, newest first.
    pub async fn by_category(
        &self,
        category: Category,
        value: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AnalysisRecord>> {
        let client = self.db.client().await?;
        let sql = format!(
            "SELECT {COLUMNS} FROM dicom_analyses WHERE {} = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            category.column()
        );
        let rows = client.query(&sql, &[&value, &limit, &offset]).await?;
        rows.iter().map(AnalysisRecord::from_row).collect()
    }

    pub async fn statistics(&self) -> Result<AnalysisStatistics> {
        let client = self.db.client().await?;

        let total: i64 = client
            .query_one("SELECT COUNT(*) FROM dicom_analyses", &[])
            .await?
            .try_get(0)?;

        let mut body_part_distribution = BTreeMap::new();
        for row in client
            .query("SELECT body_part, COUNT(*) FROM dicom_analyses GROUP BY body_part", &[])
            .await?
        {
            body_part_distribution.insert(row.try_get::<_, String>(0)?, row.try_get::<_, i64>(1)?);
        }

        let mut modality_distribution = BTreeMap::new();
        for row in client
            .query(
                "SELECT COALESCE(modality, 'Unknown'), COUNT(*) FROM dicom_analyses \
                 GROUP BY COALESCE(modality, 'Unknown')",
                &[],
            )
            .await?
        {
            modality_distribution.insert(row.try_get::<_, String>(0)?, row.try_get::<_, i64>(1)?);
        }

        Ok(AnalysisStatistics {
            total_analyses: total,
            body_part_distribution,
            modality_distribution,
            last_updated: Utc::now(),
        })
    }

    /// Case-insensitive substring search over [`SEARCH_FIELDS`]. Each field
    /// contributes at most [`SEARCH_LIMIT_PER_FIELD`] rows; a row matching
    /// several fields appears once. Newest first.
    pub async fn search(&self, term: &str) -> Result<Vec<AnalysisRecord>> {
        let client = self.db.client().await?;
        let pattern = like_pattern(term);

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for field in SEARCH_FIELDS {
            let sql = format!(
                "SELECT {COLUMNS} FROM dicom_analyses WHERE {field} ILIKE $1 \
                 ORDER BY created_at DESC LIMIT $2"
            );
            for row in client.query(&sql, &[&pattern, &SEARCH_LIMIT_PER_FIELD]).await? {
                let rec = AnalysisRecord::from_row(&row)?;
                if seen.insert(rec.id) {
                    found.push(rec);
                }
            }
        }
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    /// Returns `false` when no row had this id.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let client = self.db.client().await?;
        let n = client.execute("DELETE FROM dicom_analyses WHERE id = $1", &[&id]).await?;
        if n > 0 {
            tracing::info!(%id, "Analysis deleted");
        }
        Ok(n > 0)
    }

    pub async fn count(&self) -> Result<i64> {
        let client = self.db.client().await?;
        Ok(client.query_one("SELECT COUNT(*) FROM dicom_analyses", &[]).await?.try_get(0)?)
    }
}
