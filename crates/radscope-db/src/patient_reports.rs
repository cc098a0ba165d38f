//! Patient report repository.
//!
//! A report row starts `pending`, becomes `completed` once its PDF is
//! stored, and `downloaded` after the browser fetched it.

use std::sync::Arc;

use chrono::Utc;
use tokio_postgres::types::Json;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{DbError, Result};
use crate::schema::{PatientReportRecord, ReportStatus, StorageInfo};

const COLUMNS: &str = "id, analysis_id, report_date, patient_name, patient_id, patient_sex, patient_age, \
    study_date, doctor_name, body_part, modality, study_description, confidence, report_status, \
    report_data, pdf_storage_bucket, pdf_storage_path, pdf_url, pdf_file_size, pdf_generated_at, \
    created_at, updated_at";

#[derive(Clone)]
pub struct PatientReportRepository {
    db: Arc<Database>,
}

impl PatientReportRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn insert(&self, rec: &PatientReportRecord) -> Result<Uuid> {
        let client = self.db.client().await?;
        client
            .execute(
                &format!(
                    "INSERT INTO patient_reports ({COLUMNS}) VALUES \
                     ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22)"
                ),
                &[
                    &rec.id,
                    &rec.analysis_id,
                    &rec.report_date,
                    &rec.patient_name,
                    &rec.patient_id,
                    &rec.patient_sex,
                    &rec.patient_age,
                    &rec.study_date,
                    &rec.doctor_name,
                    &rec.body_part,
                    &rec.modality,
                    &rec.study_description,
                    &rec.confidence,
                    &rec.report_status.as_str(),
                    &Json(&rec.report_data),
                    &rec.pdf_storage_bucket,
                    &rec.pdf_storage_path,
                    &rec.pdf_url,
                    &rec.pdf_file_size,
                    &rec.pdf_generated_at,
                    &rec.created_at,
                    &rec.updated_at,
                ],
            )
            .await?;
        tracing::info!(id = %rec.id, patient_id = %rec.patient_id, "Patient report saved");
        Ok(rec.id)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<PatientReportRecord>> {
        let client = self.db.client().await?;
        let row = client
            .query_opt(&format!("SELECT {COLUMNS} FROM patient_reports WHERE id = $1"), &[&id])
            .await?;
        row.as_ref().map(PatientReportRecord::from_row).transpose()
    }

    /// Newest first.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<PatientReportRecord>> {
        let client = self.db.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM patient_reports ORDER BY created_at DESC LIMIT $1 OFFSET $2"
                ),
                &[&limit, &offset],
            )
            .await?;
        rows.iter().map(PatientReportRecord::from_row).collect()
    }

    pub async fn update_status(&self, id: Uuid, status: ReportStatus) -> Result<()> {
        let client = self.db.client().await?;
        let n = client
            .execute(
                "UPDATE patient_reports SET report_status = $2, updated_at = $3 WHERE id = $1",
                &[&id, &status.as_str(), &Utc::now()],
            )
            .await?;
        if n == 0 {
            return Err(DbError::NotFound(format!("patient report {id}")));
        }
        Ok(())
    }

    /// Record where the PDF was stored and mark the report completed.
    pub async fn attach_pdf(&self, id: Uuid, info: &StorageInfo) -> Result<()> {
        let client = self.db.client().await?;
        let now = Utc::now();
        let n = client
            .execute(
                "UPDATE patient_reports SET pdf_storage_bucket = $2, pdf_storage_path = $3, \
                 pdf_url = $4, pdf_file_size = $5, pdf_generated_at = $6, report_status = $7, \
                 updated_at = $6 WHERE id = $1",
                &[
                    &id,
                    &info.bucket,
                    &info.storage_path,
                    &info.public_url,
                    &info.file_size,
                    &now,
                    &ReportStatus::Completed.as_str(),
                ],
            )
            .await?;
        if n == 0 {
            return Err(DbError::NotFound(format!("patient report {id}")));
        }
        tracing::info!(%id, path = %info.storage_path, "PDF attached to report");
        Ok(())
    }
}
