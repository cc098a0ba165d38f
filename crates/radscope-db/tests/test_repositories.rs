//! Repository round trips against a live PostgreSQL.
//!
//! Run with: DATABASE_URL=postgres://... cargo test --package radscope-db --test test_repositories -- --ignored --nocapture

use std::sync::Arc;

use radscope_common::{AnalysisResult, BodyPart, PatientInfo, StudyMetadata};
use radscope_config::DatabaseConfig;
use radscope_db::{
    AiAnalysisKind, AiAnalysisRecord, AiAnalysisRepository, AnalysisRecord, AnalysisRepository,
    Category, Database, GenerationKind, GenerationLog, GenerationLogRepository,
    PatientReportRecord, PatientReportRepository, ReportStatus, StorageInfo,
};
use uuid::Uuid;

async fn connect() -> Arc<Database> {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let config = DatabaseConfig { url: Some(url), max_connections: 2, run_migrations: true };
    Arc::new(Database::connect(&config).await.expect("connect"))
}

fn sample(patient_id: &str) -> AnalysisResult {
    AnalysisResult {
        body_part: BodyPart::Brain,
        confidence: 0.85,
        anatomical_landmarks: vec!["cerebral hemispheres".into()],
        pathologies: vec!["No specific abnormalities detected".into()],
        modality: Some("MR".into()),
        study_description: Some("BRAIN WO CONTRAST".into()),
        patient_info: PatientInfo {
            name: Some("ROE^RICHARD DR. LEE".into()),
            patient_id: Some(patient_id.into()),
            ..Default::default()
        },
        image_size: Some([256, 256]),
        pixel_spacing: Some([0.9, 0.9]),
        analysis_timestamp: chrono::Utc::now(),
        ..Default::default()
    }
}

#[tokio::test]
#[ignore]
async fn test_analysis_lifecycle() {
    let db = connect().await;
    let repo = AnalysisRepository::new(db);
    let patient_id = format!("T-{}", Uuid::new_v4());

    let rec = AnalysisRecord::from_analysis(&sample(&patient_id), &StudyMetadata::default(), "t.dcm", "00", 10);
    let id = repo.insert(&rec).await.unwrap();

    let found = repo.find(id).await.unwrap().unwrap();
    assert_eq!(found.pathologies, rec.pathologies);
    assert_eq!(found.pixel_spacing, Some([0.9, 0.9]));

    let by_patient = repo.by_category(Category::PatientId, &patient_id, 20, 0).await.unwrap();
    assert_eq!(by_patient.len(), 1);

    let hits = repo.search(&patient_id[2..10]).await.unwrap();
    assert!(hits.iter().any(|r| r.id == id));

    let stats = repo.statistics().await.unwrap();
    assert!(stats.total_analyses >= 1);
    assert!(stats.body_part_distribution.contains_key("brain"));

    assert!(repo.delete(id).await.unwrap());
    assert!(!repo.delete(id).await.unwrap());
    assert!(repo.find(id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_report_and_logs() {
    let db = connect().await;
    let analyses = AnalysisRepository::new(db.clone());
    let reports = PatientReportRepository::new(db.clone());
    let summaries = AiAnalysisRepository::new(db.clone());
    let logs = GenerationLogRepository::new(db);

    let result = sample("T-report");
    let analysis = AnalysisRecord::from_analysis(&result, &StudyMetadata::default(), "r.dcm", "00", 10);
    let analysis_id = analyses.insert(&analysis).await.unwrap();

    let report = PatientReportRecord::from_analysis(Some(analysis_id), &result);
    let report_id = reports.insert(&report).await.unwrap();
    let stored = reports.find(report_id).await.unwrap().unwrap();
    assert_eq!(stored.patient_name, "ROE RICHARD");
    assert_eq!(stored.doctor_name, "DR.LEE");
    assert_eq!(stored.report_data.body_part, BodyPart::Brain);

    let info = StorageInfo {
        bucket: "patient-reports".into(),
        storage_path: "T-report/x.pdf".into(),
        public_url: "/reports/patient-reports/T-report/x.pdf".into(),
        file_size: 42,
    };
    reports.attach_pdf(report_id, &info).await.unwrap();
    let stored = reports.find(report_id).await.unwrap().unwrap();
    assert_eq!(stored.report_status, ReportStatus::Completed);
    assert_eq!(stored.download_url(), Some(info.public_url.as_str()));

    reports.update_status(report_id, ReportStatus::Downloaded).await.unwrap();
    assert!(reports.update_status(Uuid::new_v4(), ReportStatus::Completed).await.is_err());

    let mut summary = AiAnalysisRecord::new(AiAnalysisKind::Summary, serde_json::json!({"enhanced": false}));
    summary.analysis_id = Some(analysis_id);
    summaries.insert(&summary).await.unwrap();
    let latest = summaries.latest_for_analysis(analysis_id).await.unwrap().unwrap();
    assert_eq!(latest.id, summary.id);

    let mut log = GenerationLog::new(GenerationKind::ProfessionalReport).with_output("text");
    log.report_id = Some(report_id);
    logs.insert(&log).await.unwrap();
    assert!(logs.recent(10).await.unwrap().iter().any(|l| l.id == log.id));

    // Deleting the analysis detaches the report and removes its summaries.
    analyses.delete(analysis_id).await.unwrap();
    assert!(reports.find(report_id).await.unwrap().unwrap().analysis_id.is_none());
    assert!(summaries.latest_for_analysis(analysis_id).await.unwrap().is_none());
}
