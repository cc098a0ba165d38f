//! radscope Database Layer
//!
//! PostgreSQL persistence (Supabase compatible) for analyses, AI summaries,
//! patient reports and report generation logs, plus object storage for the
//! rendered PDFs.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use radscope_config::DatabaseConfig;
//! use radscope_db::{AnalysisRepository, Database};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig {
//!         url: Some("postgres://localhost/radscope".into()),
//!         ..Default::default()
//!     };
//!     let db = Arc::new(Database::connect(&config).await?);
//!     let analyses = AnalysisRepository::new(db);
//!     println!("{} analyses", analyses.count().await?);
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod error;
pub mod schema;
pub mod storage;
pub mod analyses;
pub mod ai_analyses;
pub mod patient_reports;
pub mod generation_logs;

pub use database::Database;
pub use error::{DbError, Result, StorageError};
pub use schema::{
    AiAnalysisKind, AiAnalysisRecord, AnalysisRecord, AnalysisStatistics, Category,
    GenerationKind, GenerationLog, PatientReportRecord, ReportStatus, StorageInfo,
};
pub use storage::{object_path, LocalReportStorage, ReportStorage, SupabaseStorage};
pub use analyses::AnalysisRepository;
pub use ai_analyses::AiAnalysisRepository;
pub use patient_reports::PatientReportRepository;
pub use generation_logs::GenerationLogRepository;
