//! Shared application state for the web server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use radscope_analysis::{Analyzer, AnalyzerSettings, SessionManager};
use radscope_config::{Config, StorageBackend};
use radscope_db::{
    AiAnalysisRepository, AnalysisRepository, Database, GenerationLog, GenerationLogRepository,
    PatientReportRepository, ReportStorage,
};
use radscope_llm::LlmRouter;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::ApiError;
use crate::templates::Templates;

/// Events pushed to connected clients via SSE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// An upload was analysed
    AnalysisCompleted {
        filename: String,
        body_part: String,
        session_id: String,
        database_id: Option<Uuid>,
    },
    /// A radiologist report PDF was stored
    ReportGenerated { report_id: Uuid, download_url: String, enhanced: bool },
    /// An analysis row was removed
    AnalysisDeleted { analysis_id: Uuid },
}

/// Repositories over one connection pool.
#[derive(Clone)]
pub struct Persistence {
    pub db: Arc<Database>,
    pub analyses: AnalysisRepository,
    pub ai_analyses: AiAnalysisRepository,
    pub reports: PatientReportRepository,
    pub logs: GenerationLogRepository,
}

impl Persistence {
    pub fn new(db: Database) -> Self {
        let db = Arc::new(db);
        Self {
            analyses: AnalysisRepository::new(db.clone()),
            ai_analyses: AiAnalysisRepository::new(db.clone()),
            reports: PatientReportRepository::new(db.clone()),
            logs: GenerationLogRepository::new(db.clone()),
            db,
        }
    }

    /// Generation logs are best effort.
    pub async fn log_generation(&self, entry: GenerationLog) {
        if let Err(e) = self.logs.insert(&entry).await {
            tracing::warn!(error = %e, kind = entry.kind.as_str(), "Could not store generation log");
        }
    }
}

/// Shared state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Analyzer,
    pub llm: Arc<LlmRouter>,
    pub sessions: Arc<SessionManager>,
    /// `None` when no database URL is configured or it was unreachable at start-up.
    pub persistence: Option<Persistence>,
    pub storage: Arc<dyn ReportStorage>,
    /// Directory served at `/reports` when storage is local.
    pub local_reports_dir: Option<PathBuf>,
    pub templates: Arc<Templates>,
    pub upload_dir: PathBuf,
    pub static_dir: PathBuf,
    pub max_upload_mb: usize,
    /// Broadcast channel for SSE push events
    pub event_tx: broadcast::Sender<AppEvent>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("llm", &self.llm)
            .field("database", &self.persistence.is_some())
            .field("storage", &self.storage.backend())
            .field("upload_dir", &self.upload_dir)
            .finish()
    }
}

impl AppState {
    pub fn new(
        config: &Config,
        db: Option<Database>,
        storage: Arc<dyn ReportStorage>,
        llm: LlmRouter,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let local_reports_dir =
            (config.storage.backend == StorageBackend::Local).then(|| config.storage.local_dir.clone());
        Self {
            analyzer: Analyzer::new(AnalyzerSettings::from(&config.analysis)),
            llm: Arc::new(llm),
            sessions: Arc::new(SessionManager::new(Duration::from_secs(config.sessions.ttl_secs))),
            persistence: db.map(Persistence::new),
            storage,
            local_reports_dir,
            templates: Arc::new(Templates::new(config.server.template_dir.clone())),
            upload_dir: config.server.upload_dir.clone(),
            static_dir: config.server.static_dir.clone(),
            max_upload_mb: config.server.max_upload_mb,
            event_tx,
        }
    }

    /// Wire everything from configuration. An unreachable database is logged
    /// and the server runs without persistence.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.server.upload_dir).await?;

        let db = if config.database.url.is_some() {
            match Database::connect(&config.database).await {
                Ok(db) => {
                    tracing::info!(?db, "Database connected");
                    Some(db)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Database unavailable, persistence disabled");
                    None
                }
            }
        } else {
            tracing::warn!("DATABASE_URL not set, persistence disabled");
            None
        };

        let storage = radscope_db::storage::from_config(&config.storage)?;
        let llm = LlmRouter::from_config(&config.llm);
        tracing::info!(providers = ?llm.providers(), vision = llm.vision_enabled(), "AI providers");

        Ok(Self::new(config, db, storage, llm))
    }

    pub fn persistence(&self) -> Result<&Persistence, ApiError> {
        self.persistence.as_ref().ok_or(ApiError::DatabaseUnavailable)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.event_tx.subscribe()
    }

    /// Send to connected clients; nobody listening is fine.
    pub fn publish(&self, event: AppEvent) {
        let _ = self.event_tx.send(event);
    }
}

pub type SharedState = Arc<AppState>;
