//! LLM router — picks a backend per task and audits every call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use radscope_config::LlmConfig;
use serde::{Deserialize, Serialize};

use crate::audit::LlmAuditEntry;
use crate::backend::{GeminiBackend, LlmBackend, LlmError, LlmRequest, LlmResponse, OpenAiBackend};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// What a call is for. Each task has its own provider preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmTask {
    /// Body-part second opinion on the rendered image.
    Vision,
    /// Full radiologist report for one study.
    Report,
    /// Short clinical summary for one study.
    Summary,
    /// Combined analysis of several studies.
    Batch,
}

impl LlmTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmTask::Vision => "vision",
            LlmTask::Report => "report",
            LlmTask::Summary => "summary",
            LlmTask::Batch => "batch",
        }
    }

    /// Provider names in order of preference.
    pub fn preference(&self) -> &'static [&'static str] {
        match self {
            LlmTask::Vision => &["openai", "gemini"],
            LlmTask::Report | LlmTask::Summary | LlmTask::Batch => &["gemini", "openai"],
        }
    }
}

pub struct LlmRouter {
    backends: HashMap<String, Arc<dyn LlmBackend>>,
    vision_enabled: bool,
}

impl std::fmt::Debug for LlmRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmRouter")
            .field("providers", &self.providers())
            .field("vision_enabled", &self.vision_enabled)
            .finish()
    }
}

impl Default for LlmRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmRouter {
    pub fn new() -> Self {
        Self { backends: HashMap::new(), vision_enabled: true }
    }

    /// Register every provider that has an API key.
    pub fn from_config(config: &LlmConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut router = Self::new();
        router.set_vision_enabled(config.vision_enabled);

        if let Some(p) = &config.openai {
            if let Some(key) = &p.api_key {
                let mut b = OpenAiBackend::new(
                    key.clone(),
                    p.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL),
                )
                .with_timeout(timeout);
                if let Some(url) = &p.base_url {
                    b = b.with_base_url(url);
                }
                router.register_backend("openai", Arc::new(b));
            }
        }
        if let Some(p) = &config.gemini {
            if let Some(key) = &p.api_key {
                let mut b = GeminiBackend::new(
                    key.clone(),
                    p.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL),
                )
                .with_timeout(timeout);
                if let Some(url) = &p.base_url {
                    b = b.with_base_url(url);
                }
                router.register_backend("gemini", Arc::new(b));
            }
        }

        if router.is_empty() {
            tracing::warn!("No AI provider configured; AI enrichment is disabled");
        } else {
            tracing::info!(providers = ?router.providers(), "AI providers registered");
        }
        router
    }

    pub fn register_backend(&mut self, name: impl Into<String>, backend: Arc<dyn LlmBackend>) {
        self.backends.insert(name.into(), backend);
    }

    pub fn set_vision_enabled(&mut self, enabled: bool) {
        self.vision_enabled = enabled;
    }

    /// Vision calls are made only when enabled and a provider exists.
    pub fn vision_enabled(&self) -> bool {
        self.vision_enabled && self.has_backend(LlmTask::Vision)
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn has_backend(&self, task: LlmTask) -> bool {
        self.select_backend(task).is_ok()
    }

    /// Route a request to the preferred backend for `task` and audit the call.
    pub async fn route(&self, task: LlmTask, mut req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let (name, backend) = self.select_backend(task)?;

        let ceiling = u32::try_from(backend.max_output_tokens()).unwrap_or(u32::MAX);
        req.max_tokens = req.max_tokens.map(|t| t.min(ceiling));

        tracing::debug!(
            task = task.as_str(),
            provider = backend.provider(),
            model = backend.model_id(),
            max_tokens = ?req.max_tokens,
            "LLM request routed"
        );

        let started = Instant::now();
        let result = backend.complete(req).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let entry = match &result {
            Ok(resp) => LlmAuditEntry::success(task, name, resp, latency_ms),
            Err(e) => LlmAuditEntry::failure(task, name, backend.model_id(), &e.to_string(), latency_ms),
        };
        entry.emit();
        result
    }

    fn select_backend(&self, task: LlmTask) -> Result<(&'static str, &Arc<dyn LlmBackend>), LlmError> {
        task.preference()
            .iter()
            .find_map(|name| self.backends.get(*name).map(|b| (*name, b)))
            .ok_or_else(|| LlmError::Unavailable(format!(
                "no AI provider configured for {} (set OPENAI_API_KEY or GEMINI_API_KEY)",
                task.as_str()
            )))
    }
}
