//! Audit records for outbound AI calls.
//!
//! Patient data leaves the process on every call, so each one is logged with
//! the provider, model, token counts and a hash of the output.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::backend::LlmResponse;
use crate::router::LlmTask;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAuditEntry {
    pub id: Uuid,
    pub task: LlmTask,
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub output_hash: Option<String>,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub called_at: chrono::DateTime<Utc>,
}

impl LlmAuditEntry {
    pub fn success(task: LlmTask, provider: &str, resp: &LlmResponse, latency_ms: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(resp.content.as_bytes());
        let output_hash = format!("{:x}", hasher.finalize());

        Self {
            id: Uuid::new_v4(),
            task,
            provider: provider.to_string(),
            model: resp.model.clone(),
            prompt_tokens: resp.prompt_tokens,
            completion_tokens: resp.completion_tokens,
            output_hash: Some(output_hash),
            latency_ms,
            error: None,
            called_at: Utc::now(),
        }
    }

    pub fn failure(task: LlmTask, provider: &str, model: &str, error: &str, latency_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            provider: provider.to_string(),
            model: model.to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
            output_hash: None,
            latency_ms,
            error: Some(error.to_string()),
            called_at: Utc::now(),
        }
    }

    /// Write the entry to the `radscope::audit` tracing target.
    pub fn emit(&self) {
        match &self.error {
            None => tracing::info!(
                target: "radscope::audit",
                id = %self.id,
                task = self.task.as_str(),
                provider = %self.provider,
                model = %self.model,
                prompt_tokens = self.prompt_tokens,
                completion_tokens = self.completion_tokens,
                output_hash = self.output_hash.as_deref().unwrap_or(""),
                latency_ms = self.latency_ms,
                "LLM call"
            ),
            Some(err) => tracing::warn!(
                target: "radscope::audit",
                id = %self.id,
                task = self.task.as_str(),
                provider = %self.provider,
                model = %self.model,
                latency_ms = self.latency_ms,
                error = %err,
                "LLM call failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_hashes_output() {
        let resp = LlmResponse {
            content: "abc".into(),
            model: "gpt-4o".into(),
            prompt_tokens: 10,
            completion_tokens: 2,
        };
        let e = LlmAuditEntry::success(LlmTask::Vision, "openai", &resp, 12);
        assert_eq!(
            e.output_hash.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert!(e.error.is_none());
        e.emit();
    }

    #[test]
    fn test_failure_has_no_hash() {
        let e = LlmAuditEntry::failure(LlmTask::Report, "gemini", "gemini-1.5-flash", "timeout", 60_000);
        assert!(e.output_hash.is_none());
        assert_eq!(e.error.as_deref(), Some("timeout"));
    }
}
