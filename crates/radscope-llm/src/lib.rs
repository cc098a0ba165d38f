//! radscope-llm — Hosted AI backends and the prompts built on them.
//!
//! Backends implement [`backend::LlmBackend`]; the [`router::LlmRouter`]
//! picks one per [`router::LlmTask`]. The prompt modules never fail an
//! upload: report and batch generation fall back to deterministic templates.

pub mod audit;
pub mod backend;
pub mod batch;
pub mod report;
pub mod router;
pub mod summary;
pub mod vision;

pub use backend::{GeminiBackend, ImagePart, LlmBackend, LlmError, LlmRequest, LlmResponse, Message, OpenAiBackend};
pub use batch::{analyze_batch, BatchAnalysis};
pub use report::{generate_report, RadiologistReport};
pub use router::{LlmRouter, LlmTask};
pub use summary::{clinical_summary, ClinicalSummary, SummaryOutcome};
pub use vision::assess_image;
