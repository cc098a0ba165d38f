//! radscope-web: HTTP API and browser UI.
//!
//!   - DICOM upload, validation and heuristic analysis
//!   - History, statistics and search over stored analyses
//!   - AI summaries, batch analysis and PDF reports
//!   - Patient session isolation
//!   - Live events over SSE

pub mod error;
pub mod handlers;
pub mod router;
pub mod sse;
pub mod state;
pub mod templates;
pub mod uploads;
