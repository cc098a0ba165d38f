//! radscope-analysis — Image statistics, body-part classification, heuristic
//! finding tables and patient sessions.
//!
//! All image work is plain Rust over 8-bit grayscale buffers.
//!
//! # Example
//!
//! ```rust,no_run
//! use radscope_analysis::Analyzer;
//!
//! let analyzer = Analyzer::default();
//! let result = analyzer.analyze_file("uploads/study.dcm", Some("study.dcm"))?;
//! println!("{} ({:.2}): {:?}", result.body_part, result.confidence, result.pathologies);
//! # Ok::<(), radscope_analysis::AnalysisError>(())
//! ```

pub mod analyzer;
pub mod classifier;
pub mod edges;
pub mod error;
pub mod features;
pub mod findings;
pub mod glcm;
pub mod plane;
pub mod regions;
pub mod session;
pub mod thresholds;

pub use analyzer::{apply_vision, fallback_result, Analyzer, AnalyzerSettings, NO_FINDINGS};
pub use classifier::{classify, landmarks, Classification};
pub use error::{AnalysisError, Result};
pub use features::image_features;
pub use session::{PatientSession, SessionCheck, SessionClaim, SessionManager};
pub use thresholds::{detect_heuristic_findings, MAX_FINDINGS};
