//! radscope-report — PDF rendering for analysis results.
//!
//! Two documents are produced:
//! - the multi-study AI analysis report ([`render_ai_report`])
//! - the single-study radiologist report ([`render_professional_report`])
//!
//! Both are laid out with [`layout::PageWriter`] on A4 pages using the
//! built-in Helvetica faces, so no font files are needed at runtime.

pub mod ai_report;
pub mod error;
pub mod layout;
pub mod professional;
pub mod text;

pub use ai_report::{ai_report_filename, render_ai_report, IndividualResult};
pub use error::{ReportError, Result};
pub use professional::{professional_report_filename, render_professional_report, ReportSubject};
