// Yearbook Audit Core Library
//
// Rule engine for statistical yearbook audits, plus the extraction,
// persistence and reporting plumbing that feeds it and consumes its findings.

pub mod types;
pub mod error;
pub mod config;
pub mod locale;
pub mod extract;
pub mod rules;
pub mod storage;
pub mod auditor;
pub mod report;

// Re-export main types and functions for easy use
pub use types::*;
pub use error::{AuditError, LocaleNumberError, RuleError};
pub use config::{AuditConfig, ConfigOrigin};
pub use locale::parse_locale_number;
pub use rules::RuleEngine;
pub use auditor::{Auditor, ManualReviewInput, PageFailure, RunAllSummary};
pub use extract::{
    DefaultPageSource, FilePageSource, HttpPageSource, MemoryPageSource, PageSource, SectionExtractor,
    TocExtractor,
};
pub use storage::{AuditStorage, FileStorage, MemoryStorage};
pub use report::{ReportData, ReportFormat};
