use crate::types::{ReviewId, SectionId};
use thiserror::Error;

/// Why a cell or token could not be read as a locale number
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocaleNumberError {
    #[error("empty numeric token")]
    Empty,

    #[error("not a number: '{0}'")]
    NotANumber(String),

    #[error("invalid thousands grouping in '{0}'")]
    InvalidGrouping(String),
}

/// Failures inside a single rule evaluation. The engine turns these into
/// `rule_error` findings instead of aborting the section.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("malformed table: {0}")]
    MalformedTable(String),

    #[error("total arithmetic unparseable: {0}")]
    ArithmeticUnparseable(String),

    #[error("unexpected internal error: {0}")]
    UnexpectedInternalError(String),
}

impl RuleError {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleError::MalformedTable(_) => "malformed_table",
            RuleError::ArithmeticUnparseable(_) => "arithmetic_unparseable",
            RuleError::UnexpectedInternalError(_) => "unexpected_internal_error",
        }
    }
}

/// Orchestration errors surfaced to callers of the auditor
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("review not found: {0}")]
    ReviewNotFound(ReviewId),

    #[error("section {section_id} not found in review {review_id}")]
    SectionNotFound {
        review_id: ReviewId,
        section_id: SectionId,
    },

    #[error("a review already exists for {0}")]
    DuplicateReview(String),

    #[error("no check results for section {section_id} of review {review_id}")]
    NoResults {
        review_id: ReviewId,
        section_id: SectionId,
    },

    #[error("unsupported report format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to extract {url}: {message}")]
    Extraction { url: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_error_kind_is_snake_case() {
        assert_eq!(
            RuleError::MalformedTable("x".into()).kind(),
            "malformed_table"
        );
        assert_eq!(
            RuleError::UnexpectedInternalError("boom".into()).to_string(),
            "unexpected internal error: boom"
        );
    }
}
