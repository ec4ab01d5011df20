// R6: total rows must stand out visually. Reads the raw markup, since
// extracted cell text carries no styling.
use crate::config::LocaleConfig;
use crate::error::RuleError;
use crate::extract::markup;
use crate::types::*;
use regex::Regex;
use std::sync::LazyLock;

use super::engine::{preview, AuditRule, TableView};

static BOLD_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(?:b|strong|th)\b").unwrap());

static FONT_WEIGHT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)font-weight\s*:\s*(?:bold|bolder|[5-9]00)").unwrap()
});

static BACKGROUND_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)background(?:-color)?\s*:").unwrap());

static BGCOLOR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bbgcolor\s*=").unwrap());

/// Bold, strong or header cells, a bold font-weight, or a background color
pub fn has_emphasis(row_html: &str) -> bool {
    BOLD_TAG_REGEX.is_match(row_html)
        || FONT_WEIGHT_REGEX.is_match(row_html)
        || BACKGROUND_REGEX.is_match(row_html)
        || BGCOLOR_REGEX.is_match(row_html)
}

pub struct TotalEmphasisRule {
    locale: LocaleConfig,
}

impl TotalEmphasisRule {
    pub fn new(locale: &LocaleConfig) -> Self {
        Self {
            locale: locale.clone(),
        }
    }
}

impl AuditRule for TotalEmphasisRule {
    fn id(&self) -> RuleId {
        RuleId::R6
    }

    fn check_table(&self, view: &TableView<'_>, _ctx: &ReviewContext) -> Result<Vec<Finding>, RuleError> {
        if view.table.raw_html.trim().is_empty() {
            return Ok(Vec::new());
        }

        let findings = markup::parse_table_rows(&view.table.raw_html)
            .into_iter()
            .enumerate()
            .filter(|(_, row)| row.first_text().is_some_and(|label| self.locale.is_total_label(label)))
            .filter(|(_, row)| !has_emphasis(&row.raw))
            .map(|(index, row)| {
                Finding::new(
                    RuleId::R6,
                    "total_not_emphasized",
                    Severity::Warn,
                    format!(
                        "Total row in '{}' is not visually emphasized (no bold or background)",
                        view.label()
                    ),
                )
                .with_evidence("snippet", preview(&row.raw))
                .with_evidence("location", format!("{} row {index}", view.location()))
            })
            .collect();
        Ok(findings)
    }
}
