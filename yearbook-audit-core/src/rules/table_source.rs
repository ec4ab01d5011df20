// R3: every table cites its source in the caption or the notes below it.
use crate::config::LocaleConfig;
use crate::error::RuleError;
use crate::types::*;

use super::engine::{preview, AuditRule, TableView};

pub struct TableSourceRule {
    markers: Vec<String>,
}

impl TableSourceRule {
    pub fn new(locale: &LocaleConfig) -> Self {
        Self {
            markers: locale
                .source_markers
                .iter()
                .map(|marker| marker.trim().to_lowercase())
                .filter(|marker| !marker.is_empty())
                .collect(),
        }
    }

    fn cites_source(&self, text: Option<&str>) -> bool {
        text.is_some_and(|text| {
            let text = text.to_lowercase();
            self.markers.iter().any(|marker| text.contains(marker.as_str()))
        })
    }
}

impl AuditRule for TableSourceRule {
    fn id(&self) -> RuleId {
        RuleId::R3
    }

    fn check_table(&self, view: &TableView<'_>, _ctx: &ReviewContext) -> Result<Vec<Finding>, RuleError> {
        let table = view.table;
        if self.cites_source(table.caption.as_deref()) || self.cites_source(table.notes.as_deref()) {
            return Ok(Vec::new());
        }

        Ok(vec![Finding::new(
            RuleId::R3,
            "missing_source",
            Severity::Fail,
            format!("Table '{}' does not cite a source in its caption or notes", view.label()),
        )
        .with_evidence("snippet", view.label())
        .with_evidence("location", view.location())
        .with_evidence("caption", table.caption.clone().unwrap_or_default())
        .with_evidence("notes", preview(table.notes.as_deref().unwrap_or("")))])
    }

    fn pass_finding(&self, section: &ExtractedSection) -> Finding {
        let tables = section.tables.len();
        let message = if tables == 0 {
            "No tables to check for source attribution".to_string()
        } else {
            format!("All {tables} table(s) cite a source")
        };
        Finding::pass(RuleId::R3, message)
            .with_evidence("snippet", "")
            .with_evidence("location", "section")
            .with_evidence("tables_checked", tables)
            .with_evidence("tables_attributed", tables)
    }
}
