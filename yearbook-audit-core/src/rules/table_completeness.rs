// R5: tables must be readable and complete. Empty data cells warn; a
// "not available" marker needs a note explaining it.
use crate::config::LocaleConfig;
use crate::error::RuleError;
use crate::types::*;
use anyhow::{Context, Result};
use regex::Regex;

use super::engine::{preview, AuditRule, TableView};
use super::table_grid::TableGrid;

/// Empty-cell positions listed in evidence
const MAX_LISTED_POSITIONS: usize = 10;

const FOOTNOTE_MARKS: &[char] = &['*', '¹', '²', '³'];

struct NotAvailableMarker {
    label: String,
    /// Matches the marker as a standalone word in notes
    reference: Regex,
}

pub struct TableCompletenessRule {
    markers: Vec<NotAvailableMarker>,
}

impl TableCompletenessRule {
    pub fn new(locale: &LocaleConfig) -> Result<Self> {
        let markers = locale
            .not_available_markers
            .iter()
            .map(|marker| marker.trim())
            .filter(|marker| !marker.is_empty())
            .map(|marker| -> Result<NotAvailableMarker> {
                let pattern = format!(
                    r"(?i)(?:^|[^\p{{L}}\p{{N}}]){}(?:[^\p{{L}}\p{{N}}]|$)",
                    regex::escape(marker)
                );
                Ok(NotAvailableMarker {
                    label: marker.to_string(),
                    reference: Regex::new(&pattern)
                        .with_context(|| format!("invalid not-available marker '{marker}'"))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { markers })
    }

    fn malformed_finding(view: &TableView<'_>, reason: &str) -> Finding {
        let snippet = if view.table.raw_html.trim().is_empty() {
            view.label()
        } else {
            preview(&view.table.raw_html)
        };
        Finding::new(
            RuleId::R5,
            "malformed_table",
            Severity::Fail,
            format!("Table '{}' could not be read as a grid: {reason}", view.label()),
        )
        .with_evidence("snippet", snippet)
        .with_evidence("location", view.location())
        .with_evidence("reason", reason)
    }

    /// Data cells: not in a header row, not the label column, not colspan filler
    fn data_cells(grid: &TableGrid) -> impl Iterator<Item = (usize, usize, &str)> + '_ {
        grid.data_rows().flat_map(move |row| {
            grid.rows()[row]
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(_, cell)| !cell.is_filler && !cell.is_header)
                .map(move |(column, cell)| (row, column, cell.text.as_str()))
        })
    }

    fn empty_cells_finding(view: &TableView<'_>, grid: &TableGrid) -> Option<Finding> {
        let empty: Vec<(usize, usize)> = Self::data_cells(grid)
            .filter(|(_, _, text)| text.trim().is_empty())
            .map(|(row, column, _)| (row, column))
            .collect();
        if empty.is_empty() {
            return None;
        }

        let positions: Vec<String> = empty
            .iter()
            .take(MAX_LISTED_POSITIONS)
            .map(|(row, column)| format!("row {row}, column {column}"))
            .collect();
        Some(
            Finding::new(
                RuleId::R5,
                "empty_cells",
                Severity::Warn,
                format!("Table '{}' has {} empty data cell(s)", view.label(), empty.len()),
            )
            .with_evidence("snippet", positions.join("; "))
            .with_evidence("location", view.location())
            .with_evidence("count", empty.len())
            .with_evidence("positions", positions),
        )
    }

    fn unexplained_marker_findings(&self, view: &TableView<'_>, grid: &TableGrid) -> Vec<Finding> {
        let notes = view.table.notes.as_deref().unwrap_or("");
        let mut findings = Vec::new();

        for marker in &self.markers {
            let hits: Vec<(usize, usize)> = Self::data_cells(grid)
                .filter(|(_, _, text)| {
                    text.trim()
                        .trim_end_matches(FOOTNOTE_MARKS)
                        .trim()
                        .eq_ignore_ascii_case(&marker.label)
                })
                .map(|(row, column, _)| (row, column))
                .collect();
            let Some((row, column)) = hits.first().copied() else {
                continue;
            };
            if marker.reference.is_match(notes) {
                continue;
            }

            findings.push(
                Finding::new(
                    RuleId::R5,
                    "unexplained_marker",
                    Severity::Fail,
                    format!(
                        "Table '{}' uses '{}' in {} cell(s) without a note explaining it",
                        view.label(),
                        marker.label,
                        hits.len()
                    ),
                )
                .with_evidence("snippet", grid.row_text(row))
                .with_evidence("location", format!("{} row {row}, column {column}", view.location()))
                .with_evidence("marker", marker.label.as_str())
                .with_evidence("count", hits.len())
                .with_evidence("notes", preview(notes)),
            );
        }
        findings
    }
}

impl AuditRule for TableCompletenessRule {
    fn id(&self) -> RuleId {
        RuleId::R5
    }

    fn check_table(&self, view: &TableView<'_>, _ctx: &ReviewContext) -> Result<Vec<Finding>, RuleError> {
        let grid = match view.grid {
            Ok(grid) => grid,
            Err(RuleError::MalformedTable(reason)) => {
                return Ok(vec![Self::malformed_finding(view, reason)]);
            }
            Err(other) => return Err(other.clone()),
        };

        let mut findings: Vec<Finding> = Self::empty_cells_finding(view, grid).into_iter().collect();
        findings.extend(self.unexplained_marker_findings(view, grid));
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleEngine;

    fn r5(table: ExtractedTable) -> Vec<Finding> {
        RuleEngine::with_defaults()
            .unwrap()
            .evaluate(
                &ExtractedSection::new("").with_table(table),
                &ReviewContext::new(2024, 2023),
            )
            .into_iter()
            .filter(|f| f.rule == RuleId::R5)
            .collect()
    }

    #[test]
    fn complete_table_passes() {
        let table = ExtractedTable::from_rows([["Campus", "Students"], ["A", "40"], ["B", "30"]]);
        let findings = r5(table);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Pass);
    }

    #[test]
    fn empty_cells_warn_once_per_table() {
        let table = ExtractedTable::from_rows([
            ["Campus", "2022", "2023"],
            ["A", "", "5"],
            ["B", " ", ""],
        ]);
        let findings = r5(table);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].check, "empty_cells");
        assert_eq!(findings[0].severity, Severity::Warn);
        assert_eq!(findings[0].evidence["count"], 3);
    }

    #[test]
    fn unexplained_marker_fails_and_explained_marker_passes() {
        let rows = [["Campus", "Students"], ["A", "ND"], ["B", "30"]];
        let findings = r5(ExtractedTable::from_rows(rows));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].check, "unexplained_marker");
        assert_eq!(findings[0].evidence_str("marker"), Some("ND"));

        let explained = ExtractedTable::from_rows(rows).with_notes("ND: dado não disponível.");
        assert_eq!(r5(explained)[0].severity, Severity::Pass);
    }

    #[test]
    fn marker_inside_a_word_does_not_explain() {
        let table = ExtractedTable::from_rows([["Campus", "Students"], ["A", "N/A"], ["B", "1"]])
            .with_notes("Data from ANDRADE survey, Fonte: X");
        let findings = r5(table);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].evidence_str("marker"), Some("N/A"));
    }

    #[test]
    fn malformed_markup_fails_but_other_table_rules_still_run() {
        let table = ExtractedTable::from_html("<table><p>Total</p></table>").with_caption("Fonte: DPO");
        let findings = RuleEngine::with_defaults()
            .unwrap()
            .evaluate(
                &ExtractedSection::new("").with_table(table),
                &ReviewContext::new(2024, 2023),
            );

        let r5: Vec<_> = findings.iter().filter(|f| f.rule == RuleId::R5).collect();
        assert_eq!(r5.len(), 1);
        assert_eq!(r5[0].check, "malformed_table");
        assert_eq!(r5[0].severity, Severity::Fail);

        let r3 = findings.iter().find(|f| f.rule == RuleId::R3).unwrap();
        assert_eq!(r3.severity, Severity::Pass);
        let r4 = findings.iter().find(|f| f.rule == RuleId::R4).unwrap();
        assert_eq!(r4.severity, Severity::Pass);
    }
}
