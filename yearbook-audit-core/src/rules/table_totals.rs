// R4: declared totals must equal the sum of their components, within tolerance.
use crate::config::{LocaleConfig, ToleranceConfig};
use crate::error::RuleError;
use crate::locale::{cell_number, parse_locale_number};
use crate::types::*;
use serde::Serialize;

use super::engine::{display_number, AuditRule, TableView};
use super::table_grid::TableGrid;

/// Fewer numeric components than this and the total is not checked
const MIN_COMPONENTS: usize = 2;

#[derive(Debug, Clone, Serialize)]
struct Mismatch {
    /// Column label for a total row, row label for a total column
    position: String,
    declared: f64,
    computed: f64,
    difference: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TotalLine {
    Row(usize),
    Column(usize),
}

pub struct TableTotalsRule {
    locale: LocaleConfig,
    tolerance: ToleranceConfig,
}

impl TableTotalsRule {
    pub fn new(locale: &LocaleConfig, tolerance: ToleranceConfig) -> Self {
        Self {
            locale: locale.clone(),
            tolerance,
        }
    }

    fn declared_total(text: &str) -> Result<Option<f64>, RuleError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        parse_locale_number(text)
            .map(Some)
            .map_err(|e| RuleError::ArithmeticUnparseable(format!("'{}': {e}", text.trim())))
    }

    fn compare(&self, position: String, declared_text: &str, components: Vec<f64>) -> Option<Mismatch> {
        let declared = match Self::declared_total(declared_text) {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "skipping total that does not parse");
                return None;
            }
        };
        if components.len() < MIN_COMPONENTS {
            return None;
        }
        let computed: f64 = components.iter().sum();
        if self.tolerance.accepts(declared, computed) {
            return None;
        }
        Some(Mismatch {
            position,
            declared,
            computed,
            difference: declared - computed,
        })
    }

    /// Each numeric cell of a total row against the same column of the data rows above and below
    fn check_total_row(&self, grid: &TableGrid, row: usize, total_rows: &[usize]) -> Vec<Mismatch> {
        (1..grid.width())
            .filter_map(|column| {
                let cell = grid.cell(row, column).filter(|cell| !cell.is_filler)?;
                let components = grid
                    .data_rows()
                    .filter(|other| *other != row && !total_rows.contains(other))
                    .filter_map(|other| numeric_cell(grid, other, column))
                    .collect();
                let position = grid
                    .column_label(column)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("column {column}"));
                self.compare(position, &cell.text, components)
            })
            .collect()
    }

    /// Each data row's total cell against the other value columns of that row
    fn check_total_column(&self, grid: &TableGrid, column: usize, total_columns: &[usize]) -> Vec<Mismatch> {
        grid.data_rows()
            .filter_map(|row| {
                let cell = grid.cell(row, column).filter(|cell| !cell.is_filler)?;
                let components = (1..grid.width())
                    .filter(|other| *other != column && !total_columns.contains(other))
                    .filter_map(|other| numeric_cell(grid, row, other))
                    .collect();
                let position = grid
                    .row_label(row)
                    .filter(|label| !label.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("row {row}"));
                self.compare(position, &cell.text, components)
            })
            .collect()
    }

    fn mismatch_finding(&self, view: &TableView<'_>, grid: &TableGrid, line: TotalLine, mismatches: Vec<Mismatch>) -> Finding {
        let (kind, location, snippet) = match line {
            TotalLine::Row(row) => (
                "row",
                format!("{} row {row}", view.location()),
                grid.row_text(row),
            ),
            TotalLine::Column(column) => (
                "column",
                format!("{} column {column}", view.location()),
                grid.column_label(column).unwrap_or("Total").to_string(),
            ),
        };
        let details = mismatches
            .iter()
            .map(|m| {
                format!(
                    "{}: declared {}, computed {}",
                    m.position,
                    display_number(m.declared),
                    display_number(m.computed)
                )
            })
            .collect::<Vec<_>>()
            .join("; ");

        Finding::new(
            RuleId::R4,
            "total_mismatch",
            Severity::Fail,
            format!("Total {kind} in '{}' does not match its components ({details})", view.label()),
        )
        .with_evidence("snippet", snippet)
        .with_evidence("location", location)
        .with_evidence("line", kind)
        .with_evidence(
            "mismatches",
            serde_json::to_value(&mismatches).unwrap_or_default(),
        )
    }
}

fn numeric_cell(grid: &TableGrid, row: usize, column: usize) -> Option<f64> {
    grid.cell(row, column)
        .filter(|cell| !cell.is_filler && !cell.is_header)
        .and_then(|cell| cell_number(&cell.text))
}

impl AuditRule for TableTotalsRule {
    fn id(&self) -> RuleId {
        RuleId::R4
    }

    fn check_table(&self, view: &TableView<'_>, _ctx: &ReviewContext) -> Result<Vec<Finding>, RuleError> {
        // Malformed tables are reported by the completeness rule
        let Ok(grid) = view.grid else {
            return Ok(Vec::new());
        };

        let total_rows = grid.total_rows(&self.locale);
        let total_columns = grid.total_columns(&self.locale);
        let mut findings = Vec::new();

        for &row in &total_rows {
            let mismatches = self.check_total_row(grid, row, &total_rows);
            if !mismatches.is_empty() {
                findings.push(self.mismatch_finding(view, grid, TotalLine::Row(row), mismatches));
            }
        }
        for &column in &total_columns {
            let mismatches = self.check_total_column(grid, column, &total_columns);
            if !mismatches.is_empty() {
                findings.push(self.mismatch_finding(view, grid, TotalLine::Column(column), mismatches));
            }
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::extract::SectionExtractor;
    use crate::rules::RuleEngine;

    fn r4(table: ExtractedTable) -> Vec<Finding> {
        RuleEngine::with_defaults()
            .unwrap()
            .evaluate(
                &ExtractedSection::new("").with_table(table),
                &ReviewContext::new(2024, 2023),
            )
            .into_iter()
            .filter(|f| f.rule == RuleId::R4)
            .collect()
    }

    #[test]
    fn total_row_mismatch_fails_with_computed_sum() {
        let table = ExtractedTable::from_rows([
            ["Campus", "Students"],
            ["A", "40"],
            ["B", "30"],
            ["Total", "100"],
        ]);
        let findings = r4(table);
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.check, "total_mismatch");
        assert_eq!(finding.severity, Severity::Fail);
        assert!(finding.message.contains("declared 100, computed 70"));
        assert_eq!(finding.evidence["mismatches"][0]["position"], "Students");
        assert_eq!(finding.evidence["mismatches"][0]["computed"], 70.0);
        assert_eq!(finding.evidence_str("location"), Some("table[0] row 3"));
    }

    #[test]
    fn locale_formatted_totals_within_tolerance_pass() {
        let table = ExtractedTable::from_rows([
            ["Campus", "Students", "Share"],
            ["A", "1.200", "33,3"],
            ["B", "2.400", "66,6"],
            ["Total", "3.600", "100"],
        ]);
        let findings = r4(table);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Pass);
    }

    #[test]
    fn one_percent_relative_difference_is_accepted() {
        let table = ExtractedTable::from_rows([["Unit", "Value"], ["A", "50"], ["B", "49"], ["Total", "100"]]);
        assert_eq!(r4(table)[0].severity, Severity::Pass);
    }

    #[test]
    fn total_column_is_checked_row_by_row() {
        let table = ExtractedTable::from_rows([
            ["Campus", "Men", "Women", "Total"],
            ["A", "10", "15", "25"],
            ["B", "5", "5", "12"],
        ]);
        let findings = r4(table);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].evidence_str("line"), Some("column"));
        assert_eq!(findings[0].evidence["mismatches"][0]["position"], "B");
    }

    #[test]
    fn too_few_components_or_unparseable_total_is_skipped() {
        let single = ExtractedTable::from_rows([["Campus", "Students"], ["A", "40"], ["Total", "99"]]);
        assert_eq!(r4(single)[0].severity, Severity::Pass);

        let marker = ExtractedTable::from_rows([
            ["Campus", "Students"],
            ["A", "40"],
            ["B", "30"],
            ["Total", "ND"],
        ]);
        assert_eq!(r4(marker)[0].severity, Severity::Pass);
    }

    #[test]
    fn headerless_rows_still_sum_every_component() {
        let table = ExtractedTable::from_rows([["A", "40"], ["B", "30"], ["Total", "100"]]);
        let findings = r4(table);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].check, "total_mismatch");
        assert_eq!(findings[0].evidence["mismatches"][0]["computed"], 70.0);
    }

    #[test]
    fn td_only_page_table_is_checked() {
        let section = SectionExtractor::new(&ExtractionConfig::default()).extract(
            "<html><body><h2 id='t'>Students</h2><table>\
             <tr><td>A</td><td>40</td></tr><tr><td>B</td><td>30</td></tr>\
             <tr><td>Total</td><td>100</td></tr></table><p>Source: DPO</p></body></html>",
            Some("t"),
        );
        let findings = RuleEngine::with_defaults()
            .unwrap()
            .evaluate(&section, &ReviewContext::new(2024, 2023));
        let fails: Vec<_> = findings
            .iter()
            .filter(|f| f.rule == RuleId::R4 && f.severity == Severity::Fail)
            .collect();
        assert_eq!(fails.len(), 1);
        assert_eq!(fails[0].check, "total_mismatch");
    }

    #[test]
    fn total_row_drawn_with_th_cells_is_checked() {
        let table = ExtractedTable::from_html(
            "<table><tr><th>Campus</th><th>Students</th></tr>\
             <tr><td>A</td><td>40</td></tr><tr><td>B</td><td>30</td></tr>\
             <tr><th>Total</th><th>100</th></tr></table>",
        );
        let findings = r4(table);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].check, "total_mismatch");
        assert_eq!(findings[0].evidence_str("location"), Some("table[0] row 3"));
    }

    #[test]
    fn every_total_line_reports_separately() {
        let table = ExtractedTable::from_rows([
            ["Campus", "2022", "2023", "Total"],
            ["A", "1", "2", "3"],
            ["B", "1", "2", "9"],
            ["Total", "5", "4", "12"],
        ]);
        let findings = r4(table);
        let lines: Vec<_> = findings.iter().filter_map(|f| f.evidence_str("line")).collect();
        assert_eq!(lines, vec!["row", "column"]);
    }
}
