use crate::config::{AuditConfig, LocaleConfig};
use crate::error::RuleError;
use crate::types::*;
use anyhow::Result;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use super::decimal_separator::DecimalSeparatorRule;
use super::table_completeness::TableCompletenessRule;
use super::table_grid::TableGrid;
use super::table_source::TableSourceRule;
use super::table_totals::TableTotalsRule;
use super::total_emphasis::TotalEmphasisRule;
use super::year_consistency::YearConsistencyRule;

const SNIPPET_RADIUS: usize = 40;
const PREVIEW_CHARS: usize = 200;

/// A table as seen by a rule: the extracted table plus its normalized grid,
/// or the reason the grid could not be built.
pub struct TableView<'a> {
    pub index: usize,
    pub table: &'a ExtractedTable,
    pub grid: Result<&'a TableGrid, &'a RuleError>,
}

impl TableView<'_> {
    pub fn location(&self) -> String {
        format!("table[{}]", self.index)
    }

    /// Caption when there is one, location otherwise
    pub fn label(&self) -> String {
        self.table
            .caption
            .as_deref()
            .map(str::trim)
            .filter(|caption| !caption.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.location())
    }
}

/// One audit rule. Text and table checks are called separately so a failure
/// in one table never hides findings from the others.
pub trait AuditRule: Send + Sync {
    fn id(&self) -> RuleId;

    fn check_text(&self, _text: &str, _ctx: &ReviewContext) -> Result<Vec<Finding>, RuleError> {
        Ok(Vec::new())
    }

    fn check_table(
        &self,
        _table: &TableView<'_>,
        _ctx: &ReviewContext,
    ) -> Result<Vec<Finding>, RuleError> {
        Ok(Vec::new())
    }

    /// Marker emitted when the rule ran and found nothing
    fn pass_finding(&self, section: &ExtractedSection) -> Finding {
        Finding::pass(
            self.id(),
            format!("{}: no issues detected", self.id().title()),
        )
        .with_evidence("snippet", "")
        .with_evidence("location", "section")
        .with_evidence("tables_checked", section.tables.len())
    }
}

pub struct RuleEngine {
    rules: Vec<Box<dyn AuditRule>>,
    /// Total labels for telling header rows from data rows
    locale: LocaleConfig,
}

impl RuleEngine {
    /// Builds the enabled rules from config, always in R1..R6 order
    pub fn new(config: &AuditConfig) -> Result<Self> {
        let mut rules: Vec<Box<dyn AuditRule>> = Vec::new();
        for rule in config.pipeline.enabled_rules() {
            let built: Box<dyn AuditRule> = match rule {
                RuleId::R1 => Box::new(YearConsistencyRule::new(&config.locale)?),
                RuleId::R2 => Box::new(DecimalSeparatorRule::new()),
                RuleId::R3 => Box::new(TableSourceRule::new(&config.locale)),
                RuleId::R4 => Box::new(TableTotalsRule::new(&config.locale, config.tolerance)),
                RuleId::R5 => Box::new(TableCompletenessRule::new(&config.locale)?),
                RuleId::R6 => Box::new(TotalEmphasisRule::new(&config.locale)),
            };
            rules.push(built);
        }
        tracing::debug!(rules = ?config.pipeline.enabled_rules(), "rule engine ready");
        Ok(Self {
            rules,
            locale: config.locale.clone(),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(&AuditConfig::default())
    }

    /// Engine over a custom rule set, evaluated in the given order
    pub fn with_rules(rules: Vec<Box<dyn AuditRule>>) -> Self {
        Self {
            rules,
            locale: LocaleConfig::default(),
        }
    }

    pub fn rule_ids(&self) -> Vec<RuleId> {
        self.rules.iter().map(|rule| rule.id()).collect()
    }

    /// Runs every rule over one section. Never fails: rule errors and panics
    /// come back as `rule_error` findings.
    pub fn evaluate(&self, section: &ExtractedSection, ctx: &ReviewContext) -> Vec<Finding> {
        let grids: Vec<Result<TableGrid, RuleError>> = section
            .tables
            .iter()
            .map(|table| isolate(|| TableGrid::build(table, &self.locale)))
            .collect();
        let views: Vec<TableView> = section
            .tables
            .iter()
            .zip(&grids)
            .enumerate()
            .map(|(index, (table, grid))| TableView {
                index,
                table,
                grid: grid.as_ref(),
            })
            .collect();

        let mut findings = Vec::new();
        for rule in &self.rules {
            let mut rule_findings = Vec::new();

            match isolate(|| rule.check_text(&section.text, ctx)) {
                Ok(found) => rule_findings.extend(found),
                Err(e) => rule_findings.push(error_finding(rule.id(), &e, "text")),
            }
            for view in &views {
                match isolate(|| rule.check_table(view, ctx)) {
                    Ok(found) => rule_findings.extend(found),
                    Err(e) => rule_findings.push(error_finding(rule.id(), &e, &view.location())),
                }
            }

            if rule_findings.is_empty() {
                rule_findings.push(rule.pass_finding(section));
            }
            tracing::trace!(rule = %rule.id(), count = rule_findings.len(), "rule evaluated");
            findings.extend(rule_findings);
        }

        if let Some(source) = &section.source {
            for finding in &mut findings {
                finding
                    .evidence
                    .insert("url".to_string(), source.url.clone().into());
                if let Some(anchor) = &source.anchor {
                    finding
                        .evidence
                        .insert("anchor".to_string(), anchor.clone().into());
                }
            }
        }

        findings
    }
}

fn isolate<T>(check: impl FnOnce() -> Result<T, RuleError>) -> Result<T, RuleError> {
    panic::catch_unwind(AssertUnwindSafe(check)).unwrap_or_else(|payload| {
        Err(RuleError::UnexpectedInternalError(panic_message(
            &*payload,
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "rule panicked".to_string()
    }
}

fn error_finding(rule: RuleId, error: &RuleError, location: &str) -> Finding {
    tracing::warn!(rule = %rule, location, error = %error, "rule failed");
    Finding::new(
        rule,
        "rule_error",
        Severity::Fail,
        format!("{} could not be evaluated: {error}", rule.title()),
    )
    .with_evidence("snippet", error.to_string())
    .with_evidence("location", location)
    .with_evidence("error_kind", error.kind())
    .with_evidence("error", error.to_string())
}

/// Text around a byte range, widened to char boundaries and flattened to one line
pub fn snippet_around(text: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(SNIPPET_RADIUS);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + SNIPPET_RADIUS).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    let snippet = text[from..to].split_whitespace().collect::<Vec<_>>().join(" ");
    match (from > 0, to < text.len()) {
        (true, true) => format!("...{snippet}..."),
        (true, false) => format!("...{snippet}"),
        (false, true) => format!("{snippet}..."),
        (false, false) => snippet,
    }
}

pub fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > PREVIEW_CHARS {
        let cut: String = flat.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

/// Rounds away float noise for messages and evidence
pub fn display_number(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    format!("{rounded}")
}
