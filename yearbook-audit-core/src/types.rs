use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

pub type ReviewId = Uuid;
pub type SectionId = u32;

/// Evidence attached to a finding. Keys are kept sorted so serialized output is stable.
pub type Evidence = BTreeMap<String, serde_json::Value>;

// ===== REVIEW PARAMETERS =====

/// Per-audit parameters, supplied once and never mutated during checking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewContext {
    /// Year the yearbook is published as (e.g. "Statistical Yearbook 2024")
    pub report_year: i32,
    /// Most recent year the statistics cover
    pub base_year: i32,
}

impl ReviewContext {
    pub fn new(report_year: i32, base_year: i32) -> Self {
        Self {
            report_year,
            base_year,
        }
    }
}

// ===== EXTRACTED CONTENT =====

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
}

/// Plain text and tables of one page or anchored section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSection {
    pub text: String,
    pub tables: Vec<ExtractedTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SectionSource>,
}

impl ExtractedSection {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tables: Vec::new(),
            source: None,
        }
    }

    pub fn with_table(mut self, table: ExtractedTable) -> Self {
        self.tables.push(table);
        self
    }

    pub fn with_source(mut self, url: impl Into<String>, anchor: Option<&str>) -> Self {
        self.source = Some(SectionSource {
            url: url.into(),
            anchor: anchor.map(str::to_string),
        });
        self
    }
}

/// A table as found on the page. Rows may be ragged; `raw_html` is the parse
/// fallback when `rows` is empty and the input for emphasis checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTable {
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub raw_html: String,
}

impl ExtractedTable {
    pub fn from_rows<I, R, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
            ..Self::default()
        }
    }

    pub fn from_html(raw_html: impl Into<String>) -> Self {
        Self {
            raw_html: raw_html.into(),
            ..Self::default()
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_raw_html(mut self, raw_html: impl Into<String>) -> Self {
        self.raw_html = raw_html.into();
        self
    }
}

// ===== FINDINGS =====

/// Ordered so that sorting puts the most severe findings last
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Pass,
    Warn,
    Fail,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Pass, Severity::Warn, Severity::Fail];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Pass => "PASS",
            Severity::Warn => "WARN",
            Severity::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RuleId {
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
}

impl RuleId {
    pub const ALL: [RuleId; 6] = [
        RuleId::R1,
        RuleId::R2,
        RuleId::R3,
        RuleId::R4,
        RuleId::R5,
        RuleId::R6,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            RuleId::R1 => "R1",
            RuleId::R2 => "R2",
            RuleId::R3 => "R3",
            RuleId::R4 => "R4",
            RuleId::R5 => "R5",
            RuleId::R6 => "R6",
        }
    }

    /// Config-friendly name, accepted alongside the short code
    pub fn slug(&self) -> &'static str {
        match self {
            RuleId::R1 => "year_consistency",
            RuleId::R2 => "decimal_separator",
            RuleId::R3 => "table_source",
            RuleId::R4 => "table_totals",
            RuleId::R5 => "table_completeness",
            RuleId::R6 => "total_emphasis",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            RuleId::R1 => "Year consistency",
            RuleId::R2 => "Decimal separator convention",
            RuleId::R3 => "Table source attribution",
            RuleId::R4 => "Table total arithmetic",
            RuleId::R5 => "Table completeness",
            RuleId::R6 => "Total row emphasis",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|rule| rule.code().eq_ignore_ascii_case(name) || rule.slug().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule: RuleId,
    /// Machine-readable sub-code, e.g. `wrong_year`
    pub check: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub evidence: Evidence,
}

impl Finding {
    pub fn new(
        rule: RuleId,
        check: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule,
            check: check.into(),
            severity,
            message: message.into(),
            evidence: Evidence::new(),
        }
    }

    pub fn pass(rule: RuleId, message: impl Into<String>) -> Self {
        Self::new(rule, "pass", Severity::Pass, message)
    }

    pub fn with_evidence(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.evidence.insert(key.to_string(), value.into());
        self
    }

    pub fn evidence_str(&self, key: &str) -> Option<&str> {
        self.evidence.get(key).and_then(|value| value.as_str())
    }
}

// ===== PERSISTENCE RECORDS =====

/// One audit of a yearbook site, keyed by its start URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub start_url: String,
    pub report_year: i32,
    pub base_year: i32,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(start_url: impl Into<String>, report_year: i32, base_year: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_url: start_url.into(),
            report_year,
            base_year,
            created_at: Utc::now(),
        }
    }

    pub fn context(&self) -> ReviewContext {
        ReviewContext::new(self.report_year, self.base_year)
    }
}

/// A link discovered in the table of contents, before it is numbered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub url: String,
    pub anchor: Option<String>,
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub id: SectionId,
    pub review_id: ReviewId,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub anchor: Option<String>,
    pub level: u32,
    #[serde(default)]
    pub is_virtual: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMode {
    /// Only the anchored block of the page
    Section,
    /// The whole page body
    Page,
}

impl fmt::Display for CheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckMode::Section => f.write_str("section"),
            CheckMode::Page => f.write_str("page"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRun {
    pub id: Uuid,
    pub review_id: ReviewId,
    pub section_id: SectionId,
    pub mode: CheckMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// SHA-256 of the fetched page
    pub content_hash: String,
    /// SHA-256 of the audit config the findings were produced with
    pub config_hash: String,
    pub findings: Vec<Finding>,
}

impl CheckRun {
    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|finding| finding.severity == severity)
            .count()
    }

    pub fn worst_severity(&self) -> Severity {
        self.findings
            .iter()
            .map(|finding| finding.severity)
            .max()
            .unwrap_or(Severity::Pass)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualReview {
    pub review_id: ReviewId,
    pub section_id: SectionId,
    #[serde(default)]
    pub items_checked: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub reviewer: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_pass_warn_fail() {
        assert!(Severity::Pass < Severity::Warn);
        assert!(Severity::Warn < Severity::Fail);

        let mut severities = vec![Severity::Fail, Severity::Pass, Severity::Warn];
        severities.sort();
        assert_eq!(severities, Severity::ALL.to_vec());
    }

    #[test]
    fn severity_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::Warn).unwrap();
        assert_eq!(json, "\"WARN\"");
        let back: Severity = serde_json::from_str("\"FAIL\"").unwrap();
        assert_eq!(back, Severity::Fail);
    }

    #[test]
    fn rule_id_accepts_code_and_slug() {
        assert_eq!(RuleId::from_name("r4"), Some(RuleId::R4));
        assert_eq!(RuleId::from_name("table_source"), Some(RuleId::R3));
        assert_eq!(RuleId::from_name("R9"), None);
    }

    #[test]
    fn check_run_worst_severity_defaults_to_pass() {
        let run = CheckRun {
            id: Uuid::new_v4(),
            review_id: Uuid::new_v4(),
            section_id: 1,
            mode: CheckMode::Page,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            content_hash: String::new(),
            config_hash: String::new(),
            findings: Vec::new(),
        };
        assert_eq!(run.worst_severity(), Severity::Pass);
    }
}
