//! Review reports
//!
//! `ReportData` gathers what a review currently looks like in storage: each
//! section with the findings of its latest run and its manual review. The
//! renderers turn that into a standalone HTML page or a JSON document.

use crate::error::AuditError;
use crate::storage::AuditStorage;
use crate::types::*;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use maud::{html, Markup, PreEscaped, DOCTYPE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Html,
    Json,
    Pdf,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
            ReportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ReportFormat {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(ReportFormat::Html),
            "json" => Ok(ReportFormat::Json),
            "pdf" => Ok(ReportFormat::Pdf),
            other => Err(AuditError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityStats {
    pub pass: usize,
    pub warn: usize,
    pub fail: usize,
    pub sections: usize,
}

impl SeverityStats {
    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Pass => self.pass += 1,
            Severity::Warn => self.warn += 1,
            Severity::Fail => self.fail += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionReport {
    pub id: SectionId,
    pub title: String,
    pub url: String,
    pub anchor: Option<String>,
    pub level: u32,
    /// Mode and finish time of the latest run, if the section was checked
    pub mode: Option<CheckMode>,
    pub checked_at: Option<DateTime<Utc>>,
    pub findings: Vec<Finding>,
    pub manual_review: Option<ManualReview>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub review: Review,
    pub stats: SeverityStats,
    pub sections: Vec<SectionReport>,
}

impl ReportData {
    pub fn collect(storage: &dyn AuditStorage, review_id: &ReviewId) -> Result<Self> {
        let review = storage
            .get_review(review_id)?
            .ok_or(AuditError::ReviewNotFound(*review_id))?;

        let mut stats = SeverityStats::default();
        let mut sections = Vec::new();
        for section in storage.list_sections(review_id)? {
            let run = storage.get_check_run(review_id, section.id)?;
            let manual_review = storage.get_manual_review(review_id, section.id)?;

            let mut findings = run.as_ref().map(|run| run.findings.clone()).unwrap_or_default();
            // Stable sort keeps rule output order within equal keys
            findings.sort_by(|a, b| a.rule.cmp(&b.rule).then(b.severity.cmp(&a.severity)));
            findings.iter().for_each(|finding| stats.add(finding.severity));

            sections.push(SectionReport {
                id: section.id,
                title: section.title,
                url: section.url,
                anchor: section.anchor,
                level: section.level,
                mode: run.as_ref().map(|run| run.mode),
                checked_at: run.as_ref().map(|run| run.finished_at),
                findings,
                manual_review,
            });
        }
        stats.sections = sections.len();

        Ok(Self {
            review,
            stats,
            sections,
        })
    }
}

/// `report_review_<id>_<YYYYmmdd_HHMMSS>.<ext>`
pub fn file_name(review_id: &ReviewId, format: ReportFormat, now: DateTime<Utc>) -> String {
    format!(
        "report_review_{}_{}.{}",
        review_id,
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

pub fn render(data: &ReportData, format: ReportFormat, generated_at: DateTime<Utc>) -> Result<String> {
    match format {
        ReportFormat::Html => Ok(render_html(data, generated_at)),
        ReportFormat::Json => render_json(data, generated_at),
        ReportFormat::Pdf => Err(AuditError::UnsupportedFormat("pdf".to_string()).into()),
    }
}

pub fn render_json(data: &ReportData, generated_at: DateTime<Utc>) -> Result<String> {
    let document = serde_json::json!({
        "generated_at": generated_at,
        "report": data,
    });
    serde_json::to_string_pretty(&document).map_err(|e| anyhow!("Failed to serialize report: {}", e))
}

const STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; margin: 0; background: #f4f5f7; color: #222; }
header { background: #1f3a5f; color: #fff; padding: 24px 32px; }
header h1 { margin: 0 0 8px 0; font-size: 24px; }
header p { margin: 2px 0; opacity: 0.85; }
main { padding: 24px 32px; }
.cards { display: flex; gap: 16px; margin-bottom: 24px; }
.card { flex: 1; background: #fff; border-radius: 6px; padding: 16px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }
.card .value { font-size: 28px; font-weight: bold; }
.card.pass .value { color: #2e7d32; }
.card.warn .value { color: #ef6c00; }
.card.fail .value { color: #c62828; }
.section { background: #fff; border-radius: 6px; padding: 16px 20px; margin-bottom: 16px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }
.section h2 { margin: 0 0 4px 0; font-size: 18px; }
.section .meta { color: #666; font-size: 13px; margin-bottom: 12px; }
.finding { border-left: 4px solid #999; padding: 8px 12px; margin: 8px 0; background: #fafafa; }
.finding.pass { border-color: #2e7d32; }
.finding.warn { border-color: #ef6c00; }
.finding.fail { border-color: #c62828; }
.badge { display: inline-block; font-size: 12px; font-weight: bold; padding: 2px 6px; border-radius: 3px; color: #fff; margin-right: 6px; }
.badge.pass { background: #2e7d32; }
.badge.warn { background: #ef6c00; }
.badge.fail { background: #c62828; }
pre { background: #f0f0f0; padding: 8px; overflow-x: auto; font-size: 12px; }
.empty { color: #2e7d32; font-style: italic; }
.manual { margin-top: 12px; padding: 8px 12px; background: #eef3fb; }
footer { text-align: center; color: #888; font-size: 12px; padding: 24px; }
"#;

const TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Self-contained HTML page; stored text goes through maud's escaping
pub fn render_html(data: &ReportData, generated_at: DateTime<Utc>) -> String {
    let review = &data.review;
    let stats = &data.stats;
    let generated = generated_at.format(TIMESTAMP).to_string();

    let page = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { "Audit report - " (review.start_url) }
                style { (PreEscaped(STYLE)) }
            }
            body {
                header {
                    h1 { "Yearbook audit report" }
                    p { "Start URL: " (review.start_url) }
                    p { "Report year: " (review.report_year) " | Base year: " (review.base_year) }
                    p { "Generated: " (generated) }
                }
                main {
                    div class="cards" {
                        (summary_card("", "Sections", stats.sections))
                        (summary_card("pass", "PASS", stats.pass))
                        (summary_card("warn", "WARN", stats.warn))
                        (summary_card("fail", "FAIL", stats.fail))
                    }
                    @for section in &data.sections {
                        (render_section(section))
                    }
                }
                footer { "Generated by yearbook-audit on " (generated) }
            }
        }
    };
    page.into_string()
}

fn summary_card(class: &str, label: &str, value: usize) -> Markup {
    html! {
        div class={ "card " (class) } {
            div class="label" { (label) }
            div class="value" { (value) }
        }
    }
}

fn render_section(section: &SectionReport) -> Markup {
    let location = match &section.anchor {
        Some(anchor) => format!("{}#{}", section.url, anchor),
        None => section.url.clone(),
    };
    let has_issues = section
        .findings
        .iter()
        .any(|finding| finding.severity != Severity::Pass);

    html! {
        div class="section" {
            h2 { (section.title) }
            div class="meta" {
                (location) " | level " (section.level)
                @if let (Some(mode), Some(checked_at)) = (section.mode, section.checked_at) {
                    " | " (mode.to_string()) " check at " (checked_at.format(TIMESTAMP).to_string())
                }
            }
            @if section.checked_at.is_none() {
                p class="meta" { "Not checked yet" }
            } @else if !has_issues {
                p class="empty" { "No issues detected" }
            }
            @for finding in &section.findings {
                (render_finding(finding))
            }
            @if let Some(manual) = &section.manual_review {
                (render_manual_review(manual))
            }
        }
    }
}

fn render_finding(finding: &Finding) -> Markup {
    let class = finding.severity.as_str().to_lowercase();
    let evidence = (!finding.evidence.is_empty())
        .then(|| serde_json::to_string_pretty(&finding.evidence).unwrap_or_default());

    html! {
        div class={ "finding " (class) } {
            span class={ "badge " (class) } { (finding.severity.to_string()) }
            strong { (finding.rule.to_string()) " " (finding.rule.title()) }
            " "
            code { (finding.check) }
            p { (finding.message) }
            @if let Some(evidence) = evidence {
                pre { (evidence) }
            }
        }
    }
}

fn render_manual_review(manual: &ManualReview) -> Markup {
    html! {
        div class="manual" {
            strong { "Manual review" }
            @if let Some(reviewer) = &manual.reviewer {
                " by " (reviewer)
            }
            " (" (manual.updated_at.format(TIMESTAMP).to_string()) ")"
            @if !manual.items_checked.is_empty() {
                ul {
                    @for (item, value) in &manual.items_checked {
                        li {
                            (item) ": "
                            @match value {
                                serde_json::Value::String(text) => { (text) }
                                other => { (other.to_string()) }
                            }
                        }
                    }
                }
            }
            @if let Some(comments) = &manual.comments {
                p { (comments) }
            }
        }
    }
}
