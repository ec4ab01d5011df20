use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::extract::{DefaultPageSource, PageSource, SectionExtractor, TocExtractor};
use crate::report::{self, ReportData, ReportFormat};
use crate::rules::RuleEngine;
use crate::storage::{calculate_config_hash, calculate_content_hash, AuditStorage, FileStorage};
use crate::types::*;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Fields a reviewer fills in for one section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualReviewInput {
    #[serde(default)]
    pub items_checked: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub reviewer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub section_id: SectionId,
    pub url: String,
    pub error: String,
}

/// Outcome of checking every page of a review
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAllSummary {
    pub pages_checked: usize,
    pub pages_failed: usize,
    pub pass: usize,
    pub warn: usize,
    pub fail: usize,
    pub failures: Vec<PageFailure>,
}

impl RunAllSummary {
    fn record(&mut self, run: &CheckRun) {
        self.pages_checked += 1;
        self.pass += run.count(Severity::Pass);
        self.warn += run.count(Severity::Warn);
        self.fail += run.count(Severity::Fail);
    }

    pub fn total_findings(&self) -> usize {
        self.pass + self.warn + self.fail
    }
}

/// Drives reviews end to end: TOC discovery, section checks, manual review
/// and report export. Fetching and persistence are injected.
pub struct Auditor {
    source: Box<dyn PageSource>,
    storage: Box<dyn AuditStorage + Send + Sync>,
    engine: RuleEngine,
    extractor: SectionExtractor,
    config: AuditConfig,
    config_hash: String,
}

impl Auditor {
    /// Create Auditor with full dependency injection
    pub fn new_with_dependencies(
        source: Box<dyn PageSource>,
        storage: Box<dyn AuditStorage + Send + Sync>,
        config: AuditConfig,
    ) -> Result<Self> {
        Ok(Self {
            source,
            storage,
            engine: RuleEngine::new(&config)?,
            extractor: SectionExtractor::new(&config.extraction),
            config_hash: calculate_config_hash(&config)?,
            config,
        })
    }

    /// Convenience constructor for CLI usage: live or file fetching, JSON
    /// files under the configured data directory
    pub fn new_cli(config: AuditConfig) -> Result<Self> {
        let source = Box::new(DefaultPageSource::new(&config.fetch));
        let storage = Box::new(FileStorage::new(&config.storage.data_dir)?);
        Self::new_with_dependencies(source, storage, config)
    }

    /// Stores a new review and discovers its sections from the start page.
    /// A start page that cannot be read leaves the review without sections.
    pub fn create_review(&self, start_url: &str, report_year: i32, base_year: i32) -> Result<Review> {
        let start_url = start_url.trim();
        if self.storage.find_review_by_url(start_url)?.is_some() {
            return Err(AuditError::DuplicateReview(start_url.to_string()).into());
        }

        let review = Review::new(start_url, report_year, base_year);
        self.storage.store_review(&review)?;
        tracing::info!(review_id = %review.id, start_url, "created review");

        match self.discover_sections(&review) {
            Ok(sections) => {
                self.storage.store_sections(&review.id, &sections)?;
                tracing::info!(review_id = %review.id, sections = sections.len(), "stored sections");
            }
            Err(e) => {
                tracing::warn!(review_id = %review.id, error = %format!("{e:#}"), "table of contents extraction failed");
            }
        }
        Ok(review)
    }

    fn discover_sections(&self, review: &Review) -> Result<Vec<SectionRecord>> {
        let toc = TocExtractor::new(&review.start_url)?;
        let html = self
            .source
            .fetch(&review.start_url)
            .with_context(|| format!("failed to fetch start page via {} source", self.source.name()))?;

        let sections = toc
            .extract(&html)
            .into_iter()
            .zip(1..)
            .map(|(entry, id)| SectionRecord {
                id,
                review_id: review.id,
                title: entry.title,
                url: entry.url,
                anchor: entry.anchor,
                level: entry.level,
                is_virtual: false,
            })
            .collect();
        Ok(sections)
    }

    pub fn get_review(&self, review_id: &ReviewId) -> Result<Review> {
        self.storage
            .get_review(review_id)?
            .ok_or_else(|| AuditError::ReviewNotFound(*review_id).into())
    }

    pub fn list_sections(&self, review_id: &ReviewId) -> Result<Vec<SectionRecord>> {
        self.get_review(review_id)?;
        self.storage.list_sections(review_id)
    }

    fn get_section(&self, review_id: &ReviewId, section_id: SectionId) -> Result<SectionRecord> {
        self.list_sections(review_id)?
            .into_iter()
            .find(|section| section.id == section_id)
            .ok_or_else(|| {
                AuditError::SectionNotFound {
                    review_id: *review_id,
                    section_id,
                }
                .into()
            })
    }

    /// Checks the anchored block of one section and replaces its stored run
    pub fn run_section_checks(&self, review_id: &ReviewId, section_id: SectionId) -> Result<CheckRun> {
        let review = self.get_review(review_id)?;
        let section = self.get_section(review_id, section_id)?;
        let run = self.check_page(&review, &section, CheckMode::Section)?;
        tracing::info!(
            review_id = %review.id,
            section_id,
            findings = run.findings.len(),
            "section checks complete"
        );
        Ok(run)
    }

    /// Latest stored run of a section
    pub fn section_results(&self, review_id: &ReviewId, section_id: SectionId) -> Result<CheckRun> {
        self.get_section(review_id, section_id)?;
        self.storage
            .get_check_run(review_id, section_id)?
            .ok_or_else(|| {
                AuditError::NoResults {
                    review_id: *review_id,
                    section_id,
                }
                .into()
            })
    }

    /// Checks each distinct page of the review once, whole-page, up to
    /// `max_pages` (the configured limit when `None`). Failing pages are
    /// logged and skipped.
    pub fn run_all(&self, review_id: &ReviewId, max_pages: Option<usize>) -> Result<RunAllSummary> {
        let review = self.get_review(review_id)?;
        let limit = max_pages.unwrap_or(self.config.fetch.max_pages);

        let mut seen = HashSet::new();
        let pages: Vec<SectionRecord> = self
            .storage
            .list_sections(review_id)?
            .into_iter()
            .filter(|section| !section.is_virtual)
            .filter(|section| seen.insert(section.url.clone()))
            .take(limit)
            .collect();

        tracing::info!(review_id = %review.id, pages = pages.len(), "starting run-all");
        let mut summary = RunAllSummary::default();
        for (index, section) in pages.iter().enumerate() {
            tracing::info!("checking page {}/{}: {}", index + 1, pages.len(), section.url);
            match self.check_page(&review, section, CheckMode::Page) {
                Ok(run) => summary.record(&run),
                Err(e) => {
                    tracing::warn!(url = %section.url, error = %format!("{e:#}"), "page check failed");
                    summary.pages_failed += 1;
                    summary.failures.push(PageFailure {
                        section_id: section.id,
                        url: section.url.clone(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }
        tracing::info!(
            review_id = %review.id,
            checked = summary.pages_checked,
            failed = summary.pages_failed,
            "run-all complete"
        );
        Ok(summary)
    }

    fn check_page(&self, review: &Review, section: &SectionRecord, mode: CheckMode) -> Result<CheckRun> {
        let anchor = match mode {
            CheckMode::Section => section.anchor.as_deref(),
            CheckMode::Page => None,
        };

        let started_at = Utc::now();
        let (extracted, html) = self
            .extractor
            .fetch_and_extract(self.source.as_ref(), &section.url, anchor)
            .map_err(|e| AuditError::Extraction {
                url: section.url.clone(),
                message: format!("{e:#}"),
            })?;
        let findings = self.engine.evaluate(&extracted, &review.context());

        let run = CheckRun {
            id: Uuid::new_v4(),
            review_id: review.id,
            section_id: section.id,
            mode,
            started_at,
            finished_at: Utc::now(),
            content_hash: calculate_content_hash(&html),
            config_hash: self.config_hash.clone(),
            findings,
        };
        self.storage.store_check_run(&run)?;
        Ok(run)
    }

    /// Creates or replaces the manual review of a section
    pub fn save_manual_review(
        &self,
        review_id: &ReviewId,
        section_id: SectionId,
        input: ManualReviewInput,
    ) -> Result<ManualReview> {
        self.get_section(review_id, section_id)?;
        let manual = ManualReview {
            review_id: *review_id,
            section_id,
            items_checked: input.items_checked,
            comments: input.comments,
            reviewer: input.reviewer,
            updated_at: Utc::now(),
        };
        self.storage.store_manual_review(&manual)?;
        tracing::info!(review_id = %review_id, section_id, "saved manual review");
        Ok(manual)
    }

    pub fn manual_review(&self, review_id: &ReviewId, section_id: SectionId) -> Result<Option<ManualReview>> {
        self.get_section(review_id, section_id)?;
        self.storage.get_manual_review(review_id, section_id)
    }

    /// Renders the review report into the exports directory
    pub fn export_report(&self, review_id: &ReviewId, format: ReportFormat) -> Result<PathBuf> {
        let data = ReportData::collect(self.storage.as_ref(), review_id)?;
        let now = Utc::now();
        let body = report::render(&data, format, now)?;

        let exports_dir = Path::new(&self.config.storage.exports_dir);
        fs::create_dir_all(exports_dir)
            .with_context(|| format!("failed to create exports dir {}", exports_dir.display()))?;
        let path = exports_dir.join(report::file_name(review_id, format, now));
        fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;

        tracing::info!(review_id = %review_id, path = %path.display(), "exported report");
        Ok(path)
    }

    /// One-shot audit of a page already in hand. Touches neither the page
    /// source nor storage.
    pub fn audit_html(
        &self,
        html: &str,
        source_url: &str,
        anchor: Option<&str>,
        ctx: &ReviewContext,
    ) -> Vec<Finding> {
        let section = self.extractor.extract(html, anchor).with_source(source_url, anchor);
        self.engine.evaluate(&section, ctx)
    }
}
