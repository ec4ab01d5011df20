use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use yearbook_audit_cli::logging;
use yearbook_audit_core::{
    AuditConfig, Auditor, CheckRun, ConfigOrigin, FilePageSource, Finding, ManualReviewInput, MemoryStorage, ReportFormat,
    ReviewContext, RunAllSummary, SectionId, Severity,
};

#[derive(Parser)]
#[command(name = "yearbook-audit")]
#[command(about = "Audits statistical yearbook pages for year, number, source and total consistency")]
struct Args {
    /// Path to custom config file (YAML format)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Directory for stored reviews (overrides storage.data_dir)
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or inspect reviews
    Review {
        #[command(subcommand)]
        command: ReviewCommand,
    },

    /// List the sections discovered for a review
    Sections { review: Uuid },

    /// Run the checks for one section
    Check { review: Uuid, section: SectionId },

    /// Show the latest stored results of a section
    Results { review: Uuid, section: SectionId },

    /// Check every distinct page of a review
    RunAll {
        review: Uuid,

        /// Maximum number of pages to check (default from config)
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Record a manual review for a section
    Manual {
        review: Uuid,
        section: SectionId,

        #[arg(long)]
        reviewer: Option<String>,

        #[arg(long)]
        comments: Option<String>,

        /// Checklist item as key=value; JSON values (true, 3) are kept typed
        #[arg(long = "item", value_parser = parse_item)]
        items: Vec<(String, serde_json::Value)>,
    },

    /// Write the review report into the exports directory
    Export {
        review: Uuid,

        /// Report format: html, json or pdf
        #[arg(short, long, default_value = "html")]
        format: ReportFormat,
    },

    /// Audit a local HTML file without storing anything. Exits non-zero on FAIL findings.
    AuditFile {
        html: String,

        /// Only audit the block starting at this element id
        #[arg(long)]
        anchor: Option<String>,

        #[arg(long)]
        report_year: i32,

        #[arg(long)]
        base_year: i32,
    },
}

#[derive(Subcommand)]
enum ReviewCommand {
    /// Create a review and discover its sections from the start page
    Create {
        #[arg(long)]
        url: String,

        #[arg(long)]
        report_year: i32,

        #[arg(long)]
        base_year: i32,
    },

    /// Show a stored review
    Show { review: Uuid },
}

fn parse_item(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    let value = serde_json::from_str(value.trim())
        .unwrap_or_else(|_| serde_json::Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}

fn config_message(origin: ConfigOrigin, path: &str) -> String {
    match origin {
        ConfigOrigin::File => format!("📋 Loaded config from: {path}"),
        ConfigOrigin::Fallback => format!("⚠️  Could not load config from {path}, using defaults"),
        ConfigOrigin::Defaults => "📋 Using default config".to_string(),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    if let Err(e) = logging::init() {
        eprintln!("⚠️  Could not initialize logging: {e}");
    }

    println!("📚 Yearbook Audit");

    let (mut config, origin) = AuditConfig::load_with_fallback(args.config.as_deref());
    println!("{}", config_message(origin, args.config.as_deref().unwrap_or_default()));
    if let Some(data_dir) = &args.data_dir {
        config.storage.data_dir = data_dir.clone();
    }

    match run(args.command, config) {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("❌ {e:#}");
            std::process::exit(1);
        }
    }
}

/// Runs one command; `Ok(false)` means it completed but found failures
fn run(command: Command, config: AuditConfig) -> Result<bool> {
    // Opening the auditor creates the data directory, so one-shot audits skip it
    let open = || {
        tracing::debug!(data_dir = %config.storage.data_dir, "opening review storage");
        Auditor::new_cli(config.clone())
    };

    match command {
        Command::AuditFile {
            html,
            anchor,
            report_year,
            base_year,
        } => {
            let ctx = ReviewContext::new(report_year, base_year);
            return audit_file(&html, anchor.as_deref(), ctx, config.clone());
        }
        Command::Review { command } => match command {
            ReviewCommand::Create {
                url,
                report_year,
                base_year,
            } => {
                println!("🔎 Creating review for: {url}");
                let auditor = open()?;
                let review = auditor.create_review(&url, report_year, base_year)?;
                let sections = auditor.list_sections(&review.id)?;
                println!("✅ Review created: {}", review.id);
                println!("   - Report year: {}", review.report_year);
                println!("   - Base year: {}", review.base_year);
                println!("   - Sections discovered: {}", sections.len());
                if sections.is_empty() {
                    println!("⚠️  No sections found; check the start URL or run with RUST_LOG=debug");
                }
            }
            ReviewCommand::Show { review } => {
                let auditor = open()?;
                let review = auditor.get_review(&review)?;
                let sections = auditor.list_sections(&review.id)?;
                println!("📄 Review {}", review.id);
                println!("   - Start URL: {}", review.start_url);
                println!("   - Report year: {}", review.report_year);
                println!("   - Base year: {}", review.base_year);
                println!("   - Created: {}", review.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
                println!("   - Sections: {}", sections.len());
            }
        },
        Command::Sections { review } => {
            let sections = open()?.list_sections(&review)?;
            println!("📑 {} section(s)", sections.len());
            for section in sections {
                let indent = "  ".repeat(section.level.saturating_sub(1) as usize);
                let anchor = section
                    .anchor
                    .as_deref()
                    .map(|anchor| format!("#{anchor}"))
                    .unwrap_or_default();
                println!("{:>4}  {indent}{}  ({}{anchor})", section.id, section.title, section.url);
            }
        }
        Command::Check { review, section } => {
            println!("🔍 Checking section {section}");
            let run = open()?.run_section_checks(&review, section)?;
            print_run(&run);
        }
        Command::Results { review, section } => {
            let run = open()?.section_results(&review, section)?;
            print_run(&run);
        }
        Command::RunAll { review, max_pages } => {
            println!("🔍 Checking all pages of review {review}");
            let summary = open()?.run_all(&review, max_pages)?;
            print_summary(&summary);
        }
        Command::Manual {
            review,
            section,
            reviewer,
            comments,
            items,
        } => {
            let input = ManualReviewInput {
                items_checked: items.into_iter().collect::<BTreeMap<_, _>>(),
                comments,
                reviewer,
            };
            let manual = open()?.save_manual_review(&review, section, input)?;
            println!(
                "✅ Manual review saved for section {} ({} item(s))",
                manual.section_id,
                manual.items_checked.len()
            );
        }
        Command::Export { review, format } => {
            let path = open()?.export_report(&review, format)?;
            println!("💾 Report written to: {}", path.display());
        }
    }
    Ok(true)
}

fn audit_file(path: &str, anchor: Option<&str>, ctx: ReviewContext, config: AuditConfig) -> Result<bool> {
    println!("📄 Auditing: {path}");
    let html = std::fs::read_to_string(Path::new(path)).with_context(|| format!("failed to read {path}"))?;
    let auditor = Auditor::new_with_dependencies(Box::new(FilePageSource::new()), Box::new(MemoryStorage::new()), config)?;

    let findings = auditor.audit_html(&html, path, anchor, &ctx);
    print_findings(&findings);
    Ok(!findings.iter().any(|finding| finding.severity == Severity::Fail))
}

fn print_run(run: &CheckRun) {
    println!(
        "📊 {} check of section {} finished {} (worst: {})",
        run.mode,
        run.section_id,
        run.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
        run.worst_severity()
    );
    print_findings(&run.findings);
}

fn print_findings(findings: &[Finding]) {
    for finding in findings {
        let icon = match finding.severity {
            Severity::Pass => "✅",
            Severity::Warn => "⚠️ ",
            Severity::Fail => "❌",
        };
        println!("{icon} [{}] {} {}: {}", finding.severity, finding.rule, finding.check, finding.message);
        if let Some(snippet) = finding.evidence_str("snippet").filter(|s| !s.is_empty()) {
            println!("      {snippet}");
        }
    }

    let count = |severity: Severity| findings.iter().filter(|f| f.severity == severity).count();
    println!(
        "📊 PASS: {}  WARN: {}  FAIL: {}",
        count(Severity::Pass),
        count(Severity::Warn),
        count(Severity::Fail)
    );
}

fn print_summary(summary: &RunAllSummary) {
    println!("✅ Checked {} page(s)", summary.pages_checked);
    if summary.pages_failed > 0 {
        println!("⚠️  {} page(s) could not be checked:", summary.pages_failed);
        for failure in &summary.failures {
            println!("   - {} (section {}): {}", failure.url, failure.section_id, failure.error);
        }
    }
    println!("📊 Findings:");
    println!("   - PASS: {}", summary.pass);
    println!("   - WARN: {}", summary.warn);
    println!("   - FAIL: {}", summary.fail);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_keep_json_types() {
        assert_eq!(parse_item("charts=true").unwrap(), ("charts".to_string(), serde_json::json!(true)));
        assert_eq!(parse_item("pages = 12").unwrap(), ("pages".to_string(), serde_json::json!(12)));
        assert_eq!(
            parse_item("note=looks good").unwrap(),
            ("note".to_string(), serde_json::json!("looks good"))
        );
        assert!(parse_item("novalue").is_err());
        assert!(parse_item("=x").is_err());
    }

    #[test]
    fn config_message_follows_what_was_loaded() {
        assert!(config_message(ConfigOrigin::File, "audit.yaml").starts_with("📋 Loaded config from: audit.yaml"));
        let fallback = config_message(ConfigOrigin::Fallback, "missing.yaml");
        assert!(fallback.contains("Could not load config from missing.yaml"));
        assert!(!fallback.contains("Loaded"));
        assert_eq!(config_message(ConfigOrigin::Defaults, ""), "📋 Using default config");
    }

    #[test]
    fn arguments_parse() {
        let args = Args::try_parse_from([
            "yearbook-audit",
            "--data-dir",
            "/tmp/audit",
            "manual",
            "6f9619ff-8b86-4d11-b42d-00c04fc964ff",
            "3",
            "--item",
            "charts=true",
            "--item",
            "tables=false",
        ])
        .unwrap();
        assert_eq!(args.data_dir.as_deref(), Some("/tmp/audit"));
        match args.command {
            Command::Manual { section, items, .. } => {
                assert_eq!(section, 3);
                assert_eq!(items.len(), 2);
            }
            _ => panic!("expected manual command"),
        }

        assert!(Args::try_parse_from(["yearbook-audit", "export", "not-a-uuid"]).is_err());
        assert!(Args::try_parse_from([
            "yearbook-audit",
            "export",
            "6f9619ff-8b86-4d11-b42d-00c04fc964ff",
            "--format",
            "docx"
        ])
        .is_err());
    }
}
