use crate::types::RuleId;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_yearbook_keywords() -> Vec<String> {
    vec![
        "Statistical Yearbook".to_string(),
        "Yearbook".to_string(),
        "Anuário Estatístico".to_string(),
        "Anuário".to_string(),
    ]
}

fn default_range_connectors() -> Vec<String> {
    vec![
        "to".to_string(),
        "a".to_string(),
        "até".to_string(),
        "-".to_string(),
        "–".to_string(),
    ]
}

fn default_source_markers() -> Vec<String> {
    vec!["Source:".to_string(), "Fonte:".to_string()]
}

fn default_not_available_markers() -> Vec<String> {
    vec!["ND".to_string(), "N/D".to_string(), "N/A".to_string()]
}

fn default_total_labels() -> Vec<String> {
    vec![
        "Total".to_string(),
        "Grand Total".to_string(),
        "Total Geral".to_string(),
    ]
}

fn default_relative_tolerance() -> f64 {
    0.01
}

fn default_absolute_tolerance() -> f64 {
    0.01
}

fn default_max_note_siblings() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
        .to_string()
}

fn default_max_pages() -> usize {
    50
}

fn default_data_dir() -> String {
    "audit_data".to_string()
}

fn default_exports_dir() -> String {
    "exports".to_string()
}

/// Top-level audit configuration, loaded from YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Localized vocabulary the rules match against
    #[serde(default)]
    pub locale: LocaleConfig,
    /// Allowed drift between a declared total and the computed sum
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    /// Pipeline configuration - defines which rules run
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocaleConfig {
    /// Phrases introducing the yearbook's own year, e.g. "Statistical Yearbook 2024"
    #[serde(default = "default_yearbook_keywords")]
    pub yearbook_keywords: Vec<String>,
    /// Words or dashes joining the two years of a series range
    #[serde(default = "default_range_connectors")]
    pub range_connectors: Vec<String>,
    /// Caption or note prefixes that cite a table's source
    #[serde(default = "default_source_markers")]
    pub source_markers: Vec<String>,
    /// Cell values meaning "not available"
    #[serde(default = "default_not_available_markers")]
    pub not_available_markers: Vec<String>,
    /// Labels identifying total rows and columns
    #[serde(default = "default_total_labels")]
    pub total_labels: Vec<String>,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            yearbook_keywords: default_yearbook_keywords(),
            range_connectors: default_range_connectors(),
            source_markers: default_source_markers(),
            not_available_markers: default_not_available_markers(),
            total_labels: default_total_labels(),
        }
    }
}

impl LocaleConfig {
    pub fn is_total_label(&self, text: &str) -> bool {
        let text = text.trim().trim_end_matches(':').trim();
        !text.is_empty()
            && self
                .total_labels
                .iter()
                .any(|label| label.trim().to_lowercase() == text.to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceConfig {
    /// Fraction of the declared total
    #[serde(default = "default_relative_tolerance")]
    pub relative: f64,
    /// Floor applied when the relative bound is smaller
    #[serde(default = "default_absolute_tolerance")]
    pub absolute: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            relative: default_relative_tolerance(),
            absolute: default_absolute_tolerance(),
        }
    }
}

impl ToleranceConfig {
    pub fn allowed(&self, declared: f64) -> f64 {
        (self.relative * declared.abs()).max(self.absolute)
    }

    /// Inclusive at the boundary
    pub fn accepts(&self, declared: f64, computed: f64) -> bool {
        (declared - computed).abs() <= self.allowed(declared) + f64::EPSILON * declared.abs().max(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Rules to run; output order is always R1..R6
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Rule code (`R4`) or slug (`table_totals`)
    pub name: String,
    /// Whether this rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rules: RuleId::ALL
                .into_iter()
                .map(|rule| RuleConfig {
                    name: rule.code().to_string(),
                    enabled: true,
                })
                .collect(),
        }
    }
}

impl PipelineConfig {
    pub fn is_enabled(&self, rule: RuleId) -> bool {
        self.rules
            .iter()
            .any(|config| config.enabled && RuleId::from_name(&config.name) == Some(rule))
    }

    pub fn enabled_rules(&self) -> Vec<RuleId> {
        RuleId::ALL
            .into_iter()
            .filter(|rule| self.is_enabled(*rule))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// How many siblings after a table are read for notes
    #[serde(default = "default_max_note_siblings")]
    pub max_note_siblings: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_note_siblings: default_max_note_siblings(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Upper bound on distinct pages visited by run-all
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            max_pages: default_max_pages(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_exports_dir")]
    pub exports_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            exports_dir: default_exports_dir(),
        }
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    Defaults,
    File,
    /// A file was given but could not be loaded
    Fallback,
}

impl AuditConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: AuditConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Falls back to built-in defaults when no path is given or loading fails
    pub fn load_with_fallback(path: Option<&str>) -> (Self, ConfigOrigin) {
        match path {
            Some(path) => match Self::load_from_file(path) {
                Ok(config) => {
                    tracing::info!(path, "loaded audit config");
                    (config, ConfigOrigin::File)
                }
                Err(e) => {
                    tracing::warn!(path, error = %e, "could not load config, using defaults");
                    (Self::default(), ConfigOrigin::Fallback)
                }
            },
            None => (Self::default(), ConfigOrigin::Defaults),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ToleranceConfig { relative, absolute } = self.tolerance;
        if relative.is_nan() || absolute.is_nan() || relative < 0.0 || absolute < 0.0 {
            bail!("tolerance values must be non-negative");
        }
        for rule in &self.pipeline.rules {
            if RuleId::from_name(&rule.name).is_none() {
                bail!("unknown rule in pipeline: {}", rule.name);
            }
        }
        if self.locale.yearbook_keywords.iter().all(|k| k.trim().is_empty()) {
            bail!("at least one yearbook keyword is required");
        }
        Ok(())
    }
}
