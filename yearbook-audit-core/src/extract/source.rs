//! Page sources
//!
//! A `PageSource` fetches the raw HTML behind a URL. The auditor only ever
//! talks to this trait, so reviews can run against a live site, a local
//! mirror, or an in-memory fixture.

use crate::config::FetchConfig;
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub trait PageSource: Send + Sync {
    /// Fetch the page behind `url` as text
    fn fetch(&self, url: &str) -> Result<String>;

    /// Source identifier for logging
    fn name(&self) -> &str;
}

/// Blocking HTTP fetches with the configured timeout and user agent
pub struct HttpPageSource {
    agent: ureq::Agent,
}

impl HttpPageSource {
    pub fn new(config: &FetchConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build();
        Self { agent }
    }
}

impl PageSource for HttpPageSource {
    fn fetch(&self, url: &str) -> Result<String> {
        tracing::debug!(url, "fetching page");
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| anyhow!("GET {url} failed: {e}"))?;
        response
            .into_string()
            .with_context(|| format!("failed to read body of {url}"))
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Reads `file://` URLs and plain paths, relative ones under `root`
pub struct FilePageSource {
    root: Option<PathBuf>,
}

impl FilePageSource {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, url: &str) -> Result<PathBuf> {
        if url.starts_with("file:") {
            let parsed = Url::parse(url).with_context(|| format!("invalid file URL {url}"))?;
            return parsed
                .to_file_path()
                .map_err(|_| anyhow!("file URL {url} does not name a local path"));
        }
        let path = Path::new(url);
        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        })
    }
}

impl Default for FilePageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSource for FilePageSource {
    fn fetch(&self, url: &str) -> Result<String> {
        let path = self.resolve(url)?;
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Routes http(s) URLs to `HttpPageSource` and everything else to `FilePageSource`
pub struct DefaultPageSource {
    http: HttpPageSource,
    file: FilePageSource,
}

impl DefaultPageSource {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            http: HttpPageSource::new(config),
            file: FilePageSource::new(),
        }
    }
}

impl PageSource for DefaultPageSource {
    fn fetch(&self, url: &str) -> Result<String> {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            self.http.fetch(url)
        } else {
            self.file.fetch(url)
        }
    }

    fn name(&self) -> &str {
        "default"
    }
}

/// Fixed pages keyed by URL. Fragments are ignored on lookup.
#[derive(Debug, Default, Clone)]
pub struct MemoryPageSource {
    pages: HashMap<String, String>,
}

impl MemoryPageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }
}

impl PageSource for MemoryPageSource {
    fn fetch(&self, url: &str) -> Result<String> {
        let key = url.split('#').next().unwrap_or(url);
        self.pages
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("no page registered for {key}"))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
