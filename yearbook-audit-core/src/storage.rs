use crate::types::*;
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persistence for reviews, their sections, the latest check run per
/// section, and manual reviews
pub trait AuditStorage {
    // Reviews
    fn get_review(&self, id: &ReviewId) -> Result<Option<Review>>;
    fn find_review_by_url(&self, start_url: &str) -> Result<Option<Review>>;
    fn store_review(&self, review: &Review) -> Result<()>;

    // Sections discovered from the TOC, replaced as a whole
    fn list_sections(&self, review_id: &ReviewId) -> Result<Vec<SectionRecord>>;
    fn store_sections(&self, review_id: &ReviewId, sections: &[SectionRecord]) -> Result<()>;

    // Check runs: storing a run replaces the previous one for that section
    fn get_check_run(&self, review_id: &ReviewId, section_id: SectionId) -> Result<Option<CheckRun>>;
    fn store_check_run(&self, run: &CheckRun) -> Result<()>;

    // Manual reviews, one per section
    fn get_manual_review(&self, review_id: &ReviewId, section_id: SectionId) -> Result<Option<ManualReview>>;
    fn store_manual_review(&self, manual: &ManualReview) -> Result<()>;
}

/// JSON files under a data directory:
///
/// ```text
/// {data_dir}/reviews/{review_id}/review.json
/// {data_dir}/reviews/{review_id}/sections.json
/// {data_dir}/reviews/{review_id}/runs/section_{id}.json
/// {data_dir}/reviews/{review_id}/manual/section_{id}.json
/// ```
pub struct FileStorage {
    data_dir: PathBuf,
}

impl FileStorage {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(data_dir.join("reviews"))
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
        Ok(Self { data_dir })
    }

    fn review_dir(&self, id: &ReviewId) -> PathBuf {
        self.data_dir.join("reviews").join(id.to_string())
    }

    fn review_path(&self, id: &ReviewId) -> PathBuf {
        self.review_dir(id).join("review.json")
    }

    fn sections_path(&self, id: &ReviewId) -> PathBuf {
        self.review_dir(id).join("sections.json")
    }

    fn run_path(&self, id: &ReviewId, section_id: SectionId) -> PathBuf {
        self.review_dir(id)
            .join("runs")
            .join(format!("section_{section_id}.json"))
    }

    fn manual_path(&self, id: &ReviewId, section_id: SectionId) -> PathBuf {
        self.review_dir(id)
            .join("manual")
            .join(format!("section_{section_id}.json"))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(path)?;
    let value = serde_json::from_str(&json)
        .map_err(|e| anyhow!("Failed to deserialize {}: {}", path.display(), e))?;
    Ok(Some(value))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow!("Failed to serialize {}: {}", path.display(), e))?;
    fs::write(path, json)?;
    Ok(())
}

impl AuditStorage for FileStorage {
    fn get_review(&self, id: &ReviewId) -> Result<Option<Review>> {
        read_json(&self.review_path(id))
    }

    fn find_review_by_url(&self, start_url: &str) -> Result<Option<Review>> {
        for entry in fs::read_dir(self.data_dir.join("reviews"))? {
            let path = entry?.path().join("review.json");
            if let Some(review) = read_json::<Review>(&path)? {
                if review.start_url == start_url {
                    return Ok(Some(review));
                }
            }
        }
        Ok(None)
    }

    fn store_review(&self, review: &Review) -> Result<()> {
        write_json(&self.review_path(&review.id), review)
    }

    fn list_sections(&self, review_id: &ReviewId) -> Result<Vec<SectionRecord>> {
        Ok(read_json(&self.sections_path(review_id))?.unwrap_or_default())
    }

    fn store_sections(&self, review_id: &ReviewId, sections: &[SectionRecord]) -> Result<()> {
        write_json(&self.sections_path(review_id), &sections)
    }

    fn get_check_run(&self, review_id: &ReviewId, section_id: SectionId) -> Result<Option<CheckRun>> {
        read_json(&self.run_path(review_id, section_id))
    }

    fn store_check_run(&self, run: &CheckRun) -> Result<()> {
        write_json(&self.run_path(&run.review_id, run.section_id), run)
    }

    fn get_manual_review(&self, review_id: &ReviewId, section_id: SectionId) -> Result<Option<ManualReview>> {
        read_json(&self.manual_path(review_id, section_id))
    }

    fn store_manual_review(&self, manual: &ManualReview) -> Result<()> {
        write_json(&self.manual_path(&manual.review_id, manual.section_id), manual)
    }
}

#[derive(Default)]
struct MemoryState {
    reviews: BTreeMap<ReviewId, Review>,
    sections: HashMap<ReviewId, Vec<SectionRecord>>,
    runs: HashMap<(ReviewId, SectionId), CheckRun>,
    manual: HashMap<(ReviewId, SectionId), ManualReview>,
}

/// In-process storage, for tests and one-shot audits
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        Ok(f(&mut state))
    }
}

impl AuditStorage for MemoryStorage {
    fn get_review(&self, id: &ReviewId) -> Result<Option<Review>> {
        self.with_state(|state| state.reviews.get(id).cloned())
    }

    fn find_review_by_url(&self, start_url: &str) -> Result<Option<Review>> {
        self.with_state(|state| {
            state
                .reviews
                .values()
                .find(|review| review.start_url == start_url)
                .cloned()
        })
    }

    fn store_review(&self, review: &Review) -> Result<()> {
        self.with_state(|state| {
            state.reviews.insert(review.id, review.clone());
        })
    }

    fn list_sections(&self, review_id: &ReviewId) -> Result<Vec<SectionRecord>> {
        self.with_state(|state| state.sections.get(review_id).cloned().unwrap_or_default())
    }

    fn store_sections(&self, review_id: &ReviewId, sections: &[SectionRecord]) -> Result<()> {
        self.with_state(|state| {
            state.sections.insert(*review_id, sections.to_vec());
        })
    }

    fn get_check_run(&self, review_id: &ReviewId, section_id: SectionId) -> Result<Option<CheckRun>> {
        self.with_state(|state| state.runs.get(&(*review_id, section_id)).cloned())
    }

    fn store_check_run(&self, run: &CheckRun) -> Result<()> {
        self.with_state(|state| {
            state.runs.insert((run.review_id, run.section_id), run.clone());
        })
    }

    fn get_manual_review(&self, review_id: &ReviewId, section_id: SectionId) -> Result<Option<ManualReview>> {
        self.with_state(|state| state.manual.get(&(*review_id, section_id)).cloned())
    }

    fn store_manual_review(&self, manual: &ManualReview) -> Result<()> {
        self.with_state(|state| {
            state
                .manual
                .insert((manual.review_id, manual.section_id), manual.clone());
        })
    }
}

/// Fingerprint of a fetched page, stored with each check run
pub fn calculate_content_hash(html: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(html.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of the audit config a run was produced with
pub fn calculate_config_hash<T: Serialize>(config: &T) -> Result<String> {
    let config_json = serde_json::to_string(config)
        .map_err(|e| anyhow!("Failed to serialize config for hashing: {}", e))?;

    let mut hasher = Sha256::new();
    hasher.update(config_json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
