use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::AdStore;
use crate::record::{AdRecord, PageMetadata};

const METADATA_FILE: &str = "metadata.json";

/// One directory per page, one JSON file per ad, plus `metadata.json`.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create data dir {}", root.display()))?;
        Ok(Self { root })
    }

    fn page_dir(&self, page_id: &str) -> PathBuf {
        self.root.join(safe_component(page_id))
    }

    fn ad_path(&self, page_id: &str, id: &str) -> PathBuf {
        self.page_dir(page_id).join(format!("{}.json", safe_component(id)))
    }
}

impl AdStore for FileStore {
    fn save(&mut self, record: &AdRecord) -> Result<()> {
        write_json(&self.ad_path(&record.page_id, &record.id), record)
            .with_context(|| format!("Failed to save ad {}/{}", record.page_id, record.id))
    }

    fn load(&self, page_id: &str, id: &str) -> Result<Option<AdRecord>> {
        let record: Option<AdRecord> = read_json(&self.ad_path(page_id, id))?;
        Ok(record.filter(|r| r.id == id && r.page_id == page_id))
    }

    fn save_metadata(&mut self, meta: &PageMetadata) -> Result<()> {
        write_json(&self.page_dir(&meta.page_id).join(METADATA_FILE), meta)
            .with_context(|| format!("Failed to save metadata for page {}", meta.page_id))
    }

    fn load_metadata(&self, page_id: &str) -> Result<Option<PageMetadata>> {
        read_json(&self.page_dir(page_id).join(METADATA_FILE))
    }

    fn list_pages(&self) -> Result<Vec<PageMetadata>> {
        let mut out = Vec::new();
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list data dir {}", self.root.display()))?;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(meta) = read_json::<PageMetadata>(&entry.path().join(METADATA_FILE))? {
                out.push(meta);
            }
        }
        out.sort_by(|a, b| a.page_id.cmp(&b.page_id));
        Ok(out)
    }
}

/// Encode an id as a single path segment. `[A-Za-z0-9-]` pass through, every
/// other byte becomes `_XX` (uppercase hex), so distinct ids never share a file.
fn safe_component(s: &str) -> String {
    if s.is_empty() {
        return "_".to_string();
    }
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("_{:02X}", b));
        }
    }
    out
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');

    // Write-then-rename so a crash never leaves a half-written file behind.
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => {
            let v = serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupt JSON in {}", path.display()))?;
            Ok(Some(v))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}
