pub mod files;
pub mod sqlite;

use anyhow::Result;

use crate::record::{AdRecord, PageMetadata};

pub use files::FileStore;
pub use sqlite::SqliteStore;

/// Where captured ads live between runs. `save` must be idempotent and
/// `load` must see the most recent `save` for the same (page, id).
pub trait AdStore {
    fn save(&mut self, record: &AdRecord) -> Result<()>;
    fn load(&self, page_id: &str, id: &str) -> Result<Option<AdRecord>>;
    fn save_metadata(&mut self, meta: &PageMetadata) -> Result<()>;
    fn load_metadata(&self, page_id: &str) -> Result<Option<PageMetadata>>;
    fn list_pages(&self) -> Result<Vec<PageMetadata>>;
}
