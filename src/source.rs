use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::SourceError;
use crate::zone::record::ResourceRecord;

/// Supplies the full record set for a sync
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn sync_records(&self) -> Result<Vec<ResourceRecord>, SourceError>;
}

/// Records read from a JSON array on disk
#[derive(Debug, Clone)]
pub struct FileRecordSource {
    path: PathBuf,
}

impl FileRecordSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSource for FileRecordSource {
    async fn sync_records(&self) -> Result<Vec<ResourceRecord>, SourceError> {
        let data = fs::read(&self.path).await?;
        let records: Vec<ResourceRecord> = serde_json::from_slice(&data)?;
        debug!("Read {} records from {}", records.len(), self.path.display());
        Ok(records)
    }
}

/// Fixed in-memory record set
#[derive(Debug, Clone, Default)]
pub struct StaticRecordSource {
    records: Vec<ResourceRecord>,
}

impl StaticRecordSource {
    pub fn new(records: Vec<ResourceRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl RecordSource for StaticRecordSource {
    async fn sync_records(&self) -> Result<Vec<ResourceRecord>, SourceError> {
        Ok(self.records.clone())
    }
}
