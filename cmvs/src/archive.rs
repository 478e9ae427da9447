use bytes::Bytes;
use std::{fmt::Debug, path::Path, path::PathBuf};

// Workaround until it is possible to return impl Trait in traits
pub trait Archive: Sync + Send + Debug {
    fn entries(&self) -> Vec<FileEntry>;
    fn extract(&self, entry: &FileEntry) -> anyhow::Result<Bytes>;
    fn extract_all(&self, output_path: &Path) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub file_name: String,
    pub full_path: PathBuf,
    pub file_offset: u64,
    pub file_size: u64,
}
