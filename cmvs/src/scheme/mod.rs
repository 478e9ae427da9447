use crate::archive::Archive;
use bytes::Bytes;
use std::{fmt::Debug, path::Path};

pub mod cpz;
pub mod database;

pub trait Opener: Debug + Send + Sync {
    /// `Ok(None)` when `buf` is not an archive this opener understands.
    fn open(
        &self,
        buf: Bytes,
        file_path: &Path,
    ) -> anyhow::Result<Option<Box<dyn Archive>>>;
    fn get_name(&self) -> String;
}
