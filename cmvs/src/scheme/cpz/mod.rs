use crate::{
    archive::{self, Archive},
    error::CmvsError,
    resource::ResourceMagic,
    scheme::{
        database::{CmvsScheme, SchemeDatabase},
        Opener,
    },
};
use anyhow::Context;
use bytes::Bytes;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::{
    fs::File,
    io::Write,
    path::{Component, Path, PathBuf},
};

pub mod crypt;
pub mod decoder;
pub mod header;
pub mod index;
pub mod key;
pub mod md5;

use decoder::Cpz5Decoder;
use header::CpzHeader;
pub use index::CpzEntry;
use index::IndexAttempt;
use key::ArchiveKey;

/// Opens CPZ5, CPZ6 and CPZ7 archives by trying every known scheme of the
/// archive's version.
#[derive(Debug, Clone)]
pub struct CpzOpener {
    database: SchemeDatabase,
}

impl CpzOpener {
    pub fn new(database: SchemeDatabase) -> Self {
        Self { database }
    }

    pub fn try_open(
        &self,
        buf: Bytes,
        file_path: &Path,
    ) -> anyhow::Result<Option<CpzArchive>> {
        if self.database.is_empty() {
            return Err(CmvsError::OutdatedSchemeDatabase.into());
        }
        let header = match CpzHeader::parse(&buf) {
            Some(header) => header,
            None => return Ok(None),
        };
        log::debug!("Header: {:#X?}", header);

        let index = match buf.get(header.header_size()..header.data_offset()) {
            Some(index) => index,
            None => {
                log::debug!("Index does not fit in {} bytes", buf.len());
                return Ok(None);
            }
        };
        if !header.verify_index(index) {
            log::debug!("Index digest mismatch");
            return Ok(None);
        }

        let archive_name = file_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let script_key = if header.version > 6 {
            key::find_archive_key(file_path)
        } else {
            None
        };

        for scheme in self.database.schemes_for(header.version) {
            let archive_key = script_key
                .or_else(|| {
                    scheme.archive_keys.get(archive_name).map(|k| (*k).into())
                })
                .unwrap_or_default();
            let attempt = IndexAttempt::new(&header, index);
            match index::read_index(
                &header,
                scheme,
                attempt,
                &archive_key,
                buf.len(),
            ) {
                Ok(Some(read)) => {
                    log::debug!("Using scheme: {}", scheme.name);
                    log::debug!("Entries: {:#X?}", read.entries);
                    return Ok(Some(CpzArchive {
                        data: buf.clone(),
                        header,
                        scheme: scheme.clone(),
                        archive_key,
                        cmvs_md5: read.cmvs_md5,
                        decoder: read.decoder,
                        entries: read.entries,
                    }));
                }
                Ok(None) => log::debug!("Scheme {} does not fit", scheme.name),
                Err(err) => log::debug!("Scheme {} failed: {}", scheme.name, err),
            }
        }
        Err(CmvsError::UnknownEncryptionScheme(header.version).into())
    }
}

impl Opener for CpzOpener {
    fn open(
        &self,
        buf: Bytes,
        file_path: &Path,
    ) -> anyhow::Result<Option<Box<dyn Archive>>> {
        Ok(self
            .try_open(buf, file_path)?
            .map(|archive| Box::new(archive) as Box<dyn Archive>))
    }

    fn get_name(&self) -> String {
        format!("[CPZ] CMVS ({} schemes)", self.database.schemes.len())
    }
}

/// Seed of an entry's content cipher
pub fn entry_seed(
    header: &CpzHeader,
    scheme: &CmvsScheme,
    archive_key: &ArchiveKey,
    entry_key: u32,
) -> u32 {
    (((entry_key ^ header.master_key).wrapping_add(header.dir_count as u32)
        ^ archive_key.entry_data_key2)
        .wrapping_sub(scheme.entry_sub_key))
        ^ header.entry_key.wrapping_add(archive_key.entry_data_key1)
}

/// Entry names come from the archive, only plain relative paths are
/// written out.
fn relative_path(name: &str) -> anyhow::Result<&Path> {
    let path = Path::new(name);
    let escapes = path.components().any(|c| {
        !matches!(c, Component::Normal(_) | Component::CurDir)
    });
    if escapes || name.is_empty() {
        return Err(CmvsError::Corrupted(format!(
            "{:?} is not a relative path",
            name
        ))
        .into());
    }
    Ok(path)
}

#[derive(Debug)]
pub struct CpzArchive {
    data: Bytes,
    header: CpzHeader,
    scheme: CmvsScheme,
    archive_key: ArchiveKey,
    cmvs_md5: [u32; 4],
    decoder: Cpz5Decoder,
    entries: Vec<CpzEntry>,
}

impl CpzArchive {
    pub fn header(&self) -> &CpzHeader {
        &self.header
    }
    pub fn scheme(&self) -> &CmvsScheme {
        &self.scheme
    }
    pub fn archive_key(&self) -> &ArchiveKey {
        &self.archive_key
    }
    pub fn cpz_entries(&self) -> &[CpzEntry] {
        &self.entries
    }

    /// Decrypts an entry and unpacks tagged payloads.
    pub fn open_entry(&self, entry: &CpzEntry) -> anyhow::Result<Bytes> {
        let start = entry.offset as usize;
        let mut buf = self
            .data
            .get(start..start + entry.size as usize)
            .ok_or_else(|| {
                CmvsError::Corrupted(format!("{} is out of bounds", entry.name))
            })?
            .to_vec();
        if self.header.is_encrypted() {
            let seed =
                entry_seed(&self.header, &self.scheme, &self.archive_key, entry.key);
            self.decoder.decrypt_entry(&mut buf, &self.cmvs_md5, seed);
        }
        let buf = ResourceMagic::parse_magic(&buf)
            .process(buf)
            .with_context(|| format!("Could not process {}", entry.name))?;
        Ok(Bytes::from(buf))
    }
}

impl archive::Archive for CpzArchive {
    fn entries(&self) -> Vec<archive::FileEntry> {
        self.entries
            .iter()
            .map(|entry| archive::FileEntry {
                file_name: entry
                    .name
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string(),
                full_path: PathBuf::from(&entry.name),
                file_offset: entry.offset,
                file_size: entry.size as u64,
            })
            .collect()
    }

    fn extract(&self, entry: &archive::FileEntry) -> anyhow::Result<Bytes> {
        self.entries
            .iter()
            .find(|e| PathBuf::from(&e.name) == entry.full_path)
            .map(|e| self.open_entry(e))
            .context("File not found")?
    }

    fn extract_all(&self, output_path: &Path) -> anyhow::Result<()> {
        self.entries.par_iter().try_for_each(
            |entry| -> Result<(), anyhow::Error> {
                let relative = relative_path(&entry.name)?;
                let buf = self.open_entry(entry)?;
                let mut output_file_name = PathBuf::from(output_path);
                output_file_name.push(relative);
                std::fs::create_dir_all(
                    &output_file_name
                        .parent()
                        .context("Could not get parent directory")?,
                )?;
                log::debug!(
                    "Extracting resource: {:?} {:X?}",
                    output_file_name,
                    entry
                );
                File::create(output_file_name)?.write_all(&buf)?;
                Ok(())
            },
        )
    }
}
