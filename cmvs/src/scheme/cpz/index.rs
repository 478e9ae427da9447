use super::{
    crypt, decoder::Cpz5Decoder, header::CpzHeader, key::ArchiveKey,
};
use crate::{
    scheme::database::CmvsScheme,
    util::{huffman::HuffmanDecoder, map_words, read_cstring},
};
use scroll::{Pread, LE};

const DIRECTORY_XOR_KEY: u8 = 0x3A;
const ENTRY_XOR_KEY: u8 = 0x7E;
const DIRECTORY_NAME_OFFSET: usize = 0x10;
const MAX_FILE_COUNT: i32 = 0x10000;
const INDEX_KEY_PERIOD: usize = 0x3FF;
const ROOT_DIRECTORY: &str = "root";

/// Inputs of a single scheme attempt. Built fresh from the untouched header
/// and index for every scheme, so nothing a failed attempt did can leak.
#[derive(Debug, Clone)]
pub struct IndexAttempt {
    pub cmvs_md5: [u32; 4],
    pub index: Vec<u8>,
}

impl IndexAttempt {
    pub fn new(header: &CpzHeader, index: &[u8]) -> Self {
        Self {
            cmvs_md5: header.cmvs_md5,
            index: index.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub size: i32,
    pub file_count: i32,
    pub entries_offset: i32,
    pub key: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpzEntry {
    pub name: String,
    /// Absolute offset in the archive
    pub offset: u64,
    pub size: u32,
    pub checksum: u32,
    pub key: u32,
}

/// Result of a successful attempt
#[derive(Debug)]
pub struct ReadIndex {
    pub directories: Vec<DirectoryRecord>,
    pub entries: Vec<CpzEntry>,
    /// Ready for entry decryption
    pub decoder: Cpz5Decoder,
    pub cmvs_md5: [u32; 4],
}

/// Decrypts and parses the index with `scheme`.
///
/// `Ok(None)` means the scheme does not fit this archive. Errors are only
/// raised for a corrupted index key stream.
pub fn read_index(
    header: &CpzHeader,
    scheme: &CmvsScheme,
    attempt: IndexAttempt,
    archive_key: &ArchiveKey,
    file_len: usize,
) -> anyhow::Result<Option<ReadIndex>> {
    let IndexAttempt {
        cmvs_md5,
        mut index,
    } = attempt;
    if scheme.cpz5_secret.is_empty() || index.len() < header.index_size() {
        return Ok(None);
    }
    let cmvs_md5 = scheme.md5_variant.compute(cmvs_md5);
    let tables_size = header.tables_size();

    if header.version > 6 && header.index_key_size > 0x10 {
        let key =
            match decode_index_key(&index[tables_size..header.index_size()])? {
                Some(key) => key,
                None => return Ok(None),
            };
        index
            .iter_mut()
            .take(tables_size)
            .enumerate()
            .for_each(|(i, b)| *b ^= key[(i + 3) % INDEX_KEY_PERIOD]);
    }

    let tables = &mut index[..tables_size];
    crypt::decrypt_index_stage1(
        tables,
        header.master_key ^ scheme.index_seed,
        scheme,
    );

    let (dir_table, file_table) =
        tables.split_at_mut(header.dir_entries_size as usize);
    let mut decoder = Cpz5Decoder::new(scheme, header.master_key, cmvs_md5[1]);
    decoder.decode(dir_table, DIRECTORY_XOR_KEY);
    crypt::decrypt_index_directory(
        dir_table,
        &crypt::directory_key(&cmvs_md5, header.master_key),
        archive_key.index_dir_key,
    );
    let directories = match parse_directories(dir_table, header.dir_count) {
        Some(directories) => directories,
        None => return Ok(None),
    };
    log::debug!("Directories: {:#X?}", directories);

    decoder.init(header.master_key, cmvs_md5[2]);
    let mut entries = Vec::new();
    for (i, dir) in directories.iter().enumerate() {
        let start = dir.entries_offset as i64;
        let end = directories
            .get(i + 1)
            .map(|next| next.entries_offset as i64)
            .unwrap_or(file_table.len() as i64);
        if start < 0 || end - start <= 0 || end > file_table.len() as i64 {
            log::debug!("Bad file table span of {}: {}..{}", dir.name, start, end);
            return Ok(None);
        }
        let file_entries = &mut file_table[start as usize..end as usize];
        decoder.decode(file_entries, ENTRY_XOR_KEY);
        crypt::decrypt_index_entry(
            file_entries,
            &crypt::entry_table_key(&cmvs_md5, dir.key, scheme),
            archive_key.index_entry_key,
        );
        match parse_entries(file_entries, dir, header, file_len) {
            Some(dir_entries) => entries.extend(dir_entries),
            None => return Ok(None),
        }
    }

    if header.is_encrypted() {
        decoder.init(cmvs_md5[3], header.master_key);
    }
    Ok(Some(ReadIndex {
        directories,
        entries,
        decoder,
        cmvs_md5,
    }))
}

/// Unpacks the CPZ7 index key: `[md5][size][xor key][huffman data]`.
fn decode_index_key(region: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
    let (size, xor_key) = match (
        region.pread_with::<u32>(0x10, LE),
        region.pread_with::<u32>(0x14, LE),
    ) {
        (Ok(size), Ok(xor_key)) => (size as usize, xor_key),
        _ => return Ok(None),
    };
    if size < INDEX_KEY_PERIOD {
        return Ok(None);
    }
    let mut packed = region[0x18..].to_vec();
    let tail = map_words(&mut packed, |_, word| word ^ xor_key);
    tail.iter_mut()
        .zip(xor_key.to_le_bytes().iter())
        .for_each(|(b, k)| *b ^= k);
    Ok(Some(HuffmanDecoder::new(&packed).decode(size)?))
}

fn read_i32(buf: &[u8], off: usize) -> Option<i32> {
    buf.pread_with(off, LE).ok()
}

fn read_u32(buf: &[u8], off: usize) -> Option<u32> {
    buf.pread_with(off, LE).ok()
}

fn parse_directories(buf: &[u8], count: i32) -> Option<Vec<DirectoryRecord>> {
    let mut directories = Vec::with_capacity(count.max(0) as usize);
    let mut off = 0;
    for _ in 0..count {
        let size = read_i32(buf, off)?;
        if size <= DIRECTORY_NAME_OFFSET as i32
            || off + size as usize > buf.len()
        {
            log::debug!("Bad directory size {:#X} at {:#X}", size, off);
            return None;
        }
        let file_count = read_i32(buf, off + 4)?;
        if !(0..MAX_FILE_COUNT).contains(&file_count) {
            log::debug!("Bad file count {:#X} at {:#X}", file_count, off);
            return None;
        }
        directories.push(DirectoryRecord {
            size,
            file_count,
            entries_offset: read_i32(buf, off + 8)?,
            key: read_u32(buf, off + 12)?,
            name: read_cstring(
                &buf[off + DIRECTORY_NAME_OFFSET..off + size as usize],
            ),
        });
        off += size as usize;
    }
    Some(directories)
}

fn parse_entries(
    buf: &[u8],
    dir: &DirectoryRecord,
    header: &CpzHeader,
    file_len: usize,
) -> Option<Vec<CpzEntry>> {
    let long_entry = header.version > 6;
    let name_offset = if long_entry { 0x1C } else { 0x18 };
    let data_offset = header.data_offset() as u64;
    let mut entries = Vec::with_capacity(dir.file_count as usize);
    let mut off = 0;
    for _ in 0..dir.file_count {
        let entry_size = read_i32(buf, off)?;
        if entry_size <= name_offset as i32
            || off + entry_size as usize > buf.len()
        {
            log::debug!("Bad entry size {:#X} in {}", entry_size, dir.name);
            return None;
        }
        let offset_lo = read_u32(buf, off + 4)? as u64;
        let offset_hi = read_u32(buf, off + 8)? as u64;
        let size = read_u32(buf, off + 0xC)?;
        let field = if long_entry { off + 0x14 } else { off + 0x10 };
        let checksum = read_u32(buf, field)?;
        let key_delta = read_u32(buf, field + 4)?;
        let file_name =
            read_cstring(&buf[off + name_offset..off + entry_size as usize]);
        let name = if dir.name == ROOT_DIRECTORY {
            file_name
        } else {
            format!("{}/{}", dir.name, file_name)
        };

        let offset = (offset_hi << 32 | offset_lo).checked_add(data_offset)?;
        if offset.checked_add(size as u64)? > file_len as u64 {
            log::debug!("Entry {} is out of archive bounds", name);
            return None;
        }
        entries.push(CpzEntry {
            name,
            offset,
            size,
            checksum,
            key: key_delta.wrapping_add(dir.key),
        });
        off += entry_size as usize;
    }
    Some(entries)
}
