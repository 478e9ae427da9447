use crate::{
    error::CmvsError,
    resource::{
        ps2::{self, Ps2Header},
        ResourceMagic,
    },
    util::read_cstring,
};
use anyhow::Context;
use scroll::{Pread, LE};
use std::path::Path;

const SCRIPT_NAME: &str = "start.ps3";
/// Instruction bytes right before the archive name argument
const KEY_OPCODE: [u8; 3] = [0x02, 0x00, 0x01];
/// Distance from the argument back to each pushed key word
const KEY_WORD_OFFSETS: [usize; 4] = [0x24, 0x1C, 0x14, 0x0C];

/// Extra key material of CPZ7 archives, all zero when unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveKey {
    pub index_dir_key: u32,
    pub index_entry_key: u32,
    pub entry_data_key1: u32,
    pub entry_data_key2: u32,
}

impl From<[u32; 4]> for ArchiveKey {
    fn from(key: [u32; 4]) -> Self {
        Self {
            index_dir_key: key[0],
            index_entry_key: key[1],
            entry_data_key1: key[2],
            entry_data_key2: key[3],
        }
    }
}

/// Looks for the archive key in `start.ps3` next to the archive.
pub fn find_archive_key(archive_path: &Path) -> Option<ArchiveKey> {
    let script_path = archive_path.parent()?.join(SCRIPT_NAME);
    let archive_name = archive_path.file_name()?.to_str()?;
    let result = std::fs::read(&script_path)
        .map_err(anyhow::Error::from)
        .and_then(|buf| find_key_in_script(buf, archive_name));
    match result {
        Ok(Some(key)) => {
            log::debug!("Archive key of {}: {:X?}", archive_name, key);
            Some(key)
        }
        Ok(None) => {
            log::warn!("{:?} holds no key for {}", script_path, archive_name);
            None
        }
        Err(err) => {
            log::debug!("Could not read {:?}: {}", script_path, err);
            None
        }
    }
}

/// Searches a packed PS2A script for the instruction that registers
/// `archive_name` and returns the four words pushed before it.
pub fn find_key_in_script(
    buf: Vec<u8>,
    archive_name: &str,
) -> anyhow::Result<Option<ArchiveKey>> {
    if ResourceMagic::parse_magic(&buf) != ResourceMagic::PS2A {
        return Err(CmvsError::Custom(format!(
            "{} is not a PS2A script",
            SCRIPT_NAME
        ))
        .into());
    }
    let header = buf.pread_with::<Ps2Header>(0, LE)?;
    let script = ps2::unpack(buf)?;
    let code_size = header.code_size as usize;
    let code = script.get(..code_size).context("Bytecode out of bounds")?;
    let strings = script
        .get(code_size..code_size + header.strings_size as usize)
        .context("String table out of bounds")?;

    let arg_id = match find_string(strings, archive_name) {
        Some(id) => id.to_le_bytes(),
        None => return Ok(None),
    };
    let pos = code
        .windows(4)
        .enumerate()
        .skip(KEY_WORD_OFFSETS[0])
        .find(|(p, window)| {
            *window == arg_id && code[p - KEY_OPCODE.len()..*p] == KEY_OPCODE
        })
        .map(|(p, _)| p);
    match pos {
        Some(p) => {
            let mut key = [0u32; 4];
            for (word, back) in key.iter_mut().zip(KEY_WORD_OFFSETS.iter()) {
                *word = code.pread_with(p - back, LE)?;
            }
            Ok(Some(key.into()))
        }
        None => Ok(None),
    }
}

/// Offset of the string whose file name part matches `name`.
fn find_string(strings: &[u8], name: &str) -> Option<u32> {
    let mut off = 0;
    while off < strings.len() {
        let s = read_cstring(&strings[off..]);
        let file_name = s.rsplit(|c| c == '/' || c == '\\').next()?;
        if !s.is_empty() && file_name.eq_ignore_ascii_case(name) {
            return Some(off as u32);
        }
        off += strings[off..]
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(strings.len() - off)
            + 1;
    }
    None
}
