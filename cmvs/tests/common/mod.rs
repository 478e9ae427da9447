//! Builds synthetic CPZ archives by running every cipher backwards.

#![allow(dead_code)]

use bytes::BufMut;
use cmvs::{
    resource::ps2,
    scheme::{
        cpz::{crypt, decoder::Cpz5Decoder, entry_seed, header::CpzHeader, key::ArchiveKey},
        database::CmvsScheme,
    },
    util,
};

pub const KEY_PERIOD: usize = 0x3FF;

pub fn test_scheme(name: &str, version: u8, secret: Vec<u32>) -> CmvsScheme {
    CmvsScheme {
        name: String::from(name),
        version,
        cpz5_secret: secret,
        ..CmvsScheme::default()
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    pub version: u8,
    pub scheme: CmvsScheme,
    pub master_key: u32,
    pub cmvs_md5: [u32; 4],
    pub encrypted: bool,
    pub entry_key_raw: u32,
    pub archive_key: ArchiveKey,
    pub index_key: Option<Vec<u8>>,
    files: Vec<(String, String, Vec<u8>)>,
}

impl ArchiveBuilder {
    pub fn new(scheme: CmvsScheme) -> Self {
        Self {
            version: scheme.version,
            scheme,
            master_key: 0x1F2E3D4C,
            cmvs_md5: [0x11223344, 0x55667788, 0x99AABBCC, 0xDDEEFF00],
            encrypted: true,
            entry_key_raw: 0x0BADCAFE,
            archive_key: ArchiveKey::default(),
            index_key: None,
            files: Vec::new(),
        }
    }

    pub fn file(mut self, dir: &str, name: &str, data: &[u8]) -> Self {
        self.files
            .push((String::from(dir), String::from(name), data.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let long_entry = self.version > 6;
        let name_offset = if long_entry { 0x1C } else { 0x18 };

        let mut dir_names: Vec<&str> = Vec::new();
        for (dir, _, _) in &self.files {
            if !dir_names.contains(&dir.as_str()) {
                dir_names.push(dir);
            }
        }

        let mut dir_table = Vec::new();
        let mut file_tables = Vec::new();
        let mut data_section = Vec::new();
        let mut placements = Vec::new();
        let mut entries_offset = 0;
        for (d, dir_name) in dir_names.iter().enumerate() {
            let dir_key = 0x01000193u32.wrapping_mul(d as u32 + 7);
            let mut table = Vec::new();
            let files = self.files.iter().filter(|(dir, _, _)| dir == dir_name);
            for (i, (_, name, data)) in files.clone().enumerate() {
                let key_delta = 0x10 * i as u32 + 7;
                let offset = data_section.len() as u64;
                table.put_i32_le((name_offset + name.len() + 1) as i32);
                table.put_u32_le(offset as u32);
                table.put_u32_le((offset >> 32) as u32);
                table.put_u32_le(data.len() as u32);
                if long_entry {
                    table.put_u32_le(0);
                }
                table.put_u32_le(util::checksum(data, 0));
                table.put_u32_le(key_delta);
                table.put_slice(name.as_bytes());
                table.put_u8(0);
                placements.push((
                    offset as usize,
                    data.len(),
                    key_delta.wrapping_add(dir_key),
                ));
                data_section.extend_from_slice(data);
            }
            dir_table.put_i32_le((0x10 + dir_name.len() + 1) as i32);
            dir_table.put_i32_le(files.count() as i32);
            dir_table.put_i32_le(entries_offset as i32);
            dir_table.put_u32_le(dir_key);
            dir_table.put_slice(dir_name.as_bytes());
            dir_table.put_u8(0);
            entries_offset += table.len();
            file_tables.push((dir_key, table));
        }

        let md5 = self.scheme.md5_variant.compute(self.cmvs_md5);
        let mut decoder =
            Cpz5Decoder::new(&self.scheme, self.master_key, md5[2]);
        let mut file_table = Vec::new();
        for (dir_key, mut table) in file_tables {
            crypt::encrypt_index_entry(
                &mut table,
                &crypt::entry_table_key(&md5, dir_key, &self.scheme),
                self.archive_key.index_entry_key,
            );
            decoder.encode(&mut table, 0x7E);
            file_table.extend(table);
        }
        decoder.init(self.master_key, md5[1]);
        crypt::encrypt_index_directory(
            &mut dir_table,
            &crypt::directory_key(&md5, self.master_key),
            self.archive_key.index_dir_key,
        );
        decoder.encode(&mut dir_table, 0x3A);

        let mut tables = dir_table.clone();
        tables.extend(&file_table);
        crypt::encrypt_index_stage1(
            &mut tables,
            self.master_key ^ self.scheme.index_seed,
            &self.scheme,
        );

        let mut key_region = Vec::new();
        if let Some(key) = &self.index_key {
            tables
                .iter_mut()
                .enumerate()
                .for_each(|(i, b)| *b ^= key[(i + 3) % KEY_PERIOD]);
            let xor_key = 0xA5C3E187u32;
            let mut packed = huffman_encode(key);
            xor_words(&mut packed, xor_key);
            let mut body = Vec::new();
            body.put_u32_le(key.len() as u32);
            body.put_u32_le(xor_key);
            body.extend(packed);
            key_region.extend_from_slice(&util::md5(&body));
            key_region.extend(body);
        }

        let header = CpzHeader {
            version: self.version,
            dir_count: dir_names.len() as i32,
            dir_entries_size: dir_table.len() as i32,
            file_entries_size: file_table.len() as i32,
            index_md5: util::md5(&tables),
            cmvs_md5: self.cmvs_md5,
            master_key: self.master_key,
            encrypted_flag: self.encrypted as u32,
            entry_key_raw: self.entry_key_raw,
            entry_key: 0,
            reserved: 0,
            index_key_size: key_region.len() as i32,
            init_checksum: 0,
            header_checksum: 0,
        };
        let header_bytes = header.to_bytes();
        let header = CpzHeader::parse(&header_bytes).unwrap();

        if self.encrypted {
            let decoder = Cpz5Decoder::new(&self.scheme, md5[3], self.master_key);
            for (offset, size, key) in placements {
                let seed =
                    entry_seed(&header, &self.scheme, &self.archive_key, key);
                decoder.encrypt_entry(
                    &mut data_section[offset..offset + size],
                    &md5,
                    seed,
                );
            }
        }

        let mut archive = header_bytes.to_vec();
        archive.extend(tables);
        archive.extend(key_region);
        archive.extend(data_section);
        archive
    }
}

fn xor_words(buf: &mut [u8], key: u32) {
    let key = key.to_le_bytes();
    buf.iter_mut()
        .enumerate()
        .for_each(|(i, b)| *b ^= key[i % 4]);
}

/// Encodes `data` with a balanced tree over the symbols it contains.
pub fn huffman_encode(data: &[u8]) -> Vec<u8> {
    let mut symbols = data.to_vec();
    symbols.sort_unstable();
    symbols.dedup();
    if symbols.is_empty() {
        symbols.push(0);
    }
    let mut bits = Vec::new();
    let mut codes = vec![Vec::new(); 0x100];
    write_tree(&symbols, &mut Vec::new(), &mut bits, &mut codes);
    for b in data {
        bits.extend(&codes[*b as usize]);
    }
    pack_bits(&bits)
}

fn write_tree(
    symbols: &[u8],
    prefix: &mut Vec<u32>,
    bits: &mut Vec<u32>,
    codes: &mut Vec<Vec<u32>>,
) {
    if let [symbol] = symbols {
        bits.push(0);
        bits.extend((0..8).rev().map(|i| (*symbol as u32 >> i) & 1));
        codes[*symbol as usize] = prefix.clone();
        return;
    }
    bits.push(1);
    let (left, right) = symbols.split_at(symbols.len() / 2);
    prefix.push(0);
    write_tree(left, prefix, bits, codes);
    prefix.pop();
    prefix.push(1);
    write_tree(right, prefix, bits, codes);
    prefix.pop();
}

fn pack_bits(bits: &[u32]) -> Vec<u8> {
    let mut words = vec![0u32; (bits.len() + 31) / 32];
    for (i, bit) in bits.iter().enumerate() {
        words[i / 32] |= bit << (i % 32);
    }
    words.iter().flat_map(|w| w.to_le_bytes().to_vec()).collect()
}

/// A `start.ps3` registering `archive_name` with `key`.
pub fn start_script(archive_name: &str, key: [u32; 4]) -> Vec<u8> {
    let mut strings = b"graphic\\sys.cpz\0".to_vec();
    let arg = strings.len() as u32;
    strings.extend_from_slice(archive_name.as_bytes());
    strings.push(0);

    let mut code = vec![0x90; 12];
    for word in &key {
        code.put_slice(&[0x01, 0x00, 0x00, 0x00]);
        code.put_u32_le(*word);
    }
    code.put_slice(&[0x90; 5]);
    code.put_slice(&[0x02, 0x00, 0x01]);
    code.put_u32_le(arg);
    code.put_slice(&[0x90; 4]);

    let code_size = code.len() as u32;
    code.extend(strings);
    ps2::pack(&code, code_size, 0x13572468)
}

/// Index key with every byte value present.
pub fn index_key() -> Vec<u8> {
    (0..0x400u32).map(|i| (i * 7 + i / 3) as u8).collect()
}
