//! Index ciphers.
//!
//! Stage 1 covers the directory and file tables at once, stage 2 the
//! directory table and stage 3 every directory's file table. Each `decrypt_*`
//! has an `encrypt_*` counterpart used to build archives.

use crate::{scheme::database::CmvsScheme, util::map_words};

const STAGE1_START: usize = 5;
const STAGE1_WORDS: usize = 24;

const DIRECTORY_SEED: u32 = 0x76548AEF;
const DIRECTORY_STEP: u32 = 0x10FB562A;
const DIRECTORY_SUB: u32 = 0x4A91C262;

const ENTRY_SEED: u32 = 0x2A65CB4F;
const ENTRY_STEP: u32 = 0x139FA9B;
const ENTRY_ADD: u32 = 0x37A19E8B;

/// Master key offsets mixed into the directory table key
const DIRECTORY_KEY_ADDEND: [u32; 4] = [0x76A3BF29, 0, 0x10000000, 0];

struct Stage1Key {
    secret: [u32; STAGE1_WORDS],
    shift: u32,
}

impl Stage1Key {
    /// Slots past the end of the scheme secret stay zero.
    fn new(scheme: &CmvsScheme, key: u32) -> Self {
        let mut secret = [0u32; STAGE1_WORDS];
        secret
            .iter_mut()
            .zip(&scheme.cpz5_secret)
            .for_each(|(slot, s)| *slot = s.wrapping_sub(key));
        let mut shift = key;
        shift >>= 8;
        shift ^= key;
        shift >>= 8;
        shift ^= key;
        shift >>= 8;
        shift ^= key;
        shift ^= 0xFFFFFFFB;
        shift &= 0x0F;
        shift += 7;
        Self { secret, shift }
    }
}

pub fn decrypt_index_stage1(data: &mut [u8], key: u32, scheme: &CmvsScheme) {
    let Stage1Key { secret, shift } = Stage1Key::new(scheme, key);
    let mut i = STAGE1_START;
    let tail = map_words(data, |_, word| {
        let mut v = secret[i] ^ word;
        v = v.wrapping_add(scheme.index_addend);
        v = v.rotate_right(shift);
        v = v.wrapping_add(0x01010101);
        i = (i + 1) % STAGE1_WORDS;
        v
    });
    // the shift counts down from the tail length to 1
    let len = tail.len();
    for (j, b) in tail.iter_mut().enumerate() {
        *b = (*b ^ (secret[i] >> ((len - j) * 4)) as u8)
            .wrapping_sub(scheme.index_subtrahend);
        i = (i + 1) % STAGE1_WORDS;
    }
}

pub fn encrypt_index_stage1(data: &mut [u8], key: u32, scheme: &CmvsScheme) {
    let Stage1Key { secret, shift } = Stage1Key::new(scheme, key);
    let mut i = STAGE1_START;
    let tail = map_words(data, |_, word| {
        let mut v = word.wrapping_sub(0x01010101);
        v = v.rotate_left(shift);
        v = v.wrapping_sub(scheme.index_addend);
        v ^= secret[i];
        i = (i + 1) % STAGE1_WORDS;
        v
    });
    let len = tail.len();
    for (j, b) in tail.iter_mut().enumerate() {
        *b = b.wrapping_add(scheme.index_subtrahend)
            ^ (secret[i] >> ((len - j) * 4)) as u8;
        i = (i + 1) % STAGE1_WORDS;
    }
}

/// Key of the directory table
pub fn directory_key(cmvs_md5: &[u32; 4], master_key: u32) -> [u32; 4] {
    let mut key = [0; 4];
    for (i, k) in key.iter_mut().enumerate() {
        *k = cmvs_md5[i] ^ master_key.wrapping_add(DIRECTORY_KEY_ADDEND[i]);
    }
    key
}

/// Key of a single directory's file table
pub fn entry_table_key(
    cmvs_md5: &[u32; 4],
    dir_key: u32,
    scheme: &CmvsScheme,
) -> [u32; 4] {
    let mut key = [0; 4];
    for (i, k) in key.iter_mut().enumerate() {
        *k = cmvs_md5[i] ^ dir_key.wrapping_add(scheme.dir_key_addend[i]);
    }
    key
}

pub fn decrypt_index_directory(data: &mut [u8], key: &[u32; 4], arc_key: u32) {
    let mut seed = DIRECTORY_SEED;
    let step = DIRECTORY_STEP ^ arc_key;
    let words = data.len() / 4;
    let tail = map_words(data, |i, word| {
        let mut v = word ^ key[i & 3];
        v = v.wrapping_sub(DIRECTORY_SUB);
        v = v.rotate_left(3);
        v = v.wrapping_sub(seed);
        seed = seed.wrapping_add(step);
        v
    });
    for (j, b) in tail.iter_mut().enumerate() {
        *b = (*b ^ (key[(words + j) & 3] >> 6) as u8).wrapping_add(0x37);
    }
}

pub fn encrypt_index_directory(data: &mut [u8], key: &[u32; 4], arc_key: u32) {
    let mut seed = DIRECTORY_SEED;
    let step = DIRECTORY_STEP ^ arc_key;
    let words = data.len() / 4;
    let tail = map_words(data, |i, word| {
        let mut v = word.wrapping_add(seed);
        v = v.rotate_right(3);
        v = v.wrapping_add(DIRECTORY_SUB);
        v ^= key[i & 3];
        seed = seed.wrapping_add(step);
        v
    });
    for (j, b) in tail.iter_mut().enumerate() {
        *b = b.wrapping_sub(0x37) ^ (key[(words + j) & 3] >> 6) as u8;
    }
}

pub fn decrypt_index_entry(data: &mut [u8], key: &[u32; 4], arc_key: u32) {
    let mut seed = ENTRY_SEED;
    let step = ENTRY_STEP ^ arc_key;
    let words = data.len() / 4;
    let tail = map_words(data, |i, word| {
        let mut v = word ^ key[i & 3];
        v = v.wrapping_sub(seed);
        v = v.rotate_left(2);
        v = v.wrapping_add(ENTRY_ADD);
        seed = seed.wrapping_sub(step);
        v
    });
    for (j, b) in tail.iter_mut().enumerate() {
        *b = (*b ^ (key[(words + j) & 3] >> 4) as u8).wrapping_add(3);
    }
}

pub fn encrypt_index_entry(data: &mut [u8], key: &[u32; 4], arc_key: u32) {
    let mut seed = ENTRY_SEED;
    let step = ENTRY_STEP ^ arc_key;
    let words = data.len() / 4;
    let tail = map_words(data, |i, word| {
        let mut v = word.wrapping_sub(ENTRY_ADD);
        v = v.rotate_right(2);
        v = v.wrapping_add(seed);
        v ^= key[i & 3];
        seed = seed.wrapping_sub(step);
        v
    });
    for (j, b) in tail.iter_mut().enumerate() {
        *b = b.wrapping_sub(3) ^ (key[(words + j) & 3] >> 4) as u8;
    }
}
