use crate::{scheme::database::CmvsScheme, util::map_words};

const SECRET_WORDS: usize = 0x10;

/// Keyed byte substitution table together with the scheme parameters needed
/// to decrypt entry contents.
#[derive(Debug, Clone)]
pub struct Cpz5Decoder {
    table: [u8; 0x100],
    factor: u32,
    secret: Vec<u32>,
    init_key: u32,
    tail_key: u8,
    key_pos: usize,
}

impl Cpz5Decoder {
    pub fn new(scheme: &CmvsScheme, key: u32, summand: u32) -> Self {
        let mut decoder = Self {
            table: [0; 0x100],
            factor: scheme.decoder_factor,
            secret: scheme.cpz5_secret.clone(),
            init_key: scheme.entry_init_key,
            tail_key: scheme.entry_tail_key,
            key_pos: scheme.entry_key_pos,
        };
        decoder.init(key, summand);
        decoder
    }

    /// Rebuilds the table from identity with 256 rounds of keyed swaps.
    pub fn init(&mut self, mut key: u32, summand: u32) {
        self.table
            .iter_mut()
            .enumerate()
            .for_each(|(i, b)| *b = i as u8);
        for _ in 0..0x100 {
            self.table
                .swap(((key >> 16) & 0xFF) as usize, (key & 0xFF) as usize);
            self.table
                .swap(((key >> 8) & 0xFF) as usize, (key >> 24) as usize);
            key = summand
                .wrapping_add(self.factor.wrapping_mul(key.rotate_right(2)));
        }
    }

    pub fn table(&self) -> &[u8; 0x100] {
        &self.table
    }

    pub fn decode(&self, buf: &mut [u8], xor_key: u8) {
        buf.iter_mut()
            .for_each(|b| *b = self.table[(*b ^ xor_key) as usize]);
    }

    pub fn encode(&self, buf: &mut [u8], xor_key: u8) {
        let inverse = self.inverse_table();
        buf.iter_mut()
            .for_each(|b| *b = inverse[*b as usize] ^ xor_key);
    }

    fn inverse_table(&self) -> [u8; 0x100] {
        let mut inverse = [0u8; 0x100];
        self.table
            .iter()
            .enumerate()
            .for_each(|(i, b)| inverse[*b as usize] = i as u8);
        inverse
    }

    /// Only the scheme's own words go through the table, missing words stay
    /// zero until the seed is mixed in.
    fn entry_secret(&self, cmvs_md5: &[u32; 4], seed: u32) -> [u32; SECRET_WORDS] {
        let key = (cmvs_md5[1] >> 2) as u8;
        let mut secret = [0u32; SECRET_WORDS];
        secret.iter_mut().zip(&self.secret).for_each(|(word, s)| {
            let mut bytes = s.to_le_bytes();
            bytes
                .iter_mut()
                .for_each(|b| *b = self.table[*b as usize] ^ key);
            *word = u32::from_le_bytes(bytes);
        });
        secret.iter_mut().for_each(|word| *word ^= seed);
        secret
    }

    /// Decrypts entry contents in place.
    pub fn decrypt_entry(&self, data: &mut [u8], cmvs_md5: &[u32; 4], seed: u32) {
        let secret = self.entry_secret(cmvs_md5, seed);
        let mut k = self.key_pos & 0xF;
        let mut v = self.init_key;
        let tail = map_words(data, |_, word| {
            let mut b = secret[k] >> 1;
            b ^= secret[((v >> 6) & 0xF) as usize];
            b ^= word;
            b = b.wrapping_sub(seed);
            b ^= cmvs_md5[(v & 3) as usize];
            v = v.wrapping_add(seed.wrapping_add(b));
            k = (k + 1) & 0xF;
            b
        });
        self.decode(tail, self.tail_key);
    }

    pub fn encrypt_entry(&self, data: &mut [u8], cmvs_md5: &[u32; 4], seed: u32) {
        let secret = self.entry_secret(cmvs_md5, seed);
        let mut k = self.key_pos & 0xF;
        let mut v = self.init_key;
        let tail = map_words(data, |_, plain| {
            let mut b = plain ^ cmvs_md5[(v & 3) as usize];
            b = b.wrapping_add(seed);
            b ^= secret[((v >> 6) & 0xF) as usize];
            b ^= secret[k] >> 1;
            v = v.wrapping_add(seed.wrapping_add(plain));
            k = (k + 1) & 0xF;
            b
        });
        self.encode(tail, self.tail_key);
    }
}
