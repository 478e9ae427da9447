//! MD5 with a caller supplied initial state.
//!
//! CMVS derives its archive keys by running the MD5 compression function over
//! a single block with a game specific starting state, so the state is exposed
//! instead of being hardcoded.

pub const MD5_INIT: [u32; 4] = [0x67452301, 0xEFCDAB89, 0x98BADCFE, 0x10325476];

const SHIFTS: [u32; 16] = [7, 12, 17, 22, 5, 9, 14, 20, 4, 11, 16, 23, 6, 10, 15, 21];

const SINES: [u32; 64] = [
    0xD76AA478, 0xE8C7B756, 0x242070DB, 0xC1BDCEEE, 0xF57C0FAF, 0x4787C62A,
    0xA8304613, 0xFD469501, 0x698098D8, 0x8B44F7AF, 0xFFFF5BB1, 0x895CD7BE,
    0x6B901122, 0xFD987193, 0xA679438E, 0x49B40821, 0xF61E2562, 0xC040B340,
    0x265E5A51, 0xE9B6C7AA, 0xD62F105D, 0x02441453, 0xD8A1E681, 0xE7D3FBC8,
    0x21E1CDE6, 0xC33707D6, 0xF4D50D87, 0x455A14ED, 0xA9E3E905, 0xFCEFA3F8,
    0x676F02D9, 0x8D2A4C8A, 0xFFFA3942, 0x8771F681, 0x6D9D6122, 0xFDE5380C,
    0xA4BEEA44, 0x4BDECFA9, 0xF6BB4B60, 0xBEBFBC70, 0x289B7EC6, 0xEAA127FA,
    0xD4EF3085, 0x04881D05, 0xD9D4D039, 0xE6DB99E5, 0x1FA27CF8, 0xC4AC5665,
    0xF4292244, 0x432AFF97, 0xAB9423A7, 0xFC93A039, 0x655B59C3, 0x8F0CCC92,
    0xFFEFF47D, 0x85845DD1, 0x6FA87E4F, 0xFE2CE6E0, 0xA3014314, 0x4E0811A1,
    0xF7537E82, 0xBD3AF235, 0x2AD7D2BB, 0xEB86D391,
];

/// One application of the MD5 compression function.
pub fn transform(state: &mut [u32; 4], block: &[u32; 16]) {
    let [mut a, mut b, mut c, mut d] = *state;
    for i in 0..64 {
        let (f, g) = match i / 16 {
            0 => ((b & c) | (!b & d), i),
            1 => ((d & b) | (!d & c), (5 * i + 1) % 16),
            2 => (b ^ c ^ d, (3 * i + 5) % 16),
            _ => (c ^ (b | !d), (7 * i) % 16),
        };
        let rotated = a
            .wrapping_add(f)
            .wrapping_add(SINES[i])
            .wrapping_add(block[g])
            .rotate_left(SHIFTS[(i / 16) * 4 + i % 4]);
        a = d;
        d = c;
        c = b;
        b = b.wrapping_add(rotated);
    }
    state[0] = state[0].wrapping_add(a);
    state[1] = state[1].wrapping_add(b);
    state[2] = state[2].wrapping_add(c);
    state[3] = state[3].wrapping_add(d);
}

/// Digest of `buf` starting from `init` instead of the usual state.
pub fn compute(buf: &[u8], init: [u32; 4]) -> [u8; 16] {
    let mut state = init;
    let mut message = buf.to_vec();
    message.push(0x80);
    while message.len() % 64 != 56 {
        message.push(0);
    }
    message.extend_from_slice(&((buf.len() as u64) << 3).to_le_bytes());

    let mut block = [0u32; 16];
    for chunk in message.chunks_exact(64) {
        block.iter_mut().zip(chunk.chunks_exact(4)).for_each(|(w, c)| {
            *w = u32::from_le_bytes([c[0], c[1], c[2], c[3]])
        });
        transform(&mut state, &block);
    }

    let mut digest = [0u8; 16];
    digest
        .chunks_exact_mut(4)
        .zip(state.iter())
        .for_each(|(d, s)| d.copy_from_slice(&s.to_le_bytes()));
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hex(digest: &[u8]) -> String {
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn known_digests() {
        assert_eq!(
            hex(&compute(b"", MD5_INIT)),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            hex(&compute(b"abc", MD5_INIT)),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            hex(&compute(
                b"12345678901234567890123456789012345678901234567890123456789012345678901234567890",
                MD5_INIT
            )),
            "57edf4a22be3c955ac49da2e2107b67a"
        );
    }

    #[test]
    fn single_block_matches_manual_padding() {
        let words = [0x01234567u32, 0x89ABCDEF, 0xFEDCBA98, 0x76543210];
        let mut bytes = Vec::new();
        words.iter().for_each(|w| bytes.extend_from_slice(&w.to_le_bytes()));

        let mut block = [0u32; 16];
        block[..4].copy_from_slice(&words);
        block[4] = 0x80;
        block[14] = 0x80;
        let mut state = MD5_INIT;
        transform(&mut state, &block);

        let digest = compute(&bytes, MD5_INIT);
        let expected = state
            .iter()
            .flat_map(|s| s.to_le_bytes().to_vec())
            .collect::<Vec<u8>>();
        assert_eq!(digest.to_vec(), expected);
    }
}
