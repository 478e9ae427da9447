pub mod huffman;
pub mod md5;

pub fn md5(buf: &[u8]) -> [u8; 16] {
    md5::compute(buf, md5::MD5_INIT)
}

/// Rewrites every whole little endian word of `buf` with `f(word_index, word)`
/// and returns the trailing bytes that did not fill a word.
pub fn map_words<F>(buf: &mut [u8], mut f: F) -> &mut [u8]
where
    F: FnMut(usize, u32) -> u32,
{
    let mut chunks = buf.chunks_exact_mut(4);
    for (i, chunk) in (&mut chunks).enumerate() {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&f(i, word).to_le_bytes());
    }
    chunks.into_remainder()
}

/// Wrapping sum of little endian words followed by the leftover bytes.
pub fn checksum(buf: &[u8], init: u32) -> u32 {
    let chunks = buf.chunks_exact(4);
    let tail = chunks.remainder();
    let sum = chunks.fold(init, |sum, c| {
        sum.wrapping_add(u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
    });
    tail.iter().fold(sum, |sum, b| sum.wrapping_add(*b as u32))
}

/// Reads a NUL terminated Shift-JIS string.
pub fn read_cstring(buf: &[u8]) -> String {
    use encoding_rs::SHIFT_JIS;

    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    SHIFT_JIS.decode(&buf[..end]).0.to_string()
}
