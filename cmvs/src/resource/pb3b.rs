use crate::error::CmvsError;

const KEYED_OFFSET: usize = 8;
const KEYED_SIZE: usize = 0x2C;
const TAIL_KEY_OFFSET: usize = 0x2F;

/// Undoes the header obfuscation of PB3B images in place.
///
/// The 0x2C bytes after the magic are XORed with the key pair stored in
/// front of the last byte and salted with the 0x2C bytes preceding it.
pub fn decrypt(buf: &mut [u8]) -> anyhow::Result<()> {
    check_len(buf)?;
    let len = buf.len();
    let pair_key = [buf[len - 3], buf[len - 2]];
    let tail_key = buf[len - TAIL_KEY_OFFSET..len - 3].to_vec();
    buf.iter_mut()
        .skip(KEYED_OFFSET)
        .take(KEYED_SIZE)
        .enumerate()
        .for_each(|(i, b)| {
            *b ^= pair_key[i % 2];
            *b = b.wrapping_sub(tail_key[i]);
        });
    Ok(())
}

pub fn encrypt(buf: &mut [u8]) -> anyhow::Result<()> {
    check_len(buf)?;
    let len = buf.len();
    let pair_key = [buf[len - 3], buf[len - 2]];
    let tail_key = buf[len - TAIL_KEY_OFFSET..len - 3].to_vec();
    buf.iter_mut()
        .skip(KEYED_OFFSET)
        .take(KEYED_SIZE)
        .enumerate()
        .for_each(|(i, b)| {
            *b = b.wrapping_add(tail_key[i]);
            *b ^= pair_key[i % 2];
        });
    Ok(())
}

fn check_len(buf: &[u8]) -> anyhow::Result<()> {
    if buf.len() < KEYED_OFFSET + KEYED_SIZE || buf.len() < TAIL_KEY_OFFSET {
        return Err(CmvsError::Corrupted(format!(
            "Out of bounds access: PB3B of {:#X} bytes",
            buf.len()
        ))
        .into());
    }
    Ok(())
}
