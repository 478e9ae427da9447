use anyhow::Context;
use bytes::{BufMut, BytesMut};
use scroll::{Pread, LE};

pub const HEADER_SIZE: usize = 0x30;

const FRAME_SIZE: usize = 0x800;
const FRAME_MASK: usize = FRAME_SIZE - 1;
const FRAME_START: usize = 0x7DF;

/// Header of a PS2A compiled script
#[derive(Debug, Clone, Pread)]
pub struct Ps2Header {
    pub magic: [u8; 4],
    pub header_size: u32,
    pub unk1: u32,
    pub key: u32,
    pub unk2: [u8; 12],
    /// Bytecode length inside the unpacked data
    pub code_size: u32,
    /// String table length, follows the bytecode
    pub strings_size: u32,
    pub packed_size: u32,
    pub unpacked_size: u32,
    pub unk3: u32,
}

/// Descrambles and decompresses a PS2A blob, header excluded.
pub fn unpack(mut buf: Vec<u8>) -> anyhow::Result<Vec<u8>> {
    let header = buf.pread_with::<Ps2Header>(0, LE)?;
    log::debug!("PS2A header: {:X?}", header);
    let data = buf.get_mut(HEADER_SIZE..).context("PS2A too short")?;
    descramble(data, header.key);
    lzss_decompress(data, header.unpacked_size as usize)
}

/// Builds a PS2A blob holding `data` as plain literals.
pub fn pack(data: &[u8], code_size: u32, key: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + data.len() / 8 + 1);
    for chunk in data.chunks(8) {
        body.push(0xFF);
        body.extend_from_slice(chunk);
    }
    scramble(&mut body, key);

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
    buf.put_slice(b"PS2A");
    buf.put_u32_le(HEADER_SIZE as u32);
    buf.put_u32_le(0);
    buf.put_u32_le(key);
    buf.put_slice(&[0; 12]);
    buf.put_u32_le(code_size);
    buf.put_u32_le(data.len() as u32 - code_size);
    buf.put_u32_le(body.len() as u32);
    buf.put_u32_le(data.len() as u32);
    buf.put_u32_le(0);
    buf.put_slice(&body);
    buf.to_vec()
}

fn scramble_key(key: u32) -> (u8, u32) {
    let shift = (key >> 20) % 5 + 1;
    let key = (key >> 24).wrapping_add(key >> 3);
    (key as u8, shift)
}

fn descramble(data: &mut [u8], key: u32) {
    let (key, shift) = scramble_key(key);
    data.iter_mut()
        .for_each(|b| *b = (key ^ b.wrapping_sub(0x7C)).rotate_right(shift));
}

fn scramble(data: &mut [u8], key: u32) {
    let (key, shift) = scramble_key(key);
    data.iter_mut()
        .for_each(|b| *b = (b.rotate_left(shift) ^ key).wrapping_add(0x7C));
}

fn lzss_decompress(input: &[u8], output_size: usize) -> anyhow::Result<Vec<u8>> {
    // a two byte back reference expands to at most 0x21 bytes
    let mut output = Vec::with_capacity(output_size.min(input.len() * 17));
    let mut frame = [0u8; FRAME_SIZE];
    let mut frame_pos = FRAME_START;
    let mut src = input.iter().copied();
    let mut next = || src.next().context("PS2A data ended prematurely");
    let mut ctl = 1u32;
    while output.len() < output_size {
        if ctl == 1 {
            ctl = next()? as u32 | 0x100;
        }
        if ctl & 1 != 0 {
            let b = next()?;
            output.push(b);
            frame[frame_pos] = b;
            frame_pos = (frame_pos + 1) & FRAME_MASK;
        } else {
            let lo = next()? as usize;
            let hi = next()? as usize;
            let offset = lo | (hi & 0xE0) << 3;
            let count = (hi & 0x1F) + 2;
            for i in 0..count {
                if output.len() == output_size {
                    break;
                }
                let b = frame[(offset + i) & FRAME_MASK];
                output.push(b);
                frame[frame_pos] = b;
                frame_pos = (frame_pos + 1) & FRAME_MASK;
            }
        }
        ctl >>= 1;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn back_reference_copies_from_window() {
        // three literals followed by a 6 byte copy from the window start
        let input = [0x07, b'a', b'b', b'c', 0xDF, 0xE4];
        assert_eq!(lzss_decompress(&input, 9).unwrap(), b"abcabcabc");
    }

    #[test]
    fn unset_window_reads_zeroes() {
        let input = [0x00, 0x00, 0x01];
        assert_eq!(lzss_decompress(&input, 3).unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert!(lzss_decompress(&[0xFF, 1, 2], 5).is_err());
    }

    #[test]
    fn oversized_unpacked_size_is_an_error() {
        assert!(lzss_decompress(&[0xFF, 1, 2], usize::MAX).is_err());
        assert!(lzss_decompress(&[], u32::MAX as usize).is_err());
    }

    #[test]
    fn packed_script_unpacks() {
        let data = (0..300u32).map(|i| (i * 31) as u8).collect::<Vec<u8>>();
        for key in &[0u32, 0x12345678, 0xFFFFFFFF, 0x00A00000] {
            let packed = pack(&data, 100, *key);
            let header = packed.pread_with::<Ps2Header>(0, LE).unwrap();
            assert_eq!(header.code_size, 100);
            assert_eq!(header.strings_size, 200);
            assert_eq!(unpack(packed).unwrap(), data);
        }
    }
}
