use crate::util::md5;
use serde::{Deserialize, Serialize};

/// Engine specific flavour of the MD5 used to derive CPZ keys.
///
/// Every variant hashes the same single padded block and differs only in the
/// starting state and in how the final state words are recombined.
///
/// Only `Aoi` has been checked against a working CPZ7 decoder. The other
/// variants' constants are unverified and may need correcting once archives
/// of those titles are at hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Md5Variant {
    A,
    B,
    Chrono,
    Memoria,
    Natsu,
    Aoi,
    Mirai,
}

impl Default for Md5Variant {
    fn default() -> Self {
        Self::A
    }
}

impl Md5Variant {
    fn init_state(self) -> [u32; 4] {
        match self {
            Self::A | Self::B => [0xC74A2B01, 0xE7C8AB8F, 0xD8BEDC4E, 0x7302A4C5],
            Self::Chrono => md5::MD5_INIT,
            Self::Memoria => [0xC74A2B03, 0xE7C8AB8F, 0xD8BEDC4E, 0x7302A4C5],
            Self::Natsu => [0xC74A2B02, 0xE7C8AB8F, 0xD8BEDC4E, 0x7302A4C5],
            Self::Aoi | Self::Mirai => {
                [0xC74A2B02, 0xE7C8AB8F, 0x38BEBC4E, 0x7531A4C3]
            }
        }
    }

    fn recombine(self, [a, b, c, d]: [u32; 4]) -> [u32; 4] {
        match self {
            Self::A => [d, b, c, a],
            Self::B => [
                c ^ 0x49875325,
                b.wrapping_add(0x54F46D7D),
                d ^ 0xAD7948B7,
                a.wrapping_add(0x1D0638AD),
            ],
            Self::Chrono => [
                c ^ 0x45A2E1E3,
                b.wrapping_add(0x56F46D7D),
                d ^ 0xA76B48B7,
                a.wrapping_add(0x130638AD),
            ],
            Self::Memoria => [
                d ^ 0x4B8A5C3E,
                b.wrapping_add(0x53A16D2F),
                c ^ 0xA95B4C7A,
                a.wrapping_add(0x1C0739AE),
            ],
            Self::Natsu | Self::Aoi => [
                c ^ 0x53A76D2E,
                b.wrapping_add(0x5BB17FDA),
                a.wrapping_add(0x6853E14D),
                d ^ 0xF5C6A9A3,
            ],
            Self::Mirai => [
                c ^ 0x53A76D3E,
                b.wrapping_add(0x5BB17FDA),
                a.wrapping_add(0x6853E14D),
                d ^ 0xF5C6B9A3,
            ],
        }
    }

    /// Hashes the four header words into the key material used by every
    /// later decryption stage.
    pub fn compute(self, data: [u32; 4]) -> [u32; 4] {
        let mut block = [0u32; 16];
        block[..4].copy_from_slice(&data);
        block[4] = 0x80;
        block[14] = 0x80;
        let mut state = self.init_state();
        md5::transform(&mut state, &block);
        self.recombine(state)
    }
}
