use crate::util;
use bytes::{BufMut, Bytes, BytesMut};
use scroll::{ctx, Pread, LE};
use std::convert::TryInto;

/// Used to decrypt CPZ5 and CPZ6 header fields
const HEADER_KEYS_V5: [u32; 10] = [
    0xFE3A53D9, 0x37F298E7, 0x7A6F3A2C, 0x43DE7C19, 0xCC65F415, 0xD016A93C,
    0x97A3BA9A, 0xAE7D39BF, 0xFB73A955, 0x37ACF831,
];

/// Used to decrypt CPZ7 header fields
const HEADER_KEYS_V7: [u32; 12] = [
    0xFE3A53DA, 0x37F298E8, 0x7A6F3A2D, 0x43DE7C1A, 0xCC65F416, 0xD016A93D,
    0x97A3BA9B, 0xAE7D39B7, 0xFB73A956, 0x37ACF832, 0xA7B09C72, 0x65EF99F3,
];

const INIT_CHECKSUM: u32 = 0x923A564C;
const INIT_CHECKSUM_V7_SUB: u32 = 0x6DC5A9B4;

pub const HEADER_SIZE_V5: usize = 0x40;
pub const HEADER_SIZE_V7: usize = 0x48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpzHeader {
    pub version: u8,
    pub dir_count: i32,
    pub dir_entries_size: i32,
    pub file_entries_size: i32,
    pub index_md5: [u8; 16],
    pub cmvs_md5: [u32; 4],
    pub master_key: u32,
    pub encrypted_flag: u32,
    pub entry_key_raw: u32,
    pub entry_key: u32,
    pub reserved: u32,
    pub index_key_size: i32,
    pub init_checksum: u32,
    pub header_checksum: u32,
}

impl<'a> ctx::TryFromCtx<'a, scroll::Endian> for CpzHeader {
    type Error = anyhow::Error;
    fn try_from_ctx(
        buf: &'a [u8],
        _: scroll::Endian,
    ) -> Result<(Self, usize), Self::Error> {
        let version = buf.pread::<u8>(3)?.wrapping_sub(b'0');
        let keys: &[u32] = if version > 6 {
            &HEADER_KEYS_V7
        } else {
            &HEADER_KEYS_V5
        };
        let off = &mut 4;
        let dir_count = (buf.gread_with::<u32>(off, LE)? ^ keys[0]) as i32;
        let dir_entries_size =
            (buf.gread_with::<u32>(off, LE)? ^ keys[1]) as i32;
        let file_entries_size =
            (buf.gread_with::<u32>(off, LE)? ^ keys[2]) as i32;
        let index_md5 = buf
            .get(*off..*off + 16)
            .ok_or_else(|| anyhow::anyhow!("Header too short"))?
            .try_into()?;
        *off += 16;
        let mut cmvs_md5 = [0u32; 4];
        for (i, word) in cmvs_md5.iter_mut().enumerate() {
            *word = buf.gread_with::<u32>(off, LE)? ^ keys[i + 3];
        }
        let master_key = buf.gread_with::<u32>(off, LE)? ^ keys[7];
        let encrypted_flag = buf.gread_with::<u32>(off, LE)? ^ keys[8];
        let entry_key_raw = buf.gread_with::<u32>(off, LE)? ^ keys[9];
        let entry_key = if version > 5 {
            derive_entry_key(entry_key_raw)
        } else {
            0
        };
        let (reserved, index_key_size, init_checksum) = if version > 6 {
            let reserved = buf.gread_with::<u32>(off, LE)? ^ keys[10];
            let raw_size = buf.gread_with::<u32>(off, LE)?;
            (
                reserved,
                (raw_size ^ keys[11]) as i32,
                raw_size.wrapping_sub(INIT_CHECKSUM_V7_SUB),
            )
        } else {
            (0, 0, INIT_CHECKSUM)
        };
        let header_checksum = buf.gread_with::<u32>(off, LE)?;
        Ok((
            CpzHeader {
                version,
                dir_count,
                dir_entries_size,
                file_entries_size,
                index_md5,
                cmvs_md5,
                master_key,
                encrypted_flag,
                entry_key_raw,
                entry_key,
                reserved,
                index_key_size,
                init_checksum,
                header_checksum,
            },
            *off,
        ))
    }
}

impl CpzHeader {
    /// Returns `None` unless `buf` starts with a CPZ5-7 header whose
    /// checksum and sizes are consistent.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        match buf.get(..4)? {
            [b'C', b'P', b'Z', b'5'..=b'7'] => (),
            _ => return None,
        }
        let header = buf.pread::<CpzHeader>(0).ok()?;
        let checksum =
            util::checksum(&buf[..header.checksum_length()], header.init_checksum);
        if checksum != header.header_checksum {
            log::debug!(
                "CPZ header checksum mismatch: {:08X} != {:08X}",
                checksum,
                header.header_checksum
            );
            return None;
        }
        if header.dir_count < 0
            || header.dir_entries_size < 0
            || header.file_entries_size < 0
            || header.index_key_size < 0
        {
            return None;
        }
        Some(header)
    }

    pub fn header_size(&self) -> usize {
        if self.version > 6 {
            HEADER_SIZE_V7
        } else {
            HEADER_SIZE_V5
        }
    }

    fn checksum_length(&self) -> usize {
        if self.version > 6 {
            0x40
        } else {
            0x3C
        }
    }

    /// Size of directory and file tables
    pub fn tables_size(&self) -> usize {
        self.dir_entries_size as usize + self.file_entries_size as usize
    }

    pub fn index_size(&self) -> usize {
        self.tables_size() + self.index_key_size as usize
    }

    /// Where entry offsets are counted from
    pub fn data_offset(&self) -> usize {
        self.header_size() + self.index_size()
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted_flag != 0
    }

    /// Checks stored digests against the still encrypted index.
    pub fn verify_index(&self, index: &[u8]) -> bool {
        let tables = match index.get(..self.tables_size()) {
            Some(tables) => tables,
            None => return false,
        };
        if util::md5(tables) != self.index_md5 {
            return false;
        }
        if self.version > 6 && self.index_key_size > 0x10 {
            let key_region = match index.get(self.tables_size()..self.index_size())
            {
                Some(region) => region,
                None => return false,
            };
            return util::md5(&key_region[0x10..]) == key_region[..0x10];
        }
        true
    }

    /// Serializes the header and seals it with a freshly computed checksum.
    pub fn to_bytes(&self) -> Bytes {
        let keys: &[u32] = if self.version > 6 {
            &HEADER_KEYS_V7
        } else {
            &HEADER_KEYS_V5
        };
        let mut buf = BytesMut::with_capacity(self.header_size());
        buf.put_slice(b"CPZ");
        buf.put_u8(b'0' + self.version);
        buf.put_u32_le(self.dir_count as u32 ^ keys[0]);
        buf.put_u32_le(self.dir_entries_size as u32 ^ keys[1]);
        buf.put_u32_le(self.file_entries_size as u32 ^ keys[2]);
        buf.put_slice(&self.index_md5);
        for (i, word) in self.cmvs_md5.iter().enumerate() {
            buf.put_u32_le(word ^ keys[i + 3]);
        }
        buf.put_u32_le(self.master_key ^ keys[7]);
        buf.put_u32_le(self.encrypted_flag ^ keys[8]);
        buf.put_u32_le(self.entry_key_raw ^ keys[9]);
        let init_checksum = if self.version > 6 {
            let raw_size = self.index_key_size as u32 ^ keys[11];
            buf.put_u32_le(self.reserved ^ keys[10]);
            buf.put_u32_le(raw_size);
            raw_size.wrapping_sub(INIT_CHECKSUM_V7_SUB)
        } else {
            INIT_CHECKSUM
        };
        let checksum = util::checksum(&buf, init_checksum);
        buf.put_u32_le(checksum);
        buf.freeze()
    }
}

fn derive_entry_key(raw: u32) -> u32 {
    raw.rotate_right(5)
        .wrapping_mul(0x7DA8F173)
        .wrapping_add(0x13712765)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_header(version: u8) -> CpzHeader {
        CpzHeader {
            version,
            dir_count: 3,
            dir_entries_size: 0x60,
            file_entries_size: 0x140,
            index_md5: [0xAB; 16],
            cmvs_md5: [0x01020304, 0x05060708, 0x090A0B0C, 0x0D0E0F10],
            master_key: 0xDEADBEEF,
            encrypted_flag: 1,
            entry_key_raw: 0x12345678,
            entry_key: if version > 5 {
                derive_entry_key(0x12345678)
            } else {
                0
            },
            reserved: if version > 6 { 0x55 } else { 0 },
            index_key_size: if version > 6 { 0x40 } else { 0 },
            init_checksum: 0,
            header_checksum: 0,
        }
    }

    #[test]
    fn header_round_trip() {
        for version in 5..=7 {
            let bytes = sample_header(version).to_bytes();
            assert_eq!(bytes.len(), sample_header(version).header_size());
            let parsed = CpzHeader::parse(&bytes).unwrap();
            assert_eq!(parsed.version, version);
            assert_eq!(parsed.dir_count, 3);
            assert_eq!(parsed.cmvs_md5, sample_header(version).cmvs_md5);
            assert_eq!(parsed.entry_key, sample_header(version).entry_key);
            assert_eq!(parsed.to_bytes(), bytes);
        }
    }

    #[test]
    fn v7_checksum_starts_from_key_size() {
        let bytes = sample_header(7).to_bytes();
        let parsed = CpzHeader::parse(&bytes).unwrap();
        let raw_size = bytes.pread_with::<u32>(0x40, LE).unwrap();
        assert_eq!(parsed.index_key_size, 0x40);
        assert_eq!(parsed.init_checksum, raw_size.wrapping_sub(0x6DC5A9B4));
        assert_eq!(parsed.header_size(), 0x48);
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        let mut bytes = sample_header(5).to_bytes().to_vec();
        bytes[0x30] ^= 1;
        assert!(CpzHeader::parse(&bytes).is_none());
    }

    #[test]
    fn bad_signature_is_rejected() {
        let mut bytes = sample_header(6).to_bytes().to_vec();
        bytes[3] = b'8';
        assert!(CpzHeader::parse(&bytes).is_none());
        assert!(CpzHeader::parse(b"CPZ").is_none());
    }

    #[test]
    fn v6_entry_key_is_derived() {
        let parsed = CpzHeader::parse(&sample_header(6).to_bytes()).unwrap();
        assert_eq!(
            parsed.entry_key,
            0x12345678u32
                .rotate_right(5)
                .wrapping_mul(0x7DA8F173)
                .wrapping_add(0x13712765)
        );
        let parsed = CpzHeader::parse(&sample_header(5).to_bytes()).unwrap();
        assert_eq!(parsed.entry_key, 0);
    }

    #[test]
    fn verify_index_checks_both_digests() {
        let tables = vec![7u8; 0x20];
        let key_data = vec![9u8; 0x30];
        let mut header = sample_header(7);
        header.dir_entries_size = 0x10;
        header.file_entries_size = 0x10;
        header.index_key_size = 0x40;
        header.index_md5 = util::md5(&tables);

        let mut index = tables.clone();
        index.extend_from_slice(&util::md5(&key_data));
        index.extend_from_slice(&key_data);
        assert!(header.verify_index(&index));

        let last = index.len() - 1;
        index[last] ^= 1;
        assert!(!header.verify_index(&index));
        index[last] ^= 1;
        index[0] ^= 1;
        assert!(!header.verify_index(&index));
    }
}
