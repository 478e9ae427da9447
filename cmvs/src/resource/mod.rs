pub mod pb3b;
pub mod ps2;

/// Payload tags that need processing after an entry is decrypted
#[derive(Debug, PartialEq, Eq)]
pub enum ResourceMagic {
    PS2A,
    PB3B,
    Unrecognized,
}

impl ResourceMagic {
    pub fn parse_magic(buf: &[u8]) -> Self {
        match buf {
            // PS2A
            [0x50, 0x53, 0x32, 0x41, ..] => Self::PS2A,
            // PB3B
            [0x50, 0x42, 0x33, 0x42, ..] => Self::PB3B,
            _ => Self::Unrecognized,
        }
    }
    /// Unpacks PS2 scripts and descrambles PB3 images, anything else is
    /// returned untouched.
    pub fn process(&self, mut buf: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        match self {
            Self::PS2A => ps2::unpack(buf),
            Self::PB3B => {
                pb3b::decrypt(&mut buf)?;
                Ok(buf)
            }
            Self::Unrecognized => Ok(buf),
        }
    }
}
