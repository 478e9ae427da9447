use crate::scheme::{cpz::CpzOpener, database::SchemeDatabase, Opener};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archive {
    Cpz5,
    Cpz6,
    Cpz7,
    NotRecognized,
}

impl Archive {
    /// Parse first few bytes of file to detect archive type
    pub fn parse(buf: &[u8]) -> Self {
        match buf {
            // CPZ5
            [0x43, 0x50, 0x5A, 0x35, ..] => Self::Cpz5,
            // CPZ6
            [0x43, 0x50, 0x5A, 0x36, ..] => Self::Cpz6,
            // CPZ7
            [0x43, 0x50, 0x5A, 0x37, ..] => Self::Cpz7,
            _ => Self::NotRecognized,
        }
    }
    pub fn version(&self) -> Option<u8> {
        match self {
            Self::Cpz5 => Some(5),
            Self::Cpz6 => Some(6),
            Self::Cpz7 => Some(7),
            Self::NotRecognized => None,
        }
    }
    /// Opener able to handle this archive type
    pub fn get_opener(
        &self,
        database: &SchemeDatabase,
    ) -> Option<Box<dyn Opener>> {
        match self {
            Self::Cpz5 | Self::Cpz6 | Self::Cpz7 => {
                Some(Box::new(CpzOpener::new(database.clone())))
            }
            Self::NotRecognized => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpz_versions_are_detected() {
        assert_eq!(Archive::parse(b"CPZ5\x00\x00"), Archive::Cpz5);
        assert_eq!(Archive::parse(b"CPZ6"), Archive::Cpz6);
        assert_eq!(Archive::parse(b"CPZ7").version(), Some(7));
        assert_eq!(Archive::parse(b"CPZ8"), Archive::NotRecognized);
        assert_eq!(Archive::parse(b"CP"), Archive::NotRecognized);
    }
}
