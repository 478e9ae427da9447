use thiserror::Error;

#[derive(Debug, Error)]
pub enum CmvsError {
    #[error("Encryption schemes database is empty or outdated")]
    OutdatedSchemeDatabase,
    #[error("Unknown encryption scheme for CPZ{0} archive")]
    UnknownEncryptionScheme(u8),
    #[error("Invalid scheme {0}: {1}")]
    InvalidScheme(String, String),
    #[error("Corrupted data: {0}")]
    Corrupted(String),
    #[error("{0}")]
    Custom(String),
}
