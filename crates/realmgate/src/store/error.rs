use thiserror::Error;

use crate::validation::ErrorKind;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    /// A token file exists but cannot be decrypted or parsed
    #[error("token storage corrupted: {0}")]
    StorageCorruption(String),

    #[error("no tokens stored for source '{0}'")]
    NotFound(String),

    #[error("token store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("token store crypto error: {0}")]
    Crypto(String),

    #[error("token serialization failed: {0}")]
    Serialization(String),
}

impl TokenStoreError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::StorageCorruption(_)
            | Self::Io(_)
            | Self::Crypto(_)
            | Self::Serialization(_) => ErrorKind::StorageCorruption,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::StorageCorruption(_))
    }
}

pub type Result<T> = std::result::Result<T, TokenStoreError>;
