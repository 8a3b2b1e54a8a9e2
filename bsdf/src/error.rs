//! BSDF Errors

use rcore::binio::BinaryError;
use thiserror::Error;

/// Errors loading BSDF data.
#[derive(Error, Debug)]
pub enum BsdfError {
    /// Reading the file failed.
    #[error(transparent)]
    Binary(#[from] BinaryError),

    /// The file header matches no known format.
    #[error("unrecognised BSDF header '{0}'")]
    UnknownFormat(String),

    /// A recognised format with a layout this reader does not handle.
    #[error("unsupported BSDF layout. {0}")]
    Unsupported(String),

    /// Sizes in the file are inconsistent.
    #[error("BSDF data size mismatch. {0}")]
    SizeMismatch(String),
}

/// A failed cache load. Every caller waiting on the same key receives a copy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to load BSDF '{key}'. {message}")]
pub struct CacheError {
    /// The key that failed.
    pub key: String,

    /// Description of the failure.
    pub message: String,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let e = BsdfError::SizeMismatch(String::from("145x145 expected"));
        assert_eq!(e.to_string(), "BSDF data size mismatch. 145x145 expected");

        let e = CacheError {
            key: String::from("glazing.bsdf"),
            message: e.to_string(),
        };
        assert!(e.to_string().starts_with("failed to load BSDF 'glazing.bsdf'"));
    }
}
