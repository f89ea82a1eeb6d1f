use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Durable storage unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Stored value is corrupt: {0}")]
    Corrupt(String),

    #[error("Keychain error: {0}")]
    Keychain(#[from] keyring::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether this error just means "no durable storage here", as opposed
    /// to a backend that exists but failed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_classification() {
        assert!(StorageError::Unavailable("headless".into()).is_unavailable());
        assert!(!StorageError::InvalidKey("../x".into()).is_unavailable());
        assert!(!StorageError::Corrupt("bad tag".into()).is_unavailable());
    }

    #[test]
    fn test_io_error_converts() {
        let err: StorageError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }
}
