use crate::backup::result_error::WithMsg;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error("cannot read source {path:?}: {source}")]
    SourceAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing snapshot {path:?} failed: {source}")]
    ArchiveWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot delete snapshot {path:?}: {source}")]
    RetentionDelete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::from(io_error);

        match error {
            Error::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_with_msg() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::from(io_error).with_msg("Custom message");

        match error {
            Error::WithMsg { msg, .. } => assert_eq!(msg, "Custom message"),
            _ => panic!("Expected WithMsg error"),
        }
    }

    #[test]
    fn test_error_with_msg_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::from(io_error).with_msg("Operation failed");
        let error_str = error.to_string();

        assert!(error_str.contains("Operation failed"));
        assert!(error_str.contains("file not found"));
    }

    #[test]
    fn test_source_access_display() {
        let error = Error::SourceAccess {
            path: PathBuf::from("/data/missing"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
        };
        let error_str = error.to_string();

        assert!(error_str.contains("/data/missing"));
        assert!(error_str.contains("no such directory"));
    }

    #[test]
    fn test_retention_delete_display() {
        let error = Error::RetentionDelete {
            path: PathBuf::from("/backups/2024-01-01"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(error.to_string().contains("2024-01-01"));
    }
}
