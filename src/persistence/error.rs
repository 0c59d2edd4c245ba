//! Persistence error types

use std::error::Error as StdError;
use thiserror::Error;

pub type BoxedError = Box<dyn StdError + Send + Sync>;

/// Errors raised by a [`PersistenceSink`](super::PersistenceSink).
///
/// Each failed call loses exactly one row; callers log and move on.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxedError>,
    },

    #[error("write failed: {message}")]
    Write {
        message: String,
        #[source]
        source: Option<BoxedError>,
    },

    #[error("schema setup failed: {message}")]
    Schema {
        message: String,
        #[source]
        source: Option<BoxedError>,
    },

    /// Raised by sinks that were told to reject writes
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    pub fn connection(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn write(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Write {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn schema(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Schema {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn helpers_keep_message_and_source() {
        let err = PersistenceError::write(
            "insert into rf_data",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        match err {
            PersistenceError::Write { message, source } => {
                assert_eq!(message, "insert into rf_data");
                assert!(source.is_some());
            }
            other => panic!("Expected Write variant, got {:?}", other),
        }
    }

    #[test]
    fn display_names_the_operation() {
        let err = PersistenceError::connection(
            "open data.db",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("open data.db"));
        assert!(PersistenceError::Unavailable("offline".into())
            .to_string()
            .contains("offline"));
    }
}
