use std::{io, path::PathBuf, sync::Arc};

use thiserror::Error;

pub type Result<T, E = IclrError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum IclrError {
    /// A roster or taxonomy file could not be loaded as a whole.
    #[error("{}:{line}: {reason}", path.display())]
    DataFormat {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The bibliographic stream cannot be scanned any further.
    #[error("malformed bibliographic input at byte {position}: {reason}")]
    MalformedInput { position: u64, reason: String },

    /// Shared by the builder and every caller that waited on the same build.
    #[error("aggregation build failed: {0}")]
    BuildFailed(#[source] Arc<IclrError>),

    #[error("baseline area '{area}' has no usable data in {start}-{end}: {reason}")]
    BaselineUnavailable {
        area: String,
        start: i32,
        end: i32,
        reason: String,
    },

    #[error("invalid year range: start {start} is after end {end}")]
    InvalidRange { start: i32, end: i32 },

    #[error("configuration error: {0}")]
    Config(String),
}

impl IclrError {
    pub(crate) fn data_format(path: impl Into<PathBuf>, line: u64, reason: impl Into<String>) -> Self {
        IclrError::DataFormat {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        IclrError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn from_csv(path: &std::path::Path, err: csv::Error) -> Self {
        let line = err.position().map(|pos| pos.line()).unwrap_or(0);
        match err.into_kind() {
            csv::ErrorKind::Io(source) => IclrError::io(path, source),
            kind => IclrError::data_format(path, line, csv_kind_reason(kind)),
        }
    }

    /// The underlying cause, looking through shared build failures.
    pub fn root(&self) -> &IclrError {
        match self {
            IclrError::BuildFailed(inner) => inner.root(),
            other => other,
        }
    }

    /// Errors the caller can fix by asking a different question
    /// (another year range), as opposed to faults in the data or the process.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.root(),
            IclrError::BaselineUnavailable { .. } | IclrError::InvalidRange { .. }
        )
    }
}

fn csv_kind_reason(kind: csv::ErrorKind) -> String {
    match kind {
        csv::ErrorKind::Utf8 { err, .. } => format!("invalid UTF-8: {}", err),
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("expected {} fields, found {}", expected_len, len),
        other => format!("{:?}", other),
    }
}
