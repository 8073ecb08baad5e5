mod ext;
mod macros;

use crate::prelude::*;
use crate::util::DynError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing_error::SpanTrace;

pub(crate) use macros::*;

pub(crate) mod prelude {
    pub(crate) use super::ext::{OptionExt as _, ResultExt as _};
    pub(crate) use super::{err, err_ctx, fatal, ErrorKind, Result};
}

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Describes any unexpected error that may happen during the distribution.
///
/// Expected conditions (no eligible channels, cooldowns, per-channel send
/// failures) are never represented with this type. They are part of the
/// distribution report instead.
#[derive(Clone)]
pub struct Error {
    imp: Arc<ErrorImp>,
}

struct ErrorImp {
    /// Small identifier used for debugging purposes.
    /// It is mentioned in the distribution report when the error happens,
    /// so that the logs could be looked up by it.
    id: String,
    kind: ErrorKind,

    // Participates only in debug impl
    spantrace: SpanTrace,
}

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error(transparent)]
    Db {
        #[from]
        source: crate::db::DbError,
    },

    #[error(transparent)]
    HttpClient {
        #[from]
        source: crate::http::HttpClientError,
    },

    #[error("Unknown content kind `{kind}`")]
    InvalidContentKind { kind: String },

    #[error("Malformed content envelope")]
    InvalidEnvelope { source: serde_json::Error },

    #[error("Failed to read file {path}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Unrecoverable kind of error, that is not supposed to happen, but when
    /// it happens we can't do anything reasonable about it, so no structural
    /// error handling is possible, this error is just propagated to the top.
    #[error("FATAL: {message}")]
    Fatal {
        message: String,
        source: Option<Box<DynError>>,
    },
}

impl From<sqlx::Error> for ErrorKind {
    fn from(err: sqlx::Error) -> Self {
        Self::Db { source: err.into() }
    }
}

impl From<sqlx_bat::Error> for ErrorKind {
    fn from(err: sqlx_bat::Error) -> Self {
        Self::Db { source: err.into() }
    }
}

impl Error {
    pub fn id(&self) -> &str {
        &self.imp.id
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.imp.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error (id: {}): {}", self.imp.id, self.imp.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.imp.kind.source()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)?;
        fmt::Display::fmt(&self.imp.spantrace, f)
    }
}

impl<T: Into<ErrorKind>> From<T> for Error {
    #[track_caller]
    fn from(kind: T) -> Self {
        let imp = ErrorImp {
            kind: kind.into(),
            id: nanoid::nanoid!(6),
            spantrace: SpanTrace::capture(),
        };

        let err = Self { imp: Arc::new(imp) };

        trace!(err = tracing_err(&err), "Created an error");

        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn fatal_error_keeps_message_and_id() {
        let err = fatal!("channel {} vanished", 42);

        assert_eq!(err.id().len(), 6);
        assert_matches!(err.kind(), ErrorKind::Fatal { message, source: None } if message == "channel 42 vanished");
        assert!(err.to_string().ends_with("FATAL: channel 42 vanished"));
    }

    #[test]
    fn option_fatal_ctx() {
        let err = None::<u8>.fatal_ctx(|| "nothing here").unwrap_err();
        assert_matches!(err.kind(), ErrorKind::Fatal { .. });
    }
}
