use thiserror::Error;

/// Coarse classification of failures, used by the HTTP layer to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Upstream,
    Conflict,
    Auth,
    Internal,
    Canceled,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{platform} returned {status}: {message}")]
    Upstream {
        platform: &'static str,
        status: u16,
        message: String,
    },

    #[error("{context}: {source}")]
    Request {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Auth(String),

    /// Token refresh failed on the provider side; surfaces as a server error.
    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{0}")]
    Internal(String),

    #[error("operation canceled: {0}")]
    Canceled(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Upstream { .. } | Error::Request { .. } | Error::Parse { .. } => {
                ErrorKind::Upstream
            }
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Auth(_) | Error::Refresh(_) => ErrorKind::Auth,
            Error::Database(_) | Error::Internal(_) => ErrorKind::Internal,
            Error::Canceled(_) => ErrorKind::Canceled,
        }
    }

    pub fn parse(what: impl Into<String>, message: impl ToString) -> Self {
        Error::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    pub fn request(context: impl Into<String>, source: reqwest::Error) -> Self {
        Error::Request {
            context: context.into(),
            source,
        }
    }
}

/// Turns `QueryReturnedNoRows` into a `NotFound` naming the missing entity.
pub trait OptionalRow<T> {
    fn or_not_found(self, what: impl FnOnce() -> String) -> Result<T>;
}

impl<T> OptionalRow<T> for rusqlite::Result<T> {
    fn or_not_found(self, what: impl FnOnce() -> String) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::NotFound(what())),
            Err(e) => Err(Error::Database(e)),
        }
    }
}
