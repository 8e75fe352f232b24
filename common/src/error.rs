//! Classified errors that map onto HTTP responses.
//!
//! Anything a handler returns that is not an [`HttpError`] is treated as a
//! defect and left for the Lambda runtime to report.

use std::fmt;

/// Boxed error shared by every handler. Identical to `lambda_runtime::Error`.
pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The closed set of error kinds a handler may classify a failure as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    ServerError,
    Unauthorized,
    UnsupportedMediaType,
    /// A missing or malformed querystring parameter. Reported as a bad request.
    QuerystringParameter,
}

impl ErrorKind {
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::BadRequest | ErrorKind::QuerystringParameter => 400,
            ErrorKind::ServerError => 500,
            ErrorKind::Unauthorized => 401,
            ErrorKind::UnsupportedMediaType => 415,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "Resource not found",
            ErrorKind::BadRequest | ErrorKind::QuerystringParameter => {
                "Bad request due to missing or malformed parameters"
            }
            ErrorKind::ServerError => "Internal Server Error",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::UnsupportedMediaType => "Unsupported Media Type",
        }
    }

    pub fn is_bad_request(self) -> bool {
        matches!(self, ErrorKind::BadRequest | ErrorKind::QuerystringParameter)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::ServerError => "ServerError",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::UnsupportedMediaType => "UnsupportedMediaType",
            ErrorKind::QuerystringParameter => "QuerystringParameterError",
        };
        f.write_str(name)
    }
}

/// A failure that [`format_errors`](crate::api_gateway::format_errors) turns
/// into an HTTP response. Displays as its detail message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HttpError {
    kind: ErrorKind,
    message: String,
}

impl HttpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        HttpError {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedMediaType, message)
    }

    pub fn querystring_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QuerystringParameter, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn description(&self) -> &'static str {
        self.kind.description()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
