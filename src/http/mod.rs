//! HTTP/1.x message parsing, framing and serialization.
pub mod body;
pub mod chunked;
mod field;
mod options;
mod parse;
mod pc;
mod reader;
mod request;
mod response;

pub use body::FramedBody;
pub use field::*;
pub use options::*;
pub use parse::*;
pub use reader::*;
pub use request::*;
pub use response::*;

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{HeaderError, MessageError};

/// Errors during HTTP parsing, formatting, or body framing.
#[derive(Error, Debug)]
pub enum HTTPError {
    /// Malformed request-line or request header block.
    #[error("{0}")]
    InvalidRequest(MessageError),

    /// Malformed status-line or response header block.
    #[error("{0}")]
    InvalidResponse(MessageError),

    /// Header name or value failed validation.
    #[error(transparent)]
    InvalidHeader(#[from] HeaderError),

    /// Body framing could not be determined or the framed data is malformed.
    #[error("{message}")]
    InvalidBody {
        /// Description of the error.
        message: String,
    },

    /// No decoder registered for a content or transfer coding.
    #[error("Encoding is not supported: '{0}'")]
    UnsupportedEncoding(String),

    /// IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HTTPError {
    pub(crate) fn invalid_body<M: Into<String>>(message: M) -> Self {
        Self::InvalidBody {
            message: message.into(),
        }
    }

    /// Returns the line and message for start-line and header block errors.
    pub fn message_error(&self) -> Option<&MessageError> {
        match self {
            HTTPError::InvalidRequest(error) | HTTPError::InvalidResponse(error) => Some(error),
            _ => None,
        }
    }

    /// Converts from an IO error, unwrapping errors created by [Self::into_io_error].
    pub(crate) fn from_io_error(error: std::io::Error) -> Self {
        if !error
            .get_ref()
            .map_or(false, |inner| inner.is::<HTTPError>())
        {
            return HTTPError::Io(error);
        }

        let kind = error.kind();

        match error.into_inner() {
            Some(inner) => match inner.downcast::<HTTPError>() {
                Ok(inner) => *inner,
                Err(inner) => HTTPError::Io(std::io::Error::new(kind, inner)),
            },
            None => HTTPError::Io(kind.into()),
        }
    }

    /// Converts to an IO error, unwrapping IO errors.
    pub(crate) fn into_io_error(self) -> std::io::Error {
        match self {
            HTTPError::Io(error) => error,
            error => std::io::Error::new(std::io::ErrorKind::InvalidData, error),
        }
    }
}

/// HTTP protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HttpVersion {
    /// HTTP/0.9
    #[serde(rename = "HTTP/0.9")]
    Http09,
    /// HTTP/1.0
    #[serde(rename = "HTTP/1.0")]
    Http10,
    /// HTTP/1.1
    #[default]
    #[serde(rename = "HTTP/1.1")]
    Http11,
}

impl HttpVersion {
    /// Version as written in start-lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http09 => "HTTP/0.9",
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
        }
    }

    /// Returns the version for a major and minor number pair.
    pub fn from_pair(major: u8, minor: u8) -> Option<Self> {
        match (major, minor) {
            (0, 9) => Some(HttpVersion::Http09),
            (1, 0) => Some(HttpVersion::Http10),
            (1, 1) => Some(HttpVersion::Http11),
            _ => None,
        }
    }

    /// Returns whether the text is a version token of the form `HTTP/` DIGIT `.` DIGIT.
    ///
    /// The version may not be a supported one.
    pub fn is_well_formed(text: &str) -> bool {
        pc::parse_http_version(text).is_ok()
    }
}

impl Display for HttpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unsupported or malformed version token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown HTTP version")]
pub struct UnknownVersionError;

impl FromStr for HttpVersion {
    type Err = UnknownVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = pc::parse_http_version(s).map_err(|_| UnknownVersionError)?;
        HttpVersion::from_pair(major, minor).ok_or(UnknownVersionError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        assert_eq!("HTTP/1.1".parse(), Ok(HttpVersion::Http11));
        assert_eq!("HTTP/1.0".parse(), Ok(HttpVersion::Http10));
        assert_eq!("HTTP/0.9".parse(), Ok(HttpVersion::Http09));
        assert_eq!("HTTP/2.0".parse::<HttpVersion>(), Err(UnknownVersionError));
        assert_eq!("HTTP/1.1 ".parse::<HttpVersion>(), Err(UnknownVersionError));
        assert_eq!("http/1.1".parse::<HttpVersion>(), Err(UnknownVersionError));
        assert_eq!(HttpVersion::default(), HttpVersion::Http11);
    }

    #[test]
    fn test_version_well_formed() {
        assert!(HttpVersion::is_well_formed("HTTP/2.0"));
        assert!(HttpVersion::is_well_formed("HTTP/1.1"));
        assert!(!HttpVersion::is_well_formed("HTTP/1"));
        assert!(!HttpVersion::is_well_formed("HTTP/1.10"));
        assert!(!HttpVersion::is_well_formed("HTP/1.1"));
    }

    #[test]
    fn test_error_message() {
        let error = HTTPError::InvalidRequest(MessageError::new(1, "Missing HTTP version"));

        assert_eq!(error.to_string(), "Missing HTTP version");
        assert_eq!(error.message_error().map(|e| e.line()), Some(1));
        assert!(HTTPError::invalid_body("bad").message_error().is_none());
    }

    #[test]
    fn test_io_error_round_trip() {
        let error = HTTPError::from_io_error(HTTPError::invalid_body("bad").into_io_error());
        assert!(matches!(error, HTTPError::InvalidBody { .. }));
        assert_eq!(error.to_string(), "bad");

        let error = HTTPError::from_io_error(std::io::ErrorKind::BrokenPipe.into());
        assert!(matches!(error, HTTPError::Io(_)));
    }
}
