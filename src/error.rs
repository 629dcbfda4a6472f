//! Errors related to this crate.

use std::fmt::Display;

use thiserror::Error;

/// Error in the start-line or header block of a message.
///
/// The line number is 1-based. Line 0 is used when the input had no content
/// before any line could be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct MessageError {
    line: u64,
    message: String,
}

impl MessageError {
    /// Creates an error with the given line number and message.
    pub fn new<M: Into<String>>(line: u64, message: M) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }

    /// Line number where the error occurred.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Description of the error.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Header name or value does not conform to the field grammar.
///
/// Indexes are 0-based character positions of the first illegal character.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    /// Name contains a character not allowed in a token.
    #[error("Invalid header name: illegal character at index {index}: '{name}'")]
    InvalidName {
        /// Position of the illegal character.
        index: usize,
        /// The rejected name.
        name: String,
    },

    /// Value contains a character not allowed in a field value.
    #[error("Invalid header value: illegal character at index {index}: '{}'", .value.escape_debug())]
    InvalidValue {
        /// Position of the illegal character.
        index: usize,
        /// The rejected value.
        value: String,
    },
}

impl HeaderError {
    /// Position of the first illegal character.
    pub fn index(&self) -> usize {
        match self {
            HeaderError::InvalidName { index, .. } => *index,
            HeaderError::InvalidValue { index, .. } => *index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_error_display() {
        let error = MessageError::new(2, "Invalid header: missing the ':' separator");

        assert_eq!(error.line(), 2);
        assert_eq!(error.to_string(), "Invalid header: missing the ':' separator");
    }

    #[test]
    fn test_header_error_display() {
        let error = HeaderError::InvalidName {
            index: 1,
            name: "a b".to_string(),
        };
        assert_eq!(error.index(), 1);
        assert_eq!(
            error.to_string(),
            "Invalid header name: illegal character at index 1: 'a b'"
        );

        let error = HeaderError::InvalidValue {
            index: 1,
            value: "a\nb".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid header value: illegal character at index 1: 'a\\nb'"
        );
    }
}
