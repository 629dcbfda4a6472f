use serde::{Deserialize, Serialize};

use crate::header::HeaderCharset;

/// Strictness policy for parsing HTTP messages.
///
/// The default is lenient and accepts the common deviations found in
/// hand-written messages. [RawHttpOptions::strict] rejects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawHttpOptions {
    insert_http_version_if_missing: bool,
    ignore_leading_empty_line: bool,
    allow_new_line_without_return: bool,
    insert_host_header_if_missing: bool,
    allow_illegal_start_line_characters: bool,
    allow_comments: bool,
    allow_content_length_mismatch: bool,
    header_charset: HeaderCharset,
    max_header_name_length: usize,
    max_header_value_length: usize,
    max_line_length: u64,
}

impl RawHttpOptions {
    /// Creates the default lenient options.
    pub fn new() -> Self {
        Self {
            insert_http_version_if_missing: true,
            ignore_leading_empty_line: true,
            allow_new_line_without_return: true,
            insert_host_header_if_missing: true,
            allow_illegal_start_line_characters: false,
            allow_comments: false,
            allow_content_length_mismatch: false,
            header_charset: HeaderCharset::Latin1,
            max_header_name_length: 1000,
            max_header_value_length: 4000,
            max_line_length: 65536,
        }
    }

    /// Creates options that follow the grammar without any tolerance.
    pub fn strict() -> Self {
        Self {
            insert_http_version_if_missing: false,
            ignore_leading_empty_line: false,
            allow_new_line_without_return: false,
            insert_host_header_if_missing: false,
            ..Self::new()
        }
    }

    /// Returns whether start-lines without a version default to HTTP/1.1.
    pub fn insert_http_version_if_missing(&self) -> bool {
        self.insert_http_version_if_missing
    }

    /// Sets whether start-lines without a version default to HTTP/1.1.
    ///
    /// When false, a missing version is an error.
    pub fn set_insert_http_version_if_missing(&mut self, value: bool) -> &mut Self {
        self.insert_http_version_if_missing = value;
        self
    }

    /// Returns whether empty lines before the start-line are skipped.
    pub fn ignore_leading_empty_line(&self) -> bool {
        self.ignore_leading_empty_line
    }

    /// Sets whether empty lines before the start-line are skipped.
    pub fn set_ignore_leading_empty_line(&mut self, value: bool) -> &mut Self {
        self.ignore_leading_empty_line = value;
        self
    }

    /// Returns whether a LF without a preceding CR ends a line.
    pub fn allow_new_line_without_return(&self) -> bool {
        self.allow_new_line_without_return
    }

    /// Sets whether a LF without a preceding CR ends a line.
    pub fn set_allow_new_line_without_return(&mut self, value: bool) -> &mut Self {
        self.allow_new_line_without_return = value;
        self
    }

    /// Returns whether a `Host` header is added from the request-line authority.
    pub fn insert_host_header_if_missing(&self) -> bool {
        self.insert_host_header_if_missing
    }

    /// Sets whether a `Host` header is added from the request-line authority.
    pub fn set_insert_host_header_if_missing(&mut self, value: bool) -> &mut Self {
        self.insert_host_header_if_missing = value;
        self
    }

    /// Returns whether illegal characters in a request target are percent-encoded
    /// instead of rejected.
    pub fn allow_illegal_start_line_characters(&self) -> bool {
        self.allow_illegal_start_line_characters
    }

    /// Sets whether illegal characters in a request target are percent-encoded
    /// instead of rejected.
    pub fn set_allow_illegal_start_line_characters(&mut self, value: bool) -> &mut Self {
        self.allow_illegal_start_line_characters = value;
        self
    }

    /// Returns whether metadata lines starting with `#` are skipped.
    pub fn allow_comments(&self) -> bool {
        self.allow_comments
    }

    /// Sets whether metadata lines starting with `#` are skipped.
    pub fn set_allow_comments(&mut self, value: bool) -> &mut Self {
        self.allow_comments = value;
        self
    }

    /// Returns whether a body shorter than its `Content-Length` is accepted.
    pub fn allow_content_length_mismatch(&self) -> bool {
        self.allow_content_length_mismatch
    }

    /// Sets whether a body shorter than its `Content-Length` is accepted.
    pub fn set_allow_content_length_mismatch(&mut self, value: bool) -> &mut Self {
        self.allow_content_length_mismatch = value;
        self
    }

    /// Returns the charset of header names and values.
    pub fn header_charset(&self) -> HeaderCharset {
        self.header_charset
    }

    /// Sets the charset of header names and values.
    pub fn set_header_charset(&mut self, value: HeaderCharset) -> &mut Self {
        self.header_charset = value;
        self
    }

    /// Returns the maximum number of characters in a header name.
    pub fn max_header_name_length(&self) -> usize {
        self.max_header_name_length
    }

    /// Sets the maximum number of characters in a header name.
    pub fn set_max_header_name_length(&mut self, value: usize) -> &mut Self {
        self.max_header_name_length = value;
        self
    }

    /// Returns the maximum number of characters in a header value.
    pub fn max_header_value_length(&self) -> usize {
        self.max_header_value_length
    }

    /// Sets the maximum number of characters in a header value.
    pub fn set_max_header_value_length(&mut self, value: usize) -> &mut Self {
        self.max_header_value_length = value;
        self
    }

    /// Returns the maximum number of octets in a metadata or chunk-size line.
    pub fn max_line_length(&self) -> u64 {
        self.max_line_length
    }

    /// Sets the maximum number of octets in a metadata or chunk-size line.
    pub fn set_max_line_length(&mut self, value: u64) -> &mut Self {
        self.max_line_length = value;
        self
    }
}

impl Default for RawHttpOptions {
    fn default() -> Self {
        Self::new()
    }
}
