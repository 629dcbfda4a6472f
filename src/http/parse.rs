use std::{borrow::Cow, fmt::Display, io::BufRead};

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use url::Url;

use crate::{
    error::MessageError,
    header::{HeaderCollection, HeaderCollectionBuilder},
    io::BufReadMoreExt,
    stringutil::index_of_not_allowed_in_tokens,
};

use super::{HTTPError, HttpVersion, RawHttpOptions, StatusLine};

/// Part of a message being parsed.
///
/// Determines which [HTTPError] variant a parse failure is reported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    /// Request-line and request headers.
    Request,
    /// Status-line and response headers.
    Response,
    /// Trailer headers of a chunked body.
    Trailer,
}

impl MetadataKind {
    /// Creates the error for a failure at the given line.
    pub fn error<M: Into<String>>(&self, line: u64, message: M) -> HTTPError {
        match self {
            MetadataKind::Request => HTTPError::InvalidRequest(MessageError::new(line, message)),
            MetadataKind::Response => HTTPError::InvalidResponse(MessageError::new(line, message)),
            MetadataKind::Trailer => {
                HTTPError::invalid_body(format!("{} (trailer header)", message.into()))
            }
        }
    }
}

/// Request target as written in the request-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    /// Path and optional query. The host must come from the `Host` header.
    Origin(String),
    /// Target carrying its own authority (absolute-form or authority-form).
    Absolute(Url),
    /// `*` of an `OPTIONS` request. The host must come from the `Host` header.
    Asterisk,
}

/// Request-line before the target has been reconciled with the `Host` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLineParts {
    /// Request method.
    pub method: String,
    /// Request target.
    pub target: RequestTarget,
    /// Request target as written, with illegal characters escaped.
    pub raw_target: String,
    /// Protocol version.
    pub version: HttpVersion,
}

/// Parses start-lines and header blocks.
#[derive(Debug, Clone, Default)]
pub struct MetadataParser {
    options: RawHttpOptions,
}

impl MetadataParser {
    /// Creates a parser with the given options.
    pub fn new(options: RawHttpOptions) -> Self {
        Self { options }
    }

    /// Returns the parser options.
    pub fn options(&self) -> &RawHttpOptions {
        &self.options
    }

    /// Reads a line and returns it without the line ending.
    ///
    /// Returns `None` if the stream was at EOF.
    pub fn read_line<'b, R: BufRead>(
        &self,
        stream: &mut R,
        kind: MetadataKind,
        line_number: u64,
        buffer: &'b mut Vec<u8>,
    ) -> Result<Option<&'b [u8]>, HTTPError> {
        buffer.clear();

        let amount = stream.read_limit_until(b'\n', buffer, self.options.max_line_length())?;

        if amount == 0 {
            return Ok(None);
        }

        let data: &'b [u8] = buffer;

        let line = if let Some(line) = data.strip_suffix(b"\r\n") {
            line
        } else if let Some(line) = data.strip_suffix(b"\n") {
            if !self.options.allow_new_line_without_return() {
                return Err(kind.error(
                    line_number,
                    "Illegal new-line character without preceding return",
                ));
            }

            tracing::trace!(line_number, "new-line without return");

            line
        } else {
            data
        };

        if line.contains(&b'\r') {
            return Err(kind.error(line_number, "Illegal character after return"));
        }

        Ok(Some(line))
    }

    /// Reads the start-line, skipping leading empty lines and comments if allowed.
    ///
    /// Returns the line and its line number.
    pub fn read_start_line<R: BufRead>(
        &self,
        stream: &mut R,
        kind: MetadataKind,
    ) -> Result<(String, u64), HTTPError> {
        let mut buffer = Vec::new();
        let mut line_number = 0;

        loop {
            line_number += 1;

            let line = match self.read_line(stream, kind, line_number, &mut buffer)? {
                Some(line) => line,
                None => return Err(kind.error(0, "No content")),
            };

            if line.iter().all(|&byte| byte == b' ' || byte == b'\t') {
                if self.options.ignore_leading_empty_line() {
                    tracing::debug!(line_number, "skip leading empty line");
                    continue;
                }

                return Err(kind.error(0, "No content"));
            }

            if self.options.allow_comments() && line.starts_with(b"#") {
                continue;
            }

            return Ok((self.options.header_charset().decode(line), line_number));
        }
    }

    /// Parses a request-line (`method SP target [SP version]`).
    pub fn parse_request_line(
        &self,
        line: &str,
        line_number: u64,
    ) -> Result<RequestLineParts, HTTPError> {
        tracing::debug!(line, "parse_request_line");

        let kind = MetadataKind::Request;
        let trimmed = line.trim_matches(is_ws);

        if trimmed.is_empty() {
            return Err(kind.error(0, "No content"));
        }

        let parts = trimmed
            .split(is_ws)
            .filter(|part| !part.is_empty())
            .collect::<Vec<&str>>();
        let invalid_line = || kind.error(line_number, format!("Invalid request line: '{}'", line));

        let (method, target, version) = match parts.as_slice() {
            [target]
                if self.options.insert_http_version_if_missing() && target.contains("://") =>
            {
                ("GET", *target, None)
            }
            [method, target] => (*method, *target, None),
            [method, target, version] => (*method, *target, Some(*version)),
            [method, .., last] if self.options.allow_illegal_start_line_characters() => {
                let rest = trimmed[method.len()..].trim_start_matches(is_ws);

                if last.starts_with("HTTP/") {
                    let target = rest[..rest.len() - last.len()].trim_end_matches(is_ws);
                    (*method, target, Some(*last))
                } else {
                    (*method, rest, None)
                }
            }
            _ => return Err(invalid_line()),
        };

        if let Some(index) = index_of_not_allowed_in_tokens(method) {
            return Err(kind.error(
                line_number,
                format!(
                    "Invalid method name: illegal character at index {}: '{}'",
                    index, method
                ),
            ));
        }

        let version = match version {
            Some(version) => match version.parse::<HttpVersion>() {
                Ok(version) => version,
                Err(_) if HttpVersion::is_well_formed(version) => {
                    return Err(kind.error(line_number, "Unknown HTTP version"))
                }
                Err(_) => return Err(kind.error(line_number, "Invalid HTTP version")),
            },
            None if self.options.insert_http_version_if_missing() => HttpVersion::Http11,
            None => return Err(kind.error(line_number, "Missing HTTP version")),
        };

        let (target, raw_target) = if target == "*" {
            if method != "OPTIONS" {
                return Err(kind.error(
                    line_number,
                    "Invalid request target: asterisk-form is only allowed with OPTIONS: '*'",
                ));
            }

            (RequestTarget::Asterisk, target.to_string())
        } else {
            self.parse_request_target(target, line_number)?
        };

        Ok(RequestLineParts {
            method: method.to_string(),
            target,
            raw_target,
            version,
        })
    }

    fn parse_request_target(
        &self,
        target: &str,
        line_number: u64,
    ) -> Result<(RequestTarget, String), HTTPError> {
        let kind = MetadataKind::Request;
        let invalid_target =
            |reason: &dyn Display| kind.error(line_number, format!("Invalid request target: {}: '{}'", reason, target));

        let escaped = match find_illegal_target_character(target) {
            Some(illegal)
                if illegal.component != TargetComponent::Scheme
                    && self.options.allow_illegal_start_line_characters() =>
            {
                tracing::warn!(target, "escaping illegal characters in request target");
                Cow::Owned(escape_request_target(target))
            }
            Some(illegal) => return Err(invalid_target(&illegal)),
            None => Cow::Borrowed(target),
        };

        let escaped = escaped.into_owned();

        if escaped.starts_with('/') {
            return Ok((RequestTarget::Origin(escaped.clone()), escaped));
        }

        let absolute = if escaped.contains("://") {
            Cow::Borrowed(escaped.as_str())
        } else {
            Cow::Owned(format!("http://{}", escaped))
        };

        let url = Url::parse(&absolute).map_err(|error| invalid_target(&error))?;

        if !url.has_host() {
            return Err(invalid_target(&"missing host"));
        }

        Ok((RequestTarget::Absolute(url), escaped))
    }

    /// Parses a status-line (`[version SP] status-code [SP reason]`).
    pub fn parse_status_line(&self, line: &str, line_number: u64) -> Result<StatusLine, HTTPError> {
        tracing::debug!(line, "parse_status_line");

        let kind = MetadataKind::Response;

        if line.trim_matches(is_ws).is_empty() {
            return Err(kind.error(0, "No content"));
        }

        let line = line.trim_start_matches(is_ws);

        let (version, rest) = if line.starts_with("HTTP") {
            let (token, rest) = line.split_once(is_ws).unwrap_or((line, ""));
            let version = token
                .parse::<HttpVersion>()
                .map_err(|_| kind.error(line_number, "Invalid HTTP version"))?;

            (version, rest)
        } else if self.options.insert_http_version_if_missing() {
            tracing::debug!("status line without version");
            (HttpVersion::Http11, line)
        } else {
            return Err(kind.error(line_number, "Missing HTTP version"));
        };

        let rest = rest.trim_start_matches(is_ws);

        if rest.is_empty() {
            return Err(kind.error(line_number, "Missing status code"));
        }

        // Reason is kept verbatim after the single separator.
        let (code, reason) = rest.split_once(is_ws).unwrap_or((rest, ""));

        if code.is_empty() || code.len() > 3 || !code.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(kind.error(line_number, "Invalid status code"));
        }

        let status_code = code
            .parse::<u16>()
            .map_err(|_| kind.error(line_number, "Invalid status code"))?;

        Ok(StatusLine::new(version, status_code, reason))
    }

    /// Reads header lines until an empty line or EOF.
    ///
    /// `first_line` is the line number of the first header line, used in errors.
    pub fn parse_headers<R: BufRead>(
        &self,
        stream: &mut R,
        kind: MetadataKind,
        first_line: u64,
    ) -> Result<HeaderCollection, HTTPError> {
        let charset = self.options.header_charset();
        let mut builder = HeaderCollection::builder_with_charset(charset);
        let mut buffer = Vec::new();
        let mut line_number = first_line;

        loop {
            let line = match self.read_line(stream, kind, line_number, &mut buffer)? {
                Some(line) if !line.is_empty() => charset.decode(line),
                _ => break,
            };

            if !(self.options.allow_comments() && line.starts_with('#')) {
                builder = self.parse_header_line(builder, &line, kind, line_number)?;
            }

            line_number += 1;
        }

        let headers = builder.build();
        tracing::debug!(?kind, count = headers.len(), "parse_headers");

        Ok(headers)
    }

    fn parse_header_line(
        &self,
        builder: HeaderCollectionBuilder,
        line: &str,
        kind: MetadataKind,
        line_number: u64,
    ) -> Result<HeaderCollectionBuilder, HTTPError> {
        if line.starts_with(is_ws) {
            return Err(kind.error(
                line_number,
                "Invalid header: obsolete line folding is not supported",
            ));
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| kind.error(line_number, "Invalid header: missing the ':' separator"))?;

        if name.is_empty() {
            return Err(kind.error(line_number, "Invalid header: missing the header name"));
        }

        if name.chars().count() > self.options.max_header_name_length() {
            return Err(kind.error(line_number, "Header name is too long"));
        }

        let value = value.trim_matches(is_ws);

        if value.chars().count() > self.options.max_header_value_length() {
            return Err(kind.error(line_number, "Header value is too long"));
        }

        builder
            .with(name, value)
            .map_err(|error| kind.error(line_number, error.to_string()))
    }
}

fn is_ws(c: char) -> bool {
    c == ' ' || c == '\t'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetComponent {
    Scheme,
    Authority,
    Path,
    Query,
    Fragment,
}

impl TargetComponent {
    fn name(&self) -> &'static str {
        match self {
            TargetComponent::Scheme => "scheme name",
            TargetComponent::Authority => "authority",
            TargetComponent::Path => "path",
            TargetComponent::Query => "query",
            TargetComponent::Fragment => "fragment",
        }
    }

    fn allows(&self, c: char) -> bool {
        if !c.is_ascii() {
            return !c.is_control() && !c.is_whitespace();
        }

        let common = c.is_ascii_alphanumeric() || "-._~!$&'()*+,;=:@".contains(c);

        match self {
            TargetComponent::Scheme => c.is_ascii_alphanumeric() || "+-.".contains(c),
            TargetComponent::Authority => common || c == '[' || c == ']',
            TargetComponent::Path => common || c == '/',
            TargetComponent::Query | TargetComponent::Fragment => common || c == '/' || c == '?',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IllegalTargetCharacter {
    component: TargetComponent,
    index: usize,
    malformed_escape: bool,
}

impl Display for IllegalTargetCharacter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.malformed_escape {
            write!(f, "Malformed escape pair at index {}", self.index)
        } else {
            write!(
                f,
                "Illegal character in {} at index {}",
                self.component.name(),
                self.index
            )
        }
    }
}

/// Scans a request target using the RFC 3986 character classes.
///
/// Indexes are character positions in `target`.
fn find_illegal_target_character(target: &str) -> Option<IllegalTargetCharacter> {
    let chars = target.chars().collect::<Vec<char>>();
    let mut index = 0;
    let mut component = TargetComponent::Path;

    if !target.starts_with('/') {
        component = TargetComponent::Authority;

        if let Some(position) = target.find("://") {
            let scheme = &target[..position];

            for (index, c) in scheme.chars().enumerate() {
                let allowed = if index == 0 {
                    c.is_ascii_alphabetic()
                } else {
                    TargetComponent::Scheme.allows(c)
                };

                if !allowed {
                    return Some(IllegalTargetCharacter {
                        component: TargetComponent::Scheme,
                        index,
                        malformed_escape: false,
                    });
                }
            }

            index = scheme.chars().count() + 3;
        }
    }

    while index < chars.len() {
        let c = chars[index];

        match (component, c) {
            (TargetComponent::Authority, '/') => component = TargetComponent::Path,
            (TargetComponent::Authority | TargetComponent::Path, '?') => {
                component = TargetComponent::Query
            }
            (TargetComponent::Authority | TargetComponent::Path | TargetComponent::Query, '#') => {
                component = TargetComponent::Fragment
            }
            (_, '%') => {
                let is_hex = |offset: usize| {
                    chars
                        .get(index + offset)
                        .map_or(false, |c| c.is_ascii_hexdigit())
                };

                if !is_hex(1) || !is_hex(2) {
                    return Some(IllegalTargetCharacter {
                        component,
                        index,
                        malformed_escape: true,
                    });
                }
            }
            _ if component.allows(c) => {}
            _ => {
                return Some(IllegalTargetCharacter {
                    component,
                    index,
                    malformed_escape: false,
                })
            }
        }

        index += 1;
    }

    None
}

/// Percent-encodes every illegal character until the target is valid.
fn escape_request_target(target: &str) -> String {
    let mut target = target.to_string();

    while let Some(illegal) = find_illegal_target_character(&target) {
        if illegal.component == TargetComponent::Scheme {
            break;
        }

        let (offset, c) = match target.char_indices().nth(illegal.index) {
            Some(item) => item,
            None => break,
        };
        let mut buf = [0u8; 4];
        let encoded = utf8_percent_encode(c.encode_utf8(&mut buf), NON_ALPHANUMERIC).to_string();

        target.replace_range(offset..offset + c.len_utf8(), &encoded);
    }

    target
}
