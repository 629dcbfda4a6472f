use std::io::BufRead;

use url::Url;

use crate::{compress::EncodingRegistry, header::HeaderCollection};

use super::{
    body::{BodyDecoder, BodyReader, FramedBody, LazyBody},
    HTTPError, MetadataKind, MetadataParser, RawHttpOptions, Request,
    RequestLine, RequestLineParts, RequestTarget, Response,
};

/// Parses HTTP requests and responses from streams.
///
/// Parsed messages hold a lazy body that borrows the stream. Use
/// [Request::eagerly] or [Response::eagerly] to read the body into memory.
///
/// ```
/// use rawhttp::http::RawHttp;
///
/// let http = RawHttp::new();
/// let request = http.parse_request_bytes(b"GET localhost:8080")?;
///
/// assert_eq!(request.uri().as_str(), "http://localhost:8080/");
/// assert_eq!(request.headers().get("Host"), vec!["localhost"]);
/// # Ok::<(), rawhttp::http::HTTPError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct RawHttp {
    parser: MetadataParser,
    registry: EncodingRegistry,
}

impl RawHttp {
    /// Creates a parser with lenient options and the built-in decoders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser with the given options.
    pub fn with_options(options: RawHttpOptions) -> Self {
        Self {
            parser: MetadataParser::new(options),
            registry: EncodingRegistry::new(),
        }
    }

    /// Returns a parser that decodes bodies with the given registry.
    pub fn with_registry(self, registry: EncodingRegistry) -> Self {
        Self { registry, ..self }
    }

    /// Parser options.
    pub fn options(&self) -> &RawHttpOptions {
        self.parser.options()
    }

    /// Content coding decoders.
    pub fn registry(&self) -> &EncodingRegistry {
        &self.registry
    }

    /// Metadata parser.
    pub fn parser(&self) -> &MetadataParser {
        &self.parser
    }

    /// Parses a request.
    ///
    /// The stream is left positioned at the start of the body.
    pub fn parse_request<'a, R: BufRead + 'a>(&self, mut stream: R) -> Result<Request<'a>, HTTPError> {
        let kind = MetadataKind::Request;
        let (line, line_number) = self.parser.read_start_line(&mut stream, kind)?;
        let parts = self.parser.parse_request_line(&line, line_number)?;
        let headers = self.parser.parse_headers(&mut stream, kind, line_number + 1)?;
        let (request_line, headers) = self.reconcile_host(parts, headers, line_number)?;

        tracing::debug!(
            method = request_line.method(),
            uri = request_line.uri().as_str(),
            "parse_request"
        );

        let body = self
            .request_framing(&headers)?
            .map(|framed| self.lazy_body(framed, Box::new(stream)));

        Ok(Request::new(request_line, headers, body))
    }

    /// Parses a response.
    ///
    /// The stream is left positioned at the start of the body.
    pub fn parse_response<'a, R: BufRead + 'a>(&self, stream: R) -> Result<Response<'a>, HTTPError> {
        self.parse_response_for(stream, None)
    }

    /// Parses a response to the given request.
    ///
    /// Responses to `HEAD` requests have no body.
    pub fn parse_response_for<'a, R: BufRead + 'a>(
        &self,
        mut stream: R,
        request: Option<&RequestLine>,
    ) -> Result<Response<'a>, HTTPError> {
        let kind = MetadataKind::Response;
        let (line, line_number) = self.parser.read_start_line(&mut stream, kind)?;
        let status_line = self.parser.parse_status_line(&line, line_number)?;
        let headers = self.parser.parse_headers(&mut stream, kind, line_number + 1)?;

        tracing::debug!(status_code = status_line.status_code(), "parse_response");

        let body = if response_has_body(request, status_line.status_code()) {
            Some(self.response_framing(&headers)?)
        } else {
            None
        };
        let body = body.map(|framed| self.lazy_body(framed, Box::new(stream)));

        Ok(Response::new(status_line, headers, body))
    }

    /// Parses a request and reads its body.
    pub fn parse_request_bytes(&self, data: &[u8]) -> Result<Request<'static>, HTTPError> {
        self.parse_request(data)?.eagerly()
    }

    /// Parses a response and reads its body.
    pub fn parse_response_bytes(&self, data: &[u8]) -> Result<Response<'static>, HTTPError> {
        self.parse_response(data)?.eagerly()
    }

    fn lazy_body<'a>(&self, framed: FramedBody, stream: Box<dyn BufRead + 'a>) -> BodyReader<'a> {
        BodyReader::Lazy(LazyBody::new(
            framed,
            stream,
            self.parser.options().allow_content_length_mismatch(),
        ))
    }

    fn reconcile_host(
        &self,
        parts: RequestLineParts,
        headers: HeaderCollection,
        line_number: u64,
    ) -> Result<(RequestLine, HeaderCollection), HTTPError> {
        let kind = MetadataKind::Request;
        let hosts = headers.get("Host");

        if hosts.len() > 1 {
            return Err(kind.error(line_number + 1, "More than one Host header specified"));
        }

        let method = parts.method;
        let raw_target = parts.raw_target;

        match parts.target {
            RequestTarget::Absolute(uri) => {
                let headers = if hosts.is_empty() && self.parser.options().insert_host_header_if_missing() {
                    let host = uri.host_str().unwrap_or_default();

                    tracing::debug!(host, "insert Host header");

                    HeaderCollection::builder_with_charset(headers.charset())
                        .with("Host", host)?
                        .merge(&headers)
                        .build()
                } else {
                    headers
                };

                let target = if method.eq_ignore_ascii_case("CONNECT") {
                    raw_target
                } else {
                    origin_form(&raw_target)
                };

                Ok((RequestLine::new(method, uri, parts.version).with_target(target), headers))
            }
            target @ (RequestTarget::Origin(_) | RequestTarget::Asterisk) => {
                let host = match hosts.first() {
                    Some(host) => *host,
                    None => {
                        return Err(kind.error(
                            line_number,
                            "Host not given either in request line or Host header",
                        ))
                    }
                };

                let path = match &target {
                    RequestTarget::Origin(path) => path.as_str(),
                    _ => "/",
                };
                let uri = host_uri(host, path)
                    .ok_or_else(|| kind.error(line_number, format!("Invalid Host header: '{}'", host)))?;

                Ok((RequestLine::new(method, uri, parts.version).with_target(raw_target), headers))
            }
        }
    }

    /// Returns the framing of a request body, if the request has one.
    pub fn request_framing(&self, headers: &HeaderCollection) -> Result<Option<FramedBody>, HTTPError> {
        let decoder = BodyDecoder::from_headers(headers, self.registry.clone(), self.parser.clone());

        if headers.contains("Transfer-Encoding") {
            if decoder.is_chunked() {
                return Ok(Some(FramedBody::Chunked(decoder)));
            }

            return Err(HTTPError::invalid_body(
                "Transfer-Encoding of a request must end with chunked",
            ));
        }

        Ok(parse_content_length(headers)?.map(|length| FramedBody::ContentLength { length, decoder }))
    }

    /// Returns the framing of a response body.
    ///
    /// Use [response_has_body] first to find out whether there is a body.
    pub fn response_framing(&self, headers: &HeaderCollection) -> Result<FramedBody, HTTPError> {
        let decoder = BodyDecoder::from_headers(headers, self.registry.clone(), self.parser.clone());

        if headers.contains("Transfer-Encoding") {
            if decoder.is_chunked() {
                return Ok(FramedBody::Chunked(decoder));
            }

            return Ok(FramedBody::CloseTerminated(decoder));
        }

        Ok(match parse_content_length(headers)? {
            Some(length) => FramedBody::ContentLength { length, decoder },
            None => FramedBody::CloseTerminated(decoder),
        })
    }
}

/// Returns whether a response with the status code carries a body.
///
/// Responses to `HEAD`, informational, `204 No Content` and `304 Not Modified`
/// responses have none.
pub fn response_has_body(request: Option<&RequestLine>, status_code: u16) -> bool {
    if request.map_or(false, |request| request.method().eq_ignore_ascii_case("HEAD")) {
        return false;
    }

    !((100..200).contains(&status_code) || status_code == 204 || status_code == 304)
}

/// Builds the URI of an origin-form or asterisk-form request from its `Host`
/// value, which must be `host[:port]` only.
fn host_uri(host: &str, path: &str) -> Option<Url> {
    if host.is_empty()
        || host.contains(|c: char| matches!(c, '/' | '?' | '#' | '@') || c.is_ascii_whitespace())
    {
        return None;
    }

    Url::parse(&format!("http://{}{}", host, path))
        .ok()
        .filter(Url::has_host)
}

/// Path and query of an absolute-form target, as written.
fn origin_form(target: &str) -> String {
    let authority_start = target.find("://").map_or(0, |index| index + 3);
    let rest = &target[authority_start..];
    let rest = rest
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .map_or("", |index| &rest[index..]);
    let rest = rest.split('#').next().unwrap_or_default();

    if rest.is_empty() {
        "/".to_string()
    } else if rest.starts_with('?') {
        format!("/{}", rest)
    } else {
        rest.to_string()
    }
}

/// Returns the value of `Content-Length`.
///
/// Repeated values must agree.
pub fn parse_content_length(headers: &HeaderCollection) -> Result<Option<u64>, HTTPError> {
    let mut length = None;

    let values = headers
        .get("Content-Length")
        .into_iter()
        .flat_map(|field_value| field_value.split(','))
        .map(|value| value.trim_matches(|c| c == ' ' || c == '\t'));

    for value in values {
        if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(HTTPError::invalid_body("Invalid Content-Length header"));
        }

        let value = value
            .parse::<u64>()
            .map_err(|_| HTTPError::invalid_body("Invalid Content-Length header"))?;

        match length {
            Some(length) if length != value => {
                return Err(HTTPError::invalid_body("Conflicting Content-Length headers"))
            }
            _ => length = Some(value),
        }
    }

    tracing::trace!(content_length = ?length, "parse_content_length");

    Ok(length)
}
