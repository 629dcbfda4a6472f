use std::{fmt::Display, io::Write};

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::header::HeaderCollection;

use super::{
    body::{frame_headers, BodyReader, MessageBody},
    HTTPError, HttpVersion,
};

/// Request-line of a request.
///
/// The URI always has a host, taken from the request target or the `Host`
/// header. The target is kept as written so that it serializes unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLine {
    method: String,
    uri: Url,
    target: String,
    version: HttpVersion,
}

impl RequestLine {
    /// Creates a request-line with the target derived from the URI.
    pub fn new<M: Into<String>>(method: M, uri: Url, version: HttpVersion) -> Self {
        let method = method.into();
        let target = target_from_uri(&method, &uri);

        Self {
            method,
            uri,
            target,
            version,
        }
    }

    /// Request method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Target URI.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Protocol version.
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// Returns a request-line with the given URI and a target derived from it.
    pub fn with_uri(self, uri: Url) -> Self {
        let target = target_from_uri(&self.method, &uri);
        Self { uri, target, ..self }
    }

    /// Returns a request-line that writes `target` instead of the derived one.
    pub fn with_target<T: Into<String>>(self, target: T) -> Self {
        Self {
            target: target.into(),
            ..self
        }
    }

    /// Returns a request-line with the given version.
    pub fn with_version(self, version: HttpVersion) -> Self {
        Self { version, ..self }
    }

    /// Request target as written on the wire.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Percent-decoded path.
    pub fn decoded_path(&self) -> String {
        percent_decode_str(self.uri.path())
            .decode_utf8_lossy()
            .into_owned()
    }

    /// Percent-decoded query.
    pub fn decoded_query(&self) -> Option<String> {
        self.uri
            .query()
            .map(|query| percent_decode_str(query).decode_utf8_lossy().into_owned())
    }

    /// Writes the request-line including the line ending.
    pub fn write_to<W: Write>(&self, mut dest: W) -> std::io::Result<usize> {
        let line = format!("{}\r\n", self);
        dest.write_all(line.as_bytes())?;
        Ok(line.len())
    }
}

impl Display for RequestLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.method, self.target, self.version)
    }
}

/// Path and query, or the authority for `CONNECT`.
fn target_from_uri(method: &str, uri: &Url) -> String {
    if method.eq_ignore_ascii_case("CONNECT") {
        let host = uri.host_str().unwrap_or_default();

        return match uri.port_or_known_default() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
    }

    match uri.query() {
        Some(query) => format!("{}?{}", uri.path(), query),
        None => uri.path().to_string(),
    }
}

/// HTTP request.
#[derive(Debug)]
pub struct Request<'a> {
    request_line: RequestLine,
    headers: HeaderCollection,
    body: Option<BodyReader<'a>>,
    folded_trailer: Option<HeaderCollection>,
}

impl<'a> Request<'a> {
    /// Creates a request.
    ///
    /// The headers are used as given. Use [Self::with_body] to keep them
    /// consistent with a new body.
    pub fn new(request_line: RequestLine, headers: HeaderCollection, body: Option<BodyReader<'a>>) -> Self {
        Self {
            request_line,
            headers,
            body,
            folded_trailer: None,
        }
    }

    /// Request-line.
    pub fn request_line(&self) -> &RequestLine {
        &self.request_line
    }

    /// Request method.
    pub fn method(&self) -> &str {
        self.request_line.method()
    }

    /// Target URI.
    pub fn uri(&self) -> &Url {
        self.request_line.uri()
    }

    /// Protocol version.
    pub fn version(&self) -> HttpVersion {
        self.request_line.version()
    }

    /// Header fields.
    pub fn headers(&self) -> &HeaderCollection {
        &self.headers
    }

    /// Body, if the request has one.
    pub fn body(&self) -> Option<&BodyReader<'a>> {
        self.body.as_ref()
    }

    /// Body, if the request has one.
    pub fn body_mut(&mut self) -> Option<&mut BodyReader<'a>> {
        self.body.as_mut()
    }

    /// Returns the body.
    pub fn into_body(self) -> Option<BodyReader<'a>> {
        self.body
    }

    /// Returns a request with the given request-line.
    pub fn with_request_line(self, request_line: RequestLine) -> Self {
        Self {
            request_line,
            ..self
        }
    }

    /// Returns a request with `headers` added.
    ///
    /// When `append` is true, fields of `headers` replace existing fields
    /// with the same name and new names go last. Otherwise `headers` go first
    /// and existing fields replace them.
    pub fn with_headers(self, headers: &HeaderCollection, append: bool) -> Self {
        let headers = if append {
            self.headers.and(headers)
        } else {
            headers.and(&self.headers)
        };

        Self { headers, ..self }
    }

    /// Returns a request with the given body and matching framing headers.
    pub fn with_body(self, body: MessageBody) -> Result<Request<'static>, HTTPError> {
        let eager = body.to_eager_body();
        let headers = frame_headers(&self.headers, Some(eager.framed()), body.content_type())?;

        Ok(Request {
            request_line: self.request_line,
            headers,
            body: Some(eager.into()),
            folded_trailer: None,
        })
    }

    /// Returns a request with the given body reader and matching framing headers.
    pub fn with_body_reader<'b>(self, body: BodyReader<'b>) -> Result<Request<'b>, HTTPError> {
        let headers = frame_headers(&self.headers, Some(body.framed()), None)?;

        Ok(Request {
            request_line: self.request_line,
            headers,
            body: Some(body),
            folded_trailer: None,
        })
    }

    /// Returns a request without a body or framing headers.
    pub fn without_body(self) -> Request<'static> {
        let headers = self
            .headers
            .to_builder()
            .remove_all(["Content-Length", "Transfer-Encoding", "Content-Type"])
            .build();

        Request {
            request_line: self.request_line,
            headers,
            body: None,
            folded_trailer: None,
        }
    }

    /// Reads the body into memory.
    ///
    /// Trailer fields of a chunked body are appended to the headers. They
    /// are still written only once, in the body's trailer.
    pub fn eagerly(self) -> Result<Request<'static>, HTTPError> {
        let mut headers = self.headers;
        let mut folded_trailer = self.folded_trailer;

        let body = match self.body {
            Some(body) => {
                let was_lazy = !body.is_eager();
                let body = body.into_eager()?;

                if let Some(contents) = body.as_chunked_body_contents() {
                    if was_lazy && !contents.trailer().is_empty() {
                        headers = headers.to_builder().merge(contents.trailer()).build();
                        folded_trailer = Some(contents.trailer().clone());
                    }
                }

                Some(BodyReader::Eager(body))
            }
            None => None,
        };

        Ok(Request {
            request_line: self.request_line,
            headers,
            body,
            folded_trailer,
        })
    }

    /// Writes the request.
    ///
    /// A lazy body is consumed.
    pub fn write_to<W: Write>(&mut self, mut dest: W) -> Result<u64, HTTPError> {
        tracing::debug!(method = self.method(), "write_request");

        let mut amount = self.request_line.write_to(&mut dest)? as u64;
        amount += match &self.folded_trailer {
            Some(trailer) => self
                .headers
                .to_builder()
                .remove_fields(trailer)
                .build()
                .write_to(&mut dest)?,
            None => self.headers.write_to(&mut dest)?,
        } as u64;

        if let Some(body) = &mut self.body {
            amount += body.write_raw_to(&mut dest)?;
        }

        dest.flush()?;

        Ok(amount)
    }

    /// Returns the serialized request.
    ///
    /// A lazy body is consumed.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, HTTPError> {
        let mut output = Vec::new();
        self.write_to(&mut output)?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_line(uri: &str) -> RequestLine {
        RequestLine::new("GET", Url::parse(uri).unwrap(), HttpVersion::Http11)
    }

    #[test]
    fn test_request_line_format() {
        assert_eq!(
            request_line("http://localhost:8080").to_string(),
            "GET / HTTP/1.1"
        );
        assert_eq!(
            request_line("http://example.com/a/b?c=d&e").to_string(),
            "GET /a/b?c=d&e HTTP/1.1"
        );

        let connect = RequestLine::new(
            "CONNECT",
            Url::parse("http://example.com:443").unwrap(),
            HttpVersion::Http11,
        );
        assert_eq!(connect.to_string(), "CONNECT example.com:443 HTTP/1.1");
    }

    #[test]
    fn test_with_target() {
        let line = request_line("http://example.com/b").with_target("/a/../b");

        assert_eq!(line.target(), "/a/../b");
        assert_eq!(line.uri().path(), "/b");
        assert_eq!(line.to_string(), "GET /a/../b HTTP/1.1");

        let line = line.with_uri(Url::parse("http://example.com/c?d").unwrap());
        assert_eq!(line.to_string(), "GET /c?d HTTP/1.1");
    }

    #[test]
    fn test_decoded() {
        let line = request_line("http://example.com/hello%20world?q=a%2Bb%20c");

        assert_eq!(line.uri().path(), "/hello%20world");
        assert_eq!(line.decoded_path(), "/hello world");
        assert_eq!(line.decoded_query().as_deref(), Some("q=a+b c"));
        assert_eq!(request_line("http://example.com/").decoded_query(), None);
    }

    #[test]
    fn test_with_body_chunked() {
        let headers = HeaderCollection::builder()
            .with("Host", "example.com")
            .unwrap()
            .with("Content-Length", "10")
            .unwrap()
            .build();
        let request = Request::new(request_line("http://example.com/"), headers, None);

        let mut request = request
            .with_body(MessageBody::new("abcde").chunked(3))
            .unwrap();

        assert_eq!(
            request.to_bytes().unwrap(),
            b"GET / HTTP/1.1\r\nHost: example.com\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n"
        );
        assert!(request.body().unwrap().is_chunked());

        let request = request.without_body();
        assert_eq!(request.headers().header_names(), vec!["Host"]);
        assert!(request.body().is_none());
    }
}
