use std::{fmt::Display, io::Write};

use serde::{Deserialize, Serialize};

use crate::header::HeaderCollection;

use super::{
    body::{frame_headers, BodyReader, MessageBody},
    HTTPError, HttpVersion,
};

/// Status-line of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLine {
    version: HttpVersion,
    status_code: u16,
    reason: String,
}

impl StatusLine {
    /// Creates a status-line.
    pub fn new<R: Into<String>>(version: HttpVersion, status_code: u16, reason: R) -> Self {
        Self {
            version,
            status_code,
            reason: reason.into(),
        }
    }

    /// Protocol version.
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// Status code. At most 3 digits.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Reason phrase. May be empty.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Writes the status-line including the line ending.
    pub fn write_to<W: Write>(&self, mut dest: W) -> std::io::Result<usize> {
        let line = format!("{}\r\n", self);
        dest.write_all(line.as_bytes())?;
        Ok(line.len())
    }
}

impl Display for StatusLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.version, self.status_code)?;

        if !self.reason.is_empty() {
            write!(f, " {}", self.reason)?;
        }

        Ok(())
    }
}

/// HTTP response.
#[derive(Debug)]
pub struct Response<'a> {
    status_line: StatusLine,
    headers: HeaderCollection,
    body: Option<BodyReader<'a>>,
    folded_trailer: Option<HeaderCollection>,
}

impl<'a> Response<'a> {
    /// Creates a response.
    ///
    /// The headers are used as given. Use [Self::with_body] to keep them
    /// consistent with a new body.
    pub fn new(status_line: StatusLine, headers: HeaderCollection, body: Option<BodyReader<'a>>) -> Self {
        Self {
            status_line,
            headers,
            body,
            folded_trailer: None,
        }
    }

    /// Status-line.
    pub fn status_line(&self) -> &StatusLine {
        &self.status_line
    }

    /// Status code.
    pub fn status_code(&self) -> u16 {
        self.status_line.status_code()
    }

    /// Reason phrase.
    pub fn reason(&self) -> &str {
        self.status_line.reason()
    }

    /// Protocol version.
    pub fn version(&self) -> HttpVersion {
        self.status_line.version()
    }

    /// Header fields.
    pub fn headers(&self) -> &HeaderCollection {
        &self.headers
    }

    /// Body, if the response has one.
    pub fn body(&self) -> Option<&BodyReader<'a>> {
        self.body.as_ref()
    }

    /// Body, if the response has one.
    pub fn body_mut(&mut self) -> Option<&mut BodyReader<'a>> {
        self.body.as_mut()
    }

    /// Returns the body.
    pub fn into_body(self) -> Option<BodyReader<'a>> {
        self.body
    }

    /// Returns a response with the given status-line.
    pub fn with_status_line(self, status_line: StatusLine) -> Self {
        Self {
            status_line,
            ..self
        }
    }

    /// Returns a response with `headers` added.
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

    /// Returns a response with the given body and matching framing headers.
    pub fn with_body(self, body: MessageBody) -> Result<Response<'static>, HTTPError> {
        let eager = body.to_eager_body();
        let headers = frame_headers(&self.headers, Some(eager.framed()), body.content_type())?;

        Ok(Response {
            status_line: self.status_line,
            headers,
            body: Some(eager.into()),
            folded_trailer: None,
        })
    }

    /// Returns a response with the given body reader and matching framing headers.
    pub fn with_body_reader<'b>(self, body: BodyReader<'b>) -> Result<Response<'b>, HTTPError> {
        let headers = frame_headers(&self.headers, Some(body.framed()), None)?;

        Ok(Response {
            status_line: self.status_line,
            headers,
            body: Some(body),
            folded_trailer: None,
        })
    }

    /// Returns a response without a body or framing headers.
    pub fn without_body(self) -> Response<'static> {
        let headers = self
            .headers
            .to_builder()
            .remove_all(["Content-Length", "Transfer-Encoding", "Content-Type"])
            .build();

        Response {
            status_line: self.status_line,
            headers,
            body: None,
            folded_trailer: None,
        }
    }

    /// Reads the body into memory.
    ///
    /// Trailer fields of a chunked body are appended to the headers. They
    /// are still written only once, in the body's trailer.
    pub fn eagerly(self) -> Result<Response<'static>, HTTPError> {
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

        Ok(Response {
            status_line: self.status_line,
            headers,
            body,
            folded_trailer,
        })
    }

    /// Writes the response.
    ///
    /// A lazy body is consumed.
    pub fn write_to<W: Write>(&mut self, mut dest: W) -> Result<u64, HTTPError> {
        tracing::debug!(status_code = self.status_code(), "write_response");

        let mut amount = self.status_line.write_to(&mut dest)? as u64;
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

    /// Returns the serialized response.
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
    use crate::http::RawHttp;

    #[test]
    fn test_eagerly_trailer_written_once() {
        let data = b"HTTP/1.1 200 OK\r\nTrailer: Expires\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nhi\r\n0\r\nExpires: never\r\n\r\n";
        let response = RawHttp::new().parse_response(&data[..]).unwrap();
        let mut response = response.eagerly().unwrap();

        assert_eq!(response.headers().get("Expires"), vec!["never"]);
        assert_eq!(response.to_bytes().unwrap(), data);

        let mut response = response.eagerly().unwrap();
        assert_eq!(response.headers().get("Expires"), vec!["never"]);
        assert_eq!(response.to_bytes().unwrap(), data);

        let mut response = response.without_body();
        assert_eq!(
            response.to_bytes().unwrap(),
            b"HTTP/1.1 200 OK\r\nTrailer: Expires\r\nExpires: never\r\n\r\n"
        );
    }

    #[test]
    fn test_status_line_format() {
        let line = StatusLine::new(HttpVersion::Http11, 200, "OK");
        assert_eq!(line.to_string(), "HTTP/1.1 200 OK");

        let line = StatusLine::new(HttpVersion::Http10, 204, "");
        assert_eq!(line.to_string(), "HTTP/1.0 204");
    }

    #[test]
    fn test_with_body() {
        let response = Response::new(
            StatusLine::new(HttpVersion::Http11, 200, "OK"),
            HeaderCollection::builder()
                .with("Server", "test")
                .unwrap()
                .build(),
            None,
        );

        let mut response = response
            .with_body(MessageBody::new("Hello").with_content_type("text/plain"))
            .unwrap();

        assert_eq!(
            response.to_bytes().unwrap(),
            b"HTTP/1.1 200 OK\r\nServer: test\r\nContent-Length: 5\r\nContent-Type: text/plain\r\n\r\nHello"
        );

        let mut response = response.without_body();
        assert_eq!(
            response.to_bytes().unwrap(),
            b"HTTP/1.1 200 OK\r\nServer: test\r\n\r\n"
        );
    }

    #[test]
    fn test_with_headers() {
        let response = Response::new(
            StatusLine::new(HttpVersion::Http11, 200, "OK"),
            HeaderCollection::builder()
                .with("A", "1")
                .unwrap()
                .with("B", "2")
                .unwrap()
                .build(),
            None,
        );
        let extra = HeaderCollection::builder()
            .with("b", "3")
            .unwrap()
            .with("C", "4")
            .unwrap()
            .build();

        let appended = response.with_headers(&extra, true);
        assert_eq!(appended.headers().to_string(), "A: 1\r\nb: 3\r\nC: 4\r\n\r\n");

        let prepended = appended.with_headers(
            &HeaderCollection::builder().with("C", "5").unwrap().build(),
            false,
        );
        assert_eq!(prepended.headers().to_string(), "C: 4\r\nA: 1\r\nb: 3\r\n\r\n");

        let prepended = prepended.with_headers(
            &HeaderCollection::builder().with("D", "6").unwrap().build(),
            false,
        );
        assert_eq!(prepended.headers().header_names(), vec!["D", "C", "A", "b"]);
    }
}
