//! Message body framing and decoding.
//!
//! [FramedBody] describes how a body is delimited on the wire. Its
//! [BodyDecoder] describes how the delimited bytes are interpreted. A
//! [BodyReader] pairs the two with either a buffered copy of the body
//! ([EagerBody]) or the stream the body is still waiting in ([LazyBody]).

use std::{
    fmt::Debug,
    io::{BufRead, BufReader, Cursor, Read, Take, Write},
};

use crate::{
    compress::EncodingRegistry,
    header::HeaderCollection,
    io::RecordingReader,
};

use super::{
    chunked::{clamp_chunk_size, encode_chunked, Chunk, ChunkedBodyContents, ChunkedDecoder, ChunkedReader},
    HTTPError, HeaderCollectionExt, MetadataParser,
};

const CHUNKED: &str = "chunked";

/// Reverses the content and transfer codings of a body.
///
/// Encodings are listed in the order they were applied, so the last one is
/// removed first.
#[derive(Debug, Clone, Default)]
pub struct BodyDecoder {
    encodings: Vec<String>,
    registry: EncodingRegistry,
    parser: MetadataParser,
}

impl BodyDecoder {
    /// Creates a decoder for the given codings.
    pub fn new(encodings: Vec<String>, registry: EncodingRegistry, parser: MetadataParser) -> Self {
        Self {
            encodings,
            registry,
            parser,
        }
    }

    /// Creates a decoder for the codings listed in `Content-Encoding` and
    /// then `Transfer-Encoding`.
    pub fn from_headers(
        headers: &HeaderCollection,
        registry: EncodingRegistry,
        parser: MetadataParser,
    ) -> Self {
        let mut encodings = headers.get_comma_list("Content-Encoding");
        encodings.extend(headers.get_comma_list("Transfer-Encoding"));

        Self::new(encodings, registry, parser)
    }

    /// Coding names in the order they were applied.
    pub fn encodings(&self) -> &[String] {
        &self.encodings
    }

    /// Parser used for chunk-size lines and trailers.
    pub fn parser(&self) -> &MetadataParser {
        &self.parser
    }

    /// Returns whether the last coding is `chunked`.
    pub fn is_chunked(&self) -> bool {
        self.encodings
            .last()
            .map_or(false, |name| name.eq_ignore_ascii_case(CHUNKED))
    }

    /// Wraps the framed body bytes so reading yields the decoded body.
    ///
    /// A final `chunked` coding is read straight from `stream` so nothing
    /// past the chunked body is consumed.
    pub fn decode<'a>(&self, stream: Box<dyn BufRead + 'a>) -> Result<Box<dyn Read + 'a>, HTTPError> {
        if self.is_chunked() {
            let reader = ChunkedReader::with_parser(stream, self.parser.clone());
            self.decode_content(Box::new(reader))
        } else {
            self.decode_content(Box::new(stream))
        }
    }

    /// Wraps data that has already been unchunked so reading yields the
    /// decoded body.
    ///
    /// A final `chunked` coding is skipped.
    pub fn decode_content<'a>(&self, stream: Box<dyn Read + 'a>) -> Result<Box<dyn Read + 'a>, HTTPError> {
        let mut encodings = self.encodings.iter().rev();
        let mut stream = stream;

        if self.is_chunked() {
            encodings.next();
        }

        for name in encodings {
            tracing::trace!(encoding = name.as_str(), "decode_content");

            if name.eq_ignore_ascii_case(CHUNKED) {
                let reader = ChunkedReader::with_parser(BufReader::new(stream), self.parser.clone());
                stream = Box::new(reader);
                continue;
            }

            let decoder = self
                .registry
                .get(name)
                .ok_or_else(|| HTTPError::UnsupportedEncoding(name.clone()))?;

            stream = decoder.decode(stream)?;
        }

        Ok(stream)
    }
}

/// How a body is delimited on the wire.
#[derive(Debug, Clone)]
pub enum FramedBody {
    /// Exactly `length` bytes follow the header.
    ContentLength {
        /// Number of bytes.
        length: u64,
        /// Codings of the body.
        decoder: BodyDecoder,
    },
    /// The body is in chunked transfer coding.
    Chunked(BodyDecoder),
    /// The body lasts until the end of the stream.
    CloseTerminated(BodyDecoder),
}

impl FramedBody {
    /// Codings of the body.
    pub fn decoder(&self) -> &BodyDecoder {
        match self {
            FramedBody::ContentLength { decoder, .. } => decoder,
            FramedBody::Chunked(decoder) => decoder,
            FramedBody::CloseTerminated(decoder) => decoder,
        }
    }

    /// Returns whether the body is chunked.
    pub fn is_chunked(&self) -> bool {
        matches!(self, FramedBody::Chunked(_))
    }

    /// Returns the length for content-length framing.
    pub fn content_length(&self) -> Option<u64> {
        match self {
            FramedBody::ContentLength { length, .. } => Some(*length),
            _ => None,
        }
    }
}

/// Reader that errors out if the stream ends before the expected length.
struct ExpectedLengthReader<R: BufRead> {
    stream: Take<R>,
    allow_mismatch: bool,
}

impl<R: BufRead> ExpectedLengthReader<R> {
    fn new(stream: R, length: u64, allow_mismatch: bool) -> Self {
        Self {
            stream: stream.take(length),
            allow_mismatch,
        }
    }

    fn mismatch_error() -> std::io::Error {
        std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            HTTPError::invalid_body("content length mismatch"),
        )
    }
}

impl<R: BufRead> Read for ExpectedLengthReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let amount = self.stream.read(buf)?;

        if amount == 0 && !buf.is_empty() && self.stream.limit() > 0 {
            if self.allow_mismatch {
                tracing::debug!(missing = self.stream.limit(), "content length mismatch");
            } else {
                return Err(Self::mismatch_error());
            }
        }

        Ok(amount)
    }
}

impl<R: BufRead> BufRead for ExpectedLengthReader<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        let remaining = self.stream.limit();
        let allow_mismatch = self.allow_mismatch;
        let buffer = self.stream.fill_buf()?;

        if buffer.is_empty() && remaining > 0 && !allow_mismatch {
            return Err(Self::mismatch_error());
        }

        Ok(buffer)
    }

    fn consume(&mut self, amt: usize) {
        self.stream.consume(amt)
    }
}

/// Fully buffered body.
///
/// Can be read any number of times.
#[derive(Debug, Clone)]
pub struct EagerBody {
    framed: FramedBody,
    raw: Vec<u8>,
    chunked: Option<ChunkedBodyContents>,
}

impl EagerBody {
    /// Creates a body from its wire bytes.
    ///
    /// Chunked bodies are parsed to make their chunks available.
    pub fn new(framed: FramedBody, raw: Vec<u8>) -> Result<Self, HTTPError> {
        let chunked = if framed.is_chunked() {
            let mut decoder =
                ChunkedDecoder::with_parser(Cursor::new(&raw), framed.decoder().parser().clone());
            Some(decoder.read_body_contents()?)
        } else {
            None
        };

        Ok(Self {
            framed,
            raw,
            chunked,
        })
    }

    fn with_contents(framed: FramedBody, raw: Vec<u8>, chunked: Option<ChunkedBodyContents>) -> Self {
        Self {
            framed,
            raw,
            chunked,
        }
    }

    /// Framing of the body.
    pub fn framed(&self) -> &FramedBody {
        &self.framed
    }

    /// Body bytes as framed on the wire.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Returns the body bytes as framed on the wire.
    pub fn into_raw(self) -> Vec<u8> {
        self.raw
    }

    /// Returns whether the body is chunked.
    pub fn is_chunked(&self) -> bool {
        self.framed.is_chunked()
    }

    /// Chunks and trailer of a chunked body.
    pub fn as_chunked_body_contents(&self) -> Option<&ChunkedBodyContents> {
        self.chunked.as_ref()
    }

    /// Returns a reader of the decoded body.
    pub fn decoded_reader(&self) -> Result<Box<dyn Read + '_>, HTTPError> {
        let decoder = self.framed.decoder();

        match &self.chunked {
            Some(contents) => decoder.decode_content(Box::new(Cursor::new(contents.data()))),
            None => decoder.decode(Box::new(self.raw.as_slice())),
        }
    }

    /// Returns the decoded body.
    pub fn decoded(&self) -> Result<Vec<u8>, HTTPError> {
        let mut data = Vec::new();
        self.decoded_reader()?
            .read_to_end(&mut data)
            .map_err(HTTPError::from_io_error)?;

        Ok(data)
    }

    /// Writes the body bytes as framed on the wire.
    pub fn write_raw_to<W: Write>(&self, mut dest: W) -> Result<u64, HTTPError> {
        dest.write_all(&self.raw)?;
        Ok(self.raw.len() as u64)
    }
}

/// Body still waiting in the message stream.
///
/// The body can be read once. Later reads yield no data.
pub struct LazyBody<'a> {
    framed: FramedBody,
    stream: Option<Box<dyn BufRead + 'a>>,
    consumed: bool,
    allow_length_mismatch: bool,
}

impl<'a> LazyBody<'a> {
    /// Creates a body that reads from the stream positioned after the header.
    pub fn new(framed: FramedBody, stream: Box<dyn BufRead + 'a>, allow_length_mismatch: bool) -> Self {
        Self {
            framed,
            stream: Some(stream),
            consumed: false,
            allow_length_mismatch,
        }
    }

    /// Framing of the body.
    pub fn framed(&self) -> &FramedBody {
        &self.framed
    }

    /// Returns whether the body has been read.
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    fn take_stream(&mut self) -> Option<Box<dyn BufRead + 'a>> {
        self.consumed = true;
        self.stream.take()
    }

    /// Takes the stream limited to the body. Chunked bodies are not limited.
    fn take_framed_stream(&mut self) -> Option<Box<dyn BufRead + 'a>> {
        let stream = self.take_stream()?;

        Some(match &self.framed {
            FramedBody::ContentLength { length, .. } => Box::new(ExpectedLengthReader::new(
                stream,
                *length,
                self.allow_length_mismatch,
            )),
            FramedBody::Chunked(_) | FramedBody::CloseTerminated(_) => stream,
        })
    }

    fn read_chunked(
        &mut self,
        stream: Box<dyn BufRead + 'a>,
    ) -> Result<(Vec<u8>, ChunkedBodyContents), HTTPError> {
        let mut recorder = RecordingReader::new(stream);
        let parser = self.framed.decoder().parser().clone();
        let contents = ChunkedDecoder::with_parser(&mut recorder, parser).read_body_contents()?;
        let (_stream, raw) = recorder.into_parts();

        Ok((raw, contents))
    }

    /// Reads the body bytes as framed on the wire.
    pub fn read_raw(&mut self) -> Result<Vec<u8>, HTTPError> {
        let mut stream = match self.take_framed_stream() {
            Some(stream) => stream,
            None => return Ok(Vec::new()),
        };

        if self.framed.is_chunked() {
            let (raw, _contents) = self.read_chunked(stream)?;
            return Ok(raw);
        }

        let mut raw = Vec::new();
        stream
            .read_to_end(&mut raw)
            .map_err(HTTPError::from_io_error)?;

        Ok(raw)
    }

    /// Copies the body bytes as framed on the wire.
    pub fn write_raw_to<W: Write>(&mut self, mut dest: W) -> Result<u64, HTTPError> {
        if self.framed.is_chunked() {
            let raw = self.read_raw()?;
            dest.write_all(&raw)?;
            return Ok(raw.len() as u64);
        }

        match self.take_framed_stream() {
            Some(mut stream) => {
                std::io::copy(&mut stream, &mut dest).map_err(HTTPError::from_io_error)
            }
            None => Ok(0),
        }
    }

    /// Returns a reader of the decoded body.
    pub fn decoded_reader(&mut self) -> Result<Box<dyn Read + 'a>, HTTPError> {
        match self.take_framed_stream() {
            Some(stream) => self.framed.decoder().decode(stream),
            None => Ok(Box::new(std::io::empty())),
        }
    }

    /// Reads the decoded body.
    pub fn read_decoded(&mut self) -> Result<Vec<u8>, HTTPError> {
        let mut data = Vec::new();
        self.decoded_reader()?
            .read_to_end(&mut data)
            .map_err(HTTPError::from_io_error)?;

        Ok(data)
    }

    /// Reads the whole body into memory.
    pub fn eager(&mut self) -> Result<EagerBody, HTTPError> {
        let framed = self.framed.clone();

        if !framed.is_chunked() {
            let raw = self.read_raw()?;
            return Ok(EagerBody::with_contents(framed, raw, None));
        }

        match self.take_framed_stream() {
            Some(stream) => {
                let (raw, contents) = self.read_chunked(stream)?;
                Ok(EagerBody::with_contents(framed, raw, Some(contents)))
            }
            None => Ok(EagerBody::with_contents(framed, Vec::new(), None)),
        }
    }
}

impl<'a> Debug for LazyBody<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyBody")
            .field("framed", &self.framed)
            .field("consumed", &self.consumed)
            .field("allow_length_mismatch", &self.allow_length_mismatch)
            .finish()
    }
}

/// Body of a message.
#[derive(Debug)]
pub enum BodyReader<'a> {
    /// Fully buffered body.
    Eager(EagerBody),
    /// Body read on demand from the message stream.
    Lazy(LazyBody<'a>),
}

impl<'a> BodyReader<'a> {
    /// Framing of the body.
    pub fn framed(&self) -> &FramedBody {
        match self {
            BodyReader::Eager(body) => body.framed(),
            BodyReader::Lazy(body) => body.framed(),
        }
    }

    /// Returns whether the body is chunked.
    pub fn is_chunked(&self) -> bool {
        self.framed().is_chunked()
    }

    /// Returns whether the body is buffered.
    pub fn is_eager(&self) -> bool {
        matches!(self, BodyReader::Eager(_))
    }

    /// Chunks and trailer of a buffered chunked body.
    ///
    /// Lazy bodies have to be made eager first.
    pub fn as_chunked_body_contents(&self) -> Option<&ChunkedBodyContents> {
        match self {
            BodyReader::Eager(body) => body.as_chunked_body_contents(),
            BodyReader::Lazy(_) => None,
        }
    }

    /// Returns the body bytes as framed on the wire.
    pub fn read_raw(&mut self) -> Result<Vec<u8>, HTTPError> {
        match self {
            BodyReader::Eager(body) => Ok(body.raw().to_vec()),
            BodyReader::Lazy(body) => body.read_raw(),
        }
    }

    /// Returns the decoded body.
    pub fn read_decoded(&mut self) -> Result<Vec<u8>, HTTPError> {
        match self {
            BodyReader::Eager(body) => body.decoded(),
            BodyReader::Lazy(body) => body.read_decoded(),
        }
    }

    /// Writes the body bytes as framed on the wire.
    pub fn write_raw_to<W: Write>(&mut self, dest: W) -> Result<u64, HTTPError> {
        match self {
            BodyReader::Eager(body) => body.write_raw_to(dest),
            BodyReader::Lazy(body) => body.write_raw_to(dest),
        }
    }

    /// Returns a buffered copy of the body.
    ///
    /// Consumes a lazy body.
    pub fn eager(&mut self) -> Result<EagerBody, HTTPError> {
        match self {
            BodyReader::Eager(body) => Ok(body.clone()),
            BodyReader::Lazy(body) => body.eager(),
        }
    }

    /// Converts into a buffered body.
    pub fn into_eager(self) -> Result<EagerBody, HTTPError> {
        match self {
            BodyReader::Eager(body) => Ok(body),
            BodyReader::Lazy(mut body) => body.eager(),
        }
    }
}

impl From<EagerBody> for BodyReader<'static> {
    fn from(body: EagerBody) -> Self {
        BodyReader::Eager(body)
    }
}

/// Body for an outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBody {
    data: Vec<u8>,
    content_type: Option<String>,
    chunk_size: Option<usize>,
}

impl MessageBody {
    /// Creates a body sent with a `Content-Length`.
    pub fn new<D: Into<Vec<u8>>>(data: D) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Sets the value of the `Content-Type` header.
    pub fn with_content_type<T: Into<String>>(mut self, content_type: T) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sends the body in chunked transfer coding with chunks of at most `chunk_size` bytes.
    pub fn chunked(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(clamp_chunk_size(chunk_size));
        self
    }

    /// Unencoded body data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Value of the `Content-Type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Chunk size if the body is sent chunked.
    pub fn chunk_size(&self) -> Option<usize> {
        self.chunk_size
    }

    /// Returns the framed body.
    pub fn to_eager_body(&self) -> EagerBody {
        match self.chunk_size {
            Some(chunk_size) => {
                let mut chunks = self
                    .data
                    .chunks(chunk_size)
                    .map(|data| Chunk::new(data.to_vec(), HeaderCollection::empty()))
                    .collect::<Vec<Chunk>>();
                chunks.push(Chunk::terminal());

                let decoder = BodyDecoder {
                    encodings: vec![CHUNKED.to_string()],
                    ..Default::default()
                };

                EagerBody::with_contents(
                    FramedBody::Chunked(decoder),
                    encode_chunked(&self.data, chunk_size),
                    Some(ChunkedBodyContents::new(chunks, HeaderCollection::empty())),
                )
            }
            None => EagerBody::with_contents(
                FramedBody::ContentLength {
                    length: self.data.len() as u64,
                    decoder: BodyDecoder::default(),
                },
                self.data.clone(),
                None,
            ),
        }
    }
}

/// Returns headers describing the framing of `body`.
///
/// `Content-Length` and `Transfer-Encoding` are replaced or removed to match
/// the body. A `content_type` replaces `Content-Type`.
pub(crate) fn frame_headers(
    headers: &HeaderCollection,
    body: Option<&FramedBody>,
    content_type: Option<&str>,
) -> Result<HeaderCollection, HTTPError> {
    let mut builder = headers.to_builder();

    builder = match body {
        Some(FramedBody::ContentLength { length, .. }) => builder
            .remove("Transfer-Encoding")
            .overwrite("Content-Length", length.to_string())?,
        Some(FramedBody::Chunked(_)) => {
            let transfer = headers.get_comma_list("Transfer-Encoding");

            if transfer.last().map(String::as_str) == Some(CHUNKED) {
                builder.remove("Content-Length")
            } else {
                builder
                    .remove("Content-Length")
                    .overwrite("Transfer-Encoding", CHUNKED)?
            }
        }
        Some(FramedBody::CloseTerminated(_)) => builder.remove_all(["Content-Length", "Transfer-Encoding"]),
        None => builder.remove_all(["Content-Length", "Transfer-Encoding", "Content-Type"]),
    };

    if let Some(content_type) = content_type {
        builder = builder.overwrite("Content-Type", content_type)?;
    }

    Ok(builder.build())
}
