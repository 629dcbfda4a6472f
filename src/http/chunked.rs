//! Chunked transfer coding.

use std::io::{BufRead, Read};

use crate::{header::HeaderCollection, io::BufReadMoreExt};

use super::{HTTPError, MetadataKind, MetadataParser};

/// Largest chunk size accepted by the decoder and produced by the encoder.
pub const MAX_CHUNK_SIZE: usize = 0xffff;

/// A chunk of a chunked body.
///
/// A chunk with no data is the terminal chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Chunk {
    data: Vec<u8>,
    extensions: HeaderCollection,
}

impl Chunk {
    /// Creates a chunk.
    pub fn new(data: Vec<u8>, extensions: HeaderCollection) -> Self {
        Self { data, extensions }
    }

    /// Creates the terminal chunk without extensions.
    pub fn terminal() -> Self {
        Self::default()
    }

    /// Chunk data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Chunk extensions. Extensions without a value have an empty value.
    pub fn extensions(&self) -> &HeaderCollection {
        &self.extensions
    }

    /// Length of the data.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns whether this is the last chunk of a body.
    pub fn is_terminal(&self) -> bool {
        self.data.is_empty()
    }
}

/// Chunks and trailer of a fully read chunked body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkedBodyContents {
    chunks: Vec<Chunk>,
    trailer: HeaderCollection,
}

impl ChunkedBodyContents {
    /// Creates a value from chunks, including the terminal chunk, and the trailer.
    pub fn new(chunks: Vec<Chunk>, trailer: HeaderCollection) -> Self {
        Self { chunks, trailer }
    }

    /// All chunks including the terminal chunk.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Trailer headers.
    pub fn trailer(&self) -> &HeaderCollection {
        &self.trailer
    }

    /// Returns the concatenated data of all chunks.
    pub fn data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.chunks.iter().map(Chunk::size).sum());

        for chunk in &self.chunks {
            data.extend_from_slice(&chunk.data);
        }

        data
    }
}

/// Decoded chunked coding size and extensions line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Size of chunk data.
    pub length: u64,
    /// Chunk extensions.
    pub extensions: HeaderCollection,
}

/// Parses a chunk-size line without its line ending.
pub fn parse_chunk_metadata(line: &str) -> Result<ChunkMetadata, HTTPError> {
    let (size, extensions) = match line.find(';') {
        Some(index) => line.split_at(index),
        None => (line, ""),
    };
    let size = size.trim_end_matches(|c| c == ' ' || c == '\t');

    if size.is_empty() {
        return Err(HTTPError::invalid_body("Missing chunk-size"));
    }

    if let Some(c) = size.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(HTTPError::invalid_body(format!(
            "Illegal character in chunk-size: '{}'",
            c
        )));
    }

    let digits = size.trim_start_matches('0');

    if digits.len() > 4 {
        return Err(HTTPError::invalid_body("Invalid chunk-size (too big)"));
    }

    let length = if digits.is_empty() {
        0
    } else {
        u64::from_str_radix(digits, 16)
            .map_err(|_| HTTPError::invalid_body("Invalid chunk-size (too big)"))?
    };

    let pairs = super::pc::parse_chunk_extensions(extensions).map_err(|error| {
        tracing::trace!(?error, "parse_chunk_extensions");
        HTTPError::invalid_body(format!("Invalid chunk extension: '{}'", extensions))
    })?;

    let mut builder = HeaderCollection::builder_unvalidated();

    for (name, value) in pairs {
        builder = builder.with(name, value)?;
    }

    Ok(ChunkMetadata {
        length,
        extensions: builder.build(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    StartOfLine,
    InData,
    StartOfTrailer,
    EndOfTrailer,
}

/// Manual decoder for a stream in chunked transfer coding.
///
/// The decoder reads nothing past the end of the trailer so the wrapped
/// stream can be used for the next message.
pub struct ChunkedDecoder<R: BufRead> {
    stream: R,
    parser: MetadataParser,
    state: DecoderState,
    buffer: Vec<u8>,
    chunk_length: u64,
    remaining: u64,
}

impl<R: BufRead> ChunkedDecoder<R> {
    /// Creates a decoder with the given stream and default options.
    pub fn new(stream: R) -> Self {
        Self::with_parser(stream, MetadataParser::default())
    }

    /// Creates a decoder that reads lines and trailers with the given parser.
    pub fn with_parser(stream: R, parser: MetadataParser) -> Self {
        Self {
            stream,
            parser,
            state: DecoderState::StartOfLine,
            buffer: Vec::new(),
            chunk_length: 0,
            remaining: 0,
        }
    }

    /// Returns a reference to the wrapped stream.
    pub fn get_ref(&self) -> &R {
        &self.stream
    }

    /// Returns a mutable reference to the wrapped stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.stream
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> R {
        self.stream
    }

    /// Returns whether the trailer has been read.
    pub fn is_finished(&self) -> bool {
        self.state == DecoderState::EndOfTrailer
    }

    /// Starts reading a chunk.
    ///
    /// The caller must use [Self::read_data] next.
    ///
    /// Panics if called out of sequence.
    pub fn begin_chunk(&mut self) -> Result<ChunkMetadata, HTTPError> {
        tracing::debug!("begin_chunk");
        assert!(self.state == DecoderState::StartOfLine);

        self.buffer.clear();

        let amount = self.stream.read_limit_until(
            b'\n',
            &mut self.buffer,
            self.parser.options().max_line_length(),
        )?;

        if amount == 0 {
            return Err(HTTPError::invalid_body("Missing chunk-size"));
        }

        let line = if let Some(line) = self.buffer.strip_suffix(b"\r\n") {
            line
        } else if let Some(line) = self.buffer.strip_suffix(b"\n") {
            if !self.parser.options().allow_new_line_without_return() {
                return Err(HTTPError::invalid_body(
                    "Illegal new-line character without preceding return",
                ));
            }

            line
        } else {
            &self.buffer[..]
        };

        let line = line.iter().map(|&byte| byte as char).collect::<String>();
        let metadata = parse_chunk_metadata(&line)?;

        tracing::trace!(chunk_length = metadata.length, "begin_chunk");

        self.chunk_length = metadata.length;
        self.remaining = metadata.length;
        self.state = DecoderState::InData;

        Ok(metadata)
    }

    /// Reads chunk data into `buf`.
    ///
    /// Returns 0 when the chunk data has been fully read. The caller must then
    /// use [Self::end_chunk].
    ///
    /// Panics if called out of sequence.
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, HTTPError> {
        assert!(self.state == DecoderState::InData);

        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let limit = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let amount = self.stream.read(&mut buf[..limit])?;

        if amount == 0 {
            return Err(HTTPError::invalid_body(
                "Unexpected EOF while reading chunk data",
            ));
        }

        self.remaining -= amount as u64;

        Ok(amount)
    }

    /// Finishes reading a chunk.
    ///
    /// Unread chunk data is discarded. If the chunk size was 0, the caller
    /// must call [Self::read_trailer] next. Otherwise, the caller must use
    /// [Self::begin_chunk].
    ///
    /// Panics if called out of sequence.
    pub fn end_chunk(&mut self) -> Result<(), HTTPError> {
        tracing::debug!("end_chunk");
        assert!(self.state == DecoderState::InData);

        if self.remaining > 0 {
            let discarded =
                std::io::copy(&mut (&mut self.stream).take(self.remaining), &mut std::io::sink())?;

            if discarded != self.remaining {
                return Err(HTTPError::invalid_body(
                    "Unexpected EOF while reading chunk data",
                ));
            }

            self.remaining = 0;
        }

        if self.chunk_length == 0 {
            self.state = DecoderState::StartOfTrailer;
        } else {
            self.read_chunk_delimiter()?;
            self.state = DecoderState::StartOfLine;
        }

        Ok(())
    }

    fn read_chunk_delimiter(&mut self) -> Result<(), HTTPError> {
        self.buffer.clear();

        match self.stream.read_limit_until(b'\n', &mut self.buffer, 2) {
            Ok(_) if self.buffer == b"\r\n" => Ok(()),
            Ok(_)
                if self.buffer == b"\n"
                    && self.parser.options().allow_new_line_without_return() =>
            {
                Ok(())
            }
            Ok(_) => Err(HTTPError::invalid_body("Missing CRLF after chunk data")),
            Err(error) if error.kind() == std::io::ErrorKind::InvalidData => {
                Err(HTTPError::invalid_body("Missing CRLF after chunk data"))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Finishes reading a stream.
    ///
    /// No more functions can be called after. Use [Self::into_inner] to get
    /// the wrapped stream back.
    ///
    /// Panics if called out of sequence.
    pub fn read_trailer(&mut self) -> Result<HeaderCollection, HTTPError> {
        tracing::debug!("read_trailer");
        assert!(self.state == DecoderState::StartOfTrailer);

        let trailer = self
            .parser
            .parse_headers(&mut self.stream, MetadataKind::Trailer, 1)?;

        self.state = DecoderState::EndOfTrailer;

        Ok(trailer)
    }

    /// Reads a whole chunk.
    ///
    /// Panics if called out of sequence.
    pub fn read_chunk(&mut self) -> Result<Chunk, HTTPError> {
        let metadata = self.begin_chunk()?;
        let mut data = Vec::with_capacity(metadata.length as usize);
        let mut buffer = [0u8; 4096];

        loop {
            let amount = self.read_data(&mut buffer)?;

            if amount == 0 {
                break;
            }

            data.extend_from_slice(&buffer[..amount]);
        }

        self.end_chunk()?;

        Ok(Chunk::new(data, metadata.extensions))
    }

    /// Reads all the chunks and the trailer.
    ///
    /// Panics if the decoder is not at the start of a chunk.
    pub fn read_body_contents(&mut self) -> Result<ChunkedBodyContents, HTTPError> {
        let mut chunks = Vec::new();

        loop {
            let chunk = self.read_chunk()?;
            let terminal = chunk.is_terminal();

            chunks.push(chunk);

            if terminal {
                break;
            }
        }

        let trailer = self.read_trailer()?;

        tracing::debug!(chunk_count = chunks.len(), "read_body_contents");

        Ok(ChunkedBodyContents::new(chunks, trailer))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedReaderState {
    Start,
    ReadingData,
    Finished,
}

/// Reads and decodes a stream in chunked transfer coding.
pub struct ChunkedReader<R: BufRead> {
    inner: ChunkedDecoder<R>,
    state: ChunkedReaderState,
    trailer: Option<HeaderCollection>,
}

impl<R: BufRead> ChunkedReader<R> {
    /// Creates a new `ChunkedReader` with the given stream.
    pub fn new(stream: R) -> Self {
        Self::with_parser(stream, MetadataParser::default())
    }

    /// Creates a new `ChunkedReader` that reads lines and trailers with the given parser.
    pub fn with_parser(stream: R, parser: MetadataParser) -> Self {
        Self {
            inner: ChunkedDecoder::with_parser(stream, parser),
            state: ChunkedReaderState::Start,
            trailer: None,
        }
    }

    /// Returns a reference to the wrapped stream.
    pub fn get_ref(&self) -> &R {
        self.inner.get_ref()
    }

    /// Returns a mutable reference to the wrapped stream.
    pub fn get_mut(&mut self) -> &mut R {
        self.inner.get_mut()
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }

    /// Returns the trailer once the body has been fully read.
    pub fn trailer(&self) -> Option<&HeaderCollection> {
        self.trailer.as_ref()
    }

    fn remap_error(error: HTTPError) -> std::io::Error {
        error.into_io_error()
    }

    fn read_terminal_chunk(&mut self) -> std::io::Result<()> {
        self.inner.end_chunk().map_err(Self::remap_error)?;
        self.trailer = Some(self.inner.read_trailer().map_err(Self::remap_error)?);
        self.state = ChunkedReaderState::Finished;

        Ok(())
    }
}

impl<R: BufRead> Read for ChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match self.state {
                ChunkedReaderState::Start => {
                    let metadata = self.inner.begin_chunk().map_err(Self::remap_error)?;

                    if metadata.length == 0 {
                        self.read_terminal_chunk()?;
                        return Ok(0);
                    }

                    self.state = ChunkedReaderState::ReadingData;
                }
                ChunkedReaderState::ReadingData => {
                    let amount = self.inner.read_data(buf).map_err(Self::remap_error)?;

                    if amount > 0 {
                        return Ok(amount);
                    }

                    self.inner.end_chunk().map_err(Self::remap_error)?;
                    self.state = ChunkedReaderState::Start;
                }
                ChunkedReaderState::Finished => return Ok(0),
            }
        }
    }
}

/// Encodes a stream into chunked transfer coding.
///
/// Reading from the encoder yields the chunked form of the wrapped stream,
/// ending with the terminal chunk and an empty trailer.
pub struct ChunkedEncoder<R: Read> {
    stream: R,
    chunk_size: usize,
    output: Vec<u8>,
    position: usize,
    finished: bool,
}

impl<R: Read> ChunkedEncoder<R> {
    /// Creates an encoder producing chunks of at most `chunk_size` bytes.
    ///
    /// The size is clamped to `1..=MAX_CHUNK_SIZE`.
    pub fn new(stream: R, chunk_size: usize) -> Self {
        Self {
            stream,
            chunk_size: clamp_chunk_size(chunk_size),
            output: Vec::new(),
            position: 0,
            finished: false,
        }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> R {
        self.stream
    }

    fn fill_output(&mut self) -> std::io::Result<()> {
        let mut data = Vec::with_capacity(self.chunk_size);
        (&mut self.stream)
            .take(self.chunk_size as u64)
            .read_to_end(&mut data)?;

        self.output.clear();
        self.position = 0;

        if data.is_empty() {
            tracing::trace!("terminal chunk");
            self.output.extend_from_slice(b"0\r\n\r\n");
            self.finished = true;
        } else {
            write_chunk(&data, &mut self.output);
        }

        Ok(())
    }
}

impl<R: Read> Read for ChunkedEncoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            if self.position < self.output.len() {
                let available = &self.output[self.position..];
                let amount = available.len().min(buf.len());

                buf[..amount].copy_from_slice(&available[..amount]);
                self.position += amount;

                return Ok(amount);
            }

            if self.finished {
                return Ok(0);
            }

            self.fill_output()?;
        }
    }
}

pub(crate) fn clamp_chunk_size(chunk_size: usize) -> usize {
    chunk_size.clamp(1, MAX_CHUNK_SIZE)
}

fn write_chunk(data: &[u8], dest: &mut Vec<u8>) {
    dest.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    dest.extend_from_slice(data);
    dest.extend_from_slice(b"\r\n");
}

/// Encodes data in chunked transfer coding with chunks of at most `chunk_size` bytes.
pub fn encode_chunked(data: &[u8], chunk_size: usize) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() + 16);

    for chunk in data.chunks(clamp_chunk_size(chunk_size)) {
        write_chunk(chunk, &mut output);
    }

    output.extend_from_slice(b"0\r\n\r\n");

    output
}
