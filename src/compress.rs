//! Content and transfer coding decoders.
//!
//! An [EncodingRegistry] resolves coding names found in `Content-Encoding` and
//! `Transfer-Encoding` to a [ContentDecoder]. The `chunked` coding is framing,
//! not compression, and is handled by [crate::http::chunked] instead.

use std::{
    collections::HashMap,
    fmt::Debug,
    io::{BufReader, Read},
    str::FromStr,
    sync::Arc,
};

use flate2::read::{MultiGzDecoder, ZlibDecoder};
use zstd::stream::read::Decoder as ZstdDecoder;

/// Reverses one content coding.
pub trait ContentDecoder: Send + Sync {
    /// Wraps `stream` so reading from the result yields decoded data.
    fn decode<'a>(&self, stream: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>>;
}

/// Built-in compression formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// No transformation.
    Identity,
    /// gzip (RFC 1952).
    Gzip,
    /// zlib wrapped deflate (RFC 1950).
    Deflate,
    /// Brotli.
    Brotli,
    /// Zstandard.
    Zstd,
}

impl CompressionFormat {
    /// Coding name as used in headers.
    pub fn name(&self) -> &'static str {
        match self {
            CompressionFormat::Identity => "identity",
            CompressionFormat::Gzip => "gzip",
            CompressionFormat::Deflate => "deflate",
            CompressionFormat::Brotli => "br",
            CompressionFormat::Zstd => "zstd",
        }
    }
}

impl FromStr for CompressionFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "identity" => Ok(Self::Identity),
            "gzip" | "x-gzip" => Ok(Self::Gzip),
            "deflate" => Ok(Self::Deflate),
            "br" => Ok(Self::Brotli),
            "zstd" => Ok(Self::Zstd),
            _ => Err(()),
        }
    }
}

impl ContentDecoder for CompressionFormat {
    fn decode<'a>(&self, stream: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>> {
        tracing::trace!(format = self.name(), "decode");

        Ok(match self {
            CompressionFormat::Identity => stream,
            CompressionFormat::Gzip => Box::new(MultiGzDecoder::new(stream)),
            CompressionFormat::Deflate => Box::new(ZlibDecoder::new(stream)),
            CompressionFormat::Brotli => Box::new(brotli::Decompressor::new(stream, 4096)),
            CompressionFormat::Zstd => Box::new(ZstdDecoder::with_buffer(BufReader::new(stream))?),
        })
    }
}

/// Maps coding names to decoders.
///
/// Names are case-insensitive. Cloning is cheap and clones share decoders.
#[derive(Clone)]
pub struct EncodingRegistry {
    decoders: HashMap<String, Arc<dyn ContentDecoder>>,
}

impl EncodingRegistry {
    /// Creates a registry with no decoders.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in [CompressionFormat] decoders.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        for name in ["identity", "gzip", "x-gzip", "deflate", "br", "zstd"] {
            if let Ok(format) = CompressionFormat::from_str(name) {
                registry.register(name, Arc::new(format));
            }
        }

        registry
    }

    /// Adds or replaces the decoder for a coding name.
    pub fn register<N: Into<String>>(&mut self, name: N, decoder: Arc<dyn ContentDecoder>) {
        let mut name = name.into();
        name.make_ascii_lowercase();
        self.decoders.insert(name, decoder);
    }

    /// Returns the decoder for a coding name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ContentDecoder>> {
        self.decoders.get(&name.to_ascii_lowercase())
    }

    /// Returns whether a coding name has a decoder.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

impl Default for EncodingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for EncodingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.decoders.keys().collect::<Vec<&String>>();
        names.sort();

        f.debug_struct("EncodingRegistry")
            .field("decoders", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use flate2::{
        write::{GzEncoder, ZlibEncoder},
        Compression,
    };

    use super::*;

    fn decode_with(registry: &EncodingRegistry, name: &str, data: Vec<u8>) -> Vec<u8> {
        let decoder = registry.get(name).unwrap();
        let mut reader = decoder.decode(Box::new(Cursor::new(data))).unwrap();
        let mut output = Vec::new();
        reader.read_to_end(&mut output).unwrap();
        output
    }

    #[test]
    fn test_format_names() {
        assert_eq!(CompressionFormat::from_str("GZIP"), Ok(CompressionFormat::Gzip));
        assert_eq!(CompressionFormat::from_str("x-gzip"), Ok(CompressionFormat::Gzip));
        assert_eq!(CompressionFormat::from_str("br"), Ok(CompressionFormat::Brotli));
        assert!(CompressionFormat::from_str("chunked").is_err());
        assert_eq!(CompressionFormat::Zstd.name(), "zstd");
    }

    #[test]
    fn test_gzip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"Hello world!").unwrap();
        let data = encoder.finish().unwrap();

        let registry = EncodingRegistry::new();
        assert_eq!(decode_with(&registry, "gzip", data), b"Hello world!");
    }

    #[test]
    fn test_deflate() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"Hello world!").unwrap();
        let data = encoder.finish().unwrap();

        let registry = EncodingRegistry::new();
        assert_eq!(decode_with(&registry, "Deflate", data), b"Hello world!");
    }

    #[test]
    fn test_zstd() {
        let data = zstd::encode_all(Cursor::new(b"Hello world!".to_vec()), 3).unwrap();

        let registry = EncodingRegistry::new();
        assert_eq!(decode_with(&registry, "zstd", data), b"Hello world!");
    }

    #[test]
    fn test_identity() {
        let registry = EncodingRegistry::new();
        assert_eq!(
            decode_with(&registry, "identity", b"abc".to_vec()),
            b"abc"
        );
    }

    struct Reverse;

    impl ContentDecoder for Reverse {
        fn decode<'a>(
            &self,
            mut stream: Box<dyn Read + 'a>,
        ) -> std::io::Result<Box<dyn Read + 'a>> {
            let mut data = Vec::new();
            stream.read_to_end(&mut data)?;
            data.reverse();
            Ok(Box::new(Cursor::new(data)))
        }
    }

    #[test]
    fn test_register_custom() {
        let mut registry = EncodingRegistry::empty();
        assert!(!registry.contains("gzip"));

        registry.register("X-Reverse", Arc::new(Reverse));
        assert!(registry.contains("x-reverse"));
        assert_eq!(decode_with(&registry, "x-REVERSE", b"abc".to_vec()), b"cba");
    }
}
