//! IO helpers.

use std::io::{BufRead, Error, ErrorKind, Read, Result};

/// Extension trait for [std::io::BufRead].
pub trait BufReadMoreExt {
    /// Reads bytes into `buf` until the delimiter `byte` or EOF is reached.
    ///
    /// This function is similar to [std::io::BufRead::read_until].
    /// In addition, this function returns an error when the number of bytes
    /// read equals `limit` and the deliminator has not been reached.
    fn read_limit_until(&mut self, byte: u8, buf: &mut Vec<u8>, limit: u64) -> Result<usize>;
}

impl<R: BufRead> BufReadMoreExt for R {
    fn read_limit_until(&mut self, byte: u8, buf: &mut Vec<u8>, limit: u64) -> Result<usize> {
        // Compiler won't use Take<&mut R> in trait here so it's in a separate function.
        read_limit_until(self, byte, buf, limit)
    }
}

fn read_limit_until<R: BufRead>(
    stream: R,
    byte: u8,
    buf: &mut Vec<u8>,
    limit: u64,
) -> Result<usize> {
    let mut stream = stream.take(limit);
    let amount = stream.read_until(byte, buf)?;

    if amount as u64 == limit && !buf.ends_with(&[byte]) {
        return Err(Error::new(ErrorKind::InvalidData, "line too long"));
    }

    Ok(amount)
}

/// Buffered reader that keeps a copy of every byte consumed from the wrapped stream.
///
/// Used to capture the wire form of a body while it is being decoded. Bytes
/// that were only peeked with [BufRead::fill_buf] are not recorded.
pub struct RecordingReader<R: BufRead> {
    stream: R,
    record: Vec<u8>,
}

impl<R: BufRead> RecordingReader<R> {
    /// Creates a reader with the given stream.
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            record: Vec::new(),
        }
    }

    /// Returns a reference to the wrapped stream.
    pub fn get_ref(&self) -> &R {
        &self.stream
    }

    /// Returns the bytes recorded so far.
    pub fn record(&self) -> &[u8] {
        &self.record
    }

    /// Removes and returns the bytes recorded so far.
    pub fn take_record(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.record)
    }

    /// Returns the wrapped stream and the recorded bytes.
    pub fn into_parts(self) -> (R, Vec<u8>) {
        (self.stream, self.record)
    }
}

impl<R: BufRead> Read for RecordingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let amount = {
            let available = self.stream.fill_buf()?;
            let amount = available.len().min(buf.len());

            buf[..amount].copy_from_slice(&available[..amount]);
            self.record.extend_from_slice(&available[..amount]);

            amount
        };

        self.stream.consume(amount);

        Ok(amount)
    }
}

impl<R: BufRead> BufRead for RecordingReader<R> {
    fn fill_buf(&mut self) -> Result<&[u8]> {
        self.stream.fill_buf()
    }

    fn consume(&mut self, amount: usize) {
        // The buffer is already filled so this does not touch the source.
        if let Ok(available) = self.stream.fill_buf() {
            let amount = amount.min(available.len());
            self.record.extend_from_slice(&available[..amount]);
        }

        self.stream.consume(amount);
    }
}
