use std::io::Write;

use super::HeaderCollection;

impl HeaderCollection {
    /// Writes the header block to `dest`.
    ///
    /// Each field is written as `name: value` followed by CRLF, in insertion
    /// order, then an empty line. Text is encoded with the collection's charset.
    ///
    /// Returns the number of bytes written.
    pub fn write_to<W: Write>(&self, mut dest: W) -> std::io::Result<usize> {
        let buf = self.to_bytes();
        dest.write_all(&buf)?;

        Ok(buf.len())
    }

    /// Returns the header block as wire octets, including the empty line.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        for pair in self.iter() {
            self.charset.encode(pair.name(), &mut buf);
            buf.extend_from_slice(b": ");
            self.charset.encode(pair.value(), &mut buf);
            buf.extend_from_slice(b"\r\n");
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }
}
