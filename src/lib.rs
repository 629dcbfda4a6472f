//! Raw HTTP/1.x message parsing, framing and serialization.
//!
//! Messages are read from any [std::io::BufRead] with [http::RawHttp] and
//! written back byte for byte with `write_to`.

#![warn(missing_docs)]
pub mod compress;
pub mod error;
pub mod header;
pub mod http;
pub mod io;
pub mod stringutil;
