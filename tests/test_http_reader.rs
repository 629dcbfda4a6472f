use std::{
    fs::File,
    io::{BufReader, Cursor, Read, Write},
    path::PathBuf,
};

use flate2::{write::GzEncoder, Compression};
use url::Url;

use rawhttp::{
    header::HeaderCharset,
    http::{
        chunked::encode_chunked, FramedBody, HTTPError, HttpVersion, RawHttp, RawHttpOptions,
        RequestLine,
    },
};

fn data_file(name: &str) -> BufReader<File> {
    let path = PathBuf::new()
        .join(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name);

    BufReader::new(File::open(path).unwrap())
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[test_log::test]
fn test_read_requests() {
    let http = RawHttp::new();
    let mut stream = data_file("http_request_minimal");

    // GET
    {
        let request = http.parse_request(&mut stream).unwrap();
        assert_eq!(request.method(), "GET");
        assert_eq!(request.uri().as_str(), "http://example.com/index.html");
        assert_eq!(request.version(), HttpVersion::Http11);
        assert_eq!(request.headers().get_first("host"), Some("example.com"));
        assert!(request.body().is_none());
    }

    // POST
    {
        let mut request = http.parse_request(&mut stream).unwrap();
        assert_eq!(request.method(), "POST");
        assert_eq!(request.request_line().target(), "/api");

        let body = request.body_mut().unwrap();
        assert_eq!(body.framed().content_length(), Some(14));
        assert_eq!(body.read_decoded().unwrap(), b"Hello world!\r\n");
    }

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}

#[test_log::test]
fn test_read_responses() {
    let http = RawHttp::new();
    let mut stream = data_file("http_response_minimal");

    // Content length
    {
        let mut response = http.parse_response(&mut stream).unwrap();
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.reason(), "OK");

        let body = response.body_mut().unwrap();
        assert_eq!(body.read_raw().unwrap(), b"Hello world!\r\n");
    }

    // Chunked
    {
        let response = http.parse_response(&mut stream).unwrap().eagerly().unwrap();
        let body = response.body().unwrap();
        assert!(body.is_chunked());

        let contents = body.as_chunked_body_contents().unwrap();
        assert_eq!(contents.data(), b"Hello world!");
        assert_eq!(contents.chunks().len(), 3);
        assert_eq!(contents.chunks()[0].extensions().get("name"), vec!["first"]);
        assert_eq!(contents.trailer().get("expires"), vec!["never"]);

        assert_eq!(
            response.headers().header_names(),
            vec!["Transfer-Encoding", "Trailer", "Expires"]
        );
    }

    // Not modified
    {
        let response = http.parse_response(&mut stream).unwrap();
        assert_eq!(response.status_code(), 304);
        assert_eq!(response.reason(), "Not Modified");
        assert!(response.body().is_none());
    }

    // No content length
    {
        let mut response = http.parse_response(&mut stream).unwrap();
        assert_eq!(response.version(), HttpVersion::Http10);

        let body = response.body_mut().unwrap();
        assert!(matches!(body.framed(), FramedBody::CloseTerminated(_)));
        assert_eq!(body.read_decoded().unwrap(), b"Hello world!\r\n");
    }
}

#[test_log::test]
fn test_authority_form_request() {
    let http = RawHttp::new();
    let mut request = http.parse_request(&b"GET localhost:8080"[..]).unwrap();

    assert_eq!(request.method(), "GET");
    assert_eq!(request.version(), HttpVersion::Http11);
    assert_eq!(request.uri().as_str(), "http://localhost:8080/");
    assert_eq!(request.headers().get("Host"), vec!["localhost"]);
    assert_eq!(request.headers().len(), 1);
    assert_eq!(
        request.to_bytes().unwrap(),
        b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n"
    );
}

#[test_log::test]
fn test_missing_header_separator() {
    let http = RawHttp::new();
    let error = http
        .parse_request(&b"GET / HTTP/1.1\r\nINVALID\r\n"[..])
        .unwrap_err();

    match error {
        HTTPError::InvalidRequest(error) => {
            assert_eq!(error.line(), 2);
            assert_eq!(error.message(), "Invalid header: missing the ':' separator");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test_log::test]
fn test_strict_requests() {
    let http = RawHttp::with_options(RawHttpOptions::strict());

    let error = http
        .parse_request(&b"GET /\r\nHost: a\r\n\r\n"[..])
        .unwrap_err();
    assert_eq!(error.to_string(), "Missing HTTP version");

    let error = http
        .parse_request(&b"GET / HTTP/1.1\r\nHost: a\nAccept: */*\r\n\r\n"[..])
        .unwrap_err();
    let error = error.message_error().unwrap();
    assert_eq!(error.line(), 2);
    assert_eq!(
        error.message(),
        "Illegal new-line character without preceding return"
    );

    let error = http
        .parse_request(&b"\r\nGET / HTTP/1.1\r\nHost: a\r\n\r\n"[..])
        .unwrap_err();
    assert_eq!(error.message_error().unwrap().line(), 0);

    let request = http
        .parse_request(&b"GET localhost:8080 HTTP/1.1\r\n\r\n"[..])
        .unwrap();
    assert!(request.headers().is_empty());
}

#[test_log::test]
fn test_lenient_requests() {
    let http = RawHttp::new();

    let mut request = http
        .parse_request_bytes(b"\nPOST /form\nHost: example.com\nContent-Length: 3\n\nabc")
        .unwrap();
    assert_eq!(request.method(), "POST");
    assert_eq!(request.version(), HttpVersion::Http11);
    assert_eq!(request.uri().as_str(), "http://example.com/form");
    assert_eq!(request.body_mut().unwrap().read_decoded().unwrap(), b"abc");

    let request = http
        .parse_request_bytes(b"https://example.com/search?q=rust")
        .unwrap();
    assert_eq!(request.method(), "GET");
    assert_eq!(request.request_line().decoded_query().as_deref(), Some("q=rust"));
    assert_eq!(request.headers().get("host"), vec!["example.com"]);
}

#[test_log::test]
fn test_illegal_target_characters() {
    let http = RawHttp::new();
    let error = http
        .parse_request(&b"GET /a|b HTTP/1.1\r\nHost: a\r\n\r\n"[..])
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "Invalid request target: Illegal character in path at index 2: '/a|b'"
    );

    let mut options = RawHttpOptions::new();
    options.set_allow_illegal_start_line_characters(true);
    let http = RawHttp::with_options(options);

    let request = http
        .parse_request_bytes(b"GET /my file.txt HTTP/1.1\r\nHost: a\r\n\r\n")
        .unwrap();
    assert_eq!(request.uri().path(), "/my%20file.txt");
    assert_eq!(request.request_line().decoded_path(), "/my file.txt");
    assert_eq!(request.version(), HttpVersion::Http11);
}

#[test_log::test]
fn test_response_gzip_chunked() {
    let compressed = gzip(b"The quick brown fox jumps over the lazy dog.");
    let mut data = b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    data.extend_from_slice(&encode_chunked(&compressed, 16));
    data.extend_from_slice(b"HTTP/1.1 204 No Content\r\n\r\n");

    let http = RawHttp::new();
    let mut stream = Cursor::new(data);

    {
        let mut response = http.parse_response(&mut stream).unwrap();
        let body = response.body_mut().unwrap();

        assert_eq!(body.framed().decoder().encodings(), ["gzip", "chunked"]);
        assert_eq!(
            body.read_decoded().unwrap(),
            b"The quick brown fox jumps over the lazy dog."
        );
        assert_eq!(body.read_decoded().unwrap(), b"");
    }

    let response = http.parse_response(&mut stream).unwrap();
    assert_eq!(response.status_code(), 204);
    assert!(response.body().is_none());
}

#[test_log::test]
fn test_response_brotli() {
    let mut compressed = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut compressed, 4096, 5, 22);
        writer.write_all(b"Hello brotli!").unwrap();
    }

    let mut data = format!(
        "HTTP/1.1 200 OK\r\nContent-Encoding: br\r\nContent-Length: {}\r\n\r\n",
        compressed.len()
    )
    .into_bytes();
    data.extend_from_slice(&compressed);

    let response = RawHttp::new().parse_response_bytes(&data).unwrap();
    let body = response.body().unwrap();

    match body {
        rawhttp::http::body::BodyReader::Eager(body) => {
            assert_eq!(body.raw(), compressed.as_slice());
            assert_eq!(body.decoded().unwrap(), b"Hello brotli!");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test_log::test]
fn test_response_to_head() {
    let http = RawHttp::new();
    let head = RequestLine::new(
        "HEAD",
        Url::parse("http://example.com/").unwrap(),
        HttpVersion::Http11,
    );
    let mut stream = Cursor::new(
        b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello"
            .to_vec(),
    );

    {
        let response = http.parse_response_for(&mut stream, Some(&head)).unwrap();
        assert!(response.body().is_none());
        assert_eq!(response.headers().get("content-length"), vec!["5"]);
    }

    let mut response = http.parse_response(&mut stream).unwrap();
    assert_eq!(
        response.body_mut().unwrap().read_raw().unwrap(),
        b"hello"
    );
}

#[test_log::test]
fn test_content_length_mismatch() {
    let http = RawHttp::new();
    let error = http
        .parse_response_bytes(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort")
        .unwrap_err();
    assert!(matches!(error, HTTPError::InvalidBody { .. }));
    assert_eq!(error.to_string(), "content length mismatch");

    let mut options = RawHttpOptions::new();
    options.set_allow_content_length_mismatch(true);
    let mut response = RawHttp::with_options(options)
        .parse_response_bytes(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort")
        .unwrap();
    assert_eq!(
        response.body_mut().unwrap().read_raw().unwrap(),
        b"short"
    );
}

#[test_log::test]
fn test_invalid_status_lines() {
    let http = RawHttp::new();

    let error = http.parse_response(&b""[..]).unwrap_err();
    assert_eq!(error.to_string(), "No content");
    assert_eq!(error.message_error().unwrap().line(), 0);

    let error = http
        .parse_response(&b"HTTP/1.1 OK\r\n\r\n"[..])
        .unwrap_err();
    assert_eq!(error.to_string(), "Invalid status code");

    let response = http.parse_response(&b"404 Not Found\r\n\r\n"[..]).unwrap();
    assert_eq!(response.version(), HttpVersion::Http11);
    assert_eq!(response.status_code(), 404);

    let error = RawHttp::with_options(RawHttpOptions::strict())
        .parse_response(&b"404 Not Found\r\n\r\n"[..])
        .unwrap_err();
    assert_eq!(error.to_string(), "Missing HTTP version");
}

#[test_log::test]
fn test_header_charset() {
    let data = "HTTP/1.1 200 OK\r\nX-Name: caf\u{e9}\r\n\r\n".as_bytes().to_vec();

    let response = RawHttp::new().parse_response_bytes(&data).unwrap();
    assert_eq!(response.headers().get("x-name"), vec!["caf\u{c3}\u{a9}"]);

    let mut options = RawHttpOptions::new();
    options.set_header_charset(HeaderCharset::Utf8);
    let mut response = RawHttp::with_options(options)
        .parse_response_bytes(&data)
        .unwrap();
    assert_eq!(response.headers().get("x-name"), vec!["caf\u{e9}"]);
    assert_eq!(response.to_bytes().unwrap(), data);
}
