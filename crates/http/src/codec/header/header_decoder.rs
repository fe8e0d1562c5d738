//! Request head decoder.
//!
//! Parses the request line and header fields with `httparse`, copies them into an
//! `http::Request<()>` and decides how the request payload is framed
//! (RFC 9112 section 6.3). Heads are limited to [`MAX_HEADER_BYTES`] bytes and
//! [`MAX_HEADER_NUM`] fields.

use bytes::{Buf, BytesMut};
use http::{HeaderName, HeaderValue, Method, Request, Uri, Version};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, RequestHeader};

pub(crate) const MAX_HEADER_NUM: usize = 64;

pub(crate) const MAX_HEADER_BYTES: usize = 8 * 1024;

#[derive(Debug)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut parsed = httparse::Request::new(&mut headers);

        let body_offset = match parsed.parse(src).map_err(map_httparse_error)? {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };
        trace!(head_size = body_offset, "parsed request head");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let version = match parsed.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            v => return Err(ParseError::InvalidVersion(v)),
        };
        let method = parsed.method.ok_or(ParseError::InvalidMethod)?;
        let method = Method::from_bytes(method.as_bytes()).map_err(|_e| ParseError::InvalidMethod)?;
        let uri = parsed.path.ok_or(ParseError::InvalidUri)?.parse::<Uri>().map_err(|_e| ParseError::InvalidUri)?;

        let mut request = Request::new(());
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.version_mut() = version;

        let header_map = request.headers_mut();
        header_map.reserve(parsed.headers.len());
        for field in parsed.headers.iter() {
            let name = HeaderName::from_bytes(field.name.as_bytes()).map_err(ParseError::invalid_header)?;
            let value = HeaderValue::from_bytes(field.value).map_err(ParseError::invalid_header)?;
            header_map.append(name, value);
        }

        src.advance(body_offset);

        let header = RequestHeader::from(request);
        let payload_size = parse_payload(&header)?;
        Ok(Some((header, payload_size)))
    }
}

pub(crate) fn map_httparse_error(e: httparse::Error) -> ParseError {
    match e {
        httparse::Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        e => ParseError::invalid_header(e.to_string()),
    }
}

fn parse_payload(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    if !header.need_body() {
        return Ok(PayloadSize::Empty);
    }

    // refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-transfer-encoding
    let te_header = header.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = header.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::Empty),
        (Some(te_value), None) => {
            if is_chunked(Some(te_value)) {
                Ok(PayloadSize::Chunked)
            } else {
                Err(ParseError::invalid_header("transfer-encoding without final chunked coding"))
            }
        }
        (None, Some(cl_value)) => parse_content_length(cl_value).map(PayloadSize::from_length),
        (Some(_), Some(_)) => {
            Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers"))
        }
    }
}

pub(crate) fn parse_content_length(value: &HeaderValue) -> Result<u64, ParseError> {
    let cl_str = value.to_str().map_err(|_e| ParseError::invalid_content_length("value can't to_str"))?;
    cl_str.trim().parse::<u64>().map_err(|_e| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))
}

/// Chunked must be the final transfer coding to frame a message.
pub(crate) fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    header_value
        .and_then(|value| value.as_bytes().rsplit(|b| *b == b',').next())
        .is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(CHUNKED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;
    use indoc::indoc;

    #[test]
    fn check_is_chunked() {
        let mut headers = HeaderMap::new();
        assert!(!is_chunked(headers.get(http::header::TRANSFER_ENCODING)));

        headers.insert("Transfer-Encoding", "gzip, chunked".parse().unwrap());
        assert!(is_chunked(headers.get(http::header::TRANSFER_ENCODING)));

        headers.insert("Transfer-Encoding", "chunked, gzip".parse().unwrap());
        assert!(!is_chunked(headers.get(http::header::TRANSFER_ENCODING)));
    }

    #[test]
    fn decodes_get_head() {
        let str = indoc! {r"
        GET /toss/?attempt=1 HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "};

        let mut buf = BytesMut::from(str);
        let (header, payload_size) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();

        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.uri().path(), "/toss/");
        assert_eq!(header.uri().query(), Some("attempt=1"));
        assert_eq!(header.headers().len(), 3);
        assert_eq!(header.headers().get(http::header::HOST).unwrap(), "127.0.0.1:8080");
        assert_eq!(payload_size, PayloadSize::Empty);
        assert!(buf.is_empty());
    }

    #[test]
    fn decodes_post_framing() {
        let mut buf = BytesMut::from("POST /upload HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
        let (_header, payload_size) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(payload_size, PayloadSize::Length(5));
        assert_eq!(&buf[..], b"hello");

        let mut buf = BytesMut::from("POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n");
        let (_header, payload_size) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(payload_size, PayloadSize::Chunked);

        let mut buf =
            BytesMut::from("POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\nContent-Length: 5\r\n\r\n");
        assert!(HeaderDecoder.decode(&mut buf).is_err());
    }

    #[test]
    fn partial_head_waits_until_limit() {
        let mut buf = BytesMut::from("GET /toss/ HTTP/1.1\r\nHost: loc");
        assert!(HeaderDecoder.decode(&mut buf).unwrap().is_none());

        let mut huge = BytesMut::from("GET / HTTP/1.1\r\nX-Big: ");
        huge.extend_from_slice(&[b'a'; MAX_HEADER_BYTES]);
        assert!(matches!(HeaderDecoder.decode(&mut huge), Err(ParseError::TooLargeHeader { .. })));
    }
}
