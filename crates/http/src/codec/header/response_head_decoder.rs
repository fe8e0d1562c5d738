//! Response head decoder, the client-side mirror of [`super::HeaderDecoder`].

use bytes::{Buf, BytesMut};
use http::{HeaderName, HeaderValue, StatusCode, header};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use super::header_decoder::{MAX_HEADER_BYTES, MAX_HEADER_NUM, is_chunked, map_httparse_error, parse_content_length};
use crate::codec::body::PayloadDecoder;
use crate::ensure;
use crate::protocol::{ParseError, ResponseHead, build_response_head};

#[derive(Debug)]
pub struct ResponseHeadDecoder;

impl Decoder for ResponseHeadDecoder {
    type Item = (ResponseHead, PayloadDecoder);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut parsed = httparse::Response::new(&mut headers);

        let body_offset = match parsed.parse(src).map_err(map_httparse_error)? {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };
        ensure!(parsed.version == Some(1), ParseError::InvalidVersion(parsed.version));

        let status = parsed
            .code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or(ParseError::InvalidStatus(parsed.code))?;

        let mut header_map = http::HeaderMap::with_capacity(parsed.headers.len());
        for field in parsed.headers.iter() {
            let name = HeaderName::from_bytes(field.name.as_bytes()).map_err(ParseError::invalid_header)?;
            let value = HeaderValue::from_bytes(field.value).map_err(ParseError::invalid_header)?;
            header_map.append(name, value);
        }
        src.advance(body_offset);
        trace!(status = status.as_u16(), head_size = body_offset, "parsed response head");

        let head = build_response_head(status, header_map);
        let payload_decoder = payload_decoder_for(&head)?;
        Ok(Some((head, payload_decoder)))
    }
}

/// RFC 9112 section 6.3 message body length rules for responses.
fn payload_decoder_for(head: &ResponseHead) -> Result<PayloadDecoder, ParseError> {
    let status = head.status();
    if status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return Ok(PayloadDecoder::empty());
    }

    let headers = head.headers();
    if let Some(te_value) = headers.get(header::TRANSFER_ENCODING) {
        return Ok(if is_chunked(Some(te_value)) { PayloadDecoder::chunked() } else { PayloadDecoder::until_close() });
    }

    match headers.get(header::CONTENT_LENGTH) {
        Some(cl_value) => parse_content_length(cl_value).map(PayloadDecoder::fix_length),
        None => Ok(PayloadDecoder::until_close()),
    }
}
