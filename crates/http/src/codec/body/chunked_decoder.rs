//! Decoder for `Transfer-Encoding: chunked` payloads (RFC 9112 section 7.1).
//!
//! Used on both sides of the wire: request bodies on the server, response bodies in the
//! client. Chunk extensions and trailer fields are accepted and discarded.

use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, BytesMut};
use std::cmp;
use tokio_util::codec::Decoder;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining: u64,
    size_digits: u8,
    line_has_content: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// hex digits of the chunk size
    Size,
    /// whitespace or `;ext=value` after the size
    Extension,
    /// LF closing the size line
    SizeLf,
    /// chunk data
    Data,
    /// CR after chunk data
    DataCr,
    /// LF after chunk data
    DataLf,
    /// trailer field lines after the last chunk
    Trailer,
    /// LF closing a trailer line
    TrailerLf,
    End,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: ChunkedState::Size, remaining: 0, size_digits: 0, line_has_content: false }
    }

    fn after_size_line(&mut self) -> Result<ChunkedState, ParseError> {
        if self.size_digits == 0 {
            return Err(ParseError::invalid_body("missing chunk size"));
        }
        if self.remaining == 0 {
            self.line_has_content = false;
            Ok(ChunkedState::Trailer)
        } else {
            Ok(ChunkedState::Data)
        }
    }

    fn after_trailer_line(&mut self) -> ChunkedState {
        if self.line_has_content {
            self.line_has_content = false;
            ChunkedState::Trailer
        } else {
            ChunkedState::End
        }
    }

    fn next_chunk(&mut self) -> ChunkedState {
        self.remaining = 0;
        self.size_digits = 0;
        ChunkedState::Size
    }

    fn step(&mut self, byte: u8) -> Result<ChunkedState, ParseError> {
        use ChunkedState::*;

        let next = match (self.state, byte) {
            (Size, b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F') => {
                // from_digit can't fail on the matched range
                let digit = u64::from((byte as char).to_digit(16).unwrap_or_default());
                self.remaining = self
                    .remaining
                    .checked_mul(16)
                    .and_then(|size| size.checked_add(digit))
                    .ok_or_else(|| ParseError::invalid_body("chunk size overflow"))?;
                self.size_digits = self.size_digits.saturating_add(1);
                Size
            }
            (Size, b';' | b' ' | b'\t') => Extension,
            (Size | Extension, b'\r') => SizeLf,
            (Size | Extension | SizeLf, b'\n') => self.after_size_line()?,
            (Extension, _) => Extension,
            (DataCr, b'\r') => DataLf,
            (DataCr | DataLf, b'\n') => self.next_chunk(),
            (Trailer, b'\r') => TrailerLf,
            (Trailer | TrailerLf, b'\n') => self.after_trailer_line(),
            (Trailer, _) => {
                self.line_has_content = true;
                Trailer
            }
            (state, byte) => {
                return Err(ParseError::invalid_body(format!("unexpected byte {byte:#04x} in chunked state {state:?}")));
            }
        };

        Ok(next)
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ChunkedState::End => {
                    trace!("finished reading chunked data");
                    return Ok(Some(PayloadItem::Eof));
                }
                ChunkedState::Data => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    let len = cmp::min(self.remaining, src.len() as u64);
                    #[allow(clippy::cast_possible_truncation, reason = "len is bounded by src.len()")]
                    let bytes = src.split_to(len as usize).freeze();
                    self.remaining -= len;
                    if self.remaining == 0 {
                        self.state = ChunkedState::DataCr;
                    }

                    trace!(len = bytes.len(), "read chunked bytes");
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }
                _ => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let byte = src.get_u8();
                    self.state = self.step(byte)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn decode_all(decoder: &mut ChunkedDecoder, src: &mut BytesMut) -> (Vec<u8>, bool) {
        let mut body = Vec::new();
        loop {
            match decoder.decode(src).unwrap() {
                Some(PayloadItem::Chunk(bytes)) => body.extend_from_slice(&bytes),
                Some(PayloadItem::Eof) => return (body, true),
                None => return (body, false),
            }
        }
    }

    #[test]
    fn decodes_chunks_with_extensions_and_trailers() {
        let mut src = BytesMut::from(&b"5;name=value\r\nhello\r\n7\r\n, world\r\n0\r\nx-trailer: 1\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let (body, eof) = decode_all(&mut decoder, &mut src);

        assert!(eof);
        assert_eq!(body, b"hello, world");
        assert!(src.is_empty());
    }

    #[test]
    fn waits_for_more_data_mid_chunk() {
        let mut src = BytesMut::from(&b"A\r\n01234"[..]);
        let mut decoder = ChunkedDecoder::new();

        let (body, eof) = decode_all(&mut decoder, &mut src);
        assert!(!eof);
        assert_eq!(body, b"01234");

        src.extend_from_slice(b"56789\r\n0\r\n\r\n");
        let (body, eof) = decode_all(&mut decoder, &mut src);
        assert!(eof);
        assert_eq!(body, b"56789");
    }

    #[test]
    fn rejects_garbage_size() {
        let mut src = BytesMut::from(&b"zz\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert!(decoder.decode(&mut src).is_err());
    }

    #[test]
    fn rejects_missing_crlf_after_data() {
        let mut src = BytesMut::from(&b"2\r\nokXY"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(decoder.decode(&mut src).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"ok"))));
        assert!(decoder.decode(&mut src).is_err());
    }
}
