use crate::codec::body::PayloadDecoder;
use crate::codec::header::ResponseHeadDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, ResponseHead};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Client-side decoder: a response head, then its payload items up to `Eof`.
///
/// A close-delimited payload ends when the stream does. For every other framing a stream
/// that ends before `Eof` yields no terminal item, which the caller sees as truncation.
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    payload_decoder: Option<PayloadDecoder>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<ResponseHead>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            if item.as_ref().is_some_and(PayloadItem::is_eof) {
                self.payload_decoder.take();
            }
            return Ok(item.map(Message::Payload));
        }

        let message = ResponseHeadDecoder.decode(src)?.map(|(head, payload_decoder)| {
            self.payload_decoder = Some(payload_decoder);
            Message::Header(head)
        });

        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }

        match &self.payload_decoder {
            Some(payload_decoder) if payload_decoder.is_until_close() => {
                self.payload_decoder.take();
                Ok(Some(Message::Payload(PayloadItem::Eof)))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn chunked_response() {
        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n");
        let mut decoder = ResponseDecoder::new();

        let Some(Message::Header(head)) = decoder.decode(&mut buf).unwrap() else { panic!("expect head") };
        assert_eq!(head.status(), StatusCode::OK);

        let chunk = decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap();
        assert_eq!(chunk.into_bytes().unwrap(), "hello");
        assert!(decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap().is_eof());
        assert!(buf.is_empty());
    }

    #[test]
    fn close_delimited_ends_at_stream_end() {
        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\n\r\nbody");
        let mut decoder = ResponseDecoder::new();

        assert!(decoder.decode(&mut buf).unwrap().unwrap().is_header());
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap().into_bytes().unwrap(), "body");
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(decoder.decode_eof(&mut buf).unwrap().unwrap().into_payload_item().unwrap().is_eof());
    }

    #[test]
    fn truncated_length_body_has_no_eof() {
        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort");
        let mut decoder = ResponseDecoder::new();

        assert!(decoder.decode(&mut buf).unwrap().unwrap().is_header());
        assert!(decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap().is_chunk());
        assert!(decoder.decode_eof(&mut buf).unwrap().is_none());
    }
}
