use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

/// Copies payload bytes under `Content-Length` framing, refusing to send more than declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    declared: u64,
    remaining: u64,
    eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { declared: length, remaining: length, eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(mut bytes) => {
                let size = bytes.remaining() as u64;
                if size == 0 {
                    return Ok(());
                }
                if size > self.remaining {
                    warn!(declared = self.declared, attempted = self.declared - self.remaining + size, "payload exceeds content-length");
                    return Err(SendError::ContentLengthExceeded {
                        declared: self.declared,
                        attempted: self.declared - self.remaining + size,
                    });
                }
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    let len = chunk.len();
                    dst.put_slice(chunk);
                    bytes.advance(len);
                }
                self.remaining -= size;
                Ok(())
            }
            PayloadItem::Eof => {
                if self.remaining > 0 {
                    return Err(SendError::ContentLengthShort {
                        declared: self.declared,
                        written: self.declared - self.remaining,
                    });
                }
                self.eof = true;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn rejects_bytes_past_the_declared_length() {
        let mut encoder = LengthEncoder::new(5);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hel")), &mut dst).unwrap();
        let result = encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"lo!")), &mut dst);

        assert!(matches!(result, Err(SendError::ContentLengthExceeded { declared: 5, attempted: 6 })));
        assert_eq!(&dst[..], b"hel");
        assert!(!encoder.is_finish());
    }

    #[test]
    fn short_body_fails_at_eof() {
        let mut encoder = LengthEncoder::new(5);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hey")), &mut dst).unwrap();
        let result = encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst);

        assert!(matches!(result, Err(SendError::ContentLengthShort { declared: 5, written: 3 })));
        assert!(!encoder.is_finish());
    }
}
