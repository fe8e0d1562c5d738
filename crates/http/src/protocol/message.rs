use bytes::{Buf, Bytes};

/// A unit flowing through the codecs: either a message head or a piece of its payload.
///
/// `T` is the head type (request head on the read side, response head plus framing on
/// the write side), `Data` is the payload buffer type.
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// the head of a message, always the first item of an exchange
    Header(T),
    /// a chunk of payload or the end-of-payload marker
    Payload(PayloadItem<Data>),
}

/// One step of a payload stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    Chunk(Data),
    Eof,
}

/// How a payload is framed on the wire.
///
/// For responses this is the decision taken once at commit time, see
/// [`crate::response::TransferEncodingSelector`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// `Content-Length: n` framing
    Length(u64),
    /// `Transfer-Encoding: chunked` framing
    Chunked,
    /// no payload bytes, encoded as `Content-Length: 0` on responses
    Empty,
}

impl PayloadSize {
    /// Fixed-length framing for `length` bytes, collapsing zero to [`PayloadSize::Empty`].
    #[inline]
    pub fn from_length(length: u64) -> Self {
        if length == 0 { PayloadSize::Empty } else { PayloadSize::Length(length) }
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// The number of payload bytes the framing promises, `None` for chunked.
    #[inline]
    pub fn declared_length(&self) -> Option<u64> {
        match self {
            PayloadSize::Length(length) => Some(*length),
            PayloadSize::Empty => Some(0),
            PayloadSize::Chunked => None,
        }
    }
}

impl<T, D: Buf> Message<T, D> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    pub fn into_payload_item(self) -> Option<PayloadItem<D>> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_collapses_to_empty() {
        assert_eq!(PayloadSize::from_length(0), PayloadSize::Empty);
        assert_eq!(PayloadSize::from_length(5), PayloadSize::Length(5));
        assert_eq!(PayloadSize::Empty.declared_length(), Some(0));
        assert_eq!(PayloadSize::Chunked.declared_length(), None);
    }
}
