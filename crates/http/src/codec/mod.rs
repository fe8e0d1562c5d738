//! Streaming HTTP/1.1 codecs.
//!
//! The server reads requests with [`RequestDecoder`] and writes responses with
//! [`ResponseEncoder`]; the test client reads responses back with [`ResponseDecoder`].
//! All of them work on [`Message`](crate::protocol::Message) items: one head followed by
//! payload items ending in `Eof`.
//!
//! ```
//! use bytes::BytesMut;
//! use commitline_http::codec::RequestDecoder;
//! use tokio_util::codec::Decoder;
//!
//! let mut buf = BytesMut::from("GET /toss/ HTTP/1.1\r\nHost: localhost\r\n\r\n");
//! let message = RequestDecoder::new().decode(&mut buf).unwrap().unwrap();
//! assert!(message.is_header());
//! ```

mod body;
mod header;
mod request_decoder;
mod response_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use response_decoder::ResponseDecoder;
pub use response_encoder::ResponseEncoder;
