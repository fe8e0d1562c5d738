//! Payload codecs.
//!
//! Decoders read request bodies on the server and response bodies in the client:
//! [`PayloadDecoder`] selects between Content-Length, chunked, empty and close-delimited
//! framing. Encoders write response bodies: [`PayloadEncoder`] applies the framing fixed
//! at commit time and rejects bytes that would break it.

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
