//! Head codecs.
//!
//! - [`HeaderDecoder`]: request heads, on the server side
//! - [`HeaderEncoder`]: response heads, with framing headers derived from the commit decision
//! - [`ResponseHeadDecoder`]: response heads, on the client side

mod header_decoder;
mod header_encoder;
mod response_head_decoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
pub use response_head_decoder::ResponseHeadDecoder;
