//! Protocol-level types shared by the codecs, the response lifecycle and the client.
//!
//! - [`Message`], [`PayloadItem`], [`PayloadSize`]: the units exchanged with the codecs
//! - [`RequestHeader`]: a decoded request head
//! - [`ResponseHead`]: a response status line plus headers
//! - [`HttpError`], [`ParseError`], [`SendError`], [`ResponseError`]: the error taxonomy

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;

mod response;
pub(crate) use response::build_response_head;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::ResponseError;
pub use error::SendError;
