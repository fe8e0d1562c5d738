//! Connection handling.
//!
//! [`HttpConnection`] drives one transport: it decodes requests, answers
//! `Expect: 100-continue`, reads bodies, runs the handler against a fresh
//! [`Response`](crate::response::Response), waits for suspended exchanges and keeps the
//! connection alive between requests when the client allows it.

mod http_connection;
mod message_writer;

pub use http_connection::HttpConnection;
pub use message_writer::MessageWriter;
