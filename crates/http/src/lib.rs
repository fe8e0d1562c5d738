//! Response lifecycle engine for HTTP/1.1 servers.
//!
//! Handlers write into a [`response::Response`] instead of returning a finished
//! response. The response buffers output, decides when the head is committed and how the
//! body is framed, and tracks who owns the body when an error status is signalled:
//!
//! - output up to the buffer size is held, so a response that fits is sent with
//!   `Content-Length`; one that overflows is committed with `Transfer-Encoding: chunked`,
//! - an error signalled before commit discards the held output and waits for an error
//!   page, after commit the signal is dropped and reported as
//!   [`protocol::ResponseError::AlreadyCommitted`],
//! - an exchange can be suspended with [`response::Response::start_async`] and finished
//!   by a worker task, under a deadline,
//! - a failure after commit aborts the exchange; the peer sees a truncated stream, never a
//!   short response passed off as complete.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use commitline_http::connection::HttpConnection;
//! use commitline_http::handler::{BoxError, make_handler};
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let tcp_listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let handler = Arc::new(make_handler(|_request, response| {
//!         Box::pin(async move {
//!             response.write("Hello World!\r\n").await?;
//!             Ok::<_, BoxError>(())
//!         })
//!     }));
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = Arc::clone(&handler);
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             match HttpConnection::new(reader, writer).process(handler).await {
//!                 Ok(()) => info!("finished process, connection shutdown"),
//!                 Err(e) => error!("service has error, cause {}, connection shutdown", e),
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! - [`response`]: the lifecycle: aggregation, framing selection, state machine, async
//! - [`connection`]: request loop over a transport
//! - [`codec`]: request/response encoding and decoding
//! - [`handler`]: the handler trait
//! - [`client`]: a wire-level client for tests and tools
//! - [`config`]: buffer sizes and deadlines

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod response;

mod utils;
pub(crate) use utils::ensure;
