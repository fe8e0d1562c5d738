//! The handler-facing response.
//!
//! A [`Response`] is the write side of one exchange. Handlers set the head, write body
//! bytes and may signal an error status; the lifecycle rules (buffering, commit, framing,
//! error ownership, async suspension) live in [`ResponseCore`], this type adds the IO.
//!
//! # Locking
//!
//! The core sits behind a `std::sync::Mutex` that is never held across an `.await`. The
//! transport sits behind a `tokio::sync::Mutex` that every operation producing frames takes
//! *first*, so frames reach the wire in the order the core produced them even when an
//! async worker and the connection race.

mod aggregator;
mod async_context;
mod framing;
mod lifecycle;

pub use aggregator::{Aggregate, BufferAggregator};
pub use async_context::{AsyncContext, AsyncResponse};
pub use framing::{CommitTrigger, TransferEncodingSelector};
pub use lifecycle::{Frame, ResponseCore, ResponseState};

use std::fmt;
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use http::header::{AsHeaderName, IntoHeaderName};
use http::{HeaderMap, HeaderValue, StatusCode, header};
use mime::Mime;
use tokio::io::AsyncWrite;
use tracing::error;

use crate::config::HttpConfig;
use crate::connection::MessageWriter;
use crate::protocol::{PayloadSize, ResponseError};
use async_context::Suspension;

pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

type Transport = Arc<tokio::sync::Mutex<Option<MessageWriter<BoxWriter>>>>;

pub struct Response {
    core: Arc<Mutex<ResponseCore>>,
    transport: Transport,
    suspension: Option<Suspension>,
}

impl Response {
    /// A response writing to `writer`, mostly useful outside a connection (tests, benches).
    pub fn new<W>(writer: W, config: &HttpConfig) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: BoxWriter = Box::new(writer);
        Self::with_message_writer(MessageWriter::with_capacity(writer, config.output_buffer_size), config)
    }

    pub(crate) fn with_message_writer(writer: MessageWriter<BoxWriter>, config: &HttpConfig) -> Self {
        Self {
            core: Arc::new(Mutex::new(ResponseCore::new(config))),
            transport: Arc::new(tokio::sync::Mutex::new(Some(writer))),
            suspension: None,
        }
    }

    fn share(&self) -> Self {
        Self { core: Arc::clone(&self.core), transport: Arc::clone(&self.transport), suspension: None }
    }

    fn lock_core(&self) -> MutexGuard<'_, ResponseCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ResponseState {
        self.lock_core().state()
    }

    pub fn status(&self) -> StatusCode {
        self.lock_core().status()
    }

    pub fn is_committed(&self) -> bool {
        self.lock_core().is_committed()
    }

    pub fn buffered_len(&self) -> usize {
        self.lock_core().buffered_len()
    }

    /// The framing fixed at commit, `None` while uncommitted.
    pub fn payload_size(&self) -> Option<PayloadSize> {
        self.lock_core().payload_size()
    }

    pub fn headers(&self) -> HeaderMap {
        self.lock_core().headers().clone()
    }

    pub fn get_header<K: AsHeaderName>(&self, name: K) -> Option<HeaderValue> {
        self.lock_core().get_header(name).cloned()
    }

    /// Sets a header, replacing any previous value under the same name.
    ///
    /// Fails with [`ResponseError::AlreadyCommitted`] once committed; ignored while an
    /// error is pending.
    pub fn set_header<K, V>(&mut self, name: K, value: V) -> Result<(), ResponseError>
    where
        K: IntoHeaderName,
        V: TryInto<HeaderValue>,
        V::Error: Display,
    {
        let value = value.try_into().map_err(ResponseError::invalid_header)?;
        self.lock_core().set_header(name, value)
    }

    pub fn remove_header<K: AsHeaderName>(&mut self, name: K) -> Result<Option<HeaderValue>, ResponseError> {
        self.lock_core().remove_header(name)
    }

    pub fn set_status(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        self.lock_core().set_status(status)
    }

    pub fn set_content_type(&mut self, content_type: &Mime) -> Result<(), ResponseError> {
        self.set_header(header::CONTENT_TYPE, content_type.as_ref())
    }

    /// Declares the body length. The framing follows it; writing more or fewer bytes
    /// aborts the exchange.
    pub fn set_content_length(&mut self, length: u64) -> Result<(), ResponseError> {
        self.set_header(header::CONTENT_LENGTH, length)
    }

    /// See [`ResponseCore::signal_error`].
    pub fn signal_error(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        self.lock_core().signal_error(status)
    }

    pub fn reset(&mut self) -> Result<(), ResponseError> {
        self.lock_core().reset()
    }

    pub async fn write(&mut self, bytes: impl AsRef<[u8]>) -> Result<(), ResponseError> {
        let bytes = bytes.as_ref();
        self.apply(|core| core.write(bytes)).await
    }

    pub async fn flush(&mut self) -> Result<(), ResponseError> {
        self.apply(ResponseCore::flush).await
    }

    /// Commits whatever is buffered and terminates the body.
    pub async fn close(&mut self) -> Result<(), ResponseError> {
        self.apply(ResponseCore::close).await
    }

    /// Suspends the exchange. The connection keeps it open after the handler returns until
    /// the worker calls [`AsyncResponse::complete`] or the configured deadline passes.
    pub fn start_async(&mut self) -> Result<AsyncContext, ResponseError> {
        self.suspend(None)
    }

    pub fn start_async_with_timeout(&mut self, timeout: Duration) -> Result<AsyncContext, ResponseError> {
        self.suspend(Some(timeout))
    }

    fn suspend(&mut self, timeout: Option<Duration>) -> Result<AsyncContext, ResponseError> {
        let timeout = self.lock_core().start_async(timeout)?;
        let (suspension, context) = async_context::suspend(self.share(), timeout);
        self.suspension = Some(suspension);
        Ok(context)
    }

    pub fn pending_error(&self) -> Option<StatusCode> {
        self.lock_core().pending_error()
    }

    /// Hands the response to an error page handler, see [`ResponseCore::begin_error_dispatch`].
    pub fn begin_error_dispatch(&mut self) -> Option<StatusCode> {
        self.lock_core().begin_error_dispatch()
    }

    pub fn end_error_dispatch(&mut self) {
        self.lock_core().end_error_dispatch();
    }

    pub fn pass_through_error(&mut self) {
        self.lock_core().pass_through_error();
    }

    /// See [`ResponseCore::recover`].
    ///
    /// A suspension that was not released yet is cancelled: the worker's
    /// [`AsyncContext::resume`] fails with [`ResponseError::Closed`] and the failure is
    /// resolved like a synchronous one, error page included.
    pub fn recover(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        if let Some(suspension) = self.suspension.take() {
            drop(suspension);
            self.lock_core().cancel_async();
        }
        self.lock_core().recover(status)
    }

    pub(crate) fn set_close_connection(&mut self) {
        self.lock_core().set_close_connection();
    }

    pub(crate) fn take_suspension(&mut self) -> Option<Suspension> {
        self.suspension.take()
    }

    /// Ends the exchange and returns the transport to the connection.
    pub(crate) async fn finish(&mut self) -> Result<MessageWriter<BoxWriter>, ResponseError> {
        self.complete_with(ResponseCore::finish).await
    }

    /// Ends an exchange whose async deadline passed.
    pub(crate) async fn time_out(&mut self) -> Result<MessageWriter<BoxWriter>, ResponseError> {
        self.complete_with(ResponseCore::time_out).await
    }

    async fn complete_with<F>(&mut self, op: F) -> Result<MessageWriter<BoxWriter>, ResponseError>
    where
        F: FnOnce(&mut ResponseCore) -> Result<(), ResponseError>,
    {
        let mut transport = self.transport.lock().await;
        let frames = {
            let mut core = self.lock_core();
            match op(&mut *core) {
                Ok(()) => core.take_frames(),
                Err(e) => {
                    transport.take();
                    return Err(e);
                }
            }
        };

        self.send(&mut transport, frames).await?;
        transport.take().ok_or(ResponseError::Closed)
    }

    async fn apply<F>(&self, op: F) -> Result<(), ResponseError>
    where
        F: FnOnce(&mut ResponseCore) -> Result<(), ResponseError>,
    {
        let mut transport = self.transport.lock().await;
        let frames = {
            let mut core = self.lock_core();
            op(&mut *core)?;
            core.take_frames()
        };

        self.send(&mut transport, frames).await
    }

    async fn send(&self, transport: &mut Option<MessageWriter<BoxWriter>>, frames: Vec<Frame>) -> Result<(), ResponseError> {
        if frames.is_empty() {
            return Ok(());
        }
        let Some(writer) = transport.as_mut() else {
            return Err(ResponseError::Closed);
        };

        if let Err(e) = writer.send_all(frames).await {
            error!(cause = %e, "failed to send response frames");
            self.lock_core().abort();
            return Err(e.into());
        }
        Ok(())
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.lock_core();
        f.debug_struct("Response")
            .field("state", &core.state())
            .field("status", &core.status())
            .field("suspended", &self.suspension.is_some())
            .finish_non_exhaustive()
    }
}
