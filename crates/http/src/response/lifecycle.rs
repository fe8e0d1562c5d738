//! The response state machine.
//!
//! [`ResponseCore`] owns everything that decides what reaches the wire: status, headers,
//! the output buffer, the framing decision and the error/async bookkeeping. It performs no
//! IO; every operation that commits or releases bytes queues [`Frame`]s which the owning
//! [`Response`](super::Response) hands to the transport in order.
//!
//! ```text
//! Open --signal_error--> ErrorPending --begin dispatch--> ErrorDispatch --end dispatch--> Open
//! Open/ErrorDispatch --overflow/flush/close--> Committed --close--> Closed
//! any uncommitted state --failure--> Open (500), committed --failure--> Aborted
//! ```

use std::time::Duration;

use bytes::Bytes;
use http::header::{AsHeaderName, IntoHeaderName};
use http::{HeaderMap, HeaderValue, StatusCode, header};
use tracing::{debug, trace, warn};

use super::aggregator::{Aggregate, BufferAggregator};
use super::framing::{CommitTrigger, TransferEncodingSelector, content_length};
use crate::config::HttpConfig;
use crate::protocol::{Message, PayloadItem, PayloadSize, ResponseError, ResponseHead, build_response_head};

/// One unit queued for the transport.
pub type Frame = Message<(ResponseHead, PayloadSize)>;

const CLOSE_VALUE: HeaderValue = HeaderValue::from_static("close");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    /// uncommitted, the current handler owns the body
    Open,
    /// an error was signalled before commit, waiting for the dispatcher
    ErrorPending,
    /// the error page handler owns the body
    ErrorDispatch,
    /// the head is on its way to the wire, framing is fixed
    Committed,
    /// the payload terminator was queued
    Closed,
    /// the exchange failed after commit and will be cut off
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AsyncMode {
    Sync,
    Started,
    TimedOut,
    Completed,
}

#[derive(Debug)]
pub struct ResponseCore {
    state: ResponseState,
    status: StatusCode,
    headers: HeaderMap,
    aggregator: BufferAggregator,
    selector: TransferEncodingSelector,
    pending_error: Option<StatusCode>,
    dispatched: bool,
    async_mode: AsyncMode,
    async_timeout: Duration,
    close_connection: bool,
    frames: Vec<Frame>,
}

impl ResponseCore {
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            state: ResponseState::Open,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            aggregator: BufferAggregator::new(config.output_buffer_size, config.output_aggregation_size),
            selector: TransferEncodingSelector::new(),
            pending_error: None,
            dispatched: false,
            async_mode: AsyncMode::Sync,
            async_timeout: config.async_timeout_duration(),
            close_connection: false,
            frames: Vec::new(),
        }
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn get_header<K: AsHeaderName>(&self, name: K) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.state, ResponseState::Committed | ResponseState::Closed | ResponseState::Aborted)
    }

    pub fn is_aborted(&self) -> bool {
        self.state == ResponseState::Aborted
    }

    pub fn pending_error(&self) -> Option<StatusCode> {
        self.pending_error
    }

    pub fn buffered_len(&self) -> usize {
        self.aggregator.len()
    }

    /// The framing fixed at commit, `None` before.
    pub fn payload_size(&self) -> Option<PayloadSize> {
        self.selector.decision()
    }

    /// Adds `Connection: close` to the head when it is committed.
    pub fn set_close_connection(&mut self) {
        self.close_connection = true;
    }

    pub fn take_frames(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }

    pub fn set_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) -> Result<(), ResponseError> {
        if !self.mutable_head()? {
            return Ok(());
        }

        let previous = self.headers.insert(name, value);
        // an invalid length must never reach the commit
        if let Some(length) = self.headers.get(header::CONTENT_LENGTH)
            && let Err(e) = content_length(length)
        {
            match previous {
                Some(previous) => self.headers.insert(header::CONTENT_LENGTH, previous),
                None => self.headers.remove(header::CONTENT_LENGTH),
            };
            return Err(e);
        }
        Ok(())
    }

    pub fn remove_header<K: AsHeaderName>(&mut self, name: K) -> Result<Option<HeaderValue>, ResponseError> {
        if self.mutable_head()? {
            return Ok(self.headers.remove(name));
        }
        Ok(None)
    }

    pub fn set_status(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        if self.mutable_head()? {
            self.status = status;
        }
        Ok(())
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), ResponseError> {
        self.check_async()?;

        match self.state {
            ResponseState::Open | ResponseState::ErrorDispatch => {
                if let Aggregate::Flush(bytes) = self.aggregator.append(bytes) {
                    self.commit(CommitTrigger::Overflow)?;
                    self.queue_chunk(bytes);
                }
                Ok(())
            }
            ResponseState::Committed => {
                if let Aggregate::Flush(bytes) = self.aggregator.append_committed(bytes) {
                    self.queue_chunk(bytes);
                }
                Ok(())
            }
            ResponseState::ErrorPending => {
                trace!(len = bytes.len(), "discarding write, an error page owns the body");
                Ok(())
            }
            ResponseState::Closed | ResponseState::Aborted => Err(ResponseError::Closed),
        }
    }

    pub fn flush(&mut self) -> Result<(), ResponseError> {
        self.check_async()?;

        match self.state {
            ResponseState::Open | ResponseState::ErrorDispatch => {
                self.commit(CommitTrigger::Flush)?;
                let bytes = self.aggregator.take();
                self.queue_chunk(bytes);
                Ok(())
            }
            ResponseState::Committed => {
                let bytes = self.aggregator.take();
                self.queue_chunk(bytes);
                Ok(())
            }
            ResponseState::ErrorPending => Ok(()),
            ResponseState::Closed | ResponseState::Aborted => Err(ResponseError::Closed),
        }
    }

    pub fn close(&mut self) -> Result<(), ResponseError> {
        self.check_async()?;

        match self.state {
            ResponseState::ErrorPending => {
                debug!("ignoring close, an error page owns the body");
                Ok(())
            }
            ResponseState::Aborted => Err(ResponseError::Closed),
            _ => self.complete_body(),
        }
    }

    /// Signals an error status, the `sendError` of the lifecycle.
    ///
    /// Before commit the buffered body is discarded and the error waits for the dispatcher.
    /// Once committed the signal is dropped and the response left as it is; the caller
    /// gets [`ResponseError::AlreadyCommitted`] and decides whether that is fatal.
    pub fn signal_error(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        self.check_async()?;

        match self.state {
            ResponseState::Committed | ResponseState::Closed | ResponseState::Aborted => {
                warn!(status = status.as_u16(), current = self.status.as_u16(), "error signalled after commit, dropped");
                Err(ResponseError::AlreadyCommitted)
            }
            ResponseState::ErrorPending => {
                let pending = self.pending_error.unwrap_or(self.status);
                warn!(status = status.as_u16(), pending = pending.as_u16(), "error already pending, dropped");
                Err(ResponseError::ErrorPending { pending })
            }
            ResponseState::ErrorDispatch => Err(ResponseError::NestedDispatch { status }),
            ResponseState::Open if self.dispatched => Err(ResponseError::NestedDispatch { status }),
            ResponseState::Open => {
                self.aggregator.clear();
                self.status = status;

                if self.async_mode == AsyncMode::Started {
                    // the resumed worker writes the replacement body
                    retain_location(&mut self.headers);
                    self.dispatched = true;
                    debug!(status = status.as_u16(), "error signalled on async exchange, head rewritten");
                } else {
                    self.pending_error = Some(status);
                    self.state = ResponseState::ErrorPending;
                    debug!(status = status.as_u16(), "error signalled, waiting for dispatch");
                }
                Ok(())
            }
        }
    }

    /// Clears status, headers and body. Only possible before commit and without a pending error.
    pub fn reset(&mut self) -> Result<(), ResponseError> {
        self.check_async()?;

        match self.state {
            ResponseState::Open | ResponseState::ErrorDispatch => {
                self.status = StatusCode::OK;
                self.headers.clear();
                self.aggregator.clear();
                trace!("response reset");
                Ok(())
            }
            ResponseState::ErrorPending => Err(ResponseError::ErrorPending { pending: self.pending_error.unwrap_or(self.status) }),
            ResponseState::Committed | ResponseState::Closed | ResponseState::Aborted => Err(ResponseError::AlreadyCommitted),
        }
    }

    /// Hands the body to the error page handler. Returns the pending status, if any.
    pub fn begin_error_dispatch(&mut self) -> Option<StatusCode> {
        if self.state != ResponseState::ErrorPending {
            return None;
        }

        let status = self.pending_error.take()?;
        self.status = status;
        retain_location(&mut self.headers);
        self.aggregator.clear();
        self.dispatched = true;
        self.state = ResponseState::ErrorDispatch;
        debug!(status = status.as_u16(), "error dispatch started");
        Some(status)
    }

    pub fn end_error_dispatch(&mut self) {
        if self.state == ResponseState::ErrorDispatch {
            self.state = ResponseState::Open;
            debug!(status = self.status.as_u16(), "error dispatch finished");
        }
    }

    /// Resolves a pending error without an error page: the status stands, the body is empty.
    pub fn pass_through_error(&mut self) {
        if self.state != ResponseState::ErrorPending {
            return;
        }

        if let Some(status) = self.pending_error.take() {
            self.status = status;
        }
        retain_location(&mut self.headers);
        self.aggregator.clear();
        self.dispatched = true;
        self.state = ResponseState::Open;
        debug!(status = self.status.as_u16(), "no error page, passing error status through");
    }

    /// Replaces the response after a handler failure.
    ///
    /// Uncommitted, everything written so far is dropped and `status` becomes a pending
    /// error (or a plain status when an error page already ran). Committed, the exchange is
    /// aborted and [`ResponseError::Aborted`] returned.
    pub fn recover(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        match self.state {
            ResponseState::Open | ResponseState::ErrorPending | ResponseState::ErrorDispatch => {
                self.headers.clear();
                self.aggregator.clear();
                self.status = status;
                if self.dispatched || self.async_mode != AsyncMode::Sync {
                    self.pending_error = None;
                    self.state = ResponseState::Open;
                } else {
                    self.pending_error = Some(status);
                    self.state = ResponseState::ErrorPending;
                }
                self.dispatched = true;
                debug!(status = status.as_u16(), "uncommitted response replaced after failure");
                Ok(())
            }
            ResponseState::Committed => {
                self.abort();
                Err(ResponseError::Aborted)
            }
            ResponseState::Closed => Ok(()),
            ResponseState::Aborted => Err(ResponseError::Aborted),
        }
    }

    /// Cuts the exchange off: nothing more is queued and the connection will be closed.
    pub fn abort(&mut self) {
        if self.state != ResponseState::Aborted {
            warn!(state = ?self.state, "exchange aborted");
        }
        self.state = ResponseState::Aborted;
        self.aggregator.clear();
        self.frames.clear();
        self.close_connection = true;
    }

    /// Ends the exchange from the connection side.
    pub fn finish(&mut self) -> Result<(), ResponseError> {
        match self.state {
            ResponseState::Aborted => Err(ResponseError::Aborted),
            ResponseState::Closed => Ok(()),
            ResponseState::ErrorPending => {
                self.pass_through_error();
                self.complete_body()
            }
            _ => self.complete_body(),
        }
    }

    pub fn start_async(&mut self, timeout: Option<Duration>) -> Result<Duration, ResponseError> {
        if self.async_mode != AsyncMode::Sync {
            return Err(ResponseError::AsyncAlreadyStarted);
        }
        if matches!(self.state, ResponseState::Closed | ResponseState::Aborted) {
            return Err(ResponseError::Closed);
        }

        if let Some(timeout) = timeout {
            self.async_timeout = timeout;
        }
        self.async_mode = AsyncMode::Started;
        debug!(timeout = ?self.async_timeout, "exchange suspended");
        Ok(self.async_timeout)
    }

    /// Takes back a suspension that was never released; the exchange ends like a synchronous one.
    pub fn cancel_async(&mut self) {
        if self.async_mode == AsyncMode::Started {
            self.async_mode = AsyncMode::Sync;
            debug!("async exchange cancelled before release");
        }
    }

    pub fn is_async_started(&self) -> bool {
        self.async_mode == AsyncMode::Started
    }

    pub fn complete_async(&mut self) -> Result<(), ResponseError> {
        self.check_async()?;
        self.async_mode = AsyncMode::Completed;
        Ok(())
    }

    /// The async deadline passed. Later worker calls fail; whatever is buffered is committed.
    pub fn time_out(&mut self) -> Result<(), ResponseError> {
        self.async_mode = AsyncMode::TimedOut;
        self.close_connection = true;
        self.finish()
    }

    fn check_async(&self) -> Result<(), ResponseError> {
        if self.async_mode == AsyncMode::TimedOut {
            return Err(ResponseError::AsyncTimeout { timeout: self.async_timeout });
        }
        Ok(())
    }

    /// `Ok(true)` when the head may change, `Ok(false)` when the change is silently ignored.
    fn mutable_head(&self) -> Result<bool, ResponseError> {
        self.check_async()?;

        match self.state {
            ResponseState::Open | ResponseState::ErrorDispatch => Ok(true),
            ResponseState::ErrorPending => {
                trace!("ignoring head change, an error page owns the response");
                Ok(false)
            }
            ResponseState::Committed | ResponseState::Closed | ResponseState::Aborted => Err(ResponseError::AlreadyCommitted),
        }
    }

    fn complete_body(&mut self) -> Result<(), ResponseError> {
        match self.state {
            ResponseState::Open | ResponseState::ErrorDispatch => {
                let total = self.aggregator.len() as u64;
                self.commit(CommitTrigger::Close { total })?;
            }
            ResponseState::Committed => {}
            ResponseState::Closed => return Ok(()),
            ResponseState::ErrorPending | ResponseState::Aborted => return Err(ResponseError::Closed),
        }

        let bytes = self.aggregator.take();
        self.queue_chunk(bytes);
        self.frames.push(Message::Payload(PayloadItem::Eof));
        self.state = ResponseState::Closed;
        trace!(status = self.status.as_u16(), "response closed");
        Ok(())
    }

    fn commit(&mut self, trigger: CommitTrigger) -> Result<(), ResponseError> {
        let payload_size = self.selector.select(&self.headers, trigger)?;

        let mut headers = self.headers.clone();
        if self.close_connection {
            headers.insert(header::CONNECTION, CLOSE_VALUE);
        }
        let head = build_response_head(self.status, headers);

        self.frames.push(Message::Header((head, payload_size)));
        self.state = ResponseState::Committed;
        debug!(status = self.status.as_u16(), ?payload_size, "response committed");
        Ok(())
    }

    fn queue_chunk(&mut self, bytes: Bytes) {
        if !bytes.is_empty() {
            self.frames.push(Message::Payload(PayloadItem::Chunk(bytes)));
        }
    }
}

fn retain_location(headers: &mut HeaderMap) {
    let location = headers.remove(header::LOCATION);
    headers.clear();
    if let Some(location) = location {
        headers.insert(header::LOCATION, location);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ResponseEncoder;
    use bytes::BytesMut;
    use tokio_util::codec::Encoder;

    fn core() -> ResponseCore {
        ResponseCore::new(&HttpConfig::with_buffer_sizes(16, 4))
    }

    fn wire(core: &mut ResponseCore) -> String {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        for frame in core.take_frames() {
            encoder.encode(frame, &mut dst).unwrap();
        }
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn small_body_gets_content_length() {
        let mut core = core();
        core.write(b"hello").unwrap();
        assert!(core.take_frames().is_empty());

        core.close().unwrap();
        assert_eq!(core.state(), ResponseState::Closed);
        assert_eq!(core.payload_size(), Some(PayloadSize::Length(5)));
        assert_eq!(wire(&mut core), "HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello");
    }

    #[test]
    fn overflow_commits_chunked() {
        let mut core = core();
        core.write(b"0123456789").unwrap();
        core.write(b"abcdefghij").unwrap();

        assert!(core.is_committed());
        assert_eq!(core.payload_size(), Some(PayloadSize::Chunked));

        core.close().unwrap();
        assert_eq!(wire(&mut core), "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n14\r\n0123456789abcdefghij\r\n0\r\n\r\n");
    }

    #[test]
    fn error_before_commit_discards_body_once() {
        let mut core = core();
        core.set_header(header::LOCATION, HeaderValue::from_static("https://example.com/")).unwrap();
        core.set_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain")).unwrap();
        core.write(b"hello").unwrap();

        core.signal_error(StatusCode::MOVED_PERMANENTLY).unwrap();
        assert_eq!(core.state(), ResponseState::ErrorPending);
        assert_eq!(core.buffered_len(), 0);
        assert!(!core.is_committed());

        // the original handler no longer owns the response
        core.write(b"late").unwrap();
        core.set_status(StatusCode::OK).unwrap();
        assert_eq!(core.buffered_len(), 0);
        assert!(matches!(
            core.signal_error(StatusCode::NOT_FOUND),
            Err(ResponseError::ErrorPending { pending: StatusCode::MOVED_PERMANENTLY })
        ));
        assert!(matches!(core.reset(), Err(ResponseError::ErrorPending { .. })));

        assert_eq!(core.begin_error_dispatch(), Some(StatusCode::MOVED_PERMANENTLY));
        assert_eq!(core.get_header(header::LOCATION).unwrap(), "https://example.com/");
        assert!(core.get_header(header::CONTENT_TYPE).is_none());

        core.write(b"moved").unwrap();
        assert!(matches!(core.signal_error(StatusCode::NOT_FOUND), Err(ResponseError::NestedDispatch { .. })));
        core.end_error_dispatch();
        assert!(matches!(core.signal_error(StatusCode::NOT_FOUND), Err(ResponseError::NestedDispatch { .. })));

        core.finish().unwrap();
        assert_eq!(
            wire(&mut core),
            "HTTP/1.1 301 Moved Permanently\r\nlocation: https://example.com/\r\ncontent-length: 5\r\n\r\nmoved"
        );
    }

    #[test]
    fn error_after_commit_is_dropped() {
        let mut core = core();
        core.write(b"aaaaaaaaaaaaaaaaaaaa").unwrap();
        assert!(core.is_committed());

        assert!(matches!(core.signal_error(StatusCode::MOVED_PERMANENTLY), Err(ResponseError::AlreadyCommitted)));
        assert_eq!(core.status(), StatusCode::OK);
        assert!(matches!(core.set_status(StatusCode::NOT_FOUND), Err(ResponseError::AlreadyCommitted)));
        assert!(matches!(
            core.set_header(header::LOCATION, HeaderValue::from_static("/")),
            Err(ResponseError::AlreadyCommitted)
        ));
        assert!(matches!(core.reset(), Err(ResponseError::AlreadyCommitted)));

        core.close().unwrap();
        let wire = wire(&mut core);
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n"));
        assert!(wire.contains("aaaaaaaaaaaaaaaaaaaa"));
    }

    #[test]
    fn pass_through_keeps_status_with_empty_body() {
        let mut core = core();
        core.write(b"hello").unwrap();
        core.signal_error(StatusCode::NOT_FOUND).unwrap();

        core.finish().unwrap();
        assert_eq!(wire(&mut core), "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn reset_replays_identically() {
        let writes: [&[u8]; 3] = [b"one ", b"two ", b"three"];

        let mut original = core();
        original.set_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain")).unwrap();
        for bytes in writes {
            original.write(bytes).unwrap();
        }
        original.close().unwrap();

        let mut replayed = core();
        replayed.set_status(StatusCode::NOT_FOUND).unwrap();
        replayed.set_header(header::LOCATION, HeaderValue::from_static("/elsewhere")).unwrap();
        replayed.write(b"discarded").unwrap();
        replayed.reset().unwrap();
        replayed.set_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain")).unwrap();
        for bytes in writes {
            replayed.write(bytes).unwrap();
        }
        replayed.close().unwrap();

        assert_eq!(wire(&mut original), wire(&mut replayed));
    }

    #[test]
    fn malformed_content_length_is_refused_up_front() {
        let mut fresh = core();
        assert!(fresh.set_header(header::CONTENT_LENGTH, HeaderValue::from_static("-1")).is_err());
        assert!(fresh.get_header(header::CONTENT_LENGTH).is_none());

        let mut core = core();
        core.set_header(header::CONTENT_LENGTH, HeaderValue::from_static("5")).unwrap();
        core.write(b"hel").unwrap();

        let result = core.set_header(header::CONTENT_LENGTH, HeaderValue::from_static("five"));
        assert!(matches!(result, Err(ResponseError::InvalidHeader { .. })));
        assert_eq!(core.get_header(header::CONTENT_LENGTH).unwrap(), "5");
        assert_eq!(core.buffered_len(), 3);

        core.write(b"lo").unwrap();
        core.close().unwrap();
        assert_eq!(wire(&mut core), "HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello");
    }

    #[test]
    fn flush_commits_chunked() {
        let mut core = core();
        core.write(b"abc").unwrap();
        core.flush().unwrap();
        assert_eq!(core.payload_size(), Some(PayloadSize::Chunked));
        assert_eq!(core.take_frames().len(), 2);
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let mut core = core();
        core.close().unwrap();
        core.close().unwrap();
        assert_eq!(wire(&mut core), "HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n");
        assert!(matches!(core.write(b"x"), Err(ResponseError::Closed)));
        assert!(matches!(core.flush(), Err(ResponseError::Closed)));
    }

    #[test]
    fn failure_before_commit_becomes_500() {
        let mut core = core();
        core.set_header(header::LOCATION, HeaderValue::from_static("/")).unwrap();
        core.write(b"partial").unwrap();

        core.recover(StatusCode::INTERNAL_SERVER_ERROR).unwrap();
        assert_eq!(core.pending_error(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        core.finish().unwrap();
        assert_eq!(wire(&mut core), "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn failure_after_commit_aborts() {
        let mut core = core();
        core.write(b"0123456789abcdefghij").unwrap();
        assert!(matches!(core.recover(StatusCode::INTERNAL_SERVER_ERROR), Err(ResponseError::Aborted)));
        assert!(core.is_aborted());
        assert!(core.take_frames().is_empty());
        assert!(matches!(core.finish(), Err(ResponseError::Aborted)));
    }

    #[test]
    fn async_error_rewrites_head_immediately() {
        let mut core = core();
        core.write(b"before").unwrap();
        core.start_async(None).unwrap();
        assert!(matches!(core.start_async(None), Err(ResponseError::AsyncAlreadyStarted)));

        core.set_header(header::LOCATION, HeaderValue::from_static("https://example.com/")).unwrap();
        core.set_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain")).unwrap();
        core.signal_error(StatusCode::MOVED_PERMANENTLY).unwrap();
        assert_eq!(core.state(), ResponseState::Open);
        assert_eq!(core.buffered_len(), 0);
        assert!(core.get_header(header::CONTENT_TYPE).is_none());

        core.write(b"after").unwrap();
        core.complete_async().unwrap();
        core.finish().unwrap();
        assert_eq!(
            wire(&mut core),
            "HTTP/1.1 301 Moved Permanently\r\nlocation: https://example.com/\r\ncontent-length: 5\r\n\r\nafter"
        );
    }

    #[test]
    fn cancelled_async_failure_waits_for_error_page() {
        let mut core = core();
        core.start_async(None).unwrap();
        core.cancel_async();
        assert!(!core.is_async_started());

        core.recover(StatusCode::INTERNAL_SERVER_ERROR).unwrap();
        assert_eq!(core.state(), ResponseState::ErrorPending);
        assert_eq!(core.pending_error(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn timed_out_exchange_commits_buffer_and_rejects_worker() {
        let mut core = core();
        core.start_async(Some(Duration::from_millis(10))).unwrap();
        core.write(b"partial").unwrap();

        core.time_out().unwrap();
        assert!(matches!(core.write(b"more"), Err(ResponseError::AsyncTimeout { .. })));
        assert_eq!(wire(&mut core), "HTTP/1.1 200 OK\r\nconnection: close\r\ncontent-length: 7\r\n\r\npartial");
    }
}
