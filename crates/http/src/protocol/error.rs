use std::io;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("exchange error: {source}")]
    ExchangeError {
        #[from]
        source: ResponseError,
    },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid http status: {0:?}")]
    InvalidStatus(Option<u16>),

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("body size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeBody { current_size: usize, max_size: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn too_large_body(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeBody { current_size, max_size }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("body exceeds declared content-length {declared}, attempted to send {attempted} bytes")]
    ContentLengthExceeded { declared: u64, attempted: u64 },

    #[error("body shorter than declared content-length {declared}, only {written} bytes written")]
    ContentLengthShort { declared: u64, written: u64 },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Failures of the response lifecycle, reported to handler code.
///
/// All of them are local to one exchange.
#[derive(Error, Debug)]
pub enum ResponseError {
    /// The response is committed; the operation was dropped.
    #[error("response already committed")]
    AlreadyCommitted,

    /// An error signalled earlier owns the response until it is dispatched.
    #[error("error {pending} already pending")]
    ErrorPending { pending: StatusCode },

    #[error("response already closed")]
    Closed,

    /// The exchange was aborted after commit; the peer sees a truncated stream.
    #[error("exchange aborted")]
    Aborted,

    #[error("error {status} signalled while an error page is being dispatched")]
    NestedDispatch { status: StatusCode },

    #[error("async exchange not completed within {timeout:?}")]
    AsyncTimeout { timeout: Duration },

    #[error("async exchange abandoned without complete")]
    AsyncAbandoned,

    #[error("async already started for this exchange")]
    AsyncAlreadyStarted,

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    /// Downstream failure, the exchange has been aborted.
    #[error("stream aborted: {source}")]
    Send {
        #[from]
        source: SendError,
    },
}

impl ResponseError {
    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    /// Whether the exchange can no longer produce a well-formed response.
    pub fn is_stream_abort(&self) -> bool {
        matches!(self, ResponseError::Send { .. } | ResponseError::Aborted)
    }
}
