//! Request head handling.
//!
//! The connection hands every handler a fully read `Request<Bytes>`; the decoder produces
//! the head first as a [`RequestHeader`], which carries the few protocol questions the
//! connection has to answer before dispatching (keep-alive, expect-continue, body presence).

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version, header};

/// The head of a decoded request, before its body is attached.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches the request body, producing the value handed to handlers.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|()| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Methods that carry no request payload are never given a payload decoder.
    pub fn need_body(&self) -> bool {
        !matches!(self.method(), &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT)
    }

    /// `Expect: 100-continue` was sent.
    pub fn expects_continue(&self) -> bool {
        self.headers()
            .get(header::EXPECT)
            .is_some_and(|value| value.as_bytes().len() >= 4 && value.as_bytes()[..4].eq_ignore_ascii_case(b"100-"))
    }

    /// Whether the connection may serve another request after this one.
    ///
    /// HTTP/1.1 is persistent unless `Connection: close`; HTTP/1.0 only with `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        let connection = self.headers().get(header::CONNECTION).map(|value| value.as_bytes());
        match self.version() {
            Version::HTTP_10 => connection.is_some_and(|value| value.eq_ignore_ascii_case(b"keep-alive")),
            _ => !connection.is_some_and(|value| value.eq_ignore_ascii_case(b"close")),
        }
    }
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}
