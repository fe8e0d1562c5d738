//! Request handlers.
//!
//! A [`Handler`] receives the fully read request and the [`Response`] of the exchange. It
//! writes through the response instead of returning one, which is what lets the lifecycle
//! decide commit and framing while the handler is still running.

use std::error::Error;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::Request;

use crate::response::Response;

pub type BoxError = Box<dyn Error + Send + Sync>;

#[async_trait]
pub trait Handler: Send + Sync {
    /// Handles one exchange.
    ///
    /// An `Err` before commit turns the response into a `500`; after commit it aborts the
    /// exchange and the peer sees a truncated stream.
    async fn call(&self, request: Request<Bytes>, response: &mut Response) -> Result<(), BoxError>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(Request<Bytes>, &'a mut Response) -> BoxFuture<'a, Result<(), BoxError>> + Send + Sync,
{
    async fn call(&self, request: Request<Bytes>, response: &mut Response) -> Result<(), BoxError> {
        (self.f)(request, response).await
    }
}

/// Wraps a closure returning a boxed future, for instance
/// `make_handler(|_req, resp| Box::pin(async move { resp.write("hello").await?; Ok(()) }))`.
pub fn make_handler<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(Request<Bytes>, &'a mut Response) -> BoxFuture<'a, Result<(), BoxError>> + Send + Sync,
{
    HandlerFn { f }
}
