use async_trait::async_trait;
use bytes::Bytes;
use commitline_http::handler::BoxError;
use commitline_http::response::Response;
use futures::future::BoxFuture;
use http::Request;

/// A routed request handler.
///
/// The same servlet type serves original requests and error page dispatches; the latter
/// carry [`ErrorAttributes`](crate::ErrorAttributes) in their extensions.
#[async_trait]
pub trait Servlet: Send + Sync {
    async fn service(&self, request: &Request<Bytes>, response: &mut Response) -> Result<(), BoxError>;
}

/// a closure holder, see [`servlet_fn`]
#[derive(Debug)]
pub struct ServletFn<F> {
    f: F,
}

#[async_trait]
impl<F> Servlet for ServletFn<F>
where
    F: for<'a> Fn(&'a Request<Bytes>, &'a mut Response) -> BoxFuture<'a, Result<(), BoxError>> + Send + Sync,
{
    async fn service(&self, request: &Request<Bytes>, response: &mut Response) -> Result<(), BoxError> {
        (self.f)(request, response).await
    }
}

/// Wraps a closure returning a boxed future:
///
/// ```
/// use commitline_http::handler::BoxError;
/// use commitline_web::servlet_fn;
///
/// let hello = servlet_fn(|_request, response| {
///     Box::pin(async move {
///         response.write("hello").await?;
///         Ok::<_, BoxError>(())
///     })
/// });
/// ```
pub fn servlet_fn<F>(f: F) -> ServletFn<F>
where
    F: for<'a> Fn(&'a Request<Bytes>, &'a mut Response) -> BoxFuture<'a, Result<(), BoxError>> + Send + Sync,
{
    ServletFn { f }
}
