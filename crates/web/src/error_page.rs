//! Error pages: replacement bodies for error statuses signalled by servlets.
//!
//! [`ErrorPages`] maps a status to the path of a servlet, plus an optional fallback path for
//! unmapped statuses. It is built once and never changes while the server runs.
//!
//! After the original servlet returned, [`ErrorPageDispatcher::dispatch`] looks at the
//! response. An error signalled before commit is pending there; the dispatcher routes a
//! synthetic `GET` for the mapped path and runs that servlet on the *same* response, with
//! the status already set and only `Location` kept from the original headers. Without a
//! mapping (or a route for it) the error status is sent with an empty body.

use std::collections::HashMap;

use bytes::Bytes;
use commitline_http::handler::BoxError;
use commitline_http::protocol::ResponseError;
use commitline_http::response::Response;
use http::{Method, Request, StatusCode, Uri};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::request::{ErrorAttributes, RequestExt};
use crate::router::Router;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ErrorPageError {
    #[error("invalid status code {code}")]
    InvalidStatus { code: u16 },

    #[error("error page path `{path}` must be an absolute path")]
    InvalidPath { path: String },
}

#[derive(Debug, Clone, Default)]
pub struct ErrorPages {
    pages: HashMap<StatusCode, Uri>,
    fallback: Option<Uri>,
}

impl ErrorPages {
    pub fn builder() -> ErrorPagesBuilder {
        ErrorPagesBuilder::default()
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// The page for `status`, or the fallback.
    pub fn lookup(&self, status: StatusCode) -> Option<&Uri> {
        self.pages.get(&status).or(self.fallback.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.fallback.is_none()
    }
}

#[derive(Debug, Default)]
pub struct ErrorPagesBuilder {
    pages: Vec<(u16, String)>,
    fallback: Option<String>,
}

impl ErrorPagesBuilder {
    pub fn page(mut self, status: impl Into<u16>, path: impl Into<String>) -> Self {
        self.pages.push((status.into(), path.into()));
        self
    }

    pub fn fallback(mut self, path: impl Into<String>) -> Self {
        self.fallback = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ErrorPages, ErrorPageError> {
        let mut pages = HashMap::with_capacity(self.pages.len());
        for (code, path) in self.pages {
            let status = StatusCode::from_u16(code).map_err(|_invalid| ErrorPageError::InvalidStatus { code })?;
            pages.insert(status, parse_path(path)?);
        }
        let fallback = self.fallback.map(parse_path).transpose()?;

        Ok(ErrorPages { pages, fallback })
    }
}

fn parse_path(path: String) -> Result<Uri, ErrorPageError> {
    if !path.starts_with('/') {
        return Err(ErrorPageError::InvalidPath { path });
    }
    Uri::try_from(path.as_str()).map_err(|_invalid| ErrorPageError::InvalidPath { path })
}

#[derive(Debug, Clone, Default)]
pub struct ErrorPageDispatcher {
    pages: ErrorPages,
}

impl ErrorPageDispatcher {
    pub fn new(pages: ErrorPages) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> &ErrorPages {
        &self.pages
    }

    /// Resolves a pending error on `response`, if there is one.
    ///
    /// Fails only when the error page servlet failed after committing the response, in
    /// which case the exchange has been aborted.
    pub async fn dispatch(&self, router: &Router, request: &Request<Bytes>, response: &mut Response) -> Result<(), BoxError> {
        let Some(status) = response.pending_error() else {
            return Ok(());
        };

        let Some(path) = self.pages.lookup(status) else {
            debug!(status = status.as_u16(), "no error page mapped");
            response.pass_through_error();
            return Ok(());
        };

        let mut error_request = error_request(path, status, request);
        let Some((servlet, params)) = router.find(&error_request) else {
            warn!(status = status.as_u16(), path = %path, "error page has no route, sending status only");
            response.pass_through_error();
            return Ok(());
        };
        error_request.extensions_mut().insert(params);

        if response.begin_error_dispatch().is_none() {
            return Ok(());
        }
        info!(status = status.as_u16(), path = %path, uri = %request.uri(), "dispatching error page");
        let result = servlet.service(&error_request, response).await;
        response.end_error_dispatch();

        match result {
            Ok(()) => {}
            // the page's output so far stands under the original status
            Err(e) if matches!(e.downcast_ref::<ResponseError>(), Some(ResponseError::NestedDispatch { .. })) => {
                warn!(status = status.as_u16(), path = %path, cause = %e, "error page signalled another error, ignored");
            }
            Err(e) => {
                error!(status = status.as_u16(), path = %path, cause = %e, "error page failed");
                response.recover(StatusCode::INTERNAL_SERVER_ERROR)?;
            }
        }
        Ok(())
    }
}

/// The request an error page servlet sees: a `GET` of the page path with the original
/// headers and the error attributes.
fn error_request(path: &Uri, status: StatusCode, original: &Request<Bytes>) -> Request<Bytes> {
    let mut error_request = Request::new(Bytes::new());
    *error_request.method_mut() = Method::GET;
    *error_request.uri_mut() = path.clone();
    *error_request.headers_mut() = original.headers().clone();

    let request_uri = original.error_attributes().map_or_else(|| original.uri().clone(), |attributes| attributes.request_uri.clone());
    error_request.extensions_mut().insert(ErrorAttributes { status, request_uri });
    error_request
}
