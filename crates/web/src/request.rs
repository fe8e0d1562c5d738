//! Request-side data the server attaches to a [`Request`] before a servlet sees it.
//!
//! - [`PathParams`]: named segments captured by the router, e.g. `id` in `/users/{id}`
//! - [`ErrorAttributes`]: the status and original URI, present only on the synthetic request
//!   an error page is dispatched with
//!
//! Both live in the request extensions and are read through [`RequestExt`].

use bytes::Bytes;
use http::{Request, StatusCode, Uri};

/// Path parameters captured while routing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: Vec<(String, String)>,
}

impl PathParams {
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Gets the value of a path parameter by its name
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.params.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }
}

impl From<matchit::Params<'_, '_>> for PathParams {
    fn from(params: matchit::Params<'_, '_>) -> Self {
        Self { params: params.iter().map(|(key, value)| (key.to_owned(), value.to_owned())).collect() }
    }
}

/// What an error page needs to know about the failed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorAttributes {
    pub status: StatusCode,
    pub request_uri: Uri,
}

pub trait RequestExt {
    fn path_params(&self) -> Option<&PathParams>;

    /// Set when the request is an error page dispatch.
    fn error_attributes(&self) -> Option<&ErrorAttributes>;
}

impl RequestExt for Request<Bytes> {
    fn path_params(&self) -> Option<&PathParams> {
        self.extensions().get::<PathParams>()
    }

    fn error_attributes(&self) -> Option<&ErrorAttributes> {
        self.extensions().get::<ErrorAttributes>()
    }
}
