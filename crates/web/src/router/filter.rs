//! Composable request filters narrowing which servlet of a route serves a request.
//!
//! # Examples
//!
//! ```
//! use commitline_web::router::filter::{all_filter, get_method, header};
//!
//! let mut filters = all_filter();
//! filters.and(get_method()).and(header(http::header::ACCEPT, "text/plain").unwrap());
//! ```

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, Request};

pub trait Filter: Send + Sync {
    /// Returns `true` if the request should be served by the guarded servlet.
    fn matches(&self, request: &Request<Bytes>) -> bool;
}

struct FnFilter<F: Fn(&Request<Bytes>) -> bool>(F);

impl<F: Fn(&Request<Bytes>) -> bool + Send + Sync> Filter for FnFilter<F> {
    fn matches(&self, request: &Request<Bytes>) -> bool {
        (self.0)(request)
    }
}

/// Creates a filter from a closure.
pub fn fn_filter<F>(f: F) -> impl Filter
where
    F: Fn(&Request<Bytes>) -> bool + Send + Sync,
{
    FnFilter(f)
}

/// Creates a new AND-composed filter chain.
pub fn all_filter() -> AllFilter {
    AllFilter::default()
}

/// All inner filters must match; an empty chain matches everything.
#[derive(Default)]
pub struct AllFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AllFilter {
    pub fn and<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl Filter for AllFilter {
    fn matches(&self, request: &Request<Bytes>) -> bool {
        self.filters.iter().all(|filter| filter.matches(request))
    }
}

impl std::fmt::Debug for AllFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllFilter").field("filters", &self.filters.len()).finish()
    }
}

/// A filter that matches one HTTP method.
#[derive(Debug, Clone)]
pub struct MethodFilter(Method);

impl Filter for MethodFilter {
    fn matches(&self, request: &Request<Bytes>) -> bool {
        self.0 == request.method()
    }
}

macro_rules! method_filter {
    ($method:ident, $upper_case_method:ident) => {
        #[doc = concat!("Creates a filter that matches HTTP ", stringify!($upper_case_method), " requests.")]
        #[inline]
        pub fn $method() -> MethodFilter {
            MethodFilter(Method::$upper_case_method)
        }
    };
}

method_filter!(get_method, GET);
method_filter!(post_method, POST);
method_filter!(put_method, PUT);
method_filter!(delete_method, DELETE);
method_filter!(head_method, HEAD);

/// Creates a filter that matches a header name and value.
pub fn header<K, V>(header_name: K, header_value: V) -> Result<HeaderFilter, http::Error>
where
    HeaderName: TryFrom<K>,
    <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
    HeaderValue: TryFrom<V>,
    <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
{
    let name = HeaderName::try_from(header_name).map_err(Into::into)?;
    let value = HeaderValue::try_from(header_value).map_err(Into::into)?;
    Ok(HeaderFilter(name, value))
}

#[derive(Debug, Clone)]
pub struct HeaderFilter(HeaderName, HeaderValue);

impl Filter for HeaderFilter {
    fn matches(&self, request: &Request<Bytes>) -> bool {
        request.headers().get(&self.0).is_some_and(|value| *value == self.1)
    }
}
