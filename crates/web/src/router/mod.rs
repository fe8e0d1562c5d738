//! Path routing backed by [`matchit`].
//!
//! A path maps to a list of servlets, each guarded by a [`Filter`]; the first one whose
//! filter matches serves the request.

pub mod filter;

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use http::Request;
use tracing::debug;

use crate::request::PathParams;
use crate::servlet::Servlet;
use filter::{AllFilter, Filter};

type InnerRouter<T> = matchit::Router<T>;

pub struct Router {
    inner_router: InnerRouter<Vec<RouterItem>>,
}

pub struct RouterItem {
    filter: AllFilter,
    servlet: Box<dyn Servlet>,
}

/// Result of matching a path: the candidate servlets and the captured parameters.
pub struct RouteResult<'router> {
    router_items: &'router [RouterItem],
    params: PathParams,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    pub fn at(&self, path: &str) -> RouteResult<'_> {
        match self.inner_router.at(path) {
            Ok(matched) => RouteResult { router_items: matched.value.as_slice(), params: matched.params.into() },
            Err(e) => {
                debug!(path, cause = %e, "no route");
                RouteResult::empty()
            }
        }
    }

    /// Finds the servlet serving `request`, together with its path parameters.
    pub fn find(&self, request: &Request<Bytes>) -> Option<(&dyn Servlet, PathParams)> {
        let RouteResult { router_items, params } = self.at(request.uri().path());
        let servlet = router_items.iter().find(|item| item.filter.matches(request))?.servlet();
        Some((servlet, params))
    }
}

impl RouterItem {
    pub fn filter(&self) -> &dyn Filter {
        &self.filter
    }

    pub fn servlet(&self) -> &dyn Servlet {
        self.servlet.as_ref()
    }
}

impl<'router> RouteResult<'router> {
    fn empty() -> Self {
        Self { router_items: &[], params: PathParams::empty() }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.router_items.is_empty()
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn router_items(&self) -> &'router [RouterItem] {
        self.router_items
    }
}

#[derive(Default)]
pub struct RouterBuilder {
    data: HashMap<String, Vec<RouterItemBuilder>>,
}

impl RouterBuilder {
    pub fn route(mut self, route: impl Into<String>, item_builder: RouterItemBuilder) -> Self {
        self.data.entry(route.into()).or_default().push(item_builder);
        self
    }

    /// Fails when two route patterns conflict or a pattern is malformed.
    pub fn build(self) -> Result<Router, matchit::InsertError> {
        let mut inner_router = InnerRouter::new();

        for (path, items) in self.data {
            let router_items = items.into_iter().map(RouterItemBuilder::build).collect::<Vec<_>>();
            inner_router.insert(path, router_items)?;
        }

        Ok(Router { inner_router })
    }
}

macro_rules! method_router_filter {
    ($method:ident, $method_name:ident) => {
        #[doc = concat!("Routes `", stringify!($method), "` requests to `servlet`.")]
        pub fn $method<S: Servlet + 'static>(servlet: S) -> RouterItemBuilder {
            let mut filters = filter::all_filter();
            filters.and(filter::$method_name());
            RouterItemBuilder { filters, servlet: Box::new(servlet) }
        }
    };
}

method_router_filter!(get, get_method);
method_router_filter!(post, post_method);
method_router_filter!(put, put_method);
method_router_filter!(delete, delete_method);
method_router_filter!(head, head_method);

/// Routes requests of any method to `servlet`.
pub fn any<S: Servlet + 'static>(servlet: S) -> RouterItemBuilder {
    RouterItemBuilder { filters: filter::all_filter(), servlet: Box::new(servlet) }
}

pub struct RouterItemBuilder {
    filters: AllFilter,
    servlet: Box<dyn Servlet>,
}

impl RouterItemBuilder {
    pub fn with<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters.and(filter);
        self
    }

    fn build(self) -> RouterItem {
        RouterItem { filter: self.filters, servlet: self.servlet }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

impl fmt::Debug for RouterItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterItem").field("filter", &self.filter).finish_non_exhaustive()
    }
}

impl fmt::Debug for RouteResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteResult").field("router_items", &self.router_items).field("params", &self.params).finish()
    }
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder").field("routes", &self.data.keys()).finish()
    }
}

impl fmt::Debug for RouterItemBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterItemBuilder").field("filters", &self.filters).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::filter::header;
    use super::{Router, any, get, post};
    use crate::servlet_fn;
    use bytes::Bytes;
    use commitline_http::handler::BoxError;
    use http::{Method, Request};

    fn noop() -> impl crate::Servlet {
        servlet_fn(|_request, _response| Box::pin(async { Ok::<_, BoxError>(()) }))
    }

    fn router() -> Router {
        Router::builder()
            .route("/", get(noop()))
            .route("/", post(noop()).with(header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref()).unwrap()))
            .route("/", post(noop()))
            .route("/users/{id}", any(noop()))
            .build()
            .unwrap()
    }

    fn request(method: Method, uri: &str) -> Request<Bytes> {
        Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap()
    }

    #[test]
    fn route_get() {
        let router = router();
        let route_result = router.at("/");
        assert!(route_result.params().is_empty());

        let items = route_result.router_items();
        assert_eq!(items.len(), 3);

        let request = request(Method::GET, "/");
        assert!(items[0].filter().matches(&request));
        assert!(!items[1].filter().matches(&request));
        assert!(!items[2].filter().matches(&request));
    }

    #[test]
    fn route_post_without_content_type() {
        let router = router();
        let request = request(Method::POST, "/");
        let items = router.at("/").router_items();

        assert!(!items[0].filter().matches(&request));
        assert!(!items[1].filter().matches(&request));
        assert!(items[2].filter().matches(&request));
        assert!(router.find(&request).is_some());
    }

    #[test]
    fn find_captures_params() {
        let router = router();
        let (_servlet, params) = router.find(&request(Method::DELETE, "/users/42")).unwrap();
        assert_eq!(params.get("id"), Some("42"));
    }

    #[test]
    fn unknown_path_or_method() {
        let router = router();
        assert!(router.at("/missing").is_empty());
        assert!(router.find(&request(Method::PUT, "/")).is_none());
    }

    #[test]
    fn conflicting_routes_fail_to_build() {
        let result = Router::builder().route("/{a}", get(noop())).route("/{b}", get(noop())).build();
        assert!(result.is_err());
    }
}
