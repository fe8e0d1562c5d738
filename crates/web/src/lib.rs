//! Servlet-style serving on top of `commitline-http`.
//!
//! A [`Server`] routes each request to a [`Servlet`] by path (see [`router`]), then resolves
//! an error the servlet signalled with the configured [`ErrorPages`]. Servlets write through
//! the lifecycle-aware [`Response`](commitline_http::response::Response), so whether an
//! error page can still replace the body depends on whether the response was committed.
//!
//! # Example
//!
//! ```no_run
//! use commitline_http::handler::BoxError;
//! use commitline_web::router::get;
//! use commitline_web::{ErrorPages, RequestExt, Router, Server, ServerProfile, servlet_fn};
//! use http::{StatusCode, header};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::builder()
//!         .route(
//!             "/toss/",
//!             get(servlet_fn(|_request, response| {
//!                 Box::pin(async move {
//!                     response.set_header(header::LOCATION, "https://example.com/")?;
//!                     response.signal_error(StatusCode::MOVED_PERMANENTLY)?;
//!                     Ok::<_, BoxError>(())
//!                 })
//!             })),
//!         )
//!         .route(
//!             "/error/",
//!             get(servlet_fn(|request, response| {
//!                 Box::pin(async move {
//!                     let status = request.error_attributes().map(|attributes| attributes.status);
//!                     response.write(format!("error page for {status:?}")).await?;
//!                     Ok::<_, BoxError>(())
//!                 })
//!             })),
//!         )
//!         .build()?;
//!
//!     Server::builder()
//!         .address("127.0.0.1:8080")
//!         .router(router)
//!         .profile(ServerProfile::Compact)
//!         .error_pages(ErrorPages::builder().page(StatusCode::MOVED_PERMANENTLY, "/error/").build()?)
//!         .build()?
//!         .start()
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error_page;
pub mod profile;
pub mod router;

mod request;
mod server;
mod servlet;

pub use error_page::{ErrorPageDispatcher, ErrorPages};
pub use profile::ServerProfile;
pub use request::{ErrorAttributes, PathParams, RequestExt};
pub use router::Router;
pub use server::{BoundServer, Server, ServerBuilder, ServerError};
pub use servlet::{Servlet, ServletFn, servlet_fn};
