//! Response head type shared by the encoder, the response core and the client.

use http::{HeaderMap, Response, StatusCode};

/// The status line and headers of a response, before any payload.
///
/// Only `HTTP/1.1` heads are encoded; the version is left at the `http` crate default.
pub type ResponseHead = Response<()>;

pub(crate) fn build_response_head(status: StatusCode, headers: HeaderMap) -> ResponseHead {
    let mut head = ResponseHead::new(());
    *head.status_mut() = status;
    *head.headers_mut() = headers;
    head
}
