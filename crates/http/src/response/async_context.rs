//! Async suspension of an exchange.
//!
//! [`Response::start_async`] splits the exchange in two halves joined by a pair of oneshot
//! channels:
//!
//! - the connection keeps a [`Suspension`]; once the original handler (and any error
//!   dispatch) returned it *releases* the exchange and waits for completion until the
//!   deadline,
//! - the handler gets an [`AsyncContext`] which turns into an [`AsyncResponse`] only after
//!   the release, so the worker never writes concurrently with the original handler.
//!
//! Completion is explicit. A dropped context or response is reported to the connection as
//! [`ResponseError::AsyncAbandoned`].

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, warn};

use super::Response;
use crate::protocol::ResponseError;

pub(crate) fn suspend(response: Response, timeout: Duration) -> (Suspension, AsyncContext) {
    let (release_tx, release_rx) = oneshot::channel();
    let (complete_tx, complete_rx) = oneshot::channel();

    let suspension = Suspension { release_tx, complete_rx, deadline: Instant::now() + timeout, timeout };
    let context = AsyncContext { response, release_rx, complete_tx };
    (suspension, context)
}

/// The connection's half of a suspended exchange.
#[derive(Debug)]
pub(crate) struct Suspension {
    release_tx: oneshot::Sender<()>,
    complete_rx: oneshot::Receiver<()>,
    deadline: Instant,
    timeout: Duration,
}

impl Suspension {
    /// Releases the exchange to the worker and waits for its completion.
    pub(crate) async fn wait(self) -> Result<(), ResponseError> {
        if self.release_tx.send(()).is_err() {
            debug!("async context dropped before release");
        }

        match timeout_at(self.deadline, self.complete_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ResponseError::AsyncAbandoned),
            Err(_) => Err(ResponseError::AsyncTimeout { timeout: self.timeout }),
        }
    }
}

/// The handler's half of a suspended exchange, see [`Response::start_async`].
#[derive(Debug)]
pub struct AsyncContext {
    response: Response,
    release_rx: oneshot::Receiver<()>,
    complete_tx: oneshot::Sender<()>,
}

impl AsyncContext {
    /// Waits until the connection hands the exchange over, then grants write access.
    ///
    /// Fails with [`ResponseError::Closed`] when the exchange ended without a release,
    /// for instance because the original handler failed.
    pub async fn resume(self) -> Result<AsyncResponse, ResponseError> {
        let AsyncContext { response, release_rx, complete_tx } = self;

        if release_rx.await.is_err() {
            warn!("exchange ended before the async context was released");
            return Err(ResponseError::Closed);
        }

        Ok(AsyncResponse { response, complete_tx: Some(complete_tx) })
    }

    /// Runs `task` on the runtime once the exchange is released.
    pub fn start<F, Fut>(self, task: F) -> JoinHandle<()>
    where
        F: FnOnce(AsyncResponse) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            match self.resume().await {
                Ok(response) => task(response).await,
                Err(e) => debug!(cause = %e, "async task not started"),
            }
        })
    }
}

/// Write access to a suspended exchange, handed to the worker.
///
/// Dereferences to [`Response`]. The worker must finish with [`AsyncResponse::complete`].
pub struct AsyncResponse {
    response: Response,
    complete_tx: Option<oneshot::Sender<()>>,
}

impl AsyncResponse {
    /// Ends the async exchange; the connection then closes the response.
    pub fn complete(mut self) -> Result<(), ResponseError> {
        let result = self.response.lock_core().complete_async();

        if let Some(complete_tx) = self.complete_tx.take()
            && complete_tx.send(()).is_err()
        {
            debug!("connection stopped waiting for completion");
        }
        result
    }
}

impl Deref for AsyncResponse {
    type Target = Response;

    fn deref(&self) -> &Self::Target {
        &self.response
    }
}

impl DerefMut for AsyncResponse {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.response
    }
}

impl Drop for AsyncResponse {
    fn drop(&mut self) {
        if self.complete_tx.is_some() {
            error!("async response dropped without complete, exchange abandoned");
        }
    }
}

impl fmt::Debug for AsyncResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResponse")
            .field("response", &self.response)
            .field("completed", &self.complete_tx.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use http::StatusCode;

    fn response() -> Response {
        let (_client, server) = tokio::io::duplex(1024);
        Response::new(server, &HttpConfig::default())
    }

    #[tokio::test]
    async fn resume_waits_for_release() {
        let mut response = response();
        let context = response.start_async().unwrap();
        let suspension = response.take_suspension().unwrap();

        let worker = tokio::spawn(async move {
            let mut response = context.resume().await.unwrap();
            response.set_status(StatusCode::ACCEPTED).unwrap();
            response.complete().unwrap();
        });

        suspension.wait().await.unwrap();
        worker.await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn dropped_response_is_abandoned() {
        let mut response = response();
        let context = response.start_async().unwrap();

        let worker = context.start(|response| async move {
            drop(response);
        });

        let result = response.take_suspension().unwrap().wait().await;
        assert!(matches!(result, Err(ResponseError::AsyncAbandoned)));
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let mut response = response();
        let _context = response.start_async_with_timeout(Duration::from_millis(50)).unwrap();

        let result = response.take_suspension().unwrap().wait().await;
        assert!(matches!(result, Err(ResponseError::AsyncTimeout { timeout }) if timeout == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn released_without_worker_fails_resume() {
        let mut response = response();
        let context = response.start_async().unwrap();
        drop(response.take_suspension());

        assert!(matches!(context.resume().await, Err(ResponseError::Closed)));
    }
}
