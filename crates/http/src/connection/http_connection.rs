use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

use crate::codec::RequestDecoder;
use crate::config::HttpConfig;
use crate::connection::MessageWriter;
use crate::ensure;
use crate::handler::Handler;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHeader, ResponseError};
use crate::response::{BoxWriter, Response};

const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// An HTTP/1.1 connection serving requests one at a time.
///
/// The read half is decoded with [`RequestDecoder`]; the write half is owned by the
/// [`Response`] of the current exchange and handed back when the exchange finishes.
pub struct HttpConnection<R> {
    framed_read: FramedRead<R, RequestDecoder>,
    writer: Option<MessageWriter<BoxWriter>>,
    config: HttpConfig,
}

impl<R> HttpConnection<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new<W>(reader: R, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_config(reader, writer, HttpConfig::default())
    }

    pub fn with_config<W>(reader: R, writer: W, config: HttpConfig) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: BoxWriter = Box::new(writer);
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), 8 * 1024),
            writer: Some(MessageWriter::with_capacity(writer, config.output_buffer_size)),
            config,
        }
    }

    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler + ?Sized,
    {
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Header((header, payload_size)))) => {
                    if !self.do_process(header, payload_size, handler.as_ref()).await? {
                        info!("connection not kept alive, shutting down");
                        return Ok(());
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("receive payload while expecting a request head");
                    self.reject(StatusCode::BAD_REQUEST).await?;
                    return Err(ParseError::invalid_body("need header while receive body").into());
                }

                Some(Err(e)) => {
                    error!(cause = %e, "can't receive next request");
                    self.reject(status_for(&e)).await?;
                    return Err(e.into());
                }

                None => {
                    info!("cant read more request, break this connection down");
                    return Ok(());
                }
            }
        }
    }

    /// Serves one exchange. Returns whether the connection stays open.
    async fn do_process<H>(&mut self, header: RequestHeader, payload_size: PayloadSize, handler: &H) -> Result<bool, HttpError>
    where
        H: Handler + ?Sized,
    {
        let keep_alive = header.is_keep_alive();

        if header.expects_continue() && !payload_size.is_empty() {
            if let Some(writer) = self.writer.as_mut() {
                writer.write_raw(CONTINUE_RESPONSE).await?;
            }
            info!("receive expect request header, sent continue response");
        }

        let body = match self.read_body(payload_size).await {
            Ok(body) => body,
            Err(e) => {
                error!(cause = %e, "failed to read request body");
                self.reject(status_for(&e)).await?;
                return Err(e.into());
            }
        };

        let writer = self.writer.take().ok_or(ResponseError::Closed)?;
        let mut response = Response::with_message_writer(writer, &self.config);
        if !keep_alive {
            response.set_close_connection();
        }

        let request = header.body(body);
        debug!(method = %request.method(), uri = %request.uri(), "dispatching request");

        if let Err(e) = handler.call(request, &mut response).await {
            error!(cause = %e, "handler failed");
            // also cancels a suspension, its worker must not take over a failed exchange
            if let Err(recover_error) = response.recover(StatusCode::INTERNAL_SERVER_ERROR) {
                warn!(cause = %recover_error, "response committed before the failure");
            }
        }

        let writer = match response.take_suspension() {
            None => response.finish().await?,
            Some(suspension) => match suspension.wait().await {
                Ok(()) => {
                    debug!("async exchange completed");
                    response.finish().await?
                }
                Err(e @ ResponseError::AsyncTimeout { .. }) => {
                    error!(cause = %e, "async exchange timed out, committing buffered output");
                    response.time_out().await?;
                    return Err(e.into());
                }
                Err(e) => {
                    error!(cause = %e, "async exchange abandoned");
                    response.set_close_connection();
                    if let Err(recover_error) = response.recover(StatusCode::INTERNAL_SERVER_ERROR) {
                        warn!(cause = %recover_error, "abandoned exchange already committed");
                    }
                    response.finish().await?;
                    return Err(e.into());
                }
            },
        };

        self.writer = Some(writer);
        Ok(keep_alive)
    }

    async fn read_body(&mut self, payload_size: PayloadSize) -> Result<Bytes, ParseError> {
        let max_size = self.config.max_request_body;
        let declared = payload_size.declared_length().unwrap_or(0);
        let declared = usize::try_from(declared).unwrap_or(usize::MAX);
        ensure!(declared <= max_size, ParseError::too_large_body(declared, max_size));

        let mut body = BytesMut::with_capacity(declared);
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    let current_size = body.len() + bytes.len();
                    ensure!(current_size <= max_size, ParseError::too_large_body(current_size, max_size));
                    body.extend_from_slice(&bytes);
                }
                Some(Ok(Message::Payload(PayloadItem::Eof))) => return Ok(body.freeze()),
                Some(Ok(Message::Header(_))) => return Err(ParseError::invalid_body("receive request head while reading body")),
                Some(Err(e)) => return Err(e),
                None => return Err(ParseError::invalid_body("connection closed while reading body")),
            }
        }
    }

    /// Answers a request that can't be served and leaves the connection unusable.
    async fn reject(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };

        let mut response = Response::with_message_writer(writer, &self.config);
        response.set_close_connection();
        response.set_status(status)?;
        let mut writer = response.finish().await?;
        writer.shutdown().await?;
        Ok(())
    }
}

fn status_for(e: &ParseError) -> StatusCode {
    match e {
        ParseError::TooLargeHeader { .. } | ParseError::TooManyHeaders { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
        ParseError::TooLargeBody { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{BoxError, make_handler};
    use http::{Request, header};
    use indoc::indoc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Runs one connection over an in-memory stream and returns everything written back.
    async fn exchange<H>(request: &str, handler: H, config: HttpConfig) -> (String, Result<(), HttpError>)
    where
        H: Handler + 'static,
    {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(server);
        let connection = HttpConnection::with_config(reader, writer, config);

        client.write_all(request.as_bytes()).await.unwrap();
        let result = connection.process(Arc::new(handler)).await;

        let mut wire = String::new();
        client.shutdown().await.unwrap();
        client.read_to_string(&mut wire).await.unwrap();
        (wire, result)
    }

    fn hello(_request: Request<Bytes>, response: &mut Response) -> futures::future::BoxFuture<'_, Result<(), BoxError>> {
        Box::pin(async move {
            response.write("hello").await?;
            Ok::<_, BoxError>(())
        })
    }

    #[tokio::test]
    async fn serves_keep_alive_requests_until_close() {
        let request = indoc! {"
            GET /first HTTP/1.1\r
            Host: localhost\r
            \r
            GET /second HTTP/1.1\r
            Host: localhost\r
            Connection: close\r
            \r
        "};

        let (wire, result) = exchange(request, make_handler(hello), HttpConfig::default()).await;

        assert!(result.is_ok());
        assert_eq!(
            wire,
            "HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello\
             HTTP/1.1 200 OK\r\nconnection: close\r\ncontent-length: 5\r\n\r\nhello"
        );
    }

    #[tokio::test]
    async fn echoes_chunked_request_body_after_continue() {
        let request = indoc! {"
            POST /echo HTTP/1.1\r
            Host: localhost\r
            Expect: 100-continue\r
            Transfer-Encoding: chunked\r
            Connection: close\r
            \r
            5\r
            hello\r
            6\r
             world\r
            0\r
            \r
        "};

        let handler = make_handler(|request: Request<Bytes>, response: &mut Response| {
            Box::pin(async move {
                response.write(request.into_body()).await?;
                Ok::<_, BoxError>(())
            })
        });
        let (wire, result) = exchange(request, handler, HttpConfig::default()).await;

        assert!(result.is_ok());
        assert!(wire.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\n"));
        assert!(wire.ends_with("content-length: 11\r\n\r\nhello world"));
    }

    #[tokio::test]
    async fn handler_failure_before_commit_is_500() {
        let handler = make_handler(|_request: Request<Bytes>, response: &mut Response| {
            Box::pin(async move {
                response.write("partial").await?;
                Err::<(), BoxError>("boom".into())
            })
        });
        let (wire, result) = exchange("GET / HTTP/1.1\r\nConnection: close\r\n\r\n", handler, HttpConfig::default()).await;

        assert!(result.is_ok());
        assert_eq!(wire, "HTTP/1.1 500 Internal Server Error\r\nconnection: close\r\ncontent-length: 0\r\n\r\n");
    }

    #[tokio::test]
    async fn handler_failure_after_commit_truncates() {
        let handler = make_handler(|_request: Request<Bytes>, response: &mut Response| {
            Box::pin(async move {
                response.write(vec![b'a'; 64]).await?;
                Err::<(), BoxError>("boom".into())
            })
        });
        let config = HttpConfig::with_buffer_sizes(32, 8);
        let (wire, result) = exchange("GET / HTTP/1.1\r\n\r\n", handler, config).await;

        assert!(matches!(result, Err(HttpError::ExchangeError { source: ResponseError::Aborted })));
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n"));
        assert!(!wire.ends_with("0\r\n\r\n"));
    }

    #[tokio::test]
    async fn malformed_request_is_rejected() {
        let (wire, result) = exchange("GET / HTTP/1.1\r\nbad header\r\n\r\n", make_handler(hello), HttpConfig::default()).await;

        assert!(matches!(result, Err(HttpError::RequestError { .. })));
        assert_eq!(wire, "HTTP/1.1 400 Bad Request\r\nconnection: close\r\ncontent-length: 0\r\n\r\n");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let config = HttpConfig { max_request_body: 4, ..HttpConfig::default() };
        let (wire, result) = exchange("POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello", make_handler(hello), config).await;

        assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::TooLargeBody { .. } })));
        assert!(wire.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    }

    #[tokio::test]
    async fn async_exchange_times_out() {
        let handler = make_handler(|_request: Request<Bytes>, response: &mut Response| {
            Box::pin(async move {
                let context = response.start_async_with_timeout(Duration::from_millis(20))?;
                response.write("partial").await?;
                context.start(|response| async move {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    let _unused = response.complete();
                });
                Ok::<_, BoxError>(())
            })
        });
        let (wire, result) = exchange("GET / HTTP/1.1\r\n\r\n", handler, HttpConfig::default()).await;

        assert!(matches!(result, Err(HttpError::ExchangeError { source: ResponseError::AsyncTimeout { .. } })));
        assert_eq!(wire, "HTTP/1.1 200 OK\r\nconnection: close\r\ncontent-length: 7\r\n\r\npartial");
        assert!(!wire.contains(header::TRANSFER_ENCODING.as_str()));
    }
}
