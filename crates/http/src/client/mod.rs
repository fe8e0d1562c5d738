//! A small HTTP/1.1 client that reads responses exactly as they appear on the wire.
//!
//! It sends one request per connection, never follows redirects and keeps the framing
//! headers of the response, so callers can check `Content-Length` against
//! `Transfer-Encoding`. A body that ends before its framing says it should is reported as
//! [`ClientError::UnexpectedEof`] instead of being returned short.

use std::borrow::Cow;
use std::io;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace};

use crate::codec::ResponseDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, ResponseHead};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// upper bound for connect, send and the whole response
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect error: {source}")]
    Connect { source: io::Error },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("invalid response: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    /// The stream ended before the response was complete.
    #[error("connection closed before the response was complete, {received} body bytes received")]
    UnexpectedEof { received: usize },

    #[error("no response within {timeout:?}")]
    Timeout { timeout: Duration },
}

/// A response as read from the wire.
#[derive(Debug)]
pub struct WireResponse {
    head: ResponseHead,
    body: Bytes,
}

impl WireResponse {
    pub fn status(&self) -> StatusCode {
        self.head.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.head.headers().get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header(header::CONTENT_LENGTH).and_then(|value| value.parse().ok())
    }

    pub fn is_chunked(&self) -> bool {
        self.header(header::TRANSFER_ENCODING).is_some_and(|value| value.eq_ignore_ascii_case("chunked"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpClient {
    config: ClientConfig,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub async fn get(&self, addr: SocketAddr, path: &str) -> Result<WireResponse, ClientError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Bytes::new())
            .map_err(|e| ClientError::Io { source: io::Error::new(ErrorKind::InvalidInput, e) })?;
        self.send(addr, request).await
    }

    /// Sends `request` on a fresh connection to `addr`.
    pub async fn send(&self, addr: SocketAddr, request: Request<Bytes>) -> Result<WireResponse, ClientError> {
        let timeout = self.config.timeout();
        let exchange = async {
            let stream = TcpStream::connect(addr).await.map_err(|source| ClientError::Connect { source })?;
            self.exchange(stream, request, &addr.to_string()).await
        };

        tokio::time::timeout(timeout, exchange).await.map_err(|_elapsed| ClientError::Timeout { timeout })?
    }

    /// Writes `request` on `stream` and reads one response back.
    pub async fn exchange<S>(&self, mut stream: S, request: Request<Bytes>, host: &str) -> Result<WireResponse, ClientError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let wire_request = encode_request(request, host);
        stream.write_all(&wire_request).await?;
        stream.flush().await?;
        trace!(size = wire_request.len(), "request sent");

        let mut framed = FramedRead::new(stream, ResponseDecoder::new());
        let head = loop {
            match next_message(&mut framed, 0).await? {
                Message::Header(head) if head.status().is_informational() => {
                    debug!(status = head.status().as_u16(), "skipping interim response");
                    // interim responses carry no payload, drain their Eof
                    next_message(&mut framed, 0).await?;
                }
                Message::Header(head) => break head,
                Message::Payload(_) => return Err(ParseError::invalid_body("payload before response head").into()),
            }
        };

        let mut body = BytesMut::new();
        loop {
            match next_message(&mut framed, body.len()).await? {
                Message::Payload(PayloadItem::Chunk(bytes)) => body.extend_from_slice(&bytes),
                Message::Payload(PayloadItem::Eof) => break,
                Message::Header(_) => return Err(ParseError::invalid_body("response head inside payload").into()),
            }
        }

        debug!(status = head.status().as_u16(), body_size = body.len(), "response received");
        Ok(WireResponse { head, body: body.freeze() })
    }
}

async fn next_message<S>(framed: &mut FramedRead<S, ResponseDecoder>, received: usize) -> Result<Message<ResponseHead>, ClientError>
where
    S: AsyncRead + Unpin,
{
    match framed.next().await {
        Some(Ok(message)) => Ok(message),
        Some(Err(ParseError::Io { source })) if is_disconnect(&source) => Err(ClientError::UnexpectedEof { received }),
        Some(Err(e)) => Err(e.into()),
        None => Err(ClientError::UnexpectedEof { received }),
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe)
}

fn encode_request(request: Request<Bytes>, host: &str) -> BytesMut {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path_and_query().map_or("/", |path| path.as_str());

    let mut dst = BytesMut::with_capacity(256 + body.len());
    dst.put_slice(parts.method.as_str().as_bytes());
    dst.put_u8(b' ');
    dst.put_slice(path.as_bytes());
    dst.put_slice(b" HTTP/1.1\r\n");

    let mut headers = parts.headers;
    if !headers.contains_key(header::HOST)
        && let Ok(host) = HeaderValue::from_str(host)
    {
        headers.insert(header::HOST, host);
    }
    headers.entry(header::CONNECTION).or_insert(HeaderValue::from_static("close"));
    if !body.is_empty() {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    }

    for (name, value) in &headers {
        dst.put_slice(name.as_str().as_bytes());
        dst.put_slice(b": ");
        dst.put_slice(value.as_bytes());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
    dst.put_slice(&body);
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use tokio::io::AsyncReadExt;

    /// Serves `wire` to one request and returns what the client sent.
    async fn replay(wire: &'static str) -> (Result<WireResponse, ClientError>, String) {
        let (client_side, mut server_side) = tokio::io::duplex(16 * 1024);

        let server = tokio::spawn(async move {
            let mut received = vec![0; 1024];
            let n = server_side.read(&mut received).await.unwrap();
            server_side.write_all(wire.as_bytes()).await.unwrap();
            drop(server_side);
            String::from_utf8_lossy(&received[..n]).into_owned()
        });

        let request = Request::builder().uri("/toss/").body(Bytes::new()).unwrap();
        let result = HttpClient::default().exchange(client_side, request, "localhost").await;
        (result, server.await.unwrap())
    }

    #[tokio::test]
    async fn reads_content_length_response() {
        let (result, request) = replay("HTTP/1.1 301 Moved Permanently\r\nLocation: https://example.com/\r\nContent-Length: 5\r\n\r\nmoved").await;

        assert!(request.starts_with("GET /toss/ HTTP/1.1\r\n"));
        assert!(request.contains("host: localhost\r\n"));
        assert!(request.contains("connection: close\r\n"));

        let response = result.unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.header(header::LOCATION), Some("https://example.com/"));
        assert_eq!(response.content_length(), Some(5));
        assert!(!response.is_chunked());
        assert_eq!(response.text(), "moved");
    }

    #[tokio::test]
    async fn reads_chunked_response_after_continue() {
        let wire = indoc! {"
            HTTP/1.1 100 Continue\r
            \r
            HTTP/1.1 200 OK\r
            Transfer-Encoding: chunked\r
            \r
            3\r
            aaa\r
            3\r
            bbb\r
            0\r
            \r
        "};
        let response = replay(wire).await.0.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.is_chunked());
        assert_eq!(response.content_length(), None);
        assert_eq!(response.text(), "aaabbb");
    }

    #[tokio::test]
    async fn truncated_chunked_body_is_eof() {
        let wire = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\naaa\r\n";
        let result = replay(wire).await.0;

        assert!(matches!(result, Err(ClientError::UnexpectedEof { received: 3 })));
    }

    #[tokio::test]
    async fn close_delimited_body() {
        let response = replay("HTTP/1.1 200 OK\r\n\r\nuntil close").await.0.unwrap();
        assert_eq!(response.text(), "until close");
    }
}
