use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use commitline_http::config::HttpConfig;
use commitline_http::connection::HttpConnection;
use commitline_http::handler::{BoxError, Handler};
use commitline_http::response::Response;
use http::{Request, StatusCode};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::config::{ConfigError, ServerConfig};
use crate::error_page::{ErrorPageDispatcher, ErrorPages};
use crate::profile::ServerProfile;
use crate::router::Router;

#[derive(Debug)]
pub struct ServerBuilder {
    router: Option<Router>,
    address: Option<io::Result<Vec<SocketAddr>>>,
    error_pages: ErrorPages,
    http_config: HttpConfig,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { router: None, address: None, error_pages: ErrorPages::empty(), http_config: HttpConfig::default() }
    }

    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().map(Iterator::collect));
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn error_pages(mut self, error_pages: ErrorPages) -> Self {
        self.error_pages = error_pages;
        self
    }

    pub fn profile(mut self, profile: ServerProfile) -> Self {
        self.http_config = profile.http_config();
        self
    }

    pub fn http_config(mut self, http_config: HttpConfig) -> Self {
        self.http_config = http_config;
        self
    }

    pub fn build(self) -> Result<Server, ServerError> {
        let router = self.router.ok_or(ServerError::MissingRouter)?;
        let address = self.address.ok_or(ServerError::MissingAddress)?.map_err(|source| ServerError::Address { source })?;
        self.http_config.validate().map_err(|source| ServerError::Config { source: source.into() })?;

        Ok(Server { router, dispatcher: ErrorPageDispatcher::new(self.error_pages), address, http_config: self.http_config })
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("router must be set")]
    MissingRouter,

    #[error("address must be set")]
    MissingAddress,

    #[error("invalid address: {source}")]
    Address { source: io::Error },

    #[error("bind error: {source}")]
    Bind { source: io::Error },

    #[error("config error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },
}

/// Routes each request to a servlet and resolves signalled errors with error pages.
#[derive(Debug)]
pub struct Server {
    router: Router,
    dispatcher: ErrorPageDispatcher,
    address: Vec<SocketAddr>,
    http_config: HttpConfig,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Builds a server from a loaded [`ServerConfig`]; only the routes come from code.
    pub fn from_config(config: &ServerConfig, router: Router) -> Result<Server, ServerError> {
        Server::builder()
            .address(config.address)
            .router(router)
            .http_config(config.http_config())
            .error_pages(config.error_pages()?)
            .build()
    }

    pub fn http_config(&self) -> &HttpConfig {
        &self.http_config
    }

    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let listener = TcpListener::bind(self.address.as_slice()).await.map_err(|source| ServerError::Bind { source })?;
        Ok(BoundServer { listener, server: Arc::new(self) })
    }

    /// Installs a stdout subscriber, binds and serves until the task is dropped.
    pub async fn start(self) -> Result<(), ServerError> {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            warn!(cause = %e, "tracing subscriber already installed");
        }

        info!("start listening at {:?}", self.address);
        let bound = self.bind().await.inspect_err(|e| error!(cause = %e, "bind server error"))?;
        bound.serve().await;
        Ok(())
    }
}

#[async_trait]
impl Handler for Server {
    async fn call(&self, mut request: Request<Bytes>, response: &mut Response) -> Result<(), BoxError> {
        match self.router.find(&request) {
            Some((servlet, params)) => {
                request.extensions_mut().insert(params);
                if let Err(e) = servlet.service(&request, response).await {
                    error!(uri = %request.uri(), cause = %e, "servlet failed");
                    // committed: the exchange is aborted and the failure goes to the connection
                    response.recover(StatusCode::INTERNAL_SERVER_ERROR)?;
                }
            }
            None => {
                debug!(method = %request.method(), uri = %request.uri(), "no servlet");
                response.signal_error(StatusCode::NOT_FOUND)?;
            }
        }

        self.dispatcher.dispatch(&self.router, &request, response).await
    }
}

/// A server whose listener is bound, so the local address is known before serving.
#[derive(Debug)]
pub struct BoundServer {
    listener: TcpListener,
    server: Arc<Server>,
}

impl BoundServer {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, one task per connection.
    pub async fn serve(self) {
        let http_config = self.server.http_config;
        loop {
            let (tcp_stream, remote_addr) = match self.listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let handler = Arc::clone(&self.server);
            tokio::spawn(async move {
                let (reader, writer) = tcp_stream.into_split();
                let connection = HttpConnection::with_config(reader, writer, http_config);
                match connection.process(handler).await {
                    Ok(()) => {
                        info!(%remote_addr, "finished process, connection shutdown");
                    }
                    Err(e) => {
                        error!(%remote_addr, "service has error, cause {}, connection shutdown", e);
                    }
                }
            });
        }
    }
}
