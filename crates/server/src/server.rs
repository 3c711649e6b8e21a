//! TCP accept loop and request routing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_util::sync::CancellationToken;

use tailcast_tail::{FileCursor, FileReader, Patterns, PositionStore};

use crate::http::{self, RequestHead};
use crate::session::{self, SessionConfig};
use crate::{STREAM_SUFFIX, ServerError, WS_READ_LIMIT, page};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Advertise `wss://` in the bootstrap page regardless of how the
    /// request arrived (for deployments behind a TLS-terminating proxy).
    pub force_tls: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            force_tls: false,
        }
    }
}

/// The tailcast server.
///
/// Every inbound connection gets its own task; streaming sessions poll the
/// monitored file independently of each other. The compiled patterns and
/// the position store are shared across all of them.
pub struct TailServer {
    config: ServerConfig,
    path: PathBuf,
    patterns: Arc<Patterns>,
    store: Arc<PositionStore>,
    session_config: SessionConfig,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl TailServer {
    pub fn new(
        config: ServerConfig,
        path: impl Into<PathBuf>,
        patterns: Arc<Patterns>,
        store: Arc<PositionStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            path: path.into(),
            patterns,
            store,
            session_config: SessionConfig::default(),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Gracefully shuts down the accept loop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until cancellation.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.config.port).into();
        let listener = TcpListener::bind(addr).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!(
            file = %self.path.display(),
            "tailcast listening on {local_addr}"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::debug!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Handles one TCP connection: parse the head, then page or stream.
    async fn handle_connection(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), ServerError> {
        let head = match http::read_request_head(&mut stream).await {
            Ok(head) => head,
            Err(e @ (ServerError::BadRequest(_) | ServerError::HeadTooLarge)) => {
                let _ = http::write_bad_request(&mut stream).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let client = http::client_ip(&head, peer);
        tracing::info!(
            client = %client,
            %peer,
            method = %head.method,
            path = %head.path,
            "request"
        );

        if head.method != "GET" {
            return http::write_method_not_allowed(&mut stream).await;
        }

        if head.path.ends_with(STREAM_SUFFIX) {
            if !head.is_upgrade() {
                let _ = http::write_bad_request(&mut stream).await;
                return Err(ServerError::NotAnUpgrade);
            }
            self.serve_stream(stream, head, client).await
        } else {
            self.serve_home(stream, head, client).await
        }
    }

    /// Upgrades to WebSocket and runs the streaming session to completion.
    async fn serve_stream(
        &self,
        mut stream: TcpStream,
        head: RequestHead,
        client: String,
    ) -> Result<(), ServerError> {
        http::write_upgrade_response(&mut stream, &head).await?;

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_READ_LIMIT);
        ws_config.max_frame_size = Some(WS_READ_LIMIT);
        let ws = WebSocketStream::from_raw_socket(stream, Role::Server, Some(ws_config)).await;

        let start = self.resolve_cursor(&head, &client);
        let reader = FileReader::new(&self.path, Arc::clone(&self.patterns));

        session::run(
            ws,
            reader,
            Arc::clone(&self.patterns),
            Arc::clone(&self.store),
            client,
            start,
            self.session_config.clone(),
        )
        .await;

        Ok(())
    }

    /// Serves the bootstrap page with the content known at request time.
    async fn serve_home(
        &self,
        mut stream: TcpStream,
        head: RequestHead,
        client: String,
    ) -> Result<(), ServerError> {
        let last_pos = head
            .query_int::<u64>("lastPos")
            .unwrap_or_else(|| self.store.get(&client));

        let reader = FileReader::new(&self.path, Arc::clone(&self.patterns));
        let (content, cursor) = match reader.read_if_modified(&FileCursor::start(last_pos)) {
            Ok((delta, cursor)) => {
                let bytes = delta.unwrap_or_default();
                let mut content = String::new();
                for line in self.patterns.filter_lines(&bytes) {
                    content.push_str(&String::from_utf8_lossy(line));
                    content.push('\n');
                }
                (content, cursor)
            }
            Err(e) => {
                tracing::warn!(client = %client, error = %e, "initial page read failed");
                (
                    format!("{e}\n"),
                    FileCursor::start(self.store.get(&client)),
                )
            }
        };

        // Streaming endpoint: the request path with the suffix appended.
        let mut ws_path = head.path.trim_matches('/').to_string();
        if !ws_path.is_empty() {
            ws_path.push('/');
        }
        ws_path.push_str("ws");

        let fallback_host = self
            .local_addr()
            .await
            .map(|a| a.to_string())
            .unwrap_or_else(|| "localhost".to_string());
        let host = head.header("host").unwrap_or(&fallback_host);
        let scheme = if self.config.force_tls { "wss" } else { "ws" };

        let filename = self.path.display().to_string();
        let html = page::render(&page::PageParams {
            scheme,
            host,
            ws_path: &ws_path,
            last_mod: cursor.mod_time_unix(),
            last_pos: cursor.offset,
            filename: &filename,
            content: &content,
        });

        http::write_response(&mut stream, "200 OK", "", &html).await
    }

    /// Resolves the starting cursor for a new session (explicit query
    /// parameters first, then the position store; malformed values fall
    /// back silently).
    fn resolve_cursor(&self, head: &RequestHead, client: &str) -> FileCursor {
        let last_mod = head.query_int::<i64>("lastMod").unwrap_or(0);
        let last_pos = head
            .query_int::<u64>("lastPos")
            .unwrap_or_else(|| self.store.get(client));
        FileCursor::from_unix(last_mod, last_pos)
    }
}
