//! TCP transport speaking the binary length-prefixed protocol.

use crate::config::NetworkConfig;
use crate::context::{ServerStats, ServiceContext};
use crate::dispatch::{Command, CommandDispatcher};
use crate::error::ServerError;
use crate::responder::{response_queue, ResponseQueue};
use bytes::Bytes;
use glint_protocol::{encode_length_prefixed, LengthPrefixFramer, DEFAULT_PORT};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

/// How long queued responses may take to flush after an exit command.
pub const EXIT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }
}

impl From<&NetworkConfig> for ServerConfig {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            bind_addr: network.bind_addr,
            max_connections: network.max_connections,
        }
    }
}

/// Why the accept loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// [`Server::shutdown`] was called.
    Shutdown,
    /// A client sent the exit command; the hosting process should exit 0.
    ExitRequested,
}

/// Why a single connection stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Closed,
    ExitRequested,
}

/// TCP server for glint.
pub struct Server {
    config: ServerConfig,
    ctx: ServiceContext,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, ctx: ServiceContext) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            ctx,
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.ctx.stats
    }

    /// Binds the configured address and serves until shutdown or exit.
    pub async fn run(&self) -> Result<RunOutcome, ServerError> {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<RunOutcome, ServerError> {
        tracing::info!("glint listening on {}", listener.local_addr()?);
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);

        let (exit_tx, mut exit_rx) = mpsc::channel::<SocketAddr>(1);

        let outcome = loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let stats = Arc::clone(&self.ctx.stats);
                            if stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!(
                                    "Connection limit reached ({}), rejecting {}",
                                    self.config.max_connections,
                                    addr
                                );
                                continue;
                            }

                            stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!("[{}] Failed to set TCP_NODELAY: {}", addr, e);
                            }

                            let ctx = self.ctx.clone();
                            let exit_tx = exit_tx.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                tracing::info!("Client connected: {}", addr);
                                let peer = addr.to_string();

                                match serve_binary(stream, &peer, &ctx, &mut conn_shutdown).await {
                                    Ok(ConnectionOutcome::ExitRequested) => {
                                        let _ = exit_tx.send(addr).await;
                                    }
                                    Ok(ConnectionOutcome::Closed) => {}
                                    Err(e) => {
                                        tracing::warn!("Connection {} error: {}", addr, e);
                                        stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                    }
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                Some(addr) = exit_rx.recv() => {
                    tracing::info!("Exit requested by {}", addr);
                    break RunOutcome::ExitRequested;
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break RunOutcome::Shutdown;
                }
            }
        };

        self.running.store(false, Ordering::SeqCst);
        Ok(outcome)
    }

    /// Signals the accept loop and every connection to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Serves one binary-protocol stream until EOF, exit, a protocol violation
/// or shutdown.
///
/// Responses queued before the stream stops are still written.
pub async fn serve_binary<S>(
    stream: S,
    peer: &str,
    ctx: &ServiceContext,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<ConnectionOutcome, ServerError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let (queue, writer_task) = response_queue(writer, ctx.limits.max_in_flight);
    let dispatcher = CommandDispatcher::new(ctx.default_language.clone());
    let mut framer = LengthPrefixFramer::new().with_max_frame_size(ctx.limits.max_pending_bytes);
    let mut buf = vec![0u8; ctx.limits.read_buffer_size];

    let result = loop {
        let read = tokio::select! {
            biased;
            _ = shutdown.recv() => None,
            read = reader.read(&mut buf) => Some(read),
        };
        let n = match read {
            None => {
                tracing::debug!("[{}] Closing for shutdown", peer);
                break Ok(ConnectionOutcome::Closed);
            }
            Some(Ok(0)) => break Ok(ConnectionOutcome::Closed),
            Some(Ok(n)) => n,
            Some(Err(e)) => break Err(ServerError::Io(e)),
        };

        tracing::debug!("[{}] Received {} bytes", peer, n);
        framer.extend(&buf[..n]);

        match dispatch_frames(&mut framer, &dispatcher, &queue, ctx, peer).await {
            Ok(None) => {}
            Ok(Some(outcome)) => break Ok(outcome),
            Err(e) => break Err(e),
        }
    };

    drop(queue);
    let flushed = if matches!(result, Ok(ConnectionOutcome::ExitRequested)) {
        match tokio::time::timeout(EXIT_FLUSH_TIMEOUT, writer_task).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!("[{}] Timed out flushing responses before exit", peer);
                return result;
            }
        }
    } else {
        writer_task.await
    };

    match flushed {
        Ok(Ok(bytes)) => tracing::debug!("[{}] Wrote {} response bytes", peer, bytes),
        Ok(Err(e)) => tracing::debug!("[{}] Response writer failed: {}", peer, e),
        Err(e) => tracing::error!("[{}] Response writer task failed: {}", peer, e),
    }
    result
}

/// Handles every complete frame in the framer. Returns an outcome when the
/// connection must stop.
async fn dispatch_frames(
    framer: &mut LengthPrefixFramer,
    dispatcher: &CommandDispatcher,
    queue: &ResponseQueue,
    ctx: &ServiceContext,
    peer: &str,
) -> Result<Option<ConnectionOutcome>, ServerError> {
    while let Some(frame) = framer.try_extract()? {
        match dispatcher.decode(&frame)? {
            Command::Exit => {
                tracing::info!("[{}] Exit command received", peer);
                return Ok(Some(ConnectionOutcome::ExitRequested));
            }
            Command::Highlight(request) => {
                tracing::debug!(
                    "[{}] Highlight request: lang={} code_len={}",
                    peer,
                    request.language,
                    request.code.len()
                );
                let render = ctx.render_job(request);
                queue
                    .push(move || render().and_then(|html| length_prefixed(&html)))
                    .await?;
            }
        }
    }
    Ok(None)
}

fn length_prefixed(html: &str) -> Option<Bytes> {
    match encode_length_prefixed(html.as_bytes()) {
        Ok(buf) => Some(buf.freeze()),
        Err(e) => {
            tracing::error!("Dropping response: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::context::test_support::echo_context;
    use crate::error::DispatchError;
    use glint_highlight::{Highlighter, HtmlRenderer};
    use glint_protocol::{BinaryFrame, ProtocolError, CMD_HIGHLIGHT};
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    fn spawn_connection(
        ctx: ServiceContext,
    ) -> (
        DuplexStream,
        JoinHandle<Result<ConnectionOutcome, ServerError>>,
        broadcast::Sender<()>,
    ) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move {
            serve_binary(server, "test", &ctx, &mut shutdown_rx).await
        });
        (client, handle, shutdown_tx)
    }

    fn highlight(argument: &str) -> Vec<u8> {
        BinaryFrame::request(CMD_HIGHLIGHT, argument.as_bytes())
            .encode()
            .unwrap()
            .to_vec()
    }

    fn split_responses(mut out: &[u8]) -> Vec<String> {
        let mut responses = Vec::new();
        while out.len() >= 4 {
            let len = u32::from_le_bytes([out[0], out[1], out[2], out[3]]) as usize;
            responses.push(String::from_utf8(out[4..4 + len].to_vec()).unwrap());
            out = &out[4 + len..];
        }
        assert!(out.is_empty(), "trailing bytes: {:?}", out);
        responses
    }

    async fn finish(mut client: DuplexStream) -> Vec<u8> {
        client.shutdown().await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_highlight_lua() {
        let renderer = HtmlRenderer::bundled().unwrap();
        let expected = renderer.render("print(1)", "lua").unwrap();
        let ctx = ServiceContext::new(Arc::new(renderer));
        let (mut client, handle, _shutdown) = spawn_connection(ctx);

        client.write_all(&highlight("lang:lua;print(1)")).await.unwrap();
        let out = finish(client).await;

        let len = u32::from_le_bytes([out[0], out[1], out[2], out[3]]) as usize;
        assert_eq!(len, out.len() - 4);
        assert_eq!(&out[4..], expected.as_bytes());
        assert_eq!(handle.await.unwrap().unwrap(), ConnectionOutcome::Closed);
    }

    #[tokio::test]
    async fn test_default_language() {
        let (mut client, _handle, _shutdown) = spawn_connection(echo_context());
        client.write_all(&highlight("@code")).await.unwrap();
        let out = finish(client).await;
        assert_eq!(split_responses(&out), vec!["htt:@code"]);
    }

    #[tokio::test]
    async fn test_exit_writes_nothing() {
        let (mut client, handle, _shutdown) = spawn_connection(echo_context());
        client.write_all(&[2, 0, 0, 0, 0, 0]).await.unwrap();

        assert_eq!(handle.await.unwrap().unwrap(), ConnectionOutcome::ExitRequested);
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_exit_flushes_earlier_responses() {
        let (mut client, handle, _shutdown) = spawn_connection(echo_context());
        let mut input = highlight("lang:lua;slow");
        input.extend_from_slice(&[2, 0, 0, 0, 0, 0]);
        input.extend_from_slice(&highlight("lang:lua;never"));
        client.write_all(&input).await.unwrap();

        assert_eq!(handle.await.unwrap().unwrap(), ConnectionOutcome::ExitRequested);
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert_eq!(split_responses(&out), vec!["lua:slow"]);
    }

    #[tokio::test]
    async fn test_unknown_command_closes_connection() {
        let (mut client, handle, _shutdown) = spawn_connection(echo_context());
        let frame = BinaryFrame::request(99, b"").encode().unwrap();
        client.write_all(&frame).await.unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(ServerError::Dispatch(DispatchError::UnknownCommand(99)))
        ));
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_short_frame_closes_connection() {
        let (mut client, handle, _shutdown) = spawn_connection(echo_context());
        client.write_all(&[1, 0, 0, 0, 1]).await.unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(ServerError::Dispatch(DispatchError::Protocol(
                ProtocolError::MissingCommandCode { len: 1 }
            )))
        ));
    }

    #[tokio::test]
    async fn test_violation_flushes_earlier_responses() {
        let (mut client, handle, _shutdown) = spawn_connection(echo_context());
        let mut input = highlight("lang:lua;a");
        input.extend_from_slice(&BinaryFrame::request(7, b"").encode().unwrap());
        client.write_all(&input).await.unwrap();

        assert!(handle.await.unwrap().is_err());
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert_eq!(split_responses(&out), vec!["lua:a"]);
    }

    #[tokio::test]
    async fn test_responses_in_request_order() {
        let (mut client, _handle, _shutdown) = spawn_connection(echo_context());
        let mut input = highlight("lang:lua;slow");
        input.extend_from_slice(&highlight("lang:lua;fast"));
        client.write_all(&input).await.unwrap();

        let out = finish(client).await;
        assert_eq!(split_responses(&out), vec!["lua:slow", "lua:fast"]);
    }

    #[tokio::test]
    async fn test_failed_request_keeps_connection_open() {
        let (mut client, handle, _shutdown) = spawn_connection(echo_context());
        let mut input = highlight("lang:missing;x");
        input.extend_from_slice(&highlight("lang:lua;panic"));
        input.extend_from_slice(&highlight("lang:lua;ok"));
        client.write_all(&input).await.unwrap();

        let out = finish(client).await;
        assert_eq!(split_responses(&out), vec!["lua:ok"]);
        assert_eq!(handle.await.unwrap().unwrap(), ConnectionOutcome::Closed);
    }

    #[tokio::test]
    async fn test_byte_at_a_time_delivery() {
        let (mut client, _handle, _shutdown) = spawn_connection(echo_context());
        for byte in highlight("lang:lua;héllo") {
            client.write_all(&[byte]).await.unwrap();
        }
        let out = finish(client).await;
        assert_eq!(split_responses(&out), vec!["lua:héllo"]);
    }

    #[tokio::test]
    async fn test_frame_too_large() {
        let ctx = echo_context().with_limits(LimitsConfig {
            max_pending_bytes: 8,
            ..Default::default()
        });
        let (mut client, handle, _shutdown) = spawn_connection(ctx);
        client.write_all(&highlight("lang:lua;too long")).await.unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(ServerError::Protocol(ProtocolError::FrameTooLarge { max: 8, .. }))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_closes_connection() {
        let (_client, handle, shutdown) = spawn_connection(echo_context());
        shutdown.send(()).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), ConnectionOutcome::Closed);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Arc::new(Server::new(ServerConfig::default(), echo_context()));
        assert!(!server.is_running());

        let running = Arc::clone(&server);
        let handle = tokio::spawn(async move { running.serve(listener).await });
        while !server.is_running() {
            tokio::task::yield_now().await;
        }

        server.shutdown();
        assert_eq!(handle.await.unwrap().unwrap(), RunOutcome::Shutdown);
        assert!(!server.is_running());
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:7411");
        assert_eq!(config.max_connections, 1000);
    }
}
