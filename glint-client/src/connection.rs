//! Connection management.

use crate::error::ClientError;
use bytes::Bytes;
use glint_protocol::{BinaryFrame, LengthPrefixFramer};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout. The server sends nothing for a request it fails to
    /// render, so such requests end here.
    pub request_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

struct ConnectionState {
    stream: TcpStream,
    framer: LengthPrefixFramer,
}

/// A connection to a glint server.
///
/// Requests are serialized: each one holds the connection until its response
/// arrives, so responses always pair with the request that produced them.
pub struct Connection {
    config: ConnectionConfig,
    state: Mutex<Option<ConnectionState>>,
    connected: AtomicBool,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connects to the server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        tracing::debug!("Connecting to {}...", self.config.addr);

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;

        stream.set_nodelay(true).ok();

        *self.state.lock().await = Some(ConnectionState {
            stream,
            framer: LengthPrefixFramer::new(),
        });
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Sends `frame` and waits for the next response payload.
    ///
    /// A timeout drops the connection, since a late response would be
    /// mistaken for the answer to a later request.
    pub async fn request(&self, frame: &BinaryFrame) -> Result<Bytes, ClientError> {
        let encoded = frame.encode()?;
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or(ClientError::NotConnected)?;

        tracing::debug!("Sending request ({} bytes)", encoded.len());
        let exchange = exchange(state, &encoded, self.config.read_buffer_size);
        let result = match tokio::time::timeout(self.config.request_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout),
        };

        if matches!(
            result,
            Err(ClientError::Timeout | ClientError::ConnectionClosed | ClientError::Io(_))
        ) {
            *guard = None;
            self.connected.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Sends `frame` without waiting for a response.
    pub async fn send(&self, frame: &BinaryFrame) -> Result<(), ClientError> {
        let encoded = frame.encode()?;
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or(ClientError::NotConnected)?;
        state.stream.write_all(&encoded).await?;
        state.stream.flush().await?;
        Ok(())
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut state) = self.state.lock().await.take() {
            let _ = state.stream.shutdown().await;
        }
        Ok(())
    }
}

async fn exchange(
    state: &mut ConnectionState,
    request: &[u8],
    read_buffer_size: usize,
) -> Result<Bytes, ClientError> {
    state.stream.write_all(request).await?;

    let mut buf = vec![0u8; read_buffer_size];
    loop {
        if let Some(payload) = state.framer.try_extract_payload()? {
            tracing::debug!("Received response ({} bytes)", payload.len());
            return Ok(payload);
        }

        let n = state.stream.read(&mut buf).await?;
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        state.framer.extend(&buf[..n]);
    }
}
