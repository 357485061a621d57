//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use glint_protocol::{BinaryFrame, CMD_EXIT, CMD_HIGHLIGHT};
use std::net::SocketAddr;

/// High-level client for glint.
pub struct Client {
    conn: Connection,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Connection::new(config),
        }
    }

    /// Connects to `addr` with default settings.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        Self::connect_with(ConnectionConfig::new(addr)).await
    }

    /// Connects using `config`.
    pub async fn connect_with(config: ConnectionConfig) -> Result<Self, ClientError> {
        let client = Self::new(config);
        client.conn.connect().await?;
        Ok(client)
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Highlights `code` and returns the HTML.
    ///
    /// Without a language the server default applies. Code that itself
    /// starts with `lang:` needs an explicit language to be read verbatim.
    pub async fn highlight(&self, language: Option<&str>, code: &str) -> Result<String, ClientError> {
        let argument = highlight_argument(language, code);
        let frame = BinaryFrame::request(CMD_HIGHLIGHT, argument.as_bytes());
        let payload = self.conn.request(&frame).await?;
        String::from_utf8(payload.to_vec()).map_err(|_| ClientError::InvalidUtf8)
    }

    /// Sends the exit command, which stops the server process, and closes
    /// the connection.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        tracing::debug!("Sending exit command");
        self.conn.send(&BinaryFrame::request(CMD_EXIT, &[])).await?;
        self.conn.close().await
    }
}

fn highlight_argument(language: Option<&str>, code: &str) -> String {
    match language {
        Some(language) => format!("lang:{};{}", language, code),
        None => code.to_string(),
    }
}
