//! Server error types.

use thiserror::Error;

/// Errors that end a connection or stream.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] glint_protocol::ProtocolError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("response writer closed")]
    WriterClosed,
}

/// Binary-protocol violations. Each one closes the connection.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown command code: {0}")]
    UnknownCommand(u16),

    #[error(transparent)]
    Protocol(#[from] glint_protocol::ProtocolError),
}

/// Header-frame requests that are dropped without a response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("unknown route: {0}")]
    UnknownRoute(String),

    #[error("missing $length header")]
    MissingLength,

    #[error("invalid $length header: {0:?}")]
    InvalidLength(String),
}
