//! # glint-server
//!
//! Transports for the glint highlighting service.
//!
//! This crate provides:
//! - A TCP server speaking the binary length-prefixed protocol
//! - A stdio loop speaking the header-block protocol
//! - Command dispatch and request routing onto a [`glint_highlight::Highlighter`]
//! - Per-stream ordered response queues
//! - YAML configuration with environment overrides

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod pipe;
pub mod responder;
pub mod router;
pub mod server;

pub use config::{Config, ConfigError, HighlightConfig, LimitsConfig, NetworkConfig};
pub use context::{ServerStats, ServiceContext};
pub use dispatch::{Command, CommandDispatcher, HighlightRequest};
pub use error::{DispatchError, RouteError, ServerError};
pub use pipe::serve_pipe;
pub use responder::{response_queue, ResponseQueue};
pub use router::{RequestRouter, Route, RoutedRequest};
pub use server::{serve_binary, ConnectionOutcome, RunOutcome, Server, ServerConfig};
