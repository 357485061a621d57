//! # glint-client
//!
//! Client library for glint.
//!
//! This crate provides:
//! - Async TCP connection speaking the binary length-prefixed protocol
//! - High-level highlight and exit calls

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
