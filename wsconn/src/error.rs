//! Handshake, client and connection errors.
use std::io;

use thiserror::Error;

pub use wsconn_codec::ws::ProtocolError;

/// Opening handshake failures, shared by client and server
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// Malformed http message or http error status
    #[error("Http error: {0}")]
    Http(String),
    /// Well-formed http exchange that violates websocket upgrade rules
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// Peer closed the transport before a complete message was received
    #[error("Peer closed connection before handshake completed")]
    EndOfInput,
    #[error("Io error: {0}")]
    Io(#[from] io::Error),
}

/// Websocket client builder error
#[derive(Error, Debug)]
pub enum WsClientBuilderError {
    #[error("Missing url scheme")]
    MissingScheme,
    #[error("Unknown url scheme")]
    UnknownScheme,
    #[error("Missing host name")]
    MissingHost,
    /// `finish` has already been called
    #[error("Builder has been consumed")]
    Reused,
    #[error("Url parse error: {0}")]
    Http(#[from] http::Error),
}

/// Websocket client error
#[derive(Error, Debug)]
pub enum WsClientError {
    #[error("{0}")]
    Builder(#[from] WsClientBuilderError),
    /// Failed to connect to host
    #[error("Failed to connect to host: {0}")]
    Connect(io::Error),
    /// Connect and handshake took too long
    #[error("Timeout out while waiting for response")]
    Timeout,
    #[error("{0}")]
    Handshake(#[from] HandshakeError),
}

/// Connection level errors
#[derive(Error, Debug)]
pub enum WsError {
    /// Frame codec error
    #[error("{0}")]
    Protocol(#[from] ProtocolError),
    #[error("Io error: {0}")]
    Io(#[from] io::Error),
    /// Peer has closed the transport
    #[error("Peer has been disconnected")]
    Disconnected,
    /// Channel has already been closed locally
    #[error("Connection is closed")]
    Closed,
}

/// Errors reported by the server loop to its error hook
#[derive(Error, Debug)]
pub enum ServerError {
    /// Listener failed to accept a connection
    #[error("Accept error: {0}")]
    Accept(io::Error),
    /// Handshake did not complete in time
    #[error("Handshake timeout")]
    Timeout,
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    /// Connection handler returned an error
    #[error("Handler error: {0}")]
    Handler(#[from] WsError),
}
