//! WebSocket session establishment and teardown.
//!
//! To open a session from the client side, build a [`WsClient`] and call
//! [`WsClient::connect`], or use the one-shot [`connect`]. On the server side
//! [`WsServer::serve`] runs an accept loop and hands every upgraded
//! [`Connection`] to a handler; [`accept`] runs the handshake on a single
//! transport.
//!
//! A [`Connection`] exposes frame level `read`/`write` and performs the
//! closing handshake in [`Connection::close`]; [`Connection::into_stream`]
//! turns it into a stream of frames that ends on the peer's close frame.
#![deny(rust_2018_idioms, unreachable_pub)]
#![warn(missing_debug_implementations)]

mod close;
mod connection;
mod handshake;
mod stream;

pub mod client;
pub mod error;
pub mod proto;
pub mod server;
pub mod transport;

pub use self::client::{connect, TcpConnection, WsClient, WsClientBuilder};
pub use self::close::CLOSE_TIMEOUT;
pub use self::connection::{Connection, State};
pub use self::error::{HandshakeError, ServerError, WsClientBuilderError, WsClientError, WsError};
pub use self::server::{accept, default_origin_check, OriginCheck, WsServer};
pub use self::stream::FrameStream;
pub use self::transport::Transport;

pub use wsconn_codec::ws::{CloseCode, CloseReason, Frame, OpCode};
pub use wsconn_codec::{h1, ws, Bytes, BytesMut, Decoder, Encoder};
