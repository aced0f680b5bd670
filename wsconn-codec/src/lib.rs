//! Codecs used by `wsconn` during and after the opening handshake.
//!
//! * [`ws`] encodes and decodes individual RFC 6455 frames, including
//!   masking.
//! * [`h1`] encodes and decodes HTTP/1.1 request and response heads.
#![deny(rust_2018_idioms, unreachable_pub)]
#![warn(missing_debug_implementations)]

pub mod h1;
pub mod ws;

pub use ntex_codec::{Decoder, Encoder};

pub use ntex_bytes::{Bytes, BytesMut};
