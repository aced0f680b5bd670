//! WebSocket frame codec.
mod codec;
mod error;
mod frame;
mod mask;
mod proto;

pub use self::codec::{Codec, MAX_SIZE};
pub use self::error::ProtocolError;
pub use self::frame::{Frame, Parser};
pub use self::proto::{CloseCode, CloseReason, OpCode};
