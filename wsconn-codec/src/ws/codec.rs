use std::cell::Cell;

use ntex_bytes::BytesMut;
use ntex_codec::{Decoder, Encoder};

use super::frame::{Frame, Parser};
use super::ProtocolError;

/// Default max frame payload size
pub const MAX_SIZE: usize = 65_536;

#[derive(Debug, Clone)]
/// `WebSockets` protocol codec
pub struct Codec {
    flags: Cell<Flags>,
    max_size: usize,
}

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    struct Flags: u8 {
        const SERVER = 0b0000_0001;
        const CLOSED = 0b0000_0010;
    }
}

impl Codec {
    /// Create new websocket frames codec
    pub fn new() -> Codec {
        Codec {
            max_size: MAX_SIZE,
            flags: Cell::new(Flags::SERVER),
        }
    }

    /// Set max frame size
    ///
    /// By default max size is set to 64kb
    pub fn max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set codec to client mode.
    ///
    /// By default codec works in server mode. Client mode masks outgoing
    /// frames and rejects masked incoming frames.
    pub fn client_mode(self) -> Self {
        self.remove_flags(Flags::SERVER);
        self
    }

    /// Check if codec works in server mode
    pub fn is_server(&self) -> bool {
        self.flags.get().contains(Flags::SERVER)
    }

    /// Check if codec encoded `Close` frame
    pub fn is_closed(&self) -> bool {
        self.flags.get().contains(Flags::CLOSED)
    }

    fn insert_flags(&self, f: Flags) {
        let mut flags = self.flags.get();
        flags.insert(f);
        self.flags.set(flags);
    }

    fn remove_flags(&self, f: Flags) {
        let mut flags = self.flags.get();
        flags.remove(f);
        self.flags.set(flags);
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for Codec {
    type Item = Frame;
    type Error = ProtocolError;

    fn encode(&self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.opcode.is_control() {
            if item.payload.len() > 125 {
                return Err(ProtocolError::InvalidLength(item.payload.len()));
            }
            if !item.fin {
                return Err(ProtocolError::FragmentedControl);
            }
        }
        if item.is_close() {
            self.insert_flags(Flags::CLOSED);
        }
        Parser::write(dst, &item, !self.is_server());
        Ok(())
    }
}

impl Decoder for Codec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Parser::parse(src, self.is_server(), self.max_size)
    }
}

#[cfg(test)]
mod tests {
    use ntex_bytes::Bytes;

    use super::*;
    use crate::ws::{CloseCode, OpCode};

    #[test]
    fn test_client_to_server() {
        let client = Codec::new().client_mode();
        let server = Codec::new();
        assert!(!client.is_server());
        assert!(server.is_server());

        let mut buf = BytesMut::new();
        client
            .encode(Frame::text(Bytes::from_static(b"test")), &mut buf)
            .unwrap();
        // masked
        assert_eq!(buf[1], 0x80 | 4);
        assert_eq!(buf.len(), 2 + 4 + 4);

        let frame = server.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, Frame::text(Bytes::from_static(b"test")));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_server_frames_are_not_masked() {
        let server = Codec::new();
        let mut buf = BytesMut::new();
        server
            .encode(Frame::text(Bytes::from_static(b"test")), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"\x81\x04test");

        // client rejects masked frames, server rejects unmasked ones
        assert_eq!(server.decode(&mut buf), Err(ProtocolError::UnmaskedFrame));
        let client = Codec::new().client_mode();
        assert_eq!(
            client.decode(&mut buf).unwrap().unwrap().opcode,
            OpCode::Text
        );
    }

    #[test]
    fn test_close_flag() {
        let codec = Codec::new();
        let mut buf = BytesMut::new();
        assert!(!codec.is_closed());
        codec
            .encode(Frame::close(Some(CloseCode::Normal.into())), &mut buf)
            .unwrap();
        assert!(codec.is_closed());
        assert_eq!(&buf[..], b"\x88\x02\x03\xe8");
    }

    #[test]
    fn test_invalid_control_frames() {
        let codec = Codec::new();
        let mut buf = BytesMut::new();
        assert_eq!(
            codec.encode(Frame::ping(vec![0u8; 126]), &mut buf),
            Err(ProtocolError::InvalidLength(126))
        );
        assert_eq!(
            codec.encode(Frame::new(OpCode::Pong, false, Bytes::new()), &mut buf),
            Err(ProtocolError::FragmentedControl)
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_max_size() {
        let codec = Codec::new().client_mode().max_size(3);
        let mut buf = BytesMut::new();
        Codec::new()
            .encode(Frame::binary(Bytes::from_static(b"1234")), &mut buf)
            .unwrap();
        assert_eq!(codec.decode(&mut buf), Err(ProtocolError::Overflow));
    }

    fn pass_through<C>(enc: &C, dec: &C, item: <C as ntex_codec::Encoder>::Item) -> Option<<C as ntex_codec::Decoder>::Item>
    where
        C: ntex_codec::Encoder<Item = Frame> + ntex_codec::Decoder<Item = Frame>,
    {
        let mut buf = BytesMut::new();
        enc.encode(item, &mut buf).ok()?;
        dec.decode(&mut buf).ok()?
    }

    #[test]
    fn test_generic_codec() {
        let client = Codec::new().client_mode();
        let server = Codec::new();
        assert_eq!(
            pass_through(&client, &server, Frame::ping("p")),
            Some(Frame::ping("p"))
        );
        assert_eq!(
            pass_through(&server, &client, Frame::text("t")),
            Some(Frame::text("t"))
        );
        // unmasked frame is rejected by the server side
        assert_eq!(pass_through(&server, &server, Frame::text("t")), None);
    }
}
