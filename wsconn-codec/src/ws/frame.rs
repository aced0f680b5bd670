use ntex_bytes::{Bytes, BytesMut};

use super::mask::apply_mask;
use super::proto::{CloseCode, CloseReason, OpCode};
use super::ProtocolError;

/// Max payload size of a control frame
const MAX_CONTROL_PAYLOAD: usize = 125;

/// WebSocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: OpCode,
    pub fin: bool,
    pub payload: Bytes,
}

impl Frame {
    /// Create new frame
    pub fn new<T: Into<Bytes>>(opcode: OpCode, fin: bool, payload: T) -> Frame {
        Frame {
            opcode,
            fin,
            payload: payload.into(),
        }
    }

    /// Final text frame, codec does not verify utf8 encoding
    pub fn text<T: Into<Bytes>>(payload: T) -> Frame {
        Frame::new(OpCode::Text, true, payload)
    }

    /// Final binary frame
    pub fn binary<T: Into<Bytes>>(payload: T) -> Frame {
        Frame::new(OpCode::Binary, true, payload)
    }

    pub fn ping<T: Into<Bytes>>(payload: T) -> Frame {
        Frame::new(OpCode::Ping, true, payload)
    }

    pub fn pong<T: Into<Bytes>>(payload: T) -> Frame {
        Frame::new(OpCode::Pong, true, payload)
    }

    /// Final close frame.
    ///
    /// Without a reason the frame has no payload, otherwise the payload is
    /// the big-endian close code followed by the utf8 description.
    pub fn close(reason: Option<CloseReason>) -> Frame {
        let payload = if let Some(reason) = reason {
            let code: u16 = reason.code.into();
            let description = reason.description.unwrap_or_default();
            let mut payload = Vec::with_capacity(2 + description.len());
            payload.extend_from_slice(&code.to_be_bytes());
            payload.extend_from_slice(description.as_bytes());
            Bytes::from(payload)
        } else {
            Bytes::new()
        };
        Frame::new(OpCode::Close, true, payload)
    }

    pub fn is_close(&self) -> bool {
        self.opcode == OpCode::Close
    }

    /// Parse close code and description of a close frame.
    pub fn close_reason(&self) -> Option<CloseReason> {
        if !self.is_close() || self.payload.len() < 2 {
            return None;
        }
        let code = CloseCode::from(u16::from_be_bytes([self.payload[0], self.payload[1]]));
        let description = if self.payload.len() > 2 {
            Some(String::from_utf8_lossy(&self.payload[2..]).into_owned())
        } else {
            None
        };
        Some(CloseReason { code, description })
    }
}

/// Frame header parser and writer
#[derive(Debug)]
pub struct Parser;

impl Parser {
    /// Parse one frame from `src`.
    ///
    /// `server` selects which side of the connection decodes: servers require
    /// masked frames, clients reject them.
    pub fn parse(
        src: &mut BytesMut,
        server: bool,
        max_size: usize,
    ) -> Result<Option<Frame>, ProtocolError> {
        if src.len() < 2 {
            return Ok(None);
        }
        let first = src[0];
        let second = src[1];

        let fin = first & 0x80 != 0;
        if first & 0x70 != 0 {
            return Err(ProtocolError::ReservedBits);
        }
        let opcode =
            OpCode::from_u8(first & 0x0F).ok_or(ProtocolError::InvalidOpcode(first & 0x0F))?;

        // check masking
        let masked = second & 0x80 != 0;
        if !masked && server {
            return Err(ProtocolError::UnmaskedFrame);
        } else if masked && !server {
            return Err(ProtocolError::MaskedFrame);
        }

        let (len, idx) = match second & 0x7F {
            126 => {
                if src.len() < 4 {
                    return Ok(None);
                }
                (u16::from_be_bytes([src[2], src[3]]) as usize, 4)
            }
            127 => {
                if src.len() < 10 {
                    return Ok(None);
                }
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&src[2..10]);
                let len = usize::try_from(u64::from_be_bytes(buf))
                    .map_err(|_| ProtocolError::Overflow)?;
                (len, 10)
            }
            len => (len as usize, 2),
        };

        if opcode.is_control() {
            if len > MAX_CONTROL_PAYLOAD {
                return Err(ProtocolError::InvalidLength(len));
            }
            if !fin {
                return Err(ProtocolError::FragmentedControl);
            }
        }
        if len > max_size {
            return Err(ProtocolError::Overflow);
        }

        let mask_len = if masked { 4 } else { 0 };
        if src.len() < idx + mask_len + len {
            return Ok(None);
        }

        let _ = src.split_to(idx);
        let mask = if masked {
            let mask = [src[0], src[1], src[2], src[3]];
            let _ = src.split_to(4);
            Some(mask)
        } else {
            None
        };

        let payload = src.split_to(len);
        let payload = if let Some(mask) = mask {
            let mut data = payload.to_vec();
            apply_mask(&mut data, mask);
            Bytes::from(data)
        } else {
            payload.freeze()
        };

        log::trace!("Decoded {opcode} frame, fin: {fin}, payload: {len}");
        Ok(Some(Frame {
            opcode,
            fin,
            payload,
        }))
    }

    /// Write frame header and payload to `dst`, masking with a random key
    /// when `mask` is set.
    pub fn write(dst: &mut BytesMut, frame: &Frame, mask: bool) {
        let len = frame.payload.len();
        let first = (if frame.fin { 0x80 } else { 0 }) | frame.opcode.as_u8();
        let mask_bit = if mask { 0x80 } else { 0 };

        dst.reserve(len + 14);
        if len < 126 {
            dst.extend_from_slice(&[first, mask_bit | len as u8]);
        } else if len <= 65_535 {
            dst.extend_from_slice(&[first, mask_bit | 126]);
            dst.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            dst.extend_from_slice(&[first, mask_bit | 127]);
            dst.extend_from_slice(&(len as u64).to_be_bytes());
        }

        if mask {
            let key: [u8; 4] = rand::random();
            let mut data = frame.payload.to_vec();
            apply_mask(&mut data, key);
            dst.extend_from_slice(&key);
            dst.extend_from_slice(&data);
        } else {
            dst.extend_from_slice(&frame.payload);
        }
    }
}
