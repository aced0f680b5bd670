//! Upgraded websocket connection.
use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use wsconn_codec::ws::{Codec, Frame};
use wsconn_codec::{BytesMut, Decoder, Encoder};

use crate::error::WsError;
use crate::handshake::READ_CHUNK;

/// Connection lifecycle, strictly monotonic
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Open,
    /// Local close frame has been sent
    ClosingLocal,
    Closed,
}

/// Websocket connection
///
/// Owns the input and the output channel of the upgraded transport. The
/// connection is not synchronized, `read` and `write` take `&mut self`.
///
/// Failed channels are released on a background task, so `read`, `write`
/// and `close` must run inside a tokio runtime.
pub struct Connection<R, W> {
    pub(crate) reader: Option<R>,
    pub(crate) writer: Option<W>,
    pub(crate) codec: Codec,
    read_buf: BytesMut,
    write_buf: BytesMut,
    pub(crate) state: State,
    pub(crate) tag: &'static str,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Create connection over already upgraded channels
    pub fn new(reader: R, writer: W, codec: Codec) -> Self {
        let tag = if codec.is_server() {
            "WS-SERVER"
        } else {
            "WS-CLIENT"
        };
        Self::with_buffer(reader, writer, codec, BytesMut::new(), tag)
    }

    /// `read_buf` holds bytes that arrived together with the handshake
    pub(crate) fn with_buffer(
        reader: R,
        writer: W,
        codec: Codec,
        read_buf: BytesMut,
        tag: &'static str,
    ) -> Self {
        Connection {
            codec,
            read_buf,
            tag,
            reader: Some(reader),
            writer: Some(writer),
            write_buf: BytesMut::with_capacity(READ_CHUNK),
            state: State::Open,
        }
    }

    /// Read next frame.
    ///
    /// On failure the input channel gets closed in the background.
    pub async fn read(&mut self) -> Result<Frame, WsError> {
        match self.read_frame().await {
            Ok(frame) => Ok(frame),
            Err(err) => {
                log::trace!("{}: Read failed: {err}", self.tag);
                self.spawn_close_reader();
                Err(err)
            }
        }
    }

    async fn read_frame(&mut self) -> Result<Frame, WsError> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(WsError::Closed);
        };

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.codec.decode(&mut self.read_buf)? {
                log::trace!("{}: Received {} frame", self.tag, frame.opcode);
                return Ok(frame);
            }

            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                return Err(WsError::Disconnected);
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Encode and send frame to the peer.
    ///
    /// On failure the output channel gets closed in the background.
    pub async fn write(&mut self, frame: Frame) -> Result<(), WsError> {
        match self.write_frame(frame).await {
            Ok(()) => Ok(()),
            Err(err) => {
                log::trace!("{}: Write failed: {err}", self.tag);
                self.spawn_close_writer();
                Err(err)
            }
        }
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<(), WsError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(WsError::Closed);
        };
        log::trace!("{}: Sending {} frame", self.tag, frame.opcode);

        self.write_buf.clear();
        self.codec.encode(frame, &mut self.write_buf)?;
        writer.write_all(&self.write_buf).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Close the output channel, subsequent calls do nothing.
    pub async fn close_transport(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.shutdown().await {
                log::trace!("{}: Output channel shutdown failed: {err}", self.tag);
            }
            log::trace!("{}: Output channel is closed", self.tag);
        }
    }

    /// Release both channels
    pub(crate) async fn teardown(&mut self) {
        self.close_transport().await;
        if self.reader.take().is_some() {
            log::trace!("{}: Input channel is closed", self.tag);
        }
        self.state = State::Closed;
    }

    fn spawn_close_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            let tag = self.tag;
            tokio::spawn(async move {
                drop(reader);
                log::trace!("{tag}: Input channel is closed");
            });
        }
    }

    fn spawn_close_writer(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let tag = self.tag;
            tokio::spawn(async move {
                let _ = writer.shutdown().await;
                log::trace!("{tag}: Output channel is closed");
            });
        }
    }
}

impl<R, W> Connection<R, W> {
    pub fn state(&self) -> State {
        self.state
    }

    /// Check if both channels are released
    pub fn is_closed(&self) -> bool {
        self.reader.is_none() && self.writer.is_none()
    }

    /// Log prefix of this connection
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// Frame codec of this connection
    pub fn codec(&self) -> &Codec {
        &self.codec
    }
}

impl<R, W> fmt::Debug for Connection<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("tag", &self.tag)
            .field("state", &self.state)
            .field("input", &self.reader.is_some())
            .field("output", &self.writer.is_some())
            .finish()
    }
}
