//! Closing handshake.
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use wsconn_codec::ws::{CloseReason, Frame};

use crate::connection::{Connection, State};
use crate::error::WsError;

/// How long `close` waits for the peer's close frame
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Perform closing handshake.
    ///
    /// Sends close frame and waits for the peer's close frame, both steps
    /// together take at most [`CLOSE_TIMEOUT`]. Transport is released whatever the outcome, an
    /// elapsed timeout is not an error. Closing a closed connection is a
    /// no-op.
    pub async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), WsError> {
        let result = match self.state {
            State::Closed => return Ok(()),
            State::ClosingLocal => Ok(()),
            State::Open => self.closing_handshake(reason).await,
        };

        self.teardown().await;
        log::trace!("{}: Connection is closed", self.tag);
        result
    }

    async fn closing_handshake(&mut self, reason: Option<CloseReason>) -> Result<(), WsError> {
        // sending the close frame shares the deadline, peer may not read at all
        let fut = async {
            // codec has already sent close frame via `write`
            if !self.codec.is_closed() {
                log::trace!("{}: Sending close frame {:?}", self.tag, reason);
                self.write(Frame::close(reason)).await?;
            }
            self.state = State::ClosingLocal;
            self.wait_for_close().await
        };

        match tokio::time::timeout(CLOSE_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => {
                log::debug!(
                    "{}: Peer did not complete closing handshake in {:?}",
                    self.tag,
                    CLOSE_TIMEOUT
                );
                Ok(())
            }
        }
    }

    async fn wait_for_close(&mut self) -> Result<(), WsError> {
        loop {
            let frame = self.read().await?;
            if frame.is_close() {
                log::trace!(
                    "{}: Received close frame {:?}",
                    self.tag,
                    frame.close_reason()
                );
                return Ok(());
            }
            log::debug!(
                "{}: Unexpected {} frame while closing, ignore",
                self.tag,
                frame.opcode
            );
        }
    }
}
