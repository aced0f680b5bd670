//! Stream of incoming frames.
use std::{fmt, pin::Pin, task::Context, task::Poll};

use futures_core::future::BoxFuture;
use futures_core::Stream;
use tokio::io::{AsyncRead, AsyncWrite};
use wsconn_codec::ws::Frame;

use crate::connection::Connection;
use crate::error::WsError;

type ReadResult<R, W> = (Connection<R, W>, Result<Frame, WsError>);

/// Stream of application frames read from a [`Connection`].
///
/// Ends on the peer's close frame, a read error is yielded once and ends
/// the stream as well.
pub struct FrameStream<R, W> {
    state: StreamState<R, W>,
}

enum StreamState<R, W> {
    Idle(Connection<R, W>),
    Reading(BoxFuture<'static, ReadResult<R, W>>),
    Done(Option<Connection<R, W>>),
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Convert connection into a stream of frames
    pub fn into_stream(self) -> FrameStream<R, W> {
        FrameStream {
            state: StreamState::Idle(self),
        }
    }
}

impl<R, W> FrameStream<R, W> {
    /// Get back underlying connection.
    ///
    /// Returns `None` if a read is still in flight.
    pub fn into_inner(self) -> Option<Connection<R, W>> {
        match self.state {
            StreamState::Idle(conn) => Some(conn),
            StreamState::Done(conn) => conn,
            StreamState::Reading(_) => None,
        }
    }
}

impl<R, W> Stream for FrameStream<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Item = Result<Frame, WsError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.as_mut().get_mut();
        loop {
            match std::mem::replace(&mut this.state, StreamState::Done(None)) {
                StreamState::Idle(mut conn) => {
                    this.state = StreamState::Reading(Box::pin(async move {
                        let result = conn.read().await;
                        (conn, result)
                    }));
                }
                StreamState::Reading(mut fut) => {
                    return match fut.as_mut().poll(cx) {
                        Poll::Pending => {
                            this.state = StreamState::Reading(fut);
                            Poll::Pending
                        }
                        Poll::Ready((conn, Ok(frame))) if frame.is_close() => {
                            log::trace!("{}: Peer closed frame stream", conn.tag());
                            this.state = StreamState::Done(Some(conn));
                            Poll::Ready(None)
                        }
                        Poll::Ready((conn, Ok(frame))) => {
                            this.state = StreamState::Idle(conn);
                            Poll::Ready(Some(Ok(frame)))
                        }
                        Poll::Ready((conn, Err(err))) => {
                            this.state = StreamState::Done(Some(conn));
                            Poll::Ready(Some(Err(err)))
                        }
                    };
                }
                StreamState::Done(conn) => {
                    this.state = StreamState::Done(conn);
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl<R, W> fmt::Debug for FrameStream<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            StreamState::Idle(_) => "Idle",
            StreamState::Reading(_) => "Reading",
            StreamState::Done(_) => "Done",
        };
        f.debug_struct("FrameStream").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;
    use wsconn_codec::ws::{Codec, Parser};
    use wsconn_codec::BytesMut;

    use super::*;

    #[tokio::test]
    async fn test_stream_ends_on_close() {
        let (io, mut peer) = tokio::io::duplex(1024);
        let (r, w) = tokio::io::split(io);
        let conn = Connection::new(r, w, Codec::new().client_mode());

        let mut buf = BytesMut::new();
        Parser::write(&mut buf, &Frame::text("a"), false);
        Parser::write(&mut buf, &Frame::close(None), false);
        peer.write_all(&buf).await.unwrap();

        let mut stream = conn.into_stream();
        assert_eq!(stream.next().await.unwrap().unwrap(), Frame::text("a"));
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
        assert!(stream.into_inner().is_some());
    }

    #[tokio::test]
    async fn test_stream_yields_error_once() {
        let (io, peer) = tokio::io::duplex(1024);
        let (r, w) = tokio::io::split(io);
        let conn = Connection::new(r, w, Codec::new().client_mode());
        drop(peer);

        let mut stream = conn.into_stream();
        assert!(matches!(
            stream.next().await,
            Some(Err(WsError::Disconnected))
        ));
        assert!(stream.next().await.is_none());
    }
}
