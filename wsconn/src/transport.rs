//! Byte transports the handshakes run over.
use std::io;

use socket2::SockRef;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadHalf, WriteHalf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Bidirectional byte stream that splits into an input and an output channel
pub trait Transport: Sized {
    /// Input channel
    type Read: AsyncRead + Unpin + Send + 'static;
    /// Output channel
    type Write: AsyncWrite + Unpin + Send + 'static;

    /// Raw socket, if the transport has one.
    fn socket(&self) -> Option<SockRef<'_>> {
        None
    }

    /// Split into independently owned channels.
    fn split(self) -> (Self::Read, Self::Write);
}

impl Transport for TcpStream {
    type Read = OwnedReadHalf;
    type Write = OwnedWriteHalf;

    fn socket(&self) -> Option<SockRef<'_>> {
        Some(SockRef::from(self))
    }

    fn split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
        self.into_split()
    }
}

impl Transport for DuplexStream {
    type Read = ReadHalf<DuplexStream>;
    type Write = WriteHalf<DuplexStream>;

    fn split(self) -> (Self::Read, Self::Write) {
        tokio::io::split(self)
    }
}

/// Opens a TCP connection to a remote host.
pub async fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<TcpStream> {
    TcpStream::connect(addr).await
}

/// Best-effort low latency tuning, disables Nagle's algorithm.
pub(crate) fn tune<T: Transport>(io: &T, tag: &str) {
    if let Some(sock) = io.socket() {
        if let Err(err) = sock.set_nodelay(true) {
            log::debug!("{tag}: Cannot set TCP_NODELAY: {err}");
        }
    } else {
        log::trace!("{tag}: Transport has no raw socket, skip tuning");
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn test_tcp_tuning() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = connect(addr).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();

        tune(&stream, "TEST");
        assert!(stream.nodelay().unwrap());

        tune(&accepted, "TEST");
        assert!(accepted.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_duplex_has_no_socket() {
        let (io, _peer) = tokio::io::duplex(64);
        assert!(io.socket().is_none());
        // no-op, must not panic
        tune(&io, "TEST");
    }
}
