//! Reading and writing http heads during the opening handshake.
use std::{fmt, io};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use wsconn_codec::h1::Decoded;
use wsconn_codec::{BytesMut, Decoder, Encoder};

pub(crate) const READ_CHUNK: usize = 4096;

/// Read one http message head from `reader`.
///
/// Bytes following the head are left in `buf`.
pub(crate) async fn read_head<R, D>(
    reader: &mut R,
    buf: &mut BytesMut,
    codec: &D,
) -> io::Result<Decoded<D::Item>>
where
    R: AsyncRead + Unpin,
    D: Decoder,
    D::Error: fmt::Display,
{
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match codec.decode(buf) {
            Ok(Some(item)) => return Ok(Decoded::Message(item)),
            Ok(None) => (),
            Err(err) => return Ok(Decoded::Invalid(err.to_string())),
        }

        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(Decoded::EndOfInput);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Encode http messages and write them to `writer`.
pub(crate) async fn send<W, E, I>(writer: &mut W, codec: &E, items: I) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    E: Encoder<Error = io::Error>,
    I: IntoIterator<Item = E::Item>,
{
    let mut buf = BytesMut::new();
    for item in items {
        codec.encode(item, &mut buf)?;
    }
    writer.write_all(&buf).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use wsconn_codec::h1;

    use super::*;

    #[tokio::test]
    async fn test_read_head() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\nextra")
            .await
            .unwrap();

        let mut buf = BytesMut::new();
        let res = read_head(&mut server, &mut buf, &h1::Codec).await.unwrap();
        match res {
            Decoded::Message(req) => assert_eq!(req.header(http::header::HOST), Some("localhost")),
            _ => panic!(),
        }
        assert_eq!(&buf[..], b"extra");
    }

    #[tokio::test]
    async fn test_read_head_eof_and_invalid() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        drop(client);

        let mut buf = BytesMut::new();
        let res = read_head(&mut server, &mut buf, &h1::Codec).await.unwrap();
        assert!(matches!(res, Decoded::EndOfInput));

        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"\x00\x01garbage\r\n\r\n").await.unwrap();

        let mut buf = BytesMut::new();
        let res = read_head(&mut server, &mut buf, &h1::Codec).await.unwrap();
        assert!(matches!(res, Decoded::Invalid(_)));
    }
}
