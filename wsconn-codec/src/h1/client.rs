use http::StatusCode;
use ntex_bytes::BytesMut;
use ntex_codec::{Decoder, Encoder};

use super::{convert_headers, version, version_str, write_headers};
use super::{DecodeError, Message, RequestHead, ResponseHead, MAX_HEADERS, MAX_HEAD_SIZE};

#[derive(Debug, Default)]
/// HTTP/1 client codec, encodes requests and decodes response heads
pub struct ClientCodec;

impl Decoder for ClientCodec {
    type Item = ResponseHead;
    type Error = DecodeError;

    fn decode(&self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (len, head) = {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut res = httparse::Response::new(&mut headers);

            match res.parse(&src[..])? {
                httparse::Status::Complete(len) => {
                    let status = StatusCode::from_u16(res.code.unwrap_or_default())
                        .map_err(|_| DecodeError::Status)?;
                    let head = ResponseHead {
                        status,
                        version: version(res.version),
                        reason: res.reason.map(ToOwned::to_owned),
                        headers: convert_headers(res.headers)?,
                    };
                    (len, head)
                }
                httparse::Status::Partial => {
                    return if src.len() >= MAX_HEAD_SIZE {
                        log::debug!("MAX_HEAD_SIZE unprocessed data reached, closing");
                        Err(DecodeError::TooLarge(src.len()))
                    } else {
                        Ok(None)
                    };
                }
            }
        };

        let _ = src.split_to(len);
        Ok(Some(head))
    }
}

impl Encoder for ClientCodec {
    type Item = Message<RequestHead>;
    type Error = std::io::Error;

    fn encode(&self, item: Self::Item, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Item(head) => {
                let path = head
                    .uri
                    .path_and_query()
                    .map(|p| p.as_str())
                    .filter(|p| !p.is_empty())
                    .unwrap_or("/");
                dst.extend_from_slice(head.method.as_str().as_bytes());
                dst.extend_from_slice(b" ");
                dst.extend_from_slice(path.as_bytes());
                dst.extend_from_slice(b" ");
                dst.extend_from_slice(version_str(head.version));
                dst.extend_from_slice(b"\r\n");
                write_headers(&head.headers, dst);
            }
            Message::Chunk(data) => dst.extend_from_slice(&data),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use http::header::{self, HeaderValue};
    use http::{Uri, Version};

    use super::*;

    #[test]
    fn test_encode_request() {
        let mut head = RequestHead {
            uri: Uri::from_static("ws://localhost:8080/chat?id=1"),
            ..Default::default()
        };
        head.headers
            .insert(header::HOST, HeaderValue::from_static("localhost:8080"));
        head.headers
            .insert(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));

        let mut buf = BytesMut::new();
        ClientCodec.encode(head.into(), &mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &b"GET /chat?id=1 HTTP/1.1\r\nHost: localhost:8080\r\nSec-WebSocket-Version: 13\r\n\r\n"[..]
        );
    }

    #[test]
    fn test_decode_response() {
        let mut buf = BytesMut::from(
            &b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n\x81\x01a"[..],
        );
        let res = ClientCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(res.status, StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(res.version, Version::HTTP_11);
        assert_eq!(res.reason(), "Switching Protocols");
        assert_eq!(res.header(header::UPGRADE), Some("websocket"));
        assert!(res.upgrade());
        assert_eq!(&buf[..], b"\x81\x01a");
    }

    #[test]
    fn test_decode_partial_and_invalid() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 101 Switching"[..]);
        assert!(ClientCodec.decode(&mut buf).unwrap().is_none());

        let mut buf = BytesMut::from(&b"HTTP/1.1 abc Nope\r\n\r\n"[..]);
        assert!(ClientCodec.decode(&mut buf).is_err());

        let mut buf = BytesMut::from(&b"HTTP/1.0 200 OK\r\n\r\n"[..]);
        let res = ClientCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(res.version, Version::HTTP_10);
        assert_eq!(res.status, StatusCode::OK);
    }
}
