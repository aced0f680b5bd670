use http::{Method, Uri};
use ntex_bytes::BytesMut;
use ntex_codec::{Decoder, Encoder};

use super::{convert_headers, version, version_str, write_headers};
use super::{DecodeError, Message, RequestHead, ResponseHead, MAX_HEADERS, MAX_HEAD_SIZE};

#[derive(Debug, Default)]
/// HTTP/1 server codec, decodes request heads and encodes responses
pub struct Codec;

impl Decoder for Codec {
    type Item = RequestHead;
    type Error = DecodeError;

    fn decode(&self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (len, head) = {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut req = httparse::Request::new(&mut headers);

            match req.parse(&src[..])? {
                httparse::Status::Complete(len) => {
                    let method = Method::from_bytes(req.method.unwrap_or_default().as_bytes())
                        .map_err(|_| DecodeError::Method)?;
                    let uri = Uri::try_from(req.path.unwrap_or_default())?;
                    let head = RequestHead {
                        method,
                        uri,
                        version: version(req.version),
                        headers: convert_headers(req.headers)?,
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

impl Encoder for Codec {
    type Item = Message<ResponseHead>;
    type Error = std::io::Error;

    fn encode(&self, item: Self::Item, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Item(head) => {
                dst.extend_from_slice(version_str(head.version));
                dst.extend_from_slice(b" ");
                dst.extend_from_slice(head.status.as_str().as_bytes());
                dst.extend_from_slice(b" ");
                dst.extend_from_slice(head.reason().as_bytes());
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
    use http::{StatusCode, Version};
    use ntex_bytes::Bytes;

    use super::*;

    #[test]
    fn test_decode_request() {
        let codec = Codec;
        let mut buf = BytesMut::from(
            &b"GET /chat?room=1 HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\n"[..],
        );
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"Connection: Upgrade\r\n\r\n\x81\x00");
        let req = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.uri.path(), "/chat");
        assert_eq!(req.version, Version::HTTP_11);
        assert_eq!(req.header(header::HOST), Some("example.com"));
        assert_eq!(req.header(header::UPGRADE), Some("websocket"));
        assert!(req.upgrade());

        // bytes after the head stay in the buffer
        assert_eq!(&buf[..], b"\x81\x00");
    }

    #[test]
    fn test_decode_http10() {
        let mut buf = BytesMut::from(&b"POST / HTTP/1.0\r\n\r\n"[..]);
        let req = Codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.version, Version::HTTP_10);
    }

    #[test]
    fn test_decode_invalid() {
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHo st: x\r\n\r\n"[..]);
        assert!(matches!(
            Codec.decode(&mut buf),
            Err(DecodeError::Parse(_))
        ));

        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nX-Long: "[..]);
        buf.extend_from_slice(&[b'a'; MAX_HEAD_SIZE]);
        assert!(matches!(
            Codec.decode(&mut buf),
            Err(DecodeError::TooLarge(_))
        ));
    }

    #[test]
    fn test_encode_response() {
        let head = ResponseHead::new(StatusCode::FORBIDDEN)
            .set_header(header::CONTENT_LENGTH, HeaderValue::from_static("13"));

        let mut buf = BytesMut::new();
        Codec.encode(Message::Item(head), &mut buf).unwrap();
        Codec
            .encode(Message::Chunk(Bytes::from_static(b"403 Forbidden")), &mut buf)
            .unwrap();
        assert_eq!(
            &buf[..],
            &b"HTTP/1.1 403 Forbidden\r\nContent-Length: 13\r\n\r\n403 Forbidden"[..]
        );
    }
}
