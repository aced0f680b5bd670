//! HTTP/1.1 codec for the websocket opening handshake.
//!
//! Only message heads are supported: the handshake never carries a request
//! body and the only response body ever written is the fixed rejection text.
use http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION};
use http::{Method, StatusCode, Uri, Version};
use ntex_bytes::Bytes;
use thiserror::Error;

mod client;
mod codec;

pub use self::client::ClientCodec;
pub use self::codec::Codec;

/// Max size of a message head
pub const MAX_HEAD_SIZE: usize = 8192;

const MAX_HEADERS: usize = 96;

/// Http message encoded by the h1 codecs
#[derive(Debug)]
pub enum Message<T> {
    /// Message head
    Item(T),
    /// Raw body bytes
    Chunk(Bytes),
}

impl<T> From<T> for Message<T> {
    fn from(item: T) -> Self {
        Message::Item(item)
    }
}

/// Outcome of reading one message head from a byte stream
#[derive(Debug)]
pub enum Decoded<T> {
    /// Complete message head
    Message(T),
    /// Peer closed the stream before a complete head was received
    EndOfInput,
    /// Input is not a valid http message
    Invalid(String),
}

/// Http head parse errors
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid http head: {0}")]
    Parse(#[from] httparse::Error),
    #[error("Http head is too large: {0}")]
    TooLarge(usize),
    #[error("Invalid method")]
    Method,
    #[error("Invalid uri: {0}")]
    Uri(#[from] http::uri::InvalidUri),
    #[error("Invalid status code")]
    Status,
    #[error("Invalid header")]
    Header,
}

#[derive(Debug, Clone)]
/// Http request head
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl Default for RequestHead {
    fn default() -> RequestHead {
        RequestHead {
            method: Method::GET,
            uri: Uri::from_static("/"),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
        }
    }
}

impl RequestHead {
    /// Header value as str, `None` if missing or not visible ascii
    pub fn header<K: http::header::AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Check if `Connection` header carries the `upgrade` token
    pub fn upgrade(&self) -> bool {
        has_upgrade_token(&self.headers)
    }
}

#[derive(Debug, Clone)]
/// Http response head
pub struct ResponseHead {
    pub version: Version,
    pub status: StatusCode,
    pub reason: Option<String>,
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// Create HTTP/1.1 response head with the given status
    pub fn new(status: StatusCode) -> ResponseHead {
        ResponseHead {
            status,
            version: Version::HTTP_11,
            reason: None,
            headers: HeaderMap::new(),
        }
    }

    /// Set a header, replaces existing values
    pub fn set_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Header value as str, `None` if missing or not visible ascii
    pub fn header<K: http::header::AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Check if `Connection` header carries the `upgrade` token
    pub fn upgrade(&self) -> bool {
        has_upgrade_token(&self.headers)
    }

    /// Reason phrase, falls back to the canonical one
    pub fn reason(&self) -> &str {
        self.reason
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("")
    }
}

/// `Connection` header is a comma separated token list
fn has_upgrade_token(headers: &HeaderMap) -> bool {
    headers.get_all(CONNECTION).iter().any(|value| {
        value.to_str().map_or(false, |s| {
            s.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        })
    })
}

fn convert_headers(raw: &[httparse::Header<'_>]) -> Result<HeaderMap, DecodeError> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for hdr in raw {
        let name =
            HeaderName::from_bytes(hdr.name.as_bytes()).map_err(|_| DecodeError::Header)?;
        let value = HeaderValue::from_bytes(hdr.value).map_err(|_| DecodeError::Header)?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn version(ver: Option<u8>) -> Version {
    if ver == Some(1) {
        Version::HTTP_11
    } else {
        Version::HTTP_10
    }
}

fn version_str(ver: Version) -> &'static [u8] {
    if ver == Version::HTTP_10 {
        b"HTTP/1.0"
    } else {
        b"HTTP/1.1"
    }
}

/// Write headers in camel case, `sec-websocket-key` becomes
/// `Sec-WebSocket-Key`
fn write_headers(headers: &HeaderMap, dst: &mut ntex_bytes::BytesMut) {
    for (name, value) in headers {
        for (idx, part) in name.as_str().split('-').enumerate() {
            if idx > 0 {
                dst.extend_from_slice(b"-");
            }
            if part == "websocket" {
                dst.extend_from_slice(b"WebSocket");
            } else if let Some((first, rest)) = part.as_bytes().split_first() {
                dst.extend_from_slice(&[first.to_ascii_uppercase()]);
                dst.extend_from_slice(rest);
            }
        }
        dst.extend_from_slice(b": ");
        dst.extend_from_slice(value.as_bytes());
        dst.extend_from_slice(b"\r\n");
    }
    dst.extend_from_slice(b"\r\n");
}
