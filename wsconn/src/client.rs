//! Websockets client
use std::{fmt, net, time::Duration};

use base64::{engine::general_purpose::STANDARD as base64, Engine};
use http::header::{self, HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use http::{StatusCode, Uri, Version};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use wsconn_codec::h1::{self, Decoded, RequestHead, ResponseHead};
use wsconn_codec::{ws, BytesMut};

use crate::connection::Connection;
use crate::error::{HandshakeError, WsClientBuilderError, WsClientError};
use crate::handshake::{read_head, send};
use crate::proto::{self, NonceSource, RandomSource};
use crate::transport::{self, Transport};

const TAG: &str = "WS-CLIENT";

/// Client connection over tcp
pub type TcpConnection = Connection<OwnedReadHalf, OwnedWriteHalf>;

/// `WebSocket` client
pub struct WsClient {
    head: RequestHead,
    addr: Option<net::SocketAddr>,
    max_size: usize,
    timeout: Duration,
    nonce: Box<dyn NonceSource + Send>,
}

/// `WebSocket` client builder
pub struct WsClientBuilder {
    inner: Option<Inner>,
    err: Option<http::Error>,
    origin: Option<HeaderValue>,
}

struct Inner {
    head: RequestHead,
    addr: Option<net::SocketAddr>,
    max_size: usize,
    timeout: Duration,
    nonce: Option<Box<dyn NonceSource + Send>>,
}

impl WsClient {
    /// Create new websocket client builder
    pub fn build<U>(uri: U) -> WsClientBuilder
    where
        Uri: TryFrom<U>,
        <Uri as TryFrom<U>>::Error: Into<http::Error>,
    {
        WsClientBuilder::new(uri)
    }

    /// Request uri
    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    /// Connect to the server and perform opening handshake.
    pub async fn connect(&mut self) -> Result<TcpConnection, WsClientError> {
        log::trace!(
            "{TAG}: Open ws connection to {:?} addr: {:?}",
            self.head.uri,
            self.addr
        );

        let to = self.timeout;
        let fut = async {
            let res = if let Some(addr) = self.addr {
                transport::connect(addr).await
            } else {
                // ipv6 literals keep their brackets in the uri
                let host = self.head.uri.host().unwrap_or_default();
                let host = host.trim_start_matches('[').trim_end_matches(']');
                let port = self.head.uri.port_u16().unwrap_or(80);
                transport::connect((host, port)).await
            };
            let io = res.map_err(WsClientError::Connect)?;

            self.handshake(io).await.map_err(WsClientError::from)
        };

        if to.is_zero() {
            fut.await
        } else {
            tokio::time::timeout(to, fut)
                .await
                .map_err(|_| WsClientError::Timeout)
                .and_then(|res| res)
        }
    }

    /// Perform opening handshake over an established transport.
    pub async fn connect_with<T: Transport>(
        &mut self,
        io: T,
    ) -> Result<Connection<T::Read, T::Write>, WsClientError> {
        let to = self.timeout;
        if to.is_zero() {
            Ok(self.handshake(io).await?)
        } else {
            tokio::time::timeout(to, self.handshake(io))
                .await
                .map_err(|_| WsClientError::Timeout)?
                .map_err(WsClientError::from)
        }
    }

    async fn handshake<T: Transport>(
        &mut self,
        io: T,
    ) -> Result<Connection<T::Read, T::Write>, HandshakeError> {
        transport::tune(&io, TAG);
        let (mut reader, mut writer) = io.split();

        // a base64-encoded value that, when decoded, is 16 bytes in length
        let key = proto::generate_key(self.nonce.as_mut());

        // caller headers go first, mandatory headers replace duplicates
        let mut head = self.head.clone();
        head.headers
            .insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        head.headers
            .insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        let value = HeaderValue::try_from(key.as_str())
            .map_err(|e| HandshakeError::Http(e.to_string()))?;
        head.headers.insert(header::SEC_WEBSOCKET_KEY, value);
        head.headers.insert(
            header::SEC_WEBSOCKET_VERSION,
            HeaderValue::from_static(proto::WS_VERSION),
        );

        let codec = h1::ClientCodec;
        log::trace!("{TAG}: Sending ws handshake http message");
        send(&mut writer, &codec, [h1::Message::Item(head)]).await?;

        log::trace!("{TAG}: Waiting for ws handshake response");
        let mut buf = BytesMut::new();
        let result = match read_head(&mut reader, &mut buf, &codec).await {
            Ok(Decoded::Message(response)) => {
                log::trace!("{TAG}: Ws handshake response is received {response:?}");
                verify_response(&response, &key)
            }
            Ok(Decoded::EndOfInput) => Err(HandshakeError::EndOfInput),
            Ok(Decoded::Invalid(reason)) => Err(HandshakeError::Http(reason)),
            Err(err) => Err(HandshakeError::Io(err)),
        };

        if let Err(err) = result {
            log::trace!("{TAG}: Ws handshake failed: {err}, closing input channel");
            drop(reader);
            return Err(err);
        }
        log::trace!("{TAG}: Ws handshake response verification is completed");

        Ok(Connection::with_buffer(
            reader,
            writer,
            ws::Codec::new().max_size(self.max_size).client_mode(),
            buf,
            TAG,
        ))
    }
}

/// Verify server handshake response, checks run in a fixed order
fn verify_response(response: &ResponseHead, key: &str) -> Result<(), HandshakeError> {
    let status = response.status;
    if status.is_client_error() || status.is_server_error() {
        return Err(HandshakeError::Http(format!(
            "Unexpected response status: {status}"
        )));
    }
    if response.version != Version::HTTP_11 {
        return Err(HandshakeError::Protocol(format!(
            "Invalid http version: {:?}",
            response.version
        )));
    }
    if status != StatusCode::SWITCHING_PROTOCOLS {
        return Err(HandshakeError::Protocol(format!(
            "Invalid response status: {status}"
        )));
    }

    let upgrade = response
        .header(header::UPGRADE)
        .map_or(false, |s| s.eq_ignore_ascii_case("websocket"));
    if !upgrade {
        return Err(HandshakeError::Protocol("Invalid upgrade header".into()));
    }
    if !response.upgrade() {
        return Err(HandshakeError::Protocol("Invalid connection header".into()));
    }

    let encoded = proto::hash_key(key.as_bytes());
    match response.header(header::SEC_WEBSOCKET_ACCEPT) {
        Some(accept) if accept == encoded => Ok(()),
        Some(accept) => Err(HandshakeError::Protocol(format!(
            "Invalid challenge response: expected: {encoded} received: {accept}"
        ))),
        None => Err(HandshakeError::Protocol(
            "Missing Sec-WebSocket-Accept header".into(),
        )),
    }
}

impl fmt::Debug for WsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\nWsClient {}:{}", self.head.method, self.head.uri)?;
        writeln!(f, "  headers:")?;
        for (key, val) in self.head.headers.iter() {
            writeln!(f, "    {key:?}: {val:?}")?;
        }
        Ok(())
    }
}

impl WsClientBuilder {
    fn new<U>(uri: U) -> WsClientBuilder
    where
        Uri: TryFrom<U>,
        <Uri as TryFrom<U>>::Error: Into<http::Error>,
    {
        let (head, err) = match Uri::try_from(uri) {
            Ok(uri) => (
                RequestHead {
                    uri,
                    ..Default::default()
                },
                None,
            ),
            Err(e) => (Default::default(), Some(e.into())),
        };

        WsClientBuilder {
            err,
            origin: None,
            inner: Some(Inner {
                head,
                addr: None,
                max_size: ws::MAX_SIZE,
                timeout: Duration::from_secs(5),
                nonce: None,
            }),
        }
    }

    /// Set socket address of the server.
    ///
    /// This address is used for connection. If address is not
    /// provided url's host name get resolved.
    pub fn address(&mut self, addr: net::SocketAddr) -> &mut Self {
        if let Some(parts) = parts(&mut self.inner, &self.err) {
            parts.addr = Some(addr);
        }
        self
    }

    /// Set request Origin
    pub fn origin<V, E>(&mut self, origin: V) -> &mut Self
    where
        HeaderValue: TryFrom<V, Error = E>,
        http::Error: From<E>,
    {
        match HeaderValue::try_from(origin) {
            Ok(value) => self.origin = Some(value),
            Err(e) => self.err = Some(e.into()),
        }
        self
    }

    /// Set max frame size
    ///
    /// By default max size is set to 64kb
    pub fn max_frame_size(&mut self, size: usize) -> &mut Self {
        if let Some(parts) = parts(&mut self.inner, &self.err) {
            parts.max_size = size;
        }
        self
    }

    /// Set source of the handshake nonce.
    ///
    /// By default nonce is generated by the thread local random generator.
    pub fn nonce_source<S>(&mut self, source: S) -> &mut Self
    where
        S: NonceSource + Send + 'static,
    {
        if let Some(parts) = parts(&mut self.inner, &self.err) {
            parts.nonce = Some(Box::new(source));
        }
        self
    }

    /// Append a header.
    ///
    /// Header gets appended to existing header.
    /// To override header use `set_header()` method.
    pub fn header<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        HeaderName: TryFrom<K>,
        HeaderValue: TryFrom<V>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        if let Some(parts) = parts(&mut self.inner, &self.err) {
            match HeaderName::try_from(key) {
                Ok(key) => match HeaderValue::try_from(value) {
                    Ok(value) => {
                        parts.head.headers.append(key, value);
                    }
                    Err(e) => self.err = Some(e.into()),
                },
                Err(e) => self.err = Some(e.into()),
            }
        }
        self
    }

    /// Insert a header, replaces existing header.
    pub fn set_header<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        HeaderName: TryFrom<K>,
        HeaderValue: TryFrom<V>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        if let Some(parts) = parts(&mut self.inner, &self.err) {
            match HeaderName::try_from(key) {
                Ok(key) => match HeaderValue::try_from(value) {
                    Ok(value) => {
                        parts.head.headers.insert(key, value);
                    }
                    Err(e) => self.err = Some(e.into()),
                },
                Err(e) => self.err = Some(e.into()),
            }
        }
        self
    }

    /// Set HTTP basic authorization header
    pub fn basic_auth<U>(&mut self, username: U, password: Option<&str>) -> &mut Self
    where
        U: fmt::Display,
    {
        let auth = match password {
            Some(password) => format!("{username}:{password}"),
            None => format!("{username}:"),
        };
        self.header(AUTHORIZATION, format!("Basic {}", base64.encode(auth)))
    }

    /// Set HTTP bearer authentication header
    pub fn bearer_auth<U>(&mut self, token: U) -> &mut Self
    where
        U: fmt::Display,
    {
        self.header(AUTHORIZATION, format!("Bearer {token}"))
    }

    /// Set request timeout.
    ///
    /// Covers connect and the opening handshake. Default value is
    /// 5 seconds, zero disables the timeout.
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        if let Some(parts) = parts(&mut self.inner, &self.err) {
            parts.timeout = timeout;
        }
        self
    }

    /// Complete building process and construct websockets client.
    pub fn finish(&mut self) -> Result<WsClient, WsClientBuilderError> {
        if let Some(e) = self.err.take() {
            return Err(WsClientBuilderError::Http(e));
        }

        let Some(mut inner) = self.inner.take() else {
            return Err(WsClientBuilderError::Reused);
        };

        // validate uri
        let uri = &inner.head.uri;
        let Some(host) = uri.host() else {
            return Err(WsClientBuilderError::MissingHost);
        };
        match uri.scheme_str() {
            None => return Err(WsClientBuilderError::MissingScheme),
            Some("http" | "ws") => (),
            Some(_) => return Err(WsClientBuilderError::UnknownScheme),
        }

        if !inner.head.headers.contains_key(header::HOST) {
            let host = match uri.port_u16() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
            let value = HeaderValue::try_from(host).map_err(http::Error::from)?;
            inner.head.headers.insert(header::HOST, value);
        }

        if let Some(origin) = self.origin.take() {
            inner.head.headers.insert(header::ORIGIN, origin);
        }

        Ok(WsClient {
            head: inner.head,
            addr: inner.addr,
            max_size: inner.max_size,
            timeout: inner.timeout,
            nonce: inner
                .nonce
                .unwrap_or_else(|| Box::new(RandomSource) as Box<dyn NonceSource + Send>),
        })
    }
}

#[inline]
fn parts<'a>(parts: &'a mut Option<Inner>, err: &Option<http::Error>) -> Option<&'a mut Inner> {
    if err.is_some() {
        return None;
    }
    parts.as_mut()
}

impl fmt::Debug for WsClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref parts) = self.inner {
            writeln!(
                f,
                "\nWsClientBuilder {}:{}",
                parts.head.method, parts.head.uri
            )?;
            writeln!(f, "  headers:")?;
            for (key, val) in parts.head.headers.iter() {
                writeln!(f, "    {key:?}: {val:?}")?;
            }
        } else {
            writeln!(f, "WsClientBuilder(Consumed)")?;
        }
        Ok(())
    }
}

/// Connect to a websocket server.
///
/// `extra_headers` are sent along with the handshake headers, the latter
/// replace any duplicate. Nonce is generated from `nonce_source` or from
/// the thread local random generator.
pub async fn connect(
    target: &str,
    extra_headers: Option<HeaderMap>,
    nonce_source: Option<Box<dyn NonceSource + Send>>,
) -> Result<TcpConnection, WsClientError> {
    let mut builder = WsClient::build(target);
    if let Some(parts) = builder.inner.as_mut() {
        if let Some(headers) = extra_headers {
            parts.head.headers.extend(headers);
        }
        parts.nonce = nonce_source;
    }
    builder.finish()?.connect().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: StatusCode) -> ResponseHead {
        ResponseHead::new(status)
            .set_header(header::UPGRADE, HeaderValue::from_static("websocket"))
            .set_header(header::CONNECTION, HeaderValue::from_static("Upgrade"))
            .set_header(
                header::SEC_WEBSOCKET_ACCEPT,
                HeaderValue::from_static("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="),
            )
    }

    #[test]
    fn test_verify_response() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        assert!(verify_response(&response(StatusCode::SWITCHING_PROTOCOLS), key).is_ok());

        let res = verify_response(&response(StatusCode::NOT_FOUND), key);
        assert!(matches!(res, Err(HandshakeError::Http(_))));

        let res = verify_response(&response(StatusCode::OK), key);
        assert!(matches!(res, Err(HandshakeError::Protocol(_))));

        let mut res = response(StatusCode::SWITCHING_PROTOCOLS);
        res.version = Version::HTTP_10;
        assert!(matches!(
            verify_response(&res, key),
            Err(HandshakeError::Protocol(_))
        ));

        let res = response(StatusCode::SWITCHING_PROTOCOLS)
            .set_header(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        assert!(matches!(
            verify_response(&res, key),
            Err(HandshakeError::Protocol(_))
        ));

        let res = response(StatusCode::SWITCHING_PROTOCOLS)
            .set_header(header::UPGRADE, HeaderValue::from_static("h2c"));
        assert!(matches!(
            verify_response(&res, key),
            Err(HandshakeError::Protocol(_))
        ));

        let res = verify_response(&response(StatusCode::SWITCHING_PROTOCOLS), "other");
        assert!(matches!(res, Err(HandshakeError::Protocol(_))));
    }

    #[test]
    fn test_builder() {
        let client = WsClient::build("ws://localhost:8080/chat")
            .origin("http://localhost:8080")
            .header("x-custom", "1")
            .header("x-custom", "2")
            .bearer_auth("token")
            .finish()
            .unwrap();
        assert_eq!(client.head.header(header::HOST), Some("localhost:8080"));
        assert_eq!(
            client.head.header(header::ORIGIN),
            Some("http://localhost:8080")
        );
        assert_eq!(client.head.headers.get_all("x-custom").iter().count(), 2);
        assert_eq!(
            client.head.header(AUTHORIZATION),
            Some("Bearer token")
        );
        assert_eq!(client.timeout, Duration::from_secs(5));
        assert_eq!(client.max_size, 65_536);

        let client = WsClient::build("http://localhost")
            .set_header(header::HOST, "example.com")
            .finish()
            .unwrap();
        assert_eq!(client.head.header(header::HOST), Some("example.com"));
    }

    #[test]
    fn test_builder_errors() {
        assert!(matches!(
            WsClient::build("/path").finish(),
            Err(WsClientBuilderError::MissingHost)
        ));
        assert!(matches!(
            WsClient::build("wss://localhost").finish(),
            Err(WsClientBuilderError::UnknownScheme)
        ));
        assert!(matches!(
            WsClient::build("ws://localhost").header("bad header", "1").finish(),
            Err(WsClientBuilderError::Http(_))
        ));

        let mut builder = WsClient::build("ws://localhost");
        assert!(builder.finish().is_ok());
        assert!(matches!(
            builder.finish(),
            Err(WsClientBuilderError::Reused)
        ));
    }
}
