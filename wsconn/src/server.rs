//! Websockets server
use std::{fmt, future::Future, io, pin::Pin, sync::Arc, time::Duration};

use http::header::{self, HeaderValue};
use http::uri::Authority;
use http::{Method, StatusCode, Uri, Version};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use wsconn_codec::h1::{self, Decoded, Message, RequestHead, ResponseHead};
use wsconn_codec::{ws, Bytes, BytesMut};

use crate::client::TcpConnection;
use crate::connection::Connection;
use crate::error::{HandshakeError, ServerError, WsError};
use crate::handshake::{read_head, send};
use crate::proto;
use crate::transport::{self, Transport};

const TAG: &str = "WS-SERVER";

const FORBIDDEN_BODY: &str = "403 Forbidden";

/// Delay after a failed `accept` call
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Decides whether a handshake request is allowed
pub type OriginCheck = Arc<dyn Fn(&RequestHead) -> bool + Send + Sync>;

type ErrorHook = Arc<dyn Fn(ServerError) + Send + Sync>;

type StopSignal = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Default origin policy.
///
/// Requests without `Origin` header are allowed, otherwise origin's host
/// must match the host of the `Host` header.
pub fn default_origin_check(req: &RequestHead) -> bool {
    let Some(origin) = req.header(header::ORIGIN) else {
        return true;
    };
    let origin = origin.parse::<Uri>().ok();
    let host = req
        .header(header::HOST)
        .and_then(|h| h.parse::<Authority>().ok());

    match (origin.as_ref().and_then(|u| u.host()), host) {
        (Some(origin), Some(host)) => origin.eq_ignore_ascii_case(host.host()),
        _ => false,
    }
}

/// Verify `WebSocket` handshake request, returns the client key
fn verify_request<'a>(
    req: &'a RequestHead,
    origin_check: &(dyn Fn(&RequestHead) -> bool + Send + Sync),
) -> Result<&'a str, &'static str> {
    // WebSocket accepts only GET
    if req.method != Method::GET {
        return Err("GET method required");
    }
    if req.version != Version::HTTP_11 {
        return Err("HTTP/1.1 required");
    }

    let has_hdr = req
        .header(header::UPGRADE)
        .map_or(false, |s| s.eq_ignore_ascii_case("websocket"));
    if !has_hdr {
        return Err("No websocket upgrade header");
    }

    let Some(key) = req.header(header::SEC_WEBSOCKET_KEY) else {
        return Err("Missing Sec-WebSocket-Key header");
    };

    if !req.upgrade() {
        return Err("No upgrade token in connection header");
    }
    if !origin_check(req) {
        return Err("Origin is not allowed");
    }
    Ok(key)
}

fn forbidden() -> [Message<ResponseHead>; 2] {
    let head = ResponseHead::new(StatusCode::FORBIDDEN)
        .set_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
        .set_header(
            header::CONTENT_LENGTH,
            HeaderValue::from(FORBIDDEN_BODY.len()),
        );
    [
        Message::Item(head),
        Message::Chunk(Bytes::from_static(FORBIDDEN_BODY.as_bytes())),
    ]
}

fn switching_protocols(key: &str) -> Result<ResponseHead, HandshakeError> {
    let accept = HeaderValue::try_from(proto::hash_key(key.as_bytes()))
        .map_err(|e| HandshakeError::Http(e.to_string()))?;
    Ok(ResponseHead::new(StatusCode::SWITCHING_PROTOCOLS)
        .set_header(header::UPGRADE, HeaderValue::from_static("websocket"))
        .set_header(header::CONNECTION, HeaderValue::from_static("Upgrade"))
        .set_header(header::SEC_WEBSOCKET_ACCEPT, accept))
}

/// Run server side of the opening handshake
async fn handshake<T: Transport>(
    io: T,
    origin_check: &(dyn Fn(&RequestHead) -> bool + Send + Sync),
    max_size: usize,
) -> Result<Connection<T::Read, T::Write>, HandshakeError> {
    transport::tune(&io, TAG);
    let (mut reader, mut writer) = io.split();

    let codec = h1::Codec;
    let mut buf = BytesMut::new();
    let req = match read_head(&mut reader, &mut buf, &codec).await? {
        Decoded::Message(req) => req,
        Decoded::EndOfInput => {
            log::trace!("{TAG}: Peer closed connection before handshake request");
            return Err(HandshakeError::EndOfInput);
        }
        Decoded::Invalid(reason) => {
            log::trace!("{TAG}: Invalid handshake request: {reason}");
            return Err(HandshakeError::Http(reason));
        }
    };
    log::trace!("{TAG}: Ws handshake request is received {req:?}");

    let key = match verify_request(&req, origin_check) {
        Ok(key) => key,
        Err(reason) => {
            log::trace!("{TAG}: Rejecting ws handshake: {reason}");
            send(&mut writer, &codec, forbidden()).await?;
            return Err(HandshakeError::Protocol("Bad headers".into()));
        }
    };

    let response = switching_protocols(key)?;
    send(&mut writer, &codec, [Message::Item(response)]).await?;
    log::trace!("{TAG}: Ws handshake is completed");

    Ok(Connection::with_buffer(
        reader,
        writer,
        ws::Codec::new().max_size(max_size),
        buf,
        TAG,
    ))
}

/// Accept websocket connection on `io` and run `handler` on it.
///
/// Rejected handshakes get `403 Forbidden` response. Without
/// `origin_check` the [`default_origin_check`] policy applies.
pub async fn accept<T, F, Fut>(
    io: T,
    handler: F,
    origin_check: Option<OriginCheck>,
) -> Result<(), ServerError>
where
    T: Transport,
    F: FnOnce(Connection<T::Read, T::Write>) -> Fut,
    Fut: Future<Output = Result<(), WsError>>,
{
    let conn = match origin_check {
        Some(check) => handshake(io, &*check, ws::MAX_SIZE).await?,
        None => handshake(io, &default_origin_check, ws::MAX_SIZE).await?,
    };
    handler(conn).await?;
    Ok(())
}

struct Shared<F> {
    handler: F,
    origin_check: OriginCheck,
    timeout: Duration,
    max_size: usize,
    on_error: ErrorHook,
}

/// Websocket server
///
/// Runs an accept loop over tcp listener and passes every upgraded
/// connection to the handler, each connection runs in its own task.
pub struct WsServer<F> {
    shared: Shared<F>,
    stop: Option<StopSignal>,
}

impl<F, Fut> WsServer<F>
where
    F: Fn(TcpConnection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WsError>> + Send + 'static,
{
    /// Create new server with connection handler
    pub fn new(handler: F) -> Self {
        WsServer {
            shared: Shared {
                handler,
                origin_check: Arc::new(default_origin_check),
                timeout: Duration::from_secs(5),
                max_size: ws::MAX_SIZE,
                on_error: Arc::new(default_error_hook),
            },
            stop: None,
        }
    }

    /// Set handshake origin policy
    pub fn origin_check<C>(mut self, check: C) -> Self
    where
        C: Fn(&RequestHead) -> bool + Send + Sync + 'static,
    {
        self.shared.origin_check = Arc::new(check);
        self
    }

    /// Set handshake timeout.
    ///
    /// Default value is 5 seconds, zero disables the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.shared.timeout = timeout;
        self
    }

    /// Set max frame size
    ///
    /// By default max size is set to 64kb
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.shared.max_size = size;
        self
    }

    /// Set error hook.
    ///
    /// Receives accept errors, failed handshakes and handler errors. By
    /// default errors are logged.
    pub fn on_error<H>(mut self, hook: H) -> Self
    where
        H: Fn(ServerError) + Send + Sync + 'static,
    {
        self.shared.on_error = Arc::new(hook);
        self
    }

    /// Stop accept loop once `signal` resolves
    pub fn stop<S>(mut self, signal: S) -> Self
    where
        S: Future<Output = ()> + Send + 'static,
    {
        self.stop = Some(Box::pin(signal));
        self
    }

    /// Bind to `addr` and run accept loop
    pub async fn bind<A: ToSocketAddrs>(self, addr: A) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Run accept loop until stop signal resolves
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        let WsServer { shared, stop } = self;
        let shared = Arc::new(shared);
        let mut stop = stop.unwrap_or_else(|| Box::pin(std::future::pending::<()>()) as StopSignal);

        log::info!("{TAG}: Starting accept loop on {:?}", listener.local_addr()?);
        loop {
            tokio::select! {
                _ = &mut stop => {
                    log::info!("{TAG}: Stopping accept loop");
                    return Ok(());
                }
                res = listener.accept() => match res {
                    Ok((io, peer)) => {
                        log::trace!("{TAG}: Accepted connection from {peer}");
                        tokio::spawn(Shared::run(shared.clone(), io));
                    }
                    Err(err) => {
                        (shared.on_error)(ServerError::Accept(err));
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }
    }
}

impl<F, Fut> Shared<F>
where
    F: Fn(TcpConnection) -> Fut,
    Fut: Future<Output = Result<(), WsError>>,
{
    async fn run(self: Arc<Self>, io: TcpStream) {
        if let Err(err) = self.handle(io).await {
            (self.on_error)(err);
        }
    }

    async fn handle(&self, io: TcpStream) -> Result<(), ServerError> {
        let fut = handshake(io, &*self.origin_check, self.max_size);
        let conn = if self.timeout.is_zero() {
            fut.await?
        } else {
            tokio::time::timeout(self.timeout, fut)
                .await
                .map_err(|_| ServerError::Timeout)??
        };
        (self.handler)(conn).await?;
        Ok(())
    }
}

fn default_error_hook(err: ServerError) {
    match err {
        ServerError::Accept(err) => log::error!("{TAG}: Cannot accept connection: {err}"),
        err => log::debug!("{TAG}: {err}"),
    }
}

impl<F> fmt::Debug for WsServer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsServer")
            .field("timeout", &self.shared.timeout)
            .field("max_size", &self.shared.max_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RequestHead {
        let mut req = RequestHead::default();
        req.headers
            .insert(header::HOST, HeaderValue::from_static("localhost:8080"));
        req.headers
            .insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        req.headers
            .insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        req.headers.insert(
            header::SEC_WEBSOCKET_KEY,
            HeaderValue::from_static("dGhlIHNhbXBsZSBub25jZQ=="),
        );
        req
    }

    #[test]
    fn test_default_origin_check() {
        let mut req = request();
        assert!(default_origin_check(&req));

        req.headers.insert(
            header::ORIGIN,
            HeaderValue::from_static("http://LOCALHOST:3000"),
        );
        assert!(default_origin_check(&req));

        req.headers
            .insert(header::ORIGIN, HeaderValue::from_static("http://evil.com"));
        assert!(!default_origin_check(&req));

        req.headers.remove(header::HOST);
        req.headers
            .insert(header::ORIGIN, HeaderValue::from_static("http://localhost"));
        assert!(!default_origin_check(&req));
    }

    #[test]
    fn test_verify_request() {
        let allow = |_: &RequestHead| true;
        assert_eq!(
            verify_request(&request(), &allow),
            Ok("dGhlIHNhbXBsZSBub25jZQ==")
        );

        let mut req = request();
        req.method = Method::POST;
        assert!(verify_request(&req, &allow).is_err());

        let mut req = request();
        req.version = Version::HTTP_10;
        assert!(verify_request(&req, &allow).is_err());

        let mut req = request();
        req.headers
            .insert(header::UPGRADE, HeaderValue::from_static("h2c"));
        assert!(verify_request(&req, &allow).is_err());

        let mut req = request();
        req.headers.remove(header::SEC_WEBSOCKET_KEY);
        assert!(verify_request(&req, &allow).is_err());

        let mut req = request();
        req.headers
            .insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        assert!(verify_request(&req, &allow).is_err());

        let deny = |_: &RequestHead| false;
        assert!(verify_request(&request(), &deny).is_err());
    }

    #[test]
    fn test_switching_protocols() {
        let res = switching_protocols("dGhlIHNhbXBsZSBub25jZQ==").unwrap();
        assert_eq!(res.status, StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(
            res.header(header::SEC_WEBSOCKET_ACCEPT),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
    }
}
