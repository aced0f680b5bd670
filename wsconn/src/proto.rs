//! Websockets protocol helpers
use base64::{engine::general_purpose::STANDARD as base64, Engine};
use rand::RngCore;
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing, RFC 6455 section 1.3
pub const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this crate speaks
pub const WS_VERSION: &str = "13";

/// Hashes the `Sec-WebSocket-Key` header as described in RFC 6455.
pub fn hash_key(key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key);
    hasher.update(WS_GUID);
    base64.encode(hasher.finalize())
}

/// Source of the 16 random bytes behind `Sec-WebSocket-Key`.
pub trait NonceSource {
    fn fill(&mut self, buf: &mut [u8; 16]);
}

impl<F> NonceSource for F
where
    F: FnMut(&mut [u8; 16]),
{
    fn fill(&mut self, buf: &mut [u8; 16]) {
        (self)(buf)
    }
}

/// Default nonce source backed by the thread local CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSource;

impl NonceSource for RandomSource {
    fn fill(&mut self, buf: &mut [u8; 16]) {
        rand::rng().fill_bytes(buf);
    }
}

/// Generate base64 encoded handshake nonce.
pub fn generate_key(source: &mut dyn NonceSource) -> String {
    let mut nonce = [0u8; 16];
    source.fill(&mut nonce);
    base64.encode(nonce)
}
