//! Request types the resolver understands out of the box.

use crate::identity::AddressMetadata;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// Transport peer address, attached by the host as an `http::Request` extension.
///
/// # Example
/// ```
/// use turnstile::PeerAddr;
/// let mut request = http::Request::new(());
/// request.extensions_mut().insert(PeerAddr("192.0.2.10:4711".parse().unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

impl<B> AddressMetadata for http::Request<B> {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|value| value.to_str().ok())
    }

    fn peer_addr(&self) -> Option<IpAddr> {
        self.extensions().get::<PeerAddr>().map(|peer| peer.0.ip())
    }
}

/// Owned address metadata for hosts that are not built on `http`.
///
/// Header names are case-insensitive; setting a header twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    headers: HashMap<String, String>,
    peer: Option<IpAddr>,
}

impl RequestInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_peer(mut self, peer: IpAddr) -> Self {
        self.peer = Some(peer);
        self
    }
}

impl AddressMetadata for RequestInfo {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    fn peer_addr(&self) -> Option<IpAddr> {
        self.peer
    }
}
