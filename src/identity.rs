//! Caller identity resolution.
//!
//! A caller is identified by the address information attached to its request: the first hop
//! of every forwarding header that carries a usable value, joined by `:`, or the transport
//! peer address when no header is usable.

use crate::error::InvalidInvocation;
use std::borrow::Borrow;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// Forwarding headers consulted, in order, when building a caller key.
pub const FORWARDED_HEADERS: [&str; 11] = [
    "X-Forwarded-For",
    "Proxy-Client-IP",
    "WL-Proxy-Client-IP",
    "HTTP_X_FORWARDED_FOR",
    "HTTP_X_FORWARDED",
    "HTTP_X_CLUSTER_CLIENT_IP",
    "HTTP_CLIENT_IP",
    "HTTP_FORWARDED_FOR",
    "HTTP_FORWARDED",
    "HTTP_VIA",
    "REMOTE_ADDR",
];

/// Placeholder some proxies emit when they could not determine the client.
const UNKNOWN: &str = "unknown";
const KEY_SEPARATOR: char = ':';

/// Address information of one in-flight request.
pub trait AddressMetadata {
    /// Value of the header `name`, matched case-insensitively.
    fn header(&self, name: &str) -> Option<&str>;
    /// Address of the directly connected peer, if the transport provides one.
    fn peer_addr(&self) -> Option<IpAddr>;
}

/// Key selecting which limiter governs a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CallerIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CallerIdentity {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}

impl From<String> for CallerIdentity {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<IpAddr> for CallerIdentity {
    fn from(addr: IpAddr) -> Self {
        Self(addr.to_string())
    }
}

/// Derives a [`CallerIdentity`] from request address metadata.
///
/// Cloning is cheap; the header list is shared.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    headers: Arc<[String]>,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::with_headers(FORWARDED_HEADERS)
    }
}

impl IdentityResolver {
    /// Resolver consulting [`FORWARDED_HEADERS`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver consulting `headers` in the given order instead of [`FORWARDED_HEADERS`].
    ///
    /// An empty list keys every caller by its peer address.
    pub fn with_headers<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { headers: headers.into_iter().map(Into::into).collect() }
    }

    /// Header names consulted, in order.
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.headers.iter().map(String::as_str)
    }

    /// Build the caller key for a request.
    ///
    /// # Errors
    /// - [`InvalidInvocation::MissingRequestContext`] when no request was supplied.
    /// - [`InvalidInvocation::MissingPeerAddress`] when no header is usable and the request
    ///   carries no peer address.
    ///
    /// # Examples
    /// ```
    /// use turnstile::{IdentityResolver, RequestInfo};
    ///
    /// let request = RequestInfo::new()
    ///     .with_header("X-Forwarded-For", "1.2.3.4, 5.6.7.8")
    ///     .with_header("REMOTE_ADDR", "9.9.9.9");
    /// let key = IdentityResolver::new().resolve(Some(&request)).unwrap();
    /// assert_eq!(key.as_str(), "1.2.3.4:9.9.9.9");
    /// ```
    pub fn resolve<M>(&self, request: Option<&M>) -> Result<CallerIdentity, InvalidInvocation>
    where
        M: AddressMetadata + ?Sized,
    {
        let request = request.ok_or(InvalidInvocation::MissingRequestContext)?;

        let mut key = String::new();
        for segment in self.headers().filter_map(|name| request.header(name).and_then(first_hop)) {
            if !key.is_empty() {
                key.push(KEY_SEPARATOR);
            }
            key.push_str(segment);
        }
        if !key.is_empty() {
            return Ok(CallerIdentity(key));
        }

        request.peer_addr().map(CallerIdentity::from).ok_or(InvalidInvocation::MissingPeerAddress)
    }
}

/// Leftmost entry of a usable header value.
///
/// Chained proxies append to the list, so the first entry is the one closest to the client.
fn first_hop(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case(UNKNOWN) {
        return None;
    }
    let first = value.split(',').next().unwrap_or(value).trim();
    (!first.is_empty()).then_some(first)
}
