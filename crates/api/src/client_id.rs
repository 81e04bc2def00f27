use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;
use thiserror::Error;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Failure to derive a client identity from a request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientIdError {
    #[error("request carries no peer address")]
    MissingPeerAddress,

    #[error("malformed X-Forwarded-For header: {0:?}")]
    MalformedForwardedFor(String),
}

/// Resolve the identity used for admission control.
///
/// The identity is the caller's IP address without a port, so every
/// connection from one host shares a bucket. With `trust_forwarded_for` the
/// first `X-Forwarded-For` hop takes precedence over the socket peer.
pub fn resolve_client_id(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> Result<String, ClientIdError> {
    if trust_forwarded_for {
        if let Some(value) = headers.get(X_FORWARDED_FOR) {
            let raw = value.to_str().map_err(|_| {
                ClientIdError::MalformedForwardedFor(
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })?;
            let first = raw.split(',').next().unwrap_or_default().trim();
            return parse_forwarded_hop(first)
                .map(|ip| ip.to_string())
                .ok_or_else(|| ClientIdError::MalformedForwardedFor(raw.to_string()));
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .ok_or(ClientIdError::MissingPeerAddress)
}

/// A hop is a bare address or an address with a port ("1.2.3.4:80",
/// "[::1]:80").
fn parse_forwarded_hop(hop: &str) -> Option<IpAddr> {
    hop.parse::<IpAddr>()
        .ok()
        .or_else(|| hop.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}
