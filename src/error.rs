use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failures that abort a probe before any reachability work is reported.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("invalid address {input:?}: {reason}")]
    InvalidAddress { input: String, reason: String },

    #[error("unsupported scheme {0:?} (expected http or https)")]
    UnsupportedScheme(String),

    #[error("proxy {addr} unreachable: {source}")]
    ProxyUnreachable {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to classify proxy {addr}: {reason}")]
    ProxyClassifyFailed { addr: String, reason: String },

    #[error("proxy {addr} unavailable: {reason}")]
    ProxyUnavailable { addr: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl CheckError {
    pub(crate) fn invalid_address(input: &str, reason: impl Into<String>) -> Self {
        CheckError::InvalidAddress {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the caller supplied malformed input, false for proxy-side failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CheckError::InvalidAddress { .. }
                | CheckError::UnsupportedScheme(_)
                | CheckError::InvalidRequest(_)
        )
    }
}

/// Failures of a single dial attempt. These end up in `port_error`, never abort a probe.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("dial {addr}: i/o timeout after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },

    #[error("dial {addr}: connection refused")]
    Refused { addr: String },

    #[error("proxy CONNECT failed: {status} {reason}")]
    ProxyConnectRejected { status: u16, reason: String },

    #[error("socks5 dial {addr}: {source}")]
    Socks {
        addr: String,
        #[source]
        source: tokio_socks::Error,
    },

    #[error("dial {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: io::Error,
    },
}

impl DialError {
    pub(crate) fn from_io(addr: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::ConnectionRefused => DialError::Refused {
                addr: addr.to_string(),
            },
            _ => DialError::Io {
                addr: addr.to_string(),
                source,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum PingError {
    #[error("invalid host {0:?}")]
    InvalidHost(String),

    #[error("resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    #[error("icmp socket: {0}")]
    Socket(#[from] io::Error),
}
