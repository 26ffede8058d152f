use std::error::Error as StdError;

use crate::address::Address;
use crate::models::CheckResult;
use crate::ping::PingOutcome;

/// Markers that identify a certificate-trust failure in an error rendering. The first
/// two match Go-style `x509:`/`tls:` errors; the rest cover OpenSSL and rustls wording.
pub const TLS_ERROR_MARKERS: &[&str] = &[
    "x509:",
    "tls:",
    "certificate verify failed",
    "invalid peer certificate",
    "self signed certificate",
    "self-signed certificate",
    "unable to get local issuer certificate",
    "certificate has expired",
    "UnknownIssuer",
];

pub const UNKNOWN_TCP_ERROR: &str = "unknown TCP error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CertificateUntrusted,
    Timeout,
    Connect,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl HttpFailure {
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let message = error_chain(err);
        let kind = if is_tls_error(&message) {
            ErrorKind::CertificateUntrusted
        } else if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() {
            ErrorKind::Connect
        } else {
            ErrorKind::Other
        };
        Self { kind, message }
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if is_tls_error(&message) {
            ErrorKind::CertificateUntrusted
        } else {
            ErrorKind::Other
        };
        Self { kind, message }
    }
}

/// Raw result of the port/HTTP branch of a probe.
#[derive(Debug, Clone)]
pub enum PortOutcome {
    /// `error` may be `None` even when `connected` is false.
    Tcp { connected: bool, error: Option<String> },
    Http {
        proxy: String,
        outcome: Result<u16, HttpFailure>,
    },
}

pub fn error_chain(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

pub fn is_tls_error(text: &str) -> bool {
    TLS_ERROR_MARKERS.iter().any(|marker| text.contains(marker))
}

pub fn status_message(status: u16) -> String {
    match status {
        200..=299 => "reachable".to_string(),
        300..=399 => "reachable, redirected".to_string(),
        400..=499 => "reachable, access denied".to_string(),
        500..=u16::MAX => "reachable, server error".to_string(),
        _ => format!("reachable, unexpected HTTP status {}", status),
    }
}

/// Folds both sub-check outcomes into the record returned to callers.
pub fn classify(address: &Address, port: PortOutcome, ping: &PingOutcome) -> CheckResult {
    let mut result = CheckResult {
        host: address.host.clone(),
        port: address.port,
        ping_success: ping.success(),
        ping_summary: ping.summary(),
        ..Default::default()
    };

    match port {
        PortOutcome::Tcp { connected: true, .. } => {
            result.port_success = true;
            result.message = "reachable".to_string();
        }
        PortOutcome::Tcp { connected: false, error } => {
            let error = error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| UNKNOWN_TCP_ERROR.to_string());
            result.message = format!("unreachable: {}", error);
            result.port_error = Some(error);
        }
        PortOutcome::Http { proxy, outcome } => {
            result.http_checked = true;
            match outcome {
                Ok(status) => {
                    result.http_status = Some(status);
                    result.message = status_message(status);
                    if (200..400).contains(&status) {
                        result.port_success = true;
                    } else {
                        let error = format!("HTTP status {}", status);
                        result.http_error = Some(error.clone());
                        result.port_error = Some(error);
                    }
                }
                Err(failure) if failure.kind == ErrorKind::CertificateUntrusted => {
                    result.port_success = true;
                    result.http_error = Some(failure.message);
                    result.message = "reachable, but certificate untrusted".to_string();
                }
                Err(failure) => {
                    result.message = format!("unreachable: {}", failure.message);
                    result.port_error = Some(format!(
                        "HTTP request via proxy {} failed: {}",
                        proxy, failure.message
                    ));
                    result.http_error = Some(failure.message);
                }
            }
        }
    }

    result
}
