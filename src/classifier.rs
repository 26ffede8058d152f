use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::dialer::{read_connect_reply, send_connect};
use crate::error::CheckError;

/// Well-known CONNECT target used only to see how the proxy answers.
pub const PROBE_TARGET: &str = "www.google.com:443";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    HttpConnect,
    Socks5,
}

#[async_trait]
pub trait ProxyClassifier: Send + Sync {
    async fn classify(&self, proxy_addr: &str, timeout: Duration) -> Result<ProxyKind, CheckError>;
}

/// Sends one CONNECT request and calls the proxy HTTP-CONNECT if it answers 200.
///
/// Anything else (a non-200 status, garbage, silence, a closed socket) is taken to
/// mean SOCKS5. A proxy that speaks neither protocol is therefore reported as
/// SOCKS5 and fails later at dial time.
#[derive(Debug, Clone)]
pub struct ConnectProbe {
    target: String,
}

impl ConnectProbe {
    pub fn new() -> Self {
        Self::with_target(PROBE_TARGET)
    }

    pub fn with_target(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Default for ConnectProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProxyClassifier for ConnectProbe {
    async fn classify(&self, proxy_addr: &str, timeout: Duration) -> Result<ProxyKind, CheckError> {
        let mut stream = match tokio::time::timeout(timeout, TcpStream::connect(proxy_addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(CheckError::ProxyUnreachable {
                    addr: proxy_addr.to_string(),
                    source: e,
                })
            }
            Err(_) => {
                return Err(CheckError::ProxyUnreachable {
                    addr: proxy_addr.to_string(),
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        };

        let sent = tokio::time::timeout(timeout, send_connect(&mut stream, &self.target)).await;
        if let Err(reason) = flatten(sent) {
            return Err(CheckError::ProxyClassifyFailed {
                addr: proxy_addr.to_string(),
                reason,
            });
        }

        let answer = tokio::time::timeout(timeout, read_connect_reply(&mut stream)).await;
        drop(stream);

        let kind = match answer {
            Ok(Ok((200, _))) => ProxyKind::HttpConnect,
            Ok(Ok((status, reason))) => {
                log::debug!("Proxy {} answered CONNECT with {} {}", proxy_addr, status, reason);
                ProxyKind::Socks5
            }
            Ok(Err(e)) => {
                log::debug!("Proxy {} did not speak HTTP: {}", proxy_addr, e);
                ProxyKind::Socks5
            }
            Err(_) => {
                log::debug!("Proxy {} stayed silent after CONNECT", proxy_addr);
                ProxyKind::Socks5
            }
        };

        log::debug!("Proxy {} classified as {:?}", proxy_addr, kind);
        Ok(kind)
    }
}

fn flatten(sent: Result<io::Result<()>, tokio::time::error::Elapsed>) -> Result<(), String> {
    match sent {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("write timed out".to_string()),
    }
}
