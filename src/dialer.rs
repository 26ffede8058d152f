use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;

use crate::address::Address;
use crate::classifier::{ConnectProbe, ProxyClassifier, ProxyKind};
use crate::error::{CheckError, DialError};

const MAX_REPLY_HEAD: usize = 8 * 1024;

pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub type BoxedStream = Box<dyn Stream>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Direct,
    HttpConnect(String),
    Socks5(String),
}

/// How a probe reaches its target. Built once per probe and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialStrategy {
    route: Route,
    timeout: Duration,
}

impl DialStrategy {
    pub fn direct(timeout: Duration) -> Self {
        Self {
            route: Route::Direct,
            timeout,
        }
    }

    pub fn for_kind(kind: ProxyKind, proxy_addr: &str, timeout: Duration) -> Self {
        let route = match kind {
            ProxyKind::HttpConnect => Route::HttpConnect(proxy_addr.to_string()),
            ProxyKind::Socks5 => Route::Socks5(proxy_addr.to_string()),
        };
        Self { route, timeout }
    }

    /// An empty `proxy_addr` dials directly, otherwise the proxy is classified first.
    pub async fn build(proxy_addr: &str, timeout: Duration) -> Result<Self, CheckError> {
        Self::build_with(&ConnectProbe::new(), proxy_addr, timeout).await
    }

    pub async fn build_with(
        classifier: &dyn ProxyClassifier,
        proxy_addr: &str,
        timeout: Duration,
    ) -> Result<Self, CheckError> {
        let proxy_addr = proxy_addr.trim();
        if proxy_addr.is_empty() {
            return Ok(Self::direct(timeout));
        }
        let kind = classifier.classify(proxy_addr, timeout).await?;
        Ok(Self::for_kind(kind, proxy_addr, timeout))
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn proxy_addr(&self) -> Option<&str> {
        match &self.route {
            Route::Direct => None,
            Route::HttpConnect(addr) | Route::Socks5(addr) => Some(addr),
        }
    }

    /// Proxy setting for an HTTP client that should take the same route.
    pub fn http_proxy(&self) -> Result<Option<reqwest::Proxy>, CheckError> {
        let url = match &self.route {
            Route::Direct => return Ok(None),
            Route::HttpConnect(addr) => format!("http://{}", addr),
            Route::Socks5(addr) => format!("socks5h://{}", addr),
        };
        reqwest::Proxy::all(&url)
            .map(Some)
            .map_err(|e| CheckError::ProxyUnavailable {
                addr: self.proxy_addr().unwrap_or_default().to_string(),
                reason: e.to_string(),
            })
    }

    pub async fn dial(&self, target: &Address) -> Result<BoxedStream, DialError> {
        let addr = target.to_string();
        let attempt = async {
            let stream: BoxedStream = match &self.route {
                Route::Direct => Box::new(
                    TcpStream::connect((target.host.as_str(), target.port))
                        .await
                        .map_err(|e| DialError::from_io(&addr, e))?,
                ),
                Route::HttpConnect(proxy) => Box::new(http_connect(proxy, &addr).await?),
                Route::Socks5(proxy) => Box::new(
                    Socks5Stream::connect(proxy.as_str(), (target.host.as_str(), target.port))
                        .await
                        .map_err(|source| DialError::Socks {
                            addr: addr.clone(),
                            source,
                        })?,
                ),
            };
            Ok::<_, DialError>(stream)
        };

        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(DialError::Timeout {
                addr: addr.clone(),
                timeout: self.timeout,
            }),
        }
    }
}

async fn http_connect(proxy: &str, target: &str) -> Result<TcpStream, DialError> {
    let mut stream = TcpStream::connect(proxy)
        .await
        .map_err(|e| DialError::from_io(proxy, e))?;

    let (status, reason) = connect_handshake(&mut stream, target)
        .await
        .map_err(|source| DialError::Io {
            addr: proxy.to_string(),
            source,
        })?;

    if status != 200 {
        log::debug!("Proxy {} rejected CONNECT {}: {} {}", proxy, target, status, reason);
        return Err(DialError::ProxyConnectRejected { status, reason });
    }
    Ok(stream)
}

pub(crate) async fn connect_handshake<S>(stream: &mut S, target: &str) -> io::Result<(u16, String)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    send_connect(stream, target).await?;
    read_connect_reply(stream).await
}

pub(crate) async fn send_connect<S>(stream: &mut S, target: &str) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let request = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n\r\n", target);
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await
}

/// Reads the reply head byte by byte so nothing past the blank line is consumed;
/// on success the stream is positioned at the start of the tunnel.
pub(crate) async fn read_connect_reply<S>(stream: &mut S) -> io::Result<(u16, String)>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(128);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_REPLY_HEAD {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "reply head too large"));
        }
        if stream.read(&mut byte).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "proxy closed connection before replying",
            ));
        }
        head.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&head);
    let status_line = head.lines().next().unwrap_or_default();
    parse_status_line(status_line)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("malformed status line {:?}", status_line)))
}

fn parse_status_line(line: &str) -> Option<(u16, String)> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    let status = parts.next()?.parse::<u16>().ok()?;
    let reason = parts.next().unwrap_or_default().trim().to_string();
    Some((status, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::resolve;
    use tokio::net::TcpListener;

    #[test]
    fn parses_status_lines() {
        assert_eq!(
            parse_status_line("HTTP/1.1 200 Connection established"),
            Some((200, "Connection established".to_string()))
        );
        assert_eq!(parse_status_line("HTTP/1.0 403"), Some((403, String::new())));
        assert_eq!(parse_status_line("SSH-2.0-OpenSSH"), None);
        assert_eq!(parse_status_line("HTTP/1.1 abc Bad"), None);
    }

    #[tokio::test]
    async fn reply_reader_stops_at_blank_line() {
        let (mut client, mut server) = tokio::io::duplex(256);
        server
            .write_all(b"HTTP/1.1 200 OK\r\nVia: test\r\n\r\ntunnel-bytes")
            .await
            .unwrap();

        let (status, _) = read_connect_reply(&mut client).await.unwrap();
        assert_eq!(status, 200);

        let mut rest = [0u8; 12];
        client.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"tunnel-bytes");
    }

    #[tokio::test]
    async fn empty_proxy_builds_direct_strategy() {
        let strategy = DialStrategy::build("", Duration::from_secs(1)).await.unwrap();
        assert_eq!(strategy.route(), &Route::Direct);
        assert!(strategy.http_proxy().unwrap().is_none());
    }

    #[test]
    fn http_proxy_follows_route() {
        let socks = DialStrategy::for_kind(ProxyKind::Socks5, "127.0.0.1:1080", Duration::from_secs(1));
        assert_eq!(socks.proxy_addr(), Some("127.0.0.1:1080"));
        assert!(socks.http_proxy().unwrap().is_some());
    }

    #[tokio::test]
    async fn direct_dial_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = resolve(&listener.local_addr().unwrap().to_string()).unwrap();

        let strategy = DialStrategy::direct(Duration::from_secs(2));
        assert!(strategy.dial(&target).await.is_ok());
    }

    #[tokio::test]
    async fn direct_dial_to_closed_port_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = resolve(&listener.local_addr().unwrap().to_string()).unwrap();
        drop(listener);

        let err = match DialStrategy::direct(Duration::from_secs(2)).dial(&target).await {
            Ok(_) => panic!("dial to closed port succeeded"),
            Err(e) => e,
        };
        assert!(matches!(err, DialError::Refused { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn http_connect_rejection_surfaces_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = read_connect_reply(&mut socket).await;
            let _ = socket.write_all(b"HTTP/1.1 403 Forbidden\r\n\r\n").await;
        });

        let strategy = DialStrategy::for_kind(ProxyKind::HttpConnect, &proxy, Duration::from_secs(2));
        let target = resolve("example.com:443").unwrap();
        let err = match strategy.dial(&target).await {
            Ok(_) => panic!("rejected CONNECT produced a tunnel"),
            Err(e) => e,
        };
        match err {
            DialError::ProxyConnectRejected { status, .. } => assert_eq!(status, 403),
            other => panic!("unexpected {:?}", other),
        }
    }
}
