use std::fmt;

use serde::Serialize;
use url::Url;

use crate::error::CheckError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    None,
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(self) -> Option<u16> {
        match self {
            Scheme::None => None,
            Scheme::Http => Some(80),
            Scheme::Https => Some(443),
        }
    }
}

/// A target as the rest of the prober sees it. `host` never carries a scheme
/// or IPv6 brackets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub host: String,
    pub port: u16,
    pub scheme: Scheme,
}

impl Address {
    pub fn has_scheme(&self) -> bool {
        self.scheme != Scheme::None
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parses `host:port`, `[v6]:port` or an `http`/`https` URL into an [`Address`].
pub fn resolve(raw: &str) -> Result<Address, CheckError> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(CheckError::invalid_address(raw, "empty address"));
    }

    match input.split_once("://") {
        Some((scheme, _)) => resolve_url(input, scheme),
        None => resolve_host_port(input),
    }
}

fn resolve_url(input: &str, scheme: &str) -> Result<Address, CheckError> {
    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        _ => return Err(CheckError::UnsupportedScheme(scheme.to_string())),
    };

    let url = Url::parse(input).map_err(|e| CheckError::invalid_address(input, e.to_string()))?;
    let host = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CheckError::invalid_address(input, "missing host"))?;

    // `Url::port` hides a port equal to the scheme default, which is the same answer.
    let port = match url.port() {
        Some(0) => return Err(CheckError::invalid_address(input, "port out of range 1-65535")),
        Some(port) => port,
        None => scheme.default_port().unwrap_or(80),
    };

    Ok(Address {
        host: host.to_string(),
        port,
        scheme,
    })
}

fn resolve_host_port(input: &str) -> Result<Address, CheckError> {
    let (host, port) = if let Some(rest) = input.strip_prefix('[') {
        rest.split_once("]:")
            .ok_or_else(|| CheckError::invalid_address(input, "missing port in address"))?
    } else {
        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| CheckError::invalid_address(input, "missing port in address"))?;
        if host.contains(':') {
            return Err(CheckError::invalid_address(input, "too many colons in address"));
        }
        (host, port)
    };

    if host.is_empty() {
        return Err(CheckError::invalid_address(input, "missing host"));
    }

    Ok(Address {
        host: host.to_string(),
        port: parse_port(input, port)?,
        scheme: Scheme::None,
    })
}

fn parse_port(input: &str, port: &str) -> Result<u16, CheckError> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(CheckError::invalid_address(
            input,
            format!("invalid port {:?}, expected 1-65535", port),
        )),
        Ok(port) => Ok(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_port_round_trips() {
        for raw in ["8.8.8.8:53", "example.com:443", "localhost:1", "[::1]:8080"] {
            let addr = resolve(raw).unwrap();
            assert_eq!(addr.scheme, Scheme::None);
            assert_eq!(addr.to_string(), raw);
        }
    }

    #[test]
    fn ipv6_host_has_no_brackets() {
        let addr = resolve("[2001:db8::1]:443").unwrap();
        assert_eq!(addr.host, "2001:db8::1");
        assert_eq!(addr.port, 443);
    }

    #[test]
    fn url_without_port_uses_scheme_default() {
        let http = resolve("http://example.com").unwrap();
        assert_eq!((http.host.as_str(), http.port, http.scheme), ("example.com", 80, Scheme::Http));

        let https = resolve("https://example.com/path?q=1").unwrap();
        assert_eq!((https.host.as_str(), https.port, https.scheme), ("example.com", 443, Scheme::Https));
    }

    #[test]
    fn url_with_explicit_port_keeps_it() {
        assert_eq!(resolve("http://example.com:8080").unwrap().port, 8080);
        assert_eq!(resolve("https://example.com:80/").unwrap().port, 80);
        assert_eq!(resolve("https://example.com:443").unwrap().port, 443);
        assert_eq!(resolve("https://[::1]:9443").unwrap().host, "::1");
    }

    #[test]
    fn rejects_malformed_bare_addresses() {
        for raw in ["", "example.com", "example.com:", ":80", "host:http", "host:0", "host:65536", "::1:80"] {
            match resolve(raw) {
                Err(CheckError::InvalidAddress { .. }) => {}
                other => panic!("{:?} resolved to {:?}", raw, other),
            }
        }
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(matches!(
            resolve("http://example.com:0"),
            Err(CheckError::InvalidAddress { .. })
        ));
        assert!(matches!(
            resolve("http://example.com:70000"),
            Err(CheckError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn rejects_unsupported_scheme() {
        match resolve("ftp://example.com") {
            Err(CheckError::UnsupportedScheme(s)) => assert_eq!(s, "ftp"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
