//! Connection targets derived from URLs.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::{Host, Url};

use crate::{Result, TransportError};

/// The scheme, host, and port a pool connects to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    /// URL scheme, lowercase.
    pub scheme: String,
    /// Host name or IP literal (IPv6 without brackets).
    pub host: String,
    /// Port, explicit or the scheme default.
    pub port: u16,
}

impl Origin {
    /// Create an origin from its parts.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Parse an origin from a URL string.
    pub fn parse(url: &str) -> Result<Self> {
        Self::from_url(&Url::parse(url)?)
    }

    /// Extract the origin of a parsed URL.
    ///
    /// Without an explicit port, `https` defaults to 443 and every other
    /// scheme to 80.
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => {
                return Err(TransportError::InvalidUrl(format!(
                    "URL has no host: {}",
                    url
                )));
            }
        };

        let scheme = url.scheme().to_string();
        let port = url.port().unwrap_or_else(|| default_port(&scheme));

        Ok(Self { scheme, host, port })
    }

    /// Check if connections to this origin should use TLS.
    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }
}

/// Default port for a URL scheme.
pub fn default_port(scheme: &str) -> u16 {
    if scheme == "https" { 443 } else { 80 }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl std::str::FromStr for Origin {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        let origin = Origin::parse("https://example.com/path?q=1").unwrap();
        assert_eq!(origin, Origin::new("https", "example.com", 443));
        assert!(origin.is_secure());

        let origin = Origin::parse("http://example.com").unwrap();
        assert_eq!(origin.port, 80);
        assert!(!origin.is_secure());

        // Any scheme other than https gets port 80.
        let origin = Origin::parse("ws://example.com").unwrap();
        assert_eq!(origin.port, 80);
    }

    #[test]
    fn test_explicit_port() {
        let origin: Origin = "https://example.com:8443".parse().unwrap();
        assert_eq!(origin.port, 8443);
        assert_eq!(origin.to_string(), "example.com:8443");
    }

    #[test]
    fn test_ip_hosts() {
        let origin = Origin::parse("http://127.0.0.1:8080").unwrap();
        assert_eq!(origin.host, "127.0.0.1");

        let origin = Origin::parse("http://[::1]:8080").unwrap();
        assert_eq!(origin.host, "::1");
        assert_eq!(origin.to_string(), "[::1]:8080");
    }

    #[test]
    fn test_url_without_host() {
        let err = Origin::parse("mailto:user@example.com").unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));

        let err = Origin::parse("not a url").unwrap_err();
        assert!(matches!(err, TransportError::UrlParse(_)));
    }
}
