//! Node endpoint URIs: `scheme://host:port[?query]`.

use crate::network::NetworkError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Transport scheme of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// In-process registry transport, for tests and local development.
    Memory,
    /// HTTP transport.
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Memory => "memory",
            Scheme::Https => "https",
        }
    }
}

/// A parsed node endpoint.
///
/// `memory` endpoints have no port and peer through a shared in-process
/// registry keyed by host name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub query: Option<String>,
}

impl Endpoint {
    /// Parse `scheme://host[:port][?query]`.
    pub fn parse(s: &str) -> Result<Endpoint, NetworkError> {
        let err = || NetworkError::InvalidEndpoint(s.to_string());

        let (scheme, rest) = s.split_once("://").ok_or_else(err)?;
        let scheme = match scheme {
            "memory" => Scheme::Memory,
            "https" => Scheme::Https,
            _ => return Err(err()),
        };

        let (authority, query) = match rest.split_once('?') {
            Some((a, q)) => (a, Some(q.to_string())),
            None => (rest, None),
        };
        if authority.is_empty() {
            return Err(err());
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => (h.to_string(), p.parse::<u16>().map_err(|_| err())?),
            None => (authority.to_string(), 0),
        };
        if host.is_empty() {
            return Err(err());
        }
        if scheme == Scheme::Https && port == 0 {
            return Err(err());
        }

        Ok(Endpoint {
            scheme,
            host,
            port,
            query,
        })
    }

    pub fn memory(name: &str) -> Endpoint {
        Endpoint {
            scheme: Scheme::Memory,
            host: name.to_string(),
            port: 0,
            query: None,
        }
    }

    /// The `host:port` pair, as bound by the HTTP listener.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL without the query, used by HTTP clients.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::Memory => write!(f, "memory://{}", self.host)?,
            Scheme::Https => write!(f, "https://{}:{}", self.host, self.port)?,
        }
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

impl FromStr for Endpoint {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Endpoint::parse(&s).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_https_with_port_and_query() {
        let ep = Endpoint::parse("https://10.0.0.4:12345?tls=strict").unwrap();
        assert_eq!(ep.scheme, Scheme::Https);
        assert_eq!(ep.host, "10.0.0.4");
        assert_eq!(ep.port, 12345);
        assert_eq!(ep.query.as_deref(), Some("tls=strict"));
        assert_eq!(ep.to_string(), "https://10.0.0.4:12345?tls=strict");
    }

    #[test]
    fn parses_memory_without_port() {
        let ep = Endpoint::parse("memory://n0").unwrap();
        assert_eq!(ep.scheme, Scheme::Memory);
        assert_eq!(ep.host, "n0");
        assert_eq!(ep.to_string(), "memory://n0");
    }

    #[test]
    fn rejects_malformed_endpoints() {
        for bad in [
            "ftp://x:1",
            "https://",
            "https://host",
            "https://host:notaport",
            "plainstring",
            "https://:123",
        ] {
            assert!(Endpoint::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn serde_round_trip() {
        let ep = Endpoint::parse("https://localhost:8080").unwrap();
        let json = serde_json::to_string(&ep).unwrap();
        assert_eq!(json, "\"https://localhost:8080\"");
        let back: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ep);
    }
}
