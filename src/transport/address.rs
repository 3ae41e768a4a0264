//! Endpoint address normalization.

use serde::{Deserialize, Serialize};

/// Default bsread port, used when an address omits one.
pub const DEFAULT_PORT: u16 = 9999;

/// A normalized endpoint address.
///
/// Accepts the shorthand forms operators actually type: a bare
/// `host[:port]` gets the `tcp://` scheme prefixed, a missing port defaults
/// to 9999, and any address containing `*` binds instead of connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    endpoint: String,
    bind: bool,
}

impl Address {
    /// Normalize an address string.
    pub fn parse(address: &str) -> Self {
        let address = address.trim();
        let with_scheme = if address.contains("://") {
            address.to_string()
        } else {
            format!("tcp://{address}")
        };

        // Port check applies to the authority part only
        let endpoint = match with_scheme.split_once("://") {
            Some((scheme, rest)) if !rest.contains(':') => {
                format!("{scheme}://{rest}:{DEFAULT_PORT}")
            }
            _ => with_scheme,
        };

        let bind = endpoint.contains('*');
        Self { endpoint, bind }
    }

    /// The normalized endpoint string handed to the socket layer.
    ///
    /// Binding endpoints translate the ZeroMQ `*` wildcard into the bind
    /// form the transport understands.
    pub fn endpoint(&self) -> String {
        if self.bind { self.endpoint.replace('*', "0.0.0.0") } else { self.endpoint.clone() }
    }

    /// Whether this address binds (listens) rather than connects.
    pub fn is_bind(&self) -> bool {
        self.bind
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.endpoint)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_scheme_and_port() {
        let addr = Address::parse("localhost");
        assert_eq!(addr.to_string(), "tcp://localhost:9999");
        assert!(!addr.is_bind());

        let addr = Address::parse("localhost:5555");
        assert_eq!(addr.to_string(), "tcp://localhost:5555");
    }

    #[test]
    fn keeps_existing_scheme() {
        let addr = Address::parse("tcp://10.0.0.1:8000");
        assert_eq!(addr.to_string(), "tcp://10.0.0.1:8000");

        let addr = Address::parse("tcp://10.0.0.1");
        assert_eq!(addr.to_string(), "tcp://10.0.0.1:9999");
    }

    #[test]
    fn wildcard_means_bind() {
        let addr = Address::parse("tcp://*:9000");
        assert!(addr.is_bind());
        assert_eq!(addr.endpoint(), "tcp://0.0.0.0:9000");

        assert!(Address::parse("*").is_bind());
        assert!(!Address::parse("tcp://127.0.0.1:9000").is_bind());
    }
}
