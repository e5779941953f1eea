//! Hostname resolution for the exchange stream endpoint

use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use tracing::{debug, error};

use crate::error::MarketDataError;

/// Turns a hostname into the IPv4 addresses to open connections to
#[cfg_attr(test, mockall::automock)]
pub trait Resolver: Send + Sync {
    /// Distinct IPv4 addresses in resolution order; empty on failure
    fn resolve(&self, host: &str) -> Vec<Ipv4Addr>;
}

/// Resolver backed by the system's `getaddrinfo`. Blocking.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str) -> Vec<Ipv4Addr> {
        let addrs = match (host, 0u16).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                let err = MarketDataError::Resolution {
                    host: host.to_string(),
                    reason: e.to_string(),
                };
                error!(error = %err, "DNS lookup failed");
                return Vec::new();
            }
        };

        let ips = distinct_ipv4(addrs.map(|addr| addr.ip()));
        debug!(host = %host, count = ips.len(), "Resolved host");
        ips
    }
}

/// Keep IPv4 addresses only, first occurrence wins
fn distinct_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Vec<Ipv4Addr> {
    let mut ips: Vec<Ipv4Addr> = Vec::new();
    for addr in addrs {
        if let IpAddr::V4(ip) = addr {
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }
    }
    ips
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_distinct_ipv4_keeps_order() {
        let addrs = vec![
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        ];

        assert_eq!(
            distinct_ipv4(addrs),
            vec![Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1)]
        );
    }

    #[test]
    fn test_resolve_ip_literal() {
        let ips = SystemResolver.resolve("127.0.0.1");
        assert_eq!(ips, vec![Ipv4Addr::LOCALHOST]);
    }

    #[test]
    fn test_resolve_failure_is_empty() {
        let ips = SystemResolver.resolve("name.invalid");
        assert!(ips.is_empty());
    }

    #[test]
    fn test_mock_resolver() {
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .withf(|host| host == "stream.binance.com")
            .returning(|_| vec![Ipv4Addr::new(52, 0, 0, 1)]);

        assert_eq!(resolver.resolve("stream.binance.com").len(), 1);
    }
}
