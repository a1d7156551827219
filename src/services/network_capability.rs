//! One-shot local network capability detection
//!
//! Opens a TCP connection to a well-known IPv4 and IPv6 target and compares
//! connect latency. The faster reachable family becomes the dispatch
//! preference of the run when the configured preference is `auto`.

use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::models::AddressFamily;

/// Connect latency per family, `None` when unreachable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkCapabilities {
    pub ipv4: Option<Duration>,
    pub ipv6: Option<Duration>,
}

impl NetworkCapabilities {
    /// Faster reachable family; IPv6 wins a tie
    pub fn preferred_family(&self) -> Option<AddressFamily> {
        match (self.ipv4, self.ipv6) {
            (Some(v4), Some(v6)) if v4 < v6 => Some(AddressFamily::Ipv4),
            (Some(_), Some(_)) => Some(AddressFamily::Ipv6),
            (Some(_), None) => Some(AddressFamily::Ipv4),
            (None, Some(_)) => Some(AddressFamily::Ipv6),
            (None, None) => None,
        }
    }
}

pub struct NetworkCapabilityProbe {
    config: NetworkConfig,
}

impl NetworkCapabilityProbe {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    async fn connect_latency(&self, target: &str) -> Option<Duration> {
        let started = Instant::now();
        match tokio::time::timeout(self.config.probe_timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => Some(started.elapsed()),
            Ok(Err(e)) => {
                debug!("Capability probe to {target} failed: {e}");
                None
            }
            Err(_) => {
                debug!("Capability probe to {target} timed out");
                None
            }
        }
    }

    /// Measure both families concurrently
    pub async fn detect(&self) -> NetworkCapabilities {
        let (ipv4, ipv6) = tokio::join!(
            self.connect_latency(&self.config.ipv4_target),
            self.connect_latency(&self.config.ipv6_target)
        );
        NetworkCapabilities { ipv4, ipv6 }
    }

    /// Family to dispatch first: explicit preference, or detection for `auto`
    pub async fn resolve_preference(&self) -> Option<AddressFamily> {
        if let Some(family) = self.config.address_preference.family() {
            debug!("Using configured address preference {family}");
            return Some(family);
        }

        let capabilities = self.detect().await;
        let preferred = capabilities.preferred_family();
        info!(
            "Network capabilities: IPv4 {}, IPv6 {}, preferring {}",
            describe(capabilities.ipv4),
            describe(capabilities.ipv6),
            preferred.map_or_else(|| "none".to_string(), |f| f.to_string())
        );
        preferred
    }
}

fn describe(latency: Option<Duration>) -> String {
    match latency {
        Some(latency) => format!("available ({}ms)", latency.as_millis()),
        None => "unavailable".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AddressPreference;
    use rstest::rstest;

    const FAST: Option<Duration> = Some(Duration::from_millis(10));
    const SLOW: Option<Duration> = Some(Duration::from_millis(50));

    #[rstest]
    #[case(FAST, SLOW, Some(AddressFamily::Ipv4))]
    #[case(SLOW, FAST, Some(AddressFamily::Ipv6))]
    #[case(FAST, FAST, Some(AddressFamily::Ipv6))]
    #[case(SLOW, None, Some(AddressFamily::Ipv4))]
    #[case(None, SLOW, Some(AddressFamily::Ipv6))]
    #[case(None, None, None)]
    fn preference_follows_latency(
        #[case] ipv4: Option<Duration>,
        #[case] ipv6: Option<Duration>,
        #[case] expected: Option<AddressFamily>,
    ) {
        assert_eq!(NetworkCapabilities { ipv4, ipv6 }.preferred_family(), expected);
    }

    #[tokio::test]
    async fn explicit_preference_skips_detection() {
        let probe = NetworkCapabilityProbe::new(NetworkConfig {
            address_preference: AddressPreference::Ipv6,
            ipv4_target: "invalid target".to_string(),
            ipv6_target: "invalid target".to_string(),
            ..NetworkConfig::default()
        });
        assert_eq!(probe.resolve_preference().await, Some(AddressFamily::Ipv6));
    }

    #[tokio::test]
    async fn detects_reachable_family() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().to_string();
        let closed = {
            let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            socket.local_addr().unwrap().to_string()
        };

        let probe = NetworkCapabilityProbe::new(NetworkConfig {
            ipv4_target: open,
            ipv6_target: closed,
            probe_timeout: Duration::from_secs(1),
            ..NetworkConfig::default()
        });
        let capabilities = probe.detect().await;
        assert!(capabilities.ipv4.is_some());
        assert!(capabilities.ipv6.is_none());
        assert_eq!(probe.resolve_preference().await, Some(AddressFamily::Ipv4));
    }
}
