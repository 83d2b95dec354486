use std::net::IpAddr;
use std::str::FromStr;

use crate::error::EndpointError;

pub const DEFAULT_WEIGHT: u32 = 1000;

/// An immutable remote target (§3 "Endpoint").
///
/// Ordering is by `(authority, weight)` so that endpoint lists communicated
/// by value compare and sort the same way everywhere; `ip` and `is_group`
/// are not part of the sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    authority: String,
    ip: Option<IpAddr>,
    weight: u32,
    is_group: bool,
}

impl PartialOrd for Endpoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Endpoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.authority, self.weight).cmp(&(&other.authority, other.weight))
    }
}

impl Endpoint {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            ip: None,
            weight: DEFAULT_WEIGHT,
            is_group: false,
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    #[must_use]
    pub fn as_group(mut self) -> Self {
        self.is_group = true;
        self
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn is_group(&self) -> bool {
        self.is_group
    }

    /// Parses `host[:port[:weight]]` (§6 "Endpoint syntax"). Port, if
    /// present, becomes part of the authority; weight defaults to
    /// [`DEFAULT_WEIGHT`] when absent.
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        let mut parts = s.splitn(3, ':');
        let host = parts.next().filter(|h| !h.is_empty());
        let Some(host) = host else {
            return Err(EndpointError::InvalidSyntax(s.to_owned()));
        };

        let port = parts.next();
        let weight = parts.next();

        let authority = match port {
            Some(port) => {
                u16::from_str(port).map_err(|_| EndpointError::InvalidSyntax(s.to_owned()))?;
                format!("{host}:{port}")
            }
            None => host.to_owned(),
        };

        let weight = match weight {
            Some(w) => w.parse().map_err(|_| EndpointError::InvalidSyntax(s.to_owned()))?,
            None => DEFAULT_WEIGHT,
        };

        Ok(Self {
            authority,
            ip: None,
            weight,
            is_group: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_only() {
        let e = Endpoint::parse("svc.local").unwrap();
        assert_eq!(e.authority(), "svc.local");
        assert_eq!(e.weight(), DEFAULT_WEIGHT);
    }

    #[test]
    fn parses_host_port_weight() {
        let e = Endpoint::parse("svc.local:8080:500").unwrap();
        assert_eq!(e.authority(), "svc.local:8080");
        assert_eq!(e.weight(), 500);
    }

    #[test]
    fn rejects_empty_host() {
        assert!(Endpoint::parse(":8080").is_err());
    }

    #[test]
    fn orders_by_authority_then_weight() {
        let mut endpoints = vec![
            Endpoint::new("b").with_weight(1),
            Endpoint::new("a").with_weight(2),
            Endpoint::new("a").with_weight(1),
        ];
        endpoints.sort();
        let authorities: Vec<_> = endpoints.iter().map(|e| (e.authority(), e.weight())).collect();
        assert_eq!(authorities, vec![("a", 1), ("a", 2), ("b", 1)]);
    }

    #[test]
    fn ip_never_breaks_an_authority_weight_tie() {
        use std::net::{IpAddr, Ipv4Addr};

        let mut endpoints = vec![
            Endpoint::new("a").with_weight(1).with_ip(IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9))),
            Endpoint::new("a").with_weight(1).with_ip(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))),
        ];
        endpoints.sort();
        // Same (authority, weight): order between them is a tie regardless of `ip`.
        assert_eq!(endpoints[0].weight(), endpoints[1].weight());
        assert_eq!(endpoints[0].authority(), endpoints[1].authority());

        let with_high_ip_low_weight = Endpoint::new("a").with_weight(1).with_ip(IpAddr::V4(Ipv4Addr::new(255, 255, 255, 255)));
        let with_low_ip_high_weight = Endpoint::new("a").with_weight(2).with_ip(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        assert!(with_high_ip_low_weight < with_low_ip_high_weight, "weight must decide before ip");
    }

    proptest::proptest! {
        /// No matter how `ip`/`is_group` are assigned, sorting a batch of
        /// endpoints must agree with ordering by `(authority, weight)` alone.
        #[test]
        fn sort_order_always_matches_authority_then_weight(
            entries in proptest::collection::vec(
                (
                    proptest::sample::select(vec!["a", "b", "c"]),
                    0u32..5,
                    proptest::bool::ANY,
                    proptest::bool::ANY,
                ),
                0..30,
            )
        ) {
            let mut endpoints: Vec<Endpoint> = entries
                .iter()
                .map(|(authority, weight, has_ip, is_group)| {
                    let mut e = Endpoint::new(*authority).with_weight(*weight);
                    if *has_ip {
                        e = e.with_ip(std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)));
                    }
                    if *is_group {
                        e = e.as_group();
                    }
                    e
                })
                .collect();
            endpoints.sort();

            let mut expected: Vec<(&str, u32)> = entries.iter().map(|(a, w, _, _)| (*a, *w)).collect();
            expected.sort();

            let actual: Vec<(&str, u32)> = endpoints.iter().map(|e| (e.authority(), e.weight())).collect();
            proptest::prop_assert_eq!(actual, expected);
        }
    }
}
