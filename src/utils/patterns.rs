// src/utils/patterns.rs - route globs, CIDR ranges and log-safe truncation
use glob::Pattern;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Maximum characters of a user-supplied value that ever reaches a log line.
pub const LOG_SAMPLE_LEN: usize = 100;

/// fnmatch-style match where `*` also crosses `/` (so `api/*` covers `api/v1/users`).
pub fn glob_match(pattern: &str, value: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(compiled) => compiled.matches(value),
        Err(_) => pattern == value,
    }
}

/// A set of route globs compiled once at layer construction.
#[derive(Debug, Clone, Default)]
pub struct RouteMatcher {
    patterns: Vec<Pattern>,
    literals: Vec<String>,
}

impl RouteMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut matcher = Self::default();
        for raw in patterns {
            let raw = raw.as_ref().trim_start_matches('/');
            match Pattern::new(raw) {
                Ok(pattern) => matcher.patterns.push(pattern),
                Err(e) => {
                    tracing::warn!("Invalid route glob {:?} treated as literal: {}", raw, e);
                    matcher.literals.push(raw.to_string());
                }
            }
        }
        matcher
    }

    pub fn matches(&self, route: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(route)) || self.literals.iter().any(|l| l == route)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.literals.is_empty()
    }
}

/// Truncates on a char boundary to at most `max` characters.
pub fn truncate(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

/// Loopback, RFC 1918, link-local and IPv6 unique-local addresses.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            v6.is_loopback() || v6.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

/// A single address or a CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    network: IpAddr,
    prefix: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIpRange(pub String);

impl fmt::Display for InvalidIpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid IP range {:?}", self.0)
    }
}

impl std::error::Error for InvalidIpRange {}

impl IpRange {
    pub fn single(ip: IpAddr) -> Self {
        let prefix = if ip.is_ipv4() { 32 } else { 128 };
        Self { network: ip, prefix }
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = prefix_mask_u32(self.prefix);
                (u32::from(net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = prefix_mask_u128(self.prefix);
                (u128::from(net) & mask) == (u128::from(*addr) & mask)
            }
            (IpAddr::V4(_), IpAddr::V6(addr)) => match addr.to_ipv4_mapped() {
                Some(v4) => self.contains(&IpAddr::V4(v4)),
                None => false,
            },
            (IpAddr::V6(_), IpAddr::V4(_)) => false,
        }
    }
}

fn prefix_mask_u32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn prefix_mask_u128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for IpRange {
    type Err = InvalidIpRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || InvalidIpRange(s.to_string());

        let Some((addr, prefix)) = s.split_once('/') else {
            return s.parse().map(IpRange::single).map_err(|_| invalid());
        };

        let network: IpAddr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(invalid());
        }

        Ok(Self { network, prefix })
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_crosses_segments() {
        assert!(glob_match("api/*", "api/v1/users"));
        assert!(glob_match("login", "login"));
        assert!(!glob_match("api/*", "apix"));
        assert!(glob_match("https://*.example.com", "https://app.example.com"));
    }

    #[test]
    fn test_route_matcher_strips_leading_slash() {
        let matcher = RouteMatcher::new(&["/trusted/*", "webhooks/*"]);
        assert!(matcher.matches("trusted/import"));
        assert!(matcher.matches("webhooks/stripe"));
        assert!(!matcher.matches("admin"));
        assert!(RouteMatcher::new::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_cidr_ranges() {
        let range: IpRange = "192.168.1.0/24".parse().unwrap();
        assert!(range.contains(&"192.168.1.77".parse().unwrap()));
        assert!(!range.contains(&"192.168.2.1".parse().unwrap()));

        let single: IpRange = "203.0.113.9".parse().unwrap();
        assert!(single.contains(&"203.0.113.9".parse().unwrap()));
        assert!(!single.contains(&"203.0.113.10".parse().unwrap()));

        let v6: IpRange = "2001:db8::/32".parse().unwrap();
        assert!(v6.contains(&"2001:db8::1".parse().unwrap()));
        assert!(!v6.contains(&"10.0.0.1".parse().unwrap()));

        let mapped: IpAddr = "::ffff:10.1.2.3".parse().unwrap();
        assert!("10.0.0.0/8".parse::<IpRange>().unwrap().contains(&mapped));

        assert!("10.0.0.0/33".parse::<IpRange>().is_err());
        assert!("not-an-ip".parse::<IpRange>().is_err());
        assert!("0.0.0.0/0".parse::<IpRange>().unwrap().contains(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_private_ranges() {
        assert!(is_private_ip(&"127.0.0.1".parse().unwrap()));
        assert!(is_private_ip(&"10.20.30.40".parse().unwrap()));
        assert!(is_private_ip(&"192.168.0.5".parse().unwrap()));
        assert!(is_private_ip(&"::1".parse().unwrap()));
        assert!(is_private_ip(&"fd00::1".parse().unwrap()));
        assert!(!is_private_ip(&"8.8.8.8".parse().unwrap()));
        assert!(!is_private_ip(&"2606:4700::1111".parse().unwrap()));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 100), "short");
    }
}
