//! Client address normalisation.
//!
//! The same client must always map to the same key in the blocklist and the
//! window counters, no matter how the address was written.

use std::net::IpAddr;

/// Normalise a raw client identifier.
///
/// Returns `None` for empty or whitespace-only input. Parseable IPs are
/// rendered canonically, with IPv4-mapped IPv6 folded to plain IPv4. Anything
/// else is kept as an opaque trimmed string.
pub fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.parse::<IpAddr>() {
        Ok(ip) => Some(canonical_ip(ip).to_string()),
        Err(_) => Some(trimmed.to_string()),
    }
}

/// Fold IPv4-mapped IPv6 (`::ffff:a.b.c.d`) down to IPv4.
pub fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}
