//! Client address resolution.
//!
//! The service usually runs behind a CDN or reverse proxy, so the socket peer
//! is rarely the real client. Proxy headers are consulted first, in order:
//! `CF-Connecting-IP`, the first `X-Forwarded-For` entry, `X-Real-IP`. The
//! socket peer address (without port) is the last resort.

use std::net::SocketAddr;

use axum::http::HeaderMap;

const CF_CONNECTING_IP: &str = "cf-connecting-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Address used when neither headers nor the socket identify the client.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the client address for a request.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(ip) = header_value(headers, CF_CONNECTING_IP) {
        return normalize(ip);
    }

    if let Some(first) = header_value(headers, X_FORWARDED_FOR)
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return normalize(first);
    }

    if let Some(ip) = header_value(headers, X_REAL_IP) {
        return normalize(ip);
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// "[::1]" and "[::1]:443" both become "::1"; plain "1.2.3.4:80" loses its port.
fn normalize(raw: &str) -> String {
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }
    raw.trim_start_matches('[')
        .trim_end_matches(']')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.10:54321".parse().unwrap())
    }

    #[test]
    fn test_cloudflare_header_wins() {
        let h = headers(&[
            ("cf-connecting-ip", "203.0.113.1"),
            ("x-forwarded-for", "198.51.100.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_ip(&h, peer()), "203.0.113.1");
    }

    #[test]
    fn test_first_forwarded_entry() {
        let h = headers(&[
            ("x-forwarded-for", "198.51.100.1, 10.0.0.1, 10.0.0.2"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_ip(&h, peer()), "198.51.100.1");
    }

    #[test]
    fn test_real_ip_fallback() {
        let h = headers(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_ip(&h, peer()), "198.51.100.2");
    }

    #[test]
    fn test_peer_address_without_port() {
        assert_eq!(client_ip(&HeaderMap::new(), peer()), "192.0.2.10");

        let v6: SocketAddr = "[2001:db8::1]:8080".parse().unwrap();
        assert_eq!(client_ip(&HeaderMap::new(), Some(v6)), "2001:db8::1");
    }

    #[test]
    fn test_no_information() {
        assert_eq!(client_ip(&HeaderMap::new(), None), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_empty_headers_ignored() {
        let h = headers(&[("cf-connecting-ip", "  "), ("x-forwarded-for", ",")]);
        assert_eq!(client_ip(&h, peer()), "192.0.2.10");
    }

    #[test]
    fn test_bracketed_ipv6_normalized() {
        let h = headers(&[("x-real-ip", "[2001:db8::5]")]);
        assert_eq!(client_ip(&h, None), "2001:db8::5");

        let h = headers(&[("x-forwarded-for", "[2001:db8::6]:443, 10.0.0.1")]);
        assert_eq!(client_ip(&h, None), "2001:db8::6");
    }
}
