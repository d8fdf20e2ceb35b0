use std::net::IpAddr;

use url::Url;

/// Longest target string accepted as a hostname.
const MAX_HOSTNAME_LEN: usize = 256;

/// Kind of check a target string selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Http,
    Tcp,
    Icmp,
    Invalid,
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckKind::Http => write!(f, "http"),
            CheckKind::Tcp => write!(f, "tcp"),
            CheckKind::Icmp => write!(f, "icmp"),
            CheckKind::Invalid => write!(f, "invalid"),
        }
    }
}

/// Classify a target string into the check kind used to probe it.
///
/// Rules, in order:
/// - `http://` or `https://` prefix parsing as an absolute URL selects HTTP.
/// - `host:port` (or `[v6]:port`) with a valid host part and a port in
///   `1..=65536` selects TCP.
/// - A bare hostname or IP literal selects ICMP.
///
/// Anything else is invalid. Pure string inspection, no I/O.
pub fn check_kind(target: &str) -> CheckKind {
    if target.is_empty() {
        return CheckKind::Invalid;
    }

    if target.starts_with("http://") || target.starts_with("https://") {
        return match Url::parse(target) {
            Ok(url) if url.has_host() => CheckKind::Http,
            _ => CheckKind::Invalid,
        };
    }

    let parts: Vec<&str> = if let Some(rest) = target.strip_prefix('[') {
        rest.split("]:").collect()
    } else {
        target.split(':').collect()
    };

    if parts.len() == 2 {
        if is_host_or_ip(parts[0]) && valid_port(parts[1]) {
            return CheckKind::Tcp;
        }
        return CheckKind::Invalid;
    }

    if is_host_or_ip(target) {
        return CheckKind::Icmp;
    }

    CheckKind::Invalid
}

/// Whether a string is a syntactically acceptable hostname or IP literal.
pub fn is_host_or_ip(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOSTNAME_LEN {
        return false;
    }

    if host.parse::<IpAddr>().is_ok() {
        return true;
    }

    host.split('.').all(valid_label)
}

/// DNS labels: 1-63 alphanumeric-or-hyphen characters, no edge hyphens.
fn valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
        return false;
    }
    if bytes[0] == b'-' || bytes[bytes.len() - 1] == b'-' {
        return false;
    }
    bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}

fn valid_port(port: &str) -> bool {
    matches!(port.parse::<i64>(), Ok(p) if p > 0 && p <= 65536)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_targets() {
        assert_eq!(check_kind("http://example.com"), CheckKind::Http);
        assert_eq!(check_kind("https://example.com/path?q=1"), CheckKind::Http);
        assert_eq!(check_kind("https://192.0.2.7:8443/health"), CheckKind::Http);
        assert_eq!(check_kind("http://"), CheckKind::Invalid);
        assert_eq!(check_kind("ftp://example.com"), CheckKind::Invalid);
    }

    #[test]
    fn test_tcp_targets() {
        assert_eq!(check_kind("example.com:80"), CheckKind::Tcp);
        assert_eq!(check_kind("192.0.2.7:22"), CheckKind::Tcp);
        assert_eq!(check_kind("[2001:db8::1]:22"), CheckKind::Tcp);
        // Port range is (0, 65536] by design.
        assert_eq!(check_kind("example.com:65536"), CheckKind::Tcp);
        assert_eq!(check_kind("example.com:0"), CheckKind::Invalid);
        assert_eq!(check_kind("example.com:65537"), CheckKind::Invalid);
        assert_eq!(check_kind("example.com:ssh"), CheckKind::Invalid);
    }

    #[test]
    fn test_icmp_targets() {
        assert_eq!(check_kind("example.com"), CheckKind::Icmp);
        assert_eq!(check_kind("sub.domain-1.example.com"), CheckKind::Icmp);
        assert_eq!(check_kind("192.0.2.7"), CheckKind::Icmp);
        assert_eq!(check_kind("::1"), CheckKind::Icmp);
        assert_eq!(check_kind("2001:db8::1"), CheckKind::Icmp);
    }

    #[test]
    fn test_invalid_targets() {
        assert_eq!(check_kind(""), CheckKind::Invalid);
        assert_eq!(check_kind("a:b:c"), CheckKind::Invalid);
        assert_eq!(check_kind("[::1]"), CheckKind::Invalid);
        assert_eq!(check_kind("host_name"), CheckKind::Invalid);
        assert_eq!(check_kind("-leading.example.com"), CheckKind::Invalid);
        assert_eq!(check_kind("trailing-.example.com"), CheckKind::Invalid);
        assert_eq!(check_kind("bad..dots"), CheckKind::Invalid);
        assert_eq!(check_kind(&"a".repeat(257)), CheckKind::Invalid);
    }

    #[test]
    fn test_is_host_or_ip() {
        assert!(is_host_or_ip("example.com"));
        assert!(is_host_or_ip("a"));
        assert!(is_host_or_ip("10.0.0.1"));
        assert!(is_host_or_ip("fe80::1"));
        assert!(!is_host_or_ip(""));
        assert!(!is_host_or_ip("ex ample.com"));
        assert!(!is_host_or_ip(&"b".repeat(300)));
        // A label may not exceed 63 characters.
        assert!(!is_host_or_ip(&format!("{}.com", "c".repeat(64))));
    }
}
