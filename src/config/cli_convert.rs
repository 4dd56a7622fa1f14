//! CLI to Config conversion utilities

use anyhow::{Context, Result};
use std::time::Duration;

/// Parse a duration string (e.g., "500ms", "2s", "1m") to a `Duration`
///
/// A bare number is taken as milliseconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier_ms) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1u64)
    } else if let Some(n) = s.strip_suffix("sec").or_else(|| s.strip_suffix('s')) {
        (n, 1000)
    } else if let Some(n) = s.strip_suffix("min").or_else(|| s.strip_suffix('m')) {
        (n, 60_000)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration format: {}", s))?;

    Ok(Duration::from_millis(num * multiplier_ms))
}

/// Split a comma-separated address list, dropping empty entries
pub fn parse_address_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Append `port` to an address that has none
pub fn with_default_port(addr: &str, port: u16) -> String {
    let has_port = match addr.rsplit_once(':') {
        // bracketed IPv6 literal: "[::1]:8040" has a port, "[::1]" does not
        Some((host, tail)) if host.starts_with('[') => !tail.ends_with(']'),
        Some((host, tail)) => !host.contains(':') && tail.parse::<u16>().is_ok(),
        None => false,
    };
    if has_port {
        addr.to_string()
    } else {
        format!("{}:{}", addr, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_parse_address_list() {
        assert_eq!(
            parse_address_list("10.0.0.1:8040, 10.0.0.2 ,,"),
            vec!["10.0.0.1:8040".to_string(), "10.0.0.2".to_string()]
        );
        assert!(parse_address_list("").is_empty());
    }

    #[test]
    fn test_with_default_port() {
        assert_eq!(with_default_port("worker-1", 8040), "worker-1:8040");
        assert_eq!(with_default_port("worker-1:9000", 8040), "worker-1:9000");
        assert_eq!(with_default_port("[::1]", 8040), "[::1]:8040");
        assert_eq!(with_default_port("[::1]:9000", 8040), "[::1]:9000");
    }
}
