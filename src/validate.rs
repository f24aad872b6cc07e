//! Syntax checks for connection settings.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HOSTNAME: Regex = Regex::new(concat!(
        r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)",
        r"(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*",
        r"(?::\d{1,5})?$",
    ))
    .unwrap();
    static ref IPV4: Regex = Regex::new(concat!(
        r"^(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}",
        r"(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(?::\d{1,5})?$",
    ))
    .unwrap();
    static ref IPV6_BRACKETED: Regex =
        Regex::new(r"^\[[0-9A-Fa-f:.]{2,45}\](?::\d{1,5})?$").unwrap();
    static ref USER: Regex = Regex::new(r"^[A-Za-z0-9_.@$-]{1,80}$").unwrap();
    static ref DATABASE: Regex = Regex::new(r"^(?::memory:|[A-Za-z0-9_$.\\/: -]+)$").unwrap();
}

fn port_in_range(value: &str) -> bool {
    match value.rsplit_once(':') {
        Some((_, port)) if !value.ends_with(']') => port.parse::<u16>().is_ok(),
        _ => true,
    }
}

/// Hostname, dotted IPv4 or bracketed IPv6, each with an optional `:port`.
#[must_use]
pub fn is_valid_host(value: &str) -> bool {
    if value.len() > 253 + 6 {
        return false;
    }
    if IPV6_BRACKETED.is_match(value) {
        return value
            .rsplit_once("]:")
            .is_none_or(|(_, port)| port.parse::<u16>().is_ok());
    }
    (IPV4.is_match(value) || HOSTNAME.is_match(value)) && port_in_range(value)
}

#[must_use]
pub fn is_valid_user(value: &str) -> bool {
    USER.is_match(value)
}

/// Any printable text, including the empty string.
#[must_use]
pub fn is_valid_password(value: &str) -> bool {
    value.len() <= 1024 && !value.chars().any(char::is_control)
}

/// A plain identifier, a file path, or `:memory:`.
#[must_use]
pub fn is_valid_database_name(value: &str) -> bool {
    !value.trim().is_empty() && value.len() <= 4096 && DATABASE.is_match(value)
}

/// Character set names such as `utf8mb4` or `UTF-8`.
#[must_use]
pub fn is_valid_charset(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 32
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
