//! Port specification parsing.
//!
//! A port spec is either a single port (`"8080"`) or an inclusive range
//! (`"8000-8003"`). Anything else is rejected.

use crate::error::{Result, ServerError};
use tracing::warn;

/// Parse a port spec, logging and returning an empty list when it is invalid.
///
/// ```
/// use portfleet_common::ports::parse_port_range;
///
/// assert_eq!(parse_port_range("8080"), vec![8080]);
/// assert_eq!(parse_port_range("8000-8002"), vec![8000, 8001, 8002]);
/// assert!(parse_port_range("9000-8000").is_empty());
/// assert!(parse_port_range("80a").is_empty());
/// ```
pub fn parse_port_range(token: &str) -> Vec<u16> {
    match try_parse_port_range(token) {
        Ok(ports) => ports,
        Err(e) => {
            warn!("{}", e);
            Vec::new()
        }
    }
}

/// Parse a port spec, returning the reason on failure.
pub fn try_parse_port_range(token: &str) -> Result<Vec<u16>> {
    let invalid = || ServerError::InvalidPortRange(token.to_string());

    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit() || c == '-') {
        return Err(invalid());
    }

    if token.contains('-') {
        let mut parts = token.split('-');
        let (Some(start), Some(end), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        let start: u16 = start.parse().map_err(|_| invalid())?;
        let end: u16 = end.parse().map_err(|_| invalid())?;
        if start > end {
            return Err(invalid());
        }
        return Ok((start..=end).collect());
    }

    token.parse::<u16>().map(|port| vec![port]).map_err(|_| invalid())
}
