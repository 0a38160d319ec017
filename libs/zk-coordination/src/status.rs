//! Service status flags published under discovery nodes.

use std::fmt;

use crate::error::{CoordinationError, CoordinationResult};

/// Status of a service instance, stored as a decimal integer in its node.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceStatus {
    Up = 0,
    Down = 1,
    Offline = 2,
}

impl ServiceStatus {
    /// Decode a raw node value.
    ///
    /// `path` only labels the error. Values other than `0`, `1` or `2` are an
    /// invariant violation and are never mapped to a default.
    pub fn decode(path: &str, raw: &[u8]) -> CoordinationResult<Self> {
        let violation = |detail: String| CoordinationError::InvariantViolation {
            path: path.to_owned(),
            detail,
        };
        let text = std::str::from_utf8(raw)
            .map_err(|_| violation("service status is not valid utf-8".into()))?
            .trim();
        let value: i64 = text
            .parse()
            .map_err(|_| violation(format!("service status {text:?} is not an integer")))?;
        u8::try_from(value)
            .ok()
            .and_then(|v| Self::try_from(v).ok())
            .ok_or_else(|| violation(format!("invalid service status {value}")))
    }

    pub fn is_up(&self) -> bool {
        matches!(self, ServiceStatus::Up)
    }
}

impl TryFrom<u8> for ServiceStatus {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ServiceStatus::Up),
            1 => Ok(ServiceStatus::Down),
            2 => Ok(ServiceStatus::Offline),
            other => Err(other),
        }
    }
}

impl From<ServiceStatus> for u8 {
    fn from(status: ServiceStatus) -> Self {
        status as u8
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Up => write!(f, "up"),
            ServiceStatus::Down => write!(f, "down"),
            ServiceStatus::Offline => write!(f, "offline"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_decode_known_values() {
        assert_eq!(ServiceStatus::decode("/s", b"0").unwrap(), ServiceStatus::Up);
        assert_eq!(ServiceStatus::decode("/s", b"1").unwrap(), ServiceStatus::Down);
        assert_eq!(
            ServiceStatus::decode("/s", b"2").unwrap(),
            ServiceStatus::Offline
        );
        assert_eq!(ServiceStatus::decode("/s", b" 1\n").unwrap(), ServiceStatus::Down);
    }

    #[test]
    fn test_decode_rejects_out_of_range() {
        let cases: [&[u8]; 7] = [b"99", b"-1", b"3", b"300", b"abc", b"", b"\xff"];
        for raw in cases {
            let err = ServiceStatus::decode("/svc/a", raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvariantViolation, "{raw:?}");
        }
    }

    #[test]
    fn test_u8_conversions() {
        assert_eq!(u8::from(ServiceStatus::Offline), 2);
        assert_eq!(ServiceStatus::try_from(1), Ok(ServiceStatus::Down));
        assert_eq!(ServiceStatus::try_from(7), Err(7));
        assert!(ServiceStatus::Up.is_up());
        assert_eq!(ServiceStatus::Offline.to_string(), "offline");
    }
}
