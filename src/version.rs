//! Schema versions: `major.minor.patch`, ordered component by component.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The declared schema version of a bundle or document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version '{0}': expected major.minor.patch")]
pub struct VersionParseError(pub String);

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionParseError(s.to_string());
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u32, VersionParseError> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)
        };
        let version = Version::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_components() {
        assert_eq!("1.5.2".parse::<Version>().unwrap(), Version::new(1, 5, 2));
        assert_eq!(" 0.9.9 ".parse::<Version>().unwrap(), Version::new(0, 9, 9));
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!("1.0".parse::<Version>().is_err());
        assert!("1.0.0.1".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
    }

    #[test]
    fn rejects_non_numeric() {
        let err = "1.x.0".parse::<Version>().unwrap_err();
        assert!(err.to_string().contains("1.x.0"));
    }

    #[test]
    fn orders_component_wise() {
        assert!(Version::new(1, 10, 0) > Version::new(1, 9, 9));
        assert!(Version::new(2, 0, 0) > Version::new(1, 99, 99));
        assert!(Version::new(0, 9, 9) < Version::new(1, 0, 0));
    }

    #[test]
    fn display_round_trips() {
        let v = Version::new(3, 1, 4);
        assert_eq!(v.to_string().parse::<Version>().unwrap(), v);
    }
}
