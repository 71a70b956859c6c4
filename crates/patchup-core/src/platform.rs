//! Platform keys used to pick a release bundle.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
}

impl Platform {
    /// The platform this binary was built for, if bundles exist for it.
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(target_os = "macos") {
            Some(Platform::MacOs)
        } else {
            None
        }
    }

    /// Key of this platform in the `bundle_urls` table.
    pub fn key(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "windows" | "win" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "macos" | "darwin" | "osx" => Ok(Platform::MacOs),
            _ => Err(format!("unknown platform: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip_through_key() {
        for platform in [Platform::Windows, Platform::Linux, Platform::MacOs] {
            assert_eq!(platform.key().parse::<Platform>().unwrap(), platform);
        }
        assert_eq!("Darwin".parse::<Platform>().unwrap(), Platform::MacOs);
        assert!("amiga".parse::<Platform>().is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_current_platform() {
        assert_eq!(Platform::current(), Some(Platform::Linux));
    }
}
