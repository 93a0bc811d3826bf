//! Target architecture and SDK selection

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Target CPU architecture of the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// 64-bit ARM
    Aarch64,
    /// 32-bit ARM hard float
    Armv7hf,
}

impl Architecture {
    /// Name used by the SDK images
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aarch64 => "aarch64",
            Self::Armv7hf => "armv7hf",
        }
    }

    /// Tag of the image produced by the build
    pub fn image_name(&self) -> &'static str {
        match self {
            Self::Aarch64 => "acap:aarch64",
            Self::Armv7hf => "acap:arm",
        }
    }

    /// GOARCH value for the toolchain
    pub fn go_arch(&self) -> &'static str {
        match self {
            Self::Aarch64 => "arm64",
            Self::Armv7hf => "arm",
        }
    }

    /// GOARM value, empty where it does not apply
    pub fn go_arm(&self) -> &'static str {
        match self {
            Self::Aarch64 => "",
            Self::Armv7hf => "7",
        }
    }

    /// Prefix of the cross compiler binaries
    pub fn cross_prefix(&self) -> &'static str {
        match self {
            Self::Aarch64 => "aarch64-linux-gnu-",
            Self::Armv7hf => "arm-linux-gnueabihf-",
        }
    }
}

impl Default for Architecture {
    fn default() -> Self {
        Self::Aarch64
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aarch64" => Ok(Self::Aarch64),
            "armv7hf" => Ok(Self::Armv7hf),
            other => Err(ConfigError::InvalidArchitecture { arch: other.to_string() }),
        }
    }
}

/// SDK image family, Ubuntu base and SDK version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkSelection {
    /// SDK image name (`acap-sdk` or `acap-native-sdk`)
    pub sdk: String,
    /// Ubuntu version of the SDK image
    pub ubuntu_version: String,
    /// SDK version
    pub version: String,
}

impl SdkSelection {
    /// Resolve the SDK from the lowest-SDK flag and optional explicit versions
    pub fn resolve(
        lowest_sdk: bool,
        sdk_version: Option<&str>,
        ubuntu_version: Option<&str>,
    ) -> Self {
        let non_empty = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_string);

        if lowest_sdk {
            Self {
                sdk: "acap-sdk".to_string(),
                ubuntu_version: "20.04".to_string(),
                version: non_empty(sdk_version).unwrap_or_else(|| "3.5".to_string()),
            }
        } else {
            Self {
                sdk: "acap-native-sdk".to_string(),
                ubuntu_version: non_empty(ubuntu_version).unwrap_or_else(|| "24.04".to_string()),
                version: non_empty(sdk_version).unwrap_or_else(|| "12.7.0".to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_architecture_table() {
        let arch: Architecture = "armv7hf".parse().unwrap();
        assert_eq!(arch.image_name(), "acap:arm");
        assert_eq!(arch.go_arch(), "arm");
        assert_eq!(arch.go_arm(), "7");
        assert_eq!(arch.cross_prefix(), "arm-linux-gnueabihf-");

        let arch: Architecture = "aarch64".parse().unwrap();
        assert_eq!(arch.image_name(), "acap:aarch64");
        assert_eq!(arch.go_arm(), "");

        assert!(matches!(
            "x86_64".parse::<Architecture>(),
            Err(ConfigError::InvalidArchitecture { .. })
        ));
    }

    #[test]
    fn test_sdk_selection() {
        let native = SdkSelection::resolve(false, None, None);
        assert_eq!(native.sdk, "acap-native-sdk");
        assert_eq!(native.ubuntu_version, "24.04");
        assert_eq!(native.version, "12.7.0");

        let lowest = SdkSelection::resolve(true, None, Some("22.04"));
        assert_eq!(lowest.sdk, "acap-sdk");
        // The legacy SDK only exists on 20.04
        assert_eq!(lowest.ubuntu_version, "20.04");
        assert_eq!(lowest.version, "3.5");

        let pinned = SdkSelection::resolve(false, Some("12.2.0"), Some(""));
        assert_eq!(pinned.version, "12.2.0");
        assert_eq!(pinned.ubuntu_version, "24.04");
    }
}
