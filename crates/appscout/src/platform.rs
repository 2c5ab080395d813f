//! Platform identity of a session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mobile platform a session drives
///
/// Resolved once when a session is created; every later branch is an
/// exhaustive `match` rather than a capability string check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Android (UiAutomator2)
    Android,
    /// iOS (XCUITest)
    Ios,
    /// Capability missing or unrecognised; both query families are tried
    #[default]
    Unknown,
}

impl Platform {
    /// Parse a `platformName` value (case-insensitive prefix match)
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let lower = name.trim().to_lowercase();
        if lower.starts_with("android") {
            Self::Android
        } else if lower.starts_with("ios") {
            Self::Ios
        } else {
            Self::Unknown
        }
    }

    /// Resolve from a capabilities object (`platformName` or `appium:platformName`)
    #[must_use]
    pub fn from_capabilities(caps: &Value) -> Self {
        caps.get("platformName")
            .or_else(|| caps.get("appium:platformName"))
            .and_then(Value::as_str)
            .map_or(Self::Unknown, Self::from_name)
    }

    /// Lowercase name used in file names and logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = crate::result::ScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::from_name(s) {
            Self::Unknown => Err(crate::result::ScoutError::config(format!(
                "unsupported platform: {s}"
            ))),
            platform => Ok(platform),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_name() {
        assert_eq!(Platform::from_name("Android"), Platform::Android);
        assert_eq!(Platform::from_name("android 14"), Platform::Android);
        assert_eq!(Platform::from_name("iOS"), Platform::Ios);
        assert_eq!(Platform::from_name("  IOS "), Platform::Ios);
        assert_eq!(Platform::from_name("Windows"), Platform::Unknown);
        assert_eq!(Platform::from_name(""), Platform::Unknown);
    }

    #[test]
    fn test_from_capabilities() {
        assert_eq!(
            Platform::from_capabilities(&json!({"platformName": "Android"})),
            Platform::Android
        );
        assert_eq!(
            Platform::from_capabilities(&json!({"appium:platformName": "iOS"})),
            Platform::Ios
        );
        assert_eq!(Platform::from_capabilities(&json!({})), Platform::Unknown);
        assert_eq!(
            Platform::from_capabilities(&json!({"platformName": 7})),
            Platform::Unknown
        );
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert_eq!("ios".parse::<Platform>().unwrap(), Platform::Ios);
        assert!("symbian".parse::<Platform>().is_err());
    }
}
