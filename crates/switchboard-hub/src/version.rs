//! Hub firmware compatibility gate

use regex::Regex;
use std::sync::LazyLock;

/// Oldest hub firmware able to host a publishing server
///
/// Versions compare as a numeric `(major, minor)` pair, not as decimals:
/// `"0.5"` is minor 5 and is rejected, `"0.100"` is minor 100 and is accepted.
pub const MIN_FIRMWARE: (u32, u32) = (0, 50);

static VERSION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)[.-](\d+)").expect("version pattern is valid"));

/// Parse the leading `MAJOR.MINOR` (or `MAJOR-MINOR`) of a firmware string
pub fn parse_firmware_version(version: &str) -> Option<(u32, u32)> {
    let caps = VERSION_PREFIX.captures(version.trim())?;
    let major = caps[1].parse().ok()?;
    let minor = caps[2].parse().ok()?;
    Some((major, minor))
}

/// Whether the firmware is at least [`MIN_FIRMWARE`]
pub fn is_supported_firmware(version: &str) -> bool {
    parse_firmware_version(version).is_some_and(|v| v >= MIN_FIRMWARE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_firmware_version() {
        assert_eq!(parse_firmware_version("0.50.1-20180411"), Some((0, 50)));
        assert_eq!(parse_firmware_version("1-2"), Some((1, 2)));
        assert_eq!(parse_firmware_version("0.53.8-20180424-05eb8e2"), Some((0, 53)));
        assert_eq!(parse_firmware_version("v0.50"), None);
        assert_eq!(parse_firmware_version(""), None);
        assert_eq!(parse_firmware_version("99999999999.1"), None);
    }

    #[test]
    fn test_is_supported_firmware() {
        assert!(is_supported_firmware("0.50"));
        assert!(is_supported_firmware("0.51.3"));
        assert!(is_supported_firmware("1.0"));
        assert!(!is_supported_firmware("0.49.9"));
        assert!(!is_supported_firmware("0.5"));
        assert!(!is_supported_firmware("0.09"));
        assert!(is_supported_firmware("0.100"));
        assert!(!is_supported_firmware("unknown"));
    }
}
