//! Document size filters and formatting.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

const MB: u64 = 1024 * 1024;

/// Inclusive size bounds for discovered documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeFilter {
    pub min_bytes: u64,
    /// `None` means unbounded.
    pub max_bytes: Option<u64>,
    /// Keep documents whose size the server did not report.
    pub include_unknown: bool,
}

impl Default for SizeFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl SizeFilter {
    pub fn all() -> Self {
        Self {
            min_bytes: 0,
            max_bytes: None,
            include_unknown: true,
        }
    }

    pub fn between(min_bytes: u64, max_bytes: Option<u64>) -> Self {
        Self {
            min_bytes,
            max_bytes,
            include_unknown: true,
        }
    }

    #[must_use]
    pub fn with_unknown(mut self, include_unknown: bool) -> Self {
        self.include_unknown = include_unknown;
        self
    }

    /// Named presets: `all`, `1mb+`, `5mb+`, `10mb+`, `20mb+`, `50mb+`,
    /// `small` (under 5 MB), `medium` (5 to 20 MB), `large` (20 MB and up).
    pub fn preset(name: &str) -> Option<Self> {
        let filter = match name.trim().to_ascii_lowercase().as_str() {
            "all" => Self::all(),
            "1mb+" => Self::between(MB, None),
            "5mb+" => Self::between(5 * MB, None),
            "10mb+" => Self::between(10 * MB, None),
            "20mb+" => Self::between(20 * MB, None),
            "50mb+" => Self::between(50 * MB, None),
            "small" => Self::between(0, Some(5 * MB)),
            "medium" => Self::between(5 * MB, Some(20 * MB)),
            "large" => Self::between(20 * MB, None),
            _ => return None,
        };
        Some(filter)
    }

    pub fn matches(&self, size_bytes: Option<u64>) -> bool {
        match size_bytes {
            None => self.include_unknown,
            Some(size) => size >= self.min_bytes && self.max_bytes.is_none_or(|max| size <= max),
        }
    }
}

impl FromStr for SizeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::preset(s).ok_or_else(|| format!("unknown size filter: {s}"))
    }
}

/// Human-readable size, e.g. `12.5 MB`.
pub fn format_size(size_bytes: Option<u64>) -> String {
    let Some(size) = size_bytes else {
        return "unknown".to_string();
    };
    match size {
        s if s < 1024 => format!("{s} B"),
        s if s < MB => format!("{:.1} KB", s as f64 / 1024.0),
        s if s < 1024 * MB => format!("{:.1} MB", s as f64 / MB as f64),
        s => format!("{:.2} GB", s as f64 / (1024 * MB) as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_bound_inclusively() {
        let medium = SizeFilter::preset("medium").expect("preset");
        assert!(medium.matches(Some(5 * MB)));
        assert!(medium.matches(Some(20 * MB)));
        assert!(!medium.matches(Some(20 * MB + 1)));
        assert!(!medium.matches(Some(MB)));
    }

    #[test]
    fn unknown_sizes_follow_flag() {
        let filter = SizeFilter::preset("5mb+").expect("preset");
        assert!(filter.matches(None));
        assert!(!filter.with_unknown(false).matches(None));
    }

    #[test]
    fn unknown_preset_is_rejected() {
        assert!("huge".parse::<SizeFilter>().is_err());
        assert_eq!("ALL".parse::<SizeFilter>(), Ok(SizeFilter::all()));
    }

    #[test]
    fn format_size_picks_unit() {
        assert_eq!(format_size(None), "unknown");
        assert_eq!(format_size(Some(512)), "512 B");
        assert_eq!(format_size(Some(1536)), "1.5 KB");
        assert_eq!(format_size(Some(12 * MB + MB / 2)), "12.5 MB");
        assert_eq!(format_size(Some(3 * 1024 * MB)), "3.00 GB");
    }
}
