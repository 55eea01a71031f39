//! Compaction configuration parsing and validation.
//!
//! The DDL layer hands the `WITH compaction = {...}` option map over
//! verbatim. Validation happens before any control state is touched, so a
//! rejected CREATE/ALTER leaves the table exactly as it was.

use std::collections::HashMap;

use thiserror::Error;

/// Default minimum bucket size shared by all strategies.
pub const DEFAULT_MIN_THRESHOLD: usize = 4;
/// Default cap on segments merged in one task.
pub const DEFAULT_MAX_THRESHOLD: usize = 32;
/// Default target segment size: 160 MiB.
pub const DEFAULT_TARGET_SEGMENT_SIZE_BYTES: u64 = 160 * 1024 * 1024;
/// Default time window: one day.
pub const DEFAULT_WINDOW_DURATION_SECS: u64 = 86_400;

/// Closed set of selection algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Bucket segments of similar size, merge full buckets.
    SizeTiered,
    /// Exponentially growing level targets, merge upward one level at a time.
    Leveled,
    /// Fixed write-time windows, merge the oldest full window.
    TimeWindow,
}

impl StrategyKind {
    /// Parse a strategy name. The original implementation configured
    /// strategies by class name, so `SizeTieredCompactionStrategy` and the
    /// short `SizeTiered` are both accepted, case-insensitively.
    fn parse(value: &str) -> Option<Self> {
        let name = value.strip_suffix("CompactionStrategy").unwrap_or(value);
        if name.eq_ignore_ascii_case("SizeTiered") {
            Some(Self::SizeTiered)
        } else if name.eq_ignore_ascii_case("Leveled") {
            Some(Self::Leveled)
        } else if name.eq_ignore_ascii_case("TimeWindow") {
            Some(Self::TimeWindow)
        } else {
            None
        }
    }
}

/// Validation failure for a CREATE/ALTER compaction map. The schema change
/// is rejected synchronously and no state changes.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid compaction config: {field}: {reason}")]
pub struct InvalidConfig {
    /// The offending field.
    pub field: String,
    /// Why the field was rejected.
    pub reason: String,
}

impl InvalidConfig {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Validated compaction configuration with all per-kind defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionConfig {
    /// Selected strategy.
    pub strategy_kind: StrategyKind,
    /// Whether automatic compaction starts enabled. Defaults to `true` only
    /// when the key is entirely absent; an explicit value is used verbatim.
    pub enabled: bool,
    /// Minimum segments in a bucket/level/window before it may compact.
    pub min_threshold: usize,
    /// Maximum segments merged in one task.
    pub max_threshold: usize,
    /// Target output segment size; also the leveled base level capacity.
    pub target_segment_size_bytes: u64,
    /// Time-window width in milliseconds.
    pub window_duration_millis: u64,
}

impl CompactionConfig {
    /// Parse and validate a raw option map.
    pub fn parse(raw: &HashMap<String, String>) -> Result<Self, InvalidConfig> {
        let mut strategy_kind = None;
        let mut enabled = None;
        let mut min_threshold = None;
        let mut max_threshold = None;
        let mut target_segment_size_bytes = None;
        let mut window_duration_secs = None;

        for (key, value) in raw {
            match key.as_str() {
                // `class` is the original option name; `strategy` the native one.
                "strategy" | "class" => {
                    strategy_kind = Some(StrategyKind::parse(value).ok_or_else(|| {
                        InvalidConfig::new(key.clone(), format!("unknown strategy {value:?}"))
                    })?);
                }
                "enabled" => {
                    enabled = Some(parse_bool(key, value)?);
                }
                "min_threshold" => {
                    min_threshold = Some(parse_positive(key, value)? as usize);
                }
                "max_threshold" => {
                    max_threshold = Some(parse_positive(key, value)? as usize);
                }
                "target_segment_size_bytes" => {
                    target_segment_size_bytes = Some(parse_positive(key, value)?);
                }
                "window_duration_secs" => {
                    window_duration_secs = Some(parse_positive(key, value)?);
                }
                _ => {
                    return Err(InvalidConfig::new(key.clone(), "unknown option"));
                }
            }
        }

        let strategy_kind = strategy_kind
            .ok_or_else(|| InvalidConfig::new("strategy", "strategy is required"))?;
        let min_threshold = min_threshold.unwrap_or(DEFAULT_MIN_THRESHOLD);
        let max_threshold = max_threshold.unwrap_or(DEFAULT_MAX_THRESHOLD);
        if min_threshold < 2 {
            return Err(InvalidConfig::new(
                "min_threshold",
                format!("must be at least 2, got {min_threshold}"),
            ));
        }
        if min_threshold > max_threshold {
            return Err(InvalidConfig::new(
                "min_threshold",
                format!("must not exceed max_threshold ({min_threshold} > {max_threshold})"),
            ));
        }

        Ok(Self {
            strategy_kind,
            enabled: enabled.unwrap_or(true),
            min_threshold,
            max_threshold,
            target_segment_size_bytes: target_segment_size_bytes
                .unwrap_or(DEFAULT_TARGET_SEGMENT_SIZE_BYTES),
            window_duration_millis: window_duration_secs
                .unwrap_or(DEFAULT_WINDOW_DURATION_SECS)
                .saturating_mul(1_000),
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, InvalidConfig> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(InvalidConfig::new(
            key,
            format!("expected true or false, got {value:?}"),
        )),
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u64, InvalidConfig> {
    let parsed: u64 = value
        .parse()
        .map_err(|_| InvalidConfig::new(key, format!("expected a positive integer, got {value:?}")))?;
    if parsed == 0 {
        return Err(InvalidConfig::new(key, "must be positive"));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_filled_for_size_tiered() {
        let config = CompactionConfig::parse(&raw(&[("strategy", "SizeTiered")])).unwrap();
        assert_eq!(config.strategy_kind, StrategyKind::SizeTiered);
        assert!(config.enabled);
        assert_eq!(config.min_threshold, DEFAULT_MIN_THRESHOLD);
        assert_eq!(config.max_threshold, DEFAULT_MAX_THRESHOLD);
        assert_eq!(
            config.target_segment_size_bytes,
            DEFAULT_TARGET_SEGMENT_SIZE_BYTES
        );
    }

    #[test]
    fn class_alias_and_long_name_accepted() {
        let config =
            CompactionConfig::parse(&raw(&[("class", "SizeTieredCompactionStrategy")])).unwrap();
        assert_eq!(config.strategy_kind, StrategyKind::SizeTiered);
        let config = CompactionConfig::parse(&raw(&[("class", "timewindow")])).unwrap();
        assert_eq!(config.strategy_kind, StrategyKind::TimeWindow);
    }

    #[test]
    fn unknown_strategy_rejected() {
        let err = CompactionConfig::parse(&raw(&[("strategy", "Mystery")])).unwrap_err();
        assert_eq!(err.field, "strategy");
    }

    #[test]
    fn unknown_option_rejected() {
        let err = CompactionConfig::parse(&raw(&[
            ("strategy", "Leveled"),
            ("tombstone_ratio", "0.2"),
        ]))
        .unwrap_err();
        assert_eq!(err.field, "tombstone_ratio");
    }

    #[test]
    fn missing_strategy_rejected() {
        let err = CompactionConfig::parse(&raw(&[("enabled", "true")])).unwrap_err();
        assert_eq!(err.field, "strategy");
    }

    #[test]
    fn min_threshold_floor_is_two() {
        let err = CompactionConfig::parse(&raw(&[
            ("strategy", "SizeTiered"),
            ("min_threshold", "1"),
        ]))
        .unwrap_err();
        assert_eq!(err.field, "min_threshold");
    }

    #[test]
    fn min_threshold_must_not_exceed_max() {
        let err = CompactionConfig::parse(&raw(&[
            ("strategy", "SizeTiered"),
            ("min_threshold", "8"),
            ("max_threshold", "4"),
        ]))
        .unwrap_err();
        assert_eq!(err.field, "min_threshold");
    }

    #[test]
    fn explicit_enabled_false_is_kept() {
        let config = CompactionConfig::parse(&raw(&[
            ("strategy", "Leveled"),
            ("enabled", "false"),
        ]))
        .unwrap();
        assert!(!config.enabled);
    }

    #[test]
    fn garbage_numbers_rejected() {
        for value in ["-1", "0", "soon", ""] {
            let err = CompactionConfig::parse(&raw(&[
                ("strategy", "TimeWindow"),
                ("window_duration_secs", value),
            ]))
            .unwrap_err();
            assert_eq!(err.field, "window_duration_secs", "value {value:?}");
        }
    }

    #[test]
    fn window_duration_converted_to_millis() {
        let config = CompactionConfig::parse(&raw(&[
            ("strategy", "TimeWindow"),
            ("window_duration_secs", "60"),
        ]))
        .unwrap();
        assert_eq!(config.window_duration_millis, 60_000);
    }
}
