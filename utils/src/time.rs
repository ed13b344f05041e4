//! Time formatting helpers.

/// Format a duration in seconds to a human-readable string.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Whole seconds left on a countdown, rounded up.
///
/// `2001 ms` shows as `3`; zero only once the countdown has elapsed.
pub fn format_countdown(remaining_ms: u64) -> u32 {
    let secs = remaining_ms.div_ceil(1000);
    u32::try_from(secs).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(300), "5m 0s");
        assert_eq!(format_duration(3700), "1h 1m");
        assert_eq!(format_duration(90000), "1d 1h");
    }

    #[test]
    fn countdown_rounds_up() {
        assert_eq!(format_countdown(3000), 3);
        assert_eq!(format_countdown(2001), 3);
        assert_eq!(format_countdown(1), 1);
        assert_eq!(format_countdown(0), 0);
    }
}
