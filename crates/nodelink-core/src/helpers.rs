//! Formatting and conversion helpers for link durations.
//!
//! The controller reports link age as `hh:mm:ss` (hours may exceed 24).

use std::time::Duration;

/// Parse an `hh:mm:ss` link age into a [`Duration`].
///
/// Returns `None` if the text is not three colon-separated integers, if
/// minutes or seconds are out of range, or if the total overflows.
///
/// # Example
///
/// ```
/// use nodelink_core::parse_elapsed;
/// use std::time::Duration;
///
/// assert_eq!(parse_elapsed("00:15:30"), Some(Duration::from_secs(930)));
/// assert_eq!(parse_elapsed("123:00:01"), Some(Duration::from_secs(442_801)));
/// assert_eq!(parse_elapsed("garbage"), None);
/// assert_eq!(parse_elapsed("6000000000000000:00:00"), None);
/// ```
pub fn parse_elapsed(text: &str) -> Option<Duration> {
    let mut parts = text.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
        return None;
    }
    let total = hours.checked_mul(3600)?.checked_add(minutes * 60 + seconds)?;
    Some(Duration::from_secs(total))
}

/// Format a [`Duration`] as `hh:mm:ss`, truncating sub-second precision.
///
/// # Example
///
/// ```
/// use nodelink_core::format_elapsed;
/// use std::time::Duration;
///
/// assert_eq!(format_elapsed(Duration::from_secs(930)), "00:15:30");
/// ```
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
