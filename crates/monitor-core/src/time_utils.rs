use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::warn;

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

// ── 12-hour / 24-hour detection ───────────────────────────────────────────────

/// Timezone prefixes for regions that conventionally read a 12-hour clock.
///
/// Matched case-insensitively against the start of an IANA name. Order
/// matters only for readability; prefixes do not overlap in outcome.
const TWELVE_HOUR_ZONES: &[&str] = &[
    "america/",
    "australia/",
    "pacific/auckland",
    "pacific/chatham",
    "asia/manila",
    "asia/kolkata",
    "asia/calcutta",
    "asia/karachi",
    "asia/dhaka",
    "asia/kuala_lumpur",
    "asia/kuching",
    "asia/riyadh",
    "asia/dubai",
    "asia/amman",
    "asia/tehran",
    "africa/cairo",
];

/// Decide whether event timestamps use a 12-hour clock.
///
/// An explicit `"12h"` / `"24h"` wins; anything else is derived from the
/// timezone (the system one when `timezone` is `None`).
pub fn detect_time_format(timezone: Option<&str>, explicit: Option<&str>) -> bool {
    if let Some(fmt) = explicit {
        match fmt.to_lowercase().as_str() {
            "12h" => return true,
            "24h" => return false,
            _ => {}
        }
    }

    let tz = timezone
        .map(str::to_string)
        .unwrap_or_else(get_system_timezone)
        .to_lowercase();

    TWELVE_HOUR_ZONES.iter().any(|prefix| tz.starts_with(prefix))
}

// ── ClockFormatter ────────────────────────────────────────────────────────────

/// Renders event timestamps as wall-clock time of day.
///
/// One formatter is built from settings at startup and shared by the history
/// buffer, so every event in a run uses the same zone and clock style.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockFormatter {
    tz: Tz,
    twelve_hour: bool,
}

impl ClockFormatter {
    /// Build a formatter for `tz_name`, falling back to UTC with a warning
    /// when the zone is not recognised.
    pub fn new(tz_name: &str, twelve_hour: bool) -> Self {
        let tz = tz_name.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                "ClockFormatter: unrecognised timezone \"{}\", falling back to UTC",
                tz_name
            );
            Tz::UTC
        });
        Self { tz, twelve_hour }
    }

    /// Resolve a formatter from the `timezone` / `time_format` settings pair.
    pub fn from_settings(timezone: &str, time_format: &str) -> Self {
        let twelve_hour = detect_time_format(Some(timezone), Some(time_format));
        Self::new(timezone, twelve_hour)
    }

    /// Format `dt` as `HH:MM:SS` or `hh:MM:SS AM`.
    pub fn format(&self, dt: &DateTime<Utc>) -> String {
        let local = dt.with_timezone(&self.tz);
        if self.twelve_hour {
            local.format("%I:%M:%S %p").to_string()
        } else {
            local.format("%H:%M:%S").to_string()
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn is_twelve_hour(&self) -> bool {
        self.twelve_hour
    }
}

impl Default for ClockFormatter {
    fn default() -> Self {
        Self {
            tz: Tz::UTC,
            twelve_hour: false,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    // ── detect_time_format ───────────────────────────────────────────────────

    #[test]
    fn test_detect_explicit_overrides_zone() {
        assert!(detect_time_format(Some("Europe/Berlin"), Some("12H")));
        assert!(!detect_time_format(Some("America/Chicago"), Some("24h")));
    }

    #[test]
    fn test_detect_from_zone() {
        assert!(detect_time_format(Some("America/New_York"), None));
        assert!(detect_time_format(Some("Australia/Sydney"), Some("auto")));
        assert!(!detect_time_format(Some("Europe/Paris"), None));
        assert!(!detect_time_format(Some("Asia/Tokyo"), None));
    }

    // ── ClockFormatter ───────────────────────────────────────────────────────

    #[test]
    fn test_format_24h_in_zone() {
        let fmt = ClockFormatter::new("Europe/Berlin", false);
        // Winter: Berlin is UTC+1.
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 13, 5, 9).unwrap();
        assert_eq!(fmt.format(&dt), "14:05:09");
    }

    #[test]
    fn test_format_12h() {
        let fmt = ClockFormatter::new("UTC", true);
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 21, 0, 1).unwrap();
        assert_eq!(fmt.format(&dt), "09:00:01 PM");
    }

    #[test]
    fn test_invalid_zone_falls_back_to_utc() {
        let fmt = ClockFormatter::new("Nowhere/Special", false);
        assert_eq!(fmt.timezone(), Tz::UTC);
        let dt = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(fmt.format(&dt), "12:00:00");
    }

    #[test]
    fn test_from_settings() {
        let fmt = ClockFormatter::from_settings("America/Chicago", "auto");
        assert!(fmt.is_twelve_hour());
        assert_eq!(fmt.timezone(), Tz::America__Chicago);

        let fmt = ClockFormatter::from_settings("America/Chicago", "24h");
        assert!(!fmt.is_twelve_hour());
    }

    #[test]
    fn test_get_system_timezone_returns_nonempty_string() {
        assert!(!get_system_timezone().is_empty());
    }
}
