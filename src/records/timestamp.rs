use chrono::{NaiveDate, NaiveDateTime};

/// Accepted input layouts, tried in order. The flag marks layouts carrying a time of day.
const INPUT_FORMATS: &[(&str, bool)] = &[
    ("%Y%m%d%H%M%S", true),
    ("%Y%m%d", false),
    ("%Y-%m-%d %H:%M:%S", true),
    ("%Y-%m-%d", false),
];

const OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Normalize an observation date to `YYYY-MM-DDTHH:MM:SS`.
///
/// Unknown layouts pass through trimmed so the remote service can still try
/// to interpret them. Blank input yields `None`.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    for &(format, has_time) in INPUT_FORMATS {
        let parsed = if has_time {
            NaiveDateTime::parse_from_str(value, format).ok()
        } else {
            NaiveDate::parse_from_str(value, format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        };
        if let Some(dt) = parsed {
            return Some(dt.format(OUTPUT_FORMAT).to_string());
        }
    }

    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_datetime() {
        assert_eq!(
            normalize_timestamp("20230714153000").as_deref(),
            Some("2023-07-14T15:30:00")
        );
    }

    #[test]
    fn test_compact_date() {
        assert_eq!(
            normalize_timestamp("20230714").as_deref(),
            Some("2023-07-14T00:00:00")
        );
    }

    #[test]
    fn test_dashed_formats() {
        assert_eq!(
            normalize_timestamp(" 2023-07-14 08:05:09 ").as_deref(),
            Some("2023-07-14T08:05:09")
        );
        assert_eq!(
            normalize_timestamp("2023-07-14").as_deref(),
            Some("2023-07-14T00:00:00")
        );
    }

    #[test]
    fn test_unknown_layout_passes_through() {
        assert_eq!(
            normalize_timestamp("summer 2021").as_deref(),
            Some("summer 2021")
        );
        assert_eq!(normalize_timestamp("   "), None);
    }
}
