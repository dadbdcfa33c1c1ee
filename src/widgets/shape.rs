//! UI-facing shaping helpers shared by the producers.

use crate::query::{TimeFormat, RESULT_ABORTED, RESULT_FAILURE, RESULT_SUCCESS};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

const SECOND: i64 = 1000;
const MINUTE: i64 = 60 * SECOND;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const MONTH: i64 = 30 * DAY;

/// At most the two largest nonzero units, e.g. `"3d 4h"`. Zero is `"-"`.
pub fn readable_duration(millis: i64) -> String {
    let mut rest = millis.max(0);
    let mut parts = Vec::new();
    for (size, suffix) in [(MONTH, "mo"), (DAY, "d"), (HOUR, "h"), (MINUTE, "m"), (SECOND, "s")] {
        let n = rest / size;
        rest %= size;
        if n > 0 {
            parts.push(format!("{}{}", n, suffix));
        }
    }
    if parts.is_empty() {
        return "-".to_string();
    }
    parts.truncate(2);
    parts.join(" ")
}

/// `1500` -> `"1.5s"`.
pub fn millis_to_seconds(millis: f64) -> String {
    let text = format!("{:.3}", millis / 1000.0);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{}s", text)
}

/// `floor(part / total * 100)`, zero when there is no total.
pub fn floor_percent(part: f64, total: f64) -> u64 {
    if total <= 0.0 {
        return 0;
    }
    (part / total * 100.0).floor().max(0.0) as u64
}

pub fn percent_string(percent: u64) -> String {
    format!("{}%", percent)
}

/// Dark and light variants of one bar colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorScheme {
    pub dark: &'static str,
    pub light: &'static str,
}

pub const SUCCESS_COLORS: ColorScheme = ColorScheme {
    dark: "#3FB950",
    light: "#1A7F37",
};
pub const FAILURE_COLORS: ColorScheme = ColorScheme {
    dark: "#F85149",
    light: "#CF222E",
};
pub const SKIPPED_COLORS: ColorScheme = ColorScheme {
    dark: "#8B949E",
    light: "#6E7781",
};

/// Three-segment bar (successful, failed, skipped) labelled with the
/// floored failure percentage.
pub fn failure_rate_bar(successful: u64, failed: u64, skipped: u64) -> Value {
    let total = successful + failed + skipped;
    let segment = |name: &str, count: u64, colors: ColorScheme| {
        json!({
            "name": name,
            "count": count,
            "colorScheme": colors,
        })
    };
    json!({
        "value": percent_string(floor_percent(failed as f64, total as f64)),
        "data": [
            segment("successful", successful, SUCCESS_COLORS),
            segment("failed", failed, FAILURE_COLORS),
            segment("skipped", skipped, SKIPPED_COLORS),
        ],
    })
}

/// Navigation target attached next to a clickable value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillDown {
    pub report_id: String,
    pub report_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_info: Option<Value>,
}

impl DrillDown {
    pub fn new(report_id: &str, report_title: &str) -> Self {
        Self {
            report_id: report_id.to_string(),
            report_title: report_title.to_string(),
            report_type: None,
            report_info: None,
        }
    }

    pub fn with_type(mut self, report_type: &str) -> Self {
        self.report_type = Some(report_type.to_string());
        self
    }

    pub fn with_info(mut self, info: Value) -> Self {
        self.report_info = Some(info);
        self
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// `{"value": v, "drillDown": {...}}`
pub fn drillable(value: Value, drill_down: &DrillDown) -> Value {
    let mut map = Map::new();
    map.insert("value".to_string(), value);
    map.insert("drillDown".to_string(), drill_down.to_json());
    Value::Object(map)
}

pub fn hour_label(hour: u32, format: TimeFormat) -> String {
    match format {
        TimeFormat::TwentyFourHour => format!("{:02}:00", hour),
        TimeFormat::TwelveHour => {
            let suffix = if hour < 12 { "AM" } else { "PM" };
            let h = match hour % 12 {
                0 => 12,
                h => h,
            };
            format!("{} {}", h, suffix)
        }
    }
}

pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// How many times each weekday (Monday first) occurs in `[start, end]`.
pub fn weekday_occurrences(start: NaiveDate, end: NaiveDate) -> [u32; 7] {
    let mut counts = [0u32; 7];
    if start > end {
        return counts;
    }
    let days = (end - start).num_days() + 1;
    let full_weeks = (days / 7) as u32;
    for c in counts.iter_mut() {
        *c = full_weeks;
    }
    let first = start.weekday().num_days_from_monday() as usize;
    for i in 0..(days % 7) as usize {
        counts[(first + i) % 7] += 1;
    }
    counts
}

pub fn normalize_run_result(result: &str) -> String {
    match result {
        RESULT_SUCCESS => "SUCCESSFUL".to_string(),
        RESULT_ABORTED => "CANCELED".to_string(),
        RESULT_FAILURE => "FAILED".to_string(),
        other => other.to_string(),
    }
}

/// Epoch milliseconds as `YYYY-MM-DD HH:MM:SS` (UTC), `"-"` when unset.
pub fn format_millis(millis: i64) -> String {
    if millis <= 0 {
        return "-".to_string();
    }
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Round to two decimals for display.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
