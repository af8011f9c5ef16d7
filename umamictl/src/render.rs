use colored::{Color, Colorize};
use serde_json::Value;
use std::fmt::Write;
use time::macros::format_description;
use time::OffsetDateTime;
use umami::types::{MetricEntry, PageViews};
use umami::TimeWindow;

const BAR_WIDTH: u64 = 30;

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn format_millis(millis: i64) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|at| at.format(&format).ok())
        .unwrap_or_else(|| millis.to_string())
}

/// One-line description of a reporting window, in UTC.
pub fn window_header(title: &str, days: u32, window: TimeWindow) -> String {
    let unit = if days == 1 { "day" } else { "days" };
    format!(
        "{} {}",
        title.bold(),
        format!(
            "(last {days} {unit}: {} → {} UTC)",
            format_millis(window.start_at),
            format_millis(window.end_at)
        )
        .dimmed()
    )
}

/// Renders `[{x, y}, ...]` rows as a bar table, anything else as JSON.
pub fn metrics(value: &Value) -> String {
    let Ok(entries) = serde_json::from_value::<Vec<MetricEntry>>(value.clone()) else {
        return pretty(value);
    };
    if entries.is_empty() {
        return "No data for this period.".dimmed().to_string();
    }

    let labels: Vec<String> = entries
        .iter()
        .map(|entry| entry.x.clone().unwrap_or_else(|| "(none)".to_string()))
        .collect();
    let width = labels.iter().map(|label| label.chars().count()).max().unwrap_or(0);
    let max = entries.iter().map(|entry| entry.y).max().unwrap_or(0).max(1);

    let mut output = String::new();
    for (label, entry) in labels.iter().zip(&entries) {
        let bar = "█".repeat(usize::try_from(entry.y * BAR_WIDTH / max).unwrap_or(0));
        let _ = writeln!(
            output,
            "{label:width$}  {:>8}  {}",
            entry.y,
            bar.color(Color::Cyan)
        );
    }
    output.trim_end().to_string()
}

fn stat_line(value: &Value) -> Option<String> {
    if let Some(number) = value.as_f64() {
        return Some(format_number(number));
    }
    let current = value.get("value")?.as_f64()?;
    let mut line = format_number(current);
    if let Some(prev) = value.get("prev").and_then(Value::as_f64) {
        let diff = current - prev;
        let change = if diff >= 0.0 {
            format!("+{}", format_number(diff)).green()
        } else {
            format_number(diff).red()
        };
        let _ = write!(line, "  ({change} vs previous period)");
    } else if let Some(change) = value.get("change").and_then(Value::as_f64) {
        let _ = write!(line, "  ({change:+} change)");
    }
    Some(line)
}

#[allow(clippy::cast_possible_truncation)]
fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        format!("{number:.2}")
    }
}

/// Renders the stats object as `name: value` lines.
pub fn stats(value: &Value) -> String {
    let Some(object) = value.as_object() else {
        return pretty(value);
    };
    let width = object.keys().map(String::len).max().unwrap_or(0);
    let mut output = String::new();
    for (key, stat) in object {
        let line = stat_line(stat).unwrap_or_else(|| stat.to_string());
        let _ = writeln!(output, "{:width$}  {line}", key.bold());
    }
    output.trim_end().to_string()
}

/// Renders the pageview/session series side by side.
pub fn page_views(value: &Value) -> String {
    let Ok(views) = serde_json::from_value::<PageViews>(value.clone()) else {
        return pretty(value);
    };
    if views.pageviews.is_empty() {
        return "No data for this period.".dimmed().to_string();
    }

    let mut output = format!("{:19}  {:>9}  {:>8}\n", "bucket", "pageviews", "sessions")
        .bold()
        .to_string();
    for point in &views.pageviews {
        let sessions = views
            .sessions
            .iter()
            .find(|session| session.x == point.x)
            .map_or(0, |session| session.y);
        let _ = writeln!(output, "{:19}  {:>9}  {:>8}", point.x, point.y, sessions);
    }
    output.trim_end().to_string()
}

/// Renders the active-visitor count. Accepts both `{"visitors": n}` and the
/// older `[{"x": n}]` shape.
pub fn active(value: &Value) -> String {
    let count = value
        .get("visitors")
        .or_else(|| value.get(0).and_then(|first| first.get("x")))
        .and_then(Value::as_u64);
    match count {
        Some(1) => format!("{} active visitor", "1".bold().green()),
        Some(count) => format!("{} active visitors", count.to_string().bold().green()),
        None => pretty(value),
    }
}
