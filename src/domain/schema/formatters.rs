use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

pub const EMPTY_DISPLAY: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatterId {
    Date,
    YearMonth,
    Number,
}

impl FormatterId {
    pub fn as_str(self) -> &'static str {
        match self {
            FormatterId::Date => "date",
            FormatterId::YearMonth => "yearMonth",
            FormatterId::Number => "number",
        }
    }

    pub fn apply(self, value: &Value) -> String {
        match self {
            FormatterId::Date => format_date(value),
            FormatterId::YearMonth => format_year_month(value),
            FormatterId::Number => format_number(value),
        }
    }
}

impl FromStr for FormatterId {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "date" => Ok(FormatterId::Date),
            "yearMonth" => Ok(FormatterId::YearMonth),
            "number" => Ok(FormatterId::Number),
            other => Err(format!("unknown formatter: {other}")),
        }
    }
}

/// Formats with the named formatter, or plain display when the id is unknown.
pub fn format_with(formatter_id: &str, value: &Value) -> String {
    match formatter_id.parse::<FormatterId>() {
        Ok(formatter) => formatter.apply(value),
        Err(_) => display_value(value),
    }
}

pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => EMPTY_DISPLAY.to_string(),
        Value::String(text) if text.trim().is_empty() => EMPTY_DISPLAY.to_string(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(date_time) = DateTime::parse_from_rfc3339(text) {
        return Some(date_time.date_naive());
    }
    for pattern in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(date_time) = NaiveDateTime::parse_from_str(text, pattern) {
            return Some(date_time.date());
        }
    }
    for pattern in ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, pattern) {
            return Some(date);
        }
    }
    for separator in ['-', '/', '.'] {
        let mut parts = text.splitn(2, separator);
        let (Some(year), Some(month)) = (parts.next(), parts.next()) else {
            continue;
        };
        if year.len() != 4 || month.is_empty() || month.len() > 2 {
            continue;
        }
        if let (Ok(year), Ok(month)) = (year.parse::<i32>(), month.parse::<u32>()) {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, 1) {
                return Some(date);
            }
        }
    }
    None
}

fn value_as_date_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

pub fn format_date(value: &Value) -> String {
    let Some(text) = value_as_date_text(value) else {
        return EMPTY_DISPLAY.to_string();
    };
    match parse_date(&text) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => text,
    }
}

pub fn format_year_month(value: &Value) -> String {
    let Some(text) = value_as_date_text(value) else {
        return EMPTY_DISPLAY.to_string();
    };
    match parse_date(&text) {
        Some(date) => date.format("%Y-%m").to_string(),
        None => text,
    }
}

pub fn format_number(value: &Value) -> String {
    match value {
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                group_thousands(&integer.to_string())
            } else if let Some(float) = number.as_f64() {
                format_float_grouped(float)
            } else {
                number.to_string()
            }
        }
        Value::String(text) if !text.trim().is_empty() => text.clone(),
        _ => EMPTY_DISPLAY.to_string(),
    }
}

fn format_float_grouped(value: f64) -> String {
    if !value.is_finite() {
        return EMPTY_DISPLAY.to_string();
    }
    let mut text = format!("{value:.3}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    match text.split_once('.') {
        Some((integer, fraction)) => format!("{}.{fraction}", group_thousands(integer)),
        None => group_thousands(&text),
    }
}

fn group_thousands(integer: &str) -> String {
    let (sign, digits) = match integer.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", integer),
    };
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}{grouped}")
}

/// Renders non-integers with one decimal place, integers as-is.
pub fn format_metric(value: f64) -> String {
    if !value.is_finite() {
        return EMPTY_DISPLAY.to_string();
    }
    if value.fract().abs() < f64::EPSILON {
        format!("{}", value as i64)
    } else {
        format!("{value:.1}")
    }
}
