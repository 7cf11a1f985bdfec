use serde_json::Value;

use crate::domain::entities::query::FilterValue;
use crate::domain::entities::resource::{FilterKind, FilterSpec};
use crate::domain::schema::formatters::parse_date;

pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn is_text_match(item: &Value, search: &str) -> bool {
    let search = search.trim();
    if search.is_empty() {
        return true;
    }
    value_text(item)
        .to_lowercase()
        .contains(&search.to_lowercase())
}

pub fn is_in_number_range(item: &Value, min: Option<f64>, max: Option<f64>) -> bool {
    let Some(number) = value_number(item) else {
        return false;
    };
    if min.is_some_and(|min| number < min) {
        return false;
    }
    if max.is_some_and(|max| number > max) {
        return false;
    }
    true
}

pub fn is_in_month_range(item: &Value, start: &str, end: &str) -> bool {
    let (Some(start), Some(end)) = (parse_date(start), parse_date(end)) else {
        return true;
    };
    match parse_date(&value_text(item)) {
        Some(date) => date >= start && date <= end,
        None => false,
    }
}

/// Applies one schema entry to one field value. Empty filter values always match.
pub fn matches_spec(spec: &FilterSpec, item: &Value, filter: &FilterValue) -> bool {
    if filter.is_empty() {
        return true;
    }
    match (spec.kind, filter) {
        (FilterKind::MonthRange, FilterValue::MonthRange { start, end }) => {
            is_in_month_range(item, start, end)
        }
        (FilterKind::NumberRange, FilterValue::NumberRange { min, max }) => {
            is_in_number_range(item, *min, *max)
        }
        (FilterKind::NumberRange, FilterValue::Number(min)) => {
            is_in_number_range(item, Some(*min), None)
        }
        (FilterKind::Select, FilterValue::Text(expected)) => value_text(item) == *expected,
        (FilterKind::Select, FilterValue::Number(expected)) => {
            value_number(item).is_some_and(|number| (number - expected).abs() < f64::EPSILON)
        }
        (FilterKind::Text, FilterValue::Text(search)) => is_text_match(item, search),
        _ => true,
    }
}
