//! Client-side filter and sort hooks for resources whose backend returns the whole collection.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;
use serde_json::Value;

use crate::domain::entities::query::Filters;
use crate::domain::entities::records::{CheckInRecord, PatientSummary};
use crate::domain::entities::resource::FilterSpec;
use crate::domain::schema::filters::matches_spec;
use crate::domain::schema::formatters::parse_date;
use crate::usecase::ports::hooks::{ClientFilter, ClientSort, HookError};

/// Whole years between `birth_date` and `today`, `None` when the date is unusable.
pub fn calc_age(birth_date: &str, today: NaiveDate) -> Option<u32> {
    let birth = parse_date(birth_date)?;
    if birth > today {
        return None;
    }
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

/// Parses `"3-6"` into `(3, Some(6))` and `"13+"` into `(13, None)`.
fn parse_age_range(range: &str) -> Option<(u32, Option<u32>)> {
    let range = range.trim();
    if let Some(min) = range.strip_suffix('+') {
        return Some((min.trim().parse().ok()?, None));
    }
    let (min, max) = range.split_once('-')?;
    Some((min.trim().parse().ok()?, Some(max.trim().parse().ok()?)))
}

fn contains_keyword(field: Option<&str>, keyword: &str) -> bool {
    field.is_some_and(|text| text.to_lowercase().contains(keyword))
}

#[derive(Debug, Clone, Copy)]
pub struct PatientFilter {
    today: NaiveDate,
}

impl PatientFilter {
    pub fn new() -> Self {
        Self::as_of(Local::now().date_naive())
    }

    pub fn as_of(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl Default for PatientFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFilter<PatientSummary> for PatientFilter {
    fn matches(&self, patient: &PatientSummary, filters: &Filters) -> Result<bool, HookError> {
        let keyword = filters.search().trim().to_lowercase();
        if !keyword.is_empty()
            && !contains_keyword(Some(&patient.name), &keyword)
            && !contains_keyword(patient.hometown.as_deref(), &keyword)
            && !contains_keyword(patient.diagnosis.as_deref(), &keyword)
        {
            return Ok(false);
        }

        let gender = filters.text("gender").trim();
        if !gender.is_empty() && patient.gender.as_deref() != Some(gender) {
            return Ok(false);
        }

        let age_range = filters.text("age").trim();
        if !age_range.is_empty() {
            let (min, max) = parse_age_range(age_range)
                .ok_or_else(|| HookError::Record(format!("invalid age range: {age_range}")))?;
            let age = patient
                .birth_date
                .as_deref()
                .and_then(|birth| calc_age(birth, self.today));
            let Some(age) = age else {
                return Ok(false);
            };
            if age < min || max.is_some_and(|max| age > max) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PatientSort {
    today: NaiveDate,
}

impl PatientSort {
    pub fn new() -> Self {
        Self::as_of(Local::now().date_naive())
    }

    pub fn as_of(today: NaiveDate) -> Self {
        Self { today }
    }

    fn age(&self, patient: &PatientSummary) -> Option<u32> {
        patient
            .birth_date
            .as_deref()
            .and_then(|birth| calc_age(birth, self.today))
    }
}

impl Default for PatientSort {
    fn default() -> Self {
        Self::new()
    }
}

/// `Some` values first, in the order `compare` gives them.
fn known_first<V: Ord>(a: Option<V>, b: Option<V>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if descending => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl ClientSort<PatientSummary> for PatientSort {
    fn compare(
        &self,
        a: &PatientSummary,
        b: &PatientSummary,
        filters: &Filters,
    ) -> Result<Ordering, HookError> {
        let ordering = match filters.sort() {
            "name" => a.name.cmp(&b.name),
            "age" => known_first(self.age(a), self.age(b), true),
            "visits" => b.check_in_count.cmp(&a.check_in_count),
            "recent" => known_first(
                a.latest_check_in.as_deref().and_then(parse_date),
                b.latest_check_in.as_deref().and_then(parse_date),
                true,
            ),
            other => return Err(HookError::Record(format!("unknown sort key: {other}"))),
        };
        Ok(ordering)
    }
}

/// Orders check-ins by date; `checkin-asc` oldest first, anything else newest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckInSort;

impl ClientSort<CheckInRecord> for CheckInSort {
    fn compare(
        &self,
        a: &CheckInRecord,
        b: &CheckInRecord,
        filters: &Filters,
    ) -> Result<Ordering, HookError> {
        let date = |record: &CheckInRecord| record.checkin_date.as_deref().and_then(parse_date);
        Ok(known_first(
            date(a),
            date(b),
            filters.sort() != "checkin-asc",
        ))
    }
}

/// Generic filter driven by a resource's filter schema.
///
/// Each active filter whose key appears in the schema is checked against the
/// record field the schema names. Keys without a schema entry are ignored.
#[derive(Debug, Clone, Default)]
pub struct SchemaFilter {
    schema: BTreeMap<String, FilterSpec>,
}

impl SchemaFilter {
    pub fn new(schema: BTreeMap<String, FilterSpec>) -> Self {
        Self { schema }
    }
}

impl<T: Serialize> ClientFilter<T> for SchemaFilter {
    fn matches(&self, record: &T, filters: &Filters) -> Result<bool, HookError> {
        let record = serde_json::to_value(record)?;
        let null = Value::Null;
        for (key, filter) in filters.active() {
            let Some(spec) = self.schema.get(key) else {
                continue;
            };
            let item = record.get(&spec.field).unwrap_or(&null);
            if !matches_spec(spec, item, filter) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
