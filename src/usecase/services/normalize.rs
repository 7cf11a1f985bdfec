//! Turning gateway responses into pages.
//!
//! Gateways answer either with the whole collection (`Raw`) or with an
//! already paginated envelope (`Paged`). Raw collections are filtered, sorted
//! and sliced locally so the controller always ends up with one page.

use std::cmp::Ordering;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::domain::entities::query::{Filters, PageResult, PageWindow};
use crate::usecase::ports::gateway::GatewayError;
use crate::usecase::ports::hooks::{ClientFilter, ClientSort};

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResponse<T> {
    Raw(Vec<T>),
    Paged { items: Vec<T>, total: Option<u64> },
}

impl<T: DeserializeOwned> QueryResponse<T> {
    pub fn from_value(value: Value) -> Result<Self, GatewayError> {
        match value {
            Value::Array(_) => Ok(QueryResponse::Raw(serde_json::from_value(value)?)),
            Value::Object(mut envelope) => {
                let items = match envelope.remove("items") {
                    Some(items @ Value::Array(_)) => serde_json::from_value(items)?,
                    Some(other) => {
                        return Err(GatewayError::MalformedResponse(format!(
                            "envelope items is not a collection: {other}"
                        )))
                    }
                    None => {
                        return Err(GatewayError::MalformedResponse(
                            "envelope has no items".to_string(),
                        ))
                    }
                };
                let total = envelope.get("total").and_then(total_from_value);
                Ok(QueryResponse::Paged { items, total })
            }
            other => Err(GatewayError::MalformedResponse(format!(
                "expected a collection or an envelope, got {other}"
            ))),
        }
    }
}

fn total_from_value(value: &Value) -> Option<u64> {
    if let Some(total) = value.as_u64() {
        return Some(total);
    }
    value
        .as_f64()
        .filter(|total| total.is_finite() && *total >= 0.0)
        .map(|total| total as u64)
}

/// Resolves one page out of a gateway response.
///
/// Raw collections get `filter` then `sort` applied against `filters`, their
/// length becomes the total and `window` selects the page. Envelopes are
/// taken as they are.
pub fn resolve_page<T>(
    response: QueryResponse<T>,
    filters: &Filters,
    window: PageWindow,
    filter: Option<&dyn ClientFilter<T>>,
    sort: Option<&dyn ClientSort<T>>,
) -> PageResult<T> {
    match response {
        QueryResponse::Paged { items, total } => PageResult { items, total },
        QueryResponse::Raw(records) => {
            let mut matched = match filter {
                Some(filter) => apply_client_filter(records, filters, filter),
                None => records,
            };
            if let Some(sort) = sort {
                matched = apply_client_sort(matched, filters, sort);
            }
            let total = matched.len() as u64;
            let items = matched
                .into_iter()
                .skip(window.offset)
                .take(window.limit)
                .collect();
            PageResult {
                items,
                total: Some(total),
            }
        }
    }
}

/// A failing predicate keeps the record.
pub fn apply_client_filter<T>(
    records: Vec<T>,
    filters: &Filters,
    filter: &dyn ClientFilter<T>,
) -> Vec<T> {
    records
        .into_iter()
        .filter(|record| match filter.matches(record, filters) {
            Ok(keep) => keep,
            Err(err) => {
                warn!(error = %err, "client filter failed; keeping record");
                true
            }
        })
        .collect()
}

/// Stable merge sort; a failing comparison counts as `Equal`.
pub fn apply_client_sort<T>(records: Vec<T>, filters: &Filters, sort: &dyn ClientSort<T>) -> Vec<T> {
    let mut failures = 0_usize;
    let sorted = merge_sort(records, &mut |a, b| match sort.compare(a, b, filters) {
        Ok(ordering) => ordering,
        Err(_) => {
            failures += 1;
            Ordering::Equal
        }
    });
    if failures > 0 {
        warn!(failures, "client sort comparisons failed; treated as unordered");
    }
    sorted
}

fn merge_sort<T>(mut records: Vec<T>, compare: &mut dyn FnMut(&T, &T) -> Ordering) -> Vec<T> {
    if records.len() <= 1 {
        return records;
    }
    let right = records.split_off(records.len() / 2);
    let left = merge_sort(records, compare);
    let right = merge_sort(right, compare);

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => compare(l, r) == Ordering::Greater,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }
    merged
}

/// Pagination bookkeeping for one committed page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub has_next_page: bool,
    pub total_pages: Option<u64>,
    pub result_text: String,
    pub page_info: String,
}

impl PageSummary {
    pub fn compute(
        current_page: usize,
        page_size: usize,
        total: Option<u64>,
        item_count: usize,
    ) -> Self {
        let page_size = page_size.max(1);
        match total {
            Some(total) => {
                let total_pages = total.div_ceil(page_size as u64).max(1);
                let has_next_page = (current_page as u64) < total_pages;
                let offset = current_page.saturating_sub(1) * page_size;
                let (start, end) = if item_count == 0 {
                    (0, 0)
                } else {
                    (offset + 1, offset + item_count)
                };
                Self {
                    has_next_page,
                    total_pages: Some(total_pages),
                    result_text: format!(
                        "total {total}, showing {start}-{end} (page {current_page}/{total_pages})"
                    ),
                    page_info: format!("page {current_page}/{total_pages}"),
                }
            }
            None => {
                let has_next_page = item_count == page_size;
                let last = if has_next_page { "" } else { ", last page" };
                Self {
                    has_next_page,
                    total_pages: None,
                    result_text: format!(
                        "showing {item_count} items (page {current_page}{last})"
                    ),
                    page_info: format!("page {current_page}{last}"),
                }
            }
        }
    }
}
