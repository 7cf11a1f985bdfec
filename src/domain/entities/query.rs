use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const SEARCH_KEY: &str = "search";
pub const SORT_KEY: &str = "sort";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Number(f64),
    NumberRange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    MonthRange {
        start: String,
        end: String,
    },
}

impl FilterValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FilterValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FilterValue::Text(text) => text.trim().is_empty(),
            FilterValue::Number(_) => false,
            FilterValue::NumberRange { min, max } => min.is_none() && max.is_none(),
            FilterValue::MonthRange { start, end } => start.is_empty() || end.is_empty(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

/// Filter map sent to the gateway. Always carries a `sort` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(BTreeMap<String, FilterValue>);

impl Filters {
    pub fn new(default_sort: &str) -> Self {
        let mut values = BTreeMap::new();
        values.insert(SEARCH_KEY.to_string(), FilterValue::Text(String::new()));
        values.insert(
            SORT_KEY.to_string(),
            FilterValue::Text(default_sort.to_string()),
        );
        Self(values)
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.0.get(key)
    }

    pub fn text(&self, key: &str) -> &str {
        self.0
            .get(key)
            .and_then(FilterValue::as_text)
            .unwrap_or_default()
    }

    pub fn search(&self) -> &str {
        self.text(SEARCH_KEY)
    }

    pub fn sort(&self) -> &str {
        self.text(SORT_KEY)
    }

    pub fn set(&mut self, key: &str, value: FilterValue) {
        self.0.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<FilterValue> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.0.iter()
    }

    /// Entries that constrain the result set (everything but `sort`, empty values skipped).
    pub fn active(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.0
            .iter()
            .filter(|(key, value)| key.as_str() != SORT_KEY && !value.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    pub limit: usize,
    pub offset: usize,
}

impl PageWindow {
    pub fn for_page(current_page: usize, page_size: usize) -> Self {
        Self {
            limit: page_size,
            offset: current_page.saturating_sub(1) * page_size,
        }
    }
}

/// Live query state of one controller.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub filters: Filters,
    pub current_page: usize,
    pub page_size: usize,
    pub has_next_page: bool,
    pub loading: bool,
}

impl QueryState {
    pub fn new(filters: Filters, page_size: usize) -> Self {
        Self {
            filters,
            current_page: 1,
            page_size: page_size.max(1),
            has_next_page: false,
            loading: false,
        }
    }

    pub fn sort(&self) -> &str {
        self.filters.sort()
    }

    pub fn window(&self) -> PageWindow {
        PageWindow::for_page(self.current_page, self.page_size)
    }

    /// Back to page 1 of a result set that has not been fetched yet.
    pub fn restart_paging(&mut self) {
        self.current_page = 1;
        self.has_next_page = false;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: Option<u64>,
}
