use std::cmp::Ordering;

use crate::domain::entities::query::Filters;
use crate::usecase::ports::view::CardView;

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("record rejected by hook: {0}")]
    Record(String),
    #[error("record could not be inspected: {0}")]
    Json(#[from] serde_json::Error),
}

/// Record predicate applied when the gateway hands back an unpaginated collection.
pub trait ClientFilter<T>: Send + Sync {
    fn matches(&self, record: &T, filters: &Filters) -> Result<bool, HookError>;
}

/// Comparator applied after [`ClientFilter`] on unpaginated collections.
pub trait ClientSort<T>: Send + Sync {
    fn compare(&self, a: &T, b: &T, filters: &Filters) -> Result<Ordering, HookError>;
}

/// Pure record-to-view function. Must not perform I/O.
pub trait ItemRenderer<T>: Send + Sync {
    fn render_item(&self, record: &T) -> CardView;
}

impl<T, F> ClientFilter<T> for F
where
    F: Fn(&T, &Filters) -> Result<bool, HookError> + Send + Sync,
{
    fn matches(&self, record: &T, filters: &Filters) -> Result<bool, HookError> {
        self(record, filters)
    }
}

impl<T, F> ClientSort<T> for F
where
    F: Fn(&T, &T, &Filters) -> Result<Ordering, HookError> + Send + Sync,
{
    fn compare(&self, a: &T, b: &T, filters: &Filters) -> Result<Ordering, HookError> {
        self(a, b, filters)
    }
}

impl<T, F> ItemRenderer<T> for F
where
    F: Fn(&T) -> CardView + Send + Sync,
{
    fn render_item(&self, record: &T) -> CardView {
        self(record)
    }
}
