//! Resource query controller.
//!
//! One controller owns the live filter/sort/page state of one resource view.
//! UI input arrives either through the public mutation methods or as
//! [`UiEvent`]s on a channel bound once by [`ResourceQueryController::init`].
//! Every state change ends in [`ResourceQueryController::refresh`], which asks
//! the gateway for data, normalizes the answer into one page and pushes the
//! rendered cards to the view sink.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, warn};

use crate::domain::entities::query::{
    FilterValue, Filters, PageResult, PageWindow, QueryState, SEARCH_KEY, SORT_KEY,
};
use crate::domain::entities::resource::ResourceDescriptor;
use crate::domain::schema::filters::value_text;
use crate::domain::schema::formatters::format_metric;
use crate::domain::schema::registry::SchemaRegistry;
use crate::usecase::ports::gateway::{Gateway, GatewayError};
use crate::usecase::ports::hooks::{ClientFilter, ClientSort, ItemRenderer};
use crate::usecase::ports::view::{
    FilterOptions, MonthOption, OverviewMetric, PaginationView, ViewSink,
};
use crate::usecase::services::debounce::{Debouncer, DEFAULT_DEBOUNCE};
use crate::usecase::services::default_renderer::ColumnCardRenderer;
use crate::usecase::services::normalize::{resolve_page, PageSummary, QueryResponse};

pub const DEFAULT_FAILURE_MESSAGE: &str = "Failed to load data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub search_debounce: Duration,
    pub request_timeout: Option<Duration>,
    pub failure_message: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            search_debounce: DEFAULT_DEBOUNCE,
            request_timeout: None,
            failure_message: DEFAULT_FAILURE_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterInput {
    Year,
    Month,
    Sort,
    Gender,
    Age,
}

impl FilterInput {
    pub fn filter_key(self) -> &'static str {
        match self {
            FilterInput::Year => "year",
            FilterInput::Month => "month",
            FilterInput::Sort => SORT_KEY,
            FilterInput::Gender => "gender",
            FilterInput::Age => "age",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    SearchInput(String),
    Select { input: FilterInput, value: String },
    PrevPage,
    NextPage,
    Reset,
}

/// Inputs a view actually exposes. Events from anything else are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterBindings {
    pub search: bool,
    pub selects: BTreeSet<FilterInput>,
    pub pagination: bool,
}

impl FilterBindings {
    pub fn all() -> Self {
        Self {
            search: true,
            selects: [
                FilterInput::Year,
                FilterInput::Month,
                FilterInput::Sort,
                FilterInput::Gender,
                FilterInput::Age,
            ]
            .into_iter()
            .collect(),
            pagination: true,
        }
    }

    pub fn with_search(mut self) -> Self {
        self.search = true;
        self
    }

    pub fn with_select(mut self, input: FilterInput) -> Self {
        self.selects.insert(input);
        self
    }

    pub fn with_pagination(mut self) -> Self {
        self.pagination = true;
        self
    }

    pub fn accepts(&self, event: &UiEvent) -> bool {
        match event {
            UiEvent::SearchInput(_) => self.search,
            UiEvent::Select { input, .. } => self.selects.contains(input),
            UiEvent::PrevPage | UiEvent::NextPage => self.pagination,
            UiEvent::Reset => true,
        }
    }
}

pub struct ControllerConfig<T> {
    pub view: Arc<dyn ViewSink>,
    pub bindings: FilterBindings,
    pub events: Option<UnboundedReceiver<UiEvent>>,
    pub page_size: Option<usize>,
    pub initial_filters: Vec<(String, FilterValue)>,
    pub render_item: Option<Arc<dyn ItemRenderer<T>>>,
    pub client_filter: Option<Arc<dyn ClientFilter<T>>>,
    pub client_sort: Option<Arc<dyn ClientSort<T>>>,
    pub settings: ControllerSettings,
}

impl<T> ControllerConfig<T> {
    pub fn new(view: Arc<dyn ViewSink>) -> Self {
        Self {
            view,
            bindings: FilterBindings::all(),
            events: None,
            page_size: None,
            initial_filters: Vec::new(),
            render_item: None,
            client_filter: None,
            client_sort: None,
            settings: ControllerSettings::default(),
        }
    }

    pub fn bindings(mut self, bindings: FilterBindings) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn events(mut self, events: UnboundedReceiver<UiEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn initial_filter(mut self, key: &str, value: FilterValue) -> Self {
        self.initial_filters.push((key.to_string(), value));
        self
    }

    pub fn render_item(mut self, renderer: Arc<dyn ItemRenderer<T>>) -> Self {
        self.render_item = Some(renderer);
        self
    }

    pub fn client_filter(mut self, filter: Arc<dyn ClientFilter<T>>) -> Self {
        self.client_filter = Some(filter);
        self
    }

    pub fn client_sort(mut self, sort: Arc<dyn ClientSort<T>>) -> Self {
        self.client_sort = Some(sort);
        self
    }

    pub fn settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }
}

struct Inner<T> {
    descriptor: ResourceDescriptor,
    gateway: Arc<dyn Gateway>,
    view: Arc<dyn ViewSink>,
    renderer: Arc<dyn ItemRenderer<T>>,
    client_filter: Option<Arc<dyn ClientFilter<T>>>,
    client_sort: Option<Arc<dyn ClientSort<T>>>,
    bindings: FilterBindings,
    events: Mutex<Option<UnboundedReceiver<UiEvent>>>,
    bound: AtomicBool,
    initial_filters: Filters,
    state: Mutex<QueryState>,
    search_debounce: Debouncer,
    settings: ControllerSettings,
    request_seq: AtomicU64,
}

pub struct ResourceQueryController<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ResourceQueryController<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Clears `loading` when the refresh that set it is still the newest one.
struct LoadingGuard<'a> {
    seq: u64,
    latest: &'a AtomicU64,
    state: &'a Mutex<QueryState>,
    view: &'a dyn ViewSink,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.latest.load(Ordering::SeqCst) != self.seq {
            return;
        }
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .loading = false;
        self.view.set_loading(false);
    }
}

impl<T> ResourceQueryController<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Builds a controller for `key`. Performs no I/O.
    pub fn new(
        key: &str,
        registry: &SchemaRegistry,
        gateway: Arc<dyn Gateway>,
        config: ControllerConfig<T>,
    ) -> Self {
        let descriptor = registry.resolve(key);
        let page_size = config.page_size.unwrap_or(descriptor.page_size);

        let mut initial_filters = Filters::new(&descriptor.default_sort.key);
        for (key, value) in config.initial_filters {
            initial_filters.set(&key, value);
        }
        if initial_filters.sort().trim().is_empty() {
            initial_filters.set(SORT_KEY, descriptor.default_sort.key.as_str().into());
        }

        let renderer = config.render_item.unwrap_or_else(|| {
            Arc::new(ColumnCardRenderer::new(descriptor.columns.clone())) as Arc<dyn ItemRenderer<T>>
        });

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueryState::new(initial_filters.clone(), page_size)),
                initial_filters,
                gateway,
                view: config.view,
                renderer,
                client_filter: config.client_filter,
                client_sort: config.client_sort,
                bindings: config.bindings,
                events: Mutex::new(config.events),
                bound: AtomicBool::new(false),
                search_debounce: Debouncer::new(config.settings.search_debounce),
                settings: config.settings,
                request_seq: AtomicU64::new(0),
                descriptor,
            }),
        }
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.inner.descriptor
    }

    pub fn state(&self) -> QueryState {
        self.lock_state().clone()
    }

    pub fn filters(&self) -> Filters {
        self.lock_state().filters.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, QueryState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds events, loads filter options and overview (best effort), then refreshes.
    pub async fn init(&self) {
        self.bind_events();
        self.reload().await;
    }

    /// Reloads filter options, overview and the current page, e.g. after an import.
    pub async fn reload(&self) {
        self.load_filter_options().await;
        self.load_overview().await;
        self.refresh().await;
    }

    /// Starts consuming the configured event channel. Returns `false` after the first call.
    pub fn bind_events(&self) -> bool {
        if self.inner.bound.swap(true, Ordering::SeqCst) {
            return false;
        }
        let receiver = self
            .inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut events) = receiver {
            let controller = self.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    controller.dispatch(event);
                }
                debug!(
                    resource = %controller.inner.descriptor.key,
                    "event channel closed"
                );
            });
        }
        true
    }

    /// Applies one UI event. Search input is debounced; everything else refreshes at once.
    pub fn dispatch(&self, event: UiEvent) {
        if !self.inner.bindings.accepts(&event) {
            debug!(
                resource = %self.inner.descriptor.key,
                ?event,
                "ignoring event from unbound input"
            );
            return;
        }
        match event {
            UiEvent::SearchInput(text) => self.search_input(text),
            UiEvent::Select { input, value } => {
                self.apply_filter(input.filter_key(), FilterValue::Text(value));
                self.spawn_refresh();
            }
            UiEvent::PrevPage => {
                if self.step_page(false) {
                    self.spawn_refresh();
                }
            }
            UiEvent::NextPage => {
                if self.step_page(true) {
                    self.spawn_refresh();
                }
            }
            UiEvent::Reset => {
                self.apply_reset();
                self.spawn_refresh();
            }
        }
    }

    fn spawn_refresh(&self) {
        let controller = self.clone();
        tokio::spawn(async move { controller.refresh().await });
    }

    /// Debounced search: only the last text within the debounce window is applied.
    pub fn search_input(&self, text: impl Into<String>) {
        let text = text.into();
        let controller = self.clone();
        self.inner.search_debounce.schedule(async move {
            controller.apply_filter(SEARCH_KEY, FilterValue::Text(text));
            controller.refresh().await;
        });
    }

    pub async fn set_filter(&self, key: &str, value: FilterValue) {
        self.apply_filter(key, value);
        self.refresh().await;
    }

    pub async fn set_sort(&self, sort: &str) {
        self.apply_sort(sort);
        self.refresh().await;
    }

    pub async fn next_page(&self) -> bool {
        let moved = self.step_page(true);
        if moved {
            self.refresh().await;
        }
        moved
    }

    pub async fn prev_page(&self) -> bool {
        let moved = self.step_page(false);
        if moved {
            self.refresh().await;
        }
        moved
    }

    pub async fn reset(&self) {
        self.apply_reset();
        self.refresh().await;
    }

    fn apply_filter(&self, key: &str, value: FilterValue) {
        if key == SORT_KEY {
            let sort = value.as_text().unwrap_or_default().to_string();
            self.apply_sort(&sort);
            return;
        }
        let mut state = self.lock_state();
        state.filters.set(key, value);
        state.restart_paging();
    }

    fn apply_sort(&self, sort: &str) {
        let sort = match sort.trim() {
            "" => self.inner.descriptor.default_sort.key.as_str(),
            sort => sort,
        };
        let mut state = self.lock_state();
        state.filters.set(SORT_KEY, sort.into());
        state.restart_paging();
    }

    fn step_page(&self, forward: bool) -> bool {
        let mut state = self.lock_state();
        if forward && state.has_next_page {
            state.current_page += 1;
            true
        } else if !forward && state.current_page > 1 {
            state.current_page -= 1;
            true
        } else {
            false
        }
    }

    fn apply_reset(&self) {
        self.inner.search_debounce.cancel();
        let mut state = self.lock_state();
        state.filters = self.inner.initial_filters.clone();
        state.restart_paging();
    }

    /// Fetches, normalizes and renders the current page.
    ///
    /// Never returns an error: failures are logged and reported through the
    /// result-count sink while the previous cards stay on screen. A response
    /// that arrives after a newer refresh started is dropped. When the result
    /// set shrank below the current page, the last existing page is fetched
    /// instead.
    pub async fn refresh(&self) {
        let Some(operation) = self.inner.descriptor.api_operation.clone() else {
            debug!(resource = %self.inner.descriptor.key, "no api operation configured");
            return;
        };
        while let Some(last_page) = self.refresh_once(&operation).await {
            debug!(
                resource = %self.inner.descriptor.key,
                last_page,
                "current page is past the end, moving to the last page"
            );
        }
    }

    /// One fetch-and-render round. Returns the page to retry with when the
    /// requested page lies beyond the last one.
    async fn refresh_once(&self, operation: &str) -> Option<usize> {
        let inner = &*self.inner;
        let seq = inner.request_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let (filters, window, current_page, page_size) = {
            let mut state = self.lock_state();
            state.loading = true;
            (
                state.filters.clone(),
                state.window(),
                state.current_page,
                state.page_size,
            )
        };
        inner.view.set_loading(true);
        let _loading = LoadingGuard {
            seq,
            latest: &inner.request_seq,
            state: &inner.state,
            view: inner.view.as_ref(),
        };

        let outcome = self.fetch_page(operation, &filters, window).await;
        if inner.request_seq.load(Ordering::SeqCst) != seq {
            debug!(
                resource = %inner.descriptor.key,
                seq,
                "discarding response superseded by a newer refresh"
            );
            return None;
        }

        match outcome {
            Ok(page) => {
                if let Some(last_page) = last_page_before(current_page, page_size, page.total) {
                    let mut state = self.lock_state();
                    if state.current_page == current_page {
                        state.current_page = last_page;
                        return Some(last_page);
                    }
                }
                self.commit(page, current_page, page_size);
            }
            Err(err) => {
                error!(
                    resource = %inner.descriptor.key,
                    operation,
                    error = %err,
                    "failed to load resource page"
                );
                inner
                    .view
                    .set_result_count(inner.settings.failure_message.clone());
            }
        }
        None
    }

    async fn fetch_page(
        &self,
        operation: &str,
        filters: &Filters,
        window: PageWindow,
    ) -> Result<PageResult<T>, GatewayError> {
        let args = vec![serde_json::to_value(filters)?, serde_json::to_value(window)?];
        let value = self.invoke(operation, args).await?;
        let response = QueryResponse::<T>::from_value(value)?;
        Ok(resolve_page(
            response,
            filters,
            window,
            self.inner.client_filter.as_deref(),
            self.inner.client_sort.as_deref(),
        ))
    }

    async fn invoke(&self, operation: &str, args: Vec<Value>) -> Result<Value, GatewayError> {
        let call = self.inner.gateway.invoke(operation, args);
        match self.inner.settings.request_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| GatewayError::Timeout(limit))?,
            None => call.await,
        }
    }

    fn commit(&self, page: PageResult<T>, current_page: usize, page_size: usize) {
        let summary = PageSummary::compute(current_page, page_size, page.total, page.items.len());
        self.lock_state().has_next_page = summary.has_next_page;

        let view = &self.inner.view;
        let cards = page
            .items
            .iter()
            .map(|record| self.inner.renderer.render_item(record))
            .collect();
        view.replace_items(cards);
        view.set_result_count(summary.result_text);
        view.set_pagination(PaginationView {
            current_page,
            total: page.total,
            total_pages: summary.total_pages,
            has_prev: current_page > 1,
            has_next: summary.has_next_page,
            info: summary.page_info,
        });
    }

    pub async fn load_filter_options(&self) {
        let Some(operation) = self.inner.descriptor.filter_options_operation.as_deref() else {
            return;
        };
        match self.invoke(operation, Vec::new()).await {
            Ok(value) => self.inner.view.set_filter_options(parse_filter_options(&value)),
            Err(err) => warn!(
                resource = %self.inner.descriptor.key,
                operation,
                error = %err,
                "failed to load filter options"
            ),
        }
    }

    pub async fn load_overview(&self) {
        let Some(operation) = self.inner.descriptor.stats_operation.as_deref() else {
            return;
        };
        match self.invoke(operation, Vec::new()).await {
            Ok(value) => self.inner.view.set_overview(parse_overview(&value)),
            Err(err) => warn!(
                resource = %self.inner.descriptor.key,
                operation,
                error = %err,
                "failed to load overview"
            ),
        }
    }
}

/// Last existing page when `current_page` lies past the end of a known total.
fn last_page_before(current_page: usize, page_size: usize, total: Option<u64>) -> Option<usize> {
    let total_pages = total?.div_ceil(page_size.max(1) as u64).max(1);
    let last_page = usize::try_from(total_pages).ok()?;
    (current_page > last_page).then_some(last_page)
}

pub fn parse_filter_options(value: &Value) -> FilterOptions {
    let years = value
        .get("years")
        .and_then(Value::as_array)
        .map(|years| {
            years
                .iter()
                .map(value_text)
                .filter(|year| !year.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let months = value
        .get("months")
        .and_then(Value::as_array)
        .map(|months| {
            months
                .iter()
                .filter_map(|month| {
                    let value = value_text(month.get("value")?);
                    let label = month
                        .get("label")
                        .map(value_text)
                        .unwrap_or_else(|| value.clone());
                    Some(MonthOption { value, label })
                })
                .collect()
        })
        .unwrap_or_default();
    FilterOptions { years, months }
}

/// Numeric fields of `overall` (or of the top level when there is none).
pub fn parse_overview(value: &Value) -> Vec<OverviewMetric> {
    let source = value
        .get("overall")
        .filter(|overall| overall.is_object())
        .unwrap_or(value);
    let Some(fields) = source.as_object() else {
        return Vec::new();
    };
    fields
        .iter()
        .filter_map(|(key, value)| {
            let number = value.as_f64()?;
            Some(OverviewMetric {
                key: key.clone(),
                value: format_metric(number),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bindings_ignore_unbound_inputs() {
        let bindings = FilterBindings::default()
            .with_search()
            .with_select(FilterInput::Sort);

        assert!(bindings.accepts(&UiEvent::SearchInput("x".to_string())));
        assert!(bindings.accepts(&UiEvent::Select {
            input: FilterInput::Sort,
            value: "name".to_string()
        }));
        assert!(!bindings.accepts(&UiEvent::Select {
            input: FilterInput::Year,
            value: "2024".to_string()
        }));
        assert!(!bindings.accepts(&UiEvent::NextPage));
        assert!(bindings.accepts(&UiEvent::Reset));
    }

    #[test]
    fn last_page_only_reported_past_the_end() {
        assert_eq!(last_page_before(3, 2, Some(3)), Some(2));
        assert_eq!(last_page_before(2, 10, Some(0)), Some(1));
        assert_eq!(last_page_before(2, 2, Some(3)), None);
        assert_eq!(last_page_before(1, 10, Some(0)), None);
        assert_eq!(last_page_before(4, 10, None), None);
    }

    #[test]
    fn filter_options_accept_numeric_and_text_years() {
        let options = parse_filter_options(&json!({
            "years": [2024, "2023", null],
            "months": [{"value": "1", "label": "1月"}, {"value": 2}]
        }));

        assert_eq!(options.years, vec!["2024".to_string(), "2023".to_string()]);
        assert_eq!(options.months.len(), 2);
        assert_eq!(options.months[1].label, "2");
    }

    #[test]
    fn overview_prefers_overall_section() {
        let metrics = parse_overview(&json!({
            "overall": {"totalRecords": 12, "avgDaysPerFamily": 3.456, "firstRecordDate": "2023-01-01"},
            "currentYear": {"recordsThisYear": 2}
        }));

        assert_eq!(
            metrics,
            vec![
                OverviewMetric {
                    key: "avgDaysPerFamily".to_string(),
                    value: "3.5".to_string()
                },
                OverviewMetric {
                    key: "totalRecords".to_string(),
                    value: "12".to_string()
                },
            ]
        );
    }

    #[test]
    fn overview_falls_back_to_top_level_fields() {
        let metrics = parse_overview(&json!({"totalPatients": 4, "totalRecords": 9}));

        assert_eq!(metrics.len(), 2);
        assert!(parse_overview(&json!([1, 2])).is_empty());
    }
}
