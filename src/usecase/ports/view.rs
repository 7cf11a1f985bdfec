use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardField {
    pub label: String,
    pub value: String,
}

impl CardField {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// View node produced by an item renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardView {
    pub key: Option<String>,
    pub title: String,
    pub subtitle: Option<String>,
    pub fields: Vec<CardField>,
}

impl CardView {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn field(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(CardField::new(label, value));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationView {
    pub current_page: usize,
    pub total: Option<u64>,
    pub total_pages: Option<u64>,
    pub has_prev: bool,
    pub has_next: bool,
    pub info: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub years: Vec<String>,
    pub months: Vec<MonthOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewMetric {
    pub key: String,
    pub value: String,
}

/// Everything one resource panel shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceView {
    pub items: Vec<CardView>,
    pub result_count: String,
    pub pagination: PaginationView,
    pub loading: bool,
    pub filter_options: FilterOptions,
    pub overview: Vec<OverviewMetric>,
}

/// Output hooks of a controller (container, result-count and pagination sinks).
pub trait ViewSink: Send + Sync {
    fn replace_items(&self, items: Vec<CardView>);
    fn set_result_count(&self, text: String);
    fn set_pagination(&self, pagination: PaginationView);
    fn set_loading(&self, _loading: bool) {}
    fn set_filter_options(&self, _options: FilterOptions) {}
    fn set_overview(&self, _overview: Vec<OverviewMetric>) {}
}

/// Publishes a [`ResourceView`] snapshot on a watch channel for the UI to pick up.
#[derive(Debug)]
pub struct ViewPublisher {
    tx: watch::Sender<ResourceView>,
}

impl ViewPublisher {
    pub fn new() -> (Self, watch::Receiver<ResourceView>) {
        let (tx, rx) = watch::channel(ResourceView::default());
        (Self { tx }, rx)
    }

    pub fn snapshot(&self) -> ResourceView {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceView> {
        self.tx.subscribe()
    }
}

impl ViewSink for ViewPublisher {
    fn replace_items(&self, items: Vec<CardView>) {
        self.tx.send_modify(|view| view.items = items);
    }

    fn set_result_count(&self, text: String) {
        self.tx.send_modify(|view| view.result_count = text);
    }

    fn set_pagination(&self, pagination: PaginationView) {
        self.tx.send_modify(|view| view.pagination = pagination);
    }

    fn set_loading(&self, loading: bool) {
        self.tx.send_modify(|view| view.loading = loading);
    }

    fn set_filter_options(&self, options: FilterOptions) {
        self.tx.send_modify(|view| view.filter_options = options);
    }

    fn set_overview(&self, overview: Vec<OverviewMetric>) {
        self.tx.send_modify(|view| view.overview = overview);
    }
}
