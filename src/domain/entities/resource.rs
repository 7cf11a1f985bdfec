use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::schema::formatters::FormatterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    Patients,
    CheckIns,
    FamilyServices,
}

impl ResourceKey {
    pub const ALL: [ResourceKey; 3] = [
        ResourceKey::Patients,
        ResourceKey::FamilyServices,
        ResourceKey::CheckIns,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKey::Patients => "patients",
            ResourceKey::CheckIns => "checkins",
            ResourceKey::FamilyServices => "familyServices",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ResourceKey::Patients => "患儿档案",
            ResourceKey::CheckIns => "入住记录",
            ResourceKey::FamilyServices => "家庭服务",
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "patients" => Ok(ResourceKey::Patients),
            "checkins" => Ok(ResourceKey::CheckIns),
            "familyServices" => Ok(ResourceKey::FamilyServices),
            other => Err(format!("unknown resource: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Sort value a controller starts with. `key` is what lands in `filters.sort`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub key: String,
    pub order: SortOrder,
}

impl SortKey {
    pub fn new(key: &str, order: SortOrder) -> Self {
        Self {
            key: key.to_string(),
            order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOption {
    pub value: String,
    pub label: String,
}

impl SortOption {
    pub fn new(value: &str, label: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub key: String,
    pub title: String,
    pub formatter: Option<FormatterId>,
    pub width: Option<u32>,
    pub sortable: bool,
}

impl ColumnSpec {
    pub fn new(key: &str, title: &str) -> Self {
        Self {
            key: key.to_string(),
            title: title.to_string(),
            formatter: None,
            width: None,
            sortable: false,
        }
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn formatter(mut self, formatter: FormatterId) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Text,
    Select,
    NumberRange,
    MonthRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub field: String,
    pub kind: FilterKind,
    pub label: String,
    pub options: Vec<String>,
}

impl FilterSpec {
    pub fn new(field: &str, kind: FilterKind, label: &str) -> Self {
        Self {
            field: field.to_string(),
            kind,
            label: label.to_string(),
            options: Vec::new(),
        }
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|option| option.to_string()).collect();
        self
    }
}

/// Static description of one queryable collection.
///
/// `api_operation` is the gateway operation the controller calls on every
/// refresh; when it is `None` the resource is unconfigured and refreshing it
/// does nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub key: String,
    pub api_operation: Option<String>,
    pub filter_options_operation: Option<String>,
    pub stats_operation: Option<String>,
    pub columns: Vec<ColumnSpec>,
    pub filter_schema: BTreeMap<String, FilterSpec>,
    pub default_sort: SortKey,
    pub sort_options: Vec<SortOption>,
    pub page_size: usize,
}

pub const DEFAULT_PAGE_SIZE: usize = 12;
pub const FALLBACK_SORT: &str = "date-desc";

impl ResourceDescriptor {
    pub fn unconfigured(key: &str) -> Self {
        Self {
            key: key.to_string(),
            api_operation: None,
            filter_options_operation: None,
            stats_operation: None,
            columns: Vec::new(),
            filter_schema: BTreeMap::new(),
            default_sort: SortKey::new(FALLBACK_SORT, SortOrder::Desc),
            sort_options: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_operation.is_some()
    }

    pub fn column(&self, key: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.key == key)
    }
}
