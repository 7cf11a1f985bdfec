use std::collections::BTreeMap;

use crate::domain::entities::resource::{
    ColumnSpec, FilterKind, FilterSpec, ResourceDescriptor, ResourceKey, SortKey, SortOption,
    SortOrder, DEFAULT_PAGE_SIZE,
};
use crate::domain::schema::formatters::FormatterId;

pub const GET_PATIENTS: &str = "get-patients";
pub const GET_EXTENDED_STATISTICS: &str = "get-extended-statistics";
pub const GET_PATIENT_DETAIL: &str = "get-patient-detail";
pub const GET_CHECK_INS: &str = "checkins:get-records";
pub const GET_FAMILY_SERVICES: &str = "family-service:get-records";
pub const GET_FAMILY_SERVICE_OVERVIEW: &str = "family-service:get-overview-stats";
pub const GET_FAMILY_SERVICE_FILTER_OPTIONS: &str = "family-service:get-filter-options";

/// Lookup table of resource descriptors, passed explicitly to whoever builds a controller.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    descriptors: BTreeMap<String, ResourceDescriptor>,
}

impl SchemaRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_builtin_resources() -> Self {
        let mut registry = Self::empty();
        registry.register(patients_descriptor());
        registry.register(check_ins_descriptor());
        registry.register(family_services_descriptor());
        registry
    }

    pub fn register(&mut self, descriptor: ResourceDescriptor) {
        self.descriptors.insert(descriptor.key.clone(), descriptor);
    }

    pub fn get(&self, key: &str) -> Option<&ResourceDescriptor> {
        self.descriptors.get(key)
    }

    /// Unknown keys resolve to an unconfigured descriptor.
    pub fn resolve(&self, key: &str) -> ResourceDescriptor {
        self.get(key)
            .cloned()
            .unwrap_or_else(|| ResourceDescriptor::unconfigured(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }
}

fn patients_descriptor() -> ResourceDescriptor {
    ResourceDescriptor {
        key: ResourceKey::Patients.as_str().to_string(),
        api_operation: Some(GET_PATIENTS.to_string()),
        filter_options_operation: None,
        stats_operation: Some(GET_EXTENDED_STATISTICS.to_string()),
        columns: vec![
            ColumnSpec::new("name", "姓名").width(140),
            ColumnSpec::new("gender", "性别").width(80),
            ColumnSpec::new("birth_date", "出生日期")
                .width(120)
                .formatter(FormatterId::Date),
            ColumnSpec::new("hometown", "籍贯").width(140),
            ColumnSpec::new("diagnosis", "诊断"),
            ColumnSpec::new("check_in_count", "入住次数")
                .width(100)
                .formatter(FormatterId::Number),
            ColumnSpec::new("latest_check_in", "最近入住")
                .width(140)
                .formatter(FormatterId::Date),
        ],
        filter_schema: BTreeMap::from([
            (
                "search".to_string(),
                FilterSpec::new("name", FilterKind::Text, "关键词"),
            ),
            (
                "gender".to_string(),
                FilterSpec::new("gender", FilterKind::Select, "性别").options(&["男", "女"]),
            ),
            (
                "age".to_string(),
                FilterSpec::new("birth_date", FilterKind::Select, "年龄段").options(&[
                    "0-2", "3-6", "7-12", "13-17",
                ]),
            ),
        ]),
        default_sort: SortKey::new("recent", SortOrder::Desc),
        sort_options: vec![
            SortOption::new("recent", "最近入住"),
            SortOption::new("name", "姓名"),
            SortOption::new("age", "年龄"),
            SortOption::new("visits", "入住次数"),
        ],
        page_size: DEFAULT_PAGE_SIZE,
    }
}

fn check_ins_descriptor() -> ResourceDescriptor {
    ResourceDescriptor {
        key: ResourceKey::CheckIns.as_str().to_string(),
        api_operation: Some(GET_CHECK_INS.to_string()),
        filter_options_operation: None,
        stats_operation: None,
        columns: vec![
            ColumnSpec::new("child_name", "患儿姓名").width(180),
            ColumnSpec::new("checkin_date", "入住日期")
                .formatter(FormatterId::Date)
                .sortable(),
            ColumnSpec::new("attendees", "陪同人员"),
            ColumnSpec::new("details", "症状详情"),
            ColumnSpec::new("treatment_plan", "医疗安排"),
        ],
        filter_schema: BTreeMap::from([
            (
                "search".to_string(),
                FilterSpec::new("child_name", FilterKind::Text, "患儿姓名"),
            ),
            (
                "dateRange".to_string(),
                FilterSpec::new("checkin_date", FilterKind::MonthRange, "入住日期范围"),
            ),
        ]),
        default_sort: SortKey::new("checkin-desc", SortOrder::Desc),
        sort_options: vec![
            SortOption::new("checkin-desc", "入住日期（新→旧）"),
            SortOption::new("checkin-asc", "入住日期（旧→新）"),
        ],
        page_size: DEFAULT_PAGE_SIZE,
    }
}

fn family_services_descriptor() -> ResourceDescriptor {
    ResourceDescriptor {
        key: ResourceKey::FamilyServices.as_str().to_string(),
        api_operation: Some(GET_FAMILY_SERVICES.to_string()),
        filter_options_operation: Some(GET_FAMILY_SERVICE_FILTER_OPTIONS.to_string()),
        stats_operation: Some(GET_FAMILY_SERVICE_OVERVIEW.to_string()),
        columns: vec![
            ColumnSpec::new("year_month", "年月")
                .width(120)
                .formatter(FormatterId::YearMonth)
                .sortable(),
            ColumnSpec::new("sequence_number", "序号").width(80),
            ColumnSpec::new("family_count", "家庭数")
                .width(100)
                .formatter(FormatterId::Number)
                .sortable(),
            ColumnSpec::new("residents_count", "住院人次")
                .width(120)
                .formatter(FormatterId::Number)
                .sortable(),
            ColumnSpec::new("residence_days", "住院天数")
                .width(120)
                .formatter(FormatterId::Number)
                .sortable(),
            ColumnSpec::new("accommodation_count", "陪伴住宿人次")
                .width(140)
                .formatter(FormatterId::Number),
            ColumnSpec::new("care_service_count", "关爱服务人次")
                .width(140)
                .formatter(FormatterId::Number),
            ColumnSpec::new("volunteer_service_count", "志愿服务人次")
                .width(140)
                .formatter(FormatterId::Number),
            ColumnSpec::new("total_service_count", "总服务人次")
                .width(140)
                .formatter(FormatterId::Number)
                .sortable(),
            ColumnSpec::new("notes", "备注"),
        ],
        filter_schema: BTreeMap::from([
            (
                "dateRange".to_string(),
                FilterSpec::new("year_month", FilterKind::MonthRange, "年月范围"),
            ),
            (
                "year".to_string(),
                FilterSpec::new("year_month", FilterKind::Select, "年份"),
            ),
            (
                "familyCountRange".to_string(),
                FilterSpec::new("family_count", FilterKind::NumberRange, "家庭数范围"),
            ),
            (
                "totalServiceRange".to_string(),
                FilterSpec::new("total_service_count", FilterKind::NumberRange, "总服务人次范围"),
            ),
        ]),
        default_sort: SortKey::new("date-desc", SortOrder::Desc),
        sort_options: vec![
            SortOption::new("date-desc", "年月（新→旧）"),
            SortOption::new("date-asc", "年月（旧→新）"),
            SortOption::new("families-desc", "家庭数（多→少）"),
            SortOption::new("families-asc", "家庭数（少→多）"),
            SortOption::new("services-desc", "服务人次（多→少）"),
            SortOption::new("services-asc", "服务人次（少→多）"),
        ],
        page_size: DEFAULT_PAGE_SIZE,
    }
}
