use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use calamine::Data;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::domain::entities::query::{FilterValue, Filters, PageWindow};
use crate::domain::entities::records::{FamilyServiceRecord, NewPatientRecord};
use crate::domain::entities::resource::{ColumnSpec, ResourceDescriptor};
use crate::domain::schema::registry::{
    SchemaRegistry, GET_FAMILY_SERVICES, GET_FAMILY_SERVICE_FILTER_OPTIONS, GET_PATIENTS,
    GET_PATIENT_DETAIL,
};
use crate::infra::import::xlsx::{import_family_service_rows, import_patient_rows};
use crate::infra::sqlite::gateway::SqliteGateway;
use crate::infra::sqlite::queries::{
    family_service_filter_options, family_service_overview, insert_patient_record, list_check_ins,
    list_patients, patient_detail, patient_statistics, query_family_services,
};
use crate::ui::state::app_state::load_patient_detail;
use crate::infra::sqlite::schema::init_db;
use crate::usecase::ports::gateway::{Gateway, GatewayError};
use crate::usecase::ports::hooks::{ClientFilter, HookError};
use crate::usecase::ports::view::{ResourceView, ViewPublisher};
use crate::usecase::services::export_service::ExportService;
use crate::usecase::services::import_service::ImportService;
use crate::usecase::services::query_controller::{
    ControllerConfig, ControllerSettings, FilterBindings, FilterInput, ResourceQueryController,
    UiEvent, DEFAULT_FAILURE_MESSAGE,
};

fn unique_test_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("caredesk-{prefix}-{nanos}"))
}

const LIST_ITEMS: &str = "items:list";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    id: i64,
}

fn item_array(ids: &[i64]) -> Value {
    Value::Array(ids.iter().map(|id| json!({ "id": id })).collect())
}

type Responder = Box<dyn Fn(&str, usize, &[Value]) -> Result<Value, GatewayError> + Send + Sync>;

/// Records every call and answers through `respond`, optionally after a per-call delay.
struct FakeGateway {
    respond: Responder,
    delays: Mutex<VecDeque<Duration>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl FakeGateway {
    fn new(
        respond: impl Fn(usize, &[Value]) -> Result<Value, GatewayError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_delays(respond, &[])
    }

    fn with_delays(
        respond: impl Fn(usize, &[Value]) -> Result<Value, GatewayError> + Send + Sync + 'static,
        delays: &[Duration],
    ) -> Arc<Self> {
        Self::build(
            Box::new(move |_, call, args| respond(call, args)),
            delays,
        )
    }

    /// Answers by operation name only.
    fn routed(
        respond: impl Fn(&str) -> Result<Value, GatewayError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::build(Box::new(move |operation, _, _| respond(operation)), &[])
    }

    fn build(respond: Responder, delays: &[Duration]) -> Arc<Self> {
        Arc::new(Self {
            respond,
            delays: Mutex::new(delays.iter().copied().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().expect("lock should not be poisoned").clone()
    }

    fn operations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|(operation, _)| operation)
            .collect()
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn invoke(&self, operation: &str, args: Vec<Value>) -> Result<Value, GatewayError> {
        let call_index = {
            let mut calls = self.calls.lock().expect("lock should not be poisoned");
            calls.push((operation.to_string(), args.clone()));
            calls.len() - 1
        };
        let delay = self
            .delays
            .lock()
            .expect("lock should not be poisoned")
            .pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(operation, call_index, &args)
    }
}

struct RejectId(i64);

impl ClientFilter<Item> for RejectId {
    fn matches(&self, item: &Item, _filters: &Filters) -> Result<bool, HookError> {
        Ok(item.id != self.0)
    }
}

/// Keeps only item 1 once a year is selected.
struct FirstItemForYear;

impl ClientFilter<Item> for FirstItemForYear {
    fn matches(&self, item: &Item, filters: &Filters) -> Result<bool, HookError> {
        Ok(filters.text("year").is_empty() || item.id == 1)
    }
}

const ITEM_OPTIONS: &str = "items:options";
const ITEM_OVERVIEW: &str = "items:overview";

fn item_descriptor(page_size: usize) -> ResourceDescriptor {
    let mut descriptor = ResourceDescriptor::unconfigured("items");
    descriptor.api_operation = Some(LIST_ITEMS.to_string());
    descriptor.columns = vec![ColumnSpec::new("id", "编号")];
    descriptor.page_size = page_size;
    descriptor
}

fn registry_of(descriptor: ResourceDescriptor) -> SchemaRegistry {
    let mut registry = SchemaRegistry::empty();
    registry.register(descriptor);
    registry
}

fn item_controller(
    page_size: usize,
    gateway: Arc<FakeGateway>,
    configure: impl FnOnce(ControllerConfig<Item>) -> ControllerConfig<Item>,
) -> (ResourceQueryController<Item>, Arc<ViewPublisher>) {
    controller_for(item_descriptor(page_size), gateway, configure)
}

fn controller_for(
    descriptor: ResourceDescriptor,
    gateway: Arc<FakeGateway>,
    configure: impl FnOnce(ControllerConfig<Item>) -> ControllerConfig<Item>,
) -> (ResourceQueryController<Item>, Arc<ViewPublisher>) {
    let (publisher, _view) = ViewPublisher::new();
    let publisher = Arc::new(publisher);
    let config = configure(ControllerConfig::new(publisher.clone()).bindings(FilterBindings::all()));
    let controller = ResourceQueryController::new("items", &registry_of(descriptor), gateway, config);
    (controller, publisher)
}

/// Item descriptor that also loads filter options and an overview.
fn item_descriptor_with_extras() -> ResourceDescriptor {
    let mut descriptor = item_descriptor(10);
    descriptor.filter_options_operation = Some(ITEM_OPTIONS.to_string());
    descriptor.stats_operation = Some(ITEM_OVERVIEW.to_string());
    descriptor
}

fn card_keys(view: &ResourceView) -> Vec<String> {
    view.items
        .iter()
        .map(|card| card.key.clone().unwrap_or_default())
        .collect()
}

#[tokio::test]
async fn bare_collection_is_paged_on_the_client() {
    let gateway = FakeGateway::new(|_, _| Ok(item_array(&[1, 2, 3, 4, 5])));
    let (controller, view) = item_controller(2, gateway, |config| config);

    controller.refresh().await;
    let first = view.snapshot();

    assert_eq!(card_keys(&first), vec!["1", "2"]);
    assert_eq!(first.pagination.total, Some(5));
    assert!(first.pagination.has_next);
    assert!(!first.pagination.has_prev);

    assert!(controller.next_page().await);
    assert!(controller.next_page().await);
    let last = view.snapshot();

    assert_eq!(card_keys(&last), vec!["5"]);
    assert!(!last.pagination.has_next);
    assert_eq!(last.result_count, "total 5, showing 5-5 (page 3/3)");
    assert!(!controller.next_page().await, "last page has no successor");
}

#[tokio::test]
async fn envelope_total_drives_result_text() {
    let gateway = FakeGateway::new(|_, _| Ok(json!({ "items": item_array(&[1, 2]), "total": 2 })));
    let (controller, view) = item_controller(10, gateway, |config| config);

    controller.refresh().await;
    let snapshot = view.snapshot();

    assert_eq!(snapshot.pagination.total_pages, Some(1));
    assert!(!snapshot.pagination.has_next);
    assert_eq!(snapshot.result_count, "total 2, showing 1-2 (page 1/1)");
}

#[tokio::test]
async fn client_filter_narrows_total_and_keeps_order() {
    let gateway = FakeGateway::new(|_, _| Ok(item_array(&[1, 2, 3])));
    let (controller, view) = item_controller(10, gateway, |config| {
        config.client_filter(Arc::new(RejectId(2)))
    });

    controller.refresh().await;
    let snapshot = view.snapshot();

    assert_eq!(card_keys(&snapshot), vec!["1", "3"]);
    assert_eq!(snapshot.pagination.total, Some(2));
}

#[tokio::test(start_paused = true)]
async fn search_keystrokes_collapse_into_one_query() {
    let gateway = FakeGateway::new(|_, _| Ok(item_array(&[1])));
    let (controller, _view) = item_controller(10, gateway.clone(), |config| config);

    for text in ["a", "ab", "abc"] {
        controller.dispatch(UiEvent::SearchInput(text.to_string()));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tokio::time::sleep(Duration::from_millis(400)).await;

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1, "exactly one query after the burst");
    assert_eq!(calls[0].1[0]["search"], json!("abc"));
    assert_eq!(controller.filters().search(), "abc");
}

#[tokio::test]
async fn failed_call_reports_failure_message_and_keeps_cards() {
    let gateway = FakeGateway::new(|call, _| match call {
        0 => Ok(item_array(&[1, 2])),
        _ => Err(GatewayError::Backend("database is locked".to_string())),
    });
    let (controller, view) = item_controller(10, gateway, |config| config);

    controller.refresh().await;
    controller.refresh().await;
    let snapshot = view.snapshot();

    assert!(!snapshot.loading);
    assert!(!controller.state().loading);
    assert_eq!(snapshot.result_count, DEFAULT_FAILURE_MESSAGE);
    assert_eq!(card_keys(&snapshot), vec!["1", "2"]);
}

#[tokio::test]
async fn failure_message_is_configurable() {
    let gateway = FakeGateway::new(|_, _| Err(GatewayError::Backend("offline".to_string())));
    let (controller, view) = item_controller(10, gateway, |config| {
        config.settings(ControllerSettings {
            failure_message: "加载数据失败".to_string(),
            ..ControllerSettings::default()
        })
    });

    controller.refresh().await;

    assert_eq!(view.snapshot().result_count, "加载数据失败");
}

#[tokio::test]
async fn changing_filters_or_sort_returns_to_first_page() {
    let gateway = FakeGateway::new(|_, _| Ok(item_array(&[1, 2, 3, 4, 5])));
    let (controller, _view) = item_controller(2, gateway.clone(), |config| config);

    controller.refresh().await;
    assert!(controller.next_page().await);
    assert_eq!(controller.state().current_page, 2);

    controller.set_filter("gender", "女".into()).await;
    assert_eq!(controller.state().current_page, 1);

    assert!(controller.next_page().await);
    controller.set_sort("name").await;
    assert_eq!(controller.state().current_page, 1);
    assert_eq!(controller.filters().sort(), "name");

    let (_, args) = gateway.calls().pop().expect("gateway should be called");
    let window: PageWindow =
        serde_json::from_value(args[1].clone()).expect("window argument should decode");
    assert_eq!(window.offset, 0);
}

#[tokio::test]
async fn empty_sort_falls_back_to_default() {
    let gateway = FakeGateway::new(|_, _| Ok(item_array(&[])));
    let (controller, _view) = item_controller(10, gateway, |config| config);

    controller.set_sort("name").await;
    controller.set_sort("  ").await;

    assert_eq!(
        controller.filters().sort(),
        controller.descriptor().default_sort.key
    );
}

#[tokio::test]
async fn repeated_refresh_renders_identically() {
    let gateway = FakeGateway::new(|_, _| Ok(item_array(&[3, 1, 2])));
    let (controller, view) = item_controller(2, gateway, |config| config);

    controller.refresh().await;
    let first = view.snapshot();
    controller.refresh().await;

    assert_eq!(view.snapshot(), first);
}

#[tokio::test]
async fn reset_restores_initial_filters() {
    let gateway = FakeGateway::new(|_, _| Ok(item_array(&[1, 2, 3])));
    let (controller, _view) = item_controller(1, gateway, |config| {
        config.initial_filter("year", "2024".into())
    });
    let initial = controller.filters();

    controller.refresh().await;
    controller.set_filter("month", "3".into()).await;
    assert!(controller.next_page().await);

    controller.reset().await;

    assert_eq!(controller.filters(), initial);
    assert_eq!(controller.state().current_page, 1);
    assert_eq!(controller.filters().text("year"), "2024");
}

#[tokio::test(start_paused = true)]
async fn stale_response_is_discarded() {
    let gateway = FakeGateway::with_delays(
        |call, _| match call {
            0 => Ok(item_array(&[1])),
            _ => Ok(item_array(&[2])),
        },
        &[Duration::from_millis(200)],
    );
    let (controller, view) = item_controller(10, gateway, |config| config);

    let slow = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.refresh().await })
    };
    tokio::task::yield_now().await;
    controller.refresh().await;
    slow.await.expect("slow refresh should finish");

    let snapshot = view.snapshot();
    assert_eq!(card_keys(&snapshot), vec!["2"]);
    assert!(!snapshot.loading);
}

#[tokio::test(start_paused = true)]
async fn slow_gateway_times_out_when_configured() {
    let gateway = FakeGateway::with_delays(
        |_, _| Ok(item_array(&[1])),
        &[Duration::from_secs(5)],
    );
    let (controller, view) = item_controller(10, gateway, |config| {
        config.settings(ControllerSettings {
            request_timeout: Some(Duration::from_millis(50)),
            ..ControllerSettings::default()
        })
    });

    controller.refresh().await;
    let snapshot = view.snapshot();

    assert_eq!(snapshot.result_count, DEFAULT_FAILURE_MESSAGE);
    assert!(snapshot.items.is_empty());
    assert!(!snapshot.loading);
}

#[tokio::test]
async fn unknown_resource_never_calls_the_gateway() {
    let gateway = FakeGateway::new(|_, _| Ok(item_array(&[1])));
    let (publisher, _view) = ViewPublisher::new();
    let publisher = Arc::new(publisher);
    let controller = ResourceQueryController::<Item>::new(
        "nope",
        &SchemaRegistry::with_builtin_resources(),
        gateway.clone(),
        ControllerConfig::new(publisher.clone()),
    );

    controller.init().await;

    assert!(!controller.descriptor().is_configured());
    assert!(gateway.calls().is_empty());
    assert_eq!(publisher.snapshot(), ResourceView::default());
}

#[tokio::test(start_paused = true)]
async fn bound_events_drive_the_controller_once() {
    let gateway = FakeGateway::new(|_, _| Ok(item_array(&[1, 2, 3])));
    let (events, receiver) = mpsc::unbounded_channel();
    let bindings = FilterBindings::default()
        .with_select(FilterInput::Sort)
        .with_pagination();
    let (controller, view) = item_controller(1, gateway.clone(), |config| {
        config.bindings(bindings).events(receiver)
    });

    controller.init().await;
    assert!(!controller.bind_events(), "events bind only once");

    events
        .send(UiEvent::NextPage)
        .expect("controller should receive events");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(controller.state().current_page, 2);

    events
        .send(UiEvent::Select {
            input: FilterInput::Year,
            value: "2024".to_string(),
        })
        .expect("controller should receive events");
    events
        .send(UiEvent::Select {
            input: FilterInput::Sort,
            value: "name".to_string(),
        })
        .expect("controller should receive events");
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(controller.filters().text("year"), "", "unbound input is ignored");
    assert_eq!(controller.filters().sort(), "name");
    assert_eq!(controller.state().current_page, 1);
    assert_eq!(card_keys(&view.snapshot()), vec!["1"]);
}

#[tokio::test(start_paused = true)]
async fn next_page_waits_for_the_changed_result_set() {
    let gateway = FakeGateway::new(|_, _| Ok(item_array(&[1, 2, 3, 4, 5])));
    let (controller, view) = item_controller(2, gateway, |config| {
        config.client_filter(Arc::new(FirstItemForYear))
    });

    controller.refresh().await;
    assert!(view.snapshot().pagination.has_next);

    controller.dispatch(UiEvent::Select {
        input: FilterInput::Year,
        value: "2024".to_string(),
    });
    controller.dispatch(UiEvent::NextPage);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let snapshot = view.snapshot();
    assert_eq!(controller.state().current_page, 1);
    assert_eq!(card_keys(&snapshot), vec!["1"]);
    assert_eq!(snapshot.result_count, "total 1, showing 1-1 (page 1/1)");
}

#[tokio::test]
async fn reset_and_sort_also_forget_the_next_page() {
    let gateway = FakeGateway::new(|_, _| Ok(item_array(&[1, 2, 3])));
    let (controller, _view) = item_controller(1, gateway, |config| config);

    controller.refresh().await;
    assert!(controller.state().has_next_page);

    controller.dispatch(UiEvent::Reset);
    assert!(!controller.state().has_next_page);

    controller.refresh().await;
    controller.dispatch(UiEvent::Select {
        input: FilterInput::Sort,
        value: "name".to_string(),
    });
    assert!(!controller.state().has_next_page);
}

#[tokio::test]
async fn reload_after_shrink_moves_to_last_page() {
    let gateway = FakeGateway::new(|call, _| match call {
        0..=2 => Ok(item_array(&[1, 2, 3, 4, 5])),
        _ => Ok(item_array(&[1, 2, 3])),
    });
    let (controller, view) = item_controller(2, gateway.clone(), |config| config);

    controller.refresh().await;
    assert!(controller.next_page().await);
    assert!(controller.next_page().await);
    assert_eq!(controller.state().current_page, 3);

    controller.reload().await;
    let snapshot = view.snapshot();

    assert_eq!(controller.state().current_page, 2);
    assert_eq!(card_keys(&snapshot), vec!["3"]);
    assert_eq!(snapshot.result_count, "total 3, showing 3-3 (page 2/2)");
    assert!(!snapshot.loading);
    assert_eq!(gateway.calls().len(), 5, "one extra query for the last page");
}

#[tokio::test]
async fn emptied_envelope_falls_back_to_first_page() {
    let gateway = FakeGateway::new(|call, _| match call {
        0 | 1 => Ok(json!({ "items": item_array(&[1]), "total": 2 })),
        _ => Ok(json!({ "items": [], "total": 0 })),
    });
    let (controller, view) = item_controller(1, gateway, |config| config);

    controller.refresh().await;
    assert!(controller.next_page().await);
    controller.refresh().await;

    assert_eq!(controller.state().current_page, 1);
    assert_eq!(view.snapshot().result_count, "total 0, showing 0-0 (page 1/1)");
}

#[tokio::test]
async fn init_renders_page_when_options_and_overview_fail() {
    let gateway = FakeGateway::routed(|operation| match operation {
        LIST_ITEMS => Ok(item_array(&[1, 2])),
        _ => Err(GatewayError::Backend(format!("{operation} unavailable"))),
    });
    let (controller, view) =
        controller_for(item_descriptor_with_extras(), gateway.clone(), |config| config);

    controller.init().await;
    let snapshot = view.snapshot();

    assert_eq!(gateway.operations(), vec![ITEM_OPTIONS, ITEM_OVERVIEW, LIST_ITEMS]);
    assert_eq!(card_keys(&snapshot), vec!["1", "2"]);
    assert_eq!(snapshot.result_count, "total 2, showing 1-2 (page 1/1)");
    assert!(snapshot.filter_options.years.is_empty());
    assert!(snapshot.overview.is_empty());
}

#[tokio::test]
async fn init_publishes_options_even_when_overview_fails() {
    let gateway = FakeGateway::routed(|operation| match operation {
        ITEM_OPTIONS => Ok(json!({ "years": [2024, 2023], "months": [] })),
        ITEM_OVERVIEW => Err(GatewayError::Timeout(Duration::from_secs(1))),
        _ => Ok(item_array(&[7])),
    });
    let (controller, view) =
        controller_for(item_descriptor_with_extras(), gateway, |config| config);

    controller.init().await;
    let snapshot = view.snapshot();

    assert_eq!(snapshot.filter_options.years, vec!["2024", "2023"]);
    assert!(snapshot.overview.is_empty());
    assert_eq!(card_keys(&snapshot), vec!["7"]);
}

#[tokio::test]
async fn init_publishes_overview_even_when_options_fail() {
    let gateway = FakeGateway::routed(|operation| match operation {
        ITEM_OPTIONS => Err(GatewayError::Backend("no options".to_string())),
        ITEM_OVERVIEW => Ok(json!({ "totalRecords": 3 })),
        _ => Ok(item_array(&[7])),
    });
    let (controller, view) =
        controller_for(item_descriptor_with_extras(), gateway, |config| config);

    controller.init().await;
    let snapshot = view.snapshot();

    assert!(snapshot.filter_options.years.is_empty());
    assert_eq!(snapshot.overview.len(), 1);
    assert_eq!(snapshot.overview[0].key, "totalRecords");
    assert_eq!(card_keys(&snapshot), vec!["7"]);
}

fn family_service_sheet(rows: &[(&str, i64, i64, i64)]) -> Vec<Vec<Data>> {
    let mut sheet = vec![
        vec![Data::String("家庭服务统计".to_string())],
        vec![
            Data::String("序号".to_string()),
            Data::String("年月".to_string()),
            Data::String("家庭数量".to_string()),
        ],
    ];
    for (idx, (year_month, families, days, services)) in rows.iter().enumerate() {
        sheet.push(vec![
            Data::Int(idx as i64 + 1),
            Data::String(year_month.to_string()),
            Data::Int(*families),
            Data::Int(families * 2),
            Data::Int(*days),
            Data::Int(0),
            Data::Int(0),
            Data::Int(0),
            Data::Int(*services),
            Data::String(format!("{year_month} 备注")),
            Data::Int(0),
            Data::Int(0),
        ]);
    }
    sheet
}

fn seed_family_services(db_path: &Path) {
    let sheet = family_service_sheet(&[
        ("2023-11", 4, 40, 20),
        ("2024-01", 10, 50, 90),
        ("2024-02", 5, 20, 30),
        ("2024-03", 8, 0, 60),
    ]);
    let report = import_family_service_rows(db_path, &sheet).expect("seed import should succeed");
    assert_eq!(report.success_count, 4);
}

fn patient(name: &str, id_card: Option<&str>, check_in: Option<&str>) -> NewPatientRecord {
    NewPatientRecord {
        name: name.to_string(),
        id_card: id_card.map(str::to_string),
        gender: Some("男".to_string()),
        birth_date: Some("2018-03-02".to_string()),
        hometown: Some("贵州".to_string()),
        check_in_date: check_in.map(str::to_string),
        diagnosis: Some("神经母细胞瘤".to_string()),
        ..NewPatientRecord::default()
    }
}

#[test]
fn init_db_creates_required_tables() {
    let temp_dir = unique_test_dir("init-db");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let db_path = temp_dir.join("app.sqlite");

    let result = init_db(&db_path);

    assert!(result.is_ok(), "init_db should succeed: {result:?}");

    let conn = Connection::open(&db_path).expect("should open sqlite db");
    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
             ('persons','patient_profiles','medical_info','check_in_records','family_info',
              'family_service_records')",
            [],
            |row| row.get(0),
        )
        .expect("table count query should succeed");

    assert_eq!(table_count, 6, "required tables should exist");
    assert!(init_db(&db_path).is_ok(), "init_db should be idempotent");

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn patients_are_deduplicated_and_summarized() {
    let temp_dir = unique_test_dir("patients");
    let db_path = temp_dir.join("app.sqlite");

    let first = insert_patient_record(&db_path, &patient("张三", None, Some("2024-01-05")))
        .expect("first insert should succeed");
    let second = insert_patient_record(&db_path, &patient("张三", None, Some("2024-03-09")))
        .expect("second insert should succeed");
    let other = insert_patient_record(
        &db_path,
        &patient("张三", Some("520101201803020011"), Some("2023-12-01")),
    )
    .expect("id card insert should succeed");

    assert_eq!(first, second, "same name without id card is one person");
    assert_ne!(first, other, "an id card distinguishes namesakes");

    let patients = list_patients(&db_path).expect("patients should list");
    assert_eq!(patients.len(), 2);
    let repeat = patients
        .iter()
        .find(|patient| patient.person_id == first)
        .expect("first patient should be listed");
    assert_eq!(repeat.check_in_count, 2);
    assert_eq!(repeat.latest_check_in.as_deref(), Some("2024-03-09"));
    assert_eq!(repeat.diagnosis.as_deref(), Some("神经母细胞瘤"));

    let stats = patient_statistics(&db_path).expect("statistics should load");
    assert_eq!(stats, json!({ "totalPatients": 2, "totalRecords": 3 }));

    let check_ins = list_check_ins(&db_path).expect("check-ins should list");
    assert_eq!(check_ins.len(), 3);
    assert_eq!(check_ins[0].checkin_date.as_deref(), Some("2024-03-09"));

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn family_service_import_skips_duplicates_and_bad_rows() {
    let temp_dir = unique_test_dir("family-import");
    let db_path = temp_dir.join("app.sqlite");
    seed_family_services(&db_path);

    let mut sheet = family_service_sheet(&[("2024-01", 1, 1, 1), ("2024-04", 6, 30, 40)]);
    sheet.push(vec![Data::Int(9), Data::String("合计".to_string())]);
    sheet.push(vec![Data::Empty, Data::Empty]);

    let report = import_family_service_rows(&db_path, &sheet).expect("import should succeed");

    assert_eq!(report.total_rows, 3, "blank rows are not counted");
    assert_eq!(report.success_count, 1);
    assert_eq!(report.duplicate_count, 1);
    assert_eq!(report.error_count, 1);
    assert!(report.errors[0].starts_with("row 5:"), "{:?}", report.errors);

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn family_service_query_filters_sorts_and_pages() {
    let temp_dir = unique_test_dir("family-query");
    let db_path = temp_dir.join("app.sqlite");
    seed_family_services(&db_path);

    let mut filters = Filters::new("date-desc");
    filters.set("year", "2024".into());
    let (page, total) = query_family_services(&db_path, &filters, PageWindow::for_page(1, 2))
        .expect("query should succeed");

    assert_eq!(total, 3);
    let months: Vec<&str> = page.iter().map(|r| r.year_month.as_str()).collect();
    assert_eq!(months, vec!["2024-03-01", "2024-02-01"]);
    assert_eq!(page[0].avg_days_per_family, 0.0);

    filters.set("sort", "services-desc".into());
    filters.set("month", "1".into());
    let (page, total) = query_family_services(&db_path, &filters, PageWindow::for_page(1, 10))
        .expect("query should succeed");
    assert_eq!(total, 1);
    assert_eq!(page[0].avg_days_per_family, 5.0);

    let mut filters = Filters::new("families-asc");
    filters.set("year", "全部".into());
    filters.set(
        "familyCountRange",
        FilterValue::NumberRange {
            min: Some(5.0),
            max: None,
        },
    );
    let (page, total) = query_family_services(&db_path, &filters, PageWindow::for_page(1, 10))
        .expect("query should succeed");
    assert_eq!(total, 3);
    assert_eq!(page[0].family_count, 5);

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn family_service_overview_and_options_summarize_months() {
    let temp_dir = unique_test_dir("family-overview");
    let db_path = temp_dir.join("app.sqlite");
    seed_family_services(&db_path);

    let overview = family_service_overview(&db_path, 2024).expect("overview should load");

    assert_eq!(overview["overall"]["totalRecords"], json!(4));
    assert_eq!(overview["overall"]["totalFamilies"], json!(27));
    assert_eq!(overview["overall"]["firstRecordDate"], json!("2023-11-01"));
    assert_eq!(overview["currentYear"]["recordsThisYear"], json!(3));

    let options = family_service_filter_options(&db_path).expect("options should load");
    assert_eq!(options["years"], json!(["2024", "2023"]));
    assert_eq!(options["months"].as_array().map(Vec::len), Some(12));
    assert_eq!(options["serviceRange"]["maxServices"], json!(90));

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[tokio::test]
async fn sqlite_gateway_answers_registry_operations() {
    let temp_dir = unique_test_dir("gateway");
    let db_path = temp_dir.join("app.sqlite");
    seed_family_services(&db_path);
    insert_patient_record(&db_path, &patient("李四", None, Some("2024-02-01")))
        .expect("patient insert should succeed");
    let gateway = SqliteGateway::new(db_path.clone());

    let patients = gateway
        .invoke(GET_PATIENTS, Vec::new())
        .await
        .expect("patients should load");
    assert_eq!(patients.as_array().map(Vec::len), Some(1));

    let filters = Filters::new("date-asc");
    let page = gateway
        .invoke(
            GET_FAMILY_SERVICES,
            vec![
                serde_json::to_value(&filters).expect("filters should serialize"),
                serde_json::to_value(PageWindow::for_page(2, 3)).expect("window should serialize"),
            ],
        )
        .await
        .expect("family services should load");
    assert_eq!(page["total"], json!(4));
    let items: Vec<FamilyServiceRecord> =
        serde_json::from_value(page["items"].clone()).expect("items should decode");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].year_month, "2024-03-01");

    let options = gateway
        .invoke(GET_FAMILY_SERVICE_FILTER_OPTIONS, Vec::new())
        .await
        .expect("filter options should load");
    assert!(options["years"].is_array());

    let bad_args = gateway
        .invoke(GET_FAMILY_SERVICES, vec![json!("not filters")])
        .await;
    assert!(matches!(bad_args, Err(GatewayError::InvalidArguments { .. })));

    let unknown = gateway.invoke("patients:delete", Vec::new()).await;
    assert!(matches!(unknown, Err(GatewayError::UnknownOperation(op)) if op == "patients:delete"));

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[tokio::test]
async fn family_service_controller_pages_through_sqlite() {
    let temp_dir = unique_test_dir("family-controller");
    let db_path = temp_dir.join("app.sqlite");
    seed_family_services(&db_path);

    let (publisher, _view) = ViewPublisher::new();
    let publisher = Arc::new(publisher);
    let controller = ResourceQueryController::<FamilyServiceRecord>::new(
        "familyServices",
        &SchemaRegistry::with_builtin_resources(),
        Arc::new(SqliteGateway::new(db_path.clone())),
        ControllerConfig::new(publisher.clone()).page_size(3),
    );

    controller.init().await;
    let snapshot = publisher.snapshot();

    assert_eq!(snapshot.items.len(), 3);
    assert_eq!(snapshot.result_count, "total 4, showing 1-3 (page 1/2)");
    assert_eq!(snapshot.filter_options.years, vec!["2024", "2023"]);
    assert_eq!(snapshot.filter_options.months.len(), 12);
    assert!(snapshot
        .overview
        .iter()
        .any(|metric| metric.key == "totalFamilies" && metric.value == "27"));

    controller.set_filter("year", "2023".into()).await;
    assert_eq!(
        publisher.snapshot().result_count,
        "total 1, showing 1-1 (page 1/1)"
    );

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn export_writes_filtered_family_services_to_csv() {
    let temp_dir = unique_test_dir("family-export");
    let db_path = temp_dir.join("app.sqlite");
    seed_family_services(&db_path);
    let csv_path = temp_dir.join("export.csv");
    let service = ExportService::new(db_path.clone());

    let mut filters = Filters::new("date-asc");
    filters.set("year", "2024".into());
    let written = service
        .export_family_services_csv(&filters, &csv_path)
        .expect("export should succeed");

    assert_eq!(written, 3);
    let mut reader = csv::Reader::from_path(&csv_path).expect("export should be readable");
    let headers = reader.headers().expect("export should have headers").clone();
    assert_eq!(headers.get(0), Some("序号"));
    let rows: Vec<csv::StringRecord> = reader
        .records()
        .collect::<Result<_, _>>()
        .expect("rows should parse");
    assert_eq!(rows.len(), 3);

    filters.set("year", "1999".into());
    let empty = service.export_family_services_csv(&filters, &temp_dir.join("empty.csv"));
    assert!(empty.is_err(), "nothing to export is an error");

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn patient_csv_import_reports_rows_without_names() {
    let temp_dir = unique_test_dir("patient-import");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let db_path = temp_dir.join("app.sqlite");
    let csv_path = temp_dir.join("patients.csv");
    fs::write(
        &csv_path,
        "患儿姓名,性别,出生日期,籍贯,入住时间,医院诊断\n\
         王小明,男,2017-05-01,云南,2024-01-10,白血病\n\
         ,女,2019-01-01,四川,2024-02-01,\n\
         王小明,男,2017-05-01,云南,2024-04-02,白血病\n",
    )
    .expect("should write csv");

    let report = ImportService::new(db_path.clone())
        .import_patients_csv(&csv_path)
        .expect("import should succeed");

    assert_eq!(report.total_rows, 3);
    assert_eq!(report.success_count, 2);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.errors, vec!["row 3: missing name".to_string()]);

    let patients = list_patients(&db_path).expect("patients should list");
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0].check_in_count, 2);
    assert_eq!(patients[0].hometown.as_deref(), Some("云南"));

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn patient_csv_without_name_column_is_rejected() {
    let temp_dir = unique_test_dir("patient-import-header");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let csv_path = temp_dir.join("patients.csv");
    fs::write(&csv_path, "性别,籍贯\n男,云南\n").expect("should write csv");

    let result = ImportService::new(temp_dir.join("app.sqlite")).import_patients_csv(&csv_path);

    assert!(result.is_err());
    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

fn text(value: &str) -> Data {
    Data::String(value.to_string())
}

fn patient_roster(rows: Vec<Vec<Data>>) -> Vec<Vec<Data>> {
    let mut sheet = vec![
        vec![
            text("序号"),
            text("姓名"),
            text("性别"),
            text("出生日期"),
            text("入住时间"),
            text("家庭地址"),
            text("父亲"),
            text("诊断"),
        ],
        vec![
            Data::Empty,
            Data::Empty,
            Data::Empty,
            Data::Empty,
            Data::Empty,
            Data::Empty,
            text("信息"),
        ],
    ];
    sheet.extend(rows);
    sheet
}

#[test]
fn patient_roster_rows_import_with_family_and_serial_dates() {
    let temp_dir = unique_test_dir("patient-roster");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let db_path = temp_dir.join("app.sqlite");
    let sheet = patient_roster(vec![
        vec![
            Data::Int(1),
            text("李小雨"),
            text("女"),
            Data::Float(43101.0),
            text("2024.2.3"),
            text("昆明市五华区"),
            text("李大海 13900002222"),
            text("白血病"),
        ],
        vec![Data::Int(2), Data::Empty, text("男")],
        vec![Data::Empty, Data::Empty],
        vec![
            Data::Int(3),
            text("李小雨"),
            text("女"),
            Data::Float(43101.0),
            Data::Float(45383.0),
            text("昆明市五华区"),
            text("李大海 13900002222"),
            text("白血病"),
        ],
    ]);

    let report = import_patient_rows(&db_path, &sheet).expect("roster import should succeed");

    assert_eq!(report.total_rows, 3);
    assert_eq!(report.success_count, 2);
    assert_eq!(report.errors, vec!["row 4: missing name".to_string()]);

    let patients = list_patients(&db_path).expect("patients should list");
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0].check_in_count, 2);
    assert_eq!(patients[0].birth_date.as_deref(), Some("2018-01-01"));

    let detail = patient_detail(&db_path, patients[0].person_id)
        .expect("detail query should succeed")
        .expect("patient should exist");
    let dates: Vec<_> = detail
        .check_ins
        .iter()
        .map(|check_in| check_in.checkin_date.clone().unwrap_or_default())
        .collect();
    assert_eq!(dates, vec!["2024-04-01", "2024-02-03"]);
    let family = detail.family.expect("family info should be stored");
    assert_eq!(family.home_address.as_deref(), Some("昆明市五华区"));
    assert_eq!(family.father_name.as_deref(), Some("李大海"));
    assert_eq!(family.father_phone.as_deref(), Some("13900002222"));
    assert_eq!(detail.medical_info.len(), 2);
    assert_eq!(detail.medical_info[0].record_date.as_deref(), Some("2024-04-01"));

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn patient_roster_needs_headers_and_data() {
    let temp_dir = unique_test_dir("patient-roster-short");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let db_path = temp_dir.join("app.sqlite");

    assert!(import_patient_rows(&db_path, &patient_roster(Vec::new())).is_err());
    let unnamed = vec![vec![text("性别")], vec![Data::Empty], vec![text("男")]];
    assert!(import_patient_rows(&db_path, &unnamed).is_err());

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn patient_import_picks_reader_by_extension() {
    let temp_dir = unique_test_dir("patient-import-ext");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let service = ImportService::new(temp_dir.join("app.sqlite"));
    let csv_path = temp_dir.join("roster.CSV");
    fs::write(&csv_path, "姓名,性别\n赵小安,男\n").expect("should write csv");
    let fake_workbook = temp_dir.join("roster.xlsx");
    fs::write(&fake_workbook, "姓名,性别\n").expect("should write file");

    let report = service
        .import_patients(&csv_path)
        .expect("csv roster should import");
    assert_eq!(report.success_count, 1);
    assert!(
        service.import_patients(&fake_workbook).is_err(),
        "xlsx extension goes through the workbook reader"
    );

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[tokio::test]
async fn patient_detail_is_served_by_the_gateway() {
    let temp_dir = unique_test_dir("patient-detail");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let db_path = temp_dir.join("app.sqlite");
    let mut record = patient("陈小北", Some("530102201801010011"), Some("2024-01-05"));
    record.family.mother_name = Some("刘芳".to_string());
    let person_id = insert_patient_record(&db_path, &record).expect("first insert should succeed");
    insert_patient_record(&db_path, &patient("陈小北", Some("530102201801010011"), Some("2024-03-01")))
        .expect("second insert should succeed");
    let other = insert_patient_record(&db_path, &patient("孙小东", None, None))
        .expect("other insert should succeed");
    let gateway = SqliteGateway::new(db_path.clone());

    let value = gateway
        .invoke(GET_PATIENT_DETAIL, vec![json!(person_id)])
        .await
        .expect("detail call should succeed");
    assert_eq!(value["profile"]["name"], json!("陈小北"));
    assert_eq!(value["profile"]["id_card"], json!("530102201801010011"));
    assert_eq!(value["family"]["mother_name"], json!("刘芳"));
    assert_eq!(value["check_ins"][0]["checkin_date"], json!("2024-03-01"));
    assert_eq!(value["check_ins"].as_array().map(Vec::len), Some(2));

    let detail = load_patient_detail(&gateway, other)
        .await
        .expect("detail should load")
        .expect("patient should exist");
    assert!(detail.check_ins.is_empty());
    assert_eq!(detail.family, None);

    let missing = load_patient_detail(&gateway, 9_999)
        .await
        .expect("unknown person is not an error");
    assert_eq!(missing, None);

    let err = gateway
        .invoke(GET_PATIENT_DETAIL, Vec::new())
        .await
        .expect_err("person id is required");
    assert!(matches!(err, GatewayError::InvalidArguments { .. }));

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}
