use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use crate::domain::entities::query::Filters;
use crate::domain::entities::records::{
    CheckInRecord, FamilyServiceRecord, PatientDetail, PatientSummary,
};
use crate::domain::entities::resource::{ResourceDescriptor, ResourceKey};
use crate::domain::schema::registry::{SchemaRegistry, GET_PATIENT_DETAIL};
use crate::usecase::ports::gateway::{Gateway, GatewayError};
use crate::usecase::ports::view::{ResourceView, ViewPublisher};
use crate::usecase::services::query_controller::{
    ControllerConfig, ControllerSettings, FilterBindings, FilterInput, ResourceQueryController,
    UiEvent,
};
use crate::usecase::services::resource_hooks::{
    CheckInSort, PatientFilter, PatientSort, SchemaFilter,
};
use crate::ui::renderers::{FamilyServiceCardRenderer, PatientCardRenderer};

/// Type-erased controller operations a panel needs besides the event channel.
#[async_trait]
pub trait QueryPanel: Send + Sync {
    fn filters(&self) -> Filters;
    async fn reload(&self);
}

#[async_trait]
impl<T> QueryPanel for ResourceQueryController<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn filters(&self) -> Filters {
        ResourceQueryController::filters(self)
    }

    async fn reload(&self) {
        ResourceQueryController::reload(self).await
    }
}

#[derive(Clone)]
pub struct PanelHandle {
    pub descriptor: ResourceDescriptor,
    pub bindings: FilterBindings,
    pub events: mpsc::UnboundedSender<UiEvent>,
    pub view: watch::Receiver<ResourceView>,
    pub controller: Arc<dyn QueryPanel>,
}

impl PanelHandle {
    /// Drops the event when the controller task is gone.
    pub fn send(&self, event: UiEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!(resource = %self.descriptor.key, "panel event channel closed");
        }
    }
}

#[derive(Clone)]
pub struct Panels {
    pub patients: PanelHandle,
    pub family_services: PanelHandle,
    pub check_ins: PanelHandle,
}

impl Panels {
    pub fn get(&self, key: ResourceKey) -> &PanelHandle {
        match key {
            ResourceKey::Patients => &self.patients,
            ResourceKey::FamilyServices => &self.family_services,
            ResourceKey::CheckIns => &self.check_ins,
        }
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub runtime: Handle,
    pub db_path: PathBuf,
    pub gateway: Arc<dyn Gateway>,
    pub panels: Panels,
}

/// Full record of one patient; `None` when the person no longer exists.
pub async fn load_patient_detail(
    gateway: &dyn Gateway,
    person_id: i64,
) -> Result<Option<PatientDetail>, GatewayError> {
    let value = gateway
        .invoke(GET_PATIENT_DETAIL, vec![serde_json::json!(person_id)])
        .await?;
    Ok(serde_json::from_value(value)?)
}

static APP_CONTEXT: OnceLock<AppContext> = OnceLock::new();

pub fn install_app_context(context: AppContext) -> anyhow::Result<()> {
    APP_CONTEXT
        .set(context)
        .map_err(|_| anyhow::anyhow!("app context already initialized"))
}

pub fn app_context() -> Option<AppContext> {
    APP_CONTEXT.get().cloned()
}

pub fn bindings_for(key: ResourceKey) -> FilterBindings {
    let bindings = FilterBindings::default()
        .with_search()
        .with_select(FilterInput::Sort)
        .with_pagination();
    match key {
        ResourceKey::Patients => bindings
            .with_select(FilterInput::Gender)
            .with_select(FilterInput::Age),
        ResourceKey::FamilyServices => bindings
            .with_select(FilterInput::Year)
            .with_select(FilterInput::Month),
        ResourceKey::CheckIns => bindings,
    }
}

/// Wires a controller to a fresh view publisher and event channel and starts it on `runtime`.
fn start_panel<T>(
    runtime: &Handle,
    key: ResourceKey,
    registry: &SchemaRegistry,
    gateway: Arc<dyn Gateway>,
    configure: impl FnOnce(ControllerConfig<T>) -> ControllerConfig<T>,
) -> PanelHandle
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let (publisher, view) = ViewPublisher::new();
    let (events, receiver) = mpsc::unbounded_channel();
    let bindings = bindings_for(key);
    let config = configure(
        ControllerConfig::new(Arc::new(publisher))
            .bindings(bindings.clone())
            .events(receiver),
    );
    let controller = ResourceQueryController::new(key.as_str(), registry, gateway, config);

    let starter = controller.clone();
    runtime.spawn(async move { starter.init().await });

    PanelHandle {
        descriptor: controller.descriptor().clone(),
        bindings,
        events,
        view,
        controller: Arc::new(controller),
    }
}

pub fn start_panels(
    runtime: &Handle,
    registry: &SchemaRegistry,
    gateway: Arc<dyn Gateway>,
    settings: &ControllerSettings,
    page_size: usize,
) -> Panels {
    let patients = start_panel::<PatientSummary>(
        runtime,
        ResourceKey::Patients,
        registry,
        gateway.clone(),
        |config| {
            config
                .page_size(page_size)
                .settings(settings.clone())
                .render_item(Arc::new(PatientCardRenderer::new()))
                .client_filter(Arc::new(PatientFilter::new()))
                .client_sort(Arc::new(PatientSort::new()))
        },
    );

    let family_services = start_panel::<FamilyServiceRecord>(
        runtime,
        ResourceKey::FamilyServices,
        registry,
        gateway.clone(),
        |config| {
            config
                .page_size(page_size)
                .settings(settings.clone())
                .render_item(Arc::new(FamilyServiceCardRenderer))
        },
    );

    let check_in_schema = registry.resolve(ResourceKey::CheckIns.as_str()).filter_schema;
    let check_ins = start_panel::<CheckInRecord>(
        runtime,
        ResourceKey::CheckIns,
        registry,
        gateway,
        |config| {
            config
                .page_size(page_size)
                .settings(settings.clone())
                .client_filter(Arc::new(SchemaFilter::new(check_in_schema)))
                .client_sort(Arc::new(CheckInSort))
        },
    );

    Panels {
        patients,
        family_services,
        check_ins,
    }
}
