use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{Datelike, Local};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::entities::query::{Filters, PageWindow};
use crate::domain::schema::registry::{
    GET_CHECK_INS, GET_EXTENDED_STATISTICS, GET_FAMILY_SERVICES, GET_FAMILY_SERVICE_FILTER_OPTIONS,
    GET_FAMILY_SERVICE_OVERVIEW, GET_PATIENTS, GET_PATIENT_DETAIL,
};
use crate::infra::sqlite::queries::{
    family_service_filter_options, family_service_overview, list_check_ins, list_family_services,
    list_patients, patient_detail, patient_statistics, query_family_services,
};
use crate::platform::desktop::blocking::run_blocking;
use crate::usecase::ports::gateway::{Gateway, GatewayError};

const DEFAULT_FAMILY_SERVICE_SORT: &str = "date-desc";

/// Answers every operation the builtin registry names from the local sqlite store.
#[derive(Debug, Clone)]
pub struct SqliteGateway {
    db_path: PathBuf,
}

impl SqliteGateway {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }
}

/// Positional argument `index`; `None` when the caller left it out.
fn arg<T: DeserializeOwned>(
    operation: &str,
    args: &[Value],
    index: usize,
) -> Result<Option<T>, GatewayError> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|err| GatewayError::InvalidArguments {
                operation: operation.to_string(),
                message: format!("argument {index}: {err}"),
            }),
    }
}

#[async_trait]
impl Gateway for SqliteGateway {
    async fn invoke(&self, operation: &str, args: Vec<Value>) -> Result<Value, GatewayError> {
        debug!(operation, args = args.len(), "sqlite gateway call");
        let db_path = self.db_path.clone();
        match operation {
            GET_PATIENTS => {
                let patients = run_blocking(move || list_patients(&db_path)).await?;
                Ok(serde_json::to_value(patients)?)
            }
            GET_EXTENDED_STATISTICS => run_blocking(move || patient_statistics(&db_path)).await,
            GET_PATIENT_DETAIL => {
                let person_id = arg::<i64>(operation, &args, 0)?.ok_or_else(|| {
                    GatewayError::InvalidArguments {
                        operation: operation.to_string(),
                        message: "argument 0: person id is required".to_string(),
                    }
                })?;
                let detail = run_blocking(move || patient_detail(&db_path, person_id)).await?;
                Ok(serde_json::to_value(detail)?)
            }
            GET_CHECK_INS => {
                let records = run_blocking(move || list_check_ins(&db_path)).await?;
                Ok(serde_json::to_value(records)?)
            }
            GET_FAMILY_SERVICES => {
                let filters = arg::<Filters>(operation, &args, 0)?
                    .unwrap_or_else(|| Filters::new(DEFAULT_FAMILY_SERVICE_SORT));
                let window = arg::<PageWindow>(operation, &args, 1)?;
                let (items, total) = run_blocking(move || match window {
                    Some(window) => query_family_services(&db_path, &filters, window),
                    None => list_family_services(&db_path, &filters).map(|items| {
                        let total = items.len() as u64;
                        (items, total)
                    }),
                })
                .await?;
                Ok(json!({ "items": items, "total": total }))
            }
            GET_FAMILY_SERVICE_OVERVIEW => {
                let year = Local::now().year();
                run_blocking(move || family_service_overview(&db_path, year)).await
            }
            GET_FAMILY_SERVICE_FILTER_OPTIONS => {
                run_blocking(move || family_service_filter_options(&db_path)).await
            }
            other => Err(GatewayError::UnknownOperation(other.to_string())),
        }
    }
}
