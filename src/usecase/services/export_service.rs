use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use crate::domain::entities::query::Filters;
use crate::infra::export::csv::write_family_service_csv;
use crate::infra::sqlite::queries::list_family_services;

pub struct ExportService {
    db_path: PathBuf,
}

impl ExportService {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    /// Exports every family-service month matching `filters`, ignoring pagination.
    pub fn export_family_services_csv(&self, filters: &Filters, path: &Path) -> Result<usize> {
        let records = list_family_services(&self.db_path, filters)?;
        let written = write_family_service_csv(path, &records)?;
        info!(rows = written, path = %path.display(), "family service export finished");
        Ok(written)
    }
}
