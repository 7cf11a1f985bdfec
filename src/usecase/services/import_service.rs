use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::domain::entities::records::ImportReport;
use crate::infra::import::csv::import_patients_csv;
use crate::infra::import::xlsx::{import_family_service_xlsx, import_patients_xlsx};

pub struct ImportService {
    db_path: PathBuf,
}

impl ImportService {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    pub fn import_patients_csv(&self, path: &Path) -> Result<ImportReport> {
        import_patients_csv(&self.db_path, path)
    }

    pub fn import_patients_xlsx(&self, path: &Path) -> Result<ImportReport> {
        import_patients_xlsx(&self.db_path, path)
    }

    /// Patient roster by file extension: `.csv` as csv, anything else as a workbook.
    pub fn import_patients(&self, path: &Path) -> Result<ImportReport> {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            self.import_patients_csv(path)
        } else {
            self.import_patients_xlsx(path)
        }
    }

    pub fn import_family_services_xlsx(&self, path: &Path) -> Result<ImportReport> {
        import_family_service_xlsx(&self.db_path, path)
    }
}
