use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::entities::records::ImportReport;
use crate::infra::import::roster::PatientColumns;
use crate::infra::sqlite::queries::insert_patient_record;
use crate::infra::sqlite::schema::init_db;

/// Imports a patient roster exported as csv; rows without a name are reported and skipped.
pub fn import_patients_csv(db_path: &Path, csv_path: &Path) -> Result<ImportReport> {
    init_db(db_path)?;

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open csv: {}", csv_path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("failed to read headers from csv: {}", csv_path.display()))?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();
    let columns = PatientColumns::from_headers(&headers)?;

    let mut report = ImportReport::default();
    for (idx, row) in reader.records().enumerate() {
        let row = row.context("failed to parse csv record")?;
        let cells: Vec<String> = row.iter().map(str::to_string).collect();
        report.total_rows += 1;
        let record = columns.record(&cells);
        if record.name.is_empty() {
            report.error_count += 1;
            report.errors.push(format!("row {}: missing name", idx + 2));
            continue;
        }
        insert_patient_record(db_path, &record)?;
        report.success_count += 1;
    }

    info!(
        total = report.total_rows,
        imported = report.success_count,
        "patient csv import finished"
    );
    Ok(report)
}
