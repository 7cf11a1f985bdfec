use std::path::Path;

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Datelike, Duration, NaiveDate};
use tracing::{info, warn};

use crate::domain::entities::records::{ImportReport, NewFamilyServiceRecord};
use crate::domain::schema::formatters::parse_date;
use crate::infra::import::roster::PatientColumns;
use crate::infra::sqlite::queries::{
    family_service_month_exists, insert_family_service_record, insert_patient_record,
};
use crate::infra::sqlite::schema::{init_db, open_connection};

pub const FAMILY_SERVICE_SHEET: &str = "家庭服务";
/// Title row and header row precede the data.
const FAMILY_SERVICE_DATA_START: usize = 2;
/// Patient rosters carry a grouped header: a top row and a sub-header row.
const PATIENT_HEADER_ROWS: usize = 2;

pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(v) => v.trim().to_string(),
        Data::Float(v) if v.fract() == 0.0 => format!("{v:.0}"),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        Data::DateTime(v) => v.to_string(),
        Data::DateTimeIso(v) => v.to_string(),
        Data::DurationIso(v) => v.to_string(),
        Data::Error(v) => format!("{v:?}"),
        Data::Empty => String::new(),
    }
}

fn is_blank_row(row: &[Data]) -> bool {
    row.iter().all(|cell| cell_to_string(cell).is_empty())
}

/// Excel serial day number (1900 date system) to a calendar date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    // Day 0 is 1899-12-30 once the phantom 1900-02-29 is accounted for.
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let days = if serial < 60.0 { serial + 1.0 } else { serial };
    epoch.checked_add_signed(Duration::days(days.trunc() as i64))
}

fn parse_chinese_year_month(text: &str) -> Option<NaiveDate> {
    let (year, rest) = text.split_once('年')?;
    let month = rest.trim_end_matches('月');
    NaiveDate::from_ymd_opt(year.trim().parse().ok()?, month.trim().parse().ok()?, 1)
}

/// First day of the month a year-month cell refers to, as `YYYY-MM-DD`.
pub fn parse_year_month_cell(cell: &Data) -> Option<String> {
    let date = match cell {
        Data::Float(serial) => excel_serial_to_date(*serial),
        Data::Int(serial) => excel_serial_to_date(*serial as f64),
        Data::DateTime(value) => excel_serial_to_date(value.as_f64()),
        Data::String(text) | Data::DateTimeIso(text) => {
            let text = text.trim();
            parse_date(text).or_else(|| parse_chinese_year_month(text))
        }
        _ => None,
    }?;
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .map(|first| first.format("%Y-%m-%d").to_string())
}

/// Lenient counter: non-numeric characters are stripped, blanks become 0, negatives clamp to 0.
pub fn parse_count(cell: Option<&Data>) -> f64 {
    let number = match cell {
        Some(Data::Float(v)) => *v,
        Some(Data::Int(v)) => *v as f64,
        Some(Data::String(text)) => {
            let digits: String = text
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            digits.parse().unwrap_or(0.0)
        }
        _ => 0.0,
    };
    if number.is_finite() {
        number.max(0.0)
    } else {
        0.0
    }
}

/// Maps one data row to a record. `ordinal` is the 1-based data row index used
/// when the sequence cell is empty.
pub fn parse_family_service_row(
    row: &[Data],
    ordinal: usize,
) -> std::result::Result<NewFamilyServiceRecord, String> {
    let cell = |idx: usize| row.get(idx);
    let year_month_cell = cell(1).unwrap_or(&Data::Empty);
    let Some(year_month) = parse_year_month_cell(year_month_cell) else {
        return Err(format!(
            "invalid year-month value: {}",
            cell_to_string(year_month_cell)
        ));
    };

    let sequence_number = cell(0).map(cell_to_string).unwrap_or_default();
    Ok(NewFamilyServiceRecord {
        sequence_number: if sequence_number.is_empty() {
            ordinal.to_string()
        } else {
            sequence_number
        },
        year_month,
        family_count: parse_count(cell(2)),
        residents_count: parse_count(cell(3)),
        residence_days: parse_count(cell(4)),
        accommodation_count: parse_count(cell(5)),
        care_service_count: parse_count(cell(6)),
        volunteer_service_count: parse_count(cell(7)),
        total_service_count: parse_count(cell(8)),
        notes: cell(9).map(cell_to_string).unwrap_or_default(),
        cumulative_residence_days: parse_count(cell(10)),
        cumulative_service_count: parse_count(cell(11)),
    })
}

/// Imports already-read sheet rows (title and header rows included) in one transaction.
pub fn import_family_service_rows(db_path: &Path, rows: &[Vec<Data>]) -> Result<ImportReport> {
    init_db(db_path)?;
    let mut conn = open_connection(db_path)?;
    let tx = conn
        .transaction()
        .context("failed to start family service import transaction")?;

    let mut report = ImportReport::default();
    for (idx, row) in rows.iter().enumerate().skip(FAMILY_SERVICE_DATA_START) {
        if is_blank_row(row) {
            continue;
        }
        report.total_rows += 1;
        let sheet_row = idx + 1;

        let record = match parse_family_service_row(row, idx + 1 - FAMILY_SERVICE_DATA_START) {
            Ok(record) => record,
            Err(message) => {
                report.error_count += 1;
                report.errors.push(format!("row {sheet_row}: {message}"));
                continue;
            }
        };

        if family_service_month_exists(&tx, &record.year_month)? {
            report.duplicate_count += 1;
            continue;
        }

        insert_family_service_record(&tx, &record)?;
        report.success_count += 1;
    }

    tx.commit()
        .context("failed to commit family service import transaction")?;

    if report.error_count > 0 {
        warn!(errors = ?report.errors, "family service import skipped invalid rows");
    }
    info!(
        total = report.total_rows,
        imported = report.success_count,
        duplicates = report.duplicate_count,
        "family service import finished"
    );
    Ok(report)
}

pub fn import_family_service_xlsx(db_path: &Path, xlsx_path: &Path) -> Result<ImportReport> {
    let mut workbook = open_workbook_auto(xlsx_path)
        .with_context(|| format!("failed to open xlsx: {}", xlsx_path.display()))?;
    let range = workbook
        .worksheet_range(FAMILY_SERVICE_SHEET)
        .with_context(|| format!("failed to read sheet: {FAMILY_SERVICE_SHEET}"))?;

    let rows: Vec<Vec<Data>> = range.rows().map(|row| row.to_vec()).collect();
    if rows.len() <= FAMILY_SERVICE_DATA_START {
        anyhow::bail!("sheet {FAMILY_SERVICE_SHEET} needs a title row, a header row and data");
    }

    import_family_service_rows(db_path, &rows)
}

/// Top and sub-header cells joined column by column, e.g. `父亲` + `信息`.
fn roster_headers(rows: &[Vec<Data>]) -> Vec<String> {
    let header_rows = &rows[..rows.len().min(PATIENT_HEADER_ROWS)];
    let width = header_rows.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|idx| {
            header_rows
                .iter()
                .filter_map(|row| row.get(idx))
                .map(cell_to_string)
                .collect::<String>()
                .trim()
                .to_string()
        })
        .collect()
}

fn roster_date_text(cell: &Data) -> String {
    let date = match cell {
        Data::Float(serial) => excel_serial_to_date(*serial),
        Data::Int(serial) => excel_serial_to_date(*serial as f64),
        Data::DateTime(value) => excel_serial_to_date(value.as_f64()),
        _ => None,
    };
    date.map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| cell_to_string(cell))
}

/// Imports already-read roster rows (both header rows included); rows without a name are reported.
pub fn import_patient_rows(db_path: &Path, rows: &[Vec<Data>]) -> Result<ImportReport> {
    if rows.len() <= PATIENT_HEADER_ROWS {
        anyhow::bail!("patient roster needs two header rows and at least one data row");
    }
    let columns = PatientColumns::from_headers(&roster_headers(rows))?;
    init_db(db_path)?;

    let mut report = ImportReport::default();
    for (idx, row) in rows.iter().enumerate().skip(PATIENT_HEADER_ROWS) {
        if is_blank_row(row) {
            continue;
        }
        report.total_rows += 1;
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(col, cell)| {
                if columns.is_date_column(col) {
                    roster_date_text(cell)
                } else {
                    cell_to_string(cell)
                }
            })
            .collect();
        let record = columns.record(&cells);
        if record.name.is_empty() {
            report.error_count += 1;
            report.errors.push(format!("row {}: missing name", idx + 1));
            continue;
        }
        insert_patient_record(db_path, &record)?;
        report.success_count += 1;
    }

    if report.error_count > 0 {
        warn!(errors = ?report.errors, "patient import skipped rows without names");
    }
    info!(
        total = report.total_rows,
        imported = report.success_count,
        "patient xlsx import finished"
    );
    Ok(report)
}

/// Reads the first sheet of a patient roster workbook.
pub fn import_patients_xlsx(db_path: &Path, xlsx_path: &Path) -> Result<ImportReport> {
    let mut workbook = open_workbook_auto(xlsx_path)
        .with_context(|| format!("failed to open xlsx: {}", xlsx_path.display()))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .with_context(|| format!("workbook has no sheets: {}", xlsx_path.display()))?;
    let range = workbook
        .worksheet_range(&sheet)
        .with_context(|| format!("failed to read sheet: {sheet}"))?;

    let rows: Vec<Vec<Data>> = range.rows().map(|row| row.to_vec()).collect();
    import_patient_rows(db_path, &rows)
}
