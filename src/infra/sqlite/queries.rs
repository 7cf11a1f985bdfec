use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, OptionalExtension, Row, Transaction};
use serde_json::{json, Value};

use crate::domain::entities::query::{FilterValue, Filters, PageWindow};
use crate::domain::entities::records::{
    CheckInRecord, FamilyInfo, FamilyServiceRecord, MedicalRecord, NewFamilyServiceRecord,
    NewPatientRecord, PatientDetail, PatientProfile, PatientSummary,
};
use crate::domain::schema::formatters::parse_date;
use crate::infra::sqlite::schema::{init_db, open_connection};

const FAMILY_SERVICE_COLUMNS: &str = "
    id, sequence_number, year_month, family_count, residents_count, residence_days,
    accommodation_count, care_service_count, volunteer_service_count, total_service_count,
    notes, cumulative_residence_days, cumulative_service_count, created_at, updated_at,
    CASE WHEN family_count > 0
         THEN ROUND(residence_days * 1.0 / family_count, 1)
         ELSE 0.0 END AS avg_days_per_family";

pub fn list_patients(db_path: &Path) -> Result<Vec<PatientSummary>> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;
    let mut stmt = conn
        .prepare(
            "SELECT
                 p.id,
                 p.name,
                 pp.gender,
                 pp.birth_date,
                 pp.hometown,
                 (SELECT mi.diagnosis FROM medical_info mi
                   WHERE mi.person_id = p.id
                   ORDER BY mi.record_date DESC, mi.id DESC
                   LIMIT 1) AS diagnosis,
                 COUNT(DISTINCT cir.id) AS check_in_count,
                 MAX(cir.check_in_date) AS latest_check_in
             FROM persons p
             LEFT JOIN patient_profiles pp ON pp.person_id = p.id
             LEFT JOIN check_in_records cir ON cir.person_id = p.id
             GROUP BY p.id
             ORDER BY latest_check_in DESC, p.name ASC",
        )
        .context("failed to prepare patients query")?;

    let patients = stmt
        .query_map([], |row| {
            Ok(PatientSummary {
                person_id: row.get(0)?,
                name: row.get(1)?,
                gender: row.get(2)?,
                birth_date: row.get(3)?,
                hometown: row.get(4)?,
                diagnosis: row.get(5)?,
                check_in_count: row.get(6)?,
                latest_check_in: row.get(7)?,
            })
        })
        .context("failed to query patients")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect patients")?;

    Ok(patients)
}

pub fn patient_statistics(db_path: &Path) -> Result<Value> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;
    let total_patients: i64 = conn
        .query_row("SELECT COUNT(*) FROM persons", [], |row| row.get(0))
        .context("failed to count patients")?;
    let total_records: i64 = conn
        .query_row("SELECT COUNT(*) FROM check_in_records", [], |row| row.get(0))
        .context("failed to count check-in records")?;

    Ok(json!({
        "totalPatients": total_patients,
        "totalRecords": total_records,
    }))
}

pub fn list_check_ins(db_path: &Path) -> Result<Vec<CheckInRecord>> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;
    let mut stmt = conn
        .prepare(
            "SELECT c.id, c.person_id, p.name, c.check_in_date, c.attendees, c.details,
                    c.treatment_plan
             FROM check_in_records c
             JOIN persons p ON p.id = c.person_id
             ORDER BY c.check_in_date DESC, c.id DESC",
        )
        .context("failed to prepare check-ins query")?;

    let records = stmt
        .query_map([], |row| {
            Ok(CheckInRecord {
                id: row.get(0)?,
                person_id: row.get(1)?,
                child_name: row.get(2)?,
                checkin_date: row.get(3)?,
                attendees: row.get(4)?,
                details: row.get(5)?,
                treatment_plan: row.get(6)?,
            })
        })
        .context("failed to query check-ins")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect check-ins")?;

    Ok(records)
}

/// Profile, family, check-ins and medical records of one person, or `None` if unknown.
pub fn patient_detail(db_path: &Path, person_id: i64) -> Result<Option<PatientDetail>> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;

    let profile = conn
        .query_row(
            "SELECT p.id, p.name, p.id_card, pp.gender, pp.birth_date, pp.hometown, pp.ethnicity
             FROM persons p
             LEFT JOIN patient_profiles pp ON pp.person_id = p.id
             WHERE p.id = ?1",
            params![person_id],
            |row| {
                Ok(PatientProfile {
                    person_id: row.get(0)?,
                    name: row.get(1)?,
                    id_card: row.get(2)?,
                    gender: row.get(3)?,
                    birth_date: row.get(4)?,
                    hometown: row.get(5)?,
                    ethnicity: row.get(6)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("failed to load profile of person {person_id}"))?;
    let Some(profile) = profile else {
        return Ok(None);
    };

    let family = conn
        .query_row(
            "SELECT home_address, father_name, father_phone, father_id_card, mother_name,
                    mother_phone, mother_id_card, other_guardian, economic_status
             FROM family_info
             WHERE person_id = ?1",
            params![person_id],
            |row| {
                Ok(FamilyInfo {
                    home_address: row.get(0)?,
                    father_name: row.get(1)?,
                    father_phone: row.get(2)?,
                    father_id_card: row.get(3)?,
                    mother_name: row.get(4)?,
                    mother_phone: row.get(5)?,
                    mother_id_card: row.get(6)?,
                    other_guardian: row.get(7)?,
                    economic_status: row.get(8)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("failed to load family info of person {person_id}"))?;

    let mut stmt = conn
        .prepare(
            "SELECT c.id, c.person_id, p.name, c.check_in_date, c.attendees, c.details,
                    c.treatment_plan
             FROM check_in_records c
             JOIN persons p ON p.id = c.person_id
             WHERE c.person_id = ?1
             ORDER BY c.check_in_date DESC, c.id DESC",
        )
        .context("failed to prepare patient check-ins query")?;
    let check_ins = stmt
        .query_map(params![person_id], |row| {
            Ok(CheckInRecord {
                id: row.get(0)?,
                person_id: row.get(1)?,
                child_name: row.get(2)?,
                checkin_date: row.get(3)?,
                attendees: row.get(4)?,
                details: row.get(5)?,
                treatment_plan: row.get(6)?,
            })
        })
        .context("failed to query patient check-ins")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect patient check-ins")?;

    let mut stmt = conn
        .prepare(
            "SELECT id, hospital, diagnosis, doctor_name, symptoms, follow_up_plan, record_date
             FROM medical_info
             WHERE person_id = ?1
             ORDER BY record_date DESC, id DESC",
        )
        .context("failed to prepare medical info query")?;
    let medical_info = stmt
        .query_map(params![person_id], |row| {
            Ok(MedicalRecord {
                id: row.get(0)?,
                hospital: row.get(1)?,
                diagnosis: row.get(2)?,
                doctor_name: row.get(3)?,
                symptoms: row.get(4)?,
                follow_up_plan: row.get(5)?,
                record_date: row.get(6)?,
            })
        })
        .context("failed to query medical info")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect medical info")?;

    Ok(Some(PatientDetail {
        profile,
        family,
        check_ins,
        medical_info,
    }))
}

/// Text form of a filter entry; numbers are rendered without a fractional part when whole.
fn filter_text(filters: &Filters, key: &str) -> Option<String> {
    let text = match filters.get(key)? {
        FilterValue::Text(text) => text.trim().to_string(),
        FilterValue::Number(number) if number.fract() == 0.0 => format!("{number:.0}"),
        FilterValue::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn filter_number(filters: &Filters, key: &str) -> Option<f64> {
    match filters.get(key)? {
        FilterValue::Number(number) => Some(*number),
        FilterValue::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn normalized_date(text: &str) -> Option<String> {
    parse_date(text).map(|date| date.format("%Y-%m-%d").to_string())
}

fn push_range(
    clauses: &mut Vec<String>,
    params: &mut Vec<SqlValue>,
    column: &str,
    filter: Option<&FilterValue>,
) {
    let Some(FilterValue::NumberRange { min, max }) = filter else {
        return;
    };
    if let Some(min) = min {
        clauses.push(format!("{column} >= ?"));
        params.push(SqlValue::Real(*min));
    }
    if let Some(max) = max {
        clauses.push(format!("{column} <= ?"));
        params.push(SqlValue::Real(*max));
    }
}

/// Builds the WHERE clause of the family-service list from the controller's filters.
fn family_service_conditions(filters: &Filters) -> (String, Vec<SqlValue>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    let search = filters.search().trim();
    if !search.is_empty() {
        clauses.push(
            "(notes LIKE ? OR strftime('%Y', year_month) LIKE ? OR strftime('%m', year_month) LIKE ?)"
                .to_string(),
        );
        let pattern = format!("%{search}%");
        params.extend(std::iter::repeat_n(SqlValue::Text(pattern), 3));
    }

    // Placeholder selections such as "全部" are not years.
    if let Some(year) = filter_text(filters, "year") {
        if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
            clauses.push("strftime('%Y', year_month) = ?".to_string());
            params.push(SqlValue::Text(year));
        }
    }

    if let Some(month) = filter_text(filters, "month").and_then(|m| m.parse::<u32>().ok()) {
        if (1..=12).contains(&month) {
            clauses.push("strftime('%m', year_month) = ?".to_string());
            params.push(SqlValue::Text(format!("{month:02}")));
        }
    }

    let mut start = filter_text(filters, "startDate");
    let mut end = filter_text(filters, "endDate");
    if let Some(FilterValue::MonthRange {
        start: range_start,
        end: range_end,
    }) = filters.get("dateRange")
    {
        if !range_start.is_empty() && !range_end.is_empty() {
            start = Some(range_start.clone());
            end = Some(range_end.clone());
        }
    }
    if let Some(start) = start.as_deref().and_then(normalized_date) {
        clauses.push("year_month >= ?".to_string());
        params.push(SqlValue::Text(start));
    }
    if let Some(end) = end.as_deref().and_then(normalized_date) {
        clauses.push("year_month <= ?".to_string());
        params.push(SqlValue::Text(end));
    }

    if let Some(min_services) = filter_number(filters, "minServices") {
        clauses.push("total_service_count >= ?".to_string());
        params.push(SqlValue::Real(min_services));
    }

    push_range(
        &mut clauses,
        &mut params,
        "family_count",
        filters.get("familyCountRange"),
    );
    push_range(
        &mut clauses,
        &mut params,
        "total_service_count",
        filters.get("totalServiceRange"),
    );

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (where_sql, params)
}

fn family_service_order(sort: &str) -> &'static str {
    match sort {
        "date-asc" => "year_month ASC",
        "families-desc" => "family_count DESC, year_month DESC",
        "families-asc" => "family_count ASC, year_month DESC",
        "services-desc" => "total_service_count DESC, year_month DESC",
        "services-asc" => "total_service_count ASC, year_month DESC",
        _ => "year_month DESC",
    }
}

fn family_service_from_row(row: &Row<'_>) -> rusqlite::Result<FamilyServiceRecord> {
    Ok(FamilyServiceRecord {
        id: row.get(0)?,
        sequence_number: row.get(1)?,
        year_month: row.get(2)?,
        family_count: row.get(3)?,
        residents_count: row.get(4)?,
        residence_days: row.get(5)?,
        accommodation_count: row.get(6)?,
        care_service_count: row.get(7)?,
        volunteer_service_count: row.get(8)?,
        total_service_count: row.get(9)?,
        notes: row.get(10)?,
        cumulative_residence_days: row.get(11)?,
        cumulative_service_count: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        avg_days_per_family: row.get(15)?,
    })
}

fn select_family_services(
    db_path: &Path,
    filters: &Filters,
    window: Option<PageWindow>,
) -> Result<Vec<FamilyServiceRecord>> {
    let conn = open_connection(db_path)?;
    let (where_sql, mut row_params) = family_service_conditions(filters);
    let order_sql = family_service_order(filters.sort());

    let mut sql = format!(
        "SELECT {FAMILY_SERVICE_COLUMNS}
         FROM family_service_records
         {where_sql}
         ORDER BY {order_sql}"
    );
    if let Some(window) = window {
        sql.push_str(" LIMIT ? OFFSET ?");
        row_params.push(SqlValue::Integer(window.limit as i64));
        row_params.push(SqlValue::Integer(window.offset as i64));
    }

    let mut stmt = conn
        .prepare(&sql)
        .context("failed to prepare family service query")?;
    let records = stmt
        .query_map(
            rusqlite::params_from_iter(row_params),
            family_service_from_row,
        )
        .context("failed to query family service records")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect family service records")?;
    Ok(records)
}

/// One page of family-service months plus the number of months matching `filters`.
pub fn query_family_services(
    db_path: &Path,
    filters: &Filters,
    window: PageWindow,
) -> Result<(Vec<FamilyServiceRecord>, u64)> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;
    let (where_sql, count_params) = family_service_conditions(filters);
    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM family_service_records {where_sql}"),
            rusqlite::params_from_iter(count_params),
            |row| row.get(0),
        )
        .context("failed to count family service records")?;

    let items = select_family_services(db_path, filters, Some(window))?;
    Ok((items, total.max(0) as u64))
}

/// Every family-service month matching `filters`, in the requested order.
pub fn list_family_services(db_path: &Path, filters: &Filters) -> Result<Vec<FamilyServiceRecord>> {
    init_db(db_path)?;
    select_family_services(db_path, filters, None)
}

fn round1(value: Option<f64>) -> f64 {
    value.map_or(0.0, |value| (value * 10.0).round() / 10.0)
}

pub fn family_service_overview(db_path: &Path, current_year: i32) -> Result<Value> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;

    let overall = conn
        .query_row(
            "SELECT
                 COUNT(*),
                 SUM(family_count),
                 SUM(residents_count),
                 SUM(total_service_count),
                 SUM(residence_days),
                 AVG(CASE WHEN family_count > 0
                          THEN residence_days * 1.0 / family_count ELSE 0 END),
                 AVG(CASE WHEN residents_count > 0
                          THEN total_service_count * 1.0 / residents_count ELSE 0 END),
                 MIN(year_month),
                 MAX(year_month)
             FROM family_service_records",
            [],
            |row| {
                Ok(json!({
                    "totalRecords": row.get::<_, i64>(0)?,
                    "totalFamilies": row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                    "totalResidents": row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                    "totalServices": row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                    "totalResidenceDays": row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                    "avgDaysPerFamily": round1(row.get(5)?),
                    "avgServicesPerResident": round1(row.get(6)?),
                    "firstRecordDate": row.get::<_, Option<String>>(7)?,
                    "lastRecordDate": row.get::<_, Option<String>>(8)?,
                }))
            },
        )
        .context("failed to query family service overview")?;

    let current = conn
        .query_row(
            "SELECT COUNT(*), SUM(family_count), SUM(total_service_count)
             FROM family_service_records
             WHERE strftime('%Y', year_month) = ?1",
            params![current_year.to_string()],
            |row| {
                Ok(json!({
                    "recordsThisYear": row.get::<_, i64>(0)?,
                    "familiesThisYear": row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                    "servicesThisYear": row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                }))
            },
        )
        .context("failed to query current year family service stats")?;

    Ok(json!({ "overall": overall, "currentYear": current }))
}

pub fn family_service_filter_options(db_path: &Path) -> Result<Value> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT strftime('%Y', year_month) AS year
             FROM family_service_records
             WHERE year_month IS NOT NULL
             ORDER BY year DESC",
        )
        .context("failed to prepare family service years query")?;
    let years = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("failed to query family service years")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect family service years")?;

    let (min_services, max_services) = conn
        .query_row(
            "SELECT MIN(total_service_count), MAX(total_service_count)
             FROM family_service_records",
            [],
            |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?)),
        )
        .context("failed to query family service range")?;

    let months: Vec<Value> = (1..=12)
        .map(|month| json!({ "value": month.to_string(), "label": format!("{month}月") }))
        .collect();

    Ok(json!({
        "years": years,
        "months": months,
        "serviceRange": {
            "minServices": min_services.unwrap_or(0),
            "maxServices": max_services.unwrap_or(0),
        },
    }))
}

/// Returns the id of the person with the same id card, or with the same name when
/// neither has one, creating the person otherwise.
pub fn find_or_create_person(
    tx: &Transaction<'_>,
    name: &str,
    id_card: Option<&str>,
) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("patient name must not be empty");
    }
    let id_card = id_card.map(str::trim).filter(|card| !card.is_empty());

    let existing = match id_card {
        Some(card) => tx
            .query_row(
                "SELECT id FROM persons WHERE id_card = ?1",
                params![card],
                |row| row.get::<_, i64>(0),
            )
            .optional(),
        None => tx
            .query_row(
                "SELECT id FROM persons
                 WHERE name = ?1 AND (id_card IS NULL OR id_card = '')
                 ORDER BY id ASC LIMIT 1",
                params![name],
                |row| row.get::<_, i64>(0),
            )
            .optional(),
    }
    .context("failed to look up existing person")?;

    if let Some(person_id) = existing {
        return Ok(person_id);
    }

    tx.execute(
        "INSERT INTO persons(name, id_card) VALUES (?1, ?2)",
        params![name, id_card],
    )
    .with_context(|| format!("failed to insert person: {name}"))?;
    Ok(tx.last_insert_rowid())
}

pub fn insert_patient_record(db_path: &Path, record: &NewPatientRecord) -> Result<i64> {
    init_db(db_path)?;
    let mut conn = open_connection(db_path)?;
    let tx = conn
        .transaction()
        .context("failed to start patient insert transaction")?;

    let person_id = find_or_create_person(&tx, &record.name, record.id_card.as_deref())?;

    tx.execute(
        "INSERT OR REPLACE INTO patient_profiles(person_id, gender, birth_date, hometown, ethnicity)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            person_id,
            record.gender,
            record.birth_date,
            record.hometown,
            record.ethnicity
        ],
    )
    .context("failed to upsert patient profile")?;

    if record.check_in_date.is_some() {
        tx.execute(
            "INSERT INTO check_in_records(person_id, check_in_date, attendees, details, treatment_plan)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                person_id,
                record.check_in_date,
                record.attendees,
                record.symptoms,
                record.follow_up_plan
            ],
        )
        .context("failed to insert check-in record")?;
    }

    if record.hospital.is_some() || record.diagnosis.is_some() {
        tx.execute(
            "INSERT INTO medical_info(person_id, hospital, diagnosis, doctor_name, symptoms,
                                      follow_up_plan, record_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                person_id,
                record.hospital,
                record.diagnosis,
                record.doctor_name,
                record.symptoms,
                record.follow_up_plan,
                record.check_in_date
            ],
        )
        .context("failed to insert medical info")?;
    }

    if !record.family.is_empty() {
        let family = &record.family;
        tx.execute(
            "INSERT OR REPLACE INTO family_info(person_id, home_address, father_name, father_phone,
                                                father_id_card, mother_name, mother_phone,
                                                mother_id_card, other_guardian, economic_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                person_id,
                family.home_address,
                family.father_name,
                family.father_phone,
                family.father_id_card,
                family.mother_name,
                family.mother_phone,
                family.mother_id_card,
                family.other_guardian,
                family.economic_status
            ],
        )
        .context("failed to upsert family info")?;
    }

    tx.commit()
        .context("failed to commit patient insert transaction")?;
    Ok(person_id)
}

pub fn family_service_month_exists(tx: &Transaction<'_>, year_month: &str) -> Result<bool> {
    let existing = tx
        .query_row(
            "SELECT id FROM family_service_records WHERE date(year_month) = date(?1)",
            params![year_month],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .with_context(|| format!("failed to look up family service month {year_month}"))?;
    Ok(existing.is_some())
}

pub fn insert_family_service_record(
    tx: &Transaction<'_>,
    record: &NewFamilyServiceRecord,
) -> Result<()> {
    tx.execute(
        "INSERT INTO family_service_records(
             sequence_number, year_month, family_count, residents_count, residence_days,
             accommodation_count, care_service_count, volunteer_service_count,
             total_service_count, notes, cumulative_residence_days, cumulative_service_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            record.sequence_number,
            record.year_month,
            record.family_count as i64,
            record.residents_count as i64,
            record.residence_days as i64,
            record.accommodation_count as i64,
            record.care_service_count as i64,
            record.volunteer_service_count as i64,
            record.total_service_count as i64,
            record.notes,
            record.cumulative_residence_days as i64,
            record.cumulative_service_count as i64
        ],
    )
    .with_context(|| {
        format!(
            "failed to insert family service record for {}",
            record.year_month
        )
    })?;
    Ok(())
}

