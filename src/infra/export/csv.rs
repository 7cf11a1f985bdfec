//! Family-service export. Written as CSV, which spreadsheet programs open directly;
//! the stack has no xlsx writer.

use std::path::Path;

use anyhow::{Context, Result};

use crate::domain::entities::records::FamilyServiceRecord;

pub const FAMILY_SERVICE_HEADERS: [&str; 14] = [
    "序号",
    "年月",
    "家庭数量",
    "入住人数",
    "入住天数",
    "住宿人次",
    "关怀服务人次",
    "志愿者陪伴服务人次",
    "服务总人次",
    "备注",
    "累计入住天数",
    "累计服务人次",
    "创建时间",
    "更新时间",
];

fn family_service_row(record: &FamilyServiceRecord) -> [String; 14] {
    [
        record.sequence_number.clone().unwrap_or_default(),
        record.year_month.clone(),
        record.family_count.to_string(),
        record.residents_count.to_string(),
        record.residence_days.to_string(),
        record.accommodation_count.to_string(),
        record.care_service_count.to_string(),
        record.volunteer_service_count.to_string(),
        record.total_service_count.to_string(),
        record.notes.clone().unwrap_or_default(),
        record.cumulative_residence_days.to_string(),
        record.cumulative_service_count.to_string(),
        record.created_at.clone().unwrap_or_default(),
        record.updated_at.clone().unwrap_or_default(),
    ]
}

/// Writes `records` with Chinese headers. Returns the number of data rows written.
pub fn write_family_service_csv(path: &Path, records: &[FamilyServiceRecord]) -> Result<usize> {
    if records.is_empty() {
        anyhow::bail!("no family service records to export")
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create csv: {}", path.display()))?;
    writer
        .write_record(FAMILY_SERVICE_HEADERS)
        .context("failed to write csv header")?;
    for record in records {
        writer
            .write_record(family_service_row(record))
            .with_context(|| format!("failed to write csv row for {}", record.year_month))?;
    }
    writer.flush().context("failed to flush csv")?;
    Ok(records.len())
}
