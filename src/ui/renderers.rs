use chrono::{Local, NaiveDate};
use serde_json::Value;

use crate::domain::entities::records::{FamilyServiceRecord, PatientSummary};
use crate::domain::schema::formatters::{
    format_date, format_metric, format_number, format_year_month, EMPTY_DISPLAY,
};
use crate::usecase::ports::hooks::ItemRenderer;
use crate::usecase::ports::view::CardView;
use crate::usecase::services::resource_hooks::calc_age;

fn text_or_dash(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(EMPTY_DISPLAY)
        .to_string()
}

fn date_text(value: Option<&str>) -> String {
    format_date(&value.map_or(Value::Null, |value| Value::String(value.to_string())))
}

#[derive(Debug, Clone, Copy)]
pub struct PatientCardRenderer {
    today: NaiveDate,
}

impl PatientCardRenderer {
    pub fn new() -> Self {
        Self::as_of(Local::now().date_naive())
    }

    pub fn as_of(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl Default for PatientCardRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemRenderer<PatientSummary> for PatientCardRenderer {
    fn render_item(&self, patient: &PatientSummary) -> CardView {
        let age = patient
            .birth_date
            .as_deref()
            .and_then(|birth| calc_age(birth, self.today))
            .map_or_else(|| "年龄未知".to_string(), |age| format!("{age}岁"));
        let gender = text_or_dash(patient.gender.as_deref());

        CardView::titled(patient.name.clone())
            .with_key(patient.person_id.to_string())
            .with_subtitle(format!("{gender} · {age}"))
            .field("籍贯", text_or_dash(patient.hometown.as_deref()))
            .field("诊断", text_or_dash(patient.diagnosis.as_deref()))
            .field("入住次数", format!("{}次", patient.check_in_count))
            .field("最近入住", date_text(patient.latest_check_in.as_deref()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FamilyServiceCardRenderer;

impl ItemRenderer<FamilyServiceRecord> for FamilyServiceCardRenderer {
    fn render_item(&self, record: &FamilyServiceRecord) -> CardView {
        let count = |value: i64| format_number(&Value::from(value));
        let mut card =
            CardView::titled(format_year_month(&Value::String(record.year_month.clone())))
                .with_key(record.id.to_string())
                .field("家庭数量", count(record.family_count))
                .field("入住人数", count(record.residents_count))
                .field("入住天数", count(record.residence_days))
                .field("服务总人次", count(record.total_service_count))
                .field("户均入住天数", format_metric(record.avg_days_per_family));
        if let Some(sequence) = record.sequence_number.as_deref() {
            card = card.with_subtitle(format!("序号 {sequence}"));
        }
        if let Some(notes) = record.notes.as_deref().filter(|notes| !notes.trim().is_empty()) {
            card = card.field("备注", notes);
        }
        card
    }
}
