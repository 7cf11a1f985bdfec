//! Column layout of a patient roster, shared by the csv and xlsx imports.

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::domain::entities::records::{FamilyInfo, NewPatientRecord};
use crate::domain::schema::formatters::parse_date;

const NAME_HEADERS: &[&str] = &["姓名", "患儿姓名"];

/// Exact header match first, then the first header containing one of `names`.
pub fn column_index(headers: &[String], names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|header| names.contains(&header.trim()))
        .or_else(|| {
            headers
                .iter()
                .position(|header| names.iter().any(|name| header.contains(name)))
        })
}

/// Header positions of a patient roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientColumns {
    name: usize,
    id_card: Option<usize>,
    gender: Option<usize>,
    birth_date: Option<usize>,
    hometown: Option<usize>,
    ethnicity: Option<usize>,
    check_in_date: Option<usize>,
    attendees: Option<usize>,
    symptoms: Option<usize>,
    follow_up_plan: Option<usize>,
    hospital: Option<usize>,
    diagnosis: Option<usize>,
    doctor_name: Option<usize>,
    home_address: Option<usize>,
    father: Option<usize>,
    mother: Option<usize>,
    other_guardian: Option<usize>,
    economic_status: Option<usize>,
}

impl PatientColumns {
    pub fn from_headers(headers: &[String]) -> Result<Self> {
        let name = column_index(headers, NAME_HEADERS)
            .with_context(|| format!("roster header {} is required", NAME_HEADERS[0]))?;
        Ok(Self {
            name,
            id_card: column_index(headers, &["身份证号", "身份证"]),
            gender: column_index(headers, &["性别"]),
            birth_date: column_index(headers, &["出生日期", "出生年月"]),
            hometown: column_index(headers, &["籍贯"]),
            ethnicity: column_index(headers, &["民族"]),
            check_in_date: column_index(headers, &["入住时间", "入住日期"]),
            attendees: column_index(headers, &["入住人"]),
            symptoms: column_index(headers, &["症状详情", "症状"]),
            follow_up_plan: column_index(headers, &["后续治疗安排", "后续安排"]),
            hospital: column_index(headers, &["就诊医院", "医院"]),
            diagnosis: column_index(headers, &["医院诊断", "诊断"]),
            doctor_name: column_index(headers, &["医生姓名", "主治医生"]),
            home_address: column_index(headers, &["家庭地址", "地址"]),
            father: column_index(headers, &["父亲信息", "父亲"]),
            mother: column_index(headers, &["母亲信息", "母亲"]),
            other_guardian: column_index(headers, &["其他监护人"]),
            economic_status: column_index(headers, &["家庭经济"]),
        })
    }

    /// Columns holding calendar dates, which spreadsheets may store as serial numbers.
    pub fn is_date_column(&self, idx: usize) -> bool {
        self.birth_date == Some(idx) || self.check_in_date == Some(idx)
    }

    pub fn record(&self, row: &[String]) -> NewPatientRecord {
        let text = |idx: Option<usize>| {
            idx.and_then(|idx| row.get(idx))
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let date = |idx: Option<usize>| text(idx).map(|value| normalize_date(&value));
        let father = ParentInfo::parse(text(self.father).as_deref());
        let mother = ParentInfo::parse(text(self.mother).as_deref());

        NewPatientRecord {
            name: text(Some(self.name)).unwrap_or_default(),
            id_card: text(self.id_card),
            gender: text(self.gender),
            birth_date: date(self.birth_date),
            hometown: text(self.hometown),
            ethnicity: text(self.ethnicity),
            check_in_date: date(self.check_in_date),
            attendees: text(self.attendees),
            symptoms: text(self.symptoms),
            follow_up_plan: text(self.follow_up_plan),
            hospital: text(self.hospital),
            diagnosis: text(self.diagnosis),
            doctor_name: text(self.doctor_name),
            family: FamilyInfo {
                home_address: text(self.home_address),
                father_name: father.name,
                father_phone: father.phone,
                father_id_card: father.id_card,
                mother_name: mother.name,
                mother_phone: mother.phone,
                mother_id_card: mother.id_card,
                other_guardian: text(self.other_guardian),
                economic_status: text(self.economic_status),
            },
        }
    }
}

/// A guardian cell such as `张三 13800001111 110101198001011234`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentInfo {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub id_card: Option<String>,
}

impl ParentInfo {
    /// The name is the first token seen before any phone or id card number.
    pub fn parse(text: Option<&str>) -> Self {
        let mut info = Self::default();
        for part in text.unwrap_or_default().split_whitespace() {
            if is_mobile_number(part) {
                info.phone = Some(part.to_string());
            } else if is_id_card_number(part) {
                info.id_card = Some(part.to_string());
            } else if info.phone.is_none() && info.id_card.is_none() {
                info.name = Some(part.to_string());
            }
        }
        info
    }
}

fn is_mobile_number(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 11
        && bytes[0] == b'1'
        && (b'3'..=b'9').contains(&bytes[1])
        && bytes.iter().all(u8::is_ascii_digit)
}

fn is_id_card_number(text: &str) -> bool {
    let bytes = text.as_bytes();
    match bytes.len() {
        15 => bytes.iter().all(u8::is_ascii_digit),
        18 => {
            bytes[..17].iter().all(u8::is_ascii_digit)
                && (bytes[17].is_ascii_digit() || bytes[17] == b'X' || bytes[17] == b'x')
        }
        _ => false,
    }
}

/// `YYYY-MM-DD` when the text reads as a date, otherwise the text unchanged.
pub fn normalize_date(text: &str) -> String {
    let text = text.trim();
    parse_date(text)
        .or_else(|| NaiveDate::parse_from_str(text, "%Y年%m月%d日").ok())
        .or_else(|| NaiveDate::parse_from_str(text, "%Y年%m月%d").ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| text.to_string())
}
