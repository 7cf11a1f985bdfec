use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub person_id: i64,
    pub name: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub hometown: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub check_in_count: i64,
    #[serde(default)]
    pub latest_check_in: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInRecord {
    pub id: i64,
    pub person_id: i64,
    pub child_name: String,
    #[serde(default)]
    pub checkin_date: Option<String>,
    #[serde(default)]
    pub attendees: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub treatment_plan: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyServiceRecord {
    pub id: i64,
    #[serde(default)]
    pub sequence_number: Option<String>,
    pub year_month: String,
    #[serde(default)]
    pub family_count: i64,
    #[serde(default)]
    pub residents_count: i64,
    #[serde(default)]
    pub residence_days: i64,
    #[serde(default)]
    pub accommodation_count: i64,
    #[serde(default)]
    pub care_service_count: i64,
    #[serde(default)]
    pub volunteer_service_count: i64,
    #[serde(default)]
    pub total_service_count: i64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub cumulative_residence_days: i64,
    #[serde(default)]
    pub cumulative_service_count: i64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub avg_days_per_family: f64,
}

/// Household and guardian details kept once per patient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyInfo {
    #[serde(default)]
    pub home_address: Option<String>,
    #[serde(default)]
    pub father_name: Option<String>,
    #[serde(default)]
    pub father_phone: Option<String>,
    #[serde(default)]
    pub father_id_card: Option<String>,
    #[serde(default)]
    pub mother_name: Option<String>,
    #[serde(default)]
    pub mother_phone: Option<String>,
    #[serde(default)]
    pub mother_id_card: Option<String>,
    #[serde(default)]
    pub other_guardian: Option<String>,
    #[serde(default)]
    pub economic_status: Option<String>,
}

impl FamilyInfo {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub person_id: i64,
    pub name: String,
    #[serde(default)]
    pub id_card: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub hometown: Option<String>,
    #[serde(default)]
    pub ethnicity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: i64,
    #[serde(default)]
    pub hospital: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub follow_up_plan: Option<String>,
    #[serde(default)]
    pub record_date: Option<String>,
}

/// Everything known about one patient; check-ins and medical records newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientDetail {
    pub profile: PatientProfile,
    #[serde(default)]
    pub family: Option<FamilyInfo>,
    #[serde(default)]
    pub check_ins: Vec<CheckInRecord>,
    #[serde(default)]
    pub medical_info: Vec<MedicalRecord>,
}

/// Patient row as it arrives from an import or a manual entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPatientRecord {
    pub name: String,
    pub id_card: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub hometown: Option<String>,
    pub ethnicity: Option<String>,
    pub check_in_date: Option<String>,
    pub attendees: Option<String>,
    pub symptoms: Option<String>,
    pub follow_up_plan: Option<String>,
    pub hospital: Option<String>,
    pub diagnosis: Option<String>,
    pub doctor_name: Option<String>,
    pub family: FamilyInfo,
}

/// Family-service month as parsed from a spreadsheet row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewFamilyServiceRecord {
    pub sequence_number: String,
    pub year_month: String,
    pub family_count: f64,
    pub residents_count: f64,
    pub residence_days: f64,
    pub accommodation_count: f64,
    pub care_service_count: f64,
    pub volunteer_service_count: f64,
    pub total_service_count: f64,
    pub notes: String,
    pub cumulative_residence_days: f64,
    pub cumulative_service_count: f64,
}

/// Outcome of one spreadsheet import. Row numbers in `errors` are 1-based sheet rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub total_rows: usize,
    pub success_count: usize,
    pub duplicate_count: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    pub fn summary(&self) -> String {
        format!(
            "imported {} of {} rows ({} duplicates, {} errors)",
            self.success_count, self.total_rows, self.duplicate_count, self.error_count
        )
    }
}
