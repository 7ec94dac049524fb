use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Record: field_name -> field_value
pub type Record = BTreeMap<String, String>;

/// One row of the location dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub district: String,
    pub chiefdom: String,
    pub section: String,
    pub facility: String,
}

impl LocationRecord {
    pub fn new(district: &str, chiefdom: &str, section: &str, facility: &str) -> Self {
        LocationRecord {
            district: district.to_string(),
            chiefdom: chiefdom.to_string(),
            section: section.to_string(),
            facility: facility.to_string(),
        }
    }
}

/// Lifecycle of the form being filled in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormStatus {
    #[default]
    Draft,
    Finalized,
    Submitted,
}

impl FormStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormStatus::Draft => "draft",
            FormStatus::Finalized => "finalized",
            FormStatus::Submitted => "submitted",
        }
    }
}

/// A queued submission waiting for connectivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSubmission {
    /// Stable id assigned at enqueue; entries stored without one get a fresh id on load
    #[serde(default = "new_submission_id")]
    pub id: String,
    pub timestamp: String,
    #[serde(default)]
    pub submitted_by: String,
    #[serde(flatten)]
    pub fields: Record,
}

impl PendingSubmission {
    /// Keys an entry stores next to the record fields
    pub const KEYS: [&'static str; 3] = ["id", "timestamp", "submittedBy"];

    /// The record as sent over the wire: fields plus timestamp and submitter
    pub fn payload(&self) -> Record {
        let mut payload = self.fields.clone();
        payload.insert("timestamp".to_string(), self.timestamp.clone());
        payload.insert("submittedBy".to_string(), self.submitted_by.clone());
        payload
    }
}

/// A saved, resumable form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub draft_id: String,
    pub draft_name: String,
    pub saved_at: String,
    #[serde(default)]
    pub saved_by: String,
    #[serde(default)]
    pub form_status: FormStatus,
    #[serde(default = "first_section")]
    pub current_section: usize,
    #[serde(flatten)]
    pub fields: Record,
}

impl Draft {
    /// Keys a draft stores next to the form fields
    pub const KEYS: [&'static str; 6] = [
        "draftId",
        "draftName",
        "savedAt",
        "savedBy",
        "formStatus",
        "currentSection",
    ];
}

/// Names a form field may not take: they would collide with the keys a
/// queued entry or a saved draft is stored under, or with the metadata
/// added to a submitted record.
pub fn is_reserved_field(name: &str) -> bool {
    name == FORM_STATUS_FIELD
        || PendingSubmission::KEYS
            .iter()
            .chain(Draft::KEYS.iter())
            .chain(GPS_FIELDS.iter())
            .any(|key| *key == name)
}

/// Drop `keys` from `fields`, returning the names that were present
pub(crate) fn strip_keys(fields: &mut Record, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter(|key| fields.remove(**key).is_some())
        .map(|key| key.to_string())
        .collect()
}

/// Outcome of one pass over the pending queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainResult {
    pub removed: usize,
    pub failed: usize,
}

/// A position fix from the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp: String,
}

impl GpsFix {
    /// Write the fix into the hidden gps_* fields of a record
    pub fn apply_to(&self, record: &mut Record) {
        record.insert("gps_latitude".to_string(), self.latitude.to_string());
        record.insert("gps_longitude".to_string(), self.longitude.to_string());
        record.insert("gps_accuracy".to_string(), self.accuracy.to_string());
        record.insert("gps_timestamp".to_string(), self.timestamp.clone());
    }

    pub fn summary(&self) -> String {
        format!(
            "Lat: {:.6}, Lon: {:.6} (±{}m)",
            self.latitude,
            self.longitude,
            self.accuracy.round() as i64
        )
    }
}

/// Status marker added to every submitted record
pub const FORM_STATUS_FIELD: &str = "form_status";

pub const GPS_FIELDS: [&str; 4] = ["gps_latitude", "gps_longitude", "gps_accuracy", "gps_timestamp"];

/// Current time as an ISO-8601 string with millisecond precision
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn new_submission_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Draft ids look like `draft_<epoch-ms>_<9 base36 chars>`
pub fn new_draft_id() -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut bits = uuid::Uuid::new_v4().as_u128();
    let suffix: String = (0..9)
        .map(|_| {
            let digit = DIGITS[(bits % 36) as usize] as char;
            bits /= 36;
            digit
        })
        .collect();
    format!("draft_{}_{}", Utc::now().timestamp_millis(), suffix)
}

fn first_section() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_id_shape() {
        let id = new_draft_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "draft");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert_ne!(id, new_draft_id());
    }

    #[test]
    fn test_pending_submission_flattens_fields() {
        let mut fields = Record::new();
        fields.insert("school_name".into(), "Kpetema Primary".into());
        let pending = PendingSubmission {
            id: "abc".into(),
            timestamp: "2026-01-01T00:00:00.000Z".into(),
            submitted_by: "surveyor".into(),
            fields,
        };
        let json = serde_json::to_value(&pending).unwrap();
        assert_eq!(json["school_name"], "Kpetema Primary");
        assert_eq!(json["submittedBy"], "surveyor");

        let back: PendingSubmission = serde_json::from_value(json).unwrap();
        assert_eq!(back, pending);
    }

    #[test]
    fn test_legacy_submission_gets_id() {
        let pending: PendingSubmission = serde_json::from_str(
            r#"{"timestamp": "2026-01-01T00:00:00.000Z", "submittedBy": "surveyor", "district": "Bo"}"#,
        )
        .unwrap();
        assert!(!pending.id.is_empty());
        assert_eq!(pending.fields.get("district").map(String::as_str), Some("Bo"));
    }

    #[test]
    fn test_reserved_field_names() {
        for name in ["id", "timestamp", "submittedBy", "draftId", "currentSection", "form_status", "gps_latitude"] {
            assert!(is_reserved_field(name), "{} should be reserved", name);
        }
        assert!(!is_reserved_field("school_name"));
        assert!(!is_reserved_field("school_id"));

        let mut fields = Record::new();
        fields.insert("id".into(), "STU-42".into());
        fields.insert("school_name".into(), "A".into());
        assert_eq!(strip_keys(&mut fields, &PendingSubmission::KEYS), vec!["id"]);
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn test_gps_summary() {
        let fix = GpsFix {
            latitude: 7.964_412_3,
            longitude: -11.738_1,
            accuracy: 12.6,
            timestamp: "2026-01-01T00:00:00.000Z".into(),
        };
        assert_eq!(fix.summary(), "Lat: 7.964412, Lon: -11.738100 (±13m)");

        let mut record = Record::new();
        fix.apply_to(&mut record);
        assert_eq!(record.len(), GPS_FIELDS.len());
        assert_eq!(record["gps_accuracy"], "12.6");
    }
}
