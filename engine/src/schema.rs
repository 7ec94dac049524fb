//! Form definition: sections of typed fields, loaded from JSON.
//!
//! The field type is a closed enum tagged by `type` in the JSON, so every
//! place that cares about field behaviour matches on it exhaustively.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::hierarchy::{CascadeFields, CascadeLevel};
use crate::types::{is_reserved_field, Record};

/// Separator used when a checkbox group is flattened to one value
pub const CHECKBOX_SEPARATOR: &str = ", ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Tel,
    Email,
    Number,
    Date,
    Textarea,
    Radio { options: Vec<String> },
    Checkbox { options: Vec<String> },
    CascadeSelect {
        #[serde(rename = "cascadeLevel")]
        cascade_level: CascadeLevel,
    },
    Signature,
    Gps,
}

/// Show a field only when another field has (or, inverted, lacks) a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub value: String,
    #[serde(default)]
    pub inverse: bool,
}

impl Condition {
    pub fn holds(&self, values: &Record) -> bool {
        match values.get(&self.field) {
            Some(actual) if self.inverse => actual != &self.value,
            Some(actual) => actual == &self.value,
            // Nothing chosen yet: the field stays hidden
            None => false,
        }
    }
}

fn required_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default = "required_by_default")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional: Option<Condition>,
}

impl Field {
    pub fn is_visible(&self, values: &Record) -> bool {
        self.conditional
            .as_ref()
            .map_or(true, |condition| condition.holds(values))
    }

    /// Whether leaving this field empty blocks progress
    pub fn blocks_when_empty(&self, values: &Record) -> bool {
        let optional_kind = match &self.kind {
            FieldKind::Gps => true,
            FieldKind::Text
            | FieldKind::Tel
            | FieldKind::Email
            | FieldKind::Number
            | FieldKind::Date
            | FieldKind::Textarea
            | FieldKind::Radio { .. }
            | FieldKind::Checkbox { .. }
            | FieldKind::CascadeSelect { .. }
            | FieldKind::Signature => false,
        };
        self.required && !optional_kind && self.is_visible(values)
    }

    pub fn is_filled(&self, values: &Record) -> bool {
        values
            .get(&self.name)
            .is_some_and(|value| !value.trim().is_empty())
    }

    /// Whether `value` is acceptable for this field. Choice fields only take
    /// their listed options; free-form fields take anything.
    pub fn accepts(&self, value: &str) -> bool {
        match &self.kind {
            FieldKind::Radio { options } => options.iter().any(|o| o == value),
            FieldKind::Checkbox { options } => value
                .split(CHECKBOX_SEPARATOR)
                .all(|part| options.iter().any(|o| o == part)),
            // Counts: whole numbers from zero up
            FieldKind::Number => value.trim().parse::<u64>().is_ok(),
            FieldKind::Text
            | FieldKind::Tel
            | FieldKind::Email
            | FieldKind::Date
            | FieldKind::Textarea
            | FieldKind::CascadeSelect { .. }
            | FieldKind::Signature
            | FieldKind::Gps => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    pub sections: Vec<Section>,
}

impl FormSchema {
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: FormSchema = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("Failed to parse form schema: {}", e)))?;
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        let mut levels = std::collections::HashSet::new();
        for field in self.fields() {
            if !seen.insert(field.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "field '{}' is defined twice",
                    field.name
                )));
            }
            if is_reserved_field(&field.name) {
                return Err(EngineError::Config(format!(
                    "field name '{}' is reserved for submission metadata",
                    field.name
                )));
            }
            if let FieldKind::CascadeSelect { cascade_level } = field.kind {
                if !levels.insert(cascade_level) {
                    return Err(EngineError::Config(format!(
                        "field '{}' is a second {} selector",
                        field.name,
                        cascade_level.field_name()
                    )));
                }
            }
        }
        for field in self.fields() {
            if let Some(condition) = &field.conditional {
                if self.field(&condition.field).is_none() {
                    return Err(EngineError::Config(format!(
                        "field '{}' depends on unknown field '{}'",
                        field.name, condition.field
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.sections.iter().flat_map(|s| s.fields.iter())
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields().find(|f| f.name == name)
    }

    /// Field names the cascade levels are stored under. Levels with no
    /// `cascade_select` field keep their own name.
    pub fn cascade_fields(&self) -> CascadeFields {
        let mut names = CascadeFields::default();
        for field in self.fields() {
            if let FieldKind::CascadeSelect { cascade_level } = field.kind {
                names.set(cascade_level, &field.name);
            }
        }
        names
    }

    /// Missing required fields of a section (1-based), in form order
    pub fn validate_section(&self, section: usize, values: &Record) -> Vec<String> {
        let Some(section) = section.checked_sub(1).and_then(|i| self.sections.get(i)) else {
            return Vec::new();
        };
        section
            .fields
            .iter()
            .filter(|f| f.blocks_when_empty(values) && !f.is_filled(values))
            .map(|f| f.name.clone())
            .collect()
    }

    /// First section (1-based) with a missing required field
    pub fn first_incomplete_section(&self, values: &Record) -> Option<usize> {
        (1..=self.sections.len()).find(|&n| !self.validate_section(n, values).is_empty())
    }

    /// Clear values of conditional fields that are currently hidden.
    /// Repeats until stable, since clearing one field can hide another.
    pub fn clear_hidden(&self, values: &mut Record) {
        loop {
            let hidden: Vec<String> = self
                .fields()
                .filter(|f| !f.is_visible(values) && values.contains_key(&f.name))
                .map(|f| f.name.clone())
                .collect();
            if hidden.is_empty() {
                return;
            }
            for name in hidden {
                values.remove(&name);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SURVEY_SCHEMA: &str = r#"{
        "sections": [
            {
                "title": "Section A: School & Location Profile",
                "description": "School identification and geographic location",
                "fields": [
                    {"name": "school_name", "label": "Name of School", "type": "text"},
                    {"name": "district", "label": "District", "type": "cascade_select", "cascadeLevel": "district"},
                    {"name": "chiefdom", "label": "Chiefdom", "type": "cascade_select", "cascadeLevel": "chiefdom"},
                    {"name": "section", "label": "Section", "type": "cascade_select", "cascadeLevel": "section"},
                    {"name": "facility", "label": "Health Facility", "type": "cascade_select", "cascadeLevel": "facility"}
                ]
            },
            {
                "title": "Section B: Distribution",
                "fields": [
                    {"name": "itns_received", "label": "ITNs received", "type": "number"},
                    {"name": "challenges_encountered", "label": "Any challenges?", "type": "radio", "options": ["Yes", "No"]},
                    {"name": "challenge_types", "label": "Which challenges?", "type": "checkbox",
                     "options": ["Shortage", "Weather", "Other"], "required": true,
                     "conditional": {"field": "challenges_encountered", "value": "Yes"}},
                    {"name": "additional_comments", "label": "Comments", "type": "textarea", "required": false}
                ]
            },
            {
                "title": "Section C: Respondent",
                "fields": [
                    {"name": "respondent_name", "label": "Name of Respondent", "type": "text"},
                    {"name": "respondent_signature", "label": "Signature", "type": "signature"},
                    {"name": "gps_location", "label": "GPS Location", "type": "gps"}
                ]
            }
        ]
    }"#;

    pub(crate) fn survey_schema() -> FormSchema {
        FormSchema::from_json(SURVEY_SCHEMA).unwrap()
    }

    fn values(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_field_kinds_parsed() {
        let schema = survey_schema();
        assert_eq!(schema.section_count(), 3);
        assert_eq!(
            schema.field("chiefdom").unwrap().kind,
            FieldKind::CascadeSelect {
                cascade_level: CascadeLevel::Chiefdom
            }
        );
        assert!(matches!(
            schema.field("challenges_encountered").unwrap().kind,
            FieldKind::Radio { ref options } if options.len() == 2
        ));
        assert!(!schema.field("additional_comments").unwrap().required);
        assert!(schema.field("school_name").unwrap().required);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = FormSchema::from_json(
            r#"{"sections": [{"title": "A", "fields": [{"name": "x", "label": "X", "type": "slider"}]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_dangling_condition_rejected() {
        let err = FormSchema::from_json(
            r#"{"sections": [{"title": "A", "fields": [
                {"name": "x", "label": "X", "type": "text", "conditional": {"field": "ghost", "value": "Yes"}}
            ]}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_conditional_visibility() {
        let schema = survey_schema();
        let field = schema.field("challenge_types").unwrap();
        assert!(!field.is_visible(&values(&[])));
        assert!(!field.is_visible(&values(&[("challenges_encountered", "No")])));
        assert!(field.is_visible(&values(&[("challenges_encountered", "Yes")])));

        let inverse = Condition {
            field: "challenges_encountered".into(),
            value: "Yes".into(),
            inverse: true,
        };
        assert!(inverse.holds(&values(&[("challenges_encountered", "No")])));
        assert!(!inverse.holds(&values(&[])));
    }

    #[test]
    fn test_hidden_required_field_does_not_block() {
        let schema = survey_schema();
        let filled = values(&[("itns_received", "120"), ("challenges_encountered", "No")]);
        assert!(schema.validate_section(2, &filled).is_empty());

        let mut shown = filled.clone();
        shown.insert("challenges_encountered".into(), "Yes".into());
        assert_eq!(schema.validate_section(2, &shown), vec!["challenge_types"]);
    }

    #[test]
    fn test_blank_values_missing() {
        let schema = survey_schema();
        let missing = schema.validate_section(3, &values(&[("respondent_name", "   ")]));
        assert_eq!(missing, vec!["respondent_name", "respondent_signature"]);
    }

    #[test]
    fn test_first_incomplete_section() {
        let schema = survey_schema();
        let mut record = values(&[
            ("school_name", "Kpetema Primary"),
            ("district", "Bo"),
            ("chiefdom", "Badjia"),
            ("section", "Ngelehun"),
            ("facility", "Ngelehun CHC"),
            ("respondent_name", "F. Kamara"),
            ("respondent_signature", "data:image/png;base64,AAAA"),
        ]);
        assert_eq!(schema.first_incomplete_section(&record), Some(2));
        record.insert("itns_received".into(), "80".into());
        record.insert("challenges_encountered".into(), "No".into());
        assert_eq!(schema.first_incomplete_section(&record), None);
        assert!(schema.validate_section(9, &record).is_empty());
    }

    #[test]
    fn test_clear_hidden() {
        let schema = survey_schema();
        let mut record = values(&[
            ("challenges_encountered", "No"),
            ("challenge_types", "Shortage, Weather"),
        ]);
        schema.clear_hidden(&mut record);
        assert!(!record.contains_key("challenge_types"));
        assert_eq!(record["challenges_encountered"], "No");
    }

    #[test]
    fn test_accepts() {
        let schema = survey_schema();
        let checkbox = schema.field("challenge_types").unwrap();
        assert!(checkbox.accepts("Shortage, Other"));
        assert!(!checkbox.accepts("Shortage, Flood"));
        let radio = schema.field("challenges_encountered").unwrap();
        assert!(!radio.accepts("Maybe"));
    }

    #[test]
    fn test_number_accepts_whole_counts_only() {
        let schema = survey_schema();
        let number = schema.field("itns_received").unwrap();
        assert!(number.accepts("42"));
        assert!(number.accepts("0"));
        assert!(number.accepts(" 7 "));
        for bad in ["lots", "-1", "2.5", "inf", "NaN", "1e3", ""] {
            assert!(!number.accepts(bad), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_reserved_field_name_rejected() {
        for name in ["id", "draftId", "timestamp", "form_status"] {
            let json = format!(
                r#"{{"sections": [{{"title": "A", "fields": [{{"name": "{}", "label": "X", "type": "text"}}]}}]}}"#,
                name
            );
            let err = FormSchema::from_json(&json).unwrap_err();
            assert!(err.to_string().contains("reserved"), "{}: {}", name, err);
        }
    }

    #[test]
    fn test_cascade_fields_follow_schema_names() {
        let schema = FormSchema::from_json(
            r#"{"sections": [{"title": "A", "fields": [
                {"name": "school_district", "label": "District", "type": "cascade_select", "cascadeLevel": "district"},
                {"name": "school_chiefdom", "label": "Chiefdom", "type": "cascade_select", "cascadeLevel": "chiefdom"}
            ]}]}"#,
        )
        .unwrap();
        let fields = schema.cascade_fields();
        assert_eq!(fields.name(CascadeLevel::District), "school_district");
        assert_eq!(fields.name(CascadeLevel::Chiefdom), "school_chiefdom");
        assert_eq!(fields.name(CascadeLevel::Section), "section");
        assert_eq!(survey_schema().cascade_fields(), CascadeFields::default());
    }

    #[test]
    fn test_second_selector_for_level_rejected() {
        let err = FormSchema::from_json(
            r#"{"sections": [{"title": "A", "fields": [
                {"name": "home_district", "label": "District", "type": "cascade_select", "cascadeLevel": "district"},
                {"name": "work_district", "label": "District", "type": "cascade_select", "cascadeLevel": "district"}
            ]}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("work_district"));
    }
}
