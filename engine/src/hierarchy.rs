use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::Record;

/// Facilities under one section, deduplicated and sorted at build time
pub type FacilityList = Vec<String>;

/// Section name -> facilities
pub type SectionMap = HashMap<String, FacilityList>;

/// Chiefdom name -> sections
pub type ChiefdomMap = HashMap<String, SectionMap>;

/// District name -> chiefdoms
pub type DistrictMap = HashMap<String, ChiefdomMap>;

/// The four cascade levels, top to bottom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadeLevel {
    District = 0,
    Chiefdom = 1,
    Section = 2,
    Facility = 3,
}

impl CascadeLevel {
    pub const ALL: [CascadeLevel; 4] = [
        CascadeLevel::District,
        CascadeLevel::Chiefdom,
        CascadeLevel::Section,
        CascadeLevel::Facility,
    ];

    /// Form field the level is stored under
    pub fn field_name(&self) -> &'static str {
        match self {
            CascadeLevel::District => "district",
            CascadeLevel::Chiefdom => "chiefdom",
            CascadeLevel::Section => "section",
            CascadeLevel::Facility => "facility",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        CascadeLevel::ALL
            .into_iter()
            .find(|level| level.field_name() == name)
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Form field each cascade level is stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeFields {
    names: [String; 4],
}

impl Default for CascadeFields {
    fn default() -> Self {
        CascadeFields {
            names: CascadeLevel::ALL.map(|level| level.field_name().to_string()),
        }
    }
}

impl CascadeFields {
    pub fn name(&self, level: CascadeLevel) -> &str {
        &self.names[level.index()]
    }

    pub fn set(&mut self, level: CascadeLevel, name: &str) {
        self.names[level.index()] = name.to_string();
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Location tree: district -> chiefdom -> section -> facilities.
/// Built once per session by `build::build_index` and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyIndex {
    pub(crate) tree: DistrictMap,
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}

impl HierarchyIndex {
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn district_count(&self) -> usize {
        self.tree.len()
    }

    pub fn districts(&self) -> Vec<String> {
        sorted_keys(&self.tree)
    }

    pub fn chiefdoms(&self, district: &str) -> Vec<String> {
        self.tree.get(district).map(sorted_keys).unwrap_or_default()
    }

    pub fn sections(&self, district: &str, chiefdom: &str) -> Vec<String> {
        self.tree
            .get(district)
            .and_then(|chiefdoms| chiefdoms.get(chiefdom))
            .map(sorted_keys)
            .unwrap_or_default()
    }

    pub fn facilities(&self, district: &str, chiefdom: &str, section: &str) -> Vec<String> {
        self.tree
            .get(district)
            .and_then(|chiefdoms| chiefdoms.get(chiefdom))
            .and_then(|sections| sections.get(section))
            .cloned()
            .unwrap_or_default()
    }
}

/// Options and current value of one cascade level, as shown to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelState {
    pub level: CascadeLevel,
    pub value: Option<String>,
    /// Disabled levels carry no options
    pub enabled: bool,
    pub options: Vec<String>,
}

/// The surveyor's current pick at each level.
///
/// Changing a level always clears every level below it, and a value that is
/// not a child of the level above is rejected, which leaves that level and
/// everything below empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeSelection {
    values: [Option<String>; 4],
}

impl CascadeSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, level: CascadeLevel) -> Option<&str> {
        self.values[level.index()].as_deref()
    }

    /// Options for `level`, or `None` while the level is disabled
    pub fn options(&self, level: CascadeLevel, index: &HierarchyIndex) -> Option<Vec<String>> {
        let district = self.value(CascadeLevel::District);
        let chiefdom = self.value(CascadeLevel::Chiefdom);
        let section = self.value(CascadeLevel::Section);

        match level {
            CascadeLevel::District => Some(index.districts()),
            CascadeLevel::Chiefdom => district.map(|d| index.chiefdoms(d)),
            CascadeLevel::Section => match (district, chiefdom) {
                (Some(d), Some(c)) => Some(index.sections(d, c)),
                _ => None,
            },
            CascadeLevel::Facility => match (district, chiefdom, section) {
                (Some(d), Some(c), Some(s)) => Some(index.facilities(d, c, s)),
                _ => None,
            },
        }
    }

    /// Select `value` at `level`. Returns whether the value was accepted;
    /// a blank value simply clears the level.
    pub fn select(&mut self, level: CascadeLevel, value: &str, index: &HierarchyIndex) -> bool {
        self.clear_from(level);

        let value = value.trim();
        if value.is_empty() {
            return true;
        }

        let valid = self
            .options(level, index)
            .is_some_and(|options| options.iter().any(|o| o == value));
        if valid {
            self.values[level.index()] = Some(value.to_string());
        }
        valid
    }

    /// Reapply a saved selection top-down, stopping at the first level
    /// that no longer resolves.
    pub fn restore(&mut self, record: &Record, fields: &CascadeFields, index: &HierarchyIndex) {
        self.clear_from(CascadeLevel::District);
        for level in CascadeLevel::ALL {
            let Some(value) = record.get(fields.name(level)).filter(|v| !v.trim().is_empty())
            else {
                break;
            };
            if !self.select(level, value, index) {
                crate::console_warn!(
                    "[cascade] saved {} '{}' is not in the location data",
                    fields.name(level),
                    value
                );
                break;
            }
        }
    }

    pub fn clear(&mut self) {
        self.clear_from(CascadeLevel::District);
    }

    fn clear_from(&mut self, level: CascadeLevel) {
        for slot in &mut self.values[level.index()..] {
            *slot = None;
        }
    }

    /// Write the selected values into a record; unselected levels are blank
    pub fn apply_to(&self, record: &mut Record, fields: &CascadeFields) {
        for level in CascadeLevel::ALL {
            record.insert(
                fields.name(level).to_string(),
                self.value(level).unwrap_or_default().to_string(),
            );
        }
    }

    pub fn states(&self, index: &HierarchyIndex) -> Vec<LevelState> {
        CascadeLevel::ALL
            .into_iter()
            .map(|level| {
                let options = self.options(level, index);
                LevelState {
                    level,
                    value: self.value(level).map(str::to_string),
                    enabled: options.is_some(),
                    options: options.unwrap_or_default(),
                }
            })
            .collect()
    }
}
