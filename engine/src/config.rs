use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Dataset header names for the four hierarchy levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub district: String,
    pub chiefdom: String,
    pub section: String,
    pub facility: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        ColumnNames {
            district: "adm1".to_string(),
            chiefdom: "adm2".to_string(),
            section: "adm3".to_string(),
            facility: "hf".to_string(),
        }
    }
}

/// Engine configuration handed over by the host page at startup.
/// Every field is optional in the JSON; missing ones take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Endpoint submissions are posted to: read by the native HTTP
    /// transport, and handed back to the host page through `get_endpoint_url`
    pub endpoint_url: String,
    /// Storage key holding the pending submission queue
    pub queue_key: String,
    /// Storage key holding the draft store
    pub drafts_key: String,
    /// Value written to `submittedBy` / `savedBy`
    pub submitted_by: String,
    pub columns: ColumnNames,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            endpoint_url: String::new(),
            queue_key: "pendingSubmissions_itn".to_string(),
            drafts_key: "formDrafts_itn".to_string(),
            submitted_by: "surveyor".to_string(),
            columns: ColumnNames::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config; an empty string yields the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Ok(EngineConfig::default());
        }
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.queue_key.is_empty() || self.drafts_key.is_empty() {
            return Err(EngineError::Config("storage keys must not be empty".into()));
        }
        if self.queue_key == self.drafts_key {
            return Err(EngineError::Config(format!(
                "queue and drafts share the storage key '{}'",
                self.queue_key
            )));
        }
        Ok(())
    }
}
