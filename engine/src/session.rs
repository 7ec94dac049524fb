use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::drafts::DraftStore;
use crate::error::{EngineError, Result};
use crate::hierarchy::{CascadeFields, CascadeLevel, CascadeSelection, HierarchyIndex, LevelState};
use crate::queue::OfflineQueue;
use crate::schema::{FieldKind, FormSchema, CHECKBOX_SEPARATOR};
use crate::storage::Storage;
use crate::transport::Transport;
use crate::types::{
    new_draft_id, now_iso, Draft, DrainResult, FormStatus, GpsFix, Record, FORM_STATUS_FIELD,
};

/// Where a submitted record ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitOutcome {
    Sent,
    Queued,
}

/// Draft currently open in the form
#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenDraft {
    id: String,
    name: String,
}

/// One form-filling session: owns the location index, the cascade
/// selection, the field values, the pending queue and the draft store.
pub struct FormSession<S: Storage + Clone> {
    config: EngineConfig,
    schema: FormSchema,
    index: HierarchyIndex,
    cascade_fields: CascadeFields,
    cascade: CascadeSelection,
    values: Record,
    gps: Option<GpsFix>,
    status: FormStatus,
    current_section: usize,
    open_draft: Option<OpenDraft>,
    online: bool,
    queue: OfflineQueue<S>,
    drafts: DraftStore<S>,
}

impl<S: Storage + Clone> FormSession<S> {
    pub fn new(config: EngineConfig, schema: FormSchema, index: HierarchyIndex, storage: S) -> Self {
        let queue = OfflineQueue::open(storage.clone(), config.queue_key.clone());
        let drafts = DraftStore::open(storage, config.drafts_key.clone());

        FormSession {
            config,
            cascade_fields: schema.cascade_fields(),
            schema,
            index,
            cascade: CascadeSelection::new(),
            values: Record::new(),
            gps: None,
            status: FormStatus::Draft,
            current_section: 1,
            open_draft: None,
            online: true,
            queue,
            drafts,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &HierarchyIndex {
        &self.index
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn status(&self) -> FormStatus {
        self.status
    }

    pub fn current_section(&self) -> usize {
        self.current_section
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn queue(&self) -> &OfflineQueue<S> {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut OfflineQueue<S> {
        &mut self.queue
    }

    pub fn drafts(&self) -> &DraftStore<S> {
        &self.drafts
    }

    pub fn open_draft_id(&self) -> Option<&str> {
        self.open_draft.as_ref().map(|d| d.id.as_str())
    }

    pub fn open_draft_name(&self) -> Option<&str> {
        self.open_draft.as_ref().map(|d| d.name.as_str())
    }

    // ------------------------------------------------------------------
    // Field values
    // ------------------------------------------------------------------

    /// All current values: plain fields, the cascade selection and the GPS fix
    pub fn values(&self) -> Record {
        let mut record = self.values.clone();
        self.cascade.apply_to(&mut record, &self.cascade_fields);
        if let Some(fix) = &self.gps {
            fix.apply_to(&mut record);
        }
        record
    }

    /// Set a field. Cascade fields go through the location cascade; a blank
    /// value clears the field. Fields whose condition stops holding are
    /// cleared.
    pub fn set_value(&mut self, name: &str, value: &str) -> Result<()> {
        let field = self
            .schema
            .field(name)
            .ok_or_else(|| EngineError::UnknownField(name.to_string()))?;

        if let FieldKind::CascadeSelect { cascade_level } = field.kind {
            return if self.select_location(cascade_level, value) {
                Ok(())
            } else {
                Err(EngineError::InvalidValue {
                    field: name.to_string(),
                    value: value.to_string(),
                })
            };
        }

        if value.trim().is_empty() {
            self.values.remove(name);
        } else if field.accepts(value) {
            self.values.insert(name.to_string(), value.to_string());
        } else {
            return Err(EngineError::InvalidValue {
                field: name.to_string(),
                value: value.to_string(),
            });
        }

        self.schema.clear_hidden(&mut self.values);
        Ok(())
    }

    /// Tick or untick one option of a checkbox group. The stored value keeps
    /// the options in schema order.
    pub fn toggle_checkbox(&mut self, name: &str, option: &str, checked: bool) -> Result<()> {
        let field = self
            .schema
            .field(name)
            .ok_or_else(|| EngineError::UnknownField(name.to_string()))?;
        let FieldKind::Checkbox { options } = &field.kind else {
            return Err(EngineError::InvalidValue {
                field: name.to_string(),
                value: option.to_string(),
            });
        };
        if !options.iter().any(|o| o == option) {
            return Err(EngineError::InvalidValue {
                field: name.to_string(),
                value: option.to_string(),
            });
        }

        let current: Vec<&str> = self
            .values
            .get(name)
            .map(|v| v.split(CHECKBOX_SEPARATOR).collect())
            .unwrap_or_default();
        let joined = options
            .iter()
            .filter(|o| {
                if o.as_str() == option {
                    checked
                } else {
                    current.contains(&o.as_str())
                }
            })
            .cloned()
            .collect::<Vec<_>>()
            .join(CHECKBOX_SEPARATOR);

        if joined.is_empty() {
            self.values.remove(name);
        } else {
            self.values.insert(name.to_string(), joined);
        }
        Ok(())
    }

    /// Select a location level; returns whether the value was accepted
    pub fn select_location(&mut self, level: CascadeLevel, value: &str) -> bool {
        self.cascade.select(level, value, &self.index)
    }

    pub fn cascade_states(&self) -> Vec<LevelState> {
        self.cascade.states(&self.index)
    }

    pub fn record_gps(&mut self, fix: GpsFix) {
        crate::console_log!("[gps] {}", fix.summary());
        self.gps = Some(fix);
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Advance when the current section is complete
    pub fn next_section(&mut self) -> Result<usize> {
        let missing = self
            .schema
            .validate_section(self.current_section, &self.values());
        if !missing.is_empty() {
            return Err(EngineError::Incomplete {
                section: self.current_section,
                missing,
            });
        }
        if self.current_section < self.schema.section_count() {
            self.current_section += 1;
        }
        Ok(self.current_section)
    }

    pub fn previous_section(&mut self) -> usize {
        if self.current_section > 1 {
            self.current_section -= 1;
        }
        self.current_section
    }

    /// Percentage of the way through the sections
    pub fn progress(&self) -> f64 {
        match self.schema.section_count() {
            0 => 0.0,
            total => self.current_section as f64 / total as f64 * 100.0,
        }
    }

    // ------------------------------------------------------------------
    // Drafts
    // ------------------------------------------------------------------

    /// Save the form under `name`, reusing the open draft's id if any
    pub fn save_draft(&mut self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::EmptyDraftName);
        }

        let draft_id = self
            .open_draft
            .as_ref()
            .map(|d| d.id.clone())
            .unwrap_or_else(new_draft_id);

        self.drafts.save(Draft {
            draft_id: draft_id.clone(),
            draft_name: name.to_string(),
            saved_at: now_iso(),
            saved_by: self.config.submitted_by.clone(),
            form_status: FormStatus::Draft,
            current_section: self.current_section,
            fields: self.values(),
        })?;

        self.open_draft = Some(OpenDraft {
            id: draft_id.clone(),
            name: name.to_string(),
        });
        crate::console_log!("[drafts] saved '{}' as {}", name, draft_id);
        Ok(draft_id)
    }

    /// Replace the form contents with a saved draft. A loaded draft is
    /// always back in draft status and has to be finalized again.
    pub fn load_draft(&mut self, draft_id: &str) -> Result<()> {
        let draft = self
            .drafts
            .get(draft_id)
            .cloned()
            .ok_or_else(|| EngineError::DraftNotFound(draft_id.to_string()))?;

        self.clear_form(false);
        self.cascade
            .restore(&draft.fields, &self.cascade_fields, &self.index);

        self.values = draft.fields;
        for name in self.cascade_fields.names() {
            self.values.remove(name);
        }

        self.status = FormStatus::Draft;
        self.current_section = draft
            .current_section
            .clamp(1, self.schema.section_count().max(1));
        self.open_draft = Some(OpenDraft {
            id: draft.draft_id,
            name: draft.draft_name,
        });
        Ok(())
    }

    /// Delete a draft; forgets it as the open draft when it was the one loaded
    pub fn delete_draft(&mut self, draft_id: &str) -> Result<bool> {
        let deleted = self.drafts.delete(draft_id)?;
        if self.open_draft_id() == Some(draft_id) {
            self.open_draft = None;
        }
        Ok(deleted)
    }

    // ------------------------------------------------------------------
    // Finalize and submit
    // ------------------------------------------------------------------

    /// Check every section and mark the form finalized. On failure the
    /// cursor moves to the first incomplete section. A form that already has
    /// a draft name is re-saved under it.
    pub fn finalize(&mut self) -> Result<()> {
        let values = self.values();
        if let Some(section) = self.schema.first_incomplete_section(&values) {
            self.current_section = section;
            return Err(EngineError::Incomplete {
                section,
                missing: self.schema.validate_section(section, &values),
            });
        }

        self.status = FormStatus::Finalized;
        if let Some(name) = self.open_draft_name().map(str::to_string) {
            self.save_draft(&name)?;
        }
        Ok(())
    }

    /// The record to send for a finalized form
    pub fn submission_record(&self) -> Result<Record> {
        if self.status != FormStatus::Finalized {
            return Err(EngineError::NotFinalized);
        }
        let mut record = self.values();
        record.insert("timestamp".to_string(), now_iso());
        record.insert("submittedBy".to_string(), self.config.submitted_by.clone());
        record.insert(
            FORM_STATUS_FIELD.to_string(),
            FormStatus::Submitted.as_str().to_string(),
        );
        Ok(record)
    }

    /// Second half of a submission once the send attempt is over (or was
    /// skipped while offline): queue the record unless it was delivered,
    /// drop the open draft and reset the form.
    pub fn complete_submission(&mut self, record: Record, delivered: bool) -> Result<SubmitOutcome> {
        let outcome = if delivered {
            SubmitOutcome::Sent
        } else {
            self.queue.enqueue(record)?;
            SubmitOutcome::Queued
        };

        if let Some(draft) = self.open_draft.take() {
            if let Err(e) = self.drafts.delete(&draft.id) {
                crate::console_warn!("[drafts] could not remove submitted draft {}: {}", draft.id, e);
            }
        }
        self.clear_form(true);
        Ok(outcome)
    }

    /// Submit the finalized form: send it now when online, queue it when
    /// offline or when the send fails.
    pub async fn submit<T: Transport>(&mut self, transport: &mut T) -> Result<SubmitOutcome> {
        let record = self.submission_record()?;
        let delivered = try_send(&record, self.online, transport).await;
        self.complete_submission(record, delivered)
    }

    /// Record a connectivity change. Returns true when the session just came
    /// back online with submissions waiting, i.e. a sync should run.
    pub fn set_online(&mut self, online: bool) -> bool {
        let reconnected = online && !self.online;
        self.online = online;
        reconnected && !self.queue.is_empty()
    }

    /// Push every pending submission through `transport`
    pub async fn sync<T: Transport>(&mut self, transport: &mut T) -> DrainResult {
        if self.queue.is_empty() {
            return DrainResult::default();
        }
        let result = self.queue.drain(transport).await;
        crate::console_log!(
            "[queue] synced {} submission(s), {} still pending",
            result.removed,
            self.queue.len()
        );
        result
    }

    /// Reset every field. With `reset_status` the form also returns to
    /// draft status and forgets the open draft.
    pub fn clear_form(&mut self, reset_status: bool) {
        self.values.clear();
        self.cascade.clear();
        self.gps = None;
        self.current_section = 1;
        if reset_status {
            self.status = FormStatus::Draft;
            self.open_draft = None;
        }
    }
}

/// Send a record now unless offline. Returns whether it was delivered; a
/// failed send is logged and left to `complete_submission` to queue.
pub async fn try_send<T: Transport>(record: &Record, online: bool, transport: &mut T) -> bool {
    if !online {
        return false;
    }
    match transport.submit(record).await {
        Ok(()) => true,
        Err(e) => {
            crate::console_warn!("Submit error: {}. Saved offline", e);
            false
        }
    }
}
