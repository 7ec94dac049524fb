use crate::error::Result;
use crate::storage::{load_entries, Storage};
use crate::types::{strip_keys, Draft};

/// Saved drafts keyed by `draftId`, persisted as one JSON array.
/// Saving an existing id replaces that draft; last write wins.
pub struct DraftStore<S: Storage> {
    storage: S,
    key: String,
    drafts: Vec<Draft>,
}

impl<S: Storage> DraftStore<S> {
    pub fn open(storage: S, key: impl Into<String>) -> Self {
        let key = key.into();
        let drafts = load_entries(&storage, &key, "drafts");

        DraftStore {
            storage,
            key,
            drafts,
        }
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    pub fn get(&self, draft_id: &str) -> Option<&Draft> {
        self.drafts.iter().find(|d| d.draft_id == draft_id)
    }

    /// Drafts newest first, the order the drafts list shows them in
    pub fn list(&self) -> Vec<&Draft> {
        let mut drafts: Vec<&Draft> = self.drafts.iter().collect();
        drafts.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        drafts
    }

    /// Insert or replace by `draftId`. Form fields named like the draft's
    /// own keys are dropped so the stored object stays readable.
    pub fn save(&mut self, mut draft: Draft) -> Result<()> {
        for key in strip_keys(&mut draft.fields, &Draft::KEYS) {
            crate::console_warn!("[drafts] dropping field '{}' that clashes with a draft key", key);
        }
        match self.drafts.iter_mut().find(|d| d.draft_id == draft.draft_id) {
            Some(existing) => *existing = draft,
            None => self.drafts.push(draft),
        }
        self.persist()
    }

    /// Remove a draft. Returns whether it existed.
    pub fn delete(&mut self, draft_id: &str) -> Result<bool> {
        let before = self.drafts.len();
        self.drafts.retain(|d| d.draft_id != draft_id);
        if self.drafts.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn persist(&mut self) -> Result<()> {
        let blob = serde_json::to_string(&self.drafts)?;
        self.storage.save(&self.key, &blob)
    }
}
