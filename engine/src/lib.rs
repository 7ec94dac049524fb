//! Survey engine: the offline core of a field data-collection form.
//!
//! - a location hierarchy (district → chiefdom → section → facility) built
//!   from a CSV dataset, driving cascading dropdowns
//! - a form schema with conditional fields and section validation
//! - a draft store and an offline submission queue persisted in
//!   `localStorage`, drained whenever connectivity comes back
//!
//! ## Usage in JavaScript
//!
//! ```javascript
//! import init, { init_engine, get_districts, select_location, submit_form } from 'survey-engine';
//!
//! await init();
//! init_engine(await (await fetch('cascading_data.csv')).text(), schemaJson, configJson);
//! const districts = JSON.parse(get_districts());
//! const levels = JSON.parse(select_location('district', districts[0]));
//!
//! const post = (body) => fetch(url, { method: 'POST', body });
//! const outcome = await submit_form(post); // "sent" | "queued"
//! window.addEventListener('online', () => set_online(true) && sync_pending(post));
//! ```

use std::cell::RefCell;
use wasm_bindgen::prelude::*;

pub mod build;
pub mod config;
pub mod drafts;
pub mod error;
pub mod hierarchy;
pub mod log;
pub mod parse;
pub mod queue;
pub mod schema;
pub mod session;
pub mod storage;
pub mod transport;
pub mod types;

use crate::config::EngineConfig;
use crate::hierarchy::CascadeLevel;
use crate::schema::FormSchema;
use crate::session::FormSession;
use crate::storage::PlatformStorage;
use crate::transport::JsTransport;
use crate::types::{DrainResult, GpsFix};

type Engine = FormSession<PlatformStorage>;

// Use thread_local with RefCell for lazy initialization from JS
thread_local! {
    static ENGINE: RefCell<Option<Engine>> = const { RefCell::new(None) };
}

const NOT_INITIALIZED: &str =
    "Engine not initialized. Call init_engine(dataset_csv, schema_json, config_json) first.";

/// Run `f` against the initialized engine. The borrow ends when `f`
/// returns, so nothing may hold it across an await.
fn with_engine<T>(f: impl FnOnce(&mut Engine) -> Result<T, JsError>) -> Result<T, JsError> {
    ENGINE.with(|engine| {
        let mut engine_ref = engine.borrow_mut();
        match engine_ref.as_mut() {
            Some(eng) => f(eng),
            None => Err(JsError::new(NOT_INITIALIZED)),
        }
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value)
        .map_err(|e| JsError::new(&format!("Failed to serialize result: {}", e)))
}

fn parse_level(level: &str) -> Result<CascadeLevel, JsError> {
    CascadeLevel::from_name(level)
        .ok_or_else(|| JsError::new(&format!("Unknown cascade level '{}'", level)))
}

/// Initialize the engine.
/// dataset_csv: location rows with adm1/adm2/adm3/hf columns (names configurable)
/// schema_json: FormSchema (sections of typed fields)
/// config_json: EngineConfig, may be empty for defaults
///
/// An unusable dataset does not fail initialization: the index is left empty
/// and only the district level is ever enabled.
#[wasm_bindgen]
pub fn init_engine(dataset_csv: &str, schema_json: &str, config_json: &str) -> Result<(), JsError> {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    let config = EngineConfig::from_json(config_json)?;
    let schema = FormSchema::from_json(schema_json)?;
    let index = build::load_index(dataset_csv, &config.columns);

    let session = FormSession::new(config, schema, index, PlatformStorage::default());
    crate::console_log!(
        "Engine ready: {} pending submission(s), {} draft(s)",
        session.queue().len(),
        session.drafts().len()
    );

    ENGINE.with(|engine| {
        *engine.borrow_mut() = Some(session);
    });

    Ok(())
}

/// Check if the engine has been initialized
#[wasm_bindgen]
pub fn is_engine_ready() -> bool {
    ENGINE.with(|engine| engine.borrow().is_some())
}

/// Whether the location dataset produced any districts
#[wasm_bindgen]
pub fn is_location_data_loaded() -> Result<bool, JsError> {
    with_engine(|eng| Ok(!eng.index().is_empty()))
}

#[wasm_bindgen]
pub fn get_districts() -> Result<String, JsError> {
    with_engine(|eng| to_json(&eng.index().districts()))
}

#[wasm_bindgen]
pub fn get_chiefdoms(district: &str) -> Result<String, JsError> {
    with_engine(|eng| to_json(&eng.index().chiefdoms(district)))
}

#[wasm_bindgen]
pub fn get_sections(district: &str, chiefdom: &str) -> Result<String, JsError> {
    with_engine(|eng| to_json(&eng.index().sections(district, chiefdom)))
}

#[wasm_bindgen]
pub fn get_facilities(district: &str, chiefdom: &str, section: &str) -> Result<String, JsError> {
    with_engine(|eng| to_json(&eng.index().facilities(district, chiefdom, section)))
}

/// Select a value at one cascade level and return the state of all four
/// levels (value, enabled, options) as JSON
#[wasm_bindgen]
pub fn select_location(level: &str, value: &str) -> Result<String, JsError> {
    let level = parse_level(level)?;
    with_engine(|eng| {
        if !eng.select_location(level, value) {
            crate::console_warn!("[cascade] '{}' is not a valid {}", value, level.field_name());
        }
        to_json(&eng.cascade_states())
    })
}

#[wasm_bindgen]
pub fn get_cascade_state() -> Result<String, JsError> {
    with_engine(|eng| to_json(&eng.cascade_states()))
}

#[wasm_bindgen]
pub fn set_field(name: &str, value: &str) -> Result<(), JsError> {
    with_engine(|eng| Ok(eng.set_value(name, value)?))
}

#[wasm_bindgen]
pub fn toggle_checkbox(name: &str, option: &str, checked: bool) -> Result<(), JsError> {
    with_engine(|eng| Ok(eng.toggle_checkbox(name, option, checked)?))
}

/// Current field values as a JSON object
#[wasm_bindgen]
pub fn get_values() -> Result<String, JsError> {
    with_engine(|eng| to_json(&eng.values()))
}

/// Store a position fix; returns the display summary
#[wasm_bindgen]
pub fn record_gps(latitude: f64, longitude: f64, accuracy: f64, timestamp: &str) -> Result<String, JsError> {
    let fix = GpsFix {
        latitude,
        longitude,
        accuracy,
        timestamp: timestamp.to_string(),
    };
    let summary = fix.summary();
    with_engine(|eng| {
        eng.record_gps(fix);
        Ok(summary)
    })
}

/// Advance to the next section; fails listing the missing fields
#[wasm_bindgen]
pub fn next_section() -> Result<usize, JsError> {
    with_engine(|eng| Ok(eng.next_section()?))
}

#[wasm_bindgen]
pub fn previous_section() -> Result<usize, JsError> {
    with_engine(|eng| Ok(eng.previous_section()))
}

#[wasm_bindgen]
pub fn get_current_section() -> Result<usize, JsError> {
    with_engine(|eng| Ok(eng.current_section()))
}

#[wasm_bindgen]
pub fn get_progress() -> Result<f64, JsError> {
    with_engine(|eng| Ok(eng.progress()))
}

#[wasm_bindgen]
pub fn get_form_status() -> Result<String, JsError> {
    with_engine(|eng| Ok(eng.status().as_str().to_string()))
}

#[wasm_bindgen]
pub fn finalize_form() -> Result<(), JsError> {
    with_engine(|eng| Ok(eng.finalize()?))
}

/// Save the form as a draft; returns the draft id
#[wasm_bindgen]
pub fn save_draft(name: &str) -> Result<String, JsError> {
    with_engine(|eng| Ok(eng.save_draft(name)?))
}

#[wasm_bindgen]
pub fn load_draft(draft_id: &str) -> Result<(), JsError> {
    with_engine(|eng| Ok(eng.load_draft(draft_id)?))
}

#[wasm_bindgen]
pub fn delete_draft(draft_id: &str) -> Result<bool, JsError> {
    with_engine(|eng| Ok(eng.delete_draft(draft_id)?))
}

/// Saved drafts, newest first, as a JSON array
#[wasm_bindgen]
pub fn list_drafts() -> Result<String, JsError> {
    with_engine(|eng| to_json(&eng.drafts().list()))
}

#[wasm_bindgen]
pub fn get_draft_count() -> Result<usize, JsError> {
    with_engine(|eng| Ok(eng.drafts().len()))
}

#[wasm_bindgen]
pub fn get_pending_count() -> Result<usize, JsError> {
    with_engine(|eng| Ok(eng.queue().len()))
}

/// Report a connectivity change. Returns true when pending submissions
/// should be synced now.
#[wasm_bindgen]
pub fn set_online(online: bool) -> Result<bool, JsError> {
    with_engine(|eng| Ok(eng.set_online(online)))
}

/// Submit the finalized form through `submit(json) => Promise`.
/// Resolves to "sent", or "queued" when offline or the send failed.
#[wasm_bindgen]
pub async fn submit_form(submit: js_sys::Function) -> Result<String, JsError> {
    let (record, online) = with_engine(|eng| Ok((eng.submission_record()?, eng.is_online())))?;
    let delivered = session::try_send(&record, online, &mut JsTransport::new(submit)).await;
    let outcome = with_engine(|eng| Ok(eng.complete_submission(record, delivered)?))?;
    to_json(&outcome)
}

/// Deliver every pending submission through `submit(json) => Promise`.
/// Entries queued while this runs are left for the next call.
/// Resolves to a JSON DrainResult.
#[wasm_bindgen]
pub async fn sync_pending(submit: js_sys::Function) -> Result<String, JsError> {
    let snapshot = with_engine(|eng| Ok(eng.queue().snapshot()))?;
    if snapshot.is_empty() {
        return to_json(&DrainResult::default());
    }

    let start = js_sys::Date::now();
    let delivered = queue::deliver(&snapshot, &mut JsTransport::new(submit)).await;
    let result = with_engine(|eng| Ok(eng.queue_mut().settle(snapshot.len(), &delivered)))?;

    crate::console_log!(
        "[perf] sync removed={} failed={} | total={:.1}ms",
        result.removed,
        result.failed,
        js_sys::Date::now() - start
    );
    to_json(&result)
}

/// Submission endpoint from the config, for the host's `submit` callback
#[wasm_bindgen]
pub fn get_endpoint_url() -> Result<String, JsError> {
    with_engine(|eng| Ok(eng.config().endpoint_url.clone()))
}
