use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

use crate::error::{EngineError, Result};
use crate::types::Record;

/// Delivers one record to the collection endpoint.
///
/// Only success or failure matters; response bodies are never inspected.
/// Timeouts are the implementation's business.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn submit(&mut self, record: &Record) -> Result<()>;
}

/// Transport backed by a JavaScript callback: `(json: string) => Promise`.
/// A rejected promise, a thrown exception or a resolved `false` counts as
/// a failure; anything else is success.
pub struct JsTransport {
    callback: js_sys::Function,
}

impl JsTransport {
    pub fn new(callback: js_sys::Function) -> Self {
        JsTransport { callback }
    }
}

fn js_failure(value: JsValue) -> EngineError {
    EngineError::Transport(value.as_string().unwrap_or_else(|| format!("{:?}", value)))
}

impl Transport for JsTransport {
    async fn submit(&mut self, record: &Record) -> Result<()> {
        let body = serde_json::to_string(record)?;
        let returned = self
            .callback
            .call1(&JsValue::NULL, &JsValue::from_str(&body))
            .map_err(js_failure)?;

        let settled = match returned.dyn_into::<js_sys::Promise>() {
            Ok(promise) => JsFuture::from(promise).await.map_err(js_failure)?,
            Err(value) => value,
        };

        if settled.as_bool() == Some(false) {
            return Err(EngineError::Transport("endpoint rejected the record".into()));
        }
        Ok(())
    }
}

#[cfg(feature = "native")]
pub use http::HttpTransport;

#[cfg(feature = "native")]
mod http {
    use super::Transport;
    use crate::config::EngineConfig;
    use crate::error::{EngineError, Result};
    use crate::types::Record;

    /// Posts each record as a JSON body to the configured endpoint.
    /// Native builds only; the request blocks the calling thread.
    pub struct HttpTransport {
        client: reqwest::blocking::Client,
        endpoint: String,
    }

    impl HttpTransport {
        pub fn new(endpoint: impl Into<String>) -> Self {
            HttpTransport {
                client: reqwest::blocking::Client::new(),
                endpoint: endpoint.into(),
            }
        }

        /// Transport for `config.endpoint_url`, which must be set
        pub fn from_config(config: &EngineConfig) -> Result<Self> {
            let endpoint = config.endpoint_url.trim();
            if endpoint.is_empty() {
                return Err(EngineError::Config("endpointUrl is not set".into()));
            }
            Ok(HttpTransport::new(endpoint))
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }
    }

    impl Transport for HttpTransport {
        async fn submit(&mut self, record: &Record) -> Result<()> {
            self.client
                .post(&self.endpoint)
                .json(record)
                .send()
                .and_then(|response| response.error_for_status())
                .map_err(|e| EngineError::Transport(e.to_string()))?;
            Ok(())
        }
    }

}
