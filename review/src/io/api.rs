//! Reviewing agent API.
//!
//! The [`ReviewApi`] trait decouples the review flow from the HTTP backend
//! (currently an OpenAI-compatible Responses API). Tests use a scripted
//! implementation that returns canned payloads without touching the network.

use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, multipart};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::error::{Result, ReviewError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(300);
const DELETE_TIMEOUT: Duration = Duration::from_secs(60);

/// Operations the review flow needs from the reviewing agent.
pub trait ReviewApi {
    /// Upload the bundle and return its file id.
    fn upload_file(&self, path: &Path) -> Result<String>;
    /// Create a response (job) and return the raw payload.
    fn create_response(&self, payload: &Value) -> Result<Value>;
    /// Fetch the current state of a response.
    fn get_response(&self, response_id: &str) -> Result<Value>;
    /// Delete an uploaded file. Callers treat failure as non-fatal.
    fn delete_file(&self, file_id: &str) -> Result<()>;
}

/// Build the create-response request body.
pub fn build_response_payload(model: &str, prompt: &str, file_id: &str, background: bool) -> Value {
    json!({
        "model": model,
        "input": [
            {
                "role": "user",
                "content": [
                    {"type": "input_text", "text": prompt},
                    {"type": "input_file", "file_id": file_id},
                ],
            }
        ],
        "tools": [{"type": "code_interpreter"}],
        "temperature": 0,
        "background": background,
    })
}

/// Required `id` field of an API payload.
pub fn payload_id(payload: &Value, operation: &'static str) -> Result<String> {
    payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ReviewError::MalformedResponse {
            operation,
            detail: format!("missing id in {payload}"),
        })
}

/// Blocking client for an OpenAI-compatible API.
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("repo-review/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send_json(&self, request: RequestBuilder, operation: &'static str) -> Result<Value> {
        let response = request.bearer_auth(&self.api_key).send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ReviewError::RemoteRequestFailed {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl ReviewApi for OpenAiClient {
    #[instrument(skip_all, fields(path = %path.display()))]
    fn upload_file(&self, path: &Path) -> Result<String> {
        let bytes =
            fs::read(path).map_err(|err| ReviewError::io(format!("read {}", path.display()), err))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bundle.zip".to_string());
        debug!(bytes = bytes.len(), "uploading bundle");
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/zip")?;
        let form = multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);
        let request = self
            .http
            .post(self.url("/files"))
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT);
        let payload = self.send_json(request, "file upload")?;
        payload_id(&payload, "file upload")
    }

    #[instrument(skip_all)]
    fn create_response(&self, payload: &Value) -> Result<Value> {
        let request = self
            .http
            .post(self.url("/responses"))
            .json(payload)
            .timeout(RESPONSE_TIMEOUT);
        self.send_json(request, "create response")
    }

    #[instrument(skip_all, fields(response_id = %response_id))]
    fn get_response(&self, response_id: &str) -> Result<Value> {
        let request = self
            .http
            .get(self.url(&format!("/responses/{response_id}")))
            .timeout(RESPONSE_TIMEOUT);
        self.send_json(request, "get response")
    }

    #[instrument(skip_all, fields(file_id = %file_id))]
    fn delete_file(&self, file_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/files/{file_id}")))
            .bearer_auth(&self.api_key)
            .timeout(DELETE_TIMEOUT)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReviewError::RemoteRequestFailed {
                operation: "delete file",
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(())
    }
}
