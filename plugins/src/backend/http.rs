use async_trait::async_trait;
use futures::StreamExt;
use rpa_core::api as core_api;
use serde_json::Value;
use std::time::Duration;
use std::{error::Error as StdError, fmt};

use super::sse::SseDecoder;

const BODY_PREVIEW_CHARS: usize = 512;

/// Which backend call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOp {
    Generate,
    Repair,
    Fetch,
    Run,
}

impl BackendOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Repair => "repair",
            Self::Fetch => "fetch",
            Self::Run => "run",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendHttpErrorKind {
    /// Per-request timeout elapsed (never raised for runs).
    Timeout,
    /// The automation API could not be reached.
    Connect,
    /// The response body broke off, including mid-way through a run feed.
    Stream,
    /// The body arrived but is not the JSON we expect.
    Decode,
    /// Non-2xx response without a JSON error body.
    Status,
    Unknown,
}

impl fmt::Display for BackendHttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Stream => "stream",
            Self::Decode => "decode",
            Self::Status => "status",
            Self::Unknown => "unknown",
        })
    }
}

/// Failure of a call to the automation API, carried inside `anyhow::Error`.
#[derive(Debug)]
pub struct BackendHttpError {
    op: BackendOp,
    kind: BackendHttpErrorKind,
    status: Option<u16>,
    url: String,
    script_id: Option<String>,
    message: String,
    source: Option<anyhow::Error>,
}

impl BackendHttpError {
    pub fn op(&self) -> BackendOp {
        self.op
    }

    pub fn kind(&self) -> BackendHttpErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn script_id(&self) -> Option<&str> {
        self.script_id.as_deref()
    }

    fn transport(op: BackendOp, url: &str, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            BackendHttpErrorKind::Timeout
        } else if err.is_connect() {
            BackendHttpErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            BackendHttpErrorKind::Stream
        } else {
            BackendHttpErrorKind::Unknown
        };
        Self {
            op,
            kind,
            status: err.status().map(|s| s.as_u16()),
            url: url.to_string(),
            script_id: None,
            message: err.to_string(),
            source: Some(anyhow::Error::new(err)),
        }
    }

    fn rejected(op: BackendOp, status: u16, url: &str, body: &str) -> Self {
        Self {
            op,
            kind: BackendHttpErrorKind::Status,
            status: Some(status),
            url: url.to_string(),
            script_id: None,
            message: preview_body(body),
            source: None,
        }
    }

    fn undecodable(op: BackendOp, status: u16, url: &str, err: serde_json::Error, body: &str) -> Self {
        Self {
            op,
            kind: BackendHttpErrorKind::Decode,
            status: Some(status),
            url: url.to_string(),
            script_id: None,
            message: format!("{err} in body: {}", preview_body(body)),
            source: Some(anyhow::Error::new(err)),
        }
    }

    fn for_script(mut self, script_id: &str) -> Self {
        self.script_id = Some(script_id.to_string());
        self
    }
}

impl fmt::Display for BackendHttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} request failed ({})", self.op.as_str(), self.kind)?;
        if let Some(id) = &self.script_id {
            write!(f, " script={id}")?;
        }
        if let Some(status) = self.status {
            write!(f, " status={status}")?;
        }
        write!(f, " url={}: {}", self.url, self.message)
    }
}

impl StdError for BackendHttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|err| &**err as &(dyn StdError + 'static))
    }
}

/// Single-line excerpt of a response body for error messages.
fn preview_body(body: &str) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.is_empty() {
        return "<empty body>".to_string();
    }
    match flat.char_indices().nth(BODY_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Error message of a rejected request: `message`, then `detail` as a string
/// or as an object carrying `message`.
fn rejection_message(body: &Value) -> Option<String> {
    str_field(body, "message")
        .or_else(|| str_field(body, "detail"))
        .or_else(|| body.get("detail").and_then(|d| str_field(d, "message")))
        .map(str::to_string)
}

/// Converts a non-2xx run response into a failed result.
fn failed_run_from_body(body: &Value) -> core_api::RunResult {
    let detail = body.get("detail").cloned().unwrap_or(Value::Null);

    let message = str_field(body, "error")
        .or_else(|| detail.as_str().filter(|s| !s.trim().is_empty()))
        .or_else(|| str_field(&detail, "message"))
        .unwrap_or("Failed to execute script")
        .to_string();

    let error_type = str_field(body, "error_type")
        .or_else(|| str_field(&detail, "error_type"))
        .map(core_api::ErrorType::normalize)
        .unwrap_or(core_api::ErrorType::ApiError);

    let mut suggestions = string_list(body.get("suggestions"));
    if suggestions.is_empty() {
        suggestions = string_list(detail.get("suggestions"));
    }

    let details = body
        .get("error_details")
        .cloned()
        .or_else(|| (!body.is_null()).then(|| body.clone()));

    core_api::RunResult {
        success: false,
        stdout: str_field(body, "stdout").map(str::to_string),
        stderr: str_field(body, "stderr")
            .or_else(|| detail.as_str())
            .map(str::to_string),
        error: Some(core_api::ErrorField::Message(message)),
        error_type: Some(error_type),
        returncode: body
            .get("returncode")
            .and_then(Value::as_i64)
            .and_then(|c| i32::try_from(c).ok()),
        traceback: str_field(body, "traceback").map(str::to_string),
        suggestions,
        possible_causes: string_list(body.get("possible_causes")),
        details,
        script_content: str_field(body, "script_content").map(str::to_string),
        page_history: None,
    }
}

#[derive(Clone)]
pub struct HttpScriptBackend {
    api_key: String,
    llm_client: String,
    request_timeout: Duration,
    http: reqwest::Client,
    // Pre-built URL endpoints
    base_url: String,
    url_instructions: String,
    url_repair: String,
}

impl HttpScriptBackend {
    pub fn new(cfg: &core_api::BackendConfig) -> anyhow::Result<Self> {
        // No client-wide timeout: runs last as long as the backend keeps the feed open.
        let http = reqwest::Client::builder().build()?;
        let normalized = cfg.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            api_key: cfg.api_key.clone(),
            llm_client: cfg.llm_client.clone(),
            request_timeout: Duration::from_millis(cfg.request_timeout_ms),
            http,
            url_instructions: format!("{}/instructions/", normalized),
            url_repair: format!("{}/scripts/repair", normalized),
            base_url: normalized,
        })
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.trim().is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    fn script_url(&self, script_id: &str) -> String {
        format!("{}/scripts/{}", self.base_url, script_id)
    }

    async fn read_body(op: BackendOp, resp: reqwest::Response) -> Result<(u16, String), BackendHttpError> {
        let status = resp.status().as_u16();
        let url = resp.url().to_string();
        let body = resp
            .text()
            .await
            .map_err(|err| BackendHttpError::transport(op, &url, err))?;
        Ok((status, body))
    }

    async fn post_instruction<T: serde::Serialize + ?Sized>(
        &self,
        op: BackendOp,
        url: &str,
        payload: &T,
    ) -> anyhow::Result<core_api::InstructionResponse> {
        tracing::debug!(target: "rpa.http", stage = op.as_str(), url = %url, llm_client = %self.llm_client);
        let req = self
            .http
            .post(url)
            .query(&[("llm_client", self.llm_client.as_str())])
            .timeout(self.request_timeout)
            .json(payload);
        let resp = self
            .auth(req)
            .send()
            .await
            .map_err(|err| BackendHttpError::transport(op, url, err))?;
        let ok = resp.status().is_success();
        let (status, body) = Self::read_body(op, resp).await?;
        tracing::debug!(target: "rpa.http", stage = op.as_str(), status, body_len = body.len());

        if !ok {
            // A JSON error body is a rejection the flow can show verbatim.
            let parsed = serde_json::from_str::<Value>(&body).unwrap_or(Value::Null);
            return match rejection_message(&parsed) {
                Some(message) => Ok(core_api::InstructionResponse {
                    status: Some("error".to_string()),
                    message: Some(message),
                    ..core_api::InstructionResponse::default()
                }),
                None => Err(BackendHttpError::rejected(op, status, url, &body).into()),
            };
        }

        serde_json::from_str::<core_api::InstructionResponse>(&body)
            .map_err(|err| BackendHttpError::undecodable(op, status, url, err, &body).into())
    }

    async fn forward_stream(
        resp: reqwest::Response,
        url: &str,
        script_id: &str,
        sink: &core_api::EventSink,
    ) -> anyhow::Result<core_api::RunResult> {
        let mut decoder = SseDecoder::new();
        let mut terminal: Option<core_api::RunResult> = None;
        let mut forwarded = 0usize;

        let mut forward = |payload: String| {
            let event = core_api::RunEvent::from_json(&payload);
            if let core_api::RunEvent::Unknown { kind, reason } = &event {
                tracing::warn!(target: "rpa.http", script_id, kind = %kind, reason = %reason, "undecodable run event");
            }
            if let core_api::RunEvent::Complete(result) = &event {
                terminal.get_or_insert_with(|| result.clone());
            }
            forwarded += 1;
            if !sink.emit(event) {
                tracing::debug!(target: "rpa.http", "run feed receiver dropped");
            }
        };

        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk: bytes::Bytes = chunk.map_err(|err| {
                BackendHttpError::transport(BackendOp::Run, url, err).for_script(script_id)
            })?;
            for payload in decoder.feed(&chunk) {
                forward(payload);
            }
        }
        if let Some(payload) = decoder.finish() {
            forward(payload);
        }

        tracing::debug!(
            target: "rpa.http",
            stage = "run.stream.out",
            events = forwarded,
            terminal = terminal.is_some()
        );
        Ok(terminal.unwrap_or_else(|| {
            core_api::RunResult::failed(
                core_api::ErrorType::NetworkError,
                "event stream closed before completion",
            )
        }))
    }
}

#[async_trait]
impl core_api::ScriptBackend for HttpScriptBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit_instruction(
        &self,
        req: core_api::InstructionRequest,
    ) -> anyhow::Result<core_api::InstructionResponse> {
        self.post_instruction(BackendOp::Generate, &self.url_instructions, &req)
            .await
    }

    async fn repair_script(
        &self,
        req: core_api::RepairRequest,
    ) -> anyhow::Result<core_api::InstructionResponse> {
        self.post_instruction(BackendOp::Repair, &self.url_repair, &req)
            .await
    }

    async fn fetch_script(&self, script_id: &str) -> anyhow::Result<Option<String>> {
        let op = BackendOp::Fetch;
        let url = self.script_url(script_id);
        tracing::debug!(target: "rpa.http", stage = "http.fetch.in", url = %url);
        let req = self.http.get(&url).timeout(self.request_timeout);
        let resp = self
            .auth(req)
            .send()
            .await
            .map_err(|err| BackendHttpError::transport(op, &url, err).for_script(script_id))?;
        let ok = resp.status().is_success();
        let (status, body) = Self::read_body(op, resp)
            .await
            .map_err(|e| e.for_script(script_id))?;
        tracing::debug!(target: "rpa.http", stage = "http.fetch.out", status);

        if status == 404 {
            return Ok(None);
        }
        if !ok {
            return Err(BackendHttpError::rejected(op, status, &url, &body)
                .for_script(script_id)
                .into());
        }
        let v = serde_json::from_str::<Value>(&body).map_err(|err| {
            BackendHttpError::undecodable(op, status, &url, err, &body).for_script(script_id)
        })?;
        Ok(v.get("content").and_then(Value::as_str).map(str::to_string))
    }

    async fn run_script(
        &self,
        script_id: &str,
        sink: core_api::EventSink,
    ) -> anyhow::Result<core_api::RunResult> {
        let op = BackendOp::Run;
        let url = format!("{}/run", self.script_url(script_id));
        tracing::debug!(target: "rpa.http", stage = "http.run.in", url = %url);
        let req = self.http.post(&url);
        let resp = self
            .auth(req)
            .send()
            .await
            .map_err(|err| BackendHttpError::transport(op, &url, err).for_script(script_id))?;

        let is_stream = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);
        let ok = resp.status().is_success();
        tracing::debug!(
            target: "rpa.http",
            stage = "http.run.out",
            status = resp.status().as_u16(),
            stream = is_stream
        );

        if ok && is_stream {
            return Self::forward_stream(resp, &url, script_id, &sink).await;
        }

        let (status, body) = Self::read_body(op, resp)
            .await
            .map_err(|e| e.for_script(script_id))?;
        if !ok {
            let parsed = serde_json::from_str::<Value>(&body).unwrap_or(Value::Null);
            tracing::warn!(target: "rpa.http", status, url = %url, "run request rejected");
            return Ok(failed_run_from_body(&parsed));
        }

        let mut v = serde_json::from_str::<Value>(&body).map_err(|err| {
            BackendHttpError::undecodable(op, status, &url, err, &body).for_script(script_id)
        })?;
        // A 2xx body without `success` counts as a successful run.
        if let Value::Object(map) = &mut v {
            match map.get("success") {
                None | Some(Value::Null) => {
                    map.insert("success".to_string(), Value::Bool(true));
                }
                Some(_) => {}
            }
        }
        let mut result = serde_json::from_value::<core_api::RunResult>(v).map_err(|err| {
            BackendHttpError::undecodable(op, status, &url, err, &body).for_script(script_id)
        })?;
        if result.error.is_some() && result.error_type.is_none() {
            result.error_type = Some(core_api::ErrorType::ExecutionError);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_api::ScriptBackend;
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;

    fn backend(url: String) -> HttpScriptBackend {
        HttpScriptBackend::new(&core_api::BackendConfig {
            base_url: format!("{url}/api/"),
            request_timeout_ms: 2_000,
            ..core_api::BackendConfig::default()
        })
        .unwrap()
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<core_api::RunEvent>) -> Vec<core_api::RunEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn test_preview_body_empty() {
        assert_eq!(preview_body("   "), "<empty body>");
    }

    #[test]
    fn test_preview_body_truncates_on_char_boundary() {
        let body = "é".repeat(BODY_PREVIEW_CHARS + 10);
        let preview = preview_body(&body);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), BODY_PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_preview_body_flattens_html_error_page() {
        assert_eq!(
            preview_body("<html>\n  <body>Bad Gateway</body>\n</html>\n"),
            "<html> <body>Bad Gateway</body> </html>"
        );
    }

    #[test]
    fn test_backend_http_error_display_status() {
        let err = BackendHttpError::rejected(
            BackendOp::Fetch,
            502,
            "http://localhost:8000/api/scripts/x",
            "bad gateway",
        )
        .for_script("x");
        assert_eq!(
            err.to_string(),
            "fetch request failed (status) script=x status=502 url=http://localhost:8000/api/scripts/x: bad gateway"
        );
        assert_eq!(err.script_id(), Some("x"));
    }

    #[test]
    fn test_failed_run_from_not_found_detail() {
        let body = serde_json::json!({
            "detail": {
                "error_type": "ScriptNotFoundError",
                "message": "Script with ID x not found",
                "suggestions": ["Check if the script ID is correct"]
            }
        });
        let result = failed_run_from_body(&body);
        let detail = result.error_detail();
        assert!(!result.success);
        assert_eq!(detail.message.as_deref(), Some("Script with ID x not found"));
        assert_eq!(detail.error_type, Some(core_api::ErrorType::UnknownError));
        assert_eq!(detail.suggestions.len(), 1);
    }

    #[test]
    fn test_failed_run_from_empty_body() {
        let result = failed_run_from_body(&Value::Null);
        let detail = result.error_detail();
        assert_eq!(detail.message.as_deref(), Some("Failed to execute script"));
        assert_eq!(detail.error_type, Some(core_api::ErrorType::ApiError));
        assert!(result.details.is_none());
    }

    #[tokio::test]
    async fn test_submit_instruction_posts_content_with_llm_client() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/instructions/")
            .match_query(Matcher::UrlEncoded("llm_client".into(), "openai".into()))
            .match_body(Matcher::Json(serde_json::json!({"content": "open example.com"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"success","message":"ok","script_id":"s1","script_path":"scripts/script_s1.py","script_content":"print(1)"}"#)
            .create_async()
            .await;

        let resp = backend(server.url())
            .submit_instruction(core_api::InstructionRequest {
                content: "open example.com".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(resp.script_id.as_deref(), Some("s1"));
        assert_eq!(resp.script_content.as_deref(), Some("print(1)"));
    }

    #[tokio::test]
    async fn test_repair_posts_error_context() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/scripts/repair")
            .match_query(Matcher::UrlEncoded("llm_client".into(), "openai".into()))
            .match_body(Matcher::PartialJson(serde_json::json!({
                "error_context": {"error_type": "SyntaxError", "error": "bad"},
                "original_script": "print(1"
            })))
            .with_status(200)
            .with_body(r#"{"status":"success","message":"ok","script_id":"s2","is_repair":true}"#)
            .create_async()
            .await;

        let prior = core_api::ScriptError {
            error: "bad".to_string(),
            error_type: core_api::ErrorType::SyntaxError,
            script_content: "print(1".to_string(),
            ..core_api::ScriptError::default()
        };
        let resp = backend(server.url())
            .repair_script(core_api::RepairRequest::from_error("fix", &prior))
            .await
            .unwrap();
        assert_eq!(resp.is_repair, Some(true));
    }

    #[tokio::test]
    async fn test_submit_rejection_with_detail_becomes_error_status() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/instructions/")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body(r#"{"detail":"LLM unavailable"}"#)
            .create_async()
            .await;

        let resp = backend(server.url())
            .submit_instruction(core_api::InstructionRequest {
                content: "x".to_string(),
            })
            .await
            .unwrap();
        assert!(!resp.is_success());
        assert_eq!(resp.message.as_deref(), Some("LLM unavailable"));
    }

    #[tokio::test]
    async fn test_submit_rejection_without_json_is_status_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/instructions/")
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let err = backend(server.url())
            .submit_instruction(core_api::InstructionRequest {
                content: "x".to_string(),
            })
            .await
            .unwrap_err();
        let http_err = err
            .downcast_ref::<BackendHttpError>()
            .expect("expected BackendHttpError");
        assert_eq!(http_err.op(), BackendOp::Generate);
        assert_eq!(http_err.kind(), BackendHttpErrorKind::Status);
        assert_eq!(http_err.status(), Some(502));
        assert!(http_err.url().contains("/api/instructions/"));
        assert_eq!(http_err.script_id(), None);
    }

    #[tokio::test]
    async fn test_fetch_script_content_and_missing() {
        let mut server = Server::new_async().await;
        let _found = server
            .mock("GET", "/api/scripts/abc")
            .with_status(200)
            .with_body(r#"{"script_id":"abc","content":"print('x')","path":"p"}"#)
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/api/scripts/nope")
            .with_status(404)
            .with_body(r#"{"detail":"Script not found"}"#)
            .create_async()
            .await;

        let b = backend(server.url());
        assert_eq!(b.fetch_script("abc").await.unwrap().as_deref(), Some("print('x')"));
        assert_eq!(b.fetch_script("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_run_streams_events_into_sink() {
        let mut server = Server::new_async().await;
        let body = concat!(
            "data: {\"type\":\"output\",\"content\":\"step 1\\n\"}\n\n",
            ": keepalive\n\n",
            "data: {\"type\":\"output\",\"content\":\"warn\\n\",\"is_error\":true}\n\n",
            "data: {\"type\":\"complete\",\"success\":false,\"error\":{\"error_type\":\"TimeoutError\",\"message\":\"timed out\",\"suggestions\":[]},\"stdout\":\"\",\"stderr\":\"\"}\n\n",
            "data: {\"type\":\"complete\"}\n\n"
        );
        let _m = server
            .mock("POST", "/api/scripts/abc/run")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let (sink, mut rx) = core_api::EventSink::channel();
        let result = backend(server.url()).run_script("abc", sink).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            core_api::RunEvent::Output {
                content: "step 1\n".to_string(),
                is_error: false
            }
        );
        assert!(matches!(events[1], core_api::RunEvent::Output { is_error: true, .. }));
        assert!(events[2].is_terminal() && events[3].is_terminal());
        assert_eq!(
            result.error_detail().error_type,
            Some(core_api::ErrorType::TimeoutError)
        );
    }

    #[tokio::test]
    async fn test_run_stream_without_complete_reports_network_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/scripts/abc/run")
            .with_status(200)
            .with_header("content-type", "text/event-stream; charset=utf-8")
            .with_body("data: {\"type\":\"output\",\"content\":\"x\"}\n\n")
            .create_async()
            .await;

        let (sink, mut rx) = core_api::EventSink::channel();
        let result = backend(server.url()).run_script("abc", sink).await.unwrap();
        assert_eq!(drain(&mut rx).len(), 1);
        assert!(!result.success);
        assert_eq!(result.error_type, Some(core_api::ErrorType::NetworkError));
    }

    #[tokio::test]
    async fn test_run_json_response_defaults_to_success() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/scripts/abc/run")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"stdout":"done\n"}"#)
            .create_async()
            .await;

        let (sink, _rx) = core_api::EventSink::channel();
        let result = backend(server.url()).run_script("abc", sink).await.unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.as_deref(), Some("done\n"));
    }

    #[tokio::test]
    async fn test_run_json_error_without_type_is_execution_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/scripts/abc/run")
            .with_status(200)
            .with_body(r#"{"success":false,"error":"element not found","returncode":1}"#)
            .create_async()
            .await;

        let (sink, _rx) = core_api::EventSink::channel();
        let result = backend(server.url()).run_script("abc", sink).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error_type, Some(core_api::ErrorType::ExecutionError));
        assert_eq!(result.returncode, Some(1));
    }

    #[tokio::test]
    async fn test_run_rejected_status_becomes_failed_result() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/scripts/abc/run")
            .with_status(500)
            .with_body(r#"{"detail":{"error_type":"InternalServerError","message":"disk full"}}"#)
            .create_async()
            .await;

        let (sink, _rx) = core_api::EventSink::channel();
        let result = backend(server.url()).run_script("abc", sink).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error_detail().message.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn test_run_invalid_json_is_decode_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/scripts/abc/run")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let (sink, _rx) = core_api::EventSink::channel();
        let err = backend(server.url()).run_script("abc", sink).await.unwrap_err();
        let http_err = err
            .downcast_ref::<BackendHttpError>()
            .expect("expected BackendHttpError");
        assert_eq!(http_err.op(), BackendOp::Run);
        assert_eq!(http_err.kind(), BackendHttpErrorKind::Decode);
        assert_eq!(http_err.script_id(), Some("abc"));
        assert!(http_err.url().ends_with("/api/scripts/abc/run"));
        assert!(err.to_string().contains("not json"));
    }

    #[tokio::test]
    async fn test_run_unreachable_backend_is_connect_error_with_script_context() {
        let (sink, _rx) = core_api::EventSink::channel();
        let err = backend("http://127.0.0.1:9".to_string())
            .run_script("abc", sink)
            .await
            .unwrap_err();
        let http_err = err
            .downcast_ref::<BackendHttpError>()
            .expect("expected BackendHttpError");
        assert_eq!(http_err.kind(), BackendHttpErrorKind::Connect);
        assert_eq!(http_err.status(), None);
        assert_eq!(http_err.url(), "http://127.0.0.1:9/api/scripts/abc/run");
        assert!(err.to_string().starts_with("run request failed (connect) script=abc url="));
    }

    #[tokio::test]
    async fn test_run_json_body_with_null_lists() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/scripts/abc/run")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":false,"error":"invalid syntax","error_type":"SyntaxError","suggestions":null,"possible_causes":null,"stdout":null}"#)
            .create_async()
            .await;

        let (sink, _rx) = core_api::EventSink::channel();
        let result = backend(server.url()).run_script("abc", sink).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error_type, Some(core_api::ErrorType::SyntaxError));
        assert!(result.suggestions.is_empty());
        assert!(result.possible_causes.is_empty());
    }

    #[tokio::test]
    async fn test_run_stream_error_event_with_both_message_keys() {
        let mut server = Server::new_async().await;
        let body = concat!(
            "data: {\"type\":\"error\",\"message\":\"Script execution timed out\",\"error\":\"Script execution timed out\",\"error_type\":\"TimeoutError\",\"suggestions\":null}\n\n",
            "data: {\"type\":\"complete\"}\n\n"
        );
        let _m = server
            .mock("POST", "/api/scripts/abc/run")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let (sink, mut rx) = core_api::EventSink::channel();
        backend(server.url()).run_script("abc", sink).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        let core_api::RunEvent::Error(detail) = &events[0] else {
            panic!("expected error event, got {:?}", events[0]);
        };
        assert_eq!(detail.error_type, Some(core_api::ErrorType::TimeoutError));
        assert_eq!(detail.message.as_deref(), Some("Script execution timed out"));
        assert!(events[1].is_terminal());
    }

    #[tokio::test]
    async fn test_auth_header_included_when_api_key_set() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/scripts/abc")
            .match_header("authorization", "Bearer secret-token")
            .with_status(200)
            .with_body(r#"{"content":"x"}"#)
            .create_async()
            .await;

        let b = HttpScriptBackend::new(&core_api::BackendConfig {
            base_url: format!("{}/api", server.url()),
            api_key: "secret-token".to_string(),
            ..core_api::BackendConfig::default()
        })
        .unwrap();
        assert_eq!(b.fetch_script("abc").await.unwrap().as_deref(), Some("x"));
    }
}
