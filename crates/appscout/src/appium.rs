//! Appium session over the W3C WebDriver wire protocol.
//!
//! Blocking HTTP via `reqwest`; one session per worker thread. Responses are
//! unwrapped from the `{"value": ...}` envelope and W3C error codes mapped
//! onto [`ScoutError`] variants.

use crate::platform::Platform;
use crate::result::{ScoutError, ScoutResult};
use crate::session::{By, ElementRef, Rect, Session, WindowSize};
use crate::wait::wait_until;
use base64::Engine;
use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

/// W3C element reference key
pub const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Legacy JSONWP element reference key
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// Per-command HTTP timeout
const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Session creation can include an app install
const CREATE_TIMEOUT: Duration = Duration::from_secs(300);

fn http_client(timeout: Duration) -> ScoutResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ScoutError::transport(format!("cannot build HTTP client: {e}")))
}

fn transport(e: &reqwest::Error) -> ScoutError {
    ScoutError::transport(e.to_string())
}

/// Unwrap a W3C response body.
pub fn parse_response(status: u16, body: &str) -> ScoutResult<Value> {
    let parsed: Value = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body).map_err(|e| {
            ScoutError::transport(format!("HTTP {status}: unparseable body ({e}): {body}"))
        })?
    };
    let value = parsed.get("value").cloned().unwrap_or(Value::Null);
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(ScoutError::from_w3c(error, message));
    }
    if !(200..300).contains(&status) {
        return Err(ScoutError::Protocol {
            error: format!("http {status}"),
            message: body.to_string(),
        });
    }
    Ok(value)
}

/// Element reference from a W3C or legacy element object
#[must_use]
pub fn element_from_value(value: &Value) -> Option<ElementRef> {
    value
        .get(W3C_ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(ElementRef::new)
}

/// Request body for `POST /session`
#[must_use]
pub fn new_session_body(capabilities: &Value) -> Value {
    json!({
        "capabilities": {
            "alwaysMatch": capabilities,
            "firstMatch": [{}],
        }
    })
}

fn locator_body(by: &By) -> Value {
    json!({ "using": by.strategy.as_str(), "value": by.value })
}

/// A live Appium session
#[derive(Debug)]
pub struct AppiumSession {
    base_url: String,
    session_id: String,
    capabilities: Value,
    platform: Platform,
    client: Client,
}

impl AppiumSession {
    /// Create a session on the server at `base_url`
    pub fn create(base_url: &str, capabilities: &Value) -> ScoutResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let resp = http_client(CREATE_TIMEOUT)?
            .post(format!("{base_url}/session"))
            .json(&new_session_body(capabilities))
            .send()
            .map_err(|e| transport(&e))?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(|e| transport(&e))?;
        let value = parse_response(status, &body)?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| ScoutError::Protocol {
                error: "session not created".to_string(),
                message: format!("no sessionId in {value}"),
            })?
            .to_string();
        let returned = value.get("capabilities").cloned().unwrap_or(Value::Null);
        let capabilities = if returned.is_object() {
            returned
        } else {
            capabilities.clone()
        };
        tracing::info!(session = %session_id, url = %base_url, "session created");
        Self::attach(&base_url, session_id, capabilities)
    }

    /// Attach to an existing session
    pub fn attach(base_url: &str, session_id: impl Into<String>, capabilities: Value) -> ScoutResult<Self> {
        let platform = Platform::from_capabilities(&capabilities);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: session_id.into(),
            capabilities,
            platform,
            client: http_client(COMMAND_TIMEOUT)?,
        })
    }

    /// Remote session id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.session_id
    }

    /// Server base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn command(&self, method: Method, path: &str, body: Option<Value>) -> ScoutResult<Value> {
        let url = format!("{}/session/{}{path}", self.base_url, self.session_id);
        tracing::trace!(%method, %url, "command");
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let resp = request.send().map_err(|e| transport(&e))?;
        let status = resp.status().as_u16();
        let text = resp.text().map_err(|e| transport(&e))?;
        parse_response(status, &text)
    }

    fn get(&self, path: &str) -> ScoutResult<Value> {
        self.command(Method::GET, path, None)
    }

    fn post(&self, path: &str, body: Value) -> ScoutResult<Value> {
        self.command(Method::POST, path, Some(body))
    }

    fn elements(value: &Value) -> ScoutResult<Vec<ElementRef>> {
        let list = value.as_array().ok_or_else(|| ScoutError::Protocol {
            error: "unexpected response".to_string(),
            message: format!("expected element list, got {value}"),
        })?;
        Ok(list.iter().filter_map(element_from_value).collect())
    }

    fn string(value: Value) -> String {
        match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl Session for AppiumSession {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn capabilities(&self) -> &Value {
        &self.capabilities
    }

    fn current_context(&self) -> ScoutResult<String> {
        self.get("/context").map(Self::string)
    }

    fn switch_context(&self, name: &str) -> ScoutResult<()> {
        self.post("/context", json!({ "name": name })).map(drop)
    }

    fn contexts(&self) -> ScoutResult<Vec<String>> {
        let value = self.get("/contexts")?;
        Ok(value
            .as_array()
            .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default())
    }

    fn find_elements(&self, by: &By) -> ScoutResult<Vec<ElementRef>> {
        Self::elements(&self.post("/elements", locator_body(by))?)
    }

    fn find_elements_from(&self, parent: &ElementRef, by: &By) -> ScoutResult<Vec<ElementRef>> {
        let path = format!("/element/{}/elements", parent.id());
        Self::elements(&self.post(&path, locator_body(by))?)
    }

    fn execute_script(&self, script: &str, args: Vec<Value>) -> ScoutResult<Value> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
    }

    fn click(&self, element: &ElementRef) -> ScoutResult<()> {
        self.post(&format!("/element/{}/click", element.id()), json!({}))
            .map(drop)
    }

    fn send_keys(&self, element: &ElementRef, text: &str) -> ScoutResult<()> {
        self.post(
            &format!("/element/{}/value", element.id()),
            json!({ "text": text }),
        )
        .map(drop)
    }

    fn text(&self, element: &ElementRef) -> ScoutResult<String> {
        self.get(&format!("/element/{}/text", element.id()))
            .map(Self::string)
    }

    fn attribute(&self, element: &ElementRef, name: &str) -> ScoutResult<Option<String>> {
        let value = self.get(&format!(
            "/element/{}/attribute/{}",
            element.id(),
            urlencoding::encode(name)
        ))?;
        Ok((!value.is_null()).then(|| Self::string(value)))
    }

    fn rect(&self, element: &ElementRef) -> ScoutResult<Rect> {
        let value = self.get(&format!("/element/{}/rect", element.id()))?;
        Ok(serde_json::from_value(value)?)
    }

    fn is_displayed(&self, element: &ElementRef) -> ScoutResult<bool> {
        let value = self.get(&format!("/element/{}/displayed", element.id()))?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn is_enabled(&self, element: &ElementRef) -> ScoutResult<bool> {
        let value = self.get(&format!("/element/{}/enabled", element.id()))?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn screenshot(&self) -> ScoutResult<Vec<u8>> {
        let encoded = Self::string(self.get("/screenshot")?);
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| ScoutError::Protocol {
                error: "invalid screenshot".to_string(),
                message: e.to_string(),
            })
    }

    fn push_file(&self, device_path: &str, data: &[u8]) -> ScoutResult<()> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        self.post(
            "/appium/device/push_file",
            json!({ "path": device_path, "data": encoded }),
        )
        .map(drop)
    }

    fn current_package(&self) -> ScoutResult<Option<String>> {
        if self.platform != Platform::Android {
            return Ok(None);
        }
        let value = self.get("/appium/device/current_package")?;
        Ok(value.as_str().map(str::to_string))
    }

    fn back(&self) -> ScoutResult<()> {
        self.post("/back", json!({})).map(drop)
    }

    fn window_size(&self) -> ScoutResult<WindowSize> {
        let value = self.get("/window/rect")?;
        let dim = |key: &str| value.get(key).and_then(Value::as_f64).unwrap_or(0.0) as u32;
        Ok(WindowSize {
            width: dim("width"),
            height: dim("height"),
        })
    }

    fn quit(&self) -> ScoutResult<()> {
        self.command(Method::DELETE, "", None).map(drop)?;
        tracing::info!(session = %self.session_id, "session closed");
        Ok(())
    }
}

// =============================================================================
// SERVER
// =============================================================================

/// Appium server endpoint
#[derive(Debug, Clone)]
pub struct AppiumServer {
    host: String,
    port: u16,
}

impl AppiumServer {
    /// Server at `host:port`
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Base URL
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Whether `GET /status` answers 200 right now
    pub fn is_ready(&self) -> ScoutResult<bool> {
        let client = http_client(Duration::from_secs(1))?;
        Ok(client
            .get(format!("{}/status", self.url()))
            .send()
            .is_ok_and(|r| r.status().is_success()))
    }

    /// Poll `/status` once per second until it answers or `timeout` passes
    pub fn wait_ready(&self, timeout: Duration) -> ScoutResult<bool> {
        let ready = wait_until(timeout, Duration::from_secs(1), || {
            Ok(self.is_ready()?.then_some(()))
        })?;
        if ready.is_none() {
            tracing::warn!(url = %self.url(), timeout_ms = timeout.as_millis() as u64, "Appium not ready");
        }
        Ok(ready.is_some())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    /// One-request-per-connection HTTP stub answering from `route`
    fn serve<F>(route: F) -> (String, Arc<Mutex<Vec<String>>>)
    where
        F: Fn(&str, &str, &str) -> (u16, String) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let mut length = 0usize;
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).unwrap();
                    if header.trim().is_empty() {
                        break;
                    }
                    if let Some((name, value)) = header.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            length = value.trim().parse().unwrap();
                        }
                    }
                }
                let mut body = vec![0u8; length];
                reader.read_exact(&mut body).unwrap();
                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or_default().to_string();
                let path = parts.next().unwrap_or_default().to_string();
                let body = String::from_utf8(body).unwrap();
                log.lock().unwrap().push(format!("{method} {path} {body}"));
                let (status, payload) = route(&method, &path, &body);
                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                    payload.len()
                );
                stream.write_all(response.as_bytes()).unwrap();
            }
        });
        (format!("http://{addr}"), seen)
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn test_value_unwrapped() {
            assert_eq!(parse_response(200, r#"{"value":"NATIVE_APP"}"#).unwrap(), json!("NATIVE_APP"));
            assert_eq!(parse_response(200, "").unwrap(), Value::Null);
        }

        #[test]
        fn test_w3c_error_mapped() {
            let err = parse_response(
                404,
                r#"{"value":{"error":"stale element reference","message":"gone"}}"#,
            )
            .unwrap_err();
            assert!(matches!(err, ScoutError::StaleElement { .. }));
            let err = parse_response(404, r#"{"value":{"error":"invalid session id","message":""}}"#)
                .unwrap_err();
            assert!(err.is_fatal());
        }

        #[test]
        fn test_non_json_body_is_transport() {
            let err = parse_response(502, "<html>Bad Gateway</html>").unwrap_err();
            assert!(matches!(err, ScoutError::Transport { .. }));
        }

        #[test]
        fn test_element_keys() {
            assert_eq!(
                element_from_value(&json!({ W3C_ELEMENT_KEY: "abc" })),
                Some(ElementRef::new("abc"))
            );
            assert_eq!(
                element_from_value(&json!({ "ELEMENT": "legacy" })),
                Some(ElementRef::new("legacy"))
            );
            assert_eq!(element_from_value(&json!({})), None);
        }

        #[test]
        fn test_new_session_body() {
            let body = new_session_body(&json!({"platformName": "Android"}));
            assert_eq!(body["capabilities"]["alwaysMatch"]["platformName"], "Android");
            assert_eq!(body["capabilities"]["firstMatch"], json!([{}]));
        }
    }

    mod wire_tests {
        use super::*;

        #[test]
        fn test_session_round_trip() {
            let (url, seen) = serve(|method, path, _body| match (method, path) {
                ("POST", "/session") => (
                    200,
                    r#"{"value":{"sessionId":"s1","capabilities":{"platformName":"Android"}}}"#.to_string(),
                ),
                ("GET", "/session/s1/contexts") => {
                    (200, r#"{"value":["NATIVE_APP","WEBVIEW_1"]}"#.to_string())
                }
                ("POST", "/session/s1/elements") => (
                    200,
                    format!(r#"{{"value":[{{"{W3C_ELEMENT_KEY}":"e1"}}]}}"#),
                ),
                ("GET", "/session/s1/element/e1/rect") => (
                    200,
                    r#"{"value":{"x":10,"y":20,"width":100,"height":50}}"#.to_string(),
                ),
                ("DELETE", "/session/s1") => (200, r#"{"value":null}"#.to_string()),
                _ => (
                    404,
                    r#"{"value":{"error":"unknown command","message":"nope"}}"#.to_string(),
                ),
            });

            let session = AppiumSession::create(&url, &json!({"platformName": "Android"})).unwrap();
            assert_eq!(session.id(), "s1");
            assert_eq!(session.platform(), Platform::Android);
            assert_eq!(session.contexts().unwrap(), vec!["NATIVE_APP", "WEBVIEW_1"]);

            let found = session.find_elements(&By::accessibility_id("Корзина")).unwrap();
            assert_eq!(found, vec![ElementRef::new("e1")]);
            assert_eq!(session.rect(&found[0]).unwrap().center(), (60, 45));
            assert!(matches!(
                session.back().unwrap_err(),
                ScoutError::Protocol { .. }
            ));
            session.quit().unwrap();

            let log = seen.lock().unwrap();
            assert!(log.iter().any(|l| l.starts_with("POST /session/s1/elements")
                && l.contains("accessibility id")));
            assert!(log.iter().any(|l| l.starts_with("DELETE /session/s1")));
        }

        #[test]
        fn test_wait_ready() {
            let (url, _) = serve(|_, path, _| {
                if path == "/status" {
                    (200, r#"{"value":{"ready":true}}"#.to_string())
                } else {
                    (404, String::new())
                }
            });
            let addr = url.trim_start_matches("http://");
            let (host, port) = addr.split_once(':').unwrap();
            let server = AppiumServer::new(host, port.parse().unwrap());
            assert!(server.wait_ready(Duration::from_secs(2)).unwrap());
        }

        #[test]
        fn test_unreachable_server() {
            // bind then drop to get a port nobody listens on
            let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
            let server = AppiumServer::new("127.0.0.1", port);
            assert!(!server.wait_ready(Duration::ZERO).unwrap());
            let err = AppiumSession::create(&server.url(), &json!({})).unwrap_err();
            assert!(matches!(err, ScoutError::Transport { .. }));
        }
    }
}
