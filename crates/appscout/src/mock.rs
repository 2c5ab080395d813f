//! Mock session for unit testing
//!
//! A scripted UI tree that understands the query forms the engine emits
//! (UiAutomator selectors, predicate strings, class chains and the simple
//! XPath shapes used for web views and ancestor lookups). Every call is
//! recorded so tests can assert on ordering and counts.

use crate::platform::Platform;
use crate::query::{BODY_TEXT_SCRIPT, CLICKABLE_ANCESTOR_XPATH};
use crate::result::{ScoutError, ScoutResult};
use crate::session::{is_web_context, By, ElementRef, Rect, Session, Strategy, WindowSize, NATIVE_APP};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

/// How a scripted element click fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Reference went stale
    Stale,
    /// Covered or otherwise not interactable
    NotInteractable,
    /// Unclassified driver error
    Driver,
}

impl MockFailure {
    fn to_error(self, id: &str) -> ScoutError {
        match self {
            Self::Stale => ScoutError::from_w3c("stale element reference", id),
            Self::NotInteractable => ScoutError::from_w3c("element click intercepted", id),
            Self::Driver => ScoutError::from_w3c("unknown error", id),
        }
    }
}

/// A scripted UI node
#[derive(Debug, Clone)]
pub struct MockElement {
    /// Element id
    pub id: String,
    /// Context the node lives in
    pub context: String,
    /// Visible text (`text`, iOS `value`)
    pub text: String,
    /// Content description (Android) / accessibility label (iOS)
    pub description: String,
    /// Resource id
    pub resource_id: String,
    /// Class name
    pub class_name: String,
    /// Parent element id
    pub parent: Option<String>,
    /// Displayed flag
    pub displayed: bool,
    /// Enabled flag
    pub enabled: bool,
    /// Clickable flag
    pub clickable: bool,
    /// Bounding rectangle
    pub rect: Rect,
    /// Failure returned by a direct click
    pub click_failure: Option<MockFailure>,
    /// Number of lookups in its context before the node shows up
    pub hidden_for: u32,
}

impl MockElement {
    /// Native element with the given id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context: NATIVE_APP.to_string(),
            text: String::new(),
            description: String::new(),
            resource_id: String::new(),
            class_name: "android.view.View".to_string(),
            parent: None,
            displayed: true,
            enabled: true,
            clickable: false,
            rect: Rect::new(0.0, 0.0, 100.0, 40.0),
            click_failure: None,
            hidden_for: 0,
        }
    }

    /// Set text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set content description / accessibility label
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set resource id
    #[must_use]
    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = resource_id.into();
        self
    }

    /// Set class name
    #[must_use]
    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    /// Place the node in a context
    #[must_use]
    pub fn in_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Set parent
    #[must_use]
    pub fn child_of(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Set displayed flag
    #[must_use]
    pub const fn displayed(mut self, displayed: bool) -> Self {
        self.displayed = displayed;
        self
    }

    /// Set enabled flag
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set clickable flag
    #[must_use]
    pub const fn clickable(mut self, clickable: bool) -> Self {
        self.clickable = clickable;
        self
    }

    /// Set bounding rectangle
    #[must_use]
    pub const fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = Rect::new(x, y, width, height);
        self
    }

    /// Make direct clicks fail
    #[must_use]
    pub const fn failing_click(mut self, failure: MockFailure) -> Self {
        self.click_failure = Some(failure);
        self
    }

    /// Hide the node from the first `lookups` searches in its context
    #[must_use]
    pub const fn hidden_for_lookups(mut self, lookups: u32) -> Self {
        self.hidden_for = lookups;
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    current: String,
    contexts: Vec<String>,
    elements: Vec<MockElement>,
    stale: HashSet<String>,
    failing_switch: HashSet<String>,
    vanishing: HashSet<String>,
    script_results: HashMap<String, Value>,
    gestures_fail: bool,
    ancestor_lookup_fails: bool,
    killed: bool,
    package: Option<String>,
    window: WindowSize,
    screenshot: Vec<u8>,
    pushed: Vec<(String, Vec<u8>)>,
    call_history: Vec<String>,
}

/// Mock session for unit testing
#[derive(Debug)]
pub struct MockSession {
    platform: Platform,
    capabilities: Value,
    state: Mutex<MockState>,
}

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

impl MockSession {
    /// Create a mock session for `platform`, starting in `NATIVE_APP`
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        let capabilities = match platform {
            Platform::Android => json!({"platformName": "Android", "appium:automationName": "UiAutomator2"}),
            Platform::Ios => json!({"platformName": "iOS", "appium:automationName": "XCUITest"}),
            Platform::Unknown => json!({}),
        };
        let package = (platform == Platform::Android).then(|| "kz.halyk.onlinebank.stage".to_string());
        Self {
            platform,
            capabilities,
            state: Mutex::new(MockState {
                current: NATIVE_APP.to_string(),
                contexts: vec![NATIVE_APP.to_string()],
                package,
                window: WindowSize {
                    width: 1080,
                    height: 2400,
                },
                screenshot: PNG_SIGNATURE.to_vec(),
                ..MockState::default()
            }),
        }
    }

    /// Android session
    #[must_use]
    pub fn android() -> Self {
        Self::new(Platform::Android)
    }

    /// iOS session
    #[must_use]
    pub fn ios() -> Self {
        Self::new(Platform::Ios)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a scripted element
    pub fn add_element(&self, element: MockElement) {
        self.state().elements.push(element);
    }

    /// Remove an element from the tree
    pub fn remove_element(&self, id: &str) {
        self.state().elements.retain(|e| e.id != id);
    }

    /// Mark an element's reference stale
    pub fn make_stale(&self, id: &str) {
        self.state().stale.insert(id.to_string());
    }

    /// Register a web view context
    pub fn add_web_context(&self, name: &str) {
        let mut state = self.state();
        if !state.contexts.iter().any(|c| c == name) {
            state.contexts.push(name.to_string());
        }
    }

    /// Register a context that disappears as soon as it is switched to
    pub fn add_vanishing_context(&self, name: &str) {
        self.add_web_context(name);
        self.state().vanishing.insert(name.to_string());
    }

    /// Make switching to `name` fail while keeping it listed
    pub fn fail_switch_to(&self, name: &str) {
        self.state().failing_switch.insert(name.to_string());
    }

    /// Fix the result of a script
    pub fn set_script_result(&self, script: &str, result: Value) {
        self.state().script_results.insert(script.to_string(), result);
    }

    /// Make coordinate gestures fail
    pub fn fail_gestures(&self) {
        self.state().gestures_fail = true;
    }

    /// Make clickable-ancestor lookups fail
    pub fn fail_ancestor_lookup(&self) {
        self.state().ancestor_lookup_fails = true;
    }

    /// Set the foreground package
    pub fn set_package(&self, package: Option<&str>) {
        self.state().package = package.map(str::to_string);
    }

    /// Terminate the session: every later call fails with `SessionLost`
    pub fn kill(&self) {
        self.state().killed = true;
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state().call_history.clone()
    }

    /// Check if a call with this prefix was made
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.state().call_history.iter().any(|c| c.starts_with(prefix))
    }

    /// Number of calls with this prefix
    #[must_use]
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state()
            .call_history
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Clear call history
    pub fn clear_history(&self) {
        self.state().call_history.clear();
    }

    /// Files pushed to the device
    #[must_use]
    pub fn pushed_files(&self) -> Vec<(String, Vec<u8>)> {
        self.state().pushed.clone()
    }

    /// Current text of an element
    #[must_use]
    pub fn element_text(&self, id: &str) -> Option<String> {
        self.state()
            .elements
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.text.clone())
    }

    /// Lock state, record the call, fail if the session is gone
    fn begin(&self, call: String) -> ScoutResult<MutexGuard<'_, MockState>> {
        let mut state = self.state();
        state.call_history.push(call);
        if state.killed {
            return Err(ScoutError::SessionLost {
                message: "session terminated".to_string(),
            });
        }
        Ok(state)
    }

    fn element<'a>(state: &'a MockState, element: &ElementRef) -> ScoutResult<&'a MockElement> {
        let id = element.id();
        if state.stale.contains(id) {
            return Err(ScoutError::from_w3c("stale element reference", id));
        }
        // references do not cross contexts
        state
            .elements
            .iter()
            .find(|e| e.id == id && e.context == state.current)
            .ok_or_else(|| ScoutError::from_w3c("stale element reference", id))
    }

    fn search(&self, state: &mut MockState, by: &By, scope: Option<&str>) -> ScoutResult<Vec<ElementRef>> {
        let matcher = Matcher::parse(self.platform, &state.current, by)?;
        let current = state.current.clone();
        let mut found = Vec::new();
        let ids: Vec<usize> = (0..state.elements.len())
            .filter(|&i| state.elements[i].context == current)
            .collect();
        for i in ids {
            if state.elements[i].hidden_for > 0 {
                state.elements[i].hidden_for -= 1;
                continue;
            }
            let element = &state.elements[i];
            if let Some(root) = scope {
                if !descends_from(state, element, root) {
                    continue;
                }
            }
            if matcher.matches(state, element) {
                found.push(ElementRef::new(element.id.clone()));
            }
        }
        Ok(found)
    }

    fn body_text(state: &MockState) -> String {
        state
            .elements
            .iter()
            .filter(|e| e.context == state.current && e.displayed)
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn descends_from(state: &MockState, element: &MockElement, root: &str) -> bool {
    let mut parent = element.parent.as_deref();
    while let Some(id) = parent {
        if id == root {
            return true;
        }
        parent = state
            .elements
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.parent.as_deref());
    }
    false
}

fn invalid_selector(by: &By) -> ScoutError {
    ScoutError::from_w3c("invalid selector", format!("unsupported locator {by}"))
}

/// Parsed locator
enum Matcher {
    Description(String),
    DescriptionContains(String),
    Text(String),
    TextContains(String),
    DescriptionMatches(Regex),
    TextMatches(Regex),
    ResourceId(String),
    ClassName(String),
    /// Case-insensitive containment over label, name and value
    AnyContainsCi(String),
    /// Normalised text, own plus descendants', contains literal (web views).
    /// With `deepest`, nodes that have a matching descendant are excluded.
    NormalizedContains { needle: String, deepest: bool },
    /// `@attr='value'`, any of several joined by `or`
    Attribute(Vec<(String, String)>),
}

fn uiautomator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^new UiSelector\(\)\.(\w+)\("((?:[^"\\]|\\.)*)"\)$"#).expect("static pattern")
    })
}

fn predicate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"CONTAINS\[c\] '((?:[^'\\]|\\.)*)'").expect("static pattern")
    })
}

fn xpath_contains_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^//\*\[contains\(normalize-space\(\), (.+)\)\]$").expect("static pattern")
    })
}

fn xpath_deepest_contains_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^//\*\[contains\(normalize-space\(\), (.+)\) and not\(\.//\*\[contains\(normalize-space\(\), (.+)\)\]\)\]$",
        )
        .expect("static pattern")
    })
}

fn xpath_attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\.?//\*\[(@[\w-]+=['"][^'"]*['"](?: or @[\w-]+=['"][^'"]*['"])*)\]$"#)
            .expect("static pattern")
    })
}

/// Undo backslash escaping
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Evaluate an XPath string literal (plain or `concat(...)`)
fn xpath_string(literal: &str) -> Option<String> {
    let literal = literal.trim();
    if let Some(inner) = literal.strip_prefix("concat(").and_then(|s| s.strip_suffix(')')) {
        let mut out = String::new();
        let mut rest = inner;
        loop {
            rest = rest.trim_start_matches([',', ' ']);
            if rest.is_empty() {
                return Some(out);
            }
            let quote = rest.chars().next()?;
            let body = &rest[1..];
            let end = body.find(quote)?;
            out.push_str(&body[..end]);
            rest = &body[end + 1..];
        }
    }
    let quote = literal.chars().next()?;
    if !(quote == '\'' || quote == '"') {
        return None;
    }
    literal
        .strip_prefix(quote)
        .and_then(|s| s.strip_suffix(quote))
        .map(str::to_string)
}

impl Matcher {
    fn parse(platform: Platform, context: &str, by: &By) -> ScoutResult<Self> {
        let web = is_web_context(context);
        let android = platform != Platform::Ios;
        let ios = platform != Platform::Android;
        match by.strategy {
            Strategy::AccessibilityId if !web => Ok(Self::Description(by.value.clone())),
            Strategy::Id if !web => Ok(Self::ResourceId(by.value.clone())),
            Strategy::ClassName if !web => Ok(Self::ClassName(by.value.clone())),
            Strategy::AndroidUiAutomator if android && !web => {
                let caps = uiautomator_re()
                    .captures(&by.value)
                    .ok_or_else(|| invalid_selector(by))?;
                let arg = unescape(&caps[2]);
                let regex = |pattern: &str| {
                    Regex::new(&format!("^(?:{pattern})$")).map_err(|_| invalid_selector(by))
                };
                match &caps[1] {
                    "description" => Ok(Self::Description(arg)),
                    "descriptionContains" => Ok(Self::DescriptionContains(arg)),
                    "text" => Ok(Self::Text(arg)),
                    "textContains" => Ok(Self::TextContains(arg)),
                    "descriptionMatches" => Ok(Self::DescriptionMatches(regex(&arg)?)),
                    "textMatches" => Ok(Self::TextMatches(regex(&arg)?)),
                    "resourceId" => Ok(Self::ResourceId(arg)),
                    "className" => Ok(Self::ClassName(arg)),
                    _ => Err(invalid_selector(by)),
                }
            }
            Strategy::IosPredicate | Strategy::IosClassChain if ios && !web => predicate_re()
                .captures(&by.value)
                .map(|caps| Self::AnyContainsCi(unescape(&caps[1]).to_lowercase()))
                .ok_or_else(|| invalid_selector(by)),
            Strategy::XPath => {
                if let Some(caps) = xpath_deepest_contains_re().captures(&by.value) {
                    let needle = xpath_string(&caps[1]).ok_or_else(|| invalid_selector(by))?;
                    if xpath_string(&caps[2]).as_deref() != Some(needle.as_str()) {
                        return Err(invalid_selector(by));
                    }
                    return Ok(Self::NormalizedContains { needle, deepest: true });
                }
                if let Some(caps) = xpath_contains_re().captures(&by.value) {
                    return xpath_string(&caps[1])
                        .map(|needle| Self::NormalizedContains { needle, deepest: false })
                        .ok_or_else(|| invalid_selector(by));
                }
                if let Some(caps) = xpath_attribute_re().captures(&by.value) {
                    let pairs = caps[1]
                        .split(" or ")
                        .filter_map(|term| {
                            let (name, value) = term.trim_start_matches('@').split_once('=')?;
                            Some((name.to_string(), value.trim_matches(['\'', '"']).to_string()))
                        })
                        .collect();
                    return Ok(Self::Attribute(pairs));
                }
                Err(invalid_selector(by))
            }
            _ => Err(invalid_selector(by)),
        }
    }

    fn matches(&self, state: &MockState, e: &MockElement) -> bool {
        match self {
            Self::Description(v) => !v.is_empty() && e.description == *v,
            Self::DescriptionContains(v) => !e.description.is_empty() && e.description.contains(v.as_str()),
            Self::Text(v) => !v.is_empty() && e.text == *v,
            Self::TextContains(v) => !e.text.is_empty() && e.text.contains(v.as_str()),
            Self::DescriptionMatches(re) => !e.description.is_empty() && re.is_match(&e.description),
            Self::TextMatches(re) => !e.text.is_empty() && re.is_match(&e.text),
            Self::ResourceId(v) => e.resource_id == *v,
            Self::ClassName(v) => e.class_name == *v,
            Self::AnyContainsCi(v) => [&e.description, &e.text]
                .iter()
                .any(|field| !field.is_empty() && field.to_lowercase().contains(v.as_str())),
            Self::NormalizedContains { needle, deepest } => {
                let contains = |node: &MockElement| {
                    let normalized = string_value(state, node);
                    !normalized.is_empty() && normalized.contains(needle.as_str())
                };
                contains(e)
                    && !(*deepest
                        && state
                            .elements
                            .iter()
                            .any(|d| d.context == e.context && descends_from(state, d, &e.id) && contains(d)))
            }
            Self::Attribute(pairs) => pairs
                .iter()
                .any(|(name, v)| attribute_of(e, name).is_some_and(|a| a == *v)),
        }
    }
}

/// XPath string value of a node: its own text followed by its descendants'
/// text in document order, whitespace-normalised.
fn string_value(state: &MockState, node: &MockElement) -> String {
    state
        .elements
        .iter()
        .filter(|e| e.context == node.context && (e.id == node.id || descends_from(state, e, &node.id)))
        .flat_map(|e| e.text.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

fn attribute_of(e: &MockElement, name: &str) -> Option<String> {
    let value = match name {
        "text" | "value" => e.text.clone(),
        "content-desc" | "contentDescription" | "name" | "label" => e.description.clone(),
        "resource-id" | "resourceId" => e.resource_id.clone(),
        "class" | "className" | "type" => e.class_name.clone(),
        "clickable" => e.clickable.to_string(),
        "enabled" => e.enabled.to_string(),
        "displayed" | "visible" => e.displayed.to_string(),
        _ => return None,
    };
    Some(value)
}

impl Session for MockSession {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn capabilities(&self) -> &Value {
        &self.capabilities
    }

    fn current_context(&self) -> ScoutResult<String> {
        let state = self.begin("current_context".to_string())?;
        Ok(state.current.clone())
    }

    fn switch_context(&self, name: &str) -> ScoutResult<()> {
        let mut state = self.begin(format!("switch:{name}"))?;
        if state.failing_switch.contains(name) {
            return Err(ScoutError::from_w3c("unknown error", format!("cannot switch to {name}")));
        }
        if state.vanishing.remove(name) {
            state.contexts.retain(|c| c != name);
            return Err(ScoutError::from_w3c("no such context", name));
        }
        if !state.contexts.iter().any(|c| c == name) {
            return Err(ScoutError::from_w3c("no such context", name));
        }
        state.current = name.to_string();
        Ok(())
    }

    fn contexts(&self) -> ScoutResult<Vec<String>> {
        let state = self.begin("contexts".to_string())?;
        Ok(state.contexts.clone())
    }

    fn find_elements(&self, by: &By) -> ScoutResult<Vec<ElementRef>> {
        let entry = format!("find:{by}@{}", self.state().current);
        let mut state = self.begin(entry)?;
        self.search(&mut state, by, None)
    }

    fn find_elements_from(&self, parent: &ElementRef, by: &By) -> ScoutResult<Vec<ElementRef>> {
        let mut state = self.begin(format!("find_from:{}:{by}", parent.id()))?;
        let node = Self::element(&state, parent)?.clone();
        if by.strategy == Strategy::XPath && by.value == CLICKABLE_ANCESTOR_XPATH {
            if state.ancestor_lookup_fails {
                return Err(ScoutError::from_w3c("unknown error", "ancestor lookup failed"));
            }
            let mut cursor = node.parent.clone();
            while let Some(id) = cursor {
                let Some(ancestor) = state.elements.iter().find(|e| e.id == id) else {
                    break;
                };
                if ancestor.clickable {
                    return Ok(vec![ElementRef::new(ancestor.id.clone())]);
                }
                cursor = ancestor.parent.clone();
            }
            return Ok(Vec::new());
        }
        self.search(&mut state, by, Some(&node.id))
    }

    fn execute_script(&self, script: &str, args: Vec<Value>) -> ScoutResult<Value> {
        let args_value = Value::Array(args);
        let mut state = self.begin(format!("script:{script}"))?;
        if let Some(result) = state.script_results.get(script) {
            return Ok(result.clone());
        }
        if script.starts_with("mobile:") && is_web_context(&state.current) {
            return Err(ScoutError::from_w3c(
                "unsupported operation",
                "mobile commands need the native context",
            ));
        }
        if script == "mobile: clickGesture" {
            let x = args_value[0]["x"].as_i64().unwrap_or_default();
            let y = args_value[0]["y"].as_i64().unwrap_or_default();
            state.call_history.push(format!("gesture:{x},{y}"));
            if state.gestures_fail {
                return Err(ScoutError::from_w3c("unknown error", "gesture rejected"));
            }
            return Ok(Value::Null);
        }
        if script.starts_with("mobile:") {
            return Ok(Value::String(String::new()));
        }
        if !is_web_context(&state.current) {
            return Err(ScoutError::from_w3c(
                "unsupported operation",
                "scripts need a web context",
            ));
        }
        if script == BODY_TEXT_SCRIPT {
            return Ok(Value::String(Self::body_text(&state)));
        }
        Ok(Value::Null)
    }

    fn click(&self, element: &ElementRef) -> ScoutResult<()> {
        let state = self.begin(format!("click:{}", element.id()))?;
        let node = Self::element(&state, element)?;
        if let Some(failure) = node.click_failure {
            return Err(failure.to_error(&node.id));
        }
        if !node.displayed {
            return Err(ScoutError::from_w3c("element not interactable", node.id.clone()));
        }
        Ok(())
    }

    fn send_keys(&self, element: &ElementRef, text: &str) -> ScoutResult<()> {
        let mut state = self.begin(format!("send_keys:{}:{text}", element.id()))?;
        Self::element(&state, element)?;
        if let Some(node) = state.elements.iter_mut().find(|e| e.id == element.id()) {
            node.text = text.to_string();
        }
        Ok(())
    }

    fn text(&self, element: &ElementRef) -> ScoutResult<String> {
        let state = self.begin(format!("text:{}", element.id()))?;
        Ok(Self::element(&state, element)?.text.clone())
    }

    fn attribute(&self, element: &ElementRef, name: &str) -> ScoutResult<Option<String>> {
        let state = self.begin(format!("attribute:{}:{name}", element.id()))?;
        Ok(attribute_of(Self::element(&state, element)?, name))
    }

    fn rect(&self, element: &ElementRef) -> ScoutResult<Rect> {
        let state = self.begin(format!("rect:{}", element.id()))?;
        Ok(Self::element(&state, element)?.rect)
    }

    fn is_displayed(&self, element: &ElementRef) -> ScoutResult<bool> {
        let state = self.begin(format!("displayed:{}", element.id()))?;
        Ok(Self::element(&state, element)?.displayed)
    }

    fn is_enabled(&self, element: &ElementRef) -> ScoutResult<bool> {
        let state = self.begin(format!("enabled:{}", element.id()))?;
        Ok(Self::element(&state, element)?.enabled)
    }

    fn screenshot(&self) -> ScoutResult<Vec<u8>> {
        let state = self.begin("screenshot".to_string())?;
        Ok(state.screenshot.clone())
    }

    fn push_file(&self, device_path: &str, data: &[u8]) -> ScoutResult<()> {
        let mut state = self.begin(format!("push:{device_path}"))?;
        state.pushed.push((device_path.to_string(), data.to_vec()));
        Ok(())
    }

    fn current_package(&self) -> ScoutResult<Option<String>> {
        let state = self.begin("current_package".to_string())?;
        Ok(state.package.clone())
    }

    fn back(&self) -> ScoutResult<()> {
        self.begin("back".to_string()).map(drop)
    }

    fn window_size(&self) -> ScoutResult<WindowSize> {
        let state = self.begin("window_size".to_string())?;
        Ok(state.window)
    }

    fn quit(&self) -> ScoutResult<()> {
        let mut state = self.begin("quit".to_string())?;
        state.killed = true;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::query::{android_queries, ios_queries, webview_text_query};

    mod query_matching_tests {
        use super::*;

        #[test]
        fn test_android_description_exact() {
            let session = MockSession::android();
            session.add_element(MockElement::new("cart").description("Корзина"));
            let q = android_queries("Корзина");
            assert_eq!(session.find_elements(&q[0]).unwrap(), vec![ElementRef::new("cart")]);
        }

        #[test]
        fn test_android_regex_is_case_insensitive() {
            let session = MockSession::android();
            session.add_element(MockElement::new("btn").text("ОПЛАТИТЬ"));
            let q = android_queries("оплатить");
            assert!(session.find_elements(&q[3]).unwrap().is_empty());
            assert_eq!(session.find_elements(&q[5]).unwrap().len(), 1);
        }

        #[test]
        fn test_android_escaped_quotes_round_trip() {
            let session = MockSession::android();
            session.add_element(MockElement::new("q").text("He said \"hi\""));
            let q = android_queries("He said \"hi\"");
            assert_eq!(session.find_elements(&q[2]).unwrap().len(), 1);
        }

        #[test]
        fn test_ios_queries_rejected_on_android() {
            let session = MockSession::android();
            let err = session.find_elements(&ios_queries("x")[1]).unwrap_err();
            assert!(matches!(err, ScoutError::Protocol { .. }));
        }

        #[test]
        fn test_ios_predicate() {
            let session = MockSession::ios();
            session.add_element(MockElement::new("pay").description("Оплатить заказ"));
            let q = ios_queries("оплатить");
            assert!(session.find_elements(&q[0]).unwrap().is_empty());
            assert_eq!(session.find_elements(&q[1]).unwrap().len(), 1);
            assert_eq!(session.find_elements(&q[2]).unwrap().len(), 1);
        }

        #[test]
        fn test_webview_xpath() {
            let web = "WEBVIEW_1";
            let session = MockSession::android();
            session.add_web_context(web);
            session.add_element(MockElement::new("w").in_context(web).text("Оформить  заказ"));
            session.switch_context(web).unwrap();
            let by = webview_text_query("Оформить заказ").unwrap();
            assert_eq!(session.find_elements(&by).unwrap().len(), 1);
        }

        #[test]
        fn test_web_text_includes_descendants() {
            let web = "WEBVIEW_1";
            let session = MockSession::android();
            session.add_web_context(web);
            session.add_element(MockElement::new("html").in_context(web));
            session.add_element(MockElement::new("div").in_context(web).child_of("html").text("Итого"));
            session.add_element(MockElement::new("sum").in_context(web).child_of("div").text("1 000 ₸"));
            session.switch_context(web).unwrap();

            let all = By::xpath("//*[contains(normalize-space(), 'Итого 1 000')]");
            assert_eq!(
                session.find_elements(&all).unwrap(),
                vec![ElementRef::new("html"), ElementRef::new("div")]
            );
            let deepest = webview_text_query("1 000 ₸").unwrap();
            assert_eq!(session.find_elements(&deepest).unwrap(), vec![ElementRef::new("sum")]);
        }

        #[test]
        fn test_hidden_for_lookups() {
            let session = MockSession::android();
            session.add_element(MockElement::new("late").resource_id("id/late").hidden_for_lookups(1));
            assert!(session.find_elements(&By::id("id/late")).unwrap().is_empty());
            assert_eq!(session.find_elements(&By::id("id/late")).unwrap().len(), 1);
        }
    }

    mod session_state_tests {
        use super::*;

        #[test]
        fn test_history_and_was_called() {
            let session = MockSession::android();
            assert!(!session.was_called("find:"));
            session.find_elements(&By::id("x")).unwrap();
            assert!(session.was_called("find:id=x@NATIVE_APP"));
            assert_eq!(session.count_calls("find:"), 1);
        }

        #[test]
        fn test_vanishing_context() {
            let session = MockSession::android();
            session.add_vanishing_context("WEBVIEW_gone");
            assert_eq!(session.contexts().unwrap().len(), 2);
            assert!(session.switch_context("WEBVIEW_gone").is_err());
            assert_eq!(session.contexts().unwrap(), vec![NATIVE_APP.to_string()]);
        }

        #[test]
        fn test_element_refs_bound_to_context() {
            let session = MockSession::android();
            session.add_web_context("WEBVIEW_1");
            session.add_element(MockElement::new("n").text("native"));
            session.switch_context("WEBVIEW_1").unwrap();
            let err = session.click(&ElementRef::new("n")).unwrap_err();
            assert!(matches!(err, ScoutError::StaleElement { .. }));
        }

        #[test]
        fn test_killed_session() {
            let session = MockSession::android();
            session.kill();
            assert!(session.contexts().unwrap_err().is_fatal());
        }

        #[test]
        fn test_quit_ends_session() {
            let session = MockSession::ios();
            session.quit().unwrap();
            assert!(session.current_context().unwrap_err().is_fatal());
            assert_eq!(session.current_package().ok(), None);
        }
    }
}
