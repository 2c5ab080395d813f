//! Session - Abstract Automation Session Trait
//!
//! Everything the locate/click engine needs from a remote automation session.
//! [`AppiumSession`](crate::AppiumSession) speaks the W3C/Appium wire protocol;
//! [`MockSession`](crate::MockSession) scripts a fake UI for tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Session (object-safe, &self)                                     │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────┐          ┌──────────────────────┐        │
//! │  │  AppiumSession     │          │  MockSession         │        │
//! │  │  HTTP + JSON       │          │  scripted UI tree    │        │
//! │  │  (reqwest)         │          │  + call history      │        │
//! │  └────────────────────┘          └──────────────────────┘        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

use crate::platform::Platform;
use crate::result::ScoutResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Context identifier of the native application UI
pub const NATIVE_APP: &str = "NATIVE_APP";

/// Prefix Appium uses for embedded web view contexts
pub const WEBVIEW_PREFIX: &str = "WEBVIEW";

/// Whether a context identifier names a web surface
#[must_use]
pub fn is_web_context(name: &str) -> bool {
    name.starts_with(WEBVIEW_PREFIX) || name == "CHROMIUM"
}

/// Locator strategy understood by Appium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Accessibility id (content-desc on Android, name on iOS)
    AccessibilityId,
    /// Resource id
    Id,
    /// XPath over the page source or DOM
    XPath,
    /// Class name
    ClassName,
    /// Android UiAutomator selector expression
    AndroidUiAutomator,
    /// iOS NSPredicate string
    IosPredicate,
    /// iOS class chain
    IosClassChain,
    /// CSS selector (web contexts only)
    Css,
}

impl Strategy {
    /// Wire name sent as `using`
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AccessibilityId => "accessibility id",
            Self::Id => "id",
            Self::XPath => "xpath",
            Self::ClassName => "class name",
            Self::AndroidUiAutomator => "-android uiautomator",
            Self::IosPredicate => "-ios predicate string",
            Self::IosClassChain => "-ios class chain",
            Self::Css => "css selector",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locator: strategy plus query expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct By {
    /// Strategy
    pub strategy: Strategy,
    /// Query expression
    pub value: String,
}

impl By {
    /// Create a locator
    #[must_use]
    pub fn new(strategy: Strategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
        }
    }

    /// Accessibility id locator
    #[must_use]
    pub fn accessibility_id(value: impl Into<String>) -> Self {
        Self::new(Strategy::AccessibilityId, value)
    }

    /// Resource id locator
    #[must_use]
    pub fn id(value: impl Into<String>) -> Self {
        Self::new(Strategy::Id, value)
    }

    /// XPath locator
    #[must_use]
    pub fn xpath(value: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, value)
    }

    /// UiAutomator locator
    #[must_use]
    pub fn android_uiautomator(value: impl Into<String>) -> Self {
        Self::new(Strategy::AndroidUiAutomator, value)
    }

    /// Predicate string locator
    #[must_use]
    pub fn ios_predicate(value: impl Into<String>) -> Self {
        Self::new(Strategy::IosPredicate, value)
    }

    /// Class chain locator
    #[must_use]
    pub fn ios_class_chain(value: impl Into<String>) -> Self {
        Self::new(Strategy::IosClassChain, value)
    }
}

impl std::fmt::Display for By {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.strategy, self.value)
    }
}

/// Opaque reference to a remote UI node
///
/// Valid only until the underlying view is rebuilt; afterwards element calls
/// fail with [`ScoutError::StaleElement`](crate::ScoutError::StaleElement).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef(pub String);

impl ElementRef {
    /// Create an element reference
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Remote element id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// On-screen bounding rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Rect {
    /// Create a rectangle
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Centre point, truncated to whole pixels
    #[must_use]
    pub fn center(&self) -> (i64, i64) {
        (
            (self.x + self.width / 2.0) as i64,
            (self.y + self.height / 2.0) as i64,
        )
    }
}

/// Window dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindowSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// A remote automation session.
///
/// Lookups return an empty list for absence; `Err` means the lookup itself
/// failed. Implementations are not expected to be shared between threads:
/// one session serves one test at a time.
pub trait Session {
    /// Platform resolved once from the session capabilities
    fn platform(&self) -> Platform;

    /// Capabilities returned when the session was created
    fn capabilities(&self) -> &Value;

    /// Currently active context
    fn current_context(&self) -> ScoutResult<String>;

    /// Make `name` the active context
    fn switch_context(&self, name: &str) -> ScoutResult<()>;

    /// Contexts available right now (native plus any live web views)
    fn contexts(&self) -> ScoutResult<Vec<String>>;

    /// Find all elements matching `by` in the active context
    fn find_elements(&self, by: &By) -> ScoutResult<Vec<ElementRef>>;

    /// Find all elements matching `by` below `parent`
    fn find_elements_from(&self, parent: &ElementRef, by: &By) -> ScoutResult<Vec<ElementRef>>;

    /// Run a script (web contexts) or an Appium `mobile:` command (native)
    fn execute_script(&self, script: &str, args: Vec<Value>) -> ScoutResult<Value>;

    /// Click an element
    fn click(&self, element: &ElementRef) -> ScoutResult<()>;

    /// Type text into an element
    fn send_keys(&self, element: &ElementRef, text: &str) -> ScoutResult<()>;

    /// Visible text of an element
    fn text(&self, element: &ElementRef) -> ScoutResult<String>;

    /// Attribute value, `None` when absent
    fn attribute(&self, element: &ElementRef, name: &str) -> ScoutResult<Option<String>>;

    /// Bounding rectangle
    fn rect(&self, element: &ElementRef) -> ScoutResult<Rect>;

    /// Whether the element is displayed
    fn is_displayed(&self, element: &ElementRef) -> ScoutResult<bool>;

    /// Whether the element is enabled
    fn is_enabled(&self, element: &ElementRef) -> ScoutResult<bool>;

    /// PNG screenshot of the device screen
    fn screenshot(&self) -> ScoutResult<Vec<u8>>;

    /// Push a file onto the device
    fn push_file(&self, device_path: &str, data: &[u8]) -> ScoutResult<()>;

    /// Foreground Android package, `None` on other platforms
    fn current_package(&self) -> ScoutResult<Option<String>>;

    /// Press the system back button
    fn back(&self) -> ScoutResult<()>;

    /// Window size
    fn window_size(&self) -> ScoutResult<WindowSize>;

    /// End the remote session
    fn quit(&self) -> ScoutResult<()>;

    /// Find the first element matching `by`, if any
    fn find_element(&self, by: &By) -> ScoutResult<Option<ElementRef>> {
        Ok(self.find_elements(by)?.into_iter().next())
    }
}
