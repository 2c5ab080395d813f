//! appscout: multi-context element location for Appium-driven mobile tests
//!
//! Hybrid banking apps render part of their UI natively and part inside
//! web views. appscout finds an element by its visible text or accessibility
//! id wherever it lives, and clicks it even when the matched node itself
//! refuses the tap.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    APPSCOUT Architecture                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Flows /    │    │ TextFinder │    │ Session    │            │
//! │   │ Screens    │───►│ Resilient  │───►│ (Appium    │            │
//! │   │            │    │ Clicker    │    │  or mock)  │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! │                      │  ▲                                        │
//! │                      ▼  │                                        │
//! │            ContextGuard · query builders · wait_until            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Native queries always run before web views. Every context switch is
//! scoped by [`ContextGuard`], so the session's active context after any
//! call is the one it had before.

#![warn(missing_docs)]

mod appium;
mod click;
mod config;
mod context;
mod finder;
mod fixture;
pub mod flows;
#[cfg(feature = "media")]
pub mod media;
mod mock;
mod platform;
pub mod query;
mod result;
pub mod screen;
mod session;
mod wait;

pub use appium::{element_from_value, AppiumServer, AppiumSession, W3C_ELEMENT_KEY};
pub use click::{
    AncestorClick, ClickOutcome, ClickStrategy, CoordinateTap, DirectClick, ResilientClicker,
    ANDROID_WEB_VIEW_CLASS, CLICK_GESTURE, DEVICE_PIXEL_RATIO_SCRIPT, IOS_WEB_VIEW_CLASS,
};
pub use config::{
    AndroidConfig, EndpointConfig, FinderConfig, IosConfig, QrConfig, ScoutConfig,
    DEFAULT_ANDROID_PORT, DEFAULT_CONFIG_FILE, DEFAULT_IOS_PORT, WORKER_PORT_STRIDE,
};
pub use context::{current_or_native, with_context, ContextGuard};
pub use finder::{LocatedElement, SearchTarget, TextFinder};
pub use fixture::{
    save_failure_screenshot, slug, AppiumServerFixture, BoxedSession, Fixture, FixtureManager,
    FixtureState, SessionFixture, SimpleFixture,
};
pub use mock::{MockElement, MockFailure, MockSession};
pub use platform::Platform;
pub use result::{ScoutError, ScoutResult};
pub use session::{
    is_web_context, By, ElementRef, Rect, Session, Strategy, WindowSize, NATIVE_APP,
    WEBVIEW_PREFIX,
};
pub use wait::{
    wait_until, Deadline, WaitOptions, Waits, DEFAULT_FIND_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_SCREEN_TIMEOUT_MS, MIN_POLL_INTERVAL_MS,
};

/// Commonly used items
pub mod prelude {
    pub use super::click::*;
    pub use super::config::*;
    pub use super::context::*;
    pub use super::finder::*;
    pub use super::fixture::*;
    pub use super::flows::{find_flow, select_flows, Flow, FlowContext, FLOWS};
    #[cfg(feature = "media")]
    pub use super::media::{clean_gallery, push_png, QrGenerator, QrKind, QrOverrides};
    pub use super::mock::*;
    pub use super::platform::*;
    pub use super::result::*;
    pub use super::screen::{BaseScreen, BottomNav, Screen, Tab};
    pub use super::session::*;
    pub use super::wait::*;
    pub use super::{AppiumServer, AppiumSession};
}
