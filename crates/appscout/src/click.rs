//! Resilient clicking.
//!
//! A click walks an ordered list of [`ClickStrategy`] tiers until one
//! succeeds. Element-state failures (stale, covered, not interactable) move
//! on to the next tier; a lost session stops the chain immediately.

use crate::context::{current_or_native, ContextGuard};
use crate::finder::LocatedElement;
use crate::platform::Platform;
use crate::query::CLICKABLE_ANCESTOR_XPATH;
use crate::result::{ScoutError, ScoutResult};
use crate::session::{is_web_context, By, ElementRef, Rect, Session, Strategy, NATIVE_APP};
use serde_json::json;

/// Appium gesture command used by the coordinate tier
pub const CLICK_GESTURE: &str = "mobile: clickGesture";

/// Ratio of device pixels to CSS pixels in a web view
pub const DEVICE_PIXEL_RATIO_SCRIPT: &str = "return window.devicePixelRatio;";

/// Native class of an Android web view
pub const ANDROID_WEB_VIEW_CLASS: &str = "android.webkit.WebView";

/// Native class of an iOS web view
pub const IOS_WEB_VIEW_CLASS: &str = "XCUIElementTypeWebView";

/// One way of clicking an element
pub trait ClickStrategy {
    /// Tier name for logs and outcomes
    fn name(&self) -> &'static str;

    /// Try to click `element` in the active context
    fn attempt(&self, session: &dyn Session, element: &ElementRef) -> ScoutResult<()>;
}

/// Plain element click
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectClick;

impl ClickStrategy for DirectClick {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn attempt(&self, session: &dyn Session, element: &ElementRef) -> ScoutResult<()> {
        session.click(element)
    }
}

/// Click the nearest ancestor marked `clickable='true'`
#[derive(Debug, Clone, Copy, Default)]
pub struct AncestorClick;

impl ClickStrategy for AncestorClick {
    fn name(&self) -> &'static str {
        "ancestor"
    }

    fn attempt(&self, session: &dyn Session, element: &ElementRef) -> ScoutResult<()> {
        let ancestor = session
            .find_elements_from(element, &By::xpath(CLICKABLE_ANCESTOR_XPATH))?
            .into_iter()
            .next()
            .ok_or_else(|| ScoutError::NoSuchElement {
                message: format!("no clickable ancestor of {}", element.id()),
            })?;
        session.click(&ancestor)
    }
}

/// Tap the centre of the element's rectangle.
///
/// The gesture always runs in `NATIVE_APP`. For an element inside a web view
/// the CSS centre is mapped to screen coordinates: scaled by the page's
/// device-pixel ratio (Android; iOS works in points on both sides) and offset
/// by the native web view's bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateTap;

impl ClickStrategy for CoordinateTap {
    fn name(&self) -> &'static str {
        "gesture"
    }

    fn attempt(&self, session: &dyn Session, element: &ElementRef) -> ScoutResult<()> {
        let web = is_web_context(&current_or_native(session)?);
        let rect = session.rect(element)?;
        let ratio = if web { device_pixel_ratio(session)? } else { 1.0 };

        let _native = ContextGuard::enter_strict(session, NATIVE_APP)?;
        let (x, y) = if web {
            web_view_point(session, &rect, ratio)?
        } else {
            rect.center()
        };
        tracing::debug!(element = element.id(), x, y, web, "coordinate tap");
        session
            .execute_script(CLICK_GESTURE, vec![json!({ "x": x, "y": y })])
            .map(drop)
    }
}

/// `window.devicePixelRatio` of the active web context, 1 when unknown
fn device_pixel_ratio(session: &dyn Session) -> ScoutResult<f64> {
    if session.platform() == Platform::Ios {
        return Ok(1.0);
    }
    match session.execute_script(DEVICE_PIXEL_RATIO_SCRIPT, Vec::new()) {
        Ok(value) => Ok(value
            .as_f64()
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(1.0)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::debug!(error = %e, "device pixel ratio unavailable, assuming 1");
            Ok(1.0)
        }
    }
}

/// Screen point for the centre of a CSS rect; must run in `NATIVE_APP`
fn web_view_point(session: &dyn Session, css: &Rect, ratio: f64) -> ScoutResult<(i64, i64)> {
    let class = match session.platform() {
        Platform::Ios => IOS_WEB_VIEW_CLASS,
        Platform::Android | Platform::Unknown => ANDROID_WEB_VIEW_CLASS,
    };
    let view = session
        .find_elements(&By::new(Strategy::ClassName, class))?
        .into_iter()
        .next()
        .ok_or_else(|| ScoutError::NoSuchElement {
            message: format!("no native {class} to map web coordinates onto"),
        })?;
    let bounds = session.rect(&view)?;
    let x = bounds.x + (css.x + css.width / 2.0) * ratio;
    let y = bounds.y + (css.y + css.height / 2.0) * ratio;
    Ok((x as i64, y as i64))
}

/// Which tier landed the click
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickOutcome {
    /// Tier name
    pub tier: &'static str,
    /// Zero-based tier position
    pub index: usize,
    /// Context the click ran in
    pub context: String,
}

/// Ordered fallback chain of click strategies
pub struct ResilientClicker {
    tiers: Vec<Box<dyn ClickStrategy>>,
}

impl std::fmt::Debug for ResilientClicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClicker")
            .field("tiers", &self.tier_names())
            .finish()
    }
}

impl Default for ResilientClicker {
    fn default() -> Self {
        Self::new(vec![
            Box::new(DirectClick),
            Box::new(AncestorClick),
            Box::new(CoordinateTap),
        ])
    }
}

impl ResilientClicker {
    /// Chain with explicit tiers, tried in order
    #[must_use]
    pub fn new(tiers: Vec<Box<dyn ClickStrategy>>) -> Self {
        Self { tiers }
    }

    /// Tier names in order
    #[must_use]
    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Click `located`, switching into its context for the duration.
    ///
    /// The active context is restored before returning, on success and on
    /// failure alike.
    pub fn click(&self, located: &LocatedElement<'_>) -> ScoutResult<ClickOutcome> {
        let session = located.session();
        let guard = ContextGuard::enter(session, located.context())?;
        let mut last_error: Option<ScoutError> = None;

        for (index, tier) in self.tiers.iter().enumerate() {
            match tier.attempt(session, located.element()) {
                Ok(()) => {
                    tracing::info!(search = located.label(), context = located.context(), tier = tier.name(), "clicked");
                    return Ok(ClickOutcome {
                        tier: tier.name(),
                        index,
                        context: located.context().to_string(),
                    });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::debug!(search = located.label(), tier = tier.name(), error = %e, "click tier failed");
                    last_error = Some(e);
                }
            }
        }
        drop(guard);

        tracing::warn!(search = located.label(), context = located.context(), "all click tiers failed");
        Err(ScoutError::ClickFailed {
            target: located.describe(),
            tiers: self.tiers.len(),
            last_error: last_error.map_or_else(|| "no click tiers configured".to_string(), |e| e.to_string()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::finder::TextFinder;
    use crate::mock::{MockElement, MockFailure, MockSession};
    use crate::session::NATIVE_APP;
    use crate::wait::WaitOptions;
    use serde_json::json;

    const WEB: &str = "WEBVIEW_kz.halyk.onlinebank.stage";

    fn locate<'s>(session: &'s MockSession, text: &str) -> LocatedElement<'s> {
        TextFinder::with_options(session, WaitOptions::new().with_timeout(200).with_poll_interval(20))
            .find_anywhere(text)
            .unwrap()
            .expect("element should be found")
    }

    mod tier_tests {
        use super::*;

        #[test]
        fn test_direct_click() {
            let session = MockSession::android();
            session.add_element(MockElement::new("pay").text("Оплатить"));
            let outcome = locate(&session, "Оплатить").click().unwrap();
            assert_eq!(outcome.tier, "direct");
            assert_eq!(outcome.index, 0);
            assert_eq!(session.count_calls("click:pay"), 1);
        }

        #[test]
        fn test_ancestor_tier_skips_gesture() {
            let session = MockSession::android();
            session.add_element(MockElement::new("row").clickable(true));
            session.add_element(MockElement::new("wrapper").child_of("row"));
            session.add_element(
                MockElement::new("label")
                    .text("Все товары")
                    .child_of("wrapper")
                    .failing_click(MockFailure::NotInteractable),
            );
            let outcome = locate(&session, "Все товары").click().unwrap();
            assert_eq!(outcome.tier, "ancestor");
            assert!(session.was_called("click:row"));
            assert_eq!(session.count_calls("gesture:"), 0);
        }

        #[test]
        fn test_gesture_tier_taps_centre() {
            let session = MockSession::android();
            session.add_element(
                MockElement::new("icon")
                    .description("account-tenge")
                    .rect(100.0, 200.0, 60.0, 40.0)
                    .failing_click(MockFailure::Driver),
            );
            let outcome = locate(&session, "account-tenge").click().unwrap();
            assert_eq!(outcome.tier, "gesture");
            assert_eq!(outcome.index, 2);
            assert!(session.was_called("gesture:130,220"));
        }

        #[test]
        fn test_stale_element_falls_through() {
            let session = MockSession::android();
            session.add_element(MockElement::new("s").text("Перейти"));
            let located = locate(&session, "Перейти");
            session.make_stale("s");
            session.clear_history();

            let err = located.click().unwrap_err();
            match err {
                ScoutError::ClickFailed { target, tiers, last_error } => {
                    assert!(target.contains("Перейти"));
                    assert_eq!(tiers, 3);
                    assert!(last_error.contains("Stale"));
                }
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(session.count_calls("gesture:"), 0);
        }

        #[test]
        fn test_all_tiers_fail_once() {
            let session = MockSession::android();
            session.fail_gestures();
            session.fail_ancestor_lookup();
            session.add_element(
                MockElement::new("x")
                    .text("Поставьте оценку заказу")
                    .failing_click(MockFailure::Stale),
            );
            let err = locate(&session, "Поставьте оценку").click().unwrap_err();
            assert!(matches!(err, ScoutError::ClickFailed { .. }));
            assert_eq!(session.count_calls("gesture:"), 1);
        }

        #[test]
        fn test_lost_session_stops_chain() {
            let session = MockSession::android();
            session.add_element(MockElement::new("x").text("Оплатить"));
            let located = locate(&session, "Оплатить");
            session.kill();
            let err = located.click().unwrap_err();
            assert!(matches!(err, ScoutError::SessionLost { .. }));
        }

        #[test]
        fn test_custom_tiers() {
            let clicker = ResilientClicker::new(vec![Box::new(CoordinateTap)]);
            assert_eq!(clicker.tier_names(), vec!["gesture"]);
            assert_eq!(ResilientClicker::default().tier_names(), vec!["direct", "ancestor", "gesture"]);

            let session = MockSession::android();
            session.add_element(MockElement::new("x").text("QR"));
            let outcome = clicker.click(&locate(&session, "QR")).unwrap();
            assert_eq!(outcome.tier, "gesture");
            assert!(!session.was_called("click:"));
        }

        #[test]
        fn test_empty_chain_reports_failure() {
            let session = MockSession::android();
            session.add_element(MockElement::new("x").text("QR"));
            let err = ResilientClicker::new(Vec::new())
                .click(&locate(&session, "QR"))
                .unwrap_err();
            assert!(err.to_string().contains("no click tiers configured"));
        }
    }

    mod context_tests {
        use super::*;

        #[test]
        fn test_web_click_leaves_context_unchanged() {
            let session = MockSession::android();
            session.add_web_context(WEB);
            session.add_element(MockElement::new("w").in_context(WEB).text("Перейти к Заказам"));
            let located = locate(&session, "Перейти к Заказам");
            assert!(located.context().starts_with("WEBVIEW"));

            let outcome = located.click().unwrap();
            assert_eq!(outcome.context, WEB);
            assert_eq!(session.current_context().unwrap(), NATIVE_APP);
            // the click itself ran inside the web view
            let history = session.history();
            let click = history.iter().position(|c| c == "click:w").unwrap();
            let switch_in = history.iter().rposition(|c| c == &format!("switch:{WEB}")).unwrap();
            assert!(switch_in < click);
        }

        #[test]
        fn test_web_gesture_runs_native_in_screen_pixels() {
            let session = MockSession::android();
            session.add_web_context(WEB);
            session.set_script_result(DEVICE_PIXEL_RATIO_SCRIPT, json!(2.75));
            session.add_element(
                MockElement::new("view")
                    .class_name(ANDROID_WEB_VIEW_CLASS)
                    .rect(0.0, 210.0, 1080.0, 2000.0),
            );
            session.add_element(
                MockElement::new("w")
                    .in_context(WEB)
                    .text("Оплатить")
                    .rect(40.0, 100.0, 120.0, 40.0)
                    .failing_click(MockFailure::NotInteractable),
            );
            let outcome = locate(&session, "Оплатить").click().unwrap();
            assert_eq!(outcome.tier, "gesture");
            assert_eq!(outcome.context, WEB);

            // css centre (100, 120) * 2.75 + web view origin (0, 210)
            assert!(session.was_called("gesture:275,540"));
            let history = session.history();
            let gesture = history.iter().position(|c| c.starts_with("gesture:")).unwrap();
            let to_native = history[..gesture].iter().rposition(|c| c == "switch:NATIVE_APP").unwrap();
            let to_web = history[..gesture]
                .iter()
                .rposition(|c| c == &format!("switch:{WEB}"))
                .unwrap();
            assert!(to_web < to_native);
            assert!(history[..to_native].iter().any(|c| c == "rect:w"));
            assert!(history[to_native..gesture].iter().any(|c| c == "rect:view"));
            assert_eq!(session.current_context().unwrap(), NATIVE_APP);
        }

        #[test]
        fn test_ios_web_gesture_uses_points() {
            let session = MockSession::ios();
            session.add_web_context(WEB);
            session.add_element(
                MockElement::new("view")
                    .class_name(IOS_WEB_VIEW_CLASS)
                    .rect(0.0, 90.0, 390.0, 700.0),
            );
            session.add_element(
                MockElement::new("w")
                    .in_context(WEB)
                    .text("Оплатить")
                    .rect(20.0, 50.0, 100.0, 30.0)
                    .failing_click(MockFailure::Driver),
            );
            let outcome = locate(&session, "Оплатить").click().unwrap();
            assert_eq!(outcome.tier, "gesture");
            assert!(session.was_called("gesture:70,155"));
            assert!(!session.was_called(&format!("script:{DEVICE_PIXEL_RATIO_SCRIPT}")));
        }

        #[test]
        fn test_web_gesture_without_native_view_fails_tier() {
            let session = MockSession::android();
            session.add_web_context(WEB);
            session.add_element(
                MockElement::new("w")
                    .in_context(WEB)
                    .text("Оплатить")
                    .failing_click(MockFailure::Stale),
            );
            let err = locate(&session, "Оплатить").click().unwrap_err();
            match err {
                ScoutError::ClickFailed { last_error, .. } => {
                    assert!(last_error.contains(ANDROID_WEB_VIEW_CLASS));
                }
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(session.count_calls("gesture:"), 0);
            assert_eq!(session.current_context().unwrap(), NATIVE_APP);
        }

        #[test]
        fn test_restored_after_failure() {
            let session = MockSession::android();
            session.add_web_context(WEB);
            session.fail_gestures();
            session.add_element(
                MockElement::new("w")
                    .in_context(WEB)
                    .text("Оплатить")
                    .failing_click(MockFailure::NotInteractable),
            );
            let located = locate(&session, "Оплатить");
            assert!(located.click().is_err());
            assert_eq!(session.current_context().unwrap(), NATIVE_APP);
        }

        #[test]
        fn test_native_click_from_web_origin() {
            let session = MockSession::android();
            session.add_web_context(WEB);
            session.add_element(MockElement::new("n").description("Главная"));
            session.switch_context(WEB).unwrap();
            let located = locate(&session, "Главная");
            located.click().unwrap();
            assert_eq!(session.current_context().unwrap(), WEB);
        }
    }
}
