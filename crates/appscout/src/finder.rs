//! Cross-context element location.
//!
//! [`TextFinder`] looks for a target in the native UI first (platform
//! queries, most specific first) and then in every live web view, polling
//! until a wall-clock deadline. A hit comes back as a [`LocatedElement`]
//! bound to the context it was found in. The session's active context is
//! the same after every call as before it.

use crate::click::{ClickOutcome, ResilientClicker};
use crate::context::{with_context, ContextGuard};
use crate::query::{webview_text_query, BODY_TEXT_SCRIPT};
use crate::result::ScoutResult;
use crate::session::{is_web_context, By, ElementRef, Rect, Session, NATIVE_APP};
use crate::wait::{Deadline, WaitOptions};
use std::collections::HashSet;
use std::time::Duration;

// =============================================================================
// SEARCH TARGET
// =============================================================================

/// What to look for, with optional per-call timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    /// Accessibility id or visible text
    pub text: String,
    /// Overrides the finder's timeout
    pub timeout_ms: Option<u64>,
    /// Overrides the finder's poll interval
    pub poll_ms: Option<u64>,
}

impl SearchTarget {
    /// Target with finder defaults
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timeout_ms: None,
            poll_ms: None,
        }
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Set poll interval in milliseconds
    #[must_use]
    pub const fn with_poll(mut self, poll_ms: u64) -> Self {
        self.poll_ms = Some(poll_ms);
        self
    }

    /// Trimmed text, `None` when there is nothing to search for
    #[must_use]
    pub fn normalized(&self) -> Option<&str> {
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    fn timing(&self, defaults: WaitOptions) -> (Duration, Duration) {
        (
            Duration::from_millis(self.timeout_ms.unwrap_or(defaults.timeout_ms)),
            Duration::from_millis(self.poll_ms.unwrap_or(defaults.poll_interval_ms)),
        )
    }
}

impl From<&str> for SearchTarget {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for SearchTarget {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<&String> for SearchTarget {
    fn from(text: &String) -> Self {
        Self::new(text.as_str())
    }
}

// =============================================================================
// LOCATED ELEMENT
// =============================================================================

/// An element together with the context it lives in.
///
/// Every operation switches to that context first and switches back
/// afterwards. The reference can go stale once the screen changes.
#[derive(Clone)]
pub struct LocatedElement<'s> {
    element: ElementRef,
    context: String,
    label: String,
    session: &'s dyn Session,
}

impl std::fmt::Debug for LocatedElement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocatedElement")
            .field("element", &self.element)
            .field("context", &self.context)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl<'s> LocatedElement<'s> {
    /// Bind an element to its context
    #[must_use]
    pub fn new(
        session: &'s dyn Session,
        element: ElementRef,
        context: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            element,
            context: context.into(),
            label: label.into(),
            session,
        }
    }

    /// Remote element reference
    #[must_use]
    pub const fn element(&self) -> &ElementRef {
        &self.element
    }

    /// Context the element was found in
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Search target that produced this element
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Owning session
    #[must_use]
    pub fn session(&self) -> &'s dyn Session {
        self.session
    }

    /// Whether the element lives in a web view
    #[must_use]
    pub fn is_web(&self) -> bool {
        is_web_context(&self.context)
    }

    /// Human readable description for logs and errors
    #[must_use]
    pub fn describe(&self) -> String {
        format!("'{}' ({} in {})", self.label, self.element.id(), self.context)
    }

    /// Click through the default fallback chain
    pub fn click(&self) -> ScoutResult<ClickOutcome> {
        ResilientClicker::default().click(self)
    }

    /// Visible text
    pub fn text(&self) -> ScoutResult<String> {
        with_context(self.session, &self.context, || self.session.text(&self.element))
    }

    /// Attribute value
    pub fn attribute(&self, name: &str) -> ScoutResult<Option<String>> {
        with_context(self.session, &self.context, || {
            self.session.attribute(&self.element, name)
        })
    }

    /// Bounding rectangle
    pub fn rect(&self) -> ScoutResult<Rect> {
        with_context(self.session, &self.context, || self.session.rect(&self.element))
    }

    /// Whether the element is displayed
    pub fn is_displayed(&self) -> ScoutResult<bool> {
        with_context(self.session, &self.context, || {
            self.session.is_displayed(&self.element)
        })
    }

    /// Type into the element
    pub fn send_keys(&self, text: &str) -> ScoutResult<()> {
        with_context(self.session, &self.context, || {
            self.session.send_keys(&self.element, text)
        })
    }
}

// =============================================================================
// TEXT FINDER
// =============================================================================

/// Non-fatal errors become "no match"; fatal ones propagate.
fn lenient<T: Default>(result: ScoutResult<T>, what: &str) -> ScoutResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::debug!(step = what, error = %e, "lookup failed, treating as no match");
            Ok(T::default())
        }
    }
}

/// Searches native and web contexts for a target
#[derive(Clone, Copy)]
pub struct TextFinder<'s> {
    session: &'s dyn Session,
    options: WaitOptions,
}

impl std::fmt::Debug for TextFinder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextFinder")
            .field("platform", &self.session.platform())
            .field("options", &self.options)
            .finish()
    }
}

impl<'s> TextFinder<'s> {
    /// Finder with default timing
    #[must_use]
    pub fn new(session: &'s dyn Session) -> Self {
        Self::with_options(session, WaitOptions::default())
    }

    /// Finder with explicit timing
    #[must_use]
    pub fn with_options(session: &'s dyn Session, options: WaitOptions) -> Self {
        Self { session, options }
    }

    /// Default timing
    #[must_use]
    pub const fn options(&self) -> WaitOptions {
        self.options
    }

    /// Session searched
    #[must_use]
    pub fn session(&self) -> &'s dyn Session {
        self.session
    }

    /// First element matching `target` in any context, or `None` once the
    /// deadline passes.
    pub fn find_anywhere(
        &self,
        target: impl Into<SearchTarget>,
    ) -> ScoutResult<Option<LocatedElement<'s>>> {
        let target = target.into();
        let Some(text) = target.normalized() else {
            tracing::warn!("empty search target");
            return Ok(None);
        };
        let (timeout, poll) = target.timing(self.options);
        let deadline = Deadline::after(timeout);
        tracing::debug!(search = text, platform = %self.session.platform(), timeout_ms = timeout.as_millis() as u64, "searching");

        loop {
            if let Some(element) = self.native_first(text)? {
                tracing::info!(search = text, context = NATIVE_APP, elapsed_ms = deadline.elapsed().as_millis() as u64, "found");
                return Ok(Some(LocatedElement::new(self.session, element, NATIVE_APP, text)));
            }
            for context in self.web_contexts()? {
                if let Some(element) = self.web_matches(&context, text, true)?.into_iter().next() {
                    tracing::info!(search = text, context = %context, elapsed_ms = deadline.elapsed().as_millis() as u64, "found");
                    return Ok(Some(LocatedElement::new(self.session, element, context, text)));
                }
            }
            if deadline.expired() {
                tracing::debug!(search = text, elapsed_ms = deadline.elapsed().as_millis() as u64, "not found");
                return Ok(None);
            }
            deadline.sleep_slice(poll);
        }
    }

    /// Every displayed element matching `target` across all contexts.
    ///
    /// Returns as soon as one pass yields anything; empty on deadline.
    pub fn find_all_anywhere(
        &self,
        target: impl Into<SearchTarget>,
    ) -> ScoutResult<Vec<LocatedElement<'s>>> {
        let target = target.into();
        let Some(text) = target.normalized() else {
            return Ok(Vec::new());
        };
        let (timeout, poll) = target.timing(self.options);
        let deadline = Deadline::after(timeout);

        loop {
            let mut found: Vec<LocatedElement<'s>> = self
                .native_all(text)?
                .into_iter()
                .map(|e| LocatedElement::new(self.session, e, NATIVE_APP, text))
                .collect();
            for context in self.web_contexts()? {
                for element in self.web_matches(&context, text, false)? {
                    found.push(LocatedElement::new(self.session, element, context.as_str(), text));
                }
            }
            if !found.is_empty() {
                tracing::info!(search = text, count = found.len(), "found all");
                return Ok(found);
            }
            if deadline.expired() {
                return Ok(Vec::new());
            }
            deadline.sleep_slice(poll);
        }
    }

    /// Whether `target` shows up anywhere before the deadline
    pub fn present_anywhere(&self, target: impl Into<SearchTarget>) -> ScoutResult<bool> {
        Ok(self.find_anywhere(target)?.is_some())
    }

    /// Ordered platform queries in the native context; first match wins.
    fn native_first(&self, text: &str) -> ScoutResult<Option<ElementRef>> {
        let queries = self.session.platform().native_queries(text);
        let _guard = ContextGuard::enter(self.session, NATIVE_APP)?;
        for by in &queries {
            let found = lenient(self.session.find_elements(by), "native query")?;
            if let Some(first) = found.into_iter().next() {
                tracing::debug!(search = text, query = %by, "native hit");
                return Ok(Some(first));
            }
        }
        Ok(None)
    }

    /// All displayed native matches over every query, deduplicated.
    fn native_all(&self, text: &str) -> ScoutResult<Vec<ElementRef>> {
        let queries = self.session.platform().native_queries(text);
        let _guard = ContextGuard::enter(self.session, NATIVE_APP)?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for by in &queries {
            for element in lenient(self.session.find_elements(by), "native query")? {
                if seen.insert(element.clone()) && self.displayed(&element)? {
                    out.push(element);
                }
            }
        }
        Ok(out)
    }

    fn displayed(&self, element: &ElementRef) -> ScoutResult<bool> {
        lenient(self.session.is_displayed(element), "displayed")
    }

    /// Web view contexts currently listed by the session
    fn web_contexts(&self) -> ScoutResult<Vec<String>> {
        let contexts = lenient(self.session.contexts(), "contexts")?;
        Ok(contexts.into_iter().filter(|c| is_web_context(c)).collect())
    }

    /// Displayed matches in one web context, deepest nodes only. With
    /// `first_only`, stops at the first displayed match in document order.
    fn web_matches(&self, context: &str, text: &str, first_only: bool) -> ScoutResult<Vec<ElementRef>> {
        let _guard = match ContextGuard::enter_strict(self.session, context) {
            Ok(guard) => guard,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::debug!(context, error = %e, "skipping web context");
                return Ok(Vec::new());
            }
        };

        match self.session.execute_script(BODY_TEXT_SCRIPT, Vec::new()) {
            Ok(body) => {
                let body = body.as_str().unwrap_or_default().to_lowercase();
                if !body.contains(&text.to_lowercase()) {
                    return Ok(Vec::new());
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => tracing::debug!(context, error = %e, "body text unavailable, querying anyway"),
        }

        let Some(by) = webview_text_query(text) else {
            return Ok(Vec::new());
        };
        self.displayed_matches(&by, first_only)
    }

    fn displayed_matches(&self, by: &By, first_only: bool) -> ScoutResult<Vec<ElementRef>> {
        let found = lenient(self.session.find_elements(by), "web query")?;
        let mut out = Vec::new();
        for element in found {
            if self.displayed(&element)? {
                out.push(element);
                if first_only {
                    break;
                }
            }
        }
        Ok(out)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mock::{MockElement, MockSession};
    use crate::platform::Platform;
    use crate::result::ScoutError;
    use std::time::Instant;

    const WEB: &str = "WEBVIEW_kz.halyk.onlinebank.stage";

    fn finder(session: &MockSession) -> TextFinder<'_> {
        TextFinder::with_options(
            session,
            WaitOptions::new().with_timeout(300).with_poll_interval(50),
        )
    }

    mod search_target_tests {
        use super::*;

        #[test]
        fn test_from_str_and_builders() {
            let t = SearchTarget::from("  Каталог ").with_timeout(2000).with_poll(100);
            assert_eq!(t.normalized(), Some("Каталог"));
            assert_eq!(t.timeout_ms, Some(2000));
            assert_eq!(t.poll_ms, Some(100));
        }

        #[test]
        fn test_timing_falls_back_to_finder() {
            let t = SearchTarget::new("x").with_timeout(10);
            let (timeout, poll) = t.timing(WaitOptions::default());
            assert_eq!(timeout, Duration::from_millis(10));
            assert_eq!(poll, Duration::from_millis(crate::wait::DEFAULT_POLL_INTERVAL_MS));
        }
    }

    mod native_tests {
        use super::*;

        #[test]
        fn test_content_desc_found_within_one_poll() {
            let session = MockSession::android();
            session.add_element(MockElement::new("tab-cart").description("Корзина"));
            let start = Instant::now();
            let found = TextFinder::new(&session)
                .find_anywhere(SearchTarget::new("Корзина").with_timeout(5000))
                .unwrap()
                .unwrap();
            assert!(start.elapsed() < Duration::from_millis(crate::wait::DEFAULT_POLL_INTERVAL_MS));
            assert_eq!(found.context(), NATIVE_APP);
            assert_eq!(found.element(), &ElementRef::new("tab-cart"));
            assert_eq!(session.count_calls("find:"), 1);
        }

        #[test]
        fn test_text_match_after_description_queries() {
            let session = MockSession::android();
            session.add_element(MockElement::new("btn").text("Создать заказ"));
            let found = finder(&session).find_anywhere("Создать заказ").unwrap().unwrap();
            assert_eq!(found.element().id(), "btn");
            assert_eq!(session.count_calls("find:"), 3);
        }

        #[test]
        fn test_ios_accessibility_id() {
            let session = MockSession::ios();
            session.add_element(MockElement::new("qr").description("QR"));
            let found = finder(&session).find_anywhere("QR").unwrap().unwrap();
            assert_eq!(found.context(), NATIVE_APP);
            assert!(session.was_called("find:accessibility id=QR"));
        }

        #[test]
        fn test_unknown_platform_finds_element() {
            let session = MockSession::new(Platform::Unknown);
            session.add_element(MockElement::new("x").description("Главная"));
            let found = finder(&session).find_anywhere("Главная").unwrap();
            assert!(found.is_some());
        }

        #[test]
        fn test_element_appearing_on_later_pass() {
            let session = MockSession::android();
            // invisible to the six queries of the first pass
            session.add_element(MockElement::new("late").text("Все товары").hidden_for_lookups(6));
            let found = finder(&session).find_anywhere("Все товары").unwrap();
            assert!(found.is_some());
        }
    }

    mod absence_tests {
        use super::*;

        #[test]
        fn test_absence_is_idempotent() {
            let session = MockSession::android();
            session.add_web_context(WEB);
            let f = finder(&session).with_timeout_for_test(100);
            for _ in 0..2 {
                assert!(f.find_anywhere("Нет такого").unwrap().is_none());
                assert_eq!(session.current_context().unwrap(), NATIVE_APP);
            }
            assert!(!session.was_called("click:"));
        }

        #[test]
        fn test_deadline_respected() {
            let session = MockSession::android();
            let start = Instant::now();
            let found = TextFinder::new(&session)
                .find_anywhere(SearchTarget::new("absent").with_timeout(300).with_poll(100))
                .unwrap();
            let elapsed = start.elapsed();
            assert!(found.is_none());
            assert!(elapsed >= Duration::from_millis(300));
            assert!(elapsed < Duration::from_millis(300 + 100 + 150));
        }

        #[test]
        fn test_empty_target_touches_nothing() {
            let session = MockSession::android();
            assert!(finder(&session).find_anywhere("   ").unwrap().is_none());
            assert!(finder(&session).find_all_anywhere("").unwrap().is_empty());
            assert!(session.history().is_empty());
        }

        #[test]
        fn test_present_anywhere() {
            let session = MockSession::android();
            session.add_element(MockElement::new("a").text("Мои заказы"));
            let f = finder(&session).with_timeout_for_test(100);
            assert!(f.present_anywhere("Мои заказы").unwrap());
            assert!(!f.present_anywhere("Чужие заказы").unwrap());
        }

        #[test]
        fn test_lost_session_propagates() {
            let session = MockSession::android();
            session.kill();
            let err = finder(&session).find_anywhere("x").unwrap_err();
            assert!(matches!(err, ScoutError::SessionLost { .. }));
        }
    }

    mod web_tests {
        use super::*;

        #[test]
        fn test_native_queries_exhausted_before_web() {
            let session = MockSession::android();
            session.add_web_context(WEB);
            session.add_element(MockElement::new("w").in_context(WEB).text("Оформить"));
            let found = finder(&session).find_anywhere("Оформить").unwrap().unwrap();
            assert_eq!(found.context(), WEB);
            assert!(found.is_web());

            let history = session.history();
            let last_native = history
                .iter()
                .rposition(|c| c.starts_with("find:-android uiautomator"))
                .unwrap();
            let web_query = history.iter().position(|c| c.starts_with("find:xpath")).unwrap();
            assert_eq!(session.count_calls("find:-android uiautomator"), 6);
            assert!(last_native < web_query);
            assert_eq!(session.current_context().unwrap(), NATIVE_APP);
        }

        #[test]
        fn test_body_text_miss_skips_xpath() {
            let session = MockSession::android();
            session.add_web_context(WEB);
            session.add_element(MockElement::new("w").in_context(WEB).text("Другое"));
            let f = finder(&session).with_timeout_for_test(0);
            assert!(f.find_anywhere("Оплатить").unwrap().is_none());
            assert!(!session.was_called("find:xpath"));
        }

        #[test]
        fn test_vanishing_context_is_skipped() {
            let session = MockSession::android();
            session.add_vanishing_context("WEBVIEW_stale");
            session.add_web_context(WEB);
            session.add_element(MockElement::new("w").in_context(WEB).text("Перейти"));
            let found = finder(&session).find_anywhere("Перейти").unwrap().unwrap();
            assert_eq!(found.context(), WEB);
            assert_eq!(session.current_context().unwrap(), NATIVE_APP);
        }

        #[test]
        fn test_restores_original_web_context() {
            let session = MockSession::android();
            session.add_web_context(WEB);
            session.add_element(MockElement::new("n").description("Каталог"));
            session.switch_context(WEB).unwrap();
            let found = finder(&session).find_anywhere("Каталог").unwrap().unwrap();
            assert_eq!(found.context(), NATIVE_APP);
            assert_eq!(session.current_context().unwrap(), WEB);
        }

        #[test]
        fn test_first_displayed_web_match_wins() {
            let session = MockSession::android();
            session.add_web_context(WEB);
            session.add_element(MockElement::new("hidden").in_context(WEB).text("500 ₸").displayed(false));
            session.add_element(MockElement::new("total").in_context(WEB).text("Итого 1 000 ₸"));
            session.add_element(MockElement::new("fee").in_context(WEB).text("Комиссия 0 ₸"));
            let found = finder(&session).find_anywhere("₸").unwrap().unwrap();
            assert_eq!(found.element().id(), "total");
        }

        #[test]
        fn test_enclosing_web_nodes_are_not_matches() {
            let session = MockSession::android();
            session.add_web_context(WEB);
            nested_order_button(&session);
            let found = finder(&session).find_anywhere("Создать заказ").unwrap().unwrap();
            assert_eq!(found.element().id(), "button");

            let all = finder(&session).find_all_anywhere("Создать заказ").unwrap();
            let ids: Vec<&str> = all.iter().map(|l| l.element().id()).collect();
            assert_eq!(ids, vec!["button"]);
        }
    }

    /// `<html><body><div><button>Создать заказ</button></div></body></html>`
    fn nested_order_button(session: &MockSession) {
        session.add_element(MockElement::new("html").in_context(WEB).class_name("html"));
        session.add_element(MockElement::new("body").in_context(WEB).class_name("body").child_of("html"));
        session.add_element(MockElement::new("div").in_context(WEB).class_name("div").child_of("body"));
        session.add_element(
            MockElement::new("button")
                .in_context(WEB)
                .class_name("button")
                .child_of("div")
                .text("Создать заказ"),
        );
    }

    mod find_all_tests {
        use super::*;

        #[test]
        fn test_collects_across_contexts() {
            let session = MockSession::android();
            session.add_web_context(WEB);
            session.add_element(MockElement::new("a").description("Добавить в корзину"));
            session.add_element(MockElement::new("b").text("В корзину"));
            session.add_element(MockElement::new("hidden").text("корзину").displayed(false));
            session.add_element(MockElement::new("w").in_context(WEB).text("Положить в корзину"));

            let all = finder(&session).find_all_anywhere("корзину").unwrap();
            let ids: Vec<(&str, &str)> = all.iter().map(|l| (l.element().id(), l.context())).collect();
            assert_eq!(ids, vec![("a", NATIVE_APP), ("b", NATIVE_APP), ("w", WEB)]);
            assert_eq!(session.current_context().unwrap(), NATIVE_APP);
        }

        #[test]
        fn test_empty_on_deadline() {
            let session = MockSession::android();
            let all = finder(&session)
                .find_all_anywhere(SearchTarget::new("nothing").with_timeout(50))
                .unwrap();
            assert!(all.is_empty());
        }
    }

    mod located_tests {
        use super::*;

        #[test]
        fn test_operations_run_in_element_context() {
            let session = MockSession::android();
            session.add_web_context(WEB);
            session.add_element(
                MockElement::new("w")
                    .in_context(WEB)
                    .text("Платежное поручение")
                    .rect(10.0, 10.0, 200.0, 50.0),
            );
            let found = finder(&session).find_anywhere("Платежное").unwrap().unwrap();
            assert_eq!(found.text().unwrap(), "Платежное поручение");
            assert_eq!(found.rect().unwrap().center(), (110, 35));
            assert!(found.is_displayed().unwrap());
            assert_eq!(session.current_context().unwrap(), NATIVE_APP);
            assert!(found.describe().contains(WEB));
        }
    }

    impl<'s> TextFinder<'s> {
        fn with_timeout_for_test(self, timeout_ms: u64) -> Self {
            Self::with_options(self.session, self.options.with_timeout(timeout_ms))
        }
    }
}
