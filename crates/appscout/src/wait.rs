//! Wait Mechanisms
//!
//! Blocking poll-until-condition helpers. A wait that runs out of time
//! returns `None` (or `false`): absence is an ordinary branch for callers.
//! Only fatal session errors surface as `Err`.

use crate::result::ScoutResult;
use crate::session::{By, ElementRef, Session};
use std::time::{Duration, Instant};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for locate operations (10 seconds)
pub const DEFAULT_FIND_TIMEOUT_MS: u64 = 10_000;

/// Default polling interval (500ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default timeout for direct-locator waits on screens (15 seconds)
pub const DEFAULT_SCREEN_TIMEOUT_MS: u64 = 15_000;

/// Shortest pause between polls; smaller intervals are raised to this
pub const MIN_POLL_INTERVAL_MS: u64 = 10;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_FIND_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// DEADLINE
// =============================================================================

/// Wall-clock deadline computed once at call entry
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    end: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        let start = Instant::now();
        Self {
            start,
            end: start + timeout,
        }
    }

    /// Whether the deadline has passed
    #[must_use]
    pub fn expired(&self) -> bool {
        Instant::now() >= self.end
    }

    /// Time left, zero once expired
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }

    /// Time since the deadline was created
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Sleep for one poll interval (at least [`MIN_POLL_INTERVAL_MS`]),
    /// never past the deadline
    pub fn sleep_slice(&self, poll: Duration) {
        let slice = poll
            .max(Duration::from_millis(MIN_POLL_INTERVAL_MS))
            .min(self.remaining());
        if !slice.is_zero() {
            std::thread::sleep(slice);
        }
    }
}

// =============================================================================
// WAIT PRIMITIVE
// =============================================================================

/// Poll `condition` until it yields a value or `timeout` elapses.
///
/// The condition always runs at least once. Returns `Ok(None)` on timeout;
/// errors from it are returned immediately, so conditions should only
/// propagate fatal ones.
pub fn wait_until<T, F>(timeout: Duration, poll: Duration, mut condition: F) -> ScoutResult<Option<T>>
where
    F: FnMut() -> ScoutResult<Option<T>>,
{
    let deadline = Deadline::after(timeout);
    loop {
        if let Some(value) = condition()? {
            return Ok(Some(value));
        }
        if deadline.expired() {
            return Ok(None);
        }
        deadline.sleep_slice(poll);
    }
}

/// Keep fatal errors, turn everything else into "not yet".
pub(crate) fn absorb<T>(result: ScoutResult<T>) -> ScoutResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::debug!(error = %e, "condition failed, retrying");
            Ok(None)
        }
    }
}

// =============================================================================
// DIRECT-LOCATOR WAITS
// =============================================================================

/// Waits over a single locator in the active context
#[derive(Clone, Copy)]
pub struct Waits<'s> {
    session: &'s dyn Session,
    options: WaitOptions,
}

impl std::fmt::Debug for Waits<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waits")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'s> Waits<'s> {
    /// Create waits with the given options
    #[must_use]
    pub fn new(session: &'s dyn Session, options: WaitOptions) -> Self {
        Self { session, options }
    }

    /// Options in use
    #[must_use]
    pub const fn options(&self) -> WaitOptions {
        self.options
    }

    /// Same waits with a different timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.options.timeout_ms = timeout_ms;
        self
    }

    fn first_matching<P>(&self, by: &By, accept: P) -> ScoutResult<Option<ElementRef>>
    where
        P: Fn(&ElementRef) -> ScoutResult<bool>,
    {
        wait_until(self.options.timeout(), self.options.poll_interval(), || {
            let Some(elements) = absorb(self.session.find_elements(by))? else {
                return Ok(None);
            };
            for element in elements {
                if absorb(accept(&element))?.unwrap_or(false) {
                    return Ok(Some(element));
                }
            }
            Ok(None)
        })
    }

    /// Element attached to the UI tree, displayed or not
    pub fn present(&self, by: &By) -> ScoutResult<Option<ElementRef>> {
        self.first_matching(by, |_| Ok(true))
    }

    /// Element that is displayed
    pub fn visible(&self, by: &By) -> ScoutResult<Option<ElementRef>> {
        self.first_matching(by, |e| self.session.is_displayed(e))
    }

    /// Element that is displayed and enabled
    pub fn clickable(&self, by: &By) -> ScoutResult<Option<ElementRef>> {
        self.first_matching(by, |e| {
            Ok(self.session.is_displayed(e)? && self.session.is_enabled(e)?)
        })
    }

    /// Wait until no displayed element matches `by`
    pub fn gone(&self, by: &By, timeout_ms: Option<u64>) -> ScoutResult<bool> {
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(self.options.timeout_ms));
        let vanished = wait_until(timeout, self.options.poll_interval(), || {
            let Some(elements) = absorb(self.session.find_elements(by))? else {
                return Ok(None);
            };
            for element in &elements {
                // a stale reference counts as gone
                if absorb(self.session.is_displayed(element))?.unwrap_or(false) {
                    return Ok(None);
                }
            }
            Ok(Some(()))
        })?;
        Ok(vanished.is_some())
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
    use crate::result::ScoutError;
    use std::cell::Cell;

    mod wait_options_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let opts = WaitOptions::default();
            assert_eq!(opts.timeout_ms, DEFAULT_FIND_TIMEOUT_MS);
            assert_eq!(opts.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        }

        #[test]
        fn test_builders() {
            let opts = WaitOptions::new().with_timeout(5000).with_poll_interval(300);
            assert_eq!(opts.timeout(), Duration::from_millis(5000));
            assert_eq!(opts.poll_interval(), Duration::from_millis(300));
        }
    }

    mod wait_until_tests {
        use super::*;

        #[test]
        fn test_returns_early() {
            let calls = Cell::new(0);
            let start = Instant::now();
            let got = wait_until(Duration::from_secs(5), Duration::from_millis(10), || {
                calls.set(calls.get() + 1);
                Ok((calls.get() == 3).then_some("ok"))
            })
            .unwrap();
            assert_eq!(got, Some("ok"));
            assert_eq!(calls.get(), 3);
            assert!(start.elapsed() < Duration::from_secs(1));
        }

        #[test]
        fn test_timeout_is_sentinel() {
            let start = Instant::now();
            let got: Option<()> =
                wait_until(Duration::from_millis(120), Duration::from_millis(50), || Ok(None))
                    .unwrap();
            assert!(got.is_none());
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(120));
            assert!(elapsed < Duration::from_millis(120 + 50 + 100));
        }

        #[test]
        fn test_zero_timeout_checks_once() {
            let calls = Cell::new(0);
            let got: Option<()> = wait_until(Duration::ZERO, Duration::from_millis(10), || {
                calls.set(calls.get() + 1);
                Ok(None)
            })
            .unwrap();
            assert!(got.is_none());
            assert_eq!(calls.get(), 1);
        }

        #[test]
        fn test_zero_poll_does_not_spin() {
            let calls = Cell::new(0);
            let got: Option<()> = wait_until(Duration::from_millis(100), Duration::ZERO, || {
                calls.set(calls.get() + 1);
                Ok(None)
            })
            .unwrap();
            assert!(got.is_none());
            let max_calls = 100 / MIN_POLL_INTERVAL_MS + 2;
            assert!(calls.get() <= max_calls, "{} checks in 100ms", calls.get());
        }

        #[test]
        fn test_error_propagates() {
            let err = wait_until::<(), _>(Duration::from_secs(1), Duration::from_millis(10), || {
                Err(ScoutError::transport("refused"))
            })
            .unwrap_err();
            assert!(err.is_fatal());
        }
    }

    mod waits_tests {
        use super::*;

        fn fast(session: &MockSession) -> Waits<'_> {
            Waits::new(
                session,
                WaitOptions::new().with_timeout(200).with_poll_interval(20),
            )
        }

        #[test]
        fn test_visible_and_clickable() {
            let session = MockSession::android();
            session.add_element(MockElement::new("login").resource_id("app:id/login_button"));
            session.add_element(
                MockElement::new("disabled")
                    .resource_id("app:id/pay")
                    .enabled(false),
            );

            let waits = fast(&session);
            assert_eq!(
                waits.visible(&By::id("app:id/login_button")).unwrap(),
                Some(ElementRef::new("login"))
            );
            assert!(waits.clickable(&By::id("app:id/pay")).unwrap().is_none());
            assert!(waits.present(&By::id("app:id/pay")).unwrap().is_some());
        }

        #[test]
        fn test_hidden_element_not_visible() {
            let session = MockSession::android();
            session.add_element(
                MockElement::new("spinner")
                    .resource_id("app:id/progress")
                    .displayed(false),
            );
            let waits = fast(&session);
            assert!(waits.visible(&By::id("app:id/progress")).unwrap().is_none());
            assert!(waits.gone(&By::id("app:id/progress"), Some(100)).unwrap());
        }

        #[test]
        fn test_gone_times_out_while_displayed() {
            let session = MockSession::android();
            session.add_element(MockElement::new("banner").resource_id("app:id/banner"));
            let waits = fast(&session);
            assert!(!waits.gone(&By::id("app:id/banner"), Some(100)).unwrap());
        }

        #[test]
        fn test_element_appearing_later() {
            let session = MockSession::android();
            session.add_element(
                MockElement::new("late")
                    .resource_id("app:id/late")
                    .hidden_for_lookups(2),
            );
            let waits = fast(&session);
            assert!(waits.present(&By::id("app:id/late")).unwrap().is_some());
        }

        #[test]
        fn test_lost_session_surfaces() {
            let session = MockSession::android();
            session.kill();
            let err = fast(&session).present(&By::id("x")).unwrap_err();
            assert!(matches!(err, ScoutError::SessionLost { .. }));
        }
    }
}
