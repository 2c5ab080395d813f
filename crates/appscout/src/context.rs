//! Scoped context switching.
//!
//! The session's active context is the one piece of shared mutable state the
//! engine touches. [`ContextGuard`] saves it, switches, and switches back when
//! dropped, so every exit path (early return, `?`, panic) restores it.

use crate::result::ScoutResult;
use crate::session::{Session, NATIVE_APP};

/// Current context, or `NATIVE_APP` when it cannot be read for a
/// non-fatal reason.
pub fn current_or_native(session: &dyn Session) -> ScoutResult<String> {
    match session.current_context() {
        Ok(name) => Ok(name),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::debug!(error = %e, "current context unreadable, assuming native");
            Ok(NATIVE_APP.to_string())
        }
    }
}

/// RAII guard over the session's active context.
pub struct ContextGuard<'s> {
    session: &'s dyn Session,
    saved: String,
    switched: bool,
}

impl std::fmt::Debug for ContextGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextGuard")
            .field("saved", &self.saved)
            .field("switched", &self.switched)
            .finish_non_exhaustive()
    }
}

impl<'s> ContextGuard<'s> {
    /// Switch to `target`, falling back to the current context if the switch
    /// fails for a non-fatal reason.
    pub fn enter(session: &'s dyn Session, target: &str) -> ScoutResult<Self> {
        let saved = current_or_native(session)?;
        let mut guard = Self {
            session,
            saved,
            switched: false,
        };
        if guard.saved != target {
            match session.switch_context(target) {
                Ok(()) => guard.switched = true,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        context = target,
                        current = %guard.saved,
                        error = %e,
                        "context switch failed, staying in current context"
                    );
                }
            }
        }
        Ok(guard)
    }

    /// Switch to `target` or fail; callers skip the context on `Err`.
    pub fn enter_strict(session: &'s dyn Session, target: &str) -> ScoutResult<Self> {
        let saved = current_or_native(session)?;
        let mut guard = Self {
            session,
            saved,
            switched: false,
        };
        if guard.saved != target {
            session.switch_context(target)?;
            guard.switched = true;
        }
        Ok(guard)
    }

    /// Context that will be restored
    #[must_use]
    pub fn saved(&self) -> &str {
        &self.saved
    }

    /// Whether the guard actually changed the context
    #[must_use]
    pub const fn switched(&self) -> bool {
        self.switched
    }

    /// Restore now and report the outcome.
    pub fn restore(mut self) -> ScoutResult<()> {
        self.restore_inner()
    }

    fn restore_inner(&mut self) -> ScoutResult<()> {
        if !self.switched {
            return Ok(());
        }
        self.switched = false;
        self.session.switch_context(&self.saved)
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.restore_inner() {
            tracing::warn!(context = %self.saved, error = %e, "failed to restore context");
        }
    }
}

/// Run `body` with `target` as the active context, restoring afterwards.
///
/// A failed switch runs `body` in whatever context is current; a failed
/// restore is logged, not returned.
pub fn with_context<T, F>(session: &dyn Session, target: &str, body: F) -> ScoutResult<T>
where
    F: FnOnce() -> ScoutResult<T>,
{
    let _guard = ContextGuard::enter(session, target)?;
    body()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mock::MockSession;
    use crate::result::ScoutError;

    const WEB: &str = "WEBVIEW_kz.halyk.onlinebank.stage";

    #[test]
    fn test_enter_switches_and_restores() {
        let session = MockSession::android();
        session.add_web_context(WEB);
        {
            let guard = ContextGuard::enter(&session, WEB).unwrap();
            assert!(guard.switched());
            assert_eq!(session.current_context().unwrap(), WEB);
        }
        assert_eq!(session.current_context().unwrap(), NATIVE_APP);
    }

    #[test]
    fn test_already_current_makes_no_switch() {
        let session = MockSession::android();
        {
            let guard = ContextGuard::enter(&session, NATIVE_APP).unwrap();
            assert!(!guard.switched());
        }
        assert_eq!(session.count_calls("switch:"), 0);
    }

    #[test]
    fn test_lenient_enter_degrades() {
        let session = MockSession::android();
        session.add_web_context(WEB);
        session.fail_switch_to(WEB);
        let guard = ContextGuard::enter(&session, WEB).unwrap();
        assert!(!guard.switched());
        assert_eq!(session.current_context().unwrap(), NATIVE_APP);
    }

    #[test]
    fn test_strict_enter_fails() {
        let session = MockSession::android();
        session.add_vanishing_context(WEB);
        let err = ContextGuard::enter_strict(&session, WEB).unwrap_err();
        assert!(matches!(err, ScoutError::NoSuchContext { .. }));
        assert_eq!(session.current_context().unwrap(), NATIVE_APP);
    }

    #[test]
    fn test_restored_after_error() {
        let session = MockSession::android();
        session.add_web_context(WEB);
        let out: ScoutResult<()> = with_context(&session, WEB, || {
            assert_eq!(session.current_context().unwrap(), WEB);
            Err(ScoutError::assertion("boom"))
        });
        assert!(out.is_err());
        assert_eq!(session.current_context().unwrap(), NATIVE_APP);
    }

    #[test]
    fn test_restored_after_panic() {
        let session = MockSession::android();
        session.add_web_context(WEB);
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ContextGuard::enter(&session, WEB).unwrap();
            panic!("body panicked");
        }));
        assert!(caught.is_err());
        assert_eq!(session.current_context().unwrap(), NATIVE_APP);
    }

    #[test]
    fn test_restores_webview_origin() {
        let session = MockSession::android();
        session.add_web_context(WEB);
        session.switch_context(WEB).unwrap();
        let value = with_context(&session, NATIVE_APP, || {
            assert_eq!(session.current_context().unwrap(), NATIVE_APP);
            Ok(7)
        })
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(session.current_context().unwrap(), WEB);
    }

    #[test]
    fn test_fatal_switch_propagates() {
        let session = MockSession::android();
        session.add_web_context(WEB);
        session.kill();
        assert!(ContextGuard::enter(&session, WEB).unwrap_err().is_fatal());
    }
}
