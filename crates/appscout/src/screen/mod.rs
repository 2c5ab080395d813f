//! Screen objects for the Online Duken flows.
//!
//! Every screen wraps a [`BaseScreen`], which bundles the session with a
//! [`TextFinder`] and [`Waits`] sharing one set of timeouts. Screens only
//! name things (texts, resource ids) and sequence taps; locating and
//! clicking live in the engine.

mod login;
mod nav;
mod payment;
mod picker;
mod shop;

pub use login::{LoginScreen, ONLINE_DUKEN_TEXT, PIN_ZERO_XPATH, STAGE_OTP};
pub use nav::{BottomNav, Tab};
pub use payment::{PaymentScreen, ScannerScreen, SuccessScreen};
pub use picker::{PickerProvider, PickerScreen};
pub use shop::{CartScreen, CatalogScreen, MainOrdersScreen, CURRENCY_SIGN};

use crate::click::ClickOutcome;
use crate::context::current_or_native;
use crate::finder::{LocatedElement, SearchTarget, TextFinder};
use crate::result::{ScoutError, ScoutResult};
use crate::session::{By, Session};
use crate::wait::{WaitOptions, Waits};

/// Resource id prefix of the staged banking app
pub const APP_ID_PREFIX: &str = "kz.halyk.onlinebank.stage:id/";

/// Full resource id for a short app id
#[must_use]
pub fn app_id(short: &str) -> String {
    format!("{APP_ID_PREFIX}{short}")
}

/// A page of the app under test
pub trait Screen<'s> {
    /// Screen name for logs
    fn name(&self) -> &'static str;

    /// Text that proves the screen is showing
    fn marker(&self) -> &'static str;

    /// Shared helpers
    fn base(&self) -> &BaseScreen<'s>;

    /// Whether the marker shows up before the screen timeout
    fn is_loaded(&self) -> ScoutResult<bool> {
        self.base().has_text(self.marker())
    }
}

/// Session plus finder and waits with common timeouts
#[derive(Clone, Copy)]
pub struct BaseScreen<'s> {
    session: &'s dyn Session,
    finder: TextFinder<'s>,
    waits: Waits<'s>,
}

impl std::fmt::Debug for BaseScreen<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseScreen")
            .field("options", &self.options())
            .finish_non_exhaustive()
    }
}

impl<'s> BaseScreen<'s> {
    /// Helpers with the given timing
    #[must_use]
    pub fn new(session: &'s dyn Session, options: WaitOptions) -> Self {
        Self {
            session,
            finder: TextFinder::with_options(session, options),
            waits: Waits::new(session, options),
        }
    }

    /// Owning session
    #[must_use]
    pub fn session(&self) -> &'s dyn Session {
        self.session
    }

    /// Multi-context finder
    #[must_use]
    pub const fn finder(&self) -> &TextFinder<'s> {
        &self.finder
    }

    /// Direct-locator waits
    #[must_use]
    pub const fn waits(&self) -> &Waits<'s> {
        &self.waits
    }

    /// Timing in use
    #[must_use]
    pub const fn options(&self) -> WaitOptions {
        self.finder.options()
    }

    /// Element showing `target`, or [`ScoutError::ElementNotFound`]
    pub fn require_text(&self, target: impl Into<SearchTarget>) -> ScoutResult<LocatedElement<'s>> {
        let target = target.into();
        let timeout_ms = target.timeout_ms.unwrap_or(self.options().timeout_ms);
        let label = target.text.clone();
        self.finder
            .find_anywhere(target)?
            .ok_or(ScoutError::ElementNotFound {
                target: label,
                timeout_ms,
            })
    }

    /// Find `target` anywhere and click it
    pub fn tap_text(&self, target: impl Into<SearchTarget>) -> ScoutResult<ClickOutcome> {
        self.require_text(target)?.click()
    }

    /// Click the first of several matches (native before web)
    pub fn tap_first(&self, target: impl Into<SearchTarget>) -> ScoutResult<ClickOutcome> {
        let target = target.into();
        let timeout_ms = target.timeout_ms.unwrap_or(self.options().timeout_ms);
        let label = target.text.clone();
        let all = self.finder.find_all_anywhere(target)?;
        let first = all.into_iter().next().ok_or(ScoutError::ElementNotFound {
            target: label,
            timeout_ms,
        })?;
        first.click()
    }

    /// Whether `target` shows up before the deadline
    pub fn has_text(&self, target: impl Into<SearchTarget>) -> ScoutResult<bool> {
        self.finder.present_anywhere(target)
    }

    fn require_clickable(&self, by: &By) -> ScoutResult<LocatedElement<'s>> {
        let element = self
            .waits
            .clickable(by)?
            .ok_or_else(|| ScoutError::ElementNotFound {
                target: by.to_string(),
                timeout_ms: self.waits.options().timeout_ms,
            })?;
        let context = current_or_native(self.session)?;
        Ok(LocatedElement::new(self.session, element, context, by.to_string()))
    }

    /// Wait until `by` is clickable, then click it through the fallback chain
    pub fn click_locator(&self, by: &By) -> ScoutResult<ClickOutcome> {
        self.require_clickable(by)?.click()
    }

    /// Wait until `by` is clickable, then type `text` into it
    pub fn type_into(&self, by: &By, text: &str) -> ScoutResult<()> {
        self.require_clickable(by)?.send_keys(text)
    }
}
