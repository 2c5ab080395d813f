//! Phone login, OTP, quick PIN and the Duken entry point.

use super::{app_id, BaseScreen, Screen};
use crate::result::ScoutResult;
use crate::session::{By, Session};
use crate::wait::WaitOptions;

/// Digit `0` on the passcode keyboard
pub const PIN_ZERO_XPATH: &str = "//android.view.ViewGroup[@resource-id=\"kz.halyk.onlinebank.stage:id/passcode_fragment_keyboard\"]/android.widget.FrameLayout[10]/android.widget.FrameLayout/android.widget.LinearLayout";

/// Entry into the Online Duken mini-app
pub const ONLINE_DUKEN_TEXT: &str = "Duken";

/// OTP accepted by the stage backend
pub const STAGE_OTP: &str = "123456";

/// Login screen
#[derive(Debug, Clone)]
pub struct LoginScreen<'s> {
    base: BaseScreen<'s>,
    pin_key: By,
}

impl<'s> LoginScreen<'s> {
    /// Login screen with the given timing
    #[must_use]
    pub fn new(session: &'s dyn Session, options: WaitOptions) -> Self {
        Self {
            base: BaseScreen::new(session, options),
            pin_key: By::xpath(PIN_ZERO_XPATH),
        }
    }

    /// Use another locator for the PIN key
    #[must_use]
    pub fn with_pin_key(mut self, pin_key: By) -> Self {
        self.pin_key = pin_key;
        self
    }

    /// Type the phone number
    pub fn enter_phone(&self, phone: &str) -> ScoutResult<()> {
        self.base.type_into(&By::id(app_id("phone_input")), phone)
    }

    /// Press "login"
    pub fn submit(&self) -> ScoutResult<()> {
        self.base.click_locator(&By::id(app_id("login_button"))).map(drop)
    }

    /// Type the one-time code
    pub fn enter_code(&self, code: &str) -> ScoutResult<()> {
        self.base.type_into(&By::id(app_id("et")), code)
    }

    /// Enter the quick PIN (four zeros)
    pub fn enter_quick_pin(&self) -> ScoutResult<()> {
        for _ in 0..4 {
            self.base.click_locator(&self.pin_key)?;
        }
        Ok(())
    }

    /// Accept the geolocation prompt
    pub fn accept_geo(&self) -> ScoutResult<()> {
        self.base.click_locator(&By::id(app_id("successButtonNext"))).map(drop)
    }

    /// Open Online Duken from the bank's main screen
    pub fn open_duken(&self) -> ScoutResult<()> {
        self.base.tap_text(ONLINE_DUKEN_TEXT).map(drop)
    }

    /// Full login: phone, OTP, PIN twice (set and confirm), geo, Duken
    pub fn login(&self, phone: &str, code: &str) -> ScoutResult<()> {
        tracing::info!(screen = self.name(), "logging in");
        self.enter_phone(phone)?;
        self.submit()?;
        self.enter_code(code)?;
        self.enter_quick_pin()?;
        self.enter_quick_pin()?;
        self.accept_geo()?;
        self.open_duken()
    }
}

impl<'s> Screen<'s> for LoginScreen<'s> {
    fn name(&self) -> &'static str {
        "login"
    }

    fn marker(&self) -> &'static str {
        ONLINE_DUKEN_TEXT
    }

    fn base(&self) -> &BaseScreen<'s> {
        &self.base
    }
}
