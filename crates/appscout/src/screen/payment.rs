//! Payment, success page and the QR scanner.

use super::login::{LoginScreen, STAGE_OTP};
use super::shop::amount_visible;
use super::{app_id, BaseScreen, Screen};
use crate::result::{ScoutError, ScoutResult};
use crate::session::{By, Session};
use crate::wait::WaitOptions;

/// Payment confirmation
#[derive(Debug, Clone, Copy)]
pub struct PaymentScreen<'s> {
    base: BaseScreen<'s>,
}

impl<'s> PaymentScreen<'s> {
    /// "Оплатить" button
    pub const PAY: &'static str = "Оплатить";
    /// Icon name of the account selector
    pub const BANK_ACCOUNT: &'static str = "account-tenge";
    /// Manager contact block
    pub const MANAGER: &'static str = "менеджер";

    /// Screen with the given timing
    #[must_use]
    pub fn new(session: &'s dyn Session, options: WaitOptions) -> Self {
        Self {
            base: BaseScreen::new(session, options),
        }
    }

    /// Press "pay"
    pub fn pay(&self) -> ScoutResult<()> {
        self.base.tap_text(Self::PAY).map(drop)
    }

    /// Whether `amount` and the currency sign are both on screen
    pub fn shows_amount(&self, amount: &str, timeout_ms: u64) -> ScoutResult<bool> {
        amount_visible(&self.base, amount, timeout_ms)
    }

    /// Pick the tenge account
    pub fn select_bank_account(&self) -> ScoutResult<()> {
        self.base.tap_text(Self::BANK_ACCOUNT).map(drop)
    }

    /// Confirm with the stage OTP
    pub fn confirm(&self) -> ScoutResult<()> {
        LoginScreen::new(self.base.session(), self.base.options()).enter_code(STAGE_OTP)
    }
}

impl<'s> Screen<'s> for PaymentScreen<'s> {
    fn name(&self) -> &'static str {
        "payment"
    }

    fn marker(&self) -> &'static str {
        Self::PAY
    }

    fn base(&self) -> &BaseScreen<'s> {
        &self.base
    }
}

/// Page shown after a successful payment
#[derive(Debug, Clone, Copy)]
pub struct SuccessScreen<'s> {
    base: BaseScreen<'s>,
}

impl<'s> SuccessScreen<'s> {
    /// Headline
    pub const SUCCESS: &'static str = "Оплата прошла успешно";
    /// Payment order link
    pub const INVOICE: &'static str = "Платежное поручение";
    /// Bonus block
    pub const BONUS: &'static str = "Вы получили";
    /// Rating prompt
    pub const FEEDBACK: &'static str = "Поставьте оценку заказу";
    /// Back link
    pub const BACK_TO_ORDERS: &'static str = "Перейти к Заказам";

    /// Screen with the given timing
    #[must_use]
    pub fn new(session: &'s dyn Session, options: WaitOptions) -> Self {
        Self {
            base: BaseScreen::new(session, options),
        }
    }

    fn expect(&self, text: &str) -> ScoutResult<()> {
        if self.base.has_text(text)? {
            Ok(())
        } else {
            Err(ScoutError::assertion(format!("'{text}' not shown")))
        }
    }

    /// Headline, payment order, bonus and feedback blocks are all present
    pub fn verify(&self) -> ScoutResult<()> {
        for text in [Self::SUCCESS, Self::INVOICE, Self::BONUS, Self::FEEDBACK] {
            self.expect(text)?;
        }
        Ok(())
    }

    /// Back to the order list
    pub fn back_to_orders(&self) -> ScoutResult<()> {
        self.base.tap_text(Self::BACK_TO_ORDERS).map(drop)
    }
}

impl<'s> Screen<'s> for SuccessScreen<'s> {
    fn name(&self) -> &'static str {
        "success"
    }

    fn marker(&self) -> &'static str {
        Self::SUCCESS
    }

    fn base(&self) -> &BaseScreen<'s> {
        &self.base
    }
}

/// QR scanner camera view
#[derive(Debug, Clone, Copy)]
pub struct ScannerScreen<'s> {
    base: BaseScreen<'s>,
}

impl<'s> ScannerScreen<'s> {
    /// Screen with the given timing
    #[must_use]
    pub fn new(session: &'s dyn Session, options: WaitOptions) -> Self {
        Self {
            base: BaseScreen::new(session, options),
        }
    }

    /// Locator of the "upload from gallery" button
    #[must_use]
    pub fn gallery_button() -> By {
        By::id(app_id("gallery_button"))
    }

    /// Open the system picker from the scanner
    pub fn upload_from_gallery(&self) -> ScoutResult<()> {
        self.base.click_locator(&Self::gallery_button()).map(drop)
    }
}

impl<'s> Screen<'s> for ScannerScreen<'s> {
    fn name(&self) -> &'static str {
        "scanner"
    }

    fn marker(&self) -> &'static str {
        "QR"
    }

    fn base(&self) -> &BaseScreen<'s> {
        &self.base
    }

    fn is_loaded(&self) -> ScoutResult<bool> {
        Ok(self.base.waits().visible(&Self::gallery_button())?.is_some())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mock::{MockElement, MockSession};
    use crate::screen::tests::fast;

    #[test]
    fn test_success_verify_names_missing_block() {
        let session = MockSession::android();
        session.add_web_context("WEBVIEW_pay");
        for (id, text) in [
            ("s", SuccessScreen::SUCCESS),
            ("i", SuccessScreen::INVOICE),
            ("b", SuccessScreen::BONUS),
        ] {
            session.add_element(MockElement::new(id).in_context("WEBVIEW_pay").text(text));
        }
        let screen = SuccessScreen::new(&session, fast());
        let err = screen.verify().unwrap_err();
        assert!(err.to_string().contains(SuccessScreen::FEEDBACK));

        session.add_element(MockElement::new("f").in_context("WEBVIEW_pay").text(SuccessScreen::FEEDBACK));
        screen.verify().unwrap();
    }

    #[test]
    fn test_payment_confirm_types_otp() {
        let session = MockSession::android();
        session.add_element(MockElement::new("otp").resource_id(app_id("et")));
        PaymentScreen::new(&session, fast()).confirm().unwrap();
        assert_eq!(session.element_text("otp").as_deref(), Some(STAGE_OTP));
    }

    #[test]
    fn test_scanner_gallery_button() {
        let session = MockSession::android();
        let scanner = ScannerScreen::new(&session, fast());
        assert!(!scanner.is_loaded().unwrap());
        session.add_element(MockElement::new("g").resource_id(app_id("gallery_button")));
        assert!(scanner.is_loaded().unwrap());
        scanner.upload_from_gallery().unwrap();
        assert!(session.was_called("click:g"));
    }
}
