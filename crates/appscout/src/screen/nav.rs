//! Bottom navigation bar.

use super::BaseScreen;
use crate::click::ClickOutcome;
use crate::finder::LocatedElement;
use crate::query::{android_literal, ios_predicate};
use crate::platform::Platform;
use crate::result::{ScoutError, ScoutResult};
use crate::session::{By, Session, NATIVE_APP};
use crate::wait::WaitOptions;
use std::str::FromStr;

/// Tabs of the bottom bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    /// Главная
    Home,
    /// Каталог
    Catalog,
    /// QR scanner
    Qr,
    /// Корзина
    Cart,
    /// Еще
    More,
}

impl Tab {
    /// All tabs, left to right
    pub const ALL: [Self; 5] = [Self::Home, Self::Catalog, Self::Qr, Self::Cart, Self::More];

    /// Accessibility id of the tab
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Home => "Главная",
            Self::Catalog => "Каталог",
            Self::Qr => "QR",
            Self::Cart => "Корзина",
            Self::More => "Еще",
        }
    }

    /// Partial description tried when the exact id does not resolve
    #[must_use]
    pub const fn fallback(&self) -> Option<&'static str> {
        match self {
            Self::Home => Some("Глав"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Tab {
    type Err = ScoutError;

    /// Accepts the Russian label or the English variant name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|tab| {
                tab.label().to_lowercase() == wanted || format!("{tab:?}").to_lowercase() == wanted
            })
            .ok_or_else(|| ScoutError::config(format!("unknown tab: {s}")))
    }
}

/// Bottom navigation bar
#[derive(Debug, Clone, Copy)]
pub struct BottomNav<'s> {
    base: BaseScreen<'s>,
}

impl<'s> BottomNav<'s> {
    /// Bar with the given timing
    #[must_use]
    pub fn new(session: &'s dyn Session, options: WaitOptions) -> Self {
        Self {
            base: BaseScreen::new(session, options),
        }
    }

    fn fallback_query(&self, fragment: &str) -> By {
        match self.base.session().platform() {
            Platform::Ios => By::ios_predicate(ios_predicate(fragment)),
            _ => By::android_uiautomator(format!(
                "new UiSelector().descriptionContains(\"{}\")",
                android_literal(fragment)
            )),
        }
    }

    /// Open `tab`
    pub fn open(&self, tab: Tab) -> ScoutResult<ClickOutcome> {
        tracing::info!(tab = tab.label(), "opening tab");
        let error = match self.base.click_locator(&By::accessibility_id(tab.label())) {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => e,
        };
        let Some(fragment) = tab.fallback() else {
            return Err(error);
        };
        tracing::debug!(tab = tab.label(), fragment, "exact tab id missing, trying partial description");
        let session = self.base.session();
        let Some(element) = session.find_element(&self.fallback_query(fragment))? else {
            return Err(error);
        };
        LocatedElement::new(session, element, NATIVE_APP, tab.label()).click()
    }

    /// Open a tab by name ("Каталог", "cart", ...)
    pub fn open_named(&self, name: &str) -> ScoutResult<ClickOutcome> {
        self.open(name.parse()?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mock::{MockElement, MockSession};
    use crate::screen::tests::fast;

    #[test]
    fn test_parse_tab() {
        assert_eq!("Корзина".parse::<Tab>().unwrap(), Tab::Cart);
        assert_eq!("catalog".parse::<Tab>().unwrap(), Tab::Catalog);
        assert_eq!(" qr ".parse::<Tab>().unwrap(), Tab::Qr);
        assert!("Настройки".parse::<Tab>().is_err());
    }

    #[test]
    fn test_open_by_accessibility_id() {
        let session = MockSession::android();
        session.add_element(MockElement::new("cart").description("Корзина"));
        BottomNav::new(&session, fast()).open(Tab::Cart).unwrap();
        assert!(session.was_called("click:cart"));
    }

    #[test]
    fn test_home_partial_description_fallback() {
        let session = MockSession::android();
        session.add_element(MockElement::new("home").description("Главная, вкладка 1 из 5"));
        BottomNav::new(&session, fast()).open(Tab::Home).unwrap();
        assert!(session.was_called("find:-android uiautomator=new UiSelector().descriptionContains(\"Глав\")"));
        assert!(session.was_called("click:home"));
    }

    #[test]
    fn test_missing_tab_without_fallback() {
        let session = MockSession::android();
        let err = BottomNav::new(&session, fast()).open_named("Еще").unwrap_err();
        assert!(matches!(err, ScoutError::ElementNotFound { .. }));
    }
}
