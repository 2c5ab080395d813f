//! Ordering screens: main Duken page, catalog and cart.

use super::{BaseScreen, Screen};
use crate::finder::SearchTarget;
use crate::result::{ScoutError, ScoutResult};
use crate::session::Session;
use crate::wait::WaitOptions;

/// Currency sign shown next to amounts
pub const CURRENCY_SIGN: &str = "₸";

/// Main Online Duken page
#[derive(Debug, Clone, Copy)]
pub struct MainOrdersScreen<'s> {
    base: BaseScreen<'s>,
}

impl<'s> MainOrdersScreen<'s> {
    /// "Мои заказы" button
    pub const ALL_ORDERS: &'static str = "Мои заказы";
    /// "Создать заказ" button
    pub const CREATE_ORDER: &'static str = "Создать заказ";
    /// Bonus banner
    pub const BONUS: &'static str = "bonus";
    /// "Все" link next to the distributors carousel (icon name glued to text)
    pub const ALL_DISTRIBUTORS: &'static str = "Всеgreen-arrow";
    /// "Все товары" link
    pub const ALL_GOODS: &'static str = "Все товары";

    /// Screen with the given timing
    #[must_use]
    pub fn new(session: &'s dyn Session, options: WaitOptions) -> Self {
        Self {
            base: BaseScreen::new(session, options),
        }
    }

    /// Open the order history
    pub fn open_all_orders(&self) -> ScoutResult<()> {
        self.base.tap_text(Self::ALL_ORDERS).map(drop)
    }

    /// Start a new order
    pub fn create_order(&self) -> ScoutResult<()> {
        self.base.tap_text(Self::CREATE_ORDER).map(drop)
    }

    /// Open the bonus banner
    pub fn open_bonus(&self) -> ScoutResult<()> {
        self.base.tap_text(Self::BONUS).map(drop)
    }

    /// Open the distributor list
    pub fn open_all_distributors(&self) -> ScoutResult<()> {
        self.base.tap_text(Self::ALL_DISTRIBUTORS).map(drop)
    }

    /// Open the goods list
    pub fn open_all_goods(&self) -> ScoutResult<()> {
        self.base.tap_text(Self::ALL_GOODS).map(drop)
    }
}

impl<'s> Screen<'s> for MainOrdersScreen<'s> {
    fn name(&self) -> &'static str {
        "main-orders"
    }

    fn marker(&self) -> &'static str {
        Self::ALL_ORDERS
    }

    fn base(&self) -> &BaseScreen<'s> {
        &self.base
    }
}

/// Distributor catalog and product cards
#[derive(Debug, Clone, Copy)]
pub struct CatalogScreen<'s> {
    base: BaseScreen<'s>,
}

impl<'s> CatalogScreen<'s> {
    /// Heading of the distributor picker (the typo is in the app)
    pub const CHOOSE_DISTRIBUTOR: &'static str = "Выбирите поставщика";
    /// Per-distributor "Создать заказ" button
    pub const CREATE_ORDER: &'static str = "Создать заказ";
    /// Tail of "Добавить в корзину"
    pub const ADD_TO_CART: &'static str = "корзину";

    /// Screen with the given timing
    #[must_use]
    pub fn new(session: &'s dyn Session, options: WaitOptions) -> Self {
        Self {
            base: BaseScreen::new(session, options),
        }
    }

    /// Number of "Создать заказ" buttons, one per distributor
    pub fn distributor_count(&self) -> ScoutResult<usize> {
        Ok(self.base.finder().find_all_anywhere(Self::CREATE_ORDER)?.len())
    }

    /// Open the first distributor's catalog
    pub fn enter_distributor(&self) -> ScoutResult<()> {
        self.base.tap_first(Self::CREATE_ORDER).map(drop)
    }

    /// Open the first product card
    pub fn open_product(&self) -> ScoutResult<()> {
        self.base.tap_first(Self::ADD_TO_CART).map(drop)
    }

    /// Press "add to cart" on the open card
    pub fn add_to_cart(&self) -> ScoutResult<()> {
        self.base.tap_text(Self::ADD_TO_CART).map(drop)
    }
}

impl<'s> Screen<'s> for CatalogScreen<'s> {
    fn name(&self) -> &'static str {
        "catalog"
    }

    fn marker(&self) -> &'static str {
        Self::CHOOSE_DISTRIBUTOR
    }

    fn base(&self) -> &BaseScreen<'s> {
        &self.base
    }
}

/// Shopping cart
#[derive(Debug, Clone, Copy)]
pub struct CartScreen<'s> {
    base: BaseScreen<'s>,
}

impl<'s> CartScreen<'s> {
    /// "Оформить" checkout button
    pub const CHECKOUT: &'static str = "Оформить";
    /// Part of the "order created" message
    pub const SUCCESS: &'static str = "успешно";
    /// "Перейти ..." link back to the orders
    pub const BACK_TO_ORDERS: &'static str = "Перейти";

    /// Screen with the given timing
    #[must_use]
    pub fn new(session: &'s dyn Session, options: WaitOptions) -> Self {
        Self {
            base: BaseScreen::new(session, options),
        }
    }

    /// Whether `amount` and the currency sign are both on screen
    pub fn shows_amount(&self, amount: &str, timeout_ms: u64) -> ScoutResult<bool> {
        amount_visible(&self.base, amount, timeout_ms)
    }

    /// Check out
    pub fn checkout(&self) -> ScoutResult<()> {
        self.base.tap_text(Self::CHECKOUT).map(drop)
    }

    /// Fail unless the order confirmation shows
    pub fn expect_success(&self) -> ScoutResult<()> {
        if self.base.has_text(Self::SUCCESS)? {
            Ok(())
        } else {
            Err(ScoutError::assertion("order confirmation text not shown"))
        }
    }

    /// Back to the order list
    pub fn back_to_orders(&self) -> ScoutResult<()> {
        self.base.tap_text(Self::BACK_TO_ORDERS).map(drop)
    }
}

impl<'s> Screen<'s> for CartScreen<'s> {
    fn name(&self) -> &'static str {
        "cart"
    }

    fn marker(&self) -> &'static str {
        Self::CHECKOUT
    }

    fn base(&self) -> &BaseScreen<'s> {
        &self.base
    }
}

pub(super) fn amount_visible(base: &BaseScreen<'_>, amount: &str, timeout_ms: u64) -> ScoutResult<bool> {
    let finder = base.finder();
    Ok(finder.present_anywhere(SearchTarget::new(amount).with_timeout(timeout_ms))?
        && finder.present_anywhere(SearchTarget::new(CURRENCY_SIGN).with_timeout(timeout_ms))?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mock::{MockElement, MockSession};
    use crate::screen::tests::fast;

    const WEB: &str = "WEBVIEW_kz.halyk.onlinebank.stage";

    #[test]
    fn test_catalog_counts_distributors_across_contexts() {
        let session = MockSession::android();
        session.add_web_context(WEB);
        session.add_element(MockElement::new("h").text(CatalogScreen::CHOOSE_DISTRIBUTOR));
        session.add_element(MockElement::new("n").text("Создать заказ"));
        session.add_element(MockElement::new("w1").in_context(WEB).text("Создать заказ"));
        session.add_element(MockElement::new("w2").in_context(WEB).text("Создать заказ"));

        let catalog = CatalogScreen::new(&session, fast());
        assert!(catalog.is_loaded().unwrap());
        assert_eq!(catalog.distributor_count().unwrap(), 3);
        catalog.enter_distributor().unwrap();
        assert!(session.was_called("click:n"));
    }

    #[test]
    fn test_web_distributor_cards_count_once() {
        let session = MockSession::android();
        session.add_web_context(WEB);
        session.add_element(MockElement::new("body").in_context(WEB));
        for card in ["card1", "card2"] {
            session.add_element(MockElement::new(card).in_context(WEB).child_of("body").text("ТОО Дистрибьютор"));
            session.add_element(
                MockElement::new(format!("{card}-btn"))
                    .in_context(WEB)
                    .child_of(card)
                    .text("Создать заказ"),
            );
        }

        let catalog = CatalogScreen::new(&session, fast());
        assert_eq!(catalog.distributor_count().unwrap(), 2);
        catalog.enter_distributor().unwrap();
        assert!(session.was_called("click:card1-btn"));
        assert!(!session.was_called("click:body"));
    }

    #[test]
    fn test_cart_amount_needs_both_parts() {
        let session = MockSession::android();
        session.add_element(MockElement::new("sum").text("1 250"));
        let cart = CartScreen::new(&session, fast());
        assert!(!cart.shows_amount("1", 50).unwrap());
        session.add_element(MockElement::new("cur").text("₸"));
        assert!(cart.shows_amount("1", 50).unwrap());
    }

    #[test]
    fn test_cart_expect_success() {
        let session = MockSession::android();
        let cart = CartScreen::new(&session, fast());
        assert!(matches!(cart.expect_success(), Err(ScoutError::AssertionFailed { .. })));
        session.add_element(MockElement::new("ok").text("Заказ успешно оформлен"));
        cart.expect_success().unwrap();
    }

    #[test]
    fn test_main_orders_in_web_view() {
        let session = MockSession::android();
        session.add_web_context(WEB);
        session.add_element(MockElement::new("orders").in_context(WEB).text("Мои заказы"));
        let main = MainOrdersScreen::new(&session, fast());
        main.open_all_orders().unwrap();
        assert!(session.was_called("click:orders"));
    }
}
