//! End-to-end user flows over the screen objects.
//!
//! Each flow is a plain function over a [`FlowContext`]; [`FLOWS`] lists
//! them by name so the CLI can run any subset.

use crate::config::ScoutConfig;
use crate::result::{ScoutError, ScoutResult};
use crate::finder::SearchTarget;
use crate::screen::{
    BottomNav, CartScreen, CatalogScreen, LoginScreen, MainOrdersScreen, PaymentScreen,
    PickerScreen, ScannerScreen, Screen, SuccessScreen, Tab, CURRENCY_SIGN, STAGE_OTP,
};
use crate::session::Session;
use crate::wait::WaitOptions;
use std::time::Instant;

/// Stage test account
pub const DEFAULT_PHONE: &str = "7771112222";

/// Amount the cart and payment checks look for
pub const DEFAULT_AMOUNT: &str = "1";

const AMOUNT_TIMEOUT_MS: u64 = 5_000;

/// Everything a flow needs
#[derive(Clone)]
pub struct FlowContext<'s> {
    /// Live session
    pub session: &'s dyn Session,
    /// Screen timing
    pub options: WaitOptions,
    /// Login phone number
    pub phone: String,
    /// One-time code
    pub otp: String,
    /// Amount expected in cart and payment
    pub amount: String,
    /// File name of a QR image already in the device gallery
    pub qr_file: Option<String>,
}

impl std::fmt::Debug for FlowContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowContext")
            .field("options", &self.options)
            .field("phone", &self.phone)
            .field("qr_file", &self.qr_file)
            .finish_non_exhaustive()
    }
}

impl<'s> FlowContext<'s> {
    /// Context with stage defaults
    #[must_use]
    pub fn new(session: &'s dyn Session, options: WaitOptions) -> Self {
        Self {
            session,
            options,
            phone: DEFAULT_PHONE.to_string(),
            otp: STAGE_OTP.to_string(),
            amount: DEFAULT_AMOUNT.to_string(),
            qr_file: None,
        }
    }

    /// Context using the configured screen timing
    #[must_use]
    pub fn from_config(session: &'s dyn Session, config: &ScoutConfig) -> Self {
        let mut ctx = Self::new(session, config.screen_wait_options());
        ctx.amount.clone_from(&config.qr.amount);
        ctx
    }

    /// Use a QR image pushed to the gallery
    #[must_use]
    pub fn with_qr_file(mut self, name: impl Into<String>) -> Self {
        self.qr_file = Some(name.into());
        self
    }

    fn nav(&self) -> BottomNav<'s> {
        BottomNav::new(self.session, self.options)
    }
}

fn ensure(condition: bool, message: &str) -> ScoutResult<()> {
    if condition {
        Ok(())
    } else {
        Err(ScoutError::assertion(message))
    }
}

/// Phone, OTP, quick PIN, geo prompt, then into Online Duken
pub fn login(ctx: &FlowContext<'_>) -> ScoutResult<()> {
    LoginScreen::new(ctx.session, ctx.options).login(&ctx.phone, &ctx.otp)
}

/// The Duken main page shows "Мои заказы"
pub fn od_enter(ctx: &FlowContext<'_>) -> ScoutResult<()> {
    let main = MainOrdersScreen::new(ctx.session, ctx.options);
    ensure(main.is_loaded()?, "'Мои заказы' is not shown")
}

/// Catalog tab lists at least one distributor
pub fn catalog_available(ctx: &FlowContext<'_>) -> ScoutResult<()> {
    ctx.nav().open(Tab::Catalog)?;
    let catalog = CatalogScreen::new(ctx.session, ctx.options);
    ensure(
        catalog.is_loaded()?,
        "catalog did not open: distributor heading not found",
    )?;
    ensure(
        catalog.distributor_count()? > 0,
        "catalog lists no 'Создать заказ' buttons",
    )
}

/// Cart tab shows the checkout button or an amount
pub fn cart_available(ctx: &FlowContext<'_>) -> ScoutResult<()> {
    ctx.nav().open(Tab::Cart)?;
    let cart = CartScreen::new(ctx.session, ctx.options);
    let loaded = cart.is_loaded()?
        || cart
            .base()
            .has_text(SearchTarget::new(CURRENCY_SIGN).with_timeout(AMOUNT_TIMEOUT_MS))?;
    ensure(loaded, "cart did not open: no checkout button or amount")
}

/// "Еще" tab opens
pub fn more_available(ctx: &FlowContext<'_>) -> ScoutResult<()> {
    ctx.nav().open(Tab::More).map(drop)
}

/// "Мои заказы" opens the order history
pub fn all_orders(ctx: &FlowContext<'_>) -> ScoutResult<()> {
    MainOrdersScreen::new(ctx.session, ctx.options).open_all_orders()
}

/// Add a product twice, check out from the cart
pub fn add_to_cart(ctx: &FlowContext<'_>) -> ScoutResult<()> {
    let nav = ctx.nav();
    let catalog = CatalogScreen::new(ctx.session, ctx.options);
    let cart = CartScreen::new(ctx.session, ctx.options);

    nav.open(Tab::Catalog)?;
    catalog.enter_distributor()?;
    catalog.open_product()?;
    catalog.add_to_cart()?;
    catalog.add_to_cart()?;

    nav.open(Tab::Cart)?;
    if !cart.shows_amount(&ctx.amount, AMOUNT_TIMEOUT_MS)? {
        tracing::warn!(amount = %ctx.amount, "cart amount not visible");
    }
    cart.checkout()?;
    cart.expect_success()
}

/// Scan a QR image from the gallery and pay the resulting invoice
pub fn pay_by_qr(ctx: &FlowContext<'_>) -> ScoutResult<()> {
    ctx.nav().open(Tab::Qr)?;
    ScannerScreen::new(ctx.session, ctx.options).upload_from_gallery()?;

    let picker = PickerScreen::new(ctx.session, ctx.options);
    if !picker.wait_loaded(None)? {
        picker.grant_permissions()?;
        ensure(picker.wait_loaded(None)?, "image picker did not open")?;
    }
    let picked = match &ctx.qr_file {
        Some(name) => picker.select_by_name(name, None)? || picker.select_first_recent()?,
        None => picker.select_first_recent()?,
    };
    ensure(picked, "no image could be picked")?;
    picker.confirm()?;

    let payment = PaymentScreen::new(ctx.session, ctx.options);
    if !payment.shows_amount(&ctx.amount, AMOUNT_TIMEOUT_MS)? {
        tracing::warn!(amount = %ctx.amount, "payment amount not visible");
    }
    payment.select_bank_account()?;
    payment.pay()?;
    payment.confirm()?;

    let success = SuccessScreen::new(ctx.session, ctx.options);
    success.verify()?;
    success.back_to_orders()
}

/// A named, runnable flow
#[derive(Debug, Clone, Copy)]
pub struct Flow {
    /// Name used on the command line
    pub name: &'static str,
    /// One-line description
    pub summary: &'static str,
    /// Whether the flow starts from a logged-in Duken session
    pub needs_login: bool,
    run: fn(&FlowContext<'_>) -> ScoutResult<()>,
}

impl Flow {
    /// Run the flow, logging start and outcome
    pub fn run(&self, ctx: &FlowContext<'_>) -> ScoutResult<()> {
        let started = Instant::now();
        tracing::info!(flow = self.name, "flow started");
        let result = (self.run)(ctx);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => tracing::info!(flow = self.name, elapsed_ms, "flow passed"),
            Err(e) => tracing::warn!(flow = self.name, elapsed_ms, error = %e, "flow failed"),
        }
        result
    }
}

/// Every flow, in suite order
pub const FLOWS: [Flow; 8] = [
    Flow { name: "login", summary: "log in and open Online Duken", needs_login: false, run: login },
    Flow { name: "od_enter", summary: "Duken main page is shown", needs_login: true, run: od_enter },
    Flow { name: "catalog_available", summary: "catalog lists distributors", needs_login: true, run: catalog_available },
    Flow { name: "cart_available", summary: "cart opens", needs_login: true, run: cart_available },
    Flow { name: "more_available", summary: "'Еще' tab opens", needs_login: true, run: more_available },
    Flow { name: "all_orders", summary: "order history opens", needs_login: true, run: all_orders },
    Flow { name: "add_to_cart", summary: "add a product and check out", needs_login: true, run: add_to_cart },
    Flow { name: "pay_by_qr", summary: "pay an invoice scanned from the gallery", needs_login: true, run: pay_by_qr },
];

/// Look a flow up by name
#[must_use]
pub fn find_flow(name: &str) -> Option<&'static Flow> {
    FLOWS.iter().find(|f| f.name == name)
}

/// Resolve names to flows; empty selects all
pub fn select_flows(names: &[String]) -> ScoutResult<Vec<&'static Flow>> {
    if names.is_empty() {
        return Ok(FLOWS.iter().collect());
    }
    names
        .iter()
        .map(|name| {
            find_flow(name).ok_or_else(|| {
                let known: Vec<&str> = FLOWS.iter().map(|f| f.name).collect();
                ScoutError::config(format!("unknown flow '{name}' (known: {})", known.join(", ")))
            })
        })
        .collect()
}
