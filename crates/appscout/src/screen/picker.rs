//! System image picker opened from the QR scanner.
//!
//! Three providers show up depending on the Android build: the DocumentsUI
//! file browser, the system Photo Picker (media module) and Google Photos.
//! The provider is detected from the foreground package on every call since
//! the user (or a test) can switch between them.

use super::BaseScreen;
use crate::click::{AncestorClick, CoordinateTap, ResilientClicker};
use crate::finder::{LocatedElement, SearchTarget};
use crate::query::android_literal;
use crate::result::ScoutResult;
use crate::session::{By, ElementRef, Session, NATIVE_APP};
use crate::wait::{absorb, wait_until, Deadline, WaitOptions};
use serde_json::json;
use std::time::Duration;

const ALLOW_TEXTS: [&str; 2] = ["Разрешить", "Allow"];
const CANCEL_TEXTS: [&str; 2] = ["Отмена", "Cancel"];
const CONFIRM_TEXTS: [&str; 6] = ["ОК", "OK", "Готово", "Выбрать", "Select", "Done"];

const DOCSUI_PACKAGES: [&str; 2] = ["com.android.documentsui", "com.google.android.documentsui"];
const PHOTOS_PACKAGE: &str = "com.google.android.apps.photos";
const MEDIA_MODULE_PACKAGE: &str = "com.google.android.providers.media.module";

const DOCS_LIST_IDS: [&str; 3] = ["id/dir_list", "id/list", "id/container_directory_list"];
const DOCS_TITLE_ID: &str = "id/title";
const DOCS_CONFIRM_IDS: [&str; 2] = ["id/action_menu_done", "id/done"];
const DOCS_TOOLBAR_IDS: [&str; 2] = ["id/toolbar", "id/action_bar"];

const PHOTOS_GRID_IDS: [&str; 3] = ["id/recycler_view", "id/photos_grid", "id/photos_view"];
const PHOTOS_CONFIRM_IDS: [&str; 2] = ["id/done_button", "id/confirm_button"];
const PHOTOS_TOOLBAR_IDS: [&str; 2] = ["id/action_bar", "id/topbar"];

const MEDIA_GRID_IDS: [&str; 2] = ["id/picker_tab_recyclerview", "id/picker_tab_gridview"];
// thumbnails themselves are not clickable
const MEDIA_THUMB_ID: &str = "id/icon_thumbnail";
const MEDIA_CONFIRM_IDS: [&str; 1] = ["id/confirm_button"];

const LIST_ITEMS_XPATH: &str = ".//*[@clickable='true' or @focusable='true']";
const SCREEN_ITEMS_XPATH: &str = "//*[@clickable='true' or @focusable='true']";
const SCROLL_GESTURE: &str = "mobile: scrollGesture";
const SWIPE_GESTURE: &str = "mobile: swipeGesture";

const LOAD_POLL: Duration = Duration::from_millis(200);
const QUICK_TIMEOUT_MS: u64 = 2_000;

/// Which app is showing the picker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerProvider {
    /// DocumentsUI file browser
    DocumentsUi,
    /// System Photo Picker (Android 13+)
    MediaModule,
    /// Google Photos
    Photos,
    /// Anything else
    Unknown,
}

impl PickerProvider {
    /// Provider for the foreground package
    #[must_use]
    pub fn from_package(package: &str) -> Self {
        if DOCSUI_PACKAGES.iter().any(|p| package.starts_with(p)) {
            Self::DocumentsUi
        } else if package.starts_with(MEDIA_MODULE_PACKAGE) {
            Self::MediaModule
        } else if package.starts_with(PHOTOS_PACKAGE) {
            Self::Photos
        } else {
            Self::Unknown
        }
    }

    fn markers(self) -> Vec<&'static str> {
        match self {
            Self::DocumentsUi => [DOCS_TOOLBAR_IDS.as_slice(), &DOCS_LIST_IDS].concat(),
            Self::MediaModule | Self::Photos => {
                [PHOTOS_TOOLBAR_IDS.as_slice(), &PHOTOS_GRID_IDS, &MEDIA_GRID_IDS].concat()
            }
            Self::Unknown => Vec::new(),
        }
    }

    fn list_ids(self) -> Vec<&'static str> {
        match self {
            Self::DocumentsUi => DOCS_LIST_IDS.to_vec(),
            Self::MediaModule | Self::Photos => [PHOTOS_GRID_IDS.as_slice(), &MEDIA_GRID_IDS].concat(),
            Self::Unknown => Vec::new(),
        }
    }

    fn confirm_ids(self) -> &'static [&'static str] {
        match self {
            Self::DocumentsUi => &DOCS_CONFIRM_IDS,
            Self::Photos => &PHOTOS_CONFIRM_IDS,
            Self::MediaModule => &MEDIA_CONFIRM_IDS,
            Self::Unknown => &[],
        }
    }
}

/// Full resource id: short ids get the package prefix
fn resource_id(package: &str, short: &str) -> String {
    if short.contains(':') {
        short.to_string()
    } else {
        format!("{package}:{short}")
    }
}

fn text_contains(text: &str) -> By {
    By::android_uiautomator(format!("new UiSelector().textContains(\"{}\")", android_literal(text)))
}

fn description_contains(text: &str) -> By {
    By::android_uiautomator(format!(
        "new UiSelector().descriptionContains(\"{}\")",
        android_literal(text)
    ))
}

/// Image picker
#[derive(Debug, Clone, Copy)]
pub struct PickerScreen<'s> {
    base: BaseScreen<'s>,
}

impl<'s> PickerScreen<'s> {
    /// Picker with the given timing
    #[must_use]
    pub fn new(session: &'s dyn Session, options: WaitOptions) -> Self {
        Self {
            base: BaseScreen::new(session, options),
        }
    }

    fn session(&self) -> &'s dyn Session {
        self.base.session()
    }

    fn quick_timeout_ms(&self) -> u64 {
        self.base.options().timeout_ms.min(QUICK_TIMEOUT_MS)
    }

    fn package(&self) -> ScoutResult<String> {
        Ok(absorb(self.session().current_package())?
            .flatten()
            .unwrap_or_default())
    }

    /// Provider currently in the foreground
    pub fn provider(&self) -> ScoutResult<PickerProvider> {
        Ok(PickerProvider::from_package(&self.package()?))
    }

    fn first(&self, by: &By) -> ScoutResult<Option<ElementRef>> {
        Ok(absorb(self.session().find_element(by))?.flatten())
    }

    fn is_present(&self, by: &By) -> ScoutResult<bool> {
        Ok(self.first(by)?.is_some())
    }

    /// Click the first match of `by`; misses and refused clicks are `false`
    fn try_click(&self, by: &By) -> ScoutResult<bool> {
        let Some(element) = self.first(by)? else {
            return Ok(false);
        };
        Ok(absorb(self.session().click(&element))?.is_some())
    }

    fn container(&self) -> ScoutResult<Option<By>> {
        let package = self.package()?;
        for short in PickerProvider::from_package(&package).list_ids() {
            let by = By::id(resource_id(&package, short));
            if self.is_present(&by)? {
                return Ok(Some(by));
            }
        }
        Ok(None)
    }

    fn list_items(&self, limit: usize) -> ScoutResult<Vec<ElementRef>> {
        let mut items = match self.container()? {
            Some(by) => match self.first(&by)? {
                Some(root) => {
                    let found = absorb(self.session().find_elements_from(&root, &By::xpath(LIST_ITEMS_XPATH)))?
                        .unwrap_or_default();
                    if found.is_empty() {
                        absorb(self.session().find_elements_from(&root, &By::xpath("./*")))?
                            .unwrap_or_default()
                    } else {
                        found
                    }
                }
                None => Vec::new(),
            },
            None => absorb(self.session().find_elements(&By::xpath(SCREEN_ITEMS_XPATH)))?
                .unwrap_or_default(),
        };
        items.truncate(limit);
        Ok(items)
    }

    /// Short scroll inside the list, or a screen swipe when there is none
    fn scroll_down(&self) -> ScoutResult<bool> {
        let session = self.session();
        let Some(by) = self.container()? else {
            let size = session.window_size()?;
            let x = size.width / 2;
            let args = json!({
                "left": x.saturating_sub(1),
                "top": size.height * 35 / 100,
                "width": 2,
                "height": size.height * 40 / 100,
                "direction": "up",
                "percent": 0.8,
            });
            return Ok(absorb(session.execute_script(SWIPE_GESTURE, vec![args]))?.is_some());
        };
        let Some(container) = self.first(&by)? else {
            return Ok(false);
        };
        let Some(rect) = absorb(session.rect(&container))? else {
            return Ok(false);
        };
        let args = json!({
            "left": rect.x + 8.0,
            "top": rect.y + 8.0,
            "width": (rect.width - 16.0).max(16.0),
            "height": (rect.height - 16.0).max(16.0),
            "direction": "down",
            "percent": 0.8,
        });
        Ok(absorb(session.execute_script(SCROLL_GESTURE, vec![args]))?.is_some())
    }

    /// Wait until a known picker layout (or any list item) is showing
    pub fn wait_loaded(&self, timeout_ms: Option<u64>) -> ScoutResult<bool> {
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(self.base.options().timeout_ms));
        let loaded = wait_until(timeout, LOAD_POLL, || {
            let package = self.package()?;
            for short in PickerProvider::from_package(&package).markers() {
                if self.is_present(&By::id(resource_id(&package, short)))? {
                    return Ok(Some(()));
                }
            }
            Ok((!self.list_items(1)?.is_empty()).then_some(()))
        })?;
        Ok(loaded.is_some())
    }

    /// Whether the picker shows up within a couple of seconds
    pub fn is_open(&self) -> ScoutResult<bool> {
        self.wait_loaded(Some(self.quick_timeout_ms()))
    }

    /// Accept a runtime permission dialog if one is up
    pub fn grant_permissions(&self) -> ScoutResult<bool> {
        for text in ALLOW_TEXTS {
            if self.try_click(&text_contains(text))? || self.try_click(&description_contains(text))? {
                tracing::info!(button = text, "granted picker permission");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Switch to another source tab ("Альбомы", "Photos", ...)
    pub fn switch_source(&self, tab: &str) -> ScoutResult<bool> {
        let tab = tab.trim();
        if self.try_click(&text_contains(tab))? || self.try_click(&description_contains(tab))? {
            return Ok(true);
        }
        let found = self
            .base
            .finder()
            .find_anywhere(SearchTarget::new(tab).with_timeout(self.quick_timeout_ms()))?;
        match found {
            Some(element) => Ok(absorb(element.click())?.is_some()),
            None => Ok(false),
        }
    }

    /// Pick a file by visible name, scrolling as needed.
    ///
    /// Names only show in DocumentsUI; the Photo Picker needs
    /// [`select_first_recent`](Self::select_first_recent).
    pub fn select_by_name(&self, name: &str, timeout_ms: Option<u64>) -> ScoutResult<bool> {
        let name = name.trim();
        let deadline = Deadline::after(Duration::from_millis(
            timeout_ms.unwrap_or(self.base.options().timeout_ms),
        ));
        loop {
            if self.try_click(&text_contains(name))? {
                tracing::info!(file = name, "picked by text");
                return Ok(true);
            }
            let package = self.package()?;
            if PickerProvider::from_package(&package) == PickerProvider::DocumentsUi {
                let titles = absorb(
                    self.session()
                        .find_elements(&By::id(resource_id(&package, DOCS_TITLE_ID))),
                )?
                .unwrap_or_default();
                for title in titles {
                    let text = absorb(self.session().text(&title))?.unwrap_or_default();
                    if text.contains(name) && absorb(self.session().click(&title))?.is_some() {
                        tracing::info!(file = name, "picked by title");
                        return Ok(true);
                    }
                }
            }
            if deadline.expired() || !self.scroll_down()? {
                return Ok(false);
            }
        }
    }

    /// Pick the first item under "Recent".
    ///
    /// Photo Picker thumbnails are not clickable, so the click goes to the
    /// nearest clickable ancestor or, failing that, the thumbnail's centre.
    pub fn select_first_recent(&self) -> ScoutResult<bool> {
        let session = self.session();
        let package = self.package()?;
        if PickerProvider::from_package(&package) == PickerProvider::MediaModule {
            let thumb = By::id(resource_id(&package, MEDIA_THUMB_ID));
            if let Some(element) = self.first(&thumb)? {
                let located = LocatedElement::new(session, element, NATIVE_APP, "recent thumbnail");
                let clicker = ResilientClicker::new(vec![Box::new(AncestorClick), Box::new(CoordinateTap)]);
                if absorb(clicker.click(&located))?.is_some() {
                    return Ok(true);
                }
            }
        }

        let mut items = self.list_items(6)?;
        if items.is_empty() {
            self.scroll_down()?;
            items = self.list_items(6)?;
        }
        match items.first() {
            Some(item) => Ok(absorb(session.click(item))?.is_some()),
            None => Ok(false),
        }
    }

    /// Press the provider's confirm button if it has one; no-op otherwise
    pub fn confirm(&self) -> ScoutResult<()> {
        let package = self.package()?;
        let quick = self.base.waits().with_timeout(self.quick_timeout_ms());
        for short in PickerProvider::from_package(&package).confirm_ids() {
            if let Some(button) = quick.clickable(&By::id(resource_id(&package, short)))? {
                if absorb(self.session().click(&button))?.is_some() {
                    return Ok(());
                }
            }
        }
        for text in CONFIRM_TEXTS {
            let matches = By::android_uiautomator(format!(
                "new UiSelector().textMatches(\".*{}.*\")",
                android_literal(text)
            ));
            if self.try_click(&matches)? || self.try_click(&description_contains(text))? {
                return Ok(());
            }
        }
        tracing::debug!("picker needs no confirmation");
        Ok(())
    }

    /// Close the picker via its cancel button, or system back
    pub fn cancel(&self) -> ScoutResult<()> {
        for text in CANCEL_TEXTS {
            if self.try_click(&text_contains(text))? || self.try_click(&description_contains(text))? {
                return Ok(());
            }
        }
        absorb(self.session().back()).map(drop)
    }
}
