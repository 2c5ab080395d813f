//! Device tests against a running Appium server.
//!
//! Ignored by default. Run with
//! `APPSCOUT_LIVE=1 cargo test -p appscout --test live -- --ignored`
//! after exporting the usual `TEST_PLATFORM` / `*_APPIUM_URL` / app path variables.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use appscout::{
    current_or_native, AppiumServerFixture, AppiumSession, ScoutConfig, Session, TextFinder, NATIVE_APP,
};
use std::time::Duration;

fn live() -> Option<ScoutConfig> {
    if std::env::var("APPSCOUT_LIVE").ok().as_deref() != Some("1") {
        eprintln!("APPSCOUT_LIVE != 1, skipping");
        return None;
    }
    Some(ScoutConfig::load(None).unwrap())
}

fn connect(config: &ScoutConfig) -> AppiumSession {
    let server = AppiumServerFixture::from_config(config, config.platform).unwrap();
    assert!(server.server().wait_ready(Duration::from_secs(60)).unwrap(), "Appium is not up");
    let url = config.appium_url(config.platform).unwrap();
    let caps = config.capabilities(config.platform).unwrap();
    AppiumSession::create(&url, &caps).unwrap()
}

#[test]
#[ignore = "needs a device; set APPSCOUT_LIVE=1"]
fn test_session_starts_native() {
    let Some(config) = live() else { return };
    let session = connect(&config);
    assert_eq!(session.platform(), config.platform);
    assert!(session.contexts().unwrap().iter().any(|c| c == NATIVE_APP));
    session.quit().unwrap();
}

#[test]
#[ignore = "needs a device; set APPSCOUT_LIVE=1"]
fn test_search_leaves_context_unchanged() {
    let Some(config) = live() else { return };
    let session = connect(&config);
    let before = current_or_native(&session).unwrap();
    let finder = TextFinder::with_options(&session, config.finder_options());
    let _ = finder.find_anywhere("no element carries this text 7f3c").unwrap();
    assert_eq!(current_or_native(&session).unwrap(), before);
    session.quit().unwrap();
}
