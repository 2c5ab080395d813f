//! Platform query construction.
//!
//! Turns a human search target (accessibility id or free text) into the
//! ordered list of native queries to try, most specific first. Pure string
//! building: no session access, so escaping can be tested in isolation.

use crate::platform::Platform;
use crate::session::By;

/// Parent lookup used by the ancestor click tier
pub const CLICKABLE_ANCESTOR_XPATH: &str = "./ancestor::*[@clickable='true'][1]";

/// Script returning the rendered text of a web view document
pub const BODY_TEXT_SCRIPT: &str =
    "return (document.body && (document.body.innerText || document.body.textContent)) || '';";

/// Escape a value for a double-quoted UiAutomator string argument.
#[must_use]
pub fn android_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Escape a value for a single-quoted NSPredicate string.
#[must_use]
pub fn ios_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Case-insensitive "contains" regex for `descriptionMatches`/`textMatches`.
#[must_use]
pub fn contains_pattern(value: &str) -> String {
    format!("(?i).*{}.*", regex::escape(value))
}

/// Build a valid XPath 1.0 string literal for any input.
///
/// XPath has no escape sequences, so a value holding both quote kinds is
/// split on `'` and glued back with `concat()`.
#[must_use]
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let parts: Vec<String> = value.split('\'').map(|p| format!("'{p}'")).collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Normalised search text, `None` for empty or whitespace-only targets.
fn normalized(target: &str) -> Option<&str> {
    let trimmed = target.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Android UiAutomator queries for `target`.
///
/// Order: content-description exact, contains; text exact, contains; then the
/// case-insensitive regex variants of both.
#[must_use]
pub fn android_queries(target: &str) -> Vec<By> {
    let Some(q) = normalized(target) else {
        return Vec::new();
    };
    let lit = android_literal(q);
    let pattern = android_literal(&contains_pattern(q));
    vec![
        By::android_uiautomator(format!("new UiSelector().description(\"{lit}\")")),
        By::android_uiautomator(format!("new UiSelector().descriptionContains(\"{lit}\")")),
        By::android_uiautomator(format!("new UiSelector().text(\"{lit}\")")),
        By::android_uiautomator(format!("new UiSelector().textContains(\"{lit}\")")),
        By::android_uiautomator(format!("new UiSelector().descriptionMatches(\"{pattern}\")")),
        By::android_uiautomator(format!("new UiSelector().textMatches(\"{pattern}\")")),
    ]
}

/// NSPredicate matching `label`, `name` or `value` case-insensitively.
#[must_use]
pub fn ios_predicate(target: &str) -> String {
    let p = ios_literal(target.trim());
    format!("label CONTAINS[c] '{p}' OR name CONTAINS[c] '{p}' OR value CONTAINS[c] '{p}'")
}

/// iOS queries for `target`: accessibility id, predicate, class chain.
#[must_use]
pub fn ios_queries(target: &str) -> Vec<By> {
    let Some(q) = normalized(target) else {
        return Vec::new();
    };
    let predicate = ios_predicate(q);
    let class_chain = format!("**/XCUIElementTypeAny[`{predicate}`]");
    vec![
        By::accessibility_id(q),
        By::ios_predicate(predicate),
        By::ios_class_chain(class_chain),
    ]
}

/// Structural text query for web view documents.
///
/// Only the deepest nodes whose normalised text contains the target match;
/// enclosing containers (`html`, `body`, wrappers) carry the same text and are
/// excluded.
#[must_use]
pub fn webview_text_query(target: &str) -> Option<By> {
    normalized(target).map(|q| {
        let literal = xpath_literal(q);
        By::xpath(format!(
            "//*[contains(normalize-space(), {literal}) and not(.//*[contains(normalize-space(), {literal})])]"
        ))
    })
}

impl Platform {
    /// Ordered native queries for this platform.
    ///
    /// `Unknown` degrades to Android queries followed by iOS queries.
    #[must_use]
    pub fn native_queries(&self, target: &str) -> Vec<By> {
        match self {
            Self::Android => android_queries(target),
            Self::Ios => ios_queries(target),
            Self::Unknown => {
                let mut queries = android_queries(target);
                queries.extend(ios_queries(target));
                queries
            }
        }
    }
}
