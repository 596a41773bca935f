//! Browser driver trait and error types
//!
//! This module defines the narrow interface the navigation layer needs from
//! an automated browser, plus the element data that crosses that interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while talking to the browser
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("No element matches {selector}")]
    NotFound { selector: String },

    #[error("Element {selector} is not interactable: {reason}")]
    NotInteractable { selector: String, reason: String },

    #[error("Invalid selector {selector}: {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Browser session is closed")]
    SessionClosed,
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Addresses one element: the `index`-th match of `selector`, optionally
/// narrowed to the first descendant matching `child`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub selector: String,
    pub index: usize,
    pub child: Option<String>,
}

impl Locator {
    /// Locates the first match of a CSS selector
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            index: 0,
            child: None,
        }
    }

    /// Targets the `index`-th match instead of the first
    pub fn nth(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Narrows the target to a descendant of the matched element
    pub fn within(mut self, child: impl Into<String>) -> Self {
        self.child = Some(child.into());
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.selector, self.index)?;
        if let Some(child) = &self.child {
            write!(f, " {}", child)?;
        }
        Ok(())
    }
}

/// What the driver reports about one matched element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementInfo {
    /// Rendered text content, trimmed
    pub text: String,
    pub inner_html: String,
    /// Current value for form controls
    pub value: Option<String>,
    pub attributes: HashMap<String, String>,
    pub visible: bool,
    pub enabled: bool,
}

impl ElementInfo {
    /// Returns an attribute value by name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Returns true when the element can receive a click
    pub fn is_interactable(&self) -> bool {
        self.visible && self.enabled
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
}

/// DOM state of an element captured for failure diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub selector: String,
    pub outer_html: Option<String>,
    pub bounding_box: Option<BoundingBox>,
    pub display: Option<String>,
    pub visibility: Option<String>,
    pub opacity: Option<String>,
}

impl ElementSnapshot {
    /// Outer HTML kept in a snapshot, in characters
    pub const MAX_OUTER_HTML: usize = 2000;

    /// Caps `outer_html` at `MAX_OUTER_HTML` characters
    pub fn truncated(mut self) -> Self {
        if let Some(html) = &self.outer_html {
            if let Some((cut, _)) = html.char_indices().nth(Self::MAX_OUTER_HTML) {
                self.outer_html = Some(html[..cut].to_string());
            }
        }
        self
    }
}

/// Trait for automated browser sessions
///
/// One driver owns one page. All operations act on the currently loaded
/// document; callers are responsible for waiting until the document is in
/// the expected state.
#[async_trait]
pub trait BrowserDriver: Send {
    /// Loads a URL in the page
    async fn open_page(&mut self, url: &str) -> DriverResult<()>;

    /// Returns every element matching a CSS selector, in document order
    ///
    /// An empty result is not an error.
    async fn query_all(&mut self, selector: &str) -> DriverResult<Vec<ElementInfo>>;

    /// Clicks the located element
    async fn click(&mut self, locator: &Locator) -> DriverResult<()>;

    /// Selects the option with `value` in the `<select>` matched by `selector`
    ///
    /// Implementations must fire the change event the page listens to.
    async fn select(&mut self, selector: &str, value: &str) -> DriverResult<()>;

    /// Returns the rendered text of the document body
    async fn body_text(&mut self) -> DriverResult<String>;

    /// Captures the diagnostic state of an element, or `None` if it is absent
    async fn inspect(&mut self, locator: &Locator) -> DriverResult<Option<ElementSnapshot>>;

    /// Navigates one entry back in the session history
    async fn go_back(&mut self) -> DriverResult<()>;

    /// Reloads the current document
    async fn reload(&mut self) -> DriverResult<()>;

    /// Ends the session; every later call returns `SessionClosed`
    async fn close(&mut self) -> DriverResult<()>;
}
