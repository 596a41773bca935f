//! Session handle and verified navigation primitives
//!
//! A [`Session`] owns the browser driver. Every navigation step borrows it
//! mutably, so two DOM operations on the same page can never overlap.

use super::selectors;
use crate::config::NavigationConfig;
use crate::driver::{BrowserDriver, DriverError, ElementInfo, ElementSnapshot, Locator};
use crate::{Result, SweepError};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

/// Timeouts and delays used by every navigation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub selector_timeout: Duration,
    pub navigation_timeout: Duration,
    pub action_delay: Duration,
    pub page_settle: Duration,
    pub marker_timeout: Duration,
    pub fallback_settle: Duration,
    pub poll_interval: Duration,
    pub next_step_attempts: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self::from(&NavigationConfig::default())
    }
}

impl From<&NavigationConfig> for Timings {
    fn from(config: &NavigationConfig) -> Self {
        Self {
            selector_timeout: Duration::from_millis(config.selector_timeout_ms),
            navigation_timeout: Duration::from_millis(config.navigation_timeout_ms),
            action_delay: Duration::from_millis(config.action_delay_ms),
            page_settle: Duration::from_millis(config.page_settle_ms),
            marker_timeout: Duration::from_millis(config.detail_marker_timeout_ms),
            fallback_settle: Duration::from_millis(config.detail_fallback_settle_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            next_step_attempts: config.next_step_attempts,
        }
    }
}

/// A predicate over the current document
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// At least one element matches the selector
    Present(String),

    /// At least `min` elements match the selector
    AtLeast { selector: String, min: usize },

    /// The located element exists, is visible and is enabled
    Interactable(Locator),

    /// The body text is longer than the given number of characters
    BodyTextLongerThan(usize),

    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    pub fn present(selector: &str) -> Self {
        Self::Present(selector.to_string())
    }

    pub fn at_least(selector: &str, min: usize) -> Self {
        Self::AtLeast {
            selector: selector.to_string(),
            min,
        }
    }

    pub fn interactable(selector: &str) -> Self {
        Self::Interactable(Locator::css(selector))
    }

    /// Human-readable form used in timeout errors and logs
    pub fn describe(&self) -> String {
        match self {
            Self::Present(selector) => format!("{selector} to be present"),
            Self::AtLeast { selector, min } => format!("at least {min} matches of {selector}"),
            Self::Interactable(locator) => format!("{locator} to be interactable"),
            Self::BodyTextLongerThan(n) => format!("body text longer than {n} characters"),
            Self::All(parts) => join_descriptions(parts, " and "),
            Self::Any(parts) => join_descriptions(parts, " or "),
        }
    }

    /// Element worth inspecting when this condition does not hold
    fn primary_locator(&self) -> Option<Locator> {
        match self {
            Self::Present(selector) | Self::AtLeast { selector, .. } => {
                Some(Locator::css(selector.as_str()))
            }
            Self::Interactable(locator) => Some(locator.clone()),
            Self::BodyTextLongerThan(_) => None,
            Self::All(parts) | Self::Any(parts) => parts.iter().find_map(Self::primary_locator),
        }
    }
}

fn join_descriptions(parts: &[Condition], separator: &str) -> String {
    let described: Vec<String> = parts.iter().map(Condition::describe).collect();
    format!("({})", described.join(separator))
}

/// Single-owner handle on one browser page
pub struct Session<D> {
    driver: D,
    timings: Timings,
    root_url: String,
}

impl<D: BrowserDriver> Session<D> {
    /// Creates a session over a driver
    ///
    /// # Arguments
    ///
    /// * `driver` - The browser driver that owns the page
    /// * `timings` - Timeouts and delays for every navigation step
    /// * `root_url` - The search form URL the session returns to on failure
    pub fn new(driver: D, timings: Timings, root_url: impl Into<String>) -> Self {
        Self {
            driver,
            timings,
            root_url: root_url.into(),
        }
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Loads the search form and waits until the region selector exists
    pub async fn open_root(&mut self) -> Result<()> {
        let url = self.root_url.clone();
        debug!("Opening root page {}", url);

        match tokio::time::timeout(self.timings.navigation_timeout, self.driver.open_page(&url))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(SweepError::NavigationTimeout {
                    description: format!("{url} to load"),
                    selector: None,
                    diagnostics: None,
                })
            }
        }

        let timeout = self.timings.selector_timeout;
        self.wait_for(&Condition::present(selectors::REGION_SELECT), timeout)
            .await
    }

    /// Reloads the current document
    pub async fn reload(&mut self) -> Result<()> {
        self.driver.reload().await?;
        Ok(())
    }

    /// Navigates one entry back in history
    pub async fn go_back(&mut self) -> Result<()> {
        self.driver.go_back().await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.driver.close().await?;
        Ok(())
    }

    /// Waits for a fixed delay
    pub async fn settle(&self, duration: Duration) {
        if !duration.is_zero() {
            sleep(duration).await;
        }
    }

    // ===== Queries =====

    /// Returns every element matching a selector
    pub async fn query(&mut self, selector: &str) -> Result<Vec<ElementInfo>> {
        Ok(self.driver.query_all(selector).await?)
    }

    /// Returns the first element matching a selector
    pub async fn first(&mut self, selector: &str) -> Result<Option<ElementInfo>> {
        Ok(self.query(selector).await?.into_iter().next())
    }

    pub async fn count(&mut self, selector: &str) -> Result<usize> {
        Ok(self.query(selector).await?.len())
    }

    pub async fn body_text(&mut self) -> Result<String> {
        Ok(self.driver.body_text().await?)
    }

    /// Captures the DOM state of an element for diagnostics
    ///
    /// Inspection failures are logged and yield `None`.
    pub async fn snapshot(&mut self, locator: &Locator) -> Option<ElementSnapshot> {
        match self.driver.inspect(locator).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("Could not inspect {}: {}", locator, e);
                None
            }
        }
    }

    /// Like `query`, but reads a document in transition as "no match"
    async fn query_settled(&mut self, selector: &str) -> Result<Vec<ElementInfo>> {
        match self.driver.query_all(selector).await {
            Ok(elements) => Ok(elements),
            Err(DriverError::Script(msg)) | Err(DriverError::Navigation(msg)) => {
                trace!("Query of {} failed transiently: {}", selector, msg);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ===== Conditions =====

    /// Evaluates a condition once against the current document
    pub fn holds<'a>(
        &'a mut self,
        condition: &'a Condition,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            match condition {
                Condition::Present(selector) => Ok(!self.query_settled(selector).await?.is_empty()),
                Condition::AtLeast { selector, min } => {
                    Ok(self.query_settled(selector).await?.len() >= *min)
                }
                Condition::Interactable(locator) => {
                    let elements = self.query_settled(&locator.selector).await?;
                    Ok(elements
                        .get(locator.index)
                        .map(ElementInfo::is_interactable)
                        .unwrap_or(false))
                }
                Condition::BodyTextLongerThan(n) => match self.driver.body_text().await {
                    Ok(text) => Ok(text.trim().chars().count() > *n),
                    Err(DriverError::SessionClosed) => Err(DriverError::SessionClosed.into()),
                    Err(_) => Ok(false),
                },
                Condition::All(parts) => {
                    for part in parts {
                        if !self.holds(part).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                Condition::Any(parts) => {
                    for part in parts {
                        if self.holds(part).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
            }
        })
    }

    /// Polls until `condition` holds or `timeout` elapses
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The condition held
    /// * `Err(SweepError::NavigationTimeout)` - Deadline passed; carries a
    ///   snapshot of the condition's primary element when it exists
    pub async fn wait_for(&mut self, condition: &Condition, timeout: Duration) -> Result<()> {
        self.wait_for_first(std::slice::from_ref(condition), timeout)
            .await
            .map(|_| ())
    }

    /// Polls a list of conditions until one holds, returning its index
    ///
    /// Conditions are checked in order on every poll, so an earlier entry
    /// wins when several hold at once.
    pub async fn wait_for_first(
        &mut self,
        conditions: &[Condition],
        timeout: Duration,
    ) -> Result<usize> {
        let deadline = Instant::now() + timeout;

        loop {
            for (index, condition) in conditions.iter().enumerate() {
                if self.holds(condition).await? {
                    return Ok(index);
                }
            }

            if Instant::now() >= deadline {
                return Err(self.timeout_error(conditions).await);
            }

            sleep(self.timings.poll_interval).await;
        }
    }

    async fn timeout_error(&mut self, conditions: &[Condition]) -> SweepError {
        let description = conditions
            .iter()
            .map(Condition::describe)
            .collect::<Vec<_>>()
            .join(" or ");
        let locator = conditions.iter().find_map(Condition::primary_locator);

        let diagnostics = match &locator {
            Some(locator) => self.snapshot(locator).await.map(Box::new),
            None => None,
        };

        SweepError::NavigationTimeout {
            description,
            selector: locator.map(|l| l.selector),
            diagnostics,
        }
    }

    // ===== Actions =====

    /// Clicks an element after checking it exists, is visible and is enabled
    pub async fn click(&mut self, locator: &Locator) -> Result<()> {
        let elements = self.query(&locator.selector).await?;
        let element = elements
            .get(locator.index)
            .ok_or_else(|| SweepError::ElementNotFound {
                selector: locator.to_string(),
            })?;

        if !element.visible {
            return Err(SweepError::ElementNotInteractable {
                selector: locator.to_string(),
                reason: "not visible".to_string(),
            });
        }
        if !element.enabled {
            return Err(SweepError::ElementNotInteractable {
                selector: locator.to_string(),
                reason: "disabled".to_string(),
            });
        }

        trace!("Clicking {}", locator);
        self.driver.click(locator).await?;
        Ok(())
    }

    /// Selects an option by value and verifies the selection took effect
    pub async fn select_option(&mut self, field: &str, value: &str) -> Result<()> {
        let control = self
            .first(field)
            .await?
            .ok_or_else(|| SweepError::ElementNotFound {
                selector: field.to_string(),
            })?;
        if !control.enabled {
            return Err(SweepError::ElementNotInteractable {
                selector: field.to_string(),
                reason: "disabled".to_string(),
            });
        }

        let option = option_selector(field, value);
        if self.count(&option).await? == 0 {
            return Err(SweepError::ElementNotFound { selector: option });
        }

        trace!("Selecting {} in {}", value, field);
        self.driver.select(field, value).await?;

        let applied = self.first(field).await?.and_then(|c| c.value);
        if applied.as_deref() != Some(value) {
            return Err(SweepError::ElementNotInteractable {
                selector: field.to_string(),
                reason: format!("selection of '{value}' did not stick (value is {applied:?})"),
            });
        }

        Ok(())
    }
}

/// Selector for the option with a given value inside a select
pub(crate) fn option_selector(field: &str, value: &str) -> String {
    format!("{field} option[value=\"{}\"]", value.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::{MockItem, MockRegion, MockSite, MockSubRegion};

    fn fast_timings() -> Timings {
        Timings {
            selector_timeout: Duration::from_millis(40),
            navigation_timeout: Duration::from_millis(200),
            action_delay: Duration::ZERO,
            page_settle: Duration::ZERO,
            marker_timeout: Duration::from_millis(20),
            fallback_settle: Duration::ZERO,
            poll_interval: Duration::from_millis(5),
            next_step_attempts: 2,
        }
    }

    fn session() -> Session<MockSite> {
        let site = MockSite::new(vec![MockRegion::new(
            "PR",
            "Paraná",
            vec![MockSubRegion::new("6143", "Curitiba")
                .with_page(vec![MockItem::new("Casa", "1444400000001")])],
        )]);
        Session::new(site, fast_timings(), "http://mock/busca")
    }

    #[test]
    fn test_timings_from_defaults() {
        let timings = Timings::default();
        assert_eq!(timings.selector_timeout, Duration::from_millis(10_000));
        assert_eq!(timings.navigation_timeout, Duration::from_millis(30_000));
        assert_eq!(timings.action_delay, Duration::from_millis(800));
        assert_eq!(timings.page_settle, Duration::from_millis(2_000));
        assert_eq!(timings.next_step_attempts, 3);
    }

    #[test]
    fn test_condition_descriptions() {
        let condition = Condition::Any(vec![
            Condition::present("#preview"),
            Condition::BodyTextLongerThan(100),
        ]);
        assert_eq!(
            condition.describe(),
            "(#preview to be present or body text longer than 100 characters)"
        );
        assert_eq!(
            condition.primary_locator(),
            Some(Locator::css("#preview"))
        );
    }

    #[tokio::test]
    async fn test_open_root_waits_for_region_select() {
        let mut session = session();
        session.open_root().await.unwrap();
        assert_eq!(session.driver().root_visits(), 1);
        assert!(session
            .holds(&Condition::present(selectors::REGION_SELECT))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_times_out_with_description() {
        let mut session = session();
        session.open_root().await.unwrap();

        let err = session
            .wait_for(&Condition::present("#paginacao"), Duration::from_millis(15))
            .await
            .unwrap_err();
        match err {
            SweepError::NavigationTimeout {
                description,
                selector,
                diagnostics,
            } => {
                assert!(description.contains("#paginacao"));
                assert_eq!(selector.as_deref(), Some("#paginacao"));
                assert!(diagnostics.is_none());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_wait_for_first_prefers_earlier_condition() {
        let mut session = session();
        session.open_root().await.unwrap();

        let index = session
            .wait_for_first(
                &[
                    Condition::present("#does-not-exist"),
                    Condition::present(selectors::SUB_REGION_SELECT),
                    Condition::present(selectors::REGION_SELECT),
                ],
                Duration::from_millis(20),
            )
            .await
            .unwrap();
        assert_eq!(index, 1);
    }

    #[tokio::test]
    async fn test_select_option_verifies_value() {
        let mut session = session();
        session.open_root().await.unwrap();
        session
            .select_option(selectors::REGION_SELECT, "PR")
            .await
            .unwrap();

        let err = session
            .select_option(selectors::SUB_REGION_SELECT, "9999")
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::ElementNotFound { ref selector } if selector.contains("9999")));
    }

    #[tokio::test]
    async fn test_click_missing_element() {
        let mut session = session();
        session.open_root().await.unwrap();
        let err = session
            .click(&Locator::css("#btn_next0"))
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::ElementNotFound { .. }));
    }
}
