//! Region selector
//!
//! Enumerates every (region, sub-region) pair from the search form and
//! drives the form into the listing of one unit.

use super::primitives::{option_selector, Condition, Session};
use super::selectors::{
    ALTER_CONTROL, NEXT_STEPS, REGION_SELECT, SUB_REGION_OPTION, SUB_REGION_SELECT,
};
use crate::driver::{BrowserDriver, Locator};
use crate::model::SubRegionUnit;
use crate::{Result, SweepError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A non-placeholder option of a select control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

/// Returns true for the "Selecione" entry and other options without a value
pub fn is_placeholder(label: &str, value: &str) -> bool {
    value.trim().is_empty() || label.trim().to_lowercase().starts_with("selecione")
}

/// Reads the real options of a select control, in document order
pub async fn read_options<D: BrowserDriver>(
    session: &mut Session<D>,
    select_selector: &str,
) -> Result<Vec<SelectOption>> {
    let elements = session.query(&format!("{select_selector} option")).await?;

    Ok(elements
        .into_iter()
        .filter_map(|option| {
            let value = option.value.unwrap_or_default();
            if is_placeholder(&option.text, &value) {
                None
            } else {
                Some(SelectOption {
                    label: option.text,
                    value,
                })
            }
        })
        .collect())
}

/// Enumerates every unit reachable from the search form
///
/// The form must already be loaded. Units come out in region order, then
/// sub-region order. A region whose sub-region list never fills in yields
/// no units.
pub async fn enumerate_units<D: BrowserDriver>(
    session: &mut Session<D>,
) -> Result<Vec<SubRegionUnit>> {
    let timings = *session.timings();
    session
        .wait_for(&Condition::present(REGION_SELECT), timings.selector_timeout)
        .await?;

    let regions = read_options(session, REGION_SELECT).await?;
    info!("Found {} regions", regions.len());

    let mut units = Vec::new();
    let mut previous: Option<Vec<SelectOption>> = None;

    for region in &regions {
        session.select_option(REGION_SELECT, &region.value).await?;

        let filled = session
            .wait_for(
                &Condition::at_least(SUB_REGION_OPTION, 2),
                timings.selector_timeout,
            )
            .await;
        match filled {
            Ok(()) => {}
            Err(SweepError::NavigationTimeout { .. }) => {
                warn!("Region {} ({}) has no sub-regions", region.label, region.value);
                previous = None;
                continue;
            }
            Err(e) => return Err(e),
        }

        // The list may still hold the previous region's entries
        let mut subs = read_options(session, SUB_REGION_SELECT).await?;
        if let Some(prev) = &previous {
            let deadline = Instant::now() + timings.selector_timeout;
            while &subs == prev && Instant::now() < deadline {
                session.settle(timings.poll_interval).await;
                subs = read_options(session, SUB_REGION_SELECT).await?;
            }
        }

        debug!(
            "Region {} ({}): {} sub-regions",
            region.label,
            region.value,
            subs.len()
        );
        units.extend(subs.iter().map(|sub| {
            SubRegionUnit::new(&region.label, &region.value, &sub.label, &sub.value)
        }));
        previous = Some(subs);
    }

    info!("Enumerated {} units", units.len());
    Ok(units)
}

/// Drives the form from its current state into the listing of `unit`
///
/// Reopens the form through the alter control when a listing is showing,
/// selects the region, waits for its sub-regions, selects the sub-region and
/// clicks through the confirmation steps.
pub async fn select_unit<D: BrowserDriver>(
    session: &mut Session<D>,
    unit: &SubRegionUnit,
) -> Result<()> {
    let timings = *session.timings();

    if session
        .holds(&Condition::interactable(ALTER_CONTROL))
        .await?
    {
        debug!("Reopening the search form");
        session.click(&Locator::css(ALTER_CONTROL)).await?;
    }

    session
        .wait_for(&Condition::present(REGION_SELECT), timings.selector_timeout)
        .await?;
    session.select_option(REGION_SELECT, &unit.region_id).await?;

    let sub_region_ready = Condition::All(vec![
        Condition::at_least(SUB_REGION_OPTION, 2),
        Condition::Present(option_selector(SUB_REGION_SELECT, &unit.sub_region.id)),
    ]);
    session
        .wait_for(&sub_region_ready, timings.selector_timeout)
        .await?;
    session
        .select_option(SUB_REGION_SELECT, &unit.sub_region.id)
        .await?;
    session.settle(timings.action_delay).await;

    for (position, step) in NEXT_STEPS.iter().enumerate() {
        advance_step(session, step, position + 1).await?;
        session.settle(timings.action_delay).await;
    }

    debug!("Selected {}", unit);
    Ok(())
}

/// Clicks one confirmation button, retrying a bounded number of times
async fn advance_step<D: BrowserDriver>(
    session: &mut Session<D>,
    selector: &str,
    position: usize,
) -> Result<()> {
    let timings = *session.timings();
    let locator = Locator::css(selector);
    let ready = Condition::Interactable(locator.clone());
    let mut last_error = None;

    for attempt in 1..=timings.next_step_attempts {
        let outcome = match session.wait_for(&ready, timings.selector_timeout).await {
            Ok(()) => session.click(&locator).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => return Ok(()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(
                    "Step {} ({}) attempt {}/{} failed: {}",
                    position, selector, attempt, timings.next_step_attempts, e
                );
                last_error = Some(e);
            }
        }

        if attempt < timings.next_step_attempts {
            session.settle(timings.action_delay).await;
        }
    }

    let diagnostics = session.snapshot(&locator).await.map(Box::new);
    let cause = last_error.map(|e| e.to_string()).unwrap_or_default();

    Err(SweepError::NavigationTimeout {
        description: format!(
            "step {position} ({selector}) after {} attempts: {cause}",
            timings.next_step_attempts
        ),
        selector: Some(selector.to_string()),
        diagnostics,
    })
}

/// Returns from a listing to the search form through the alter control
///
/// Fails when the control is absent; the caller then reloads the root page.
pub async fn return_to_selector<D: BrowserDriver>(session: &mut Session<D>) -> Result<()> {
    let timings = *session.timings();

    session.click(&Locator::css(ALTER_CONTROL)).await?;
    session
        .wait_for(&Condition::present(REGION_SELECT), timings.selector_timeout)
        .await
}
