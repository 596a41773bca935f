//! Crawl unit processor
//!
//! Sweeps one sub-region: select it, walk every listing page, open every
//! item, extract its record and come back. Whatever was extracted before a
//! failure is still handed to the persistence gateway.

use crate::driver::BrowserDriver;
use crate::extract::extract_record;
use crate::model::{ExtractedRecord, SubRegionUnit};
use crate::navigation::{
    capture_detail, count_items_on_page, goto_page, open_item, return_to_listing, select_unit,
    total_pages, Session,
};
use crate::storage::{PersistenceGateway, RecordSink, SaveOutcome};
use crate::SweepError;
use chrono::Utc;
use tracing::{debug, error, info};

/// Result of one attempt at a unit
#[derive(Debug)]
pub struct UnitResult {
    /// Number of records extracted, including those before a failure
    pub records_found: usize,

    /// What the gateway did with them
    pub save: SaveOutcome,

    /// The failure that aborted the sweep, if any
    pub error: Option<SweepError>,
}

impl UnitResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Sweeps one unit and persists its records
///
/// Navigation failures do not propagate; they end up in
/// [`UnitResult::error`] wrapped in [`SweepError::UnitAborted`].
///
/// # Arguments
///
/// * `session` - The page session, positioned on the search form or a listing
/// * `gateway` - Where extracted records are saved
/// * `unit` - The sub-region to sweep
pub async fn process_unit<D: BrowserDriver, S: RecordSink>(
    session: &mut Session<D>,
    gateway: &mut PersistenceGateway<S>,
    unit: &SubRegionUnit,
) -> UnitResult {
    let mut records = Vec::new();
    let error = sweep_unit(session, unit, &mut records).await.err();

    if let Some(e) = &error {
        let detail = e.detail();
        error!(
            "{} aborted in {} ({}) selector={}: {}",
            unit,
            detail.function,
            detail.step.as_deref().unwrap_or("-"),
            detail.selector.as_deref().unwrap_or("-"),
            e.root_cause()
        );
    }

    let save = gateway.save_records(&records);
    info!(
        "{}: {} records ({} saved, {} duplicate, {} failed)",
        unit,
        records.len(),
        save.saved,
        save.duplicate,
        save.failed
    );

    UnitResult {
        records_found: records.len(),
        save,
        error,
    }
}

async fn sweep_unit<D: BrowserDriver>(
    session: &mut Session<D>,
    unit: &SubRegionUnit,
    records: &mut Vec<ExtractedRecord>,
) -> Result<(), SweepError> {
    let abort = |function: &'static str, step: Option<String>| abort_with(unit, function, step);

    select_unit(session, unit)
        .await
        .map_err(abort("select_unit", None))?;

    let shape = total_pages(session)
        .await
        .map_err(abort("total_pages", None))?;
    info!("{}: {} listing pages", unit, shape.total_pages);

    for page in 0..shape.total_pages {
        let at_page = || Some(format!("page {}", page + 1));

        goto_page(session, page)
            .await
            .map_err(abort("goto_page", at_page()))?;
        let items = count_items_on_page(session)
            .await
            .map_err(abort("count_items", at_page()))?;
        debug!("{}: page {} has {} items", unit, page + 1, items);

        for item in 0..items {
            let at_item = || Some(format!("page {} item {}", page + 1, item + 1));

            open_item(session, item)
                .await
                .map_err(abort("open_item", at_item()))?;
            let snapshot = capture_detail(session)
                .await
                .map_err(abort("capture_detail", at_item()))?;

            let record = extract_record(&snapshot, Utc::now());
            debug!("Extracted {}", record.title);
            records.push(record);

            return_to_listing(session, shape.has_pagination)
                .await
                .map_err(abort("return_to_listing", at_item()))?;
        }
    }

    Ok(())
}

fn abort_with<'a>(
    unit: &'a SubRegionUnit,
    function: &'static str,
    step: Option<String>,
) -> impl FnOnce(SweepError) -> SweepError + 'a {
    move |e| SweepError::aborted(unit, function, step, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::{MockItem, MockRegion, MockSite, MockSubRegion};
    use crate::navigation::Timings;
    use crate::storage::SqliteSink;
    use std::time::Duration;

    fn fast_timings() -> Timings {
        Timings {
            selector_timeout: Duration::from_millis(40),
            navigation_timeout: Duration::from_millis(200),
            action_delay: Duration::ZERO,
            page_settle: Duration::ZERO,
            marker_timeout: Duration::from_millis(15),
            fallback_settle: Duration::ZERO,
            poll_interval: Duration::from_millis(5),
            next_step_attempts: 1,
        }
    }

    fn curitiba() -> SubRegionUnit {
        SubRegionUnit::new("Paraná", "PR", "Curitiba", "6143")
    }

    async fn session(site: MockSite) -> Session<MockSite> {
        let mut session = Session::new(site, fast_timings(), "http://mock/");
        session.open_root().await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_sweeps_every_page_and_item() {
        let site = MockSite::new(vec![MockRegion::new(
            "PR",
            "Paraná",
            vec![MockSubRegion::new("6143", "Curitiba")
                .with_page(vec![MockItem::new("Casa A", "1"), MockItem::new("Casa B", "2")])
                .with_page(vec![MockItem::new("Casa C", "3")])],
        )]);
        let mut session = session(site).await;
        let mut gateway = PersistenceGateway::new(SqliteSink::new_in_memory().unwrap());

        let result = process_unit(&mut session, &mut gateway, &curitiba()).await;

        assert!(result.is_success());
        assert_eq!(result.records_found, 3);
        assert_eq!(result.save.saved, 3);
        assert_eq!(session.driver().back_navigations(), 3);
    }

    #[tokio::test]
    async fn test_empty_listing_succeeds_with_no_records() {
        let site = MockSite::new(vec![MockRegion::new(
            "PR",
            "Paraná",
            vec![MockSubRegion::new("6143", "Curitiba")],
        )]);
        let mut session = session(site).await;
        let mut gateway = PersistenceGateway::new(SqliteSink::new_in_memory().unwrap());

        let result = process_unit(&mut session, &mut gateway, &curitiba()).await;

        assert!(result.is_success());
        assert_eq!(result.records_found, 0);
        assert_eq!(result.save, SaveOutcome::default());
    }

    #[tokio::test]
    async fn test_stuck_step_aborts_with_context() {
        let site = MockSite::new(vec![MockRegion::new(
            "PR",
            "Paraná",
            vec![MockSubRegion::new("6143", "Curitiba")
                .with_page(vec![MockItem::new("Casa A", "1")])],
        )])
        .with_stuck_step("6143", 1);
        let mut session = session(site).await;
        let mut gateway = PersistenceGateway::new(SqliteSink::new_in_memory().unwrap());

        let result = process_unit(&mut session, &mut gateway, &curitiba()).await;

        let error = result.error.expect("unit should fail");
        assert!(matches!(error, SweepError::UnitAborted { .. }));
        let detail = error.detail();
        assert_eq!(detail.function, "select_unit");
        assert_eq!(detail.selector.as_deref(), Some("#btn_next1"));
        assert_eq!(
            detail.snapshot.and_then(|s| s.display).as_deref(),
            Some("none")
        );
        assert_eq!(result.records_found, 0);
    }
}
