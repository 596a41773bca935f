//! Pagination walker
//!
//! Page indices are 0-based. Page 0 is the listing shown right after a unit
//! is selected and needs no navigation.

use super::primitives::{Condition, Session};
use super::selectors::{LISTING_ITEM, PAGINATION, PAGINATION_LINK};
use crate::driver::{BrowserDriver, Locator};
use crate::{Result, SweepError};
use tracing::debug;

/// Shape of the listing of the selected unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingShape {
    pub total_pages: usize,
    /// Whether the listing renders a pagination control at all
    pub has_pagination: bool,
}

/// Determines how many listing pages the selected unit has
///
/// With a pagination control, the page count is the number of page links,
/// or 1 when the control has none. Without a control, the listing has one
/// implicit page if any item is present, otherwise zero pages.
pub async fn total_pages<D: BrowserDriver>(session: &mut Session<D>) -> Result<ListingShape> {
    let timings = *session.timings();

    match session
        .wait_for(&Condition::present(PAGINATION), timings.marker_timeout)
        .await
    {
        Ok(()) => {
            let links = session.count(PAGINATION_LINK).await?;
            debug!("Pagination control with {} page links", links);
            Ok(ListingShape {
                total_pages: links.max(1),
                has_pagination: true,
            })
        }
        Err(SweepError::NavigationTimeout { .. }) => {
            let items = session.count(LISTING_ITEM).await?;
            debug!("No pagination control; {} items on the listing", items);
            Ok(ListingShape {
                total_pages: usize::from(items > 0),
                has_pagination: false,
            })
        }
        Err(e) => Err(e),
    }
}

/// Shows listing page `index`
pub async fn goto_page<D: BrowserDriver>(session: &mut Session<D>, index: usize) -> Result<()> {
    if index == 0 {
        return Ok(());
    }

    let timings = *session.timings();
    session
        .wait_for(&Condition::present(PAGINATION), timings.selector_timeout)
        .await?;

    let links = session.count(PAGINATION_LINK).await?;
    if index >= links {
        return Err(SweepError::ElementNotFound {
            selector: Locator::css(PAGINATION_LINK).nth(index).to_string(),
        });
    }

    debug!("Moving to page {}", index + 1);
    session
        .click(&Locator::css(PAGINATION_LINK).nth(index))
        .await?;
    session.settle(timings.page_settle).await;
    Ok(())
}

/// Counts the listing items on the current page
///
/// Waits until the listing is rendered, either through its pagination
/// control or through its first item.
pub async fn count_items_on_page<D: BrowserDriver>(session: &mut Session<D>) -> Result<usize> {
    let timings = *session.timings();
    let rendered = Condition::Any(vec![
        Condition::present(PAGINATION),
        Condition::present(LISTING_ITEM),
    ]);
    session.wait_for(&rendered, timings.selector_timeout).await?;

    session.count(LISTING_ITEM).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::{MockItem, MockRegion, MockSite, MockSubRegion};
    use crate::model::SubRegionUnit;
    use crate::navigation::{select_unit, Timings};
    use std::time::Duration;

    fn fast_timings() -> Timings {
        Timings {
            selector_timeout: Duration::from_millis(40),
            navigation_timeout: Duration::from_millis(200),
            action_delay: Duration::ZERO,
            page_settle: Duration::ZERO,
            marker_timeout: Duration::from_millis(20),
            fallback_settle: Duration::ZERO,
            poll_interval: Duration::from_millis(5),
            next_step_attempts: 1,
        }
    }

    fn items(prefix: &str, n: usize) -> Vec<MockItem> {
        (0..n)
            .map(|i| MockItem::new(&format!("{prefix} {i}"), &format!("{prefix}{i}")))
            .collect()
    }

    async fn listing_of(sub: MockSubRegion) -> Session<MockSite> {
        let id = sub.id.clone();
        let site = MockSite::new(vec![MockRegion::new("PR", "Paraná", vec![sub])]);
        let mut session = Session::new(site, fast_timings(), "http://mock/");
        session.open_root().await.unwrap();
        let unit = SubRegionUnit::new("Paraná", "PR", "X", id);
        select_unit(&mut session, &unit).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_total_pages_counts_links() {
        let sub = MockSubRegion::new("1", "A")
            .with_page(items("a", 3))
            .with_page(items("b", 2))
            .with_page(items("c", 1));
        let mut session = listing_of(sub).await;

        let shape = total_pages(&mut session).await.unwrap();
        assert_eq!(
            shape,
            ListingShape {
                total_pages: 3,
                has_pagination: true
            }
        );
    }

    #[tokio::test]
    async fn test_implicit_single_page_and_empty_listing() {
        let sub = MockSubRegion::new("1", "A")
            .with_page(items("a", 2))
            .without_pagination();
        let mut session = listing_of(sub).await;
        let shape = total_pages(&mut session).await.unwrap();
        assert_eq!(shape.total_pages, 1);
        assert!(!shape.has_pagination);
        assert_eq!(count_items_on_page(&mut session).await.unwrap(), 2);

        let mut empty = listing_of(MockSubRegion::new("2", "B")).await;
        let shape = total_pages(&mut empty).await.unwrap();
        assert_eq!(shape.total_pages, 0);
    }

    #[tokio::test]
    async fn test_goto_page_moves_between_pages() {
        let sub = MockSubRegion::new("1", "A")
            .with_page(items("a", 3))
            .with_page(items("b", 2));
        let mut session = listing_of(sub).await;

        goto_page(&mut session, 0).await.unwrap();
        assert_eq!(count_items_on_page(&mut session).await.unwrap(), 3);

        goto_page(&mut session, 1).await.unwrap();
        assert_eq!(count_items_on_page(&mut session).await.unwrap(), 2);

        let err = goto_page(&mut session, 5).await.unwrap_err();
        assert!(matches!(err, SweepError::ElementNotFound { .. }));
    }
}
