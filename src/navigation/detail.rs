//! Detail page loader
//!
//! Opens one listing item, waits until its detail page has rendered using a
//! chain of progressively weaker markers, captures it, and navigates back.

use super::primitives::{Condition, Session};
use super::selectors::{
    COUNTDOWN_CELLS, DETAIL_BLOCK, DETAIL_BODY_MIN_CHARS, DETAIL_CONTENT, DETAIL_HEADING,
    DETAIL_LINK, DETAIL_PREVIEW, DISCOUNT_PARAGRAPH, LISTING_ITEM, PAGINATION, TITLE_BLOCK, TITLE_HEADING,
};
use crate::driver::{BrowserDriver, Locator};
use crate::extract::DetailSnapshot;
use crate::{Result, SweepError};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, warn};

static HEADING: Lazy<Selector> =
    Lazy::new(|| Selector::parse(TITLE_HEADING).expect("heading selector should parse"));

/// Which marker showed that the detail page was ready
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailMarker {
    /// The preview image
    Preview,
    /// A content block, heading, full-width block or enough body text
    Content,
    /// Only the body element; the page was given a fixed settle delay
    Fallback,
}

/// Opens listing item `index` of the current page and waits for its detail page
pub async fn open_item<D: BrowserDriver>(
    session: &mut Session<D>,
    index: usize,
) -> Result<DetailMarker> {
    let timings = *session.timings();
    let listed = Condition::Any(vec![
        Condition::present(PAGINATION),
        Condition::present(LISTING_ITEM),
    ]);
    session.wait_for(&listed, timings.selector_timeout).await?;

    let link = Locator::css(LISTING_ITEM).nth(index).within(DETAIL_LINK);
    debug!("Opening item {}", index + 1);
    session.click(&link).await?;

    wait_for_detail(session).await
}

async fn wait_for_detail<D: BrowserDriver>(session: &mut Session<D>) -> Result<DetailMarker> {
    let timings = *session.timings();

    match session
        .wait_for(&Condition::present(DETAIL_PREVIEW), timings.marker_timeout)
        .await
    {
        Ok(()) => return Ok(DetailMarker::Preview),
        Err(SweepError::NavigationTimeout { .. }) => {}
        Err(e) => return Err(e),
    }

    let content = [
        Condition::present(DETAIL_CONTENT),
        Condition::present(DETAIL_HEADING),
        Condition::present(DETAIL_BLOCK),
        Condition::BodyTextLongerThan(DETAIL_BODY_MIN_CHARS),
    ];
    match session.wait_for_first(&content, timings.marker_timeout).await {
        Ok(_) => {
            debug!("Detail page without preview image");
            return Ok(DetailMarker::Content);
        }
        Err(SweepError::NavigationTimeout { .. }) => {}
        Err(e) => return Err(e),
    }

    warn!("No detail markers found; falling back to a fixed settle delay");
    session
        .wait_for(&Condition::present("body"), timings.marker_timeout)
        .await?;
    session.settle(timings.fallback_settle).await;
    Ok(DetailMarker::Fallback)
}

/// Captures everything the extractor needs from the current detail page
pub async fn capture_detail<D: BrowserDriver>(session: &mut Session<D>) -> Result<DetailSnapshot> {
    let body_text = session.body_text().await?;
    let image_url = session
        .first(DETAIL_PREVIEW)
        .await?
        .and_then(|img| img.attr("src").map(str::to_string));
    let title_html = session
        .first(TITLE_BLOCK)
        .await?
        .and_then(|block| block_heading(&block.inner_html));
    let modality_text = session
        .query(DETAIL_BLOCK)
        .await?
        .into_iter()
        .nth(1)
        .map(|block| block.text);
    let discount_text = session
        .first(DISCOUNT_PARAGRAPH)
        .await?
        .map(|paragraph| paragraph.text);

    let mut countdown_html: [Option<String>; 4] = Default::default();
    for (slot, selector) in countdown_html.iter_mut().zip(COUNTDOWN_CELLS) {
        *slot = session.first(selector).await?.map(|cell| cell.inner_html);
    }

    Ok(DetailSnapshot {
        body_text,
        image_url,
        title_html,
        modality_text,
        discount_text,
        countdown_html,
    })
}

/// Inner HTML of the first heading of a block, if the block has one
fn block_heading(block_html: &str) -> Option<String> {
    Html::parse_fragment(block_html)
        .select(&HEADING)
        .next()
        .map(|heading| heading.inner_html())
}

/// Navigates back from a detail page and waits for the listing
///
/// # Arguments
///
/// * `session` - The page session
/// * `has_pagination` - Whether the listing renders a pagination control;
///   when it does, both the control and an item must be back
pub async fn return_to_listing<D: BrowserDriver>(
    session: &mut Session<D>,
    has_pagination: bool,
) -> Result<()> {
    let timings = *session.timings();
    session.go_back().await?;

    let listing = if has_pagination {
        Condition::All(vec![
            Condition::present(PAGINATION),
            Condition::at_least(LISTING_ITEM, 1),
        ])
    } else {
        Condition::at_least(LISTING_ITEM, 1)
    };
    session.wait_for(&listing, timings.selector_timeout).await
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
            marker_timeout: Duration::from_millis(15),
            fallback_settle: Duration::from_millis(1),
            poll_interval: Duration::from_millis(5),
            next_step_attempts: 1,
        }
    }

    async fn listing(items: Vec<MockItem>) -> Session<MockSite> {
        let site = MockSite::new(vec![MockRegion::new(
            "PR",
            "Paraná",
            vec![MockSubRegion::new("6143", "Curitiba").with_page(items)],
        )]);
        let mut session = Session::new(site, fast_timings(), "http://mock/");
        session.open_root().await.unwrap();
        let unit = SubRegionUnit::new("Paraná", "PR", "Curitiba", "6143");
        select_unit(&mut session, &unit).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_open_capture_and_return() {
        let mut session = listing(vec![
            MockItem::new("Casa A", "111"),
            MockItem::new("Casa B", "222"),
        ])
        .await;

        let marker = open_item(&mut session, 1).await.unwrap();
        assert_eq!(marker, DetailMarker::Preview);

        let snapshot = capture_detail(&mut session).await.unwrap();
        assert!(snapshot.body_text.contains("Número do imóvel: 222"));
        assert_eq!(snapshot.image_url.as_deref(), Some("/fotos/F22221.jpg"));
        assert!(snapshot.title_html.unwrap().contains("Casa B"));
        assert_eq!(
            snapshot.modality_text.as_deref(),
            Some("Leilão SFI - Edital Único")
        );
        assert!(snapshot.countdown_html[0].as_deref().unwrap().contains('2'));

        return_to_listing(&mut session, true).await.unwrap();
        assert_eq!(session.count(LISTING_ITEM).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_marker_fallback_chain() {
        let long_body = "Número do imóvel: 333\n".repeat(10);
        let mut session = listing(vec![
            MockItem::new("Sem marcadores", "333")
                .with_body(long_body)
                .without_markers(),
            MockItem::new("Vazio", "444")
                .with_body("curto")
                .without_markers()
                .with_countdown(None),
        ])
        .await;

        assert_eq!(open_item(&mut session, 0).await.unwrap(), DetailMarker::Content);
        return_to_listing(&mut session, true).await.unwrap();

        assert_eq!(open_item(&mut session, 1).await.unwrap(), DetailMarker::Fallback);
        let snapshot = capture_detail(&mut session).await.unwrap();
        assert_eq!(snapshot.image_url, None);
        assert_eq!(snapshot.title_html, None);
    }

    #[tokio::test]
    async fn test_title_comes_from_first_block_only() {
        let mut session = listing(vec![
            MockItem::new("Casa A", "111").with_notice("Imóvel em disputa judicial")
        ])
        .await;

        open_item(&mut session, 0).await.unwrap();
        let snapshot = capture_detail(&mut session).await.unwrap();
        assert_eq!(snapshot.title_html, None);
        assert!(snapshot.body_text.contains("Número do imóvel: 111"));
    }

    #[test]
    fn test_block_heading() {
        assert_eq!(
            block_heading("<h5>CASA <input type=\"hidden\"></h5><h5>Outra</h5>").as_deref(),
            Some("CASA <input type=\"hidden\">")
        );
        assert_eq!(block_heading("<p>Aviso</p>"), None);
    }

    #[tokio::test]
    async fn test_open_missing_item_fails() {
        let mut session = listing(vec![MockItem::new("Casa A", "111")]).await;
        let err = open_item(&mut session, 4).await.unwrap_err();
        assert!(matches!(err, SweepError::ElementNotFound { .. }));
    }
}
