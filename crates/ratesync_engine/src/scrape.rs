//! Reading the origin listing and detail pages and the remote title page.
//!
//! Every probe takes a full HTML snapshot. The runner re-reads the page on each poll, so the
//! functions here never hold on to a document.

use ratesync_core::{Listing, ListingItem, Rating, Score};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

const ITEM_CONTAINERS: [&str; 4] = [
    "#content .article .item",
    ".grid-view .item",
    ".list-view .item",
    "#content .item",
];
const TITLE_ANCHOR: &str = "li.title a, .info h2 a, .title a";
const RATING_SPAN: &str = "span[class*=\"rating\"]";
const PAGINATION: &str = ".paginator .thispage";
const INFO_LINKS: &str = "#info a";

pub const RATING_CONTROL: &str = "div[data-testid=\"hero-rating-bar__user-rating\"] button";
const RATING_BAR: &str = "div[data-testid=\"hero-rating-bar__user-rating\"]";
pub const RATING_SUBMIT: &str = ".ipc-starbar + button";
pub const WATCHLIST_BUTTON: &str = "button[data-testid=\"tm-box-wl-button\"]";
pub const WATCHLIST_FALLBACK: &str = "button[aria-label=\"Add to Watchlist\"]";
const WATCHLIST_TEXT: &str = "[data-testid=\"tm-box-wl-text\"]";
const DONE_ICON: &str = ".ipc-icon--done";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrapeError {
    #[error("invalid selector {0}")]
    Selector(String),
    #[error("invalid page url: {0}")]
    PageUrl(String),
}

fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|_| ScrapeError::Selector(css.to_string()))
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Selector of the star button for `score` in the rating popup.
pub fn rating_star(score: Score) -> String {
    format!("button[aria-label=\"Rate {}\"]", score.points())
}

/// Scans a listing page. Entries without a title anchor are skipped.
pub fn scan_listing(html: &str, page_url: &str) -> Result<Listing, ScrapeError> {
    let base = Url::parse(page_url).map_err(|err| ScrapeError::PageUrl(err.to_string()))?;
    let doc = Html::parse_document(html);
    let title_sel = selector(TITLE_ANCHOR)?;
    let em_sel = selector("em")?;
    let rating_sel = selector(RATING_SPAN)?;

    let mut items = Vec::new();
    for css in ITEM_CONTAINERS {
        let container = selector(css)?;
        let found: Vec<ElementRef> = doc.select(&container).collect();
        if found.is_empty() {
            continue;
        }
        for item in found {
            let Some(anchor) = item.select(&title_sel).next() else {
                continue;
            };
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Ok(url) = base.join(href) else {
                continue;
            };
            let title = anchor
                .select(&em_sel)
                .next()
                .map(text_of)
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| text_of(anchor));
            let rating = item
                .select(&rating_sel)
                .next()
                .and_then(|span| span.value().attr("class"))
                .and_then(rating_from_class)
                .unwrap_or_default();
            items.push(ListingItem {
                title,
                url: url.into(),
                rating,
            });
        }
        break;
    }

    let (current_page, total_pages) = pagination(&doc)?;
    Ok(Listing {
        page_url: page_url.to_string(),
        items,
        current_page,
        total_pages,
    })
}

/// `rating4-t` style class lists.
fn rating_from_class(classes: &str) -> Option<Rating> {
    classes.split_whitespace().find_map(|class| {
        let stars = class.strip_prefix("rating")?.strip_suffix("-t")?;
        Rating::new(stars.parse().ok()?).ok()
    })
}

fn pagination(doc: &Html) -> Result<(u32, u32), ScrapeError> {
    let Some(marker) = doc.select(&selector(PAGINATION)?).next() else {
        return Ok((1, 1));
    };
    let total = marker
        .value()
        .attr("data-total-page")
        .and_then(|value| value.trim().parse().ok())
        .filter(|total| *total > 0)
        .unwrap_or(1);
    let current = text_of(marker)
        .parse()
        .ok()
        .filter(|current| *current > 0)
        .unwrap_or(1);
    Ok((current, total.max(current)))
}

/// The remote title id (`tt…`) linked from a detail page's info block.
pub fn external_id(html: &str) -> Result<Option<String>, ScrapeError> {
    let doc = Html::parse_document(html);
    for anchor in doc.select(&selector(INFO_LINKS)?) {
        if let Some(href) = anchor.value().attr("href") {
            if href.contains("imdb.com/title/") {
                if let Some(id) = find_title_id(href) {
                    return Ok(Some(id));
                }
                continue;
            }
        }
        let text = text_of(anchor);
        if is_title_id(&text) {
            return Ok(Some(text));
        }
    }
    Ok(None)
}

fn is_title_id(text: &str) -> bool {
    text.strip_prefix("tt")
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

fn find_title_id(href: &str) -> Option<String> {
    href.match_indices("tt").find_map(|(at, _)| {
        let digits: String = href[at + 2..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        (!digits.is_empty()).then(|| format!("tt{digits}"))
    })
}

pub fn page_title(html: &str) -> Result<Option<String>, ScrapeError> {
    let doc = Html::parse_document(html);
    Ok(doc.select(&selector("title")?).next().map(text_of))
}

pub fn has_element(html: &str, css: &str) -> Result<bool, ScrapeError> {
    let doc = Html::parse_document(html);
    Ok(doc.select(&selector(css)?).next().is_some())
}

/// Watchlist control of a remote title page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchlistButton {
    /// Selector that found the button, to click it with.
    pub selector: &'static str,
    pub added: bool,
}

pub fn watchlist_button(html: &str) -> Result<Option<WatchlistButton>, ScrapeError> {
    let doc = Html::parse_document(html);
    let text_sel = selector(WATCHLIST_TEXT)?;
    let done_sel = selector(DONE_ICON)?;
    for css in [WATCHLIST_BUTTON, WATCHLIST_FALLBACK] {
        if let Some(button) = doc.select(&selector(css)?).next() {
            let pressed = button.value().attr("aria-pressed") == Some("true");
            let labelled = button
                .select(&text_sel)
                .any(|label| text_of(label).contains("In Watchlist"));
            let ticked = button.select(&done_sel).next().is_some();
            return Ok(Some(WatchlistButton {
                selector: css,
                added: pressed || labelled || ticked,
            }));
        }
    }
    Ok(None)
}

/// Whether the remote page shows `score` (or any rating) as the user's rating.
pub fn is_rated(html: &str, score: Score) -> Result<bool, ScrapeError> {
    let doc = Html::parse_document(html);
    let Some(bar) = doc.select(&selector(RATING_BAR)?).next() else {
        return Ok(false);
    };
    if bar.select(&selector(".ipc-starbar")?).next().is_some() {
        return Ok(true);
    }
    let Some(button) = bar.select(&selector("button")?).next() else {
        return Ok(false);
    };
    let caption = text_of(button);
    Ok(caption.contains(&score.points().to_string()) || !caption.contains("Rate"))
}
