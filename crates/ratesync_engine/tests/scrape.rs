use pretty_assertions::assert_eq;
use ratesync_core::{ListingItem, Rating, Score};
use ratesync_engine::{
    external_id, has_element, is_rated, rating_star, scan_listing, watchlist_button,
    ScrapeError, RATING_CONTROL, WATCHLIST_BUTTON, WATCHLIST_FALLBACK,
};

const LISTING_URL: &str = "https://movie.douban.com/people/someone/collect?start=15";

const GRID_LISTING: &str = r#"
<html><body><div id="content"><div class="article">
  <div class="item">
    <div class="info"><ul>
      <li class="title"><a href="https://movie.douban.com/subject/1292052/"><em>The Shawshank Redemption</em> / x</a></li>
      <li><span class="rating5-t"></span><span class="date">2024-01-01</span></li>
    </ul></div>
  </div>
  <div class="item">
    <div class="info"><ul>
      <li class="title"><a href="/subject/1291546/">Farewell My Concubine</a></li>
      <li><span class="date rating2-t"></span></li>
    </ul></div>
  </div>
  <div class="item"><div class="info">no anchor here</div></div>
  <div class="item">
    <div class="info"><ul><li class="title"><a href="https://movie.douban.com/subject/1295644/"><em>Leon</em></a></li></ul></div>
  </div>
</div></div>
<div class="paginator"><span class="thispage" data-total-page="7">2</span></div>
</body></html>
"#;

#[test]
fn grid_listing_is_scanned_in_page_order() {
    let listing = scan_listing(GRID_LISTING, LISTING_URL).unwrap();
    assert_eq!(
        listing.items,
        vec![
            ListingItem {
                title: "The Shawshank Redemption".into(),
                url: "https://movie.douban.com/subject/1292052/".into(),
                rating: Rating::new(5).unwrap(),
            },
            ListingItem {
                title: "Farewell My Concubine".into(),
                url: "https://movie.douban.com/subject/1291546/".into(),
                rating: Rating::new(2).unwrap(),
            },
            ListingItem {
                title: "Leon".into(),
                url: "https://movie.douban.com/subject/1295644/".into(),
                rating: Rating::DEFAULT,
            },
        ]
    );
    assert_eq!(listing.current_page, 2);
    assert_eq!(listing.total_pages, 7);
    assert_eq!(listing.page_url, LISTING_URL);
}

#[test]
fn list_view_is_used_when_grid_is_absent() {
    let html = r#"<div class="list-view"><div class="item">
        <div class="title"><a href="/subject/3541415/">Inception</a></div>
        <span class="rating4-t"></span>
    </div></div>"#;
    let listing = scan_listing(html, LISTING_URL).unwrap();
    assert_eq!(listing.items.len(), 1);
    assert_eq!(listing.items[0].title, "Inception");
    assert_eq!(listing.items[0].rating, Rating::new(4).unwrap());
    assert_eq!((listing.current_page, listing.total_pages), (1, 1));
}

#[test]
fn empty_listing_has_one_page() {
    let listing = scan_listing("<html><body></body></html>", LISTING_URL).unwrap();
    assert!(listing.items.is_empty());
    assert_eq!((listing.current_page, listing.total_pages), (1, 1));
}

#[test]
fn unparseable_page_url_is_rejected() {
    assert!(matches!(
        scan_listing(GRID_LISTING, "not a url"),
        Err(ScrapeError::PageUrl(_))
    ));
}

#[test]
fn external_id_from_link_or_text() {
    let linked = r#"<div id="info"><a href="https://www.douban.com/x">x</a>
        <a href="https://www.imdb.com/title/tt0111161/">link</a></div>"#;
    assert_eq!(external_id(linked).unwrap().as_deref(), Some("tt0111161"));

    let plain = r#"<div id="info"><span>IMDb:</span> <a>tt0110413</a></div>"#;
    assert_eq!(external_id(plain).unwrap().as_deref(), Some("tt0110413"));

    let missing = r#"<div id="info"><a href="/celebrity/1/">Frank Darabont</a></div>"#;
    assert_eq!(external_id(missing).unwrap(), None);
}

#[test]
fn watchlist_button_states() {
    let fresh = r#"<button data-testid="tm-box-wl-button" aria-pressed="false">
        <span data-testid="tm-box-wl-text">Watchlist</span></button>"#;
    assert_eq!(
        watchlist_button(fresh).unwrap().map(|b| (b.selector, b.added)),
        Some((WATCHLIST_BUTTON, false))
    );

    let added = r#"<button data-testid="tm-box-wl-button">
        <span data-testid="tm-box-wl-text">In Watchlist</span></button>"#;
    assert!(watchlist_button(added).unwrap().unwrap().added);

    let ticked = r#"<button aria-label="Add to Watchlist"><svg class="ipc-icon ipc-icon--done"></svg></button>"#;
    assert_eq!(
        watchlist_button(ticked).unwrap().map(|b| (b.selector, b.added)),
        Some((WATCHLIST_FALLBACK, true))
    );

    assert_eq!(watchlist_button("<button>Other</button>").unwrap(), None);
}

#[test]
fn rating_bar_states() {
    let score = Score::new(8).unwrap();
    let unrated = r#"<div data-testid="hero-rating-bar__user-rating"><button>Rate</button></div>"#;
    assert!(has_element(unrated, RATING_CONTROL).unwrap());
    assert!(!is_rated(unrated, score).unwrap());

    let rated = r#"<div data-testid="hero-rating-bar__user-rating"><button>8/10</button></div>"#;
    assert!(is_rated(rated, score).unwrap());

    assert!(!is_rated("<div></div>", score).unwrap());
    assert_eq!(rating_star(score), "button[aria-label=\"Rate 8\"]");
}
