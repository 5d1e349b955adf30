//! Ratesync engine: result store, page scraping, the action runner and effect execution.
mod clock;
mod driver;
mod page;
mod poll;
mod records;
mod runner;
mod scrape;
mod seams;
mod sim;
mod store;

pub use clock::Clock;
pub use driver::Driver;
pub use page::{PageError, RemotePage};
pub use poll::poll_until;
pub use records::{
    lookup, write_record, MarkerStatus, OutcomeRecord, ProcessingMarker, StoredRecord,
};
pub use runner::{classify, ActionRunner, PageRole, RunnerSettings, StageEnd};
pub use scrape::{
    external_id, has_element, is_rated, page_title, rating_star, scan_listing, watchlist_button,
    ScrapeError, WatchlistButton, RATING_CONTROL, RATING_SUBMIT, WATCHLIST_BUTTON,
    WATCHLIST_FALLBACK,
};
pub use seams::{Dialogs, Presenter, ScriptedDialogs, TabLauncher};
pub use sim::{SimBrowser, SimScript};
pub use store::{ensure_store_dir, JsonFileStore, MemoryStore, ResultStore, StoreError};
