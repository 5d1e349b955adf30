//! In-process stand-in for a browser: tabs, the origin detail pages and the remote title pages.
//!
//! Opened detail tabs run the real [`ActionRunner`] against generated pages, and continuation
//! listing tabs run a child [`Driver`], so a whole sync can be exercised without a browser.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ratesync_core::protocol::{subject_id, COMPLETION_TITLE_MARKER};
use ratesync_core::{AppViewModel, Listing, NoticeLevel, SyncSettings, SyncTarget, TabId};
use ratesync_logging::{sync_debug, sync_info, sync_warn};
use url::Url;

use crate::clock::Clock;
use crate::driver::Driver;
use crate::page::{PageError, RemotePage};
use crate::runner::{classify, ActionRunner, PageRole, RunnerSettings};
use crate::scrape::{self, RATING_CONTROL, RATING_SUBMIT, WATCHLIST_BUTTON, WATCHLIST_FALLBACK};
use crate::seams::{Presenter, ScriptedDialogs, TabLauncher};
use crate::store::ResultStore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How the simulated sites misbehave, keyed by origin subject id.
#[derive(Debug, Clone, Default)]
pub struct SimScript {
    /// Opening the detail tab is refused, as a popup blocker would.
    pub blocked: HashSet<String>,
    /// The detail page links no remote title.
    pub missing_id: HashSet<String>,
    /// The remote page never shows its rating or watchlist control.
    pub missing_control: HashSet<String>,
    /// The title is already on the remote watchlist.
    pub already_added: HashSet<String>,
    /// Listing page HTML by page number, served to continuation tabs.
    pub listing_pages: BTreeMap<u32, String>,
}

#[derive(Debug, Default)]
struct RemoteWidgets {
    control_present: bool,
    rating_open: bool,
    star: Option<u8>,
    rated: Option<u8>,
    in_watchlist: bool,
}

#[derive(Debug)]
struct TabState {
    url: String,
    title: String,
    closed: bool,
    remote: RemoteWidgets,
}

#[derive(Debug)]
struct SimTab {
    id: TabId,
    state: Mutex<TabState>,
}

struct SimInner {
    script: SimScript,
    store: Arc<dyn ResultStore>,
    sync_settings: SyncSettings,
    runner_settings: RunnerSettings,
    clock: Clock,
    next_tab: AtomicU64,
    tabs: Mutex<HashMap<TabId, Arc<SimTab>>>,
    history: Mutex<Vec<String>>,
}

/// Cloning shares the same set of tabs.
#[derive(Clone)]
pub struct SimBrowser {
    inner: Arc<SimInner>,
}

impl SimBrowser {
    pub fn new(
        script: SimScript,
        store: Arc<dyn ResultStore>,
        sync_settings: SyncSettings,
        runner_settings: RunnerSettings,
        clock: Clock,
    ) -> Self {
        Self {
            inner: Arc::new(SimInner {
                script,
                store,
                sync_settings,
                runner_settings,
                clock,
                next_tab: AtomicU64::new(1),
                tabs: Mutex::new(HashMap::new()),
                history: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Every URL a tab was requested for, blocked ones included.
    pub fn opened_urls(&self) -> Vec<String> {
        lock(&self.inner.history).clone()
    }

    pub fn open_tab_count(&self) -> usize {
        lock(&self.inner.tabs)
            .values()
            .filter(|tab| !lock(&tab.state).closed)
            .count()
    }

    fn tab(&self, id: TabId) -> Option<Arc<SimTab>> {
        lock(&self.inner.tabs).get(&id).cloned()
    }

    fn listing_html(&self, page: u32) -> String {
        self.inner
            .script
            .listing_pages
            .get(&page)
            .cloned()
            .unwrap_or_else(|| "<html><body><div id=\"content\"></div></body></html>".to_string())
    }

    fn start_child_page(&self, tab: Arc<SimTab>, url: &str, target: SyncTarget) {
        let page = listing_page_number(url, self.inner.sync_settings.movies_per_page);
        let listing = match scrape::scan_listing(&self.listing_html(page), url) {
            Ok(listing) => listing,
            Err(err) => {
                sync_warn!("continuation page {page} unreadable: {err}");
                Listing::default()
            }
        };
        let mut driver = Driver::new(
            self.inner.sync_settings.clone(),
            Arc::new(self.clone()),
            Arc::new(ScriptedDialogs {
                target: None,
                confirm: false,
            }),
            Arc::new(TabTitlePresenter { tab }),
            self.inner.store.clone(),
            self.inner.clock,
        );
        tokio::spawn(async move {
            driver.open_listing(listing, Some(target)).await;
            driver.run_until_idle().await;
        });
    }

    fn start_runner(&self, tab: Arc<SimTab>) {
        let runner = ActionRunner::new(
            self.inner.runner_settings.clone(),
            self.inner.store.clone(),
            self.inner.clock,
        );
        let page = SimPage {
            tab,
            sim: Arc::clone(&self.inner),
        };
        tokio::spawn(async move {
            let end = runner.drive(&page).await;
            sync_debug!("tab {} finished: {end:?}", page.tab.id);
        });
    }
}

#[async_trait::async_trait]
impl TabLauncher for SimBrowser {
    async fn open(&self, url: &str) -> Option<TabId> {
        lock(&self.inner.history).push(url.to_string());
        let role = classify(url);
        if let PageRole::Detail { source_id, .. } = &role {
            if self.inner.script.blocked.contains(source_id) {
                return None;
            }
        }
        let id = self.inner.next_tab.fetch_add(1, Ordering::Relaxed);
        let tab = Arc::new(SimTab {
            id,
            state: Mutex::new(TabState {
                url: url.to_string(),
                title: title_for(url),
                closed: false,
                remote: RemoteWidgets::default(),
            }),
        });
        lock(&self.inner.tabs).insert(id, tab.clone());
        match role {
            PageRole::Detail { .. } => self.start_runner(tab),
            PageRole::Listing {
                auto_sync: Some(target),
            } => self.start_child_page(tab, url, target),
            _ => {}
        }
        Some(id)
    }

    async fn is_closed(&self, tab: TabId) -> bool {
        self.tab(tab).is_none_or(|tab| lock(&tab.state).closed)
    }

    async fn title(&self, tab: TabId) -> Result<String, PageError> {
        let tab = self.tab(tab).ok_or(PageError::Closed)?;
        let state = lock(&tab.state);
        if state.closed {
            return Err(PageError::Closed);
        }
        Ok(state.title.clone())
    }

    async fn close(&self, tab: TabId) {
        if let Some(tab) = self.tab(tab) {
            lock(&tab.state).closed = true;
        }
    }
}

/// A continuation tab reports completion through its title.
struct TabTitlePresenter {
    tab: Arc<SimTab>,
}

impl Presenter for TabTitlePresenter {
    fn notify(&self, level: NoticeLevel, text: &str) {
        sync_info!("tab {} {level:?}: {text}", self.tab.id);
    }

    fn render(&self, _view: &AppViewModel) {}

    fn mark_page_complete(&self) {
        let mut state = lock(&self.tab.state);
        if !state.title.starts_with(COMPLETION_TITLE_MARKER) {
            state.title = format!("{COMPLETION_TITLE_MARKER}{}", state.title);
        }
    }
}

struct SimPage {
    tab: Arc<SimTab>,
    sim: Arc<SimInner>,
}

impl SimPage {
    fn enter(&self, state: &mut TabState, url: &str) {
        let script = &self.sim.script;
        state.url = url.to_string();
        state.title = title_for(url);
        state.remote = match classify(url) {
            PageRole::Remote(handoff) => RemoteWidgets {
                control_present: !script.missing_control.contains(&handoff.source_id),
                in_watchlist: script.already_added.contains(&handoff.source_id),
                ..RemoteWidgets::default()
            },
            _ => RemoteWidgets::default(),
        };
    }
}

#[async_trait::async_trait]
impl RemotePage for SimPage {
    fn url(&self) -> String {
        lock(&self.tab.state).url.clone()
    }

    async fn html(&self) -> Result<String, PageError> {
        let state = lock(&self.tab.state);
        if state.closed {
            return Err(PageError::Closed);
        }
        Ok(render(&state, &self.sim.script))
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        let mut state = lock(&self.tab.state);
        if state.closed {
            return Err(PageError::Closed);
        }
        let widgets = &mut state.remote;
        let not_found = || PageError::ElementNotFound(selector.to_string());
        if !widgets.control_present {
            return Err(not_found());
        }
        match selector {
            RATING_CONTROL => widgets.rating_open = true,
            RATING_SUBMIT if widgets.rating_open && widgets.star.is_some() => {
                widgets.rated = widgets.star;
                widgets.rating_open = false;
            }
            WATCHLIST_BUTTON | WATCHLIST_FALLBACK => widgets.in_watchlist = true,
            _ => {
                let star = selector
                    .strip_prefix("button[aria-label=\"Rate ")
                    .and_then(|rest| rest.strip_suffix("\"]"))
                    .and_then(|points| points.parse().ok())
                    .filter(|_| widgets.rating_open)
                    .ok_or_else(not_found)?;
                widgets.star = Some(star);
            }
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let mut state = lock(&self.tab.state);
        if state.closed {
            return Err(PageError::Closed);
        }
        self.enter(&mut state, url);
        Ok(())
    }

    async fn close(&self) {
        lock(&self.tab.state).closed = true;
    }
}

fn listing_page_number(url: &str, per_page: u32) -> u32 {
    let start = Url::parse(url)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "start")
                .and_then(|(_, value)| value.parse::<u32>().ok())
        })
        .unwrap_or(0);
    start / per_page.max(1) + 1
}

fn title_for(url: &str) -> String {
    match classify(url) {
        PageRole::Listing { .. } => "Listing".to_string(),
        PageRole::Remote(handoff) => format!("Remote title {}", handoff.source_id),
        _ => Url::parse(url)
            .ok()
            .and_then(|url| subject_id(&url))
            .map_or_else(|| "Page".to_string(), |id| format!("Subject {id}")),
    }
}

fn render(state: &TabState, script: &SimScript) -> String {
    match classify(&state.url) {
        PageRole::Remote(_) => render_remote(&state.title, &state.remote),
        _ => {
            let id = Url::parse(&state.url)
                .ok()
                .and_then(|url| subject_id(&url))
                .unwrap_or_default();
            render_subject(&state.title, &id, script.missing_id.contains(&id))
        }
    }
}

fn render_subject(title: &str, id: &str, missing_id: bool) -> String {
    let info = if missing_id {
        "<span class=\"pl\">Language:</span> English".to_string()
    } else {
        format!(
            "<span class=\"pl\">IMDb:</span> <a href=\"https://www.imdb.com/title/tt{id}/\">tt{id}</a>"
        )
    };
    format!(
        "<html><head><title>{title}</title></head><body><div id=\"info\">{info}</div></body></html>"
    )
}

fn render_remote(title: &str, widgets: &RemoteWidgets) -> String {
    if !widgets.control_present {
        return format!(
            "<html><head><title>{title}</title></head><body><h1>{title}</h1></body></html>"
        );
    }
    let caption = widgets
        .rated
        .map_or_else(|| "Rate".to_string(), |points| format!("{points}/10"));
    let popup = if widgets.rating_open {
        let stars: String = (1..=10)
            .map(|points| format!("<button aria-label=\"Rate {points}\">{points}</button>"))
            .collect();
        format!(
            "<div class=\"ipc-promptable-base__panel\"><div class=\"ipc-starbar\">{stars}</div><button class=\"ipc-rating-prompt__rate-button\">Rate</button></div>"
        )
    } else {
        String::new()
    };
    let (pressed, label) = if widgets.in_watchlist {
        ("true", "In Watchlist")
    } else {
        ("false", "Watchlist")
    };
    format!(
        "<html><head><title>{title}</title></head><body>\
         <div data-testid=\"hero-rating-bar__user-rating\"><button>{caption}</button></div>{popup}\
         <button data-testid=\"tm-box-wl-button\" aria-pressed=\"{pressed}\"><span data-testid=\"tm-box-wl-text\">{label}</span></button>\
         </body></html>"
    )
}
