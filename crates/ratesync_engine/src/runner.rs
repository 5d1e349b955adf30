//! What a browsing context does on its own once it is opened with one of the protocol URLs.
//!
//! A work item passes through three pages in the same tab: the origin detail page (scrape
//! the remote id, hand off), the remote title page (perform the action) and the origin detail
//! page again (record the outcome, close). Each stage only learns what to do from its URL.

use std::sync::Arc;
use std::time::Duration;

use ratesync_core::protocol::{parse_auto_sync, subject_id, SYNC_FRAGMENT_PREFIX};
use ratesync_core::{HandoffFragment, OutcomeTag, ReturnTrip, Score, SyncFragment, SyncTarget};
use ratesync_logging::{sync_debug, sync_info, sync_warn};
use tokio::time::sleep;
use url::Url;

use crate::clock::Clock;
use crate::page::{PageError, RemotePage};
use crate::poll::poll_until;
use crate::records::{write_record, StoredRecord};
use crate::scrape::{self, RATING_CONTROL, RATING_SUBMIT};
use crate::store::ResultStore;

const ORIGIN_DOMAIN: &str = "douban.com";
const REMOTE_DOMAIN: &str = "imdb.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    pub poll_interval: Duration,
    /// How long the remote rating control may take to appear.
    pub rating_control_wait: Duration,
    pub rating_select_wait: Duration,
    pub rating_submit_wait: Duration,
    /// Cap on waiting for the remote page to show the action took effect.
    pub confirm_cap: Duration,
    pub watch_control_wait: Duration,
    /// Pause between writing a record and closing, so the opener's read lands after the write.
    pub close_grace: Duration,
    pub handoff_delay: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            rating_control_wait: Duration::from_secs(6),
            rating_select_wait: Duration::from_secs(7),
            rating_submit_wait: Duration::from_secs(8),
            confirm_cap: Duration::from_secs(15),
            watch_control_wait: Duration::from_secs(10),
            close_grace: Duration::from_secs(2),
            handoff_delay: Duration::from_secs(1),
        }
    }
}

/// What kind of protocol page a URL is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRole {
    /// An origin listing page; `auto_sync` is set on continuation pages.
    Listing { auto_sync: Option<SyncTarget> },
    Detail {
        fragment: SyncFragment,
        source_id: String,
    },
    Remote(HandoffFragment),
    ReturnTrip(ReturnTrip),
    Unrelated,
}

pub fn classify(raw: &str) -> PageRole {
    let Ok(url) = Url::parse(raw) else {
        return PageRole::Unrelated;
    };
    let domain = url.domain().unwrap_or_default();
    let fragment = url.fragment().unwrap_or_default();

    if domain.ends_with(REMOTE_DOMAIN) {
        if !url.path().starts_with("/title/") || fragment.is_empty() {
            return PageRole::Unrelated;
        }
        return match HandoffFragment::decode(fragment) {
            Ok(handoff) => PageRole::Remote(handoff),
            Err(err) => {
                sync_debug!("remote page without usable handoff ({err}): {raw}");
                PageRole::Unrelated
            }
        };
    }
    if !domain.ends_with(ORIGIN_DOMAIN) {
        return PageRole::Unrelated;
    }
    if let Ok(trip) = ReturnTrip::parse(raw) {
        return PageRole::ReturnTrip(trip);
    }
    match subject_id(&url) {
        Some(source_id) if fragment.starts_with(SYNC_FRAGMENT_PREFIX) => {
            match SyncFragment::decode(fragment) {
                Ok(fragment) => PageRole::Detail {
                    fragment,
                    source_id,
                },
                Err(err) => {
                    sync_warn!("ignoring malformed sync fragment ({err}): {raw}");
                    PageRole::Unrelated
                }
            }
        }
        Some(_) => PageRole::Unrelated,
        None => PageRole::Listing {
            auto_sync: parse_auto_sync(fragment),
        },
    }
}

/// How a stage left its tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEnd {
    /// The tab now shows `url`; the next stage runs there.
    Navigated(String),
    Closed,
    /// Nothing more to do on this page; the tab stays open.
    Finished,
}

pub struct ActionRunner {
    settings: RunnerSettings,
    store: Arc<dyn ResultStore>,
    clock: Clock,
}

impl ActionRunner {
    pub fn new(settings: RunnerSettings, store: Arc<dyn ResultStore>, clock: Clock) -> Self {
        Self {
            settings,
            store,
            clock,
        }
    }

    /// Runs stages until the tab closes or settles, following its own navigations.
    pub async fn drive(&self, page: &dyn RemotePage) -> StageEnd {
        loop {
            match self.run(page).await {
                StageEnd::Navigated(url) => sync_debug!("tab navigated to {url}"),
                end => return end,
            }
        }
    }

    /// Runs the one stage the page's URL calls for.
    pub async fn run(&self, page: &dyn RemotePage) -> StageEnd {
        match classify(&page.url()) {
            PageRole::Detail {
                fragment,
                source_id,
            } => self.detail_stage(page, fragment, &source_id).await,
            PageRole::Remote(handoff) => self.remote_stage(page, &handoff).await,
            PageRole::ReturnTrip(trip) => self.return_stage(page, &trip).await,
            PageRole::Listing { .. } | PageRole::Unrelated => StageEnd::Finished,
        }
    }

    async fn detail_stage(
        &self,
        page: &dyn RemotePage,
        fragment: SyncFragment,
        source_id: &str,
    ) -> StageEnd {
        let Some(batch) = fragment.batch.clone() else {
            sync_warn!("sync fragment on subject {source_id} carries no batch reference");
            return StageEnd::Finished;
        };
        let key = batch.result_key();
        let html = match page.html().await {
            Ok(html) => html,
            Err(PageError::Closed) => return StageEnd::Closed,
            Err(err) => {
                sync_warn!("cannot read subject {source_id}: {err}");
                return StageEnd::Finished;
            }
        };
        let external = scrape::external_id(&html).unwrap_or_else(|err| {
            sync_warn!("remote id lookup failed on subject {source_id}: {err}");
            None
        });

        let Some(external) = external else {
            sync_info!("subject {source_id} has no remote id");
            self.write(&key, &StoredRecord::outcome(&OutcomeTag::NoImdbId, self.clock.now_ms()));
            sleep(self.settings.close_grace).await;
            page.close().await;
            return StageEnd::Closed;
        };

        self.write(
            &key,
            &StoredRecord::processing(source_id, &external, self.clock.now_ms()),
        );
        sleep(self.settings.handoff_delay).await;
        let handoff = HandoffFragment {
            score: fragment.rating.score(),
            target: fragment.target,
            batch,
            source_id: source_id.to_string(),
        };
        sync_info!("subject {source_id} -> {external} ({})", fragment.target);
        self.navigate(page, handoff.remote_url(&external)).await
    }

    async fn remote_stage(&self, page: &dyn RemotePage, handoff: &HandoffFragment) -> StageEnd {
        let outcome = match handoff.target {
            SyncTarget::Rating => self.rate(page, handoff.score).await,
            SyncTarget::Watchlist => self.add_to_watchlist(page).await,
        };
        let outcome = match outcome {
            Ok(tag) => tag,
            Err(PageError::Closed) => return StageEnd::Closed,
            Err(err) => {
                sync_warn!("remote action failed: {err}");
                OutcomeTag::FailedNoButton
            }
        };
        sync_info!(
            "{} for subject {}: {outcome}",
            handoff.target,
            handoff.source_id
        );
        match ReturnTrip::from_handoff(handoff, outcome).url() {
            Ok(url) => self.navigate(page, url).await,
            Err(err) => {
                sync_warn!("cannot build return trip: {err}");
                StageEnd::Finished
            }
        }
    }

    async fn return_stage(&self, page: &dyn RemotePage, trip: &ReturnTrip) -> StageEnd {
        let key = trip.batch.result_key();
        self.write(&key, &StoredRecord::outcome(&trip.outcome, self.clock.now_ms()));
        sync_debug!("recorded {} under {key}", trip.outcome);
        sleep(self.settings.close_grace).await;
        page.close().await;
        StageEnd::Closed
    }

    async fn rate(&self, page: &dyn RemotePage, score: Score) -> Result<OutcomeTag, PageError> {
        let settings = &self.settings;
        if !self
            .wait_for(page, RATING_CONTROL, settings.rating_control_wait)
            .await?
        {
            return Ok(OutcomeTag::FailedNoButton);
        }
        page.click(RATING_CONTROL).await?;

        let star = scrape::rating_star(score);
        if !self
            .wait_for(page, &star, settings.rating_select_wait)
            .await?
        {
            return Ok(OutcomeTag::FailedNoButton);
        }
        page.click(&star).await?;

        if !self
            .wait_for(page, RATING_SUBMIT, settings.rating_submit_wait)
            .await?
        {
            return Ok(OutcomeTag::FailedNoButton);
        }
        page.click(RATING_SUBMIT).await?;

        let rated = self
            .poll_page(page, settings.confirm_cap, |html| {
                scrape::is_rated(html, score).ok().filter(|rated| *rated)
            })
            .await?;
        Ok(if rated.is_some() {
            OutcomeTag::Success
        } else {
            OutcomeTag::FailedTimeout
        })
    }

    async fn add_to_watchlist(&self, page: &dyn RemotePage) -> Result<OutcomeTag, PageError> {
        let settings = &self.settings;
        let button = self
            .poll_page(page, settings.watch_control_wait, |html| {
                scrape::watchlist_button(html).ok().flatten()
            })
            .await?;
        let Some(button) = button else {
            return Ok(OutcomeTag::FailedNoButton);
        };
        if button.added {
            return Ok(OutcomeTag::AlreadyInList);
        }
        page.click(button.selector).await?;

        let added = self
            .poll_page(page, settings.confirm_cap, |html| {
                scrape::watchlist_button(html)
                    .ok()
                    .flatten()
                    .filter(|button| button.added)
            })
            .await?;
        Ok(if added.is_some() {
            OutcomeTag::Success
        } else {
            OutcomeTag::FailedTimeout
        })
    }

    async fn wait_for(
        &self,
        page: &dyn RemotePage,
        css: &str,
        cap: Duration,
    ) -> Result<bool, PageError> {
        let found = self
            .poll_page(page, cap, |html| {
                scrape::has_element(html, css).ok().filter(|found| *found)
            })
            .await?;
        Ok(found.is_some())
    }

    /// Re-reads the page until `check` accepts it. A closed page ends the wait with an error.
    async fn poll_page<T, F>(
        &self,
        page: &dyn RemotePage,
        cap: Duration,
        check: F,
    ) -> Result<Option<T>, PageError>
    where
        T: Send,
        F: Fn(&str) -> Option<T> + Sync,
    {
        let check = &check;
        let found = poll_until(self.settings.poll_interval, cap, || async move {
            match page.html().await {
                Ok(html) => check(&html).map(Ok),
                Err(PageError::Closed) => Some(Err(PageError::Closed)),
                Err(_) => None,
            }
        })
        .await;
        found.transpose()
    }

    fn write(&self, key: &str, record: &StoredRecord) {
        if let Err(err) = write_record(self.store.as_ref(), key, record) {
            sync_warn!("result store write failed for {key}: {err}");
        }
    }

    async fn navigate(&self, page: &dyn RemotePage, url: String) -> StageEnd {
        match page.navigate(&url).await {
            Ok(()) => StageEnd::Navigated(url),
            Err(PageError::Closed) => StageEnd::Closed,
            Err(err) => {
                sync_warn!("navigation to {url} failed: {err}");
                StageEnd::Finished
            }
        }
    }
}
