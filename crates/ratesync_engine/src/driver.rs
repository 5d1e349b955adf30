use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ratesync_core::{
    update, AppState, Effect, Listing, Msg, PageObservation, SyncSettings, SyncTarget,
};
use ratesync_logging::{set_tick, sync_debug, sync_info, sync_warn};
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::clock::Clock;
use crate::page::PageError;
use crate::records;
use crate::seams::{Dialogs, Presenter, TabLauncher};
use crate::store::ResultStore;

/// Runs one listing page: feeds messages through [`update`], executes the effects it returns
/// and ticks the check loop.
pub struct Driver {
    state: AppState,
    launcher: Arc<dyn TabLauncher>,
    dialogs: Arc<dyn Dialogs>,
    presenter: Arc<dyn Presenter>,
    store: Arc<dyn ResultStore>,
    clock: Clock,
    ticks: u64,
}

impl Driver {
    pub fn new(
        settings: SyncSettings,
        launcher: Arc<dyn TabLauncher>,
        dialogs: Arc<dyn Dialogs>,
        presenter: Arc<dyn Presenter>,
        store: Arc<dyn ResultStore>,
        clock: Clock,
    ) -> Self {
        Self {
            state: AppState::with_settings(settings),
            launcher,
            dialogs,
            presenter,
            store,
            clock,
            ticks: 0,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn into_state(self) -> AppState {
        self.state
    }

    /// Loads the scanned listing; a continuation page also schedules its own batch.
    pub async fn open_listing(&mut self, listing: Listing, auto_sync: Option<SyncTarget>) {
        self.dispatch(Msg::Tick {
            now_ms: self.clock.now_ms(),
        })
        .await;
        sync_info!(
            "listing page {}/{} with {} titles",
            listing.current_page,
            listing.total_pages,
            listing.items.len()
        );
        self.dispatch(Msg::ListingLoaded(listing)).await;
        if let Some(target) = auto_sync {
            self.dispatch(Msg::AutoSyncRequested { target }).await;
        }
    }

    /// Applies `msg` and everything that follows from it before returning.
    pub async fn dispatch(&mut self, msg: Msg) {
        let mut queue = VecDeque::from([msg]);
        while let Some(msg) = queue.pop_front() {
            let (mut next, effects) = update(std::mem::take(&mut self.state), msg);
            if next.consume_dirty() {
                self.presenter.render(&next.view());
            }
            self.state = next;
            for effect in effects {
                if let Some(reply) = self.execute(effect).await {
                    queue.push_back(reply);
                }
            }
        }
    }

    pub async fn tick(&mut self) {
        self.ticks += 1;
        set_tick(self.ticks);
        self.dispatch(Msg::Tick {
            now_ms: self.clock.now_ms(),
        })
        .await;
    }

    /// Ticks until no batch, dialog or continuation is outstanding.
    pub async fn run_until_idle(&mut self) {
        let (_, controls) = mpsc::unbounded_channel();
        self.run_with_controls(controls).await;
    }

    /// Like [`Driver::run_until_idle`], applying panel controls (`PauseToggled`,
    /// `PanelClosed`) received since the previous tick before each tick.
    pub async fn run_with_controls(&mut self, mut controls: mpsc::UnboundedReceiver<Msg>) {
        let period = Duration::from_millis(self.state.settings().tick_interval_ms.max(1));
        while !self.state.is_idle() {
            sleep(period).await;
            while let Ok(msg) = controls.try_recv() {
                sync_info!("panel control: {msg:?}");
                self.dispatch(msg).await;
            }
            self.tick().await;
        }
        sync_debug!("listing page idle after {} ticks", self.ticks);
    }

    /// Ticks `count` times regardless of state.
    pub async fn run_ticks(&mut self, count: u64) {
        let period = Duration::from_millis(self.state.settings().tick_interval_ms.max(1));
        for _ in 0..count {
            sleep(period).await;
            self.tick().await;
        }
    }

    async fn execute(&self, effect: Effect) -> Option<Msg> {
        match effect {
            Effect::PromptTarget => Some(Msg::TargetChosen(self.dialogs.choose_target().await)),
            Effect::Confirm { title, message } => Some(Msg::ConfirmAnswered(
                self.dialogs.confirm(&title, &message).await,
            )),
            Effect::OpenTab {
                batch_id,
                index,
                url,
            } => {
                let tab = self.launcher.open(&url).await;
                match tab {
                    Some(tab) => sync_debug!("{batch_id}#{index} opened as tab {tab}: {url}"),
                    None => sync_warn!("{batch_id}#{index} blocked: {url}"),
                }
                Some(Msg::TabOpened {
                    batch_id,
                    index,
                    tab,
                })
            }
            Effect::PollTab {
                batch_id,
                index,
                tab,
                key,
            } => {
                if !self.launcher.is_closed(tab).await {
                    return None;
                }
                let lookup = records::lookup(self.store.as_ref(), &key);
                sync_debug!("{batch_id}#{index} tab {tab} closed, found {lookup:?}");
                Some(Msg::TabClosed {
                    batch_id,
                    index,
                    lookup,
                })
            }
            Effect::DeleteRecord { key } => {
                if let Err(err) = self.store.delete(&key) {
                    sync_warn!("could not delete {key}: {err}");
                }
                None
            }
            Effect::Notify { level, text } => {
                self.presenter.notify(level, &text);
                None
            }
            Effect::OpenPage { page, url } => {
                sync_info!("opening listing page {page}: {url}");
                Some(Msg::PageOpened {
                    page,
                    tab: self.launcher.open(&url).await,
                })
            }
            Effect::PollPage { page, tab } => {
                let observation = match self.launcher.title(tab).await {
                    Ok(title) => PageObservation::Title(title),
                    Err(PageError::Closed) => PageObservation::Closed,
                    Err(err) => {
                        sync_debug!("title of page {page} unreadable: {err}");
                        PageObservation::Unreadable
                    }
                };
                Some(Msg::PageObserved { page, observation })
            }
            Effect::ClosePage { tab } => {
                self.launcher.close(tab).await;
                None
            }
            Effect::MarkPageComplete => {
                self.presenter.mark_page_complete();
                None
            }
        }
    }
}
