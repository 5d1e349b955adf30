use std::collections::BTreeMap;

use crate::batch::{Batch, ItemStatus, TabId};
use crate::pages::Continuation;
use crate::protocol::{BatchId, Rating, SyncTarget};
use crate::settings::SyncSettings;
use crate::view_model::{AppViewModel, EntryRowView};

/// One title as scraped from a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub title: String,
    /// Absolute URL of the title's detail page.
    pub url: String,
    pub rating: Rating,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub page_url: String,
    pub items: Vec<ListingItem>,
    pub current_page: u32,
    pub total_pages: u32,
}

impl Default for Listing {
    fn default() -> Self {
        Self {
            page_url: String::new(),
            items: Vec::new(),
            current_page: 1,
            total_pages: 1,
        }
    }
}

/// State of the inline control next to a listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryStatus {
    #[default]
    Idle,
    Syncing,
    Synced,
    Failed,
    Blocked,
}

impl EntryStatus {
    pub fn caption(self, rating: Rating) -> String {
        match self {
            EntryStatus::Idle => format!("sync({}★)", rating.stars()),
            EntryStatus::Syncing => "syncing…".to_string(),
            EntryStatus::Synced => "done✓".to_string(),
            EntryStatus::Failed => "failed✗".to_string(),
            EntryStatus::Blocked => "blocked✗".to_string(),
        }
    }

    /// Entries a page batch picks up: never tried, or tried and failed.
    pub fn is_eligible(self) -> bool {
        matches!(
            self,
            EntryStatus::Idle | EntryStatus::Failed | EntryStatus::Blocked
        )
    }

    pub(crate) fn from_item(status: ItemStatus) -> Self {
        match status {
            ItemStatus::Pending => EntryStatus::Idle,
            ItemStatus::Syncing => EntryStatus::Syncing,
            ItemStatus::Success => EntryStatus::Synced,
            ItemStatus::Failed => EntryStatus::Failed,
            ItemStatus::Blocked => EntryStatus::Blocked,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub item: ListingItem,
    pub status: EntryStatus,
}

/// What the open target chooser was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PromptPurpose {
    CurrentPage,
    Entry(usize),
    AllPages,
}

/// What the open yes/no dialog was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfirmPurpose {
    AllPagesFirst(SyncTarget),
    AllPagesFinal(SyncTarget),
    ContinueToPage { next_page: u32, tab: TabId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PanelState {
    pub batch_id: BatchId,
}

/// Everything one listing page knows. Driven only through [`crate::update`].
///
/// `now_ms` is the timestamp of the latest `Msg::Tick`; every other message is applied at
/// that time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    pub(crate) settings: SyncSettings,
    pub(crate) now_ms: u64,
    pub(crate) page_url: String,
    pub(crate) current_page: u32,
    pub(crate) total_pages: u32,
    pub(crate) entries: Vec<ListingEntry>,
    pub(crate) batches: BTreeMap<BatchId, Batch>,
    pub(crate) panel: Option<PanelState>,
    pub(crate) prompt: Option<PromptPurpose>,
    pub(crate) confirm: Option<ConfirmPurpose>,
    pub(crate) continuation: Option<Continuation>,
    /// Target and start time of this page's own batch when it is a continuation page.
    pub(crate) auto_start: Option<(SyncTarget, u64)>,
    pub(crate) page_complete: bool,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_settings(SyncSettings::default())
    }

    pub fn with_settings(settings: SyncSettings) -> Self {
        Self {
            settings,
            current_page: 1,
            total_pages: 1,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn entries(&self) -> &[ListingEntry] {
        &self.entries
    }

    pub fn batch(&self, id: &BatchId) -> Option<&Batch> {
        self.batches.get(id)
    }

    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.batches.values()
    }

    /// The batch currently shown on the progress panel.
    pub fn panel_batch(&self) -> Option<&Batch> {
        self.panel
            .as_ref()
            .and_then(|panel| self.batches.get(&panel.batch_id))
    }

    pub fn is_page_complete(&self) -> bool {
        self.page_complete
    }

    /// No batch, dialog, continuation or scheduled start is outstanding.
    pub fn is_idle(&self) -> bool {
        self.batches.values().all(Batch::is_settled)
            && self.prompt.is_none()
            && self.confirm.is_none()
            && self.continuation.is_none()
            && self.auto_start.is_none()
    }

    pub fn view(&self) -> AppViewModel {
        let entries = self
            .entries
            .iter()
            .map(|entry| EntryRowView {
                title: entry.item.title.clone(),
                caption: entry.status.caption(entry.item.rating),
                status: entry.status,
            })
            .collect::<Vec<_>>();
        let unsynced_count = self
            .entries
            .iter()
            .filter(|entry| entry.status != EntryStatus::Synced)
            .count();
        AppViewModel {
            entries,
            unsynced_count,
            current_page: self.current_page,
            total_pages: self.total_pages,
            panel: self.panel_batch().map(crate::view_model::panel_view),
            continuation: self.continuation.as_ref().map(Continuation::view),
            page_complete: self.page_complete,
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// A batch id not used by any live batch of this page.
    pub(crate) fn fresh_batch_id(&self, auto: bool) -> BatchId {
        let mut stamp = self.now_ms;
        loop {
            let id = if auto {
                BatchId::auto(stamp)
            } else {
                BatchId::from_millis(stamp)
            };
            if !self.batches.contains_key(&id) {
                return id;
            }
            stamp += 1;
        }
    }
}
