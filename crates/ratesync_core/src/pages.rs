use crate::batch::TabId;
use crate::protocol::{BatchId, SyncTarget};
use crate::view_model::ContinuationView;

/// Sequential opening of the listing pages after the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Continuation {
    pub target: SyncTarget,
    pub listing_url: String,
    pub first_page: u32,
    pub total_pages: u32,
    pub next_page: u32,
    /// Page batch of the first page; later pages wait until it settles unpaused.
    pub origin: Option<BatchId>,
    /// When the next page should be opened; `None` while waiting on `origin` or while a page
    /// is open or being opened.
    pub open_due: Option<u64>,
    pub open: Option<OpenPage>,
    pub awaiting_confirm: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OpenPage {
    pub page: u32,
    /// `None` until the driver reports the opened tab.
    pub tab: Option<TabId>,
}

impl Continuation {
    pub fn new(
        target: SyncTarget,
        listing_url: String,
        first_page: u32,
        total_pages: u32,
        origin: Option<BatchId>,
        open_due: Option<u64>,
    ) -> Self {
        Self {
            target,
            listing_url,
            first_page,
            total_pages,
            next_page: first_page + 1,
            origin,
            open_due,
            open: None,
            awaiting_confirm: false,
        }
    }

    /// The page to open now, if its time has come.
    pub fn take_due_page(&mut self, now_ms: u64) -> Option<u32> {
        let due = self.open_due?;
        if due > now_ms || self.open.is_some() || self.next_page > self.total_pages {
            return None;
        }
        self.open_due = None;
        self.open = Some(OpenPage {
            page: self.next_page,
            tab: None,
        });
        Some(self.next_page)
    }

    /// The open page to poll this tick.
    pub fn poll_target(&self) -> Option<(u32, TabId)> {
        if self.awaiting_confirm {
            return None;
        }
        let open = self.open?;
        Some((open.page, open.tab?))
    }

    pub fn pages_done(&self, last_page: u32) -> u32 {
        last_page + 1 - self.first_page
    }

    pub fn view(&self) -> ContinuationView {
        ContinuationView {
            target: self.target,
            open_page: self.open.map(|open| open.page),
            next_page: self.next_page,
            total_pages: self.total_pages,
        }
    }
}
