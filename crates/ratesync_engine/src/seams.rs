use ratesync_core::{AppViewModel, NoticeLevel, SyncTarget, TabId};

use crate::page::PageError;

/// Opens and observes browsing contexts on behalf of the listing page.
#[async_trait::async_trait]
pub trait TabLauncher: Send + Sync {
    /// `None` when the browser refused to open the tab.
    async fn open(&self, url: &str) -> Option<TabId>;
    async fn is_closed(&self, tab: TabId) -> bool;
    /// Title of a tab opened by this page; only same-origin tabs are readable.
    async fn title(&self, tab: TabId) -> Result<String, PageError>;
    async fn close(&self, tab: TabId);
}

/// Modal questions asked of the user.
#[async_trait::async_trait]
pub trait Dialogs: Send + Sync {
    /// `None` when the chooser was dismissed.
    async fn choose_target(&self) -> Option<SyncTarget>;
    async fn confirm(&self, title: &str, message: &str) -> bool;
}

/// Everything the listing page shows.
pub trait Presenter: Send + Sync {
    fn notify(&self, level: NoticeLevel, text: &str);
    fn render(&self, view: &AppViewModel);
    /// Prefixes the page title with the completion marker.
    fn mark_page_complete(&self);
}

/// Answers every dialog the same way.
#[derive(Debug, Clone, Copy)]
pub struct ScriptedDialogs {
    pub target: Option<SyncTarget>,
    pub confirm: bool,
}

#[async_trait::async_trait]
impl Dialogs for ScriptedDialogs {
    async fn choose_target(&self) -> Option<SyncTarget> {
        self.target
    }

    async fn confirm(&self, _title: &str, _message: &str) -> bool {
        self.confirm
    }
}
