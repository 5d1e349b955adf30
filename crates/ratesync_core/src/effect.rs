use crate::batch::TabId;
use crate::protocol::BatchId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Show the target chooser; answer with `Msg::TargetChosen`.
    PromptTarget,
    /// Show a yes/no dialog; answer with `Msg::ConfirmAnswered`.
    Confirm { title: String, message: String },
    /// Open `url` in a new tab; answer with `Msg::TabOpened`.
    OpenTab {
        batch_id: BatchId,
        index: usize,
        url: String,
    },
    /// If `tab` is closed, read `key` and answer with `Msg::TabClosed`.
    PollTab {
        batch_id: BatchId,
        index: usize,
        tab: TabId,
        key: String,
    },
    DeleteRecord { key: String },
    Notify { level: NoticeLevel, text: String },
    /// Open a continuation page; answer with `Msg::PageOpened`.
    OpenPage { page: u32, url: String },
    /// Read the page's title or closed state; answer with `Msg::PageObserved`.
    PollPage { page: u32, tab: TabId },
    ClosePage { tab: TabId },
    /// Prefix this page's title with the completion marker.
    MarkPageComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}
