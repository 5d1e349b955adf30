use crate::batch::{RecordLookup, TabId};
use crate::protocol::{BatchId, SyncTarget};
use crate::state::Listing;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Check-loop tick; also advances the state's notion of "now".
    Tick { now_ms: u64 },
    /// The listing page was scanned.
    ListingLoaded(Listing),
    /// User activated "sync current page".
    SyncPageClicked,
    /// User activated "sync all pages".
    SyncAllPagesClicked,
    /// User activated the control of one listing entry.
    SyncEntryClicked { entry: usize },
    /// This page was opened by a continuation sequence (`#auto-sync-<target>`).
    AutoSyncRequested { target: SyncTarget },
    /// Answer of the target chooser; `None` when cancelled.
    TargetChosen(Option<SyncTarget>),
    /// Answer of the pending yes/no dialog.
    ConfirmAnswered(bool),
    /// Result of an `OpenTab` effect; `tab` is `None` when the browser refused to open it.
    TabOpened {
        batch_id: BatchId,
        index: usize,
        tab: Option<TabId>,
    },
    /// A watched tab is closed; `lookup` is what its result key held at that moment.
    TabClosed {
        batch_id: BatchId,
        index: usize,
        lookup: RecordLookup,
    },
    /// Result of an `OpenPage` effect.
    PageOpened { page: u32, tab: Option<TabId> },
    /// Result of a `PollPage` effect.
    PageObserved {
        page: u32,
        observation: PageObservation,
    },
    /// User toggled pause on the progress panel.
    PauseToggled,
    /// User closed the progress panel.
    PanelClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageObservation {
    Title(String),
    /// The title could not be read this time (cross-origin or still loading).
    Unreadable,
    Closed,
}
