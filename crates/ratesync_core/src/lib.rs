//! Ratesync core: pure batch orchestration state machine, wire formats and view models.
//!
//! Nothing in this crate performs IO or reads a clock. Time only advances through
//! [`Msg::Tick`], and everything the outside world must do is returned as an [`Effect`].
mod batch;
mod effect;
mod msg;
mod pages;
pub mod protocol;
mod settings;
mod state;
mod update;
mod view_model;

pub use batch::{
    Batch, BatchKind, BatchPhase, BatchStats, ItemStatus, RecordLookup, Resolution, ResultRecord,
    TabHandle, TabId, TestPhase, TestVerdict, WorkItem,
};
pub use effect::{Effect, NoticeLevel};
pub use msg::{Msg, PageObservation};
pub use protocol::{
    BatchId, BatchRef, HandoffFragment, OutcomeTag, ProtocolError, Rating, ReturnTrip, Score,
    SyncFragment, SyncTarget,
};
pub use settings::SyncSettings;
pub use state::{AppState, EntryStatus, Listing, ListingEntry, ListingItem};
pub use update::update;
pub use view_model::{AppViewModel, ContinuationView, EntryRowView, ItemRowView, ProgressPanelView};
