use crate::batch::{Batch, BatchKind, BatchPhase, BatchStats, ItemStatus};
use crate::protocol::SyncTarget;
use crate::state::EntryStatus;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub entries: Vec<EntryRowView>,
    /// Badge of the floating sync controls.
    pub unsynced_count: usize,
    pub current_page: u32,
    pub total_pages: u32,
    pub panel: Option<ProgressPanelView>,
    pub continuation: Option<ContinuationView>,
    pub page_complete: bool,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRowView {
    pub title: String,
    pub caption: String,
    pub status: EntryStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressPanelView {
    pub batch_id: String,
    pub target: SyncTarget,
    pub stats: BatchStats,
    /// `(success + failed) / total`, rounded.
    pub percent: u8,
    pub paused: bool,
    pub finished: bool,
    pub headline: String,
    pub rows: Vec<ItemRowView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRowView {
    pub title: String,
    pub status: ItemStatus,
    pub icon: &'static str,
    pub label: &'static str,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationView {
    pub target: SyncTarget,
    pub open_page: Option<u32>,
    pub next_page: u32,
    pub total_pages: u32,
}

pub(crate) fn panel_view(batch: &Batch) -> ProgressPanelView {
    let stats = batch.stats();
    let rows = batch
        .items()
        .iter()
        .map(|item| ItemRowView {
            title: item.title.clone(),
            status: item.status,
            icon: item.status.icon(),
            label: item.status.label(),
            reason: item.resolution.as_ref().map(ToString::to_string),
        })
        .collect();
    let finished = batch.is_settled() && batch.kind() == BatchKind::Page;
    ProgressPanelView {
        batch_id: batch.id().to_string(),
        target: batch.target(),
        stats,
        percent: stats.percent(),
        paused: batch.is_paused(),
        finished,
        headline: headline(batch, stats),
        rows,
    }
}

fn headline(batch: &Batch, stats: BatchStats) -> String {
    if batch.phase() == BatchPhase::Halted {
        let sample = batch.test_phase().map_or(0, |phase| phase.sample);
        return format!("test failed, sync stopped (0/{sample} succeeded)");
    }
    if stats.completed() == stats.total {
        return format!(
            "sync complete! {} succeeded, {} failed",
            stats.success, stats.failed
        );
    }
    let started = batch
        .items()
        .iter()
        .any(|item| item.status != ItemStatus::Pending);
    let mut line = if started {
        format!(
            "{} / {} ({}%)",
            stats.completed(),
            stats.total,
            stats.percent()
        )
    } else {
        "preparing…".to_string()
    };
    if batch.is_paused() {
        line.push_str(" (paused)");
    }
    line
}
