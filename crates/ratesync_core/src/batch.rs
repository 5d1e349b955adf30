use std::fmt;

use crate::protocol::{BatchId, BatchRef, OutcomeTag, Rating, SyncFragment, SyncTarget};

/// Opaque handle of a browsing context opened by the driver.
pub type TabId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemStatus {
    #[default]
    Pending,
    Syncing,
    Success,
    Failed,
    /// The tab could not be opened at all (popup blocker).
    Blocked,
}

impl ItemStatus {
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            ItemStatus::Success | ItemStatus::Failed | ItemStatus::Blocked
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            ItemStatus::Pending => "waiting",
            ItemStatus::Syncing => "syncing…",
            ItemStatus::Success => "success",
            ItemStatus::Failed => "failed",
            ItemStatus::Blocked => "blocked",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            ItemStatus::Pending => "⏳",
            ItemStatus::Syncing => "🔄",
            ItemStatus::Success => "✅",
            ItemStatus::Failed => "❌",
            ItemStatus::Blocked => "⛔",
        }
    }
}

/// Why an item reached its terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The action runner wrote a result record.
    Reported { success: bool, tag: OutcomeTag },
    /// The tab closed and no record showed up within the result timeout.
    TimedOut,
    /// A record was present but could not be decoded.
    Unreadable(String),
    Blocked,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Reported { tag, .. } => write!(f, "{tag}"),
            Resolution::TimedOut => f.write_str("timeout"),
            Resolution::Unreadable(reason) => write!(f, "unreadable result: {reason}"),
            Resolution::Blocked => f.write_str("tab blocked"),
        }
    }
}

/// Decoded value of a result store entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub success: bool,
    pub result: OutcomeTag,
    pub timestamp_ms: u64,
}

/// What the driver found under an item's result key once its tab was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordLookup {
    Found(ResultRecord),
    /// Only the detail page's in-flight marker is present.
    Processing,
    Missing,
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Index of the listing entry this item came from.
    pub entry: usize,
    pub title: String,
    pub source_url: String,
    pub rating: Rating,
    pub target: SyncTarget,
    pub status: ItemStatus,
    pub resolution: Option<Resolution>,
}

/// `success + failed + pending == total`; `pending` counts every unresolved item, including
/// the ones whose tab is currently open. Blocked items are counted as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub pending: usize,
}

impl BatchStats {
    fn new(total: usize) -> Self {
        Self {
            total,
            pending: total,
            ..Self::default()
        }
    }

    pub fn completed(&self) -> usize {
        self.success + self.failed
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed() * 100 + self.total / 2) / self.total) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// Current listing page, with progress panel and test phase.
    Page,
    /// One entry activated by hand.
    Single,
    /// Listing page opened by a continuation sequence.
    AutoChild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Sampling,
    Running,
    /// Every test-phase item failed; nothing else is dispatched.
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestPhase {
    pub sample: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl TestPhase {
    fn is_complete(&self) -> bool {
        self.succeeded + self.failed >= self.sample
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestVerdict {
    Continue { succeeded: usize, sample: usize },
    Halt { sample: usize },
}

/// A live tab the check loop is watching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabHandle {
    pub tab: TabId,
    pub index: usize,
    pub start_ms: u64,
    pub closed_seen: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Dispatch {
    pub index: usize,
    pub url: String,
}

/// Outcome of feeding one closed-tab observation into a batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct CloseOutcome {
    /// The item reached a terminal status with this observation.
    pub resolved: bool,
    /// The result key must be removed from the store.
    pub delete_key: bool,
    pub verdict: Option<TestVerdict>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    id: BatchId,
    kind: BatchKind,
    target: SyncTarget,
    items: Vec<WorkItem>,
    stats: BatchStats,
    /// Due time per item; `None` once dispatched or when outside the active range.
    due: Vec<Option<u64>>,
    live: Vec<TabHandle>,
    test_phase: Option<TestPhase>,
    phase: BatchPhase,
    paused: bool,
    announced: bool,
}

impl Batch {
    pub(crate) fn new(
        id: BatchId,
        kind: BatchKind,
        target: SyncTarget,
        items: Vec<WorkItem>,
        test_sample: Option<usize>,
        now_ms: u64,
        interval_ms: u64,
    ) -> Self {
        let total = items.len();
        let test_phase = test_sample
            .filter(|sample| *sample > 0 && total > *sample)
            .map(|sample| TestPhase {
                sample,
                succeeded: 0,
                failed: 0,
            });
        let active = test_phase.map_or(total, |phase| phase.sample);
        let due = (0..total)
            .map(|i| (i < active).then(|| now_ms + interval_ms * i as u64))
            .collect();
        Self {
            id,
            kind,
            target,
            items,
            stats: BatchStats::new(total),
            due,
            live: Vec::new(),
            phase: if test_phase.is_some() {
                BatchPhase::Sampling
            } else {
                BatchPhase::Running
            },
            test_phase,
            paused: false,
            announced: false,
        }
    }

    pub fn id(&self) -> &BatchId {
        &self.id
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn target(&self) -> SyncTarget {
        self.target
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    pub fn test_phase(&self) -> Option<TestPhase> {
        self.test_phase
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn live_tabs(&self) -> &[TabHandle] {
        &self.live
    }

    /// Whether the settled batch has already been reported.
    pub fn is_announced(&self) -> bool {
        self.announced
    }

    pub(crate) fn announce(&mut self) {
        self.announced = true;
    }

    /// Nothing left to open and nothing left to watch.
    pub fn is_settled(&self) -> bool {
        self.live.is_empty()
            && self.due.iter().all(Option::is_none)
            && !self
                .items
                .iter()
                .any(|item| item.status == ItemStatus::Syncing)
    }

    /// Opens every item whose stagger has elapsed. Paused batches hold their due items.
    pub(crate) fn dispatch_due(&mut self, now_ms: u64) -> Vec<Dispatch> {
        if self.paused || self.phase == BatchPhase::Halted {
            return Vec::new();
        }
        let mut out = Vec::new();
        for index in 0..self.items.len() {
            let Some(due) = self.due[index] else {
                continue;
            };
            if due > now_ms {
                continue;
            }
            self.due[index] = None;
            let item = &mut self.items[index];
            if item.status != ItemStatus::Pending {
                continue;
            }
            item.status = ItemStatus::Syncing;
            let fragment = SyncFragment {
                rating: item.rating,
                target: item.target,
                batch: Some(BatchRef::new(self.id.clone(), index)),
            };
            out.push(Dispatch {
                index,
                url: fragment.apply_to(&item.source_url),
            });
        }
        out
    }

    /// Returns `true` when pausing (as opposed to resuming).
    pub(crate) fn toggle_pause(&mut self, now_ms: u64, interval_ms: u64) -> bool {
        self.paused = !self.paused;
        if !self.paused {
            // Held items restart their stagger from the resume time.
            let mut position = 0u64;
            for due in self.due.iter_mut().filter(|due| due.is_some()) {
                *due = Some(now_ms + interval_ms * position);
                position += 1;
            }
        }
        self.paused
    }

    /// Records the handle of a freshly opened tab; `None` means the open was blocked.
    pub(crate) fn tab_opened(
        &mut self,
        index: usize,
        tab: Option<TabId>,
        now_ms: u64,
    ) -> Option<CloseOutcome> {
        if self.items.get(index)?.status != ItemStatus::Syncing {
            return None;
        }
        match tab {
            Some(tab) => {
                self.live.push(TabHandle {
                    tab,
                    index,
                    start_ms: now_ms,
                    closed_seen: false,
                });
                None
            }
            None => {
                let verdict = self.resolve(index, Resolution::Blocked);
                Some(CloseOutcome {
                    resolved: true,
                    delete_key: false,
                    verdict,
                })
            }
        }
    }

    /// Applies what was found in the store after the item's tab closed.
    ///
    /// An absent (or still in-flight) record only fails the item once the result timeout has
    /// elapsed; until then the handle stays live and is re-examined on later ticks.
    pub(crate) fn tab_closed(
        &mut self,
        index: usize,
        lookup: RecordLookup,
        now_ms: u64,
        timeout_ms: u64,
    ) -> CloseOutcome {
        let Some(position) = self.live.iter().position(|handle| handle.index == index) else {
            return CloseOutcome::default();
        };
        let elapsed = now_ms.saturating_sub(self.live[position].start_ms);
        let (resolution, delete_key) = match lookup {
            RecordLookup::Found(record) => (
                Resolution::Reported {
                    success: record.success,
                    tag: record.result,
                },
                true,
            ),
            RecordLookup::Unreadable(reason) => (Resolution::Unreadable(reason), true),
            RecordLookup::Processing if elapsed > timeout_ms => (Resolution::TimedOut, true),
            RecordLookup::Missing if elapsed > timeout_ms => (Resolution::TimedOut, false),
            RecordLookup::Processing | RecordLookup::Missing => {
                self.live[position].closed_seen = true;
                return CloseOutcome::default();
            }
        };
        self.live.remove(position);
        let verdict = self.resolve(index, resolution);
        CloseOutcome {
            resolved: true,
            delete_key,
            verdict,
        }
    }

    /// Moves an item to its terminal status exactly once and updates the test phase.
    fn resolve(&mut self, index: usize, resolution: Resolution) -> Option<TestVerdict> {
        let item = self.items.get_mut(index)?;
        if item.status.is_resolved() {
            return None;
        }
        let success = matches!(resolution, Resolution::Reported { success: true, .. });
        item.status = match (&resolution, success) {
            (Resolution::Blocked, _) => ItemStatus::Blocked,
            (_, true) => ItemStatus::Success,
            (_, false) => ItemStatus::Failed,
        };
        item.resolution = Some(resolution);
        self.stats.pending -= 1;
        if success {
            self.stats.success += 1;
        } else {
            self.stats.failed += 1;
        }

        let phase = self.test_phase.as_mut()?;
        if self.phase != BatchPhase::Sampling || index >= phase.sample {
            return None;
        }
        if success {
            phase.succeeded += 1;
        } else {
            phase.failed += 1;
        }
        if !phase.is_complete() {
            return None;
        }
        let phase = *phase;
        if phase.succeeded > 0 {
            self.phase = BatchPhase::Running;
            Some(TestVerdict::Continue {
                succeeded: phase.succeeded,
                sample: phase.sample,
            })
        } else {
            self.phase = BatchPhase::Halted;
            Some(TestVerdict::Halt {
                sample: phase.sample,
            })
        }
    }

    /// Schedules everything after the test sample, one interval after `now_ms` and onwards.
    pub(crate) fn schedule_remaining(&mut self, now_ms: u64, interval_ms: u64) {
        let sample = self.test_phase.map_or(0, |phase| phase.sample);
        for (position, index) in (sample..self.items.len()).enumerate() {
            if self.items[index].status == ItemStatus::Pending {
                self.due[index] = Some(now_ms + interval_ms * (position as u64 + 1));
            }
        }
    }

    /// Drops every scheduled dispatch; items never opened stay pending.
    pub(crate) fn cancel_pending(&mut self) {
        self.due.iter_mut().for_each(|due| *due = None);
    }
}
