use crate::batch::{
    Batch, BatchKind, BatchPhase, CloseOutcome, ItemStatus, RecordLookup, TabId, TestVerdict,
    WorkItem,
};
use crate::effect::{Effect, NoticeLevel};
use crate::msg::{Msg, PageObservation};
use crate::pages::Continuation;
use crate::protocol::{page_url, result_key, BatchId, SyncTarget, COMPLETION_TITLE_MARKER};
use crate::state::{
    AppState, ConfirmPurpose, EntryStatus, Listing, ListingEntry, PanelState, PromptPurpose,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let mut effects = Vec::new();
    match msg {
        Msg::Tick { now_ms } => {
            state.now_ms = state.now_ms.max(now_ms);
            on_tick(&mut state, &mut effects);
        }
        Msg::ListingLoaded(listing) => load_listing(&mut state, listing, &mut effects),
        Msg::SyncPageClicked => request_page_sync(&mut state, &mut effects),
        Msg::SyncAllPagesClicked => request_all_pages(&mut state, &mut effects),
        Msg::SyncEntryClicked { entry } => request_entry(&mut state, entry, &mut effects),
        Msg::AutoSyncRequested { target } => {
            let due = state.now_ms + state.settings.auto_start_delay_ms;
            state.auto_start = Some((target, due));
            state.mark_dirty();
        }
        Msg::TargetChosen(target) => target_chosen(&mut state, target, &mut effects),
        Msg::ConfirmAnswered(yes) => confirm_answered(&mut state, yes, &mut effects),
        Msg::TabOpened {
            batch_id,
            index,
            tab,
        } => {
            let now = state.now_ms;
            let outcome = state
                .batches
                .get_mut(&batch_id)
                .and_then(|batch| batch.tab_opened(index, tab, now));
            if let Some(outcome) = outcome {
                after_close(&mut state, &batch_id, index, outcome, &mut effects);
            }
        }
        Msg::TabClosed {
            batch_id,
            index,
            lookup,
        } => tab_closed(&mut state, batch_id, index, lookup, &mut effects),
        Msg::PageOpened { page, tab } => page_opened(&mut state, page, tab, &mut effects),
        Msg::PageObserved { page, observation } => {
            page_observed(&mut state, page, observation, &mut effects)
        }
        Msg::PauseToggled => toggle_pause(&mut state, &mut effects),
        Msg::PanelClosed => close_panel(&mut state, &mut effects),
    }
    settle_batches(&mut state, &mut effects);
    (state, effects)
}

fn notify(effects: &mut Vec<Effect>, level: NoticeLevel, text: impl Into<String>) {
    effects.push(Effect::Notify {
        level,
        text: text.into(),
    });
}

fn dialog_open(state: &AppState) -> bool {
    state.prompt.is_some() || state.confirm.is_some()
}

/// Whether an unsettled batch still owns an unresolved item for `entry`.
fn entry_queued(state: &AppState, entry: usize) -> bool {
    state
        .batches
        .values()
        .filter(|batch| !batch.is_settled())
        .flat_map(|batch| batch.items())
        .any(|item| item.entry == entry && !item.status.is_resolved())
}

fn eligible_entries(state: &AppState) -> Vec<usize> {
    state
        .entries
        .iter()
        .enumerate()
        .filter(|(index, entry)| entry.status.is_eligible() && !entry_queued(state, *index))
        .map(|(index, _)| index)
        .collect()
}

fn load_listing(state: &mut AppState, listing: Listing, effects: &mut Vec<Effect>) {
    if listing.items.is_empty() {
        notify(effects, NoticeLevel::Error, "no titles found on this page");
    }
    state.page_url = listing.page_url;
    state.current_page = listing.current_page.max(1);
    state.total_pages = listing.total_pages.max(state.current_page);
    state.entries = listing
        .items
        .into_iter()
        .map(|item| ListingEntry {
            item,
            status: EntryStatus::Idle,
        })
        .collect();
    state.mark_dirty();
}

fn request_page_sync(state: &mut AppState, effects: &mut Vec<Effect>) {
    if dialog_open(state) {
        return;
    }
    if eligible_entries(state).is_empty() {
        notify(effects, NoticeLevel::Error, "nothing to sync on this page");
        return;
    }
    state.prompt = Some(PromptPurpose::CurrentPage);
    effects.push(Effect::PromptTarget);
}

fn request_all_pages(state: &mut AppState, effects: &mut Vec<Effect>) {
    if dialog_open(state) {
        return;
    }
    if state.continuation.is_some() {
        notify(
            effects,
            NoticeLevel::Error,
            "a multi-page sync is already running",
        );
        return;
    }
    if state.total_pages <= state.current_page {
        notify(
            effects,
            NoticeLevel::Success,
            "no later pages, syncing this page only",
        );
        request_page_sync(state, effects);
        return;
    }
    state.prompt = Some(PromptPurpose::AllPages);
    effects.push(Effect::PromptTarget);
}

fn request_entry(state: &mut AppState, entry: usize, effects: &mut Vec<Effect>) {
    if dialog_open(state) {
        return;
    }
    match state.entries.get(entry) {
        Some(found) if found.status != EntryStatus::Syncing && !entry_queued(state, entry) => {
            state.prompt = Some(PromptPurpose::Entry(entry));
            effects.push(Effect::PromptTarget);
        }
        _ => {}
    }
}

fn target_chosen(state: &mut AppState, target: Option<SyncTarget>, effects: &mut Vec<Effect>) {
    let Some(purpose) = state.prompt.take() else {
        return;
    };
    // A cancelled chooser has no side effects.
    let Some(target) = target else {
        return;
    };
    match purpose {
        PromptPurpose::CurrentPage => {
            start_page_batch(state, target, effects);
        }
        PromptPurpose::Entry(entry) => start_single(state, entry, target, effects),
        PromptPurpose::AllPages => {
            let (first, last) = (state.current_page, state.total_pages);
            let pages = last - first + 1;
            state.confirm = Some(ConfirmPurpose::AllPagesFirst(target));
            effects.push(Effect::Confirm {
                title: "Sync all pages?".to_string(),
                message: format!(
                    "Sync pages {first} to {last} ({pages} pages)? This opens {} more listing tabs.\n\nTarget: {}",
                    pages - 1,
                    target.label()
                ),
            });
        }
    }
}

fn confirm_answered(state: &mut AppState, yes: bool, effects: &mut Vec<Effect>) {
    let Some(purpose) = state.confirm.take() else {
        return;
    };
    match purpose {
        ConfirmPurpose::AllPagesFirst(target) => {
            if yes {
                let (first, last) = (state.current_page, state.total_pages);
                state.confirm = Some(ConfirmPurpose::AllPagesFinal(target));
                effects.push(Effect::Confirm {
                    title: "Final confirmation".to_string(),
                    message: format!(
                        "Pages {first}-{last} ({} pages) will be synced to {}.\n\nStart now?",
                        last - first + 1,
                        target.label()
                    ),
                });
            }
        }
        ConfirmPurpose::AllPagesFinal(target) => {
            if yes {
                start_all_pages(state, target, effects);
            }
        }
        ConfirmPurpose::ContinueToPage { next_page, tab } => {
            effects.push(Effect::ClosePage { tab });
            let now = state.now_ms;
            let Some(cont) = state.continuation.as_mut() else {
                return;
            };
            let finished_page = next_page - 1;
            cont.open = None;
            cont.awaiting_confirm = false;
            if yes {
                cont.next_page = next_page;
                cont.open_due = Some(now);
                notify(
                    effects,
                    NoticeLevel::Success,
                    format!("starting page {next_page}…"),
                );
                continuation_tick(state, effects);
            } else {
                let done = cont.pages_done(finished_page);
                state.continuation = None;
                notify(
                    effects,
                    NoticeLevel::Success,
                    format!("sync stopped, {done} pages completed"),
                );
            }
            state.mark_dirty();
        }
    }
}

fn start_batch(
    state: &mut AppState,
    kind: BatchKind,
    target: SyncTarget,
    entries: &[usize],
    effects: &mut Vec<Effect>,
) -> BatchId {
    let id = state.fresh_batch_id(kind == BatchKind::AutoChild);
    let items = entries
        .iter()
        .filter_map(|&entry| {
            let item = &state.entries.get(entry)?.item;
            Some(WorkItem {
                entry,
                title: item.title.clone(),
                source_url: item.url.clone(),
                rating: item.rating,
                target,
                status: ItemStatus::Pending,
                resolution: None,
            })
        })
        .collect();
    let sample = (kind == BatchKind::Page && state.settings.test_phase_enabled)
        .then_some(state.settings.test_sample_size);
    let batch = Batch::new(
        id.clone(),
        kind,
        target,
        items,
        sample,
        state.now_ms,
        state.settings.dispatch_interval_ms,
    );
    state.batches.insert(id.clone(), batch);
    dispatch_due(state, &id, effects);
    state.mark_dirty();
    id
}

/// Starts a panel batch over the page's eligible entries.
fn start_page_batch(
    state: &mut AppState,
    target: SyncTarget,
    effects: &mut Vec<Effect>,
) -> Option<BatchId> {
    let eligible = eligible_entries(state);
    if eligible.is_empty() {
        notify(effects, NoticeLevel::Error, "nothing to sync on this page");
        return None;
    }
    let total = eligible.len();
    notify(
        effects,
        NoticeLevel::Success,
        format!("syncing {total} titles on this page to {}…", target.label()),
    );
    if state.settings.wants_test_phase(total) {
        notify(
            effects,
            NoticeLevel::Success,
            format!(
                "testing the first {} titles first…",
                state.settings.test_sample_size
            ),
        );
    }
    let id = start_batch(state, BatchKind::Page, target, &eligible, effects);
    state.panel = Some(PanelState {
        batch_id: id.clone(),
    });
    Some(id)
}

fn start_single(state: &mut AppState, entry: usize, target: SyncTarget, effects: &mut Vec<Effect>) {
    let Some(found) = state.entries.get(entry) else {
        return;
    };
    if found.status == EntryStatus::Syncing {
        return;
    }
    notify(
        effects,
        NoticeLevel::Success,
        format!(
            "syncing to {}: {} ({} points)",
            target.label(),
            found.item.title,
            found.item.rating.score()
        ),
    );
    start_batch(state, BatchKind::Single, target, &[entry], effects);
}

fn start_all_pages(state: &mut AppState, target: SyncTarget, effects: &mut Vec<Effect>) {
    let (first, last) = (state.current_page, state.total_pages);
    notify(
        effects,
        NoticeLevel::Success,
        format!(
            "preparing to sync pages {first}-{last} ({} pages) to {}…",
            last - first + 1,
            target.label()
        ),
    );
    let origin = if eligible_entries(state).is_empty() {
        None
    } else {
        start_page_batch(state, target, effects)
    };
    let open_due = origin
        .is_none()
        .then(|| state.now_ms + state.settings.auto_start_delay_ms);
    state.continuation = Some(Continuation::new(
        target,
        state.page_url.clone(),
        first,
        last,
        origin,
        open_due,
    ));
    state.mark_dirty();
}

fn start_auto_batch(state: &mut AppState, target: SyncTarget, effects: &mut Vec<Effect>) {
    let eligible = eligible_entries(state);
    if eligible.is_empty() {
        state.page_complete = true;
        effects.push(Effect::MarkPageComplete);
        state.mark_dirty();
        return;
    }
    start_batch(state, BatchKind::AutoChild, target, &eligible, effects);
}

fn on_tick(state: &mut AppState, effects: &mut Vec<Effect>) {
    if let Some((target, due)) = state.auto_start {
        if due <= state.now_ms {
            state.auto_start = None;
            start_auto_batch(state, target, effects);
        }
    }

    let ids: Vec<BatchId> = state.batches.keys().cloned().collect();
    for id in &ids {
        dispatch_due(state, id, effects);
    }
    for batch in state.batches.values() {
        for handle in batch.live_tabs() {
            effects.push(Effect::PollTab {
                batch_id: batch.id().clone(),
                index: handle.index,
                tab: handle.tab,
                key: result_key(batch.id(), handle.index),
            });
        }
    }

    continuation_tick(state, effects);
}

fn dispatch_due(state: &mut AppState, batch_id: &BatchId, effects: &mut Vec<Effect>) {
    let now = state.now_ms;
    let Some(batch) = state.batches.get_mut(batch_id) else {
        return;
    };
    let dispatches = batch.dispatch_due(now);
    if dispatches.is_empty() {
        return;
    }
    for dispatch in dispatches {
        let entry = batch.items()[dispatch.index].entry;
        if let Some(found) = state.entries.get_mut(entry) {
            found.status = EntryStatus::Syncing;
        }
        effects.push(Effect::OpenTab {
            batch_id: batch_id.clone(),
            index: dispatch.index,
            url: dispatch.url,
        });
    }
    state.mark_dirty();
}

fn tab_closed(
    state: &mut AppState,
    batch_id: BatchId,
    index: usize,
    lookup: RecordLookup,
    effects: &mut Vec<Effect>,
) {
    let (now, timeout) = (state.now_ms, state.settings.result_timeout_ms);
    let Some(batch) = state.batches.get_mut(&batch_id) else {
        return;
    };
    let outcome = batch.tab_closed(index, lookup, now, timeout);
    after_close(state, &batch_id, index, outcome, effects);
}

/// Mirrors a resolved item onto its listing entry and applies any test-phase verdict.
fn after_close(
    state: &mut AppState,
    batch_id: &BatchId,
    index: usize,
    outcome: CloseOutcome,
    effects: &mut Vec<Effect>,
) {
    if outcome.delete_key {
        effects.push(Effect::DeleteRecord {
            key: result_key(batch_id, index),
        });
    }
    if !outcome.resolved {
        return;
    }
    state.mark_dirty();
    let Some(batch) = state.batches.get(batch_id) else {
        return;
    };
    let kind = batch.kind();
    let Some(item) = batch.items().get(index) else {
        return;
    };
    let (entry, status, title) = (item.entry, item.status, item.title.clone());
    let reason = item
        .resolution
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    if let Some(found) = state.entries.get_mut(entry) {
        found.status = EntryStatus::from_item(status);
    }
    if kind == BatchKind::Single {
        if status == ItemStatus::Success {
            notify(effects, NoticeLevel::Success, format!("synced: {title}"));
        } else {
            notify(
                effects,
                NoticeLevel::Error,
                format!("sync failed: {title} ({reason})"),
            );
        }
    }
    if let Some(verdict) = outcome.verdict {
        apply_verdict(state, batch_id, verdict, effects);
    }
}

fn apply_verdict(
    state: &mut AppState,
    batch_id: &BatchId,
    verdict: TestVerdict,
    effects: &mut Vec<Effect>,
) {
    let (now, interval) = (state.now_ms, state.settings.dispatch_interval_ms);
    let Some(batch) = state.batches.get_mut(batch_id) else {
        return;
    };
    match verdict {
        TestVerdict::Continue { succeeded, sample } => {
            batch.schedule_remaining(now, interval);
            notify(
                effects,
                NoticeLevel::Success,
                format!("test passed: {succeeded}/{sample} succeeded, continuing with the rest…"),
            );
        }
        TestVerdict::Halt { sample } => {
            batch.cancel_pending();
            notify(
                effects,
                NoticeLevel::Error,
                format!("test failed: all of the first {sample} titles failed, sync stopped"),
            );
            let started_here = state
                .continuation
                .as_ref()
                .is_some_and(|cont| cont.origin.as_ref() == Some(batch_id));
            if started_here {
                state.continuation = None;
                notify(effects, NoticeLevel::Error, "later pages were not opened");
                state.mark_dirty();
            }
        }
    }
}

fn toggle_pause(state: &mut AppState, effects: &mut Vec<Effect>) {
    let (now, interval) = (state.now_ms, state.settings.dispatch_interval_ms);
    let Some(id) = state.panel.as_ref().map(|panel| panel.batch_id.clone()) else {
        return;
    };
    let Some(batch) = state.batches.get_mut(&id) else {
        return;
    };
    // A batch that settled while paused can still be resumed.
    if batch.is_settled() && !batch.is_paused() {
        return;
    }
    if batch.toggle_pause(now, interval) {
        notify(effects, NoticeLevel::Success, "sync paused");
    } else {
        notify(effects, NoticeLevel::Success, "sync resumed");
        dispatch_due(state, &id, effects);
    }
    state.mark_dirty();
}

/// Hides the panel, resuming its batch first if it is paused.
fn close_panel(state: &mut AppState, effects: &mut Vec<Effect>) {
    let Some(panel) = state.panel.take() else {
        return;
    };
    state.mark_dirty();
    let (now, interval) = (state.now_ms, state.settings.dispatch_interval_ms);
    let Some(batch) = state.batches.get_mut(&panel.batch_id) else {
        return;
    };
    if !batch.is_paused() {
        return;
    }
    batch.toggle_pause(now, interval);
    notify(effects, NoticeLevel::Success, "sync resumed");
    dispatch_due(state, &panel.batch_id, effects);
}

fn continuation_tick(state: &mut AppState, effects: &mut Vec<Effect>) {
    let (now, per_page) = (state.now_ms, state.settings.movies_per_page);
    let delay = state.settings.auto_start_delay_ms;
    let Some(cont) = state.continuation.as_mut() else {
        return;
    };
    if let Some(origin) = &cont.origin {
        let busy = state
            .batches
            .get(origin)
            .is_some_and(|batch| !batch.is_settled() || batch.is_paused());
        if busy {
            return;
        }
        cont.origin = None;
        cont.open_due = Some(now + delay);
    }
    if let Some(page) = cont.take_due_page(now) {
        match page_url(&cont.listing_url, page, per_page, cont.target) {
            Ok(url) => effects.push(Effect::OpenPage { page, url }),
            Err(err) => {
                state.continuation = None;
                notify(
                    effects,
                    NoticeLevel::Error,
                    format!("cannot open page {page}: {err}"),
                );
            }
        }
        state.mark_dirty();
        return;
    }
    if let Some((page, tab)) = cont.poll_target() {
        effects.push(Effect::PollPage { page, tab });
    }
}

fn page_opened(state: &mut AppState, page: u32, tab: Option<TabId>, effects: &mut Vec<Effect>) {
    let Some(cont) = state.continuation.as_mut() else {
        return;
    };
    let Some(open) = cont.open.as_mut() else {
        return;
    };
    if open.page != page || open.tab.is_some() {
        return;
    }
    match tab {
        Some(tab) => open.tab = Some(tab),
        None => {
            state.continuation = None;
            notify(
                effects,
                NoticeLevel::Error,
                format!("page {page} could not be opened, sync stopped"),
            );
        }
    }
    state.mark_dirty();
}

fn page_observed(
    state: &mut AppState,
    page: u32,
    observation: PageObservation,
    effects: &mut Vec<Effect>,
) {
    if state.confirm.is_some() {
        return;
    }
    let Some(cont) = state.continuation.as_mut() else {
        return;
    };
    let Some((open_page, tab)) = cont.poll_target() else {
        return;
    };
    if open_page != page {
        return;
    }
    match observation {
        PageObservation::Title(title) if title.starts_with(COMPLETION_TITLE_MARKER) => {
            let remaining = cont.total_pages.saturating_sub(page);
            if remaining > 0 {
                cont.awaiting_confirm = true;
                state.confirm = Some(ConfirmPurpose::ContinueToPage {
                    next_page: page + 1,
                    tab,
                });
                effects.push(Effect::Confirm {
                    title: "Continue with the next page?".to_string(),
                    message: format!(
                        "Page {page} is done. {remaining} pages left.\n\nSync page {}?",
                        page + 1
                    ),
                });
            } else {
                state.continuation = None;
                effects.push(Effect::ClosePage { tab });
                notify(effects, NoticeLevel::Success, "all pages synced!");
            }
            state.mark_dirty();
        }
        PageObservation::Title(_) | PageObservation::Unreadable => {}
        PageObservation::Closed => {
            state.continuation = None;
            notify(
                effects,
                NoticeLevel::Error,
                format!("page {page} was closed, sync stopped"),
            );
            state.mark_dirty();
        }
    }
}

/// Reports each batch once when it settles and drops settled batches no panel shows.
fn settle_batches(state: &mut AppState, effects: &mut Vec<Effect>) {
    let newly_settled: Vec<BatchId> = state
        .batches
        .values()
        .filter(|batch| batch.is_settled() && !batch.is_announced())
        .map(|batch| batch.id().clone())
        .collect();
    for id in newly_settled {
        let Some(batch) = state.batches.get_mut(&id) else {
            continue;
        };
        batch.announce();
        let stats = batch.stats();
        match batch.kind() {
            BatchKind::Page if batch.phase() != BatchPhase::Halted => notify(
                effects,
                NoticeLevel::Success,
                format!(
                    "sync complete! {} succeeded, {} failed",
                    stats.success, stats.failed
                ),
            ),
            BatchKind::AutoChild => {
                state.page_complete = true;
                effects.push(Effect::MarkPageComplete);
            }
            BatchKind::Page | BatchKind::Single => {}
        }
        state.mark_dirty();
    }
    let shown = state.panel.as_ref().map(|panel| panel.batch_id.clone());
    state
        .batches
        .retain(|id, batch| !batch.is_announced() || shown.as_ref() == Some(id));
}
