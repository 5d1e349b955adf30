use std::sync::Once;

use ratesync_core::{
    update, AppState, BatchId, Effect, EntryStatus, Listing, ListingItem, Msg, NoticeLevel,
    OutcomeTag, Rating, RecordLookup, ResultRecord, SyncTarget,
};

const T0: u64 = 1_770_000_000_000;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(ratesync_logging::initialize_for_tests);
}

fn loaded(count: usize) -> AppState {
    let listing = Listing {
        page_url: "https://movie.douban.com/people/alice/collect".to_string(),
        items: (0..count)
            .map(|i| ListingItem {
                title: format!("Film {i}"),
                url: format!("https://movie.douban.com/subject/{}/", 3000 + i),
                rating: Rating::new(4).unwrap(),
            })
            .collect(),
        ..Listing::default()
    };
    let (state, _) = update(AppState::new(), Msg::Tick { now_ms: T0 });
    let (state, _) = update(state, Msg::ListingLoaded(listing));
    state
}

fn sync_entry(state: AppState, entry: usize, target: SyncTarget) -> (AppState, Vec<Effect>) {
    let (state, effects) = update(state, Msg::SyncEntryClicked { entry });
    assert_eq!(effects, vec![Effect::PromptTarget]);
    update(state, Msg::TargetChosen(Some(target)))
}

fn report(
    state: AppState,
    batch_id: BatchId,
    success: bool,
    tag: OutcomeTag,
) -> (AppState, Vec<Effect>) {
    let (state, _) = update(
        state,
        Msg::TabOpened {
            batch_id: batch_id.clone(),
            index: 0,
            tab: Some(9),
        },
    );
    update(
        state,
        Msg::TabClosed {
            batch_id,
            index: 0,
            lookup: RecordLookup::Found(ResultRecord {
                success,
                result: tag,
                timestamp_ms: T0,
            }),
        },
    )
}

#[test]
fn entry_sync_opens_one_tab_and_reports_the_result() {
    init_logging();
    let state = loaded(3);
    assert_eq!(state.view().entries[1].caption, "sync(4★)");
    assert_eq!(state.view().unsynced_count, 3);

    let (state, effects) = sync_entry(state, 1, SyncTarget::Rating);
    assert_eq!(
        effects,
        vec![
            Effect::Notify {
                level: NoticeLevel::Success,
                text: "syncing to watched (rating): Film 1 (8 points)".to_string(),
            },
            Effect::OpenTab {
                batch_id: BatchId::from_millis(T0),
                index: 0,
                url: format!("https://movie.douban.com/subject/3001/#sync-4-rating-batch-{T0}-0"),
            },
        ]
    );
    assert_eq!(state.view().entries[1].caption, "syncing…");
    assert!(state.view().panel.is_none());

    let (state, effects) = update(state, Msg::SyncEntryClicked { entry: 1 });
    assert!(effects.is_empty());

    let (state, effects) = report(state, BatchId::from_millis(T0), true, OutcomeTag::Success);
    assert!(effects.contains(&Effect::Notify {
        level: NoticeLevel::Success,
        text: "synced: Film 1".to_string(),
    }));
    assert_eq!(state.entries()[1].status, EntryStatus::Synced);
    assert_eq!(state.view().entries[1].caption, "done✓");
    assert_eq!(state.view().unsynced_count, 2);
    assert_eq!(state.batches().count(), 0);
}

#[test]
fn failed_entry_can_be_retried() {
    init_logging();
    let state = loaded(1);
    let (state, _) = sync_entry(state, 0, SyncTarget::Watchlist);
    let (state, effects) = report(
        state,
        BatchId::from_millis(T0),
        false,
        OutcomeTag::FailedNoButton,
    );
    assert!(effects.contains(&Effect::Notify {
        level: NoticeLevel::Error,
        text: "sync failed: Film 0 (failed-no-button)".to_string(),
    }));
    assert_eq!(state.view().entries[0].caption, "failed✗");

    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 5_000 });
    assert!(effects.is_empty());
    let (state, effects) = sync_entry(state, 0, SyncTarget::Watchlist);
    assert!(effects.contains(&Effect::OpenTab {
        batch_id: BatchId::from_millis(T0 + 5_000),
        index: 0,
        url: format!(
            "https://movie.douban.com/subject/3000/#sync-4-watchlist-batch-{}-0",
            T0 + 5_000
        ),
    }));
    assert_eq!(state.entries()[0].status, EntryStatus::Syncing);
}

#[test]
fn entry_and_page_batches_run_side_by_side() {
    init_logging();
    let state = loaded(3);
    let (state, _) = sync_entry(state, 0, SyncTarget::Rating);
    let (state, _) = update(state, Msg::SyncPageClicked);
    let (state, effects) = update(state, Msg::TargetChosen(Some(SyncTarget::Rating)));

    let page_batch = BatchId::from_millis(T0 + 1);
    assert!(effects.iter().any(|effect| matches!(
        effect,
        Effect::OpenTab { batch_id, index: 0, .. } if *batch_id == page_batch
    )));
    let panel = state.panel_batch().unwrap();
    assert_eq!(panel.id(), &page_batch);
    assert_eq!(
        panel.items().iter().map(|item| item.entry).collect::<Vec<_>>(),
        vec![1, 2]
    );

    let (state, _) = report(state, page_batch, true, OutcomeTag::Success);
    assert_eq!(state.entries()[1].status, EntryStatus::Synced);
    assert_eq!(state.entries()[0].status, EntryStatus::Syncing);
    assert_eq!(state.batches().count(), 2);
}

#[test]
fn entry_queued_in_a_page_batch_cannot_be_started_twice() {
    init_logging();
    let state = loaded(5);
    let (state, _) = update(state, Msg::SyncPageClicked);
    let (state, _) = update(state, Msg::TargetChosen(Some(SyncTarget::Rating)));
    assert_eq!(state.entries()[4].status, EntryStatus::Idle);

    let (_, effects) = update(state, Msg::SyncEntryClicked { entry: 4 });
    assert!(effects.is_empty());
}
