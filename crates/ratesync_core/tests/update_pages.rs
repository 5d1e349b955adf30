use std::sync::Once;

use pretty_assertions::assert_eq;
use ratesync_core::{
    update, AppState, BatchId, Effect, Listing, ListingItem, Msg, NoticeLevel, OutcomeTag,
    PageObservation, Rating, RecordLookup, ResultRecord, SyncTarget,
};

const T0: u64 = 1_770_000_000_000;
const LISTING_URL: &str = "https://movie.douban.com/people/alice/wish?start=0&sort=time&mode=grid";

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(ratesync_logging::initialize_for_tests);
}

fn listing(count: usize, total_pages: u32) -> Listing {
    Listing {
        page_url: LISTING_URL.to_string(),
        items: (0..count)
            .map(|i| ListingItem {
                title: format!("Film {i}"),
                url: format!("https://movie.douban.com/subject/{}/", 2000 + i),
                rating: Rating::new(3).unwrap(),
            })
            .collect(),
        current_page: 1,
        total_pages,
    }
}

fn loaded(count: usize, total_pages: u32) -> AppState {
    let (state, _) = update(AppState::new(), Msg::Tick { now_ms: T0 });
    let (state, _) = update(state, Msg::ListingLoaded(listing(count, total_pages)));
    state
}

fn notices(effects: &[Effect]) -> Vec<(NoticeLevel, String)> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Notify { level, text } => Some((*level, text.clone())),
            _ => None,
        })
        .collect()
}

fn confirm_title(effects: &[Effect]) -> Option<String> {
    effects.iter().find_map(|effect| match effect {
        Effect::Confirm { title, .. } => Some(title.clone()),
        _ => None,
    })
}

fn page_opens(effects: &[Effect]) -> Vec<(u32, String)> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::OpenPage { page, url } => Some((*page, url.clone())),
            _ => None,
        })
        .collect()
}

fn tab_opens(effects: &[Effect]) -> Vec<usize> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::OpenTab { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

/// Opens the tab of a dispatched first-page item and closes it with a stored outcome.
fn finish(state: AppState, index: usize, success: bool) -> (AppState, Vec<Effect>) {
    let batch_id = BatchId::from_millis(T0);
    let (state, _) = update(
        state,
        Msg::TabOpened {
            batch_id: batch_id.clone(),
            index,
            tab: Some(100 + index as u64),
        },
    );
    let result = if success {
        OutcomeTag::Success
    } else {
        OutcomeTag::FailedNoButton
    };
    update(
        state,
        Msg::TabClosed {
            batch_id,
            index,
            lookup: RecordLookup::Found(ResultRecord {
                success,
                result,
                timestamp_ms: T0,
            }),
        },
    )
}

fn page_polls(effects: &[Effect]) -> Vec<Effect> {
    effects
        .iter()
        .filter(|effect| matches!(effect, Effect::PollPage { .. }))
        .cloned()
        .collect()
}

/// Walks through the chooser and both confirmations of a sync-all run.
fn start_all_pages(count: usize, total_pages: u32) -> (AppState, Vec<Effect>) {
    init_logging();
    let state = loaded(count, total_pages);
    let (state, effects) = update(state, Msg::SyncAllPagesClicked);
    assert_eq!(effects, vec![Effect::PromptTarget]);
    let (state, effects) = update(state, Msg::TargetChosen(Some(SyncTarget::Watchlist)));
    assert_eq!(confirm_title(&effects).as_deref(), Some("Sync all pages?"));
    let (state, effects) = update(state, Msg::ConfirmAnswered(true));
    assert_eq!(confirm_title(&effects).as_deref(), Some("Final confirmation"));
    update(state, Msg::ConfirmAnswered(true))
}

fn complete_title() -> PageObservation {
    PageObservation::Title("[已完成] Alice's wish list".to_string())
}

#[test]
fn sync_all_walks_every_page_with_confirmation() {
    let (state, effects) = start_all_pages(2, 3);
    assert!(effects
        .iter()
        .any(|effect| matches!(effect, Effect::OpenTab { index: 0, .. })));
    assert!(state.view().panel.is_some());
    assert_eq!(state.view().continuation.unwrap().next_page, 2);

    // Page 1 is still syncing.
    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 9_000 });
    assert_eq!(tab_opens(&effects), vec![1]);
    assert!(page_opens(&effects).is_empty());
    let (state, _) = finish(state, 0, true);
    let (state, effects) = finish(state, 1, true);
    assert!(notices(&effects).contains(&(
        NoticeLevel::Success,
        "sync complete! 2 succeeded, 0 failed".to_string()
    )));

    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 10_000 });
    assert!(page_opens(&effects).is_empty());
    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 12_999 });
    assert!(page_opens(&effects).is_empty());
    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 13_000 });
    assert_eq!(
        page_opens(&effects),
        vec![(
            2,
            "https://movie.douban.com/people/alice/wish?sort=time&mode=grid&start=15#auto-sync-watchlist"
                .to_string()
        )]
    );

    let (state, _) = update(
        state,
        Msg::PageOpened {
            page: 2,
            tab: Some(500),
        },
    );
    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 14_000 });
    assert_eq!(
        page_polls(&effects),
        vec![Effect::PollPage { page: 2, tab: 500 }]
    );

    let (state, effects) = update(
        state,
        Msg::PageObserved {
            page: 2,
            observation: PageObservation::Title("Alice's wish list".to_string()),
        },
    );
    assert!(effects.is_empty());
    let (state, effects) = update(
        state,
        Msg::PageObserved {
            page: 2,
            observation: PageObservation::Unreadable,
        },
    );
    assert!(effects.is_empty());

    let (state, effects) = update(
        state,
        Msg::PageObserved {
            page: 2,
            observation: complete_title(),
        },
    );
    assert_eq!(
        confirm_title(&effects).as_deref(),
        Some("Continue with the next page?")
    );
    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 15_000 });
    assert!(page_polls(&effects).is_empty());

    let (state, effects) = update(state, Msg::ConfirmAnswered(true));
    assert_eq!(effects[0], Effect::ClosePage { tab: 500 });
    assert_eq!(page_opens(&effects)[0].0, 3);
    assert!(page_opens(&effects)[0].1.contains("start=30"));

    let (state, _) = update(
        state,
        Msg::PageOpened {
            page: 3,
            tab: Some(501),
        },
    );
    let (state, effects) = update(
        state,
        Msg::PageObserved {
            page: 3,
            observation: complete_title(),
        },
    );
    assert!(effects.contains(&Effect::ClosePage { tab: 501 }));
    assert_eq!(
        notices(&effects),
        vec![(NoticeLevel::Success, "all pages synced!".to_string())]
    );
    assert!(state.view().continuation.is_none());
}

#[test]
fn declining_the_next_page_stops_the_sequence() {
    let (state, _) = start_all_pages(1, 3);
    let (state, _) = finish(state, 0, true);
    let (state, _) = update(state, Msg::Tick { now_ms: T0 + 1_000 });
    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 4_000 });
    assert_eq!(page_opens(&effects).len(), 1);
    let (state, _) = update(
        state,
        Msg::PageOpened {
            page: 2,
            tab: Some(42),
        },
    );
    let (state, _) = update(
        state,
        Msg::PageObserved {
            page: 2,
            observation: complete_title(),
        },
    );
    let (state, effects) = update(state, Msg::ConfirmAnswered(false));
    assert_eq!(effects[0], Effect::ClosePage { tab: 42 });
    assert_eq!(
        notices(&effects),
        vec![(
            NoticeLevel::Success,
            "sync stopped, 2 pages completed".to_string()
        )]
    );
    assert!(state.view().continuation.is_none());
}

#[test]
fn failed_test_phase_drops_the_later_pages() {
    let (state, effects) = start_all_pages(5, 3);
    assert_eq!(tab_opens(&effects), vec![0]);
    let (state, _) = finish(state, 0, false);
    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 3_000 });
    assert_eq!(tab_opens(&effects), vec![1]);
    let (state, _) = finish(state, 1, false);
    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 6_000 });
    assert_eq!(tab_opens(&effects), vec![2]);

    let (mut state, effects) = finish(state, 2, false);
    assert_eq!(
        notices(&effects),
        vec![
            (
                NoticeLevel::Error,
                "test failed: all of the first 3 titles failed, sync stopped".to_string()
            ),
            (NoticeLevel::Error, "later pages were not opened".to_string()),
        ]
    );
    assert!(state.view().continuation.is_none());

    for second in 7..=60 {
        let (next, effects) = update(
            state,
            Msg::Tick {
                now_ms: T0 + second * 1_000,
            },
        );
        state = next;
        assert!(page_opens(&effects).is_empty());
        assert!(tab_opens(&effects).is_empty());
    }
    assert!(state.is_idle());
}

#[test]
fn paused_page_holds_back_the_next_page() {
    let (state, _) = start_all_pages(2, 2);
    let (state, effects) = update(state, Msg::PauseToggled);
    assert_eq!(
        notices(&effects),
        vec![(NoticeLevel::Success, "sync paused".to_string())]
    );
    let (mut state, _) = finish(state, 0, true);

    for second in 1..=30 {
        let (next, effects) = update(
            state,
            Msg::Tick {
                now_ms: T0 + second * 1_000,
            },
        );
        state = next;
        assert!(page_opens(&effects).is_empty());
        assert!(tab_opens(&effects).is_empty());
    }

    let (state, effects) = update(state, Msg::PauseToggled);
    assert_eq!(tab_opens(&effects), vec![1]);
    let (state, _) = finish(state, 1, true);
    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 31_000 });
    assert!(page_opens(&effects).is_empty());
    let (_, effects) = update(state, Msg::Tick { now_ms: T0 + 34_000 });
    assert_eq!(page_opens(&effects).len(), 1);
}

#[test]
fn page_settled_while_paused_waits_for_resume() {
    let (state, _) = start_all_pages(1, 2);
    let (state, _) = update(state, Msg::PauseToggled);
    let (state, _) = finish(state, 0, true);
    assert!(state.panel_batch().unwrap().is_settled());

    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 10_000 });
    assert!(page_opens(&effects).is_empty());
    assert!(!state.is_idle());

    let (state, effects) = update(state, Msg::PauseToggled);
    assert_eq!(
        notices(&effects),
        vec![(NoticeLevel::Success, "sync resumed".to_string())]
    );
    let (state, _) = update(state, Msg::Tick { now_ms: T0 + 11_000 });
    let (_, effects) = update(state, Msg::Tick { now_ms: T0 + 14_000 });
    assert_eq!(page_opens(&effects).len(), 1);
}

#[test]
fn declining_a_confirmation_starts_nothing() {
    init_logging();
    let state = loaded(2, 4);
    let (state, _) = update(state, Msg::SyncAllPagesClicked);
    let (state, _) = update(state, Msg::TargetChosen(Some(SyncTarget::Rating)));
    let (state, effects) = update(state, Msg::ConfirmAnswered(true));
    assert!(confirm_title(&effects).is_some());
    let (state, effects) = update(state, Msg::ConfirmAnswered(false));
    assert!(effects.is_empty());
    assert!(state.is_idle());
    assert_eq!(state.batches().count(), 0);
}

#[test]
fn blocked_page_stops_the_sequence() {
    let (state, _) = start_all_pages(0, 2);
    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 3_000 });
    assert_eq!(page_opens(&effects).len(), 1);
    let (state, effects) = update(state, Msg::PageOpened { page: 2, tab: None });
    assert_eq!(notices(&effects)[0].0, NoticeLevel::Error);
    assert!(state.is_idle());
}

#[test]
fn closed_page_stops_the_sequence() {
    let (state, _) = start_all_pages(0, 2);
    let (state, _) = update(state, Msg::Tick { now_ms: T0 + 3_000 });
    let (state, _) = update(
        state,
        Msg::PageOpened {
            page: 2,
            tab: Some(7),
        },
    );
    let (state, effects) = update(
        state,
        Msg::PageObserved {
            page: 2,
            observation: PageObservation::Closed,
        },
    );
    assert_eq!(
        notices(&effects),
        vec![(
            NoticeLevel::Error,
            "page 2 was closed, sync stopped".to_string()
        )]
    );
    assert!(state.view().continuation.is_none());
}

#[test]
fn single_page_listing_syncs_the_current_page() {
    init_logging();
    let state = loaded(2, 1);
    let (state, effects) = update(state, Msg::SyncAllPagesClicked);
    assert_eq!(notices(&effects).len(), 1);
    assert!(effects.contains(&Effect::PromptTarget));
    let (state, effects) = update(state, Msg::TargetChosen(Some(SyncTarget::Rating)));
    assert!(confirm_title(&effects).is_none());
    assert!(state.view().panel.is_some());
    assert!(state.view().continuation.is_none());
}

#[test]
fn continuation_page_runs_its_own_batch_and_marks_itself_complete() {
    init_logging();
    let state = loaded(2, 3);
    let (state, effects) = update(
        state,
        Msg::AutoSyncRequested {
            target: SyncTarget::Watchlist,
        },
    );
    assert!(effects.is_empty());
    assert!(!state.is_idle());

    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 2_999 });
    assert!(effects.is_empty());
    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 3_000 });
    let batch_id = BatchId::auto(T0 + 3_000);
    assert!(effects.iter().any(|effect| matches!(
        effect,
        Effect::OpenTab { batch_id: id, index: 0, url } if *id == batch_id && url.ends_with("#sync-3-watchlist-batch-auto-1770000003000-0")
    )));
    assert!(state.view().panel.is_none());

    let record = |success| {
        RecordLookup::Found(ResultRecord {
            success,
            result: OutcomeTag::Success,
            timestamp_ms: T0,
        })
    };
    let (state, _) = update(
        state,
        Msg::TabOpened {
            batch_id: batch_id.clone(),
            index: 0,
            tab: Some(1),
        },
    );
    let (state, effects) = update(
        state,
        Msg::TabClosed {
            batch_id: batch_id.clone(),
            index: 0,
            lookup: record(true),
        },
    );
    assert!(!effects.contains(&Effect::MarkPageComplete));

    let (state, _) = update(state, Msg::Tick { now_ms: T0 + 6_000 });
    let (state, _) = update(
        state,
        Msg::TabOpened {
            batch_id: batch_id.clone(),
            index: 1,
            tab: Some(2),
        },
    );
    let (state, effects) = update(
        state,
        Msg::TabClosed {
            batch_id,
            index: 1,
            lookup: record(false),
        },
    );
    assert!(effects.contains(&Effect::MarkPageComplete));
    assert!(state.is_page_complete());
    assert!(state.view().page_complete);
    assert_eq!(state.batches().count(), 0);
}

#[test]
fn empty_continuation_page_completes_immediately() {
    init_logging();
    let state = loaded(0, 3);
    let (state, _) = update(
        state,
        Msg::AutoSyncRequested {
            target: SyncTarget::Rating,
        },
    );
    let (state, effects) = update(state, Msg::Tick { now_ms: T0 + 3_000 });
    assert_eq!(effects, vec![Effect::MarkPageComplete]);
    assert!(state.is_page_complete());
    assert!(state.is_idle());
}
