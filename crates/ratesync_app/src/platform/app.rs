//! Subcommand bodies of the `ratesync` binary.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use ratesync_core::protocol::subject_id;
use ratesync_core::{AppState, BatchRef, Listing, Msg, SyncTarget};
use ratesync_engine::{
    classify, page_title, scan_listing, Clock, Driver, JsonFileStore, MemoryStore, PageRole,
    ResultStore, SimBrowser, SimScript,
};
use ratesync_logging::{sync_info, sync_warn};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use super::persistence::{render_settings, save_settings, EffectiveSettings};
use super::terminal::{TerminalDialogs, TerminalPresenter};

/// Options of `ratesync simulate`; entry numbers are 1-based.
#[derive(Debug, Clone, Default)]
pub(crate) struct SimulateRequest {
    pub listing: PathBuf,
    pub url: String,
    pub target: Option<SyncTarget>,
    pub all_pages: bool,
    pub entry: Option<usize>,
    pub assume_yes: bool,
    pub fail: Vec<usize>,
    pub block: Vec<usize>,
    pub no_id: Vec<usize>,
    pub already_added: Vec<usize>,
    pub pages_dir: Option<PathBuf>,
    pub store: Option<PathBuf>,
    /// Panel presses, in milliseconds after the sync starts.
    pub pause_at: Option<u64>,
    pub resume_at: Option<u64>,
    pub close_panel_at: Option<u64>,
}

impl SimulateRequest {
    /// Panel presses in time order.
    fn panel_script(&self) -> Result<Vec<(u64, Msg)>> {
        if let (Some(pause), Some(resume)) = (self.pause_at, self.resume_at) {
            if resume <= pause {
                bail!("--resume-at ({resume} ms) must come after --pause-at ({pause} ms)");
            }
        }
        if let Some(pause) = self.pause_at {
            let released = [self.resume_at, self.close_panel_at]
                .into_iter()
                .flatten()
                .any(|at| at > pause);
            if !released {
                bail!("a paused sync never finishes; add --resume-at or --close-panel-at");
            }
        }
        let mut script: Vec<(u64, Msg)> = [
            (self.pause_at, Msg::PauseToggled),
            (self.resume_at, Msg::PauseToggled),
            (self.close_panel_at, Msg::PanelClosed),
        ]
        .into_iter()
        .filter_map(|(at, msg)| at.map(|at| (at, msg)))
        .collect();
        script.sort_by_key(|(at, _)| *at);
        Ok(script)
    }
}

/// Feeds the scripted panel presses to the driver at their times.
fn spawn_panel_script(script: Vec<(u64, Msg)>) -> mpsc::UnboundedReceiver<Msg> {
    let (tx, rx) = mpsc::unbounded_channel();
    let start = Instant::now();
    tokio::spawn(async move {
        for (at, msg) in script {
            sleep_until(start + Duration::from_millis(at)).await;
            if tx.send(msg).is_err() {
                break;
            }
        }
    });
    rx
}

fn read_listing(path: &Path, url: &str) -> Result<(String, Listing)> {
    let html =
        fs::read_to_string(path).with_context(|| format!("reading listing page {:?}", path))?;
    let listing = scan_listing(&html, url).with_context(|| format!("scanning {:?}", path))?;
    Ok((html, listing))
}

pub(crate) fn scan(path: &Path, url: &str) -> Result<()> {
    let (html, listing) = read_listing(path, url)?;
    if let Some(title) = page_title(&html)? {
        println!("{title}");
    }
    println!(
        "page {} of {}, {} titles",
        listing.current_page,
        listing.total_pages,
        listing.items.len()
    );
    for (number, item) in listing.items.iter().enumerate() {
        println!(
            "{:>3}. {} {}★ {}",
            number + 1,
            item.title,
            item.rating.stars(),
            item.url
        );
    }
    Ok(())
}

/// Subject ids of the listed entry numbers. Out-of-range numbers are an error.
fn subject_ids(listing: &Listing, numbers: &[usize]) -> Result<HashSet<String>> {
    numbers
        .iter()
        .map(|&number| {
            let item = number
                .checked_sub(1)
                .and_then(|index| listing.items.get(index))
                .with_context(|| {
                    format!("entry {number} is not on this page (1-{})", listing.items.len())
                })?;
            url::Url::parse(&item.url)
                .ok()
                .and_then(|url| subject_id(&url))
                .with_context(|| format!("entry {number} has no subject id: {}", item.url))
        })
        .collect()
}

fn later_pages(listing: &Listing, dir: &Path) -> BTreeMap<u32, String> {
    (listing.current_page + 1..=listing.total_pages)
        .filter_map(|page| {
            let path = dir.join(format!("page-{page}.html"));
            match fs::read_to_string(&path) {
                Ok(html) => Some((page, html)),
                Err(err) => {
                    sync_warn!("no saved listing for page {page} at {:?}: {err}", path);
                    None
                }
            }
        })
        .collect()
}

pub(crate) async fn simulate(settings: EffectiveSettings, request: SimulateRequest) -> Result<()> {
    let (_, listing) = read_listing(&request.listing, &request.url)?;
    let panel_script = request.panel_script()?;
    if let Some(entry) = request.entry {
        if entry == 0 || entry > listing.items.len() {
            bail!("entry {entry} is not on this page (1-{})", listing.items.len());
        }
    }

    let script = SimScript {
        blocked: subject_ids(&listing, &request.block)?,
        missing_id: subject_ids(&listing, &request.no_id)?,
        missing_control: subject_ids(&listing, &request.fail)?,
        already_added: subject_ids(&listing, &request.already_added)?,
        listing_pages: request
            .pages_dir
            .as_deref()
            .map(|dir| later_pages(&listing, dir))
            .unwrap_or_default(),
    };
    let store: Arc<dyn ResultStore> = match &request.store {
        Some(path) => Arc::new(
            JsonFileStore::open(path.clone())
                .with_context(|| format!("opening result store {:?}", path))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };

    let clock = Clock::new();
    let browser = SimBrowser::new(
        script,
        store.clone(),
        settings.sync.clone(),
        settings.runner.clone(),
        clock,
    );
    let presenter = Arc::new(TerminalPresenter::new());
    let mut driver = Driver::new(
        settings.sync,
        Arc::new(browser),
        Arc::new(TerminalDialogs::new(request.target, request.assume_yes)),
        presenter.clone(),
        store,
        clock,
    );

    let auto_sync = match classify(&request.url) {
        PageRole::Listing { auto_sync } => auto_sync,
        _ => None,
    };
    driver.open_listing(listing, auto_sync).await;
    if auto_sync.is_none() {
        let msg = match (request.all_pages, request.entry) {
            (true, _) => Msg::SyncAllPagesClicked,
            (false, Some(entry)) => Msg::SyncEntryClicked { entry: entry - 1 },
            (false, None) => Msg::SyncPageClicked,
        };
        driver.dispatch(msg).await;
    }
    driver
        .run_with_controls(spawn_panel_script(panel_script))
        .await;
    presenter.finish();

    print_summary(driver.state());
    Ok(())
}

fn print_summary(state: &AppState) {
    let view = state.view();
    for (number, row) in view.entries.iter().enumerate() {
        println!("{:>3}. {:<10} {}", number + 1, row.caption, row.title);
    }
    if let Some(panel) = &view.panel {
        for row in panel.rows.iter().filter(|row| row.reason.is_some()) {
            println!(
                "     {} {}: {}",
                row.icon,
                row.title,
                row.reason.as_deref().unwrap_or_default()
            );
        }
    }
    sync_info!("{} of {} entries not synced", view.unsynced_count, view.entries.len());
}

fn describe_batch(batch: &BatchRef) -> String {
    format!("{} item {} (key {})", batch.batch_id, batch.index, batch.result_key())
}

pub(crate) fn decode(url: &str) -> Result<()> {
    match classify(url) {
        PageRole::Listing { auto_sync } => {
            println!("listing page");
            match auto_sync {
                Some(target) => println!("auto-sync: {target}"),
                None => println!("auto-sync: no"),
            }
        }
        PageRole::Detail {
            fragment,
            source_id,
        } => {
            println!("detail page of subject {source_id}");
            println!("rating: {}★, target: {}", fragment.rating, fragment.target);
            match &fragment.batch {
                Some(batch) => println!("batch: {}", describe_batch(batch)),
                None => println!("batch: none"),
            }
        }
        PageRole::Remote(handoff) => {
            println!("remote title page for subject {}", handoff.source_id);
            println!("score: {}/10, target: {}", handoff.score, handoff.target);
            println!("batch: {}", describe_batch(&handoff.batch));
        }
        PageRole::ReturnTrip(trip) => {
            println!("return trip to subject {}", trip.source_id);
            println!(
                "outcome: {} ({})",
                trip.outcome,
                if trip.outcome.is_success() {
                    "success"
                } else {
                    "failure"
                }
            );
            println!("rating: {}★, target: {}", trip.rating, trip.target);
            println!("batch: {}", describe_batch(&trip.batch));
        }
        PageRole::Unrelated => bail!("not a sync url: {url}"),
    }
    Ok(())
}

pub(crate) fn config(path: &Path, settings: &EffectiveSettings, write: bool) -> Result<()> {
    if write {
        save_settings(path, settings)?;
        println!("wrote {}", path.display());
    } else {
        println!("{}", render_settings(settings)?);
    }
    Ok(())
}
