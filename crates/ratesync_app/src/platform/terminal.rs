//! Terminal stand-ins for the listing page's toasts, progress panel and modal dialogs.

use std::sync::Mutex;

use dialoguer::{Confirm, Select};
use indicatif::{ProgressBar, ProgressStyle};
use ratesync_core::{AppViewModel, NoticeLevel, SyncTarget};
use ratesync_engine::{Dialogs, Presenter};
use ratesync_logging::{sync_info, sync_warn};

const BAR_TEMPLATE: &str = "{spinner} [{bar:30}] {pos}/{len} {msg}";

/// Shows the progress panel as a progress bar and toasts as printed lines.
pub(crate) struct TerminalPresenter {
    bar: ProgressBar,
    last_headline: Mutex<String>,
}

impl TerminalPresenter {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        match ProgressStyle::with_template(BAR_TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("=> ")),
            Err(err) => sync_warn!("progress bar template rejected: {err}"),
        }
        Self {
            bar,
            last_headline: Mutex::new(String::new()),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Presenter for TerminalPresenter {
    fn notify(&self, level: NoticeLevel, text: &str) {
        let mark = match level {
            NoticeLevel::Success => "✓",
            NoticeLevel::Error => "✗",
        };
        self.bar.suspend(|| println!("{mark} {text}"));
    }

    fn render(&self, view: &AppViewModel) {
        let Some(panel) = &view.panel else {
            return;
        };
        self.bar.set_length(panel.stats.total as u64);
        self.bar.set_position(panel.stats.completed() as u64);
        self.bar.set_message(format!("{} {}", panel.target, panel.headline));

        let mut last = self
            .last_headline
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *last != panel.headline {
            sync_info!("panel {}: {}", panel.batch_id, panel.headline);
            last.clone_from(&panel.headline);
        }
    }

    fn mark_page_complete(&self) {
        self.bar.suspend(|| println!("page complete"));
    }
}

/// Asks on the terminal unless the answer was given on the command line.
pub(crate) struct TerminalDialogs {
    preset_target: Option<SyncTarget>,
    assume_yes: bool,
}

impl TerminalDialogs {
    pub fn new(preset_target: Option<SyncTarget>, assume_yes: bool) -> Self {
        Self {
            preset_target,
            assume_yes,
        }
    }
}

#[async_trait::async_trait]
impl Dialogs for TerminalDialogs {
    async fn choose_target(&self) -> Option<SyncTarget> {
        if let Some(target) = self.preset_target {
            return Some(target);
        }
        let choice = tokio::task::spawn_blocking(|| {
            let targets = [SyncTarget::Rating, SyncTarget::Watchlist];
            let labels = targets.map(SyncTarget::label);
            Select::new()
                .with_prompt("Sync to")
                .items(&labels)
                .default(0)
                .interact_opt()
                .map(|picked| picked.map(|index| targets[index]))
        })
        .await;
        match choice {
            Ok(Ok(target)) => target,
            Ok(Err(err)) => {
                sync_warn!("target chooser failed: {err}");
                None
            }
            Err(err) => {
                sync_warn!("target chooser task failed: {err}");
                None
            }
        }
    }

    async fn confirm(&self, title: &str, message: &str) -> bool {
        if self.assume_yes {
            sync_info!("{title}: yes (--yes)");
            return true;
        }
        let prompt = format!("{title}\n{message}");
        let answer = tokio::task::spawn_blocking(move || {
            Confirm::new().with_prompt(prompt).default(false).interact()
        })
        .await;
        match answer {
            Ok(Ok(answer)) => answer,
            Ok(Err(err)) => {
                sync_warn!("confirmation failed: {err}");
                false
            }
            Err(err) => {
                sync_warn!("confirmation task failed: {err}");
                false
            }
        }
    }
}
