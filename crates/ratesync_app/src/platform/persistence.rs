use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use ratesync_core::SyncSettings;
use ratesync_engine::{ensure_store_dir, RunnerSettings};
use ratesync_logging::{sync_info, sync_warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

pub(crate) const DEFAULT_CONFIG_FILENAME: &str = "ratesync.ron";

/// Everything the binary hands to the driver and the simulated tabs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct EffectiveSettings {
    pub sync: SyncSettings,
    pub runner: RunnerSettings,
}

/// On-disk form. Every field is optional; an absent field keeps its default.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
struct PersistedSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    dispatch_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tick_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_phase_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_sample_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_start_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    movies_per_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    runner: Option<PersistedRunner>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
struct PersistedRunner {
    #[serde(skip_serializing_if = "Option::is_none")]
    poll_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rating_control_wait_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rating_select_wait_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rating_submit_wait_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confirm_cap_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    watch_control_wait_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    close_grace_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    handoff_delay_ms: Option<u64>,
}

fn millis(duration: Duration) -> Option<u64> {
    Some(duration.as_millis() as u64)
}

fn apply_ms(slot: &mut Duration, value: Option<u64>) {
    if let Some(ms) = value {
        *slot = Duration::from_millis(ms);
    }
}

fn apply<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl PersistedSettings {
    fn into_effective(self) -> EffectiveSettings {
        let mut effective = EffectiveSettings::default();
        let sync = &mut effective.sync;
        apply(&mut sync.dispatch_interval_ms, self.dispatch_interval_ms);
        apply(&mut sync.tick_interval_ms, self.tick_interval_ms);
        apply(&mut sync.result_timeout_ms, self.result_timeout_ms);
        apply(&mut sync.test_phase_enabled, self.test_phase_enabled);
        apply(&mut sync.test_sample_size, self.test_sample_size);
        apply(&mut sync.auto_start_delay_ms, self.auto_start_delay_ms);
        apply(&mut sync.movies_per_page, self.movies_per_page);

        let runner_file = self.runner.unwrap_or_default();
        let runner = &mut effective.runner;
        apply_ms(&mut runner.poll_interval, runner_file.poll_interval_ms);
        apply_ms(&mut runner.rating_control_wait, runner_file.rating_control_wait_ms);
        apply_ms(&mut runner.rating_select_wait, runner_file.rating_select_wait_ms);
        apply_ms(&mut runner.rating_submit_wait, runner_file.rating_submit_wait_ms);
        apply_ms(&mut runner.confirm_cap, runner_file.confirm_cap_ms);
        apply_ms(&mut runner.watch_control_wait, runner_file.watch_control_wait_ms);
        apply_ms(&mut runner.close_grace, runner_file.close_grace_ms);
        apply_ms(&mut runner.handoff_delay, runner_file.handoff_delay_ms);
        effective
    }

    fn from_effective(effective: &EffectiveSettings) -> Self {
        let sync = &effective.sync;
        let runner = &effective.runner;
        Self {
            dispatch_interval_ms: Some(sync.dispatch_interval_ms),
            tick_interval_ms: Some(sync.tick_interval_ms),
            result_timeout_ms: Some(sync.result_timeout_ms),
            test_phase_enabled: Some(sync.test_phase_enabled),
            test_sample_size: Some(sync.test_sample_size),
            auto_start_delay_ms: Some(sync.auto_start_delay_ms),
            movies_per_page: Some(sync.movies_per_page),
            runner: Some(PersistedRunner {
                poll_interval_ms: millis(runner.poll_interval),
                rating_control_wait_ms: millis(runner.rating_control_wait),
                rating_select_wait_ms: millis(runner.rating_select_wait),
                rating_submit_wait_ms: millis(runner.rating_submit_wait),
                confirm_cap_ms: millis(runner.confirm_cap),
                watch_control_wait_ms: millis(runner.watch_control_wait),
                close_grace_ms: millis(runner.close_grace),
                handoff_delay_ms: millis(runner.handoff_delay),
            }),
        }
    }
}

/// Reads `path`. A missing file means defaults; a file that cannot be read or parsed is
/// reported and also yields defaults.
pub(crate) fn load_settings(path: &Path) -> EffectiveSettings {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return EffectiveSettings::default();
        }
        Err(err) => {
            sync_warn!("Failed to read settings from {:?}: {}", path, err);
            return EffectiveSettings::default();
        }
    };

    let persisted: PersistedSettings = match ron::from_str(&content) {
        Ok(persisted) => persisted,
        Err(err) => {
            sync_warn!("Failed to parse settings from {:?}: {}", path, err);
            return EffectiveSettings::default();
        }
    };

    sync_info!("Loaded settings from {:?}", path);
    persisted.into_effective()
}

pub(crate) fn render_settings(effective: &EffectiveSettings) -> Result<String> {
    let pretty = ron::ser::PrettyConfig::new();
    ron::ser::to_string_pretty(&PersistedSettings::from_effective(effective), pretty)
        .context("serializing settings")
}

/// Writes the full effective settings to `path` through a temp file and a rename.
pub(crate) fn save_settings(path: &Path, effective: &EffectiveSettings) -> Result<()> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_store_dir(dir).with_context(|| format!("preparing {:?}", dir))?;

    let content = render_settings(effective)?;
    let mut tmp = NamedTempFile::new_in(dir).context("creating temp file")?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("writing {:?}", path))?;
    sync_info!("Wrote settings to {:?}", path);
    Ok(())
}
