//! Layout preferences and the percentage math that keeps them stable
//!
//! tmux reports sizes in cells and snaps requested percentages to whole
//! cells, so a value read back after a join rarely matches the value that
//! was requested. Measurements round to the nearest percent and are only
//! persisted when they move further than the drift tolerance from the
//! baseline captured at join time.

use crate::config::LayoutDefaults;
use crate::model::LayoutBaseline;
use crate::store::{
    TaskStore, SETTING_DETAIL_HEIGHT, SETTING_SHELL_HIDDEN, SETTING_SHELL_WIDTH,
};

const MIN_PERCENT: u8 = 5;
const MAX_PERCENT: u8 = 95;

/// `part` as a percentage of `total`, rounded to nearest
pub fn percent_of(part: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    ((part * 100 + total / 2) / total).min(100) as u8
}

/// Shell width as a share of the row it splits with the agent pane
pub fn shell_width_percent(shell_width: u32, agent_width: u32) -> u8 {
    percent_of(shell_width, shell_width + agent_width)
}

/// Whether a measured value differs from its baseline by more than rounding noise
pub fn drifted(measured: u8, baseline: u8, tolerance: u8) -> bool {
    measured.abs_diff(baseline) > tolerance
}

fn clamp(percent: u8) -> u8 {
    percent.clamp(MIN_PERCENT, MAX_PERCENT)
}

/// Foreground sizes read back right before a break
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeasuredLayout {
    pub height_percent: Option<u8>,
    pub shell_width_percent: Option<u8>,
}

/// Preference updates implied by a measurement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutChanges {
    pub height_percent: Option<u8>,
    pub shell_width_percent: Option<u8>,
}

impl MeasuredLayout {
    /// Compare against the join baseline. Without a baseline every
    /// measurement counts as a change.
    pub fn changes(
        &self,
        baseline: Option<LayoutBaseline>,
        tolerance: u8,
        force_height: bool,
    ) -> LayoutChanges {
        let height = self.height_percent.filter(|&h| {
            force_height
                || baseline.map_or(true, |b| drifted(h, b.height_percent, tolerance))
        });
        let width = self.shell_width_percent.filter(|&w| {
            baseline.map_or(true, |b| drifted(w, b.shell_width_percent, tolerance))
        });
        LayoutChanges {
            height_percent: height.map(clamp),
            shell_width_percent: width.map(clamp),
        }
    }
}

/// Persisted layout preferences, global across tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutPrefs {
    /// Height of the dashboard pane while a task is joined
    pub height_percent: u8,
    /// Width of the shell pane within the agent row
    pub shell_width_percent: u8,
    pub shell_hidden: bool,
}

impl LayoutPrefs {
    pub fn load(store: &dyn TaskStore, defaults: &LayoutDefaults) -> Self {
        let number = |key: &str, default: u8| {
            store
                .get_setting(key)
                .ok()
                .flatten()
                .and_then(|v| v.trim().parse::<u8>().ok())
                .unwrap_or(default)
        };
        Self {
            // Config values are as untrusted as stored ones
            height_percent: clamp(number(SETTING_DETAIL_HEIGHT, defaults.default_height_percent)),
            shell_width_percent: clamp(number(
                SETTING_SHELL_WIDTH,
                defaults.default_shell_width_percent,
            )),
            shell_hidden: store
                .get_setting(SETTING_SHELL_HIDDEN)
                .ok()
                .flatten()
                .map(|v| v.trim() == "true")
                .unwrap_or(false),
        }
    }

    pub fn baseline(&self) -> LayoutBaseline {
        LayoutBaseline {
            height_percent: self.height_percent,
            shell_width_percent: self.shell_width_percent,
        }
    }

    /// Agent pane share of the window below the dashboard pane
    pub fn agent_height_percent(&self) -> u8 {
        100u8.saturating_sub(self.height_percent)
    }

    pub fn save(store: &dyn TaskStore, changes: LayoutChanges) {
        if let Some(height) = changes.height_percent {
            Self::save_setting(store, SETTING_DETAIL_HEIGHT, &height.to_string());
        }
        if let Some(width) = changes.shell_width_percent {
            Self::save_setting(store, SETTING_SHELL_WIDTH, &width.to_string());
        }
    }

    pub fn save_shell_hidden(store: &dyn TaskStore, hidden: bool) {
        Self::save_setting(store, SETTING_SHELL_HIDDEN, if hidden { "true" } else { "false" });
    }

    fn save_setting(store: &dyn TaskStore, key: &str, value: &str) {
        if let Err(e) = store.set_setting(key, value) {
            tracing::warn!(key, error = %e, "failed to save layout preference");
        } else {
            tracing::debug!(key, value, "saved layout preference");
        }
    }
}
