//! Progress display for remote jobs.
//!
//! The server may attach a progress block to poll replies. It only feeds
//! this display; the job state machine never looks at it.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;

/// Optional `progress` block of a poll reply.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobProgress {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub step: Option<u64>,
    #[serde(default)]
    pub eta: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Lazily created progress bar.
pub struct ProgressDisplay {
    visible: bool,
    bar: Option<ProgressBar>,
}

impl ProgressDisplay {
    pub fn new(visible: bool) -> Self {
        Self { visible, bar: None }
    }

    pub fn hidden() -> Self {
        Self::new(false)
    }

    pub fn update(&mut self, progress: &JobProgress) {
        let visible = self.visible;
        let bar = self.bar.get_or_insert_with(|| {
            let total = progress.total.unwrap_or(0);
            if !visible {
                return ProgressBar::hidden();
            }
            let bar = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{prefix}: {percent:>3}%|{bar:40}| {pos}/{len} steps {msg}")
            {
                bar.set_style(style);
            }
            bar
        });

        if let Some(total) = progress.total {
            bar.set_length(total);
        }
        if let Some(eta) = progress.eta.as_deref().filter(|e| !e.is_empty()) {
            bar.set_message(format!("ETA: {}", eta));
        }
        if let Some(status) = progress.status.as_deref() {
            bar.set_prefix(capitalize(status.trim()));
        }
        if let Some(step) = progress.step {
            bar.set_position(step);
        }
    }

    pub fn position(&self) -> Option<u64> {
        self.bar.as_ref().map(ProgressBar::position)
    }

    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// First letter upper case, the rest lower case.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("running MODEL"), "Running model");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_hidden_display_tracks_step() {
        let mut display = ProgressDisplay::hidden();
        assert_eq!(display.position(), None);
        display.update(&JobProgress {
            total: Some(40),
            step: Some(12),
            ..Default::default()
        });
        assert_eq!(display.position(), Some(12));
        display.finish();
        assert_eq!(display.position(), None);
    }
}
