//! Terminal progress feedback
//!
//! A single spinner while a pipeline runs. Nothing is drawn when stderr is
//! not a terminal or output is quieted.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICK_INTERVAL: Duration = Duration::from_millis(120);

/// Progress display settings
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    pub enabled: bool,
}

impl ProgressConfig {
    /// Enabled only on an interactive stderr
    pub fn for_terminal(quiet: bool) -> Self {
        Self {
            enabled: !quiet && atty::is(atty::Stream::Stderr),
        }
    }
}

/// Spinner shown while a long-running command works
pub struct Spinner {
    bar: Option<ProgressBar>,
}

impl Spinner {
    pub fn start(config: &ProgressConfig, message: impl Into<String>) -> Self {
        if !config.enabled {
            return Self { bar: None };
        }

        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["◐", "◓", "◑", "◒"]);
        bar.set_style(style);
        bar.set_message(message.into());
        bar.enable_steady_tick(TICK_INTERVAL);
        Self { bar: Some(bar) }
    }

    pub fn is_active(&self) -> bool {
        self.bar.is_some()
    }

    pub fn set_message(&self, message: impl Into<String>) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.into());
        }
    }

    pub fn finish(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}
