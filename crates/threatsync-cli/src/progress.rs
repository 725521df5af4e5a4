//! Per-phase progress bars.

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use threatsync_etl::{PhaseReport, Progress};

pub struct BarProgress {
    style: ProgressStyle,
    current: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    pub fn new() -> Result<Self> {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {msg:<32} [{bar:40.cyan/blue}] {pos}/{len}")
            .context("Failed to create progress bar template")?
            .progress_chars("=>-");
        Ok(Self {
            style,
            current: Mutex::new(None),
        })
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        if let Ok(mut guard) = self.current.lock() {
            f(&mut guard);
        }
    }
}

impl Progress for BarProgress {
    fn phase_started(&self, phase: &str, total: usize) {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(self.style.clone());
        bar.set_message(phase.to_string());
        self.with_bar(|slot| *slot = Some(bar));
    }

    fn batch_done(&self, _phase: &str, processed: usize) {
        self.with_bar(|slot| {
            if let Some(bar) = slot {
                bar.set_position(processed as u64);
            }
        });
    }

    fn phase_finished(&self, report: &PhaseReport) {
        let message = if report.failed() > 0 || report.skipped() > 0 {
            format!("{} {}", report.phase, "(with skips/failures)".yellow())
        } else {
            report.phase.clone()
        };
        self.with_bar(|slot| {
            if let Some(bar) = slot.take() {
                bar.finish_with_message(message);
            }
        });
    }
}
