//! Progress reporting for sweeps.
//!
//! The CLI draws an `indicatif` bar on stderr; library callers pass
//! [`NoopReporter`]. Reporters are shared by parallel workers, so every
//! method takes `&self`.

use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

pub trait ProgressReporter: Send + Sync {
    /// Begin a task with an optional total count.
    fn start(&self, task: &str, total: Option<u64>);

    fn advance(&self, amount: u64);

    fn finish(&self);

    /// Print a line without breaking the bar.
    fn message(&self, msg: &str);
}

#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn start(&self, _task: &str, _total: Option<u64>) {}
    fn advance(&self, _amount: u64) {}
    fn finish(&self) {}
    fn message(&self, _msg: &str) {}
}

/// Reporter backed by an `indicatif` progress bar.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
    completed: AtomicU64,
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::hidden()
    }
}

impl IndicatifReporter {
    /// A bar drawn on stderr.
    pub fn stderr() -> Self {
        Self {
            bar: ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr()),
            completed: AtomicU64::new(0),
        }
    }

    /// A bar that tracks counts but never draws (quiet mode, tests).
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            completed: AtomicU64::new(0),
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for IndicatifReporter {
    fn start(&self, task: &str, total: Option<u64>) {
        self.completed.store(0, Ordering::Relaxed);
        let style = match total {
            Some(total) => {
                self.bar.set_length(total);
                ProgressStyle::with_template(
                    "{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len} ({eta})",
                )
                .map(|s| s.progress_chars("=> "))
            }
            None => {
                self.bar.set_length(0);
                ProgressStyle::with_template("{spinner:.green} {msg} {pos} done")
            }
        };
        self.bar
            .set_style(style.unwrap_or_else(|_| ProgressStyle::default_bar()));
        self.bar.set_message(task.to_string());
        self.bar.reset();
    }

    fn advance(&self, amount: u64) {
        self.completed.fetch_add(amount, Ordering::Relaxed);
        self.bar.inc(amount);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn message(&self, msg: &str) {
        self.bar.println(msg);
    }
}
