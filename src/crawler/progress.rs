//! Per-level progress bars
//!
//! One bar per traversal level, stacked in a [`MultiProgress`]. A level's bar
//! restarts every time its parent lists a new batch of children. Hidden
//! instances track positions without drawing anything.

use crate::state::Level;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};

/// Progress display for a crawl
#[derive(Clone)]
pub struct CrawlProgress {
    multi: MultiProgress,
    bars: [ProgressBar; 4],
}

impl CrawlProgress {
    /// Creates the four level bars, drawn on stderr when `visible`
    pub fn new(visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let multi = MultiProgress::with_draw_target(target);

        let style = ProgressStyle::with_template(
            "{prefix:>12.bold} {wide_bar:.cyan/dim} {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        let bars = Level::ALL.map(|level| {
            let bar = multi.add(ProgressBar::new(0));
            bar.set_style(style.clone());
            bar.set_prefix(label(level));
            bar
        });

        Self { multi, bars }
    }

    /// A display that never draws
    pub fn hidden() -> Self {
        Self::new(false)
    }

    fn bar(&self, level: Level) -> &ProgressBar {
        &self.bars[index(level)]
    }

    /// Restarts `level` for a new listing of `len` entries
    pub fn begin(&self, level: Level, len: usize) {
        let bar = self.bar(level);
        bar.set_length(len as u64);
        bar.set_position(0);
        bar.set_message("");
    }

    /// Moves `level` one entry forward, showing `name`
    pub fn advance(&self, level: Level, name: &str) {
        let bar = self.bar(level);
        bar.set_message(name.trim().to_string());
        bar.inc(1);
    }

    /// `(position, length)` of a level's bar
    pub fn position(&self, level: Level) -> (u64, u64) {
        let bar = self.bar(level);
        (bar.position(), bar.length().unwrap_or(0))
    }

    /// Removes the bars from the terminal
    pub fn finish(&self) {
        for bar in &self.bars {
            bar.finish_and_clear();
        }
    }

    /// A writer that hides the bars while a line goes to stderr
    ///
    /// Plugged into the log subscriber so log lines and bars do not tear.
    pub fn writer(&self) -> SuspendingWriter {
        SuspendingWriter {
            multi: self.multi.clone(),
        }
    }
}

fn index(level: Level) -> usize {
    match level {
        Level::Period => 0,
        Level::Manufacturer => 1,
        Level::Model => 2,
        Level::YearModel => 3,
    }
}

fn label(level: Level) -> &'static str {
    match level {
        Level::Period => "periods",
        Level::Manufacturer => "manufacturers",
        Level::Model => "models",
        Level::YearModel => "model-years",
    }
}

/// Stderr writer that suspends the progress display around each write
pub struct SuspendingWriter {
    multi: MultiProgress,
}

impl Write for SuspendingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.multi.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}
