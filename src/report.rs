//! Progress and log reporting for batch operations.
//!
//! The engines never talk to a UI directly. They push events into a
//! [`Reporter`], and whoever started the operation decides where those events
//! end up: the `log` crate for the CLI, or a channel for anything that wants
//! to consume them itself.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

/// Minimum time between two progress notifications from one batch.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Success,
}

/// Receives log messages and progress updates from a running operation.
///
/// Reporters are called from worker threads.
pub trait Reporter: Send + Sync {
    fn log(&self, level: Level, message: &str);

    /// `percent` is between 0 and 100.
    fn progress(&self, percent: f64);
}

/// Forwards everything to the `log` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::Debug => log::debug!("{}", message),
            Level::Info => log::info!("{}", message),
            Level::Warning => log::warn!("{}", message),
            Level::Error => log::error!("{}", message),
            Level::Success => log::info!("Success: {}", message),
        }
    }

    fn progress(&self, percent: f64) {
        log::info!("Progress: {:.0}%", percent);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportEvent {
    Log { level: Level, message: String },
    Progress { percent: f64 },
}

/// Sends every event over a channel.
///
/// Events sent after the receiving side has gone away are dropped.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: Sender<ReportEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, Receiver<ReportEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();

        (Self { sender }, receiver)
    }
}

impl Reporter for ChannelReporter {
    fn log(&self, level: Level, message: &str) {
        let _ = self.sender.send(ReportEvent::Log {
            level,
            message: message.to_owned(),
        });
    }

    fn progress(&self, percent: f64) {
        let _ = self.sender.send(ReportEvent::Progress { percent });
    }
}

/// Counts finished items and forwards progress to a reporter at most once
/// per interval.
pub struct ProgressTracker<'a> {
    reporter: &'a dyn Reporter,
    total: usize,
    processed: AtomicUsize,

    /// When progress was last reported, and the count it reported.
    last_update: Mutex<Option<(Instant, usize)>>,
    interval: Duration,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(reporter: &'a dyn Reporter, total: usize) -> Self {
        Self::with_interval(reporter, total, PROGRESS_INTERVAL)
    }

    pub fn with_interval(reporter: &'a dyn Reporter, total: usize, interval: Duration) -> Self {
        Self {
            reporter,
            total,
            processed: AtomicUsize::new(0),
            last_update: Mutex::new(None),
            interval,
        }
    }

    /// Marks one more item as finished and returns the new count.
    pub fn advance(&self) -> usize {
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;

        let now = Instant::now();
        let should_report = {
            let mut last_update = self.last_update.lock().unwrap();
            let due = match *last_update {
                Some((last, _)) => now.duration_since(last) > self.interval,
                None => true,
            };

            if due {
                *last_update = Some((now, processed));
            }
            due
        };

        if should_report {
            self.reporter.progress(percent(processed, self.total));
        }

        processed
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    /// Reports the final count, unless the last report already covered it.
    /// Called once every item has been advanced.
    pub fn finish(&self) {
        let processed = self.processed();
        let covered = matches!(
            *self.last_update.lock().unwrap(),
            Some((_, reported)) if reported == processed
        );

        if !covered {
            self.reporter.progress(percent(processed, self.total));
        }
    }
}

fn percent(processed: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        processed as f64 / total as f64 * 100.0
    }
}
