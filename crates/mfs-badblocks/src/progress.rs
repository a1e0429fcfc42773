//! Scan progress: a shared monotonic cursor and a timer thread that
//! periodically reports it.

use mfs_error::Result;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// Blocks examined so far out of `total`.
///
/// Cloning shares the cursor. The scanner is the only writer; readers see
/// a value that never decreases.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    cursor: Arc<AtomicU64>,
    total: u64,
}

impl ScanProgress {
    #[must_use]
    pub fn new(total: u64) -> Self {
        Self {
            cursor: Arc::new(AtomicU64::new(0)),
            total,
        }
    }

    #[must_use]
    pub fn current(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.current() >= self.total
    }

    /// Move the cursor forward to `position`; earlier positions are ignored.
    pub fn advance_to(&self, position: u64) {
        self.cursor.fetch_max(position, Ordering::AcqRel);
    }
}

/// Default sink: one `info!` event per tick.
pub fn log_progress(current: u64, total: u64) {
    info!(target: "mfs::badblocks", event = "scan_progress", current, total);
}

/// Background reporter for a running scan.
///
/// Every `interval` the thread reads the cursor and hands it to the sink,
/// skipping ticks before the first block is done. It exits on its own once
/// the scan is finished, or when the reporter is stopped or dropped.
#[derive(Debug)]
pub struct ProgressReporter {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    pub fn spawn<F>(progress: ScanProgress, interval: Duration, mut sink: F) -> Result<Self>
    where
        F: FnMut(u64, u64) + Send + 'static,
    {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let signal = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("mfs-scan-progress".to_owned())
            .spawn(move || {
                let (flag, condvar) = &*signal;
                let mut stopped = flag.lock();
                loop {
                    condvar.wait_for(&mut stopped, interval);
                    if *stopped || progress.is_finished() {
                        break;
                    }
                    let current = progress.current();
                    if current > 0 {
                        sink(current, progress.total());
                    }
                }
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let (flag, condvar) = &*self.stop;
        *flag.lock() = true;
        condvar.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(
                    target: "mfs::badblocks",
                    event = "progress_reporter_panicked",
                    "progress reporter thread panicked"
                );
            }
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_only_moves_forward() {
        let progress = ScanProgress::new(100);
        let view = progress.clone();
        progress.advance_to(40);
        progress.advance_to(10);
        assert_eq!(view.current(), 40);
        assert!(!view.is_finished());
        progress.advance_to(100);
        assert!(view.is_finished());
    }

    #[test]
    fn reporter_ticks_while_scan_runs() {
        let progress = ScanProgress::new(1000);
        progress.advance_to(16);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let reporter = ProgressReporter::spawn(
            progress.clone(),
            Duration::from_millis(5),
            move |current, total| sink_seen.lock().push((current, total)),
        )
        .expect("spawn");

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while seen.lock().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        reporter.stop();
        let ticks = seen.lock().clone();
        assert!(!ticks.is_empty());
        assert_eq!(ticks[0], (16, 1000));
    }

    #[test]
    fn reporter_exits_when_scan_finishes() {
        let progress = ScanProgress::new(10);
        progress.advance_to(10);
        let mut reporter =
            ProgressReporter::spawn(progress, Duration::from_millis(1), |_, _| {})
                .expect("spawn");
        let handle = reporter.handle.take().expect("handle");
        handle.join().expect("join");
    }

    #[test]
    fn reporter_stays_quiet_before_first_block() {
        let progress = ScanProgress::new(10);
        let seen = Arc::new(Mutex::new(0_u32));
        let sink_seen = Arc::clone(&seen);
        let reporter = ProgressReporter::spawn(progress, Duration::from_millis(1), move |_, _| {
            *sink_seen.lock() += 1;
        })
        .expect("spawn");
        thread::sleep(Duration::from_millis(30));
        drop(reporter);
        assert_eq!(*seen.lock(), 0);
    }

    #[test]
    fn panicking_sink_does_not_escape_stop() {
        let progress = ScanProgress::new(100);
        progress.advance_to(1);
        let reporter = ProgressReporter::spawn(progress, Duration::from_millis(1), |_, _| {
            panic!("sink failure");
        })
        .expect("spawn");
        thread::sleep(Duration::from_millis(30));
        reporter.stop();
    }
}
