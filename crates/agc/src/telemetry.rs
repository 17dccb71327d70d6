use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};

use crate::TelemetrySink;

/// Default reporter period.
pub const REPORT_PERIOD: Duration = Duration::from_millis(100);

/// Single-slot handoff for the committed gain value: written by the sample
/// path, drained by the reporter thread. The value slot is stored before
/// the pending flag is raised, so a reader that observes pending always
/// reads a complete value.
pub struct GainCell {
    value: AtomicI32,
    pending: AtomicBool,
}

impl GainCell {
    pub fn new(initial: i32) -> Self {
        Self {
            value: AtomicI32::new(initial),
            pending: AtomicBool::new(false),
        }
    }

    /// Publish a newly committed value. A value the reader has not drained
    /// yet is superseded.
    pub fn publish(&self, value: i32) {
        self.value.store(value, Ordering::SeqCst);
        self.pending.store(true, Ordering::SeqCst);
    }

    /// Drain the pending value, if any.
    pub fn take(&self) -> Option<i32> {
        if self.pending.swap(false, Ordering::SeqCst) {
            Some(self.value.load(Ordering::SeqCst))
        } else {
            None
        }
    }

    /// Last published value, drained or not.
    pub fn last(&self) -> i32 {
        self.value.load(Ordering::SeqCst)
    }
}

/// Periodic reporter thread. On each tick it drains the cell and, when a
/// new value was committed since the previous tick, writes it to the
/// telemetry sink relative to the gain floor (the consumer reads 0 at
/// minimum gain). It never touches the sample path.
pub struct GainReporter {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl GainReporter {
    pub fn spawn(
        cell: Arc<GainCell>,
        mut sink: Box<dyn TelemetrySink>,
        min_gain: i32,
        period: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Some(value) = cell.take() {
                            sink.publish(value - min_gain);
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            // One last drain so a value committed just before shutdown
            // still reaches the sink.
            if let Some(value) = cell.take() {
                sink.publish(value - min_gain);
            }
        });
        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for GainReporter {
    fn drop(&mut self) {
        self.stop();
    }
}
