use std::sync::Arc;

use rsp_sdr::GainControl;

use crate::telemetry::GainCell;

/// Serializes gain commands against the front-end's asynchronous
/// acknowledgment: at most one command is in flight at a time.
///
/// The front-end reports on every block whether a gain change is still
/// being applied internally. The arbiter turns the transitions of that
/// indicator into a lockout: while locked out, new requests are dropped,
/// not queued; the engine re-requests on a later window if the condition
/// persists.
pub struct GainArbiter {
    hw: Box<dyn GainControl>,
    cell: Arc<GainCell>,
    locked_out: bool,
    /// Indicator value seen on the previous block.
    indicator: bool,
}

impl GainArbiter {
    pub fn new(hw: Box<dyn GainControl>, cell: Arc<GainCell>) -> Self {
        Self {
            hw,
            cell,
            locked_out: false,
            indicator: false,
        }
    }

    /// Track the per-block change-pending indicator. Must run before any
    /// request evaluated from the same block, so that request sees current
    /// lockout state. A rising edge locks even when the change was not
    /// ours; a falling edge is the hardware's acknowledgment.
    pub fn observe_pending(&mut self, pending: bool) {
        if pending && !self.indicator {
            if !self.locked_out {
                log::debug!("gain change in flight (not ours), locking out updates");
            }
            self.locked_out = true;
        } else if !pending && self.indicator {
            self.locked_out = false;
        }
        self.indicator = pending;
    }

    /// Issue a gain command unless one is still in flight. The committed
    /// value is published to telemetry whether or not the hardware call
    /// succeeded; a failure is logged and corrected by a later window, not
    /// retried here.
    pub fn request(&mut self, target: i32) -> bool {
        if self.locked_out {
            log::debug!(
                "gain update to {} dB dropped, previous change still in flight",
                target
            );
            return false;
        }

        self.locked_out = true;
        if let Err(e) = self.hw.set_gain_reduction(target) {
            log::error!("{}", e);
        }
        self.cell.publish(target);
        true
    }

    pub fn is_locked_out(&self) -> bool {
        self.locked_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsp_sdr::HardwareError;
    use std::sync::Mutex;

    struct RecordingGain {
        issued: Arc<Mutex<Vec<i32>>>,
        fail: bool,
    }

    impl GainControl for RecordingGain {
        fn set_gain_reduction(&mut self, db: i32) -> Result<(), HardwareError> {
            self.issued.lock().unwrap().push(db);
            if self.fail {
                Err(HardwareError {
                    code: 3,
                    detail: "not initialised".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn arbiter(fail: bool) -> (GainArbiter, Arc<Mutex<Vec<i32>>>, Arc<GainCell>) {
        let issued = Arc::new(Mutex::new(Vec::new()));
        let cell = Arc::new(GainCell::new(30));
        let hw = Box::new(RecordingGain {
            issued: issued.clone(),
            fail,
        });
        (GainArbiter::new(hw, cell.clone()), issued, cell)
    }

    #[test]
    fn test_request_issues_and_locks() {
        let (mut arb, issued, cell) = arbiter(false);

        assert!(arb.request(31));
        assert!(arb.is_locked_out());
        assert_eq!(issued.lock().unwrap().clone(), vec![31]);
        assert_eq!(cell.take(), Some(31));

        // Second request while in flight is dropped, not queued.
        assert!(!arb.request(32));
        assert_eq!(issued.lock().unwrap().clone(), vec![31]);
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn test_acknowledgment_cycle_reopens_requests() {
        let (mut arb, issued, _cell) = arbiter(false);

        assert!(arb.request(31));
        assert!(!arb.request(32));

        // Hardware reports the change being applied, then done.
        arb.observe_pending(true);
        assert!(arb.is_locked_out());
        arb.observe_pending(false);
        assert!(!arb.is_locked_out());

        assert!(arb.request(33));
        assert_eq!(issued.lock().unwrap().clone(), vec![31, 33]);
    }

    #[test]
    fn test_foreign_change_locks_out_requests() {
        let (mut arb, issued, _cell) = arbiter(false);

        // Rising edge without any request of ours.
        arb.observe_pending(true);
        assert!(arb.is_locked_out());
        assert!(!arb.request(31));
        assert!(issued.lock().unwrap().is_empty());

        arb.observe_pending(false);
        assert!(arb.request(31));
        assert_eq!(issued.lock().unwrap().clone(), vec![31]);
    }

    #[test]
    fn test_steady_indicator_does_not_toggle_lockout() {
        let (mut arb, _issued, _cell) = arbiter(false);

        assert!(arb.request(31));
        // Indicator stays low: no falling edge, lockout holds.
        arb.observe_pending(false);
        arb.observe_pending(false);
        assert!(arb.is_locked_out());

        arb.observe_pending(true);
        arb.observe_pending(true);
        assert!(arb.is_locked_out());
        arb.observe_pending(false);
        assert!(!arb.is_locked_out());
    }

    #[test]
    fn test_hardware_failure_still_commits_value() {
        let (mut arb, issued, cell) = arbiter(true);

        assert!(arb.request(31));
        assert_eq!(issued.lock().unwrap().clone(), vec![31]);
        // The local commitment stands; telemetry sees it, lockout holds.
        assert_eq!(cell.take(), Some(31));
        assert!(arb.is_locked_out());
    }
}
