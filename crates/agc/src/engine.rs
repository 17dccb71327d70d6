use crate::config::{AgcConfig, ABOVE_COUNT_CAP};

/// Windowed gain-control loop.
///
/// Accumulates per-window statistics (peak amplitude, count of samples above
/// the increase threshold) on a millisecond clock derived from the sample
/// counter, and evaluates one gain decision per completed window:
///
/// * overload path: enough loud samples for long enough raises attenuation
///   by `increase_step`;
/// * quiet path: the whole window stayed below the decrease threshold for
///   long enough, lowering attenuation by `decrease_step` down to the floor.
///
/// The overload path masks the quiet path within the same window. The engine
/// owns the gain-reduction value; callers only learn about changes through
/// the request returned by `process_sample`, which carries the new target
/// exactly when a hardware update should be issued.
pub struct AgcEngine {
    config: AgcConfig,
    /// Samples per millisecond tick.
    scaling: i32,
    gain: i32,
    sample_counter: i32,
    window_timer_ms: i32,
    increase_timer_ms: i32,
    decrease_timer_ms: i32,
    peak: i32,
    above_count: i32,
    debug_timer_ms: i32,
}

impl AgcEngine {
    /// Build an engine from a validated config. `initial_gain` is clamped
    /// into the configured bounds so the gain invariant holds from the
    /// first sample on.
    pub fn new(config: AgcConfig, initial_gain: i32) -> Self {
        let scaling = config.sample_scaling();
        let gain = initial_gain.clamp(config.min_gain, config.max_gain);
        Self {
            config,
            scaling,
            gain,
            sample_counter: 0,
            window_timer_ms: 0,
            increase_timer_ms: 0,
            decrease_timer_ms: 0,
            peak: 0,
            above_count: 0,
            debug_timer_ms: 0,
        }
    }

    /// Committed gain-reduction target, dB.
    pub fn gain_reduction(&self) -> i32 {
        self.gain
    }

    /// Feed one amplitude sample. Returns the new gain target when this
    /// sample completed a window whose decision requires a hardware update.
    pub fn process_sample(&mut self, sample: i16) -> Option<i32> {
        self.sample_counter += 1;
        if self.sample_counter > self.scaling {
            self.sample_counter = 0;
            self.window_timer_ms += 1;
            self.increase_timer_ms += 1;
            self.decrease_timer_ms += 1;
            self.debug_timer_ms += 1;
        }

        let amplitude = (sample as i32).abs();
        if amplitude > self.peak {
            self.peak = amplitude;
        }
        if amplitude > self.config.increase_threshold && self.above_count < ABOVE_COUNT_CAP {
            self.above_count += 1;
        }

        let request = if self.window_timer_ms >= self.config.window_ms {
            self.evaluate_window()
        } else {
            None
        };

        if self.config.debug_period_ms > 0 && self.debug_timer_ms > self.config.debug_period_ms {
            self.debug_timer_ms = 0;
            log::debug!(
                "agc: gain_reduction={} amplitude={} peak={} above_count={} increase_timer={} decrease_timer={} request={:?}",
                self.gain,
                amplitude,
                self.peak,
                self.above_count,
                self.increase_timer_ms,
                self.decrease_timer_ms,
                request,
            );
        }

        request
    }

    /// One gain decision per completed window. The overload branch is
    /// checked first and masks the quiet branch even when its inner guard
    /// fails.
    fn evaluate_window(&mut self) -> Option<i32> {
        let mut request = None;

        if self.increase_timer_ms > self.config.increase_time_ms
            && self.above_count > self.config.overload_count
        {
            // Runaway guard: gain reduction is a dB value two orders of
            // magnitude below the amplitude threshold scale.
            if self.gain < self.config.increase_threshold {
                let candidate = self.gain + self.config.increase_step;
                if candidate > self.config.max_gain {
                    // At the ceiling the value is clamped locally and no
                    // hardware command goes out.
                    self.gain = self.config.max_gain;
                } else {
                    self.gain = candidate;
                    request = Some(self.gain);
                }
                self.increase_timer_ms = 0;
                self.decrease_timer_ms = 0;
            }
        } else if self.peak < self.config.decrease_threshold
            && self.decrease_timer_ms > self.config.decrease_time_ms
            && self.gain > self.config.min_gain
        {
            self.gain = (self.gain - self.config.decrease_step).max(self.config.min_gain);
            request = Some(self.gain);
            self.increase_timer_ms = 0;
            self.decrease_timer_ms = 0;
            self.above_count = 0;
        }

        self.peak = 0;
        self.window_timer_ms = 0;
        self.above_count = 0;
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgcConfig {
        AgcConfig {
            enabled: true,
            ..AgcConfig::default()
        }
        .validated()
        .unwrap()
    }

    /// Feed `ms` milliseconds of a constant amplitude, collecting every
    /// gain request the engine emits along the way.
    fn feed(engine: &mut AgcEngine, amplitude: i16, ms: i32) -> Vec<i32> {
        let samples_per_ms = engine.scaling + 1;
        let mut requests = Vec::new();
        for _ in 0..ms * samples_per_ms {
            if let Some(r) = engine.process_sample(amplitude) {
                requests.push(r);
            }
        }
        requests
    }

    #[test]
    fn test_overload_raises_attenuation_once() {
        let mut engine = AgcEngine::new(config(), 30);

        // Amplitude between the thresholds: advances the timers without
        // qualifying either path.
        let requests = feed(&mut engine, 10_000, 1100);
        assert!(requests.is_empty(), "unexpected requests {:?}", requests);

        // Loud input: the next completed window has both the overload count
        // and the elapsed increase time.
        let requests = feed(&mut engine, 20_000, 500);
        assert_eq!(requests, vec![31]);
        assert_eq!(engine.gain_reduction(), 31);
    }

    #[test]
    fn test_window_boundary_is_sample_exact() {
        let mut engine = AgcEngine::new(config(), 30);

        feed(&mut engine, 10_000, 1100);
        // One millisecond short of the window boundary: no decision yet.
        let requests = feed(&mut engine, 20_000, 399);
        assert!(requests.is_empty(), "unexpected requests {:?}", requests);
        // The boundary millisecond completes the window.
        let requests = feed(&mut engine, 20_000, 1);
        assert_eq!(requests, vec![31]);
    }

    #[test]
    fn test_quiet_input_steps_down_to_floor() {
        let mut engine = AgcEngine::new(config(), 40);

        // Quiet input: one decrease per qualifying window until the floor.
        // Each decrease resets the decrease timer, so decisions are spaced
        // by decrease_time rounded up to the next window boundary.
        let requests = feed(&mut engine, 1000, 61_000);
        assert_eq!(requests, vec![39, 38, 37, 36, 35, 34, 33, 32, 31, 30]);
        assert_eq!(engine.gain_reduction(), 30);

        // At the floor nothing more happens.
        let requests = feed(&mut engine, 1000, 12_000);
        assert!(requests.is_empty(), "unexpected requests {:?}", requests);
        assert_eq!(engine.gain_reduction(), 30);
    }

    #[test]
    fn test_overload_masks_quiet_path() {
        // Inverted thresholds make one amplitude qualify both paths at
        // once; the overload branch must win every window.
        let cfg = AgcConfig {
            enabled: true,
            increase_threshold: 1000,
            decrease_threshold: 30_000,
            overload_count: 100,
            ..AgcConfig::default()
        }
        .validated()
        .unwrap();
        let mut engine = AgcEngine::new(cfg, 30);

        let requests = feed(&mut engine, 5000, 20_000);
        assert!(!requests.is_empty());
        for pair in requests.windows(2) {
            assert!(pair[1] > pair[0], "attenuation went down: {:?}", requests);
        }
    }

    #[test]
    fn test_failed_runaway_guard_still_masks_quiet_path() {
        // Threshold below the gain value keeps the guard false, so the
        // overload branch does nothing, but the quiet branch must stay
        // masked while the overload condition holds.
        let cfg = AgcConfig {
            enabled: true,
            increase_threshold: 25,
            decrease_threshold: 30_000,
            overload_count: 100,
            ..AgcConfig::default()
        }
        .validated()
        .unwrap();
        let mut engine = AgcEngine::new(cfg, 30);

        let requests = feed(&mut engine, 5000, 20_000);
        assert!(requests.is_empty(), "unexpected requests {:?}", requests);
        assert_eq!(engine.gain_reduction(), 30);
    }

    #[test]
    fn test_ceiling_step_requests_exact_max() {
        let mut engine = AgcEngine::new(config(), 58);

        feed(&mut engine, 10_000, 1100);
        let requests = feed(&mut engine, 20_000, 500);
        assert_eq!(requests, vec![59]);
    }

    #[test]
    fn test_overshooting_step_clamps_without_request() {
        let cfg = AgcConfig {
            enabled: true,
            increase_step: 4,
            ..AgcConfig::default()
        }
        .validated()
        .unwrap();
        let mut engine = AgcEngine::new(cfg, 58);

        feed(&mut engine, 10_000, 1100);
        let requests = feed(&mut engine, 20_000, 500);
        assert!(requests.is_empty(), "unexpected requests {:?}", requests);
        assert_eq!(engine.gain_reduction(), 59);

        // Once at the ceiling, further overload windows stay silent.
        let requests = feed(&mut engine, 20_000, 2000);
        assert!(requests.is_empty(), "unexpected requests {:?}", requests);
        assert_eq!(engine.gain_reduction(), 59);
    }

    #[test]
    fn test_gain_stays_in_bounds_for_all_inputs() {
        let cfg = AgcConfig {
            enabled: true,
            min_gain: 30,
            max_gain: 33,
            increase_step: 10,
            decrease_step: 10,
            increase_time_ms: 50,
            decrease_time_ms: 50,
            window_ms: 50,
            overload_count: 100,
            ..AgcConfig::default()
        }
        .validated()
        .unwrap();
        let mut engine = AgcEngine::new(cfg.clone(), 31);

        let samples_per_ms = engine.scaling + 1;
        // Alternating loud and silent stretches with oversized steps keeps
        // both clamps busy.
        for round in 0..40 {
            let amplitude = if round % 2 == 0 { 20_000 } else { 0 };
            for _ in 0..300 * samples_per_ms {
                engine.process_sample(amplitude);
                assert!(
                    engine.gain_reduction() >= cfg.min_gain
                        && engine.gain_reduction() <= cfg.max_gain,
                    "gain {} escaped [{}, {}]",
                    engine.gain_reduction(),
                    cfg.min_gain,
                    cfg.max_gain
                );
            }
        }
    }

    #[test]
    fn test_above_count_saturates_without_wrapping() {
        // At 768 kHz a 500 ms window sees far more than the counter cap;
        // the decision must still fire off the saturated count.
        let cfg = AgcConfig {
            enabled: true,
            sample_rate: 768_000,
            overload_count: 60_000,
            ..AgcConfig::default()
        }
        .validated()
        .unwrap();
        let mut engine = AgcEngine::new(cfg, 30);

        feed(&mut engine, 10_000, 1100);
        let requests = feed(&mut engine, 20_000, 500);
        assert_eq!(requests, vec![31]);
    }

    #[test]
    fn test_initial_gain_clamped_into_bounds() {
        let engine = AgcEngine::new(config(), 10);
        assert_eq!(engine.gain_reduction(), 30);
        let engine = AgcEngine::new(config(), 70);
        assert_eq!(engine.gain_reduction(), 59);
    }
}
