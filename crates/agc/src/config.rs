use std::fmt;

use rsp_sdr::DEVICE_MIN_GR_DB;

/// Highest gain reduction any RSP tuner accepts.
pub const MAX_GR_CEILING_DB: i32 = 59;

/// Shortest window and event-time settings that still make sense for a
/// millisecond-resolution loop.
pub const MIN_TIME_MS: i32 = 50;

/// Gain step bounds, in dB per window decision.
pub const MIN_STEP_DB: i32 = 1;
pub const MAX_STEP_DB: i32 = 10;

/// Amplitude thresholds live in the int16 sample domain.
pub const MAX_THRESHOLD: i32 = i16::MAX as i32;

/// Saturation cap for the per-window above-threshold counter.
pub const ABOVE_COUNT_CAP: i32 = 65530;

/// Gain-loop settings, validated once at startup and immutable afterwards.
///
/// Amplitude thresholds are in raw int16 ADC units, times are in
/// milliseconds, gain values in dB of tuner gain reduction.
#[derive(Debug, Clone)]
pub struct AgcConfig {
    pub enabled: bool,
    /// Amplitude above which a sample counts toward overload.
    pub increase_threshold: i32,
    /// Peak amplitude below which a window counts as quiet.
    pub decrease_threshold: i32,
    /// Window length between gain decisions.
    pub window_ms: i32,
    /// Overload samples per window needed to raise attenuation.
    pub overload_count: i32,
    /// Time that must pass since the last adjustment before attenuation
    /// may be raised again.
    pub increase_time_ms: i32,
    /// Time that must pass since the last adjustment before attenuation
    /// may be lowered again.
    pub decrease_time_ms: i32,
    /// Attenuation raise per decision, dB.
    pub increase_step: i32,
    /// Attenuation drop per decision, dB.
    pub decrease_step: i32,
    pub min_gain: i32,
    pub max_gain: i32,
    pub sample_rate: u32,
    /// Diagnostic trace period; 0 disables the trace.
    pub debug_period_ms: i32,
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            increase_threshold: 16384,
            decrease_threshold: 8192,
            window_ms: 500,
            overload_count: 4096,
            increase_time_ms: 1000,
            decrease_time_ms: 5000,
            increase_step: 1,
            decrease_step: 1,
            min_gain: 30,
            max_gain: 59,
            sample_rate: 96_000,
            debug_period_ms: 0,
        }
    }
}

impl AgcConfig {
    /// Clamp the clampable settings and reject the rest. The loop never
    /// runs on an unvalidated config.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.increase_step < MIN_STEP_DB || self.increase_step > MAX_STEP_DB {
            let clamped = self.increase_step.clamp(MIN_STEP_DB, MAX_STEP_DB);
            log::warn!(
                "increase step {} out of range, using {}",
                self.increase_step,
                clamped
            );
            self.increase_step = clamped;
        }
        if self.decrease_step < MIN_STEP_DB || self.decrease_step > MAX_STEP_DB {
            let clamped = self.decrease_step.clamp(MIN_STEP_DB, MAX_STEP_DB);
            log::warn!(
                "decrease step {} out of range, using {}",
                self.decrease_step,
                clamped
            );
            self.decrease_step = clamped;
        }
        if self.min_gain < DEVICE_MIN_GR_DB {
            log::warn!(
                "minimum gain reduction {} below device floor, using {}",
                self.min_gain,
                DEVICE_MIN_GR_DB
            );
            self.min_gain = DEVICE_MIN_GR_DB;
        }
        if self.max_gain > MAX_GR_CEILING_DB {
            log::warn!(
                "maximum gain reduction {} above device ceiling, using {}",
                self.max_gain,
                MAX_GR_CEILING_DB
            );
            self.max_gain = MAX_GR_CEILING_DB;
        }

        if self.min_gain > self.max_gain {
            return Err(ConfigError::GainBoundsInverted {
                min: self.min_gain,
                max: self.max_gain,
            });
        }
        if self.window_ms < MIN_TIME_MS {
            return Err(ConfigError::WindowTooShort { ms: self.window_ms });
        }
        if self.increase_time_ms < MIN_TIME_MS {
            return Err(ConfigError::EventTimeTooShort {
                which: "increase",
                ms: self.increase_time_ms,
            });
        }
        if self.decrease_time_ms < MIN_TIME_MS {
            return Err(ConfigError::EventTimeTooShort {
                which: "decrease",
                ms: self.decrease_time_ms,
            });
        }
        if self.increase_threshold < 1 || self.increase_threshold > MAX_THRESHOLD {
            return Err(ConfigError::ThresholdOutOfRange {
                which: "increase",
                value: self.increase_threshold,
            });
        }
        if self.decrease_threshold < 1 || self.decrease_threshold > MAX_THRESHOLD {
            return Err(ConfigError::ThresholdOutOfRange {
                which: "decrease",
                value: self.decrease_threshold,
            });
        }
        if self.overload_count < 1 || self.overload_count >= ABOVE_COUNT_CAP {
            return Err(ConfigError::OverloadCountOutOfRange {
                value: self.overload_count,
            });
        }
        if self.sample_rate < 1000 {
            return Err(ConfigError::SampleRateTooLow {
                rate: self.sample_rate,
            });
        }
        if self.debug_period_ms < 0 {
            self.debug_period_ms = 0;
        }

        Ok(self)
    }

    /// Samples per millisecond at the configured rate.
    pub fn sample_scaling(&self) -> i32 {
        (self.sample_rate / 1000) as i32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    WindowTooShort { ms: i32 },
    EventTimeTooShort { which: &'static str, ms: i32 },
    ThresholdOutOfRange { which: &'static str, value: i32 },
    OverloadCountOutOfRange { value: i32 },
    GainBoundsInverted { min: i32, max: i32 },
    SampleRateTooLow { rate: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::WindowTooShort { ms } => {
                write!(f, "window length {} ms below minimum {} ms", ms, MIN_TIME_MS)
            }
            ConfigError::EventTimeTooShort { which, ms } => write!(
                f,
                "{} event time {} ms below minimum {} ms",
                which, ms, MIN_TIME_MS
            ),
            ConfigError::ThresholdOutOfRange { which, value } => write!(
                f,
                "{} threshold {} outside 1..={}",
                which, value, MAX_THRESHOLD
            ),
            ConfigError::OverloadCountOutOfRange { value } => write!(
                f,
                "overload sample count {} outside 1..{}",
                value, ABOVE_COUNT_CAP
            ),
            ConfigError::GainBoundsInverted { min, max } => write!(
                f,
                "minimum gain reduction {} exceeds maximum {}",
                min, max
            ),
            ConfigError::SampleRateTooLow { rate } => {
                write!(f, "sample rate {} below 1000 Hz", rate)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
