pub mod file;

#[cfg(feature = "sdrplay")]
pub mod sdrplay;

use std::fmt;

use crossbeam::channel::Sender;

/// Lowest gain reduction the tuner accepts, in dB.
pub const DEVICE_MIN_GR_DB: i32 = 19;
/// Highest gain reduction the tuner accepts, in dB.
pub const DEVICE_MAX_GR_DB: i32 = 59;

/// One block as delivered by the front-end: planar I and Q lanes plus the
/// per-block indicators the driver reports alongside the samples.
pub struct SampleBlock {
    /// In-phase samples.
    pub xi: Vec<i16>,
    /// Quadrature samples.
    pub xq: Vec<i16>,
    /// Number of complex samples (xi.len() == xq.len() == num_samples).
    pub num_samples: usize,
    /// Driver re-synchronized its stream before this block.
    pub reset: bool,
    /// A previously commanded gain change is still being applied internally.
    pub gain_change_pending: bool,
}

/// Common trait for block-streaming front-ends.
pub trait BlockSource: Send {
    /// Start streaming blocks into the channel.
    /// Runs until stop() is called, the receiver drops, or an error occurs.
    fn start(&mut self, tx: Sender<SampleBlock>) -> Result<(), String>;

    /// Signal the source to stop streaming.
    fn stop(&mut self);

    /// Audio-equivalent sample rate in Hz (after hardware decimation).
    fn sample_rate(&self) -> u32;
}

/// Command side of the front-end: accepts tuner gain-reduction updates.
/// Must be callable from the processing thread while the stream callback
/// keeps running.
pub trait GainControl: Send {
    fn set_gain_reduction(&mut self, db: i32) -> Result<(), HardwareError>;
}

/// A gain-update command was rejected by the driver.
#[derive(Debug, Clone)]
pub struct HardwareError {
    /// Driver error code.
    pub code: i32,
    /// Driver error string, if one was available.
    pub detail: String,
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gain update failed ({}): {}", self.code, self.detail)
    }
}

impl std::error::Error for HardwareError {}

/// Gain control for front-ends without a commandable tuner (file replay).
/// Accepts every update and discards it.
pub struct NullGain;

impl GainControl for NullGain {
    fn set_gain_reduction(&mut self, db: i32) -> Result<(), HardwareError> {
        log::debug!("no tuner attached, dropping gain reduction update to {} dB", db);
        Ok(())
    }
}
