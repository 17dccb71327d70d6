pub mod arbiter;
pub mod config;
pub mod engine;
pub mod session;
pub mod telemetry;

use std::fmt;

/// Destination for interleaved I/Q audio blocks.
pub trait AudioSink: Send {
    fn write(&mut self, samples: &[i16]) -> Result<(), SinkError>;
}

/// Destination for the committed gain value. Fire-and-forget: a sink that
/// cannot deliver logs and drops, it never propagates failure into the
/// gain loop.
pub trait TelemetrySink: Send {
    fn publish(&mut self, value: i32);
}

/// Sink failure split by recoverability.
#[derive(Debug)]
pub enum SinkError {
    /// The sink cannot take this block right now; drop it and continue.
    Backpressure,
    /// The sink is gone for good; the caller must stop or rebuild it.
    Failed(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Backpressure => write!(f, "sink backpressure"),
            SinkError::Failed(msg) => write!(f, "sink failed: {}", msg),
        }
    }
}

impl std::error::Error for SinkError {}
