use std::sync::Arc;

use rsp_sdr::{GainControl, SampleBlock};

use crate::arbiter::GainArbiter;
use crate::config::AgcConfig;
use crate::engine::AgcEngine;
use crate::telemetry::GainCell;
use crate::{AudioSink, SinkError};

/// Per-block driver for one streaming run. Owns the engine, the arbiter
/// and the audio sink, and enforces the block protocol:
///
/// 1. fold the block's change-pending indicator into the lockout state;
/// 2. interleave the planar lanes and run the per-sample gain loop;
/// 3. hand the interleaved block to the sink;
/// 4. only then forward the window's gain request, if one was computed.
///
/// Sample delivery always precedes gain arbitration, and a later window
/// decision within the same block supersedes an earlier one.
pub struct AgcSession {
    enabled: bool,
    engine: AgcEngine,
    arbiter: GainArbiter,
    cell: Arc<GainCell>,
    sink: Box<dyn AudioSink>,
    interleaved: Vec<i16>,
    last_reset: bool,
    dropped_blocks: u64,
}

impl AgcSession {
    /// `config` must have passed validation. The engine starts at the gain
    /// floor, which the front-end was programmed with before streaming;
    /// the starting value is published so the first telemetry tick reports
    /// it.
    pub fn new(config: AgcConfig, hw: Box<dyn GainControl>, sink: Box<dyn AudioSink>) -> Self {
        let initial = config.min_gain;
        let cell = Arc::new(GainCell::new(initial));
        cell.publish(initial);
        let enabled = config.enabled;
        let engine = AgcEngine::new(config, initial);
        let arbiter = GainArbiter::new(hw, cell.clone());
        Self {
            enabled,
            engine,
            arbiter,
            cell,
            sink,
            interleaved: Vec::new(),
            last_reset: false,
            dropped_blocks: 0,
        }
    }

    /// Issue the starting gain reduction through the arbiter, seeding the
    /// front-end and the telemetry slot alike. Call once streaming is up,
    /// before the first block is processed; the front-end acknowledges it
    /// like any other command.
    pub fn push_initial_gain(&mut self) {
        self.arbiter.request(self.engine.gain_reduction());
    }

    /// Shared handle for the telemetry reporter.
    pub fn gain_cell(&self) -> Arc<GainCell> {
        self.cell.clone()
    }

    /// The engine's committed gain target, dB.
    pub fn gain_reduction(&self) -> i32 {
        self.engine.gain_reduction()
    }

    /// Blocks dropped on sink backpressure so far.
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks
    }

    pub fn process_block(&mut self, block: &SampleBlock) -> Result<(), SinkError> {
        self.arbiter.observe_pending(block.gain_change_pending);

        if block.reset != self.last_reset {
            // Informational: windows are time-based and deliberately
            // survive a front-end resync.
            log::info!(
                "front-end resync indicator now {}, window state carries over",
                block.reset
            );
            self.last_reset = block.reset;
        }

        let n = block.num_samples;
        self.interleaved.clear();
        self.interleaved.reserve(n * 2);
        for (&i_s, &q_s) in block.xi.iter().zip(block.xq.iter()) {
            self.interleaved.push(i_s);
            self.interleaved.push(q_s);
        }

        let mut request = None;
        if self.enabled {
            // The gain loop consumes as many amplitude samples as the block
            // has complex samples, walking the interleaved layout.
            let span = n.min(self.interleaved.len());
            for i in 0..span {
                let sample = self.interleaved[i];
                if let Some(target) = self.engine.process_sample(sample) {
                    request = Some(target);
                }
            }
        }

        match self.sink.write(&self.interleaved) {
            Ok(()) => {}
            Err(SinkError::Backpressure) => {
                self.dropped_blocks += 1;
                log::debug!(
                    "sink backpressure, dropped {} samples ({} blocks so far)",
                    n,
                    self.dropped_blocks
                );
            }
            Err(e) => return Err(e),
        }

        if let Some(target) = request {
            self.arbiter.request(target);
        }

        Ok(())
    }
}
