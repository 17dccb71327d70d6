// Copyright 2025-2026 CEMAXECUTER LLC

use crossbeam::channel::{self, Sender, TrySendError};
use tinyaudio::prelude::*;

use rsp_agc::{AudioSink, SinkError};

/// Plays interleaved I/Q samples through the default audio device,
/// I on the left channel and Q on the right.
///
/// Samples cross to the audio callback through a bounded channel sized
/// for one second of stereo; the callback plays silence on underrun.
pub struct AudioPlayer {
    tx: Sender<i16>,
    _device: OutputDevice,
}

// The device handle is parked here so playback outlives open(); after
// creation it is only dropped.
unsafe impl Send for AudioPlayer {}

impl AudioPlayer {
    pub fn open(sample_rate: u32) -> Result<Self, String> {
        let (tx, rx) = channel::bounded::<i16>((sample_rate * 2) as usize);
        let config = OutputDeviceParameters {
            channels_count: 2,
            sample_rate: sample_rate as usize,
            channel_sample_count: 1024,
        };
        let device = run_output_device(config, move |data| {
            for sample in data.iter_mut() {
                *sample = match rx.try_recv() {
                    Ok(s) => s as f32 / 32768.0,
                    Err(_) => 0.0,
                };
            }
        })
        .map_err(|e| format!("audio output: {}", e))?;
        Ok(AudioPlayer {
            tx,
            _device: device,
        })
    }
}

impl AudioSink for AudioPlayer {
    fn write(&mut self, samples: &[i16]) -> Result<(), SinkError> {
        for &s in samples {
            match self.tx.try_send(s) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => return Err(SinkError::Backpressure),
                Err(TrySendError::Disconnected(_)) => {
                    return Err(SinkError::Failed("audio device closed".into()));
                }
            }
        }
        Ok(())
    }
}
