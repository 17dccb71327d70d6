use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use crossbeam::channel;

use rsp_agc::config::AgcConfig;
use rsp_agc::session::AgcSession;
use rsp_agc::telemetry::{GainReporter, REPORT_PERIOD};
use rsp_agc::AudioSink;
use rsp_output::gainfile::GainFile;
use rsp_output::raw::RawWriter;
use rsp_sdr::file::FileSource;
use rsp_sdr::{BlockSource, NullGain};

/// Where the sample stream and the gain telemetry go.
pub struct OutputConfig {
    pub out: Option<PathBuf>,
    pub play: bool,
    pub gain_file: Option<PathBuf>,
}

/// Live front-end settings as given on the command line.
pub struct LiveConfig {
    pub serial: Option<String>,
    pub freq_hz: u32,
    pub bandwidth_khz: u32,
    pub lna_state: u8,
    pub wideband: bool,
    pub initial_gr_db: i32,
    pub verbose: bool,
}

fn build_sink(sample_rate: u32, output: &OutputConfig) -> Result<Box<dyn AudioSink>, String> {
    if output.play {
        return build_player(sample_rate);
    }
    if let Some(ref path) = output.out {
        let file = File::create(path)
            .map_err(|e| format!("failed to create {}: {}", path.display(), e))?;
        return Ok(Box::new(RawWriter::new(BufWriter::new(file))));
    }
    Ok(Box::new(RawWriter::new(BufWriter::new(io::stdout()))))
}

#[cfg(feature = "audio")]
fn build_player(sample_rate: u32) -> Result<Box<dyn AudioSink>, String> {
    let player = rsp_output::audio::AudioPlayer::open(sample_rate)?;
    Ok(Box::new(player))
}

#[cfg(not(feature = "audio"))]
fn build_player(_sample_rate: u32) -> Result<Box<dyn AudioSink>, String> {
    Err("built without audio support".into())
}

fn spawn_reporter(
    session: &AgcSession,
    min_gain: i32,
    path: &Path,
) -> Result<GainReporter, String> {
    let sink = GainFile::create(path)
        .map_err(|e| format!("failed to create {}: {}", path.display(), e))?;
    Ok(GainReporter::spawn(
        session.gain_cell(),
        Box::new(sink),
        min_gain,
        REPORT_PERIOD,
    ))
}

/// Run the receive chain against a live RSP device. Returns only when the
/// stream ends or the output sink fails for good.
#[cfg(feature = "sdrplay")]
pub fn run_live(live: LiveConfig, config: AgcConfig, output: OutputConfig) -> Result<(), String> {
    use rsp_sdr::sdrplay::{SdrplayConfig, SdrplayDevice};
    use std::sync::atomic::Ordering;

    let sdr_config = SdrplayConfig {
        serial: live.serial,
        freq_hz: live.freq_hz,
        sample_rate: config.sample_rate,
        bandwidth_khz: live.bandwidth_khz,
        lna_state: live.lna_state,
        wideband: live.wideband,
        initial_gr_db: live.initial_gr_db,
        verbose: live.verbose,
    };

    let device = SdrplayDevice::open(&sdr_config)?;
    let (mut source, gain) = device.split();
    let running = source.running_flag();

    let min_gain = config.min_gain;
    let sink = build_sink(config.sample_rate, &output)?;
    let mut session = AgcSession::new(config, Box::new(gain), sink);

    let mut reporter = match output.gain_file {
        Some(ref path) => Some(spawn_reporter(&session, min_gain, path)?),
        None => None,
    };

    let (tx, rx) = channel::bounded(64);
    let streamer = std::thread::spawn(move || {
        if let Err(e) = source.start(tx) {
            log::error!("stream error: {}", e);
        }
    });

    // The first block proves the device is initialised and streaming, so
    // the startup gain push lands on a device that can acknowledge it.
    let mut seeded = false;
    for block in rx.iter() {
        if !seeded {
            session.push_initial_gain();
            seeded = true;
        }
        if let Err(e) = session.process_block(&block) {
            log::error!("output failed: {}", e);
            break;
        }
    }

    // Unblock the streaming thread before joining it.
    running.store(false, Ordering::SeqCst);
    drop(rx);

    if session.dropped_blocks() > 0 {
        log::info!(
            "dropped {} blocks on output backpressure",
            session.dropped_blocks()
        );
    }
    if let Some(ref mut r) = reporter {
        r.stop();
    }

    let _ = streamer.join();
    Ok(())
}

#[cfg(not(feature = "sdrplay"))]
pub fn run_live(_live: LiveConfig, _config: AgcConfig, _output: OutputConfig) -> Result<(), String> {
    Err("built without sdrplay support".into())
}

/// Run the receive chain against a raw IQ file, with gain updates going to
/// a stub tuner. Same processing path as live, minus the hardware.
pub fn run_file(path: &Path, config: AgcConfig, output: OutputConfig) -> Result<(), String> {
    let sample_rate = config.sample_rate;
    let min_gain = config.min_gain;

    let sink = build_sink(sample_rate, &output)?;
    let mut session = AgcSession::new(config, Box::new(NullGain), sink);

    let mut reporter = match output.gain_file {
        Some(ref p) => Some(spawn_reporter(&session, min_gain, p)?),
        None => None,
    };

    let mut source = FileSource::new(path.to_string_lossy().to_string(), sample_rate);
    let (tx, rx) = channel::bounded(64);
    let reader = std::thread::spawn(move || {
        if let Err(e) = source.start(tx) {
            log::error!("file reader error: {}", e);
        }
    });

    let mut seeded = false;
    for block in rx.iter() {
        if !seeded {
            session.push_initial_gain();
            seeded = true;
        }
        if let Err(e) = session.process_block(&block) {
            log::error!("output failed: {}", e);
            break;
        }
    }
    drop(rx);

    if session.dropped_blocks() > 0 {
        log::info!(
            "dropped {} blocks on output backpressure",
            session.dropped_blocks()
        );
    }
    if let Some(ref mut r) = reporter {
        r.stop();
    }

    let _ = reader.join();
    Ok(())
}
