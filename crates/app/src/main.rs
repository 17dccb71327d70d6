mod pipeline;

use clap::Parser;
use std::path::PathBuf;

use rsp_agc::config::AgcConfig;

#[derive(Parser, Debug)]
#[command(name = "rspaudio")]
#[command(about = "SDRplay RSP receiver with windowed AGC, raw IQ on stdout")]
struct Cli {
    /// Tuner frequency in Hz
    #[arg(short = 'f', long)]
    freq: Option<u32>,

    /// Output sample rate in Hz: 96000, 192000, 384000 or 768000
    #[arg(short = 'r', long)]
    rate: Option<u32>,

    /// IF bandwidth in kHz: 200, 300, 600, 1536 or 5000
    #[arg(short = 'B', long, default_value = "1536")]
    bandwidth: u32,

    /// LNA state
    #[arg(short = 'l', long, default_value = "3")]
    lna: u8,

    /// Enable wideband signal mode (half-band filtering, high CPU)
    #[arg(short = 'W', long)]
    wideband: bool,

    /// Select the device whose serial number contains this string
    #[arg(short = 'i', long)]
    serial: Option<String>,

    /// List available RSP devices and exit
    #[arg(short = 'd', long)]
    devices: bool,

    /// Replay IQ from a raw int16 file instead of a live device
    #[arg(long)]
    iq_file: Option<PathBuf>,

    /// Enable the AGC loop
    #[arg(short = 'n', long)]
    agc: bool,

    /// Minimum tuner gain reduction in dB, also the starting value
    #[arg(short = 'g', long, default_value = "30")]
    gain: i32,

    /// Maximum tuner gain reduction in dB
    #[arg(short = 'G', long, default_value = "59")]
    max_gain: i32,

    /// Amplitude above which a sample counts toward overload
    #[arg(short = 'a', long, default_value = "16384")]
    increase_threshold: i32,

    /// Peak amplitude below which a window counts as quiet
    #[arg(short = 'b', long, default_value = "8192")]
    decrease_threshold: i32,

    /// AGC window length in ms
    #[arg(short = 'c', long, default_value = "500")]
    window: i32,

    /// Overload samples per window needed to raise attenuation
    #[arg(short = 'x', long, default_value = "4096")]
    overload_count: i32,

    /// Holdoff before attenuation may be raised again, ms
    #[arg(short = 'y', long, default_value = "1000")]
    increase_time: i32,

    /// Holdoff before attenuation may be lowered again, ms
    #[arg(short = 'z', long, default_value = "5000")]
    decrease_time: i32,

    /// Attenuation raise per decision, dB
    #[arg(short = 'S', long, default_value = "1")]
    step_up: i32,

    /// Attenuation drop per decision, dB
    #[arg(short = 's', long, default_value = "1")]
    step_down: i32,

    /// AGC trace period in ms, 0 disables
    #[arg(short = 'w', long, default_value = "0")]
    debug_period: i32,

    /// Write the current gain reduction (relative to the floor) to this file
    #[arg(short = 'e', long)]
    gain_file: Option<PathBuf>,

    /// Write raw IQ to a file instead of stdout
    #[arg(short = 'o', long)]
    out: Option<PathBuf>,

    /// Play I/Q through the default audio device instead of writing raw IQ
    #[arg(long)]
    play: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if cli.devices {
        list_devices();
        return;
    }

    let rate = match cli.rate {
        Some(r) => r,
        None => {
            eprintln!("no sample rate specified (use -r)");
            std::process::exit(1);
        }
    };

    let config = AgcConfig {
        enabled: cli.agc,
        increase_threshold: cli.increase_threshold,
        decrease_threshold: cli.decrease_threshold,
        window_ms: cli.window,
        overload_count: cli.overload_count,
        increase_time_ms: cli.increase_time,
        decrease_time_ms: cli.decrease_time,
        increase_step: cli.step_up,
        decrease_step: cli.step_down,
        min_gain: cli.gain,
        max_gain: cli.max_gain,
        sample_rate: rate,
        debug_period_ms: cli.debug_period,
    };
    let config = match config.validated() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    if config.enabled {
        log::info!(
            "AGC: thresholds {}/{}, window {} ms, overload count {}, holdoff {}/{} ms, \
             steps +{}/-{} dB, gain {}..{} dB",
            config.increase_threshold,
            config.decrease_threshold,
            config.window_ms,
            config.overload_count,
            config.increase_time_ms,
            config.decrease_time_ms,
            config.increase_step,
            config.decrease_step,
            config.min_gain,
            config.max_gain,
        );
    }

    let output = pipeline::OutputConfig {
        out: cli.out,
        play: cli.play,
        gain_file: cli.gain_file,
    };

    let result = if let Some(ref path) = cli.iq_file {
        pipeline::run_file(path, config, output)
    } else {
        let freq = match cli.freq {
            Some(f) => f,
            None => {
                eprintln!("no frequency specified (use -f)");
                std::process::exit(1);
            }
        };
        let initial_gr_db = config.min_gain;
        pipeline::run_live(
            pipeline::LiveConfig {
                serial: cli.serial,
                freq_hz: freq,
                bandwidth_khz: cli.bandwidth,
                lna_state: cli.lna,
                wideband: cli.wideband,
                initial_gr_db,
                verbose: cli.verbose,
            },
            config,
            output,
        )
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "sdrplay")]
fn list_devices() {
    match rsp_sdr::sdrplay::list_devices() {
        Ok(devices) => {
            eprintln!("{} devices available:", devices.len());
            for d in &devices {
                eprintln!("    {} ({})", d.serial, d.hw_ver);
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "sdrplay"))]
fn list_devices() {
    eprintln!("built without sdrplay support");
    std::process::exit(1);
}
