// Copyright 2025-2026 CEMAXECUTER LLC

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::Sender;

use crate::{BlockSource, GainControl, HardwareError, SampleBlock};

const SDRPLAY_SUCCESS: c_int = 0;
const MAX_DEVICES: usize = 8;
const SER_NO_LEN: usize = 64;

/// sdrplay_api_TunerSelectT
const TUNER_BOTH: c_int = 3;

/// sdrplay_api_ReasonForUpdateT
const UPDATE_TUNER_GR: c_uint = 0x04;
/// sdrplay_api_ReasonForUpdateExtension1T
const UPDATE_EXT1_NONE: c_uint = 0;

/// sdrplay_api_AgcControlT: the hardware AGC stays off, the gain loop
/// runs on the host side.
const AGC_DISABLE: c_int = 0;

/// sdrplay_api_If_kHzT zero-IF
const IF_ZERO: c_int = 0;

/// Baseband filter widths the tuner accepts (sdrplay_api_Bw_MHzT, in kHz).
pub const VALID_BANDWIDTHS_KHZ: [u32; 5] = [200, 300, 600, 1536, 5000];

type Handle = *mut c_void;

#[repr(C)]
#[derive(Clone, Copy)]
struct DeviceT {
    ser_no: [c_char; SER_NO_LEN],
    hw_ver: u8,
    tuner: c_int,
    rsp_duo_mode: c_int,
    valid: u8,
    rsp_duo_sample_freq: f64,
    dev: Handle,
}

#[repr(C)]
struct DeviceParamsT {
    dev_params: *mut DevParamsT,
    rx_channel_a: *mut RxChannelParamsT,
    rx_channel_b: *mut RxChannelParamsT,
}

#[repr(C)]
struct FsFreqT {
    fs_hz: f64,
    sync_update: u8,
    re_cal: u8,
}

/// Leading fields of sdrplay_api_DevParamsT. The API owns the allocation;
/// only the sample-clock block is ever touched here.
#[repr(C)]
struct DevParamsT {
    ppm: f64,
    fs_freq: FsFreqT,
}

#[repr(C)]
struct GainValuesT {
    curr: f32,
    max: f32,
    min: f32,
}

#[repr(C)]
struct GainT {
    gr_db: c_int,
    lna_state: u8,
    sync_update: u8,
    min_gr: c_int,
    gain_vals: GainValuesT,
}

#[repr(C)]
struct RfFreqT {
    rf_hz: f64,
    sync_update: u8,
}

#[repr(C)]
struct DcOffsetTunerT {
    dc_cal: u8,
    speed_up: u8,
    track_time: c_int,
    refresh_rate_time: c_int,
}

#[repr(C)]
struct TunerParamsT {
    bw_type: c_int,
    if_type: c_int,
    lo_mode: c_int,
    gain: GainT,
    rf_freq: RfFreqT,
    dc_offset_tuner: DcOffsetTunerT,
}

#[repr(C)]
struct DcOffsetT {
    dc_enable: u8,
    iq_enable: u8,
}

#[repr(C)]
struct DecimationT {
    enable: u8,
    decimation_factor: u8,
    wide_band_signal: u8,
}

#[repr(C)]
struct AgcT {
    enable: c_int,
    set_point_dbfs: c_int,
    attack_ms: u16,
    decay_ms: u16,
    decay_delay_ms: u16,
    decay_threshold_db: u16,
    sync_update: c_int,
}

#[repr(C)]
struct ControlParamsT {
    dc_offset: DcOffsetT,
    decimation: DecimationT,
    agc: AgcT,
    adsb_mode: c_int,
}

/// Leading fields of sdrplay_api_RxChannelParamsT; the RSP-model-specific
/// tails are never touched here.
#[repr(C)]
struct RxChannelParamsT {
    tuner_params: TunerParamsT,
    ctrl_params: ControlParamsT,
}

#[repr(C)]
struct StreamCbParamsT {
    first_sample_num: c_uint,
    gr_changed: c_int,
    rf_changed: c_int,
    fs_changed: c_int,
    num_samples: c_uint,
}

type StreamCallback = unsafe extern "C" fn(
    xi: *mut i16,
    xq: *mut i16,
    params: *mut StreamCbParamsT,
    num_samples: c_uint,
    reset: c_uint,
    cb_context: *mut c_void,
);

type EventCallback = unsafe extern "C" fn(
    event_id: c_int,
    tuner: c_int,
    params: *mut c_void,
    cb_context: *mut c_void,
);

#[repr(C)]
struct CallbackFnsT {
    stream_a_cb_fn: Option<StreamCallback>,
    stream_b_cb_fn: Option<StreamCallback>,
    event_cb_fn: Option<EventCallback>,
}

extern "C" {
    fn sdrplay_api_Open() -> c_int;
    fn sdrplay_api_Close() -> c_int;
    fn sdrplay_api_LockDeviceApi() -> c_int;
    fn sdrplay_api_UnlockDeviceApi() -> c_int;
    fn sdrplay_api_GetDevices(
        devices: *mut DeviceT,
        num_devs: *mut c_uint,
        max_devs: c_uint,
    ) -> c_int;
    fn sdrplay_api_SelectDevice(device: *mut DeviceT) -> c_int;
    fn sdrplay_api_ReleaseDevice(device: *mut DeviceT) -> c_int;
    fn sdrplay_api_GetErrorString(err: c_int) -> *const c_char;
    fn sdrplay_api_DebugEnable(dev: Handle, enable: c_int) -> c_int;
    fn sdrplay_api_GetDeviceParams(dev: Handle, device_params: *mut *mut DeviceParamsT) -> c_int;
    fn sdrplay_api_Init(dev: Handle, callback_fns: *mut CallbackFnsT, cb_context: *mut c_void)
        -> c_int;
    fn sdrplay_api_Uninit(dev: Handle) -> c_int;
    fn sdrplay_api_Update(dev: Handle, tuner: c_int, reason: c_uint, reason_ext1: c_uint) -> c_int;
}

unsafe fn err_string(code: c_int) -> String {
    let p = sdrplay_api_GetErrorString(code);
    if p.is_null() {
        format!("error {}", code)
    } else {
        CStr::from_ptr(p).to_string_lossy().into_owned()
    }
}

fn serial_of(device: &DeviceT) -> String {
    unsafe {
        CStr::from_ptr(device.ser_no.as_ptr())
            .to_string_lossy()
            .into_owned()
    }
}

/// Hardware decimation for each supported output rate: (factor, shift).
/// The ADC always runs at rate << shift = 3.072 MHz and the API decimates
/// back down to the requested rate.
pub fn decimation_for_rate(rate: u32) -> Option<(u8, u32)> {
    match rate {
        96_000 => Some((32, 5)),
        192_000 => Some((16, 4)),
        384_000 => Some((8, 3)),
        768_000 => Some((4, 2)),
        _ => None,
    }
}

/// Information about a detected RSP device
#[derive(Debug, Clone)]
pub struct SdrplayInfo {
    pub serial: String,
    pub hw_ver: u8,
}

/// List all available RSP devices
pub fn list_devices() -> Result<Vec<SdrplayInfo>, String> {
    unsafe {
        let r = sdrplay_api_Open();
        if r != SDRPLAY_SUCCESS {
            return Err(format!("sdrplay_api_Open failed: {}", err_string(r)));
        }

        sdrplay_api_LockDeviceApi();

        let mut devices: [DeviceT; MAX_DEVICES] = std::mem::zeroed();
        let mut num_devs: c_uint = 0;
        let r = sdrplay_api_GetDevices(
            devices.as_mut_ptr(),
            &mut num_devs,
            MAX_DEVICES as c_uint,
        );
        if r != SDRPLAY_SUCCESS {
            sdrplay_api_UnlockDeviceApi();
            sdrplay_api_Close();
            return Err(format!("sdrplay_api_GetDevices failed: {}", err_string(r)));
        }

        let mut out = Vec::with_capacity(num_devs as usize);
        for device in devices.iter().take(num_devs as usize) {
            out.push(SdrplayInfo {
                serial: serial_of(device),
                hw_ver: device.hw_ver,
            });
        }

        sdrplay_api_UnlockDeviceApi();
        sdrplay_api_Close();
        Ok(out)
    }
}

/// Context passed to the stream callback
struct StreamContext {
    tx: Sender<SampleBlock>,
}

unsafe extern "C" fn stream_a_callback(
    xi: *mut i16,
    xq: *mut i16,
    params: *mut StreamCbParamsT,
    num_samples: c_uint,
    reset: c_uint,
    cb_context: *mut c_void,
) {
    let n = num_samples as usize;
    if n == 0 {
        return;
    }

    let ctx = &*(cb_context as *const StreamContext);
    let xi = std::slice::from_raw_parts(xi, n);
    let xq = std::slice::from_raw_parts(xq, n);

    // Full channel drops backpressure on the callback thread; the next
    // block simply supersedes the lost one.
    let _ = ctx.tx.try_send(SampleBlock {
        xi: xi.to_vec(),
        xq: xq.to_vec(),
        num_samples: n,
        reset: reset != 0,
        gain_change_pending: (*params).gr_changed != 0,
    });
}

unsafe extern "C" fn event_callback(
    event_id: c_int,
    _tuner: c_int,
    _params: *mut c_void,
    _cb_context: *mut c_void,
) {
    // sdrplay_api_EventT
    match event_id {
        0 => log::debug!("sdrplay event: gain change"),
        1 => log::warn!("sdrplay event: power overload"),
        2 => log::error!("sdrplay event: device removed"),
        3 => log::debug!("sdrplay event: RSPduo mode change"),
        other => log::debug!("sdrplay event: {}", other),
    }
}

/// RSP tuning parameters
#[derive(Debug, Clone)]
pub struct SdrplayConfig {
    /// Select the device whose serial contains this string (case-insensitive).
    pub serial: Option<String>,
    pub freq_hz: u32,
    /// Output sample rate after hardware decimation. Must be one of
    /// 96000, 192000, 384000 or 768000.
    pub sample_rate: u32,
    pub bandwidth_khz: u32,
    pub lna_state: u8,
    pub wideband: bool,
    /// Tuner gain reduction programmed before streaming starts, in dB.
    pub initial_gr_db: i32,
    /// Forward API debug output to stderr.
    pub verbose: bool,
}

/// A selected and configured RSP device, not yet streaming.
/// split() hands out the streaming and gain-command halves.
pub struct SdrplayDevice {
    device: DeviceT,
    params: *mut DeviceParamsT,
    sample_rate: u32,
}

// Single owner until split(); the API handle itself is thread-safe.
unsafe impl Send for SdrplayDevice {}

impl SdrplayDevice {
    pub fn open(cfg: &SdrplayConfig) -> Result<Self, String> {
        let (factor, shift) = decimation_for_rate(cfg.sample_rate)
            .ok_or_else(|| format!("unsupported sample rate: {}", cfg.sample_rate))?;
        if !VALID_BANDWIDTHS_KHZ.contains(&cfg.bandwidth_khz) {
            return Err(format!("unsupported bandwidth: {} kHz", cfg.bandwidth_khz));
        }

        unsafe {
            let r = sdrplay_api_Open();
            if r != SDRPLAY_SUCCESS {
                return Err(format!("sdrplay_api_Open failed: {}", err_string(r)));
            }

            sdrplay_api_DebugEnable(ptr::null_mut(), cfg.verbose as c_int);
            sdrplay_api_LockDeviceApi();

            let mut devices: [DeviceT; MAX_DEVICES] = std::mem::zeroed();
            let mut num_devs: c_uint = 0;
            let r = sdrplay_api_GetDevices(
                devices.as_mut_ptr(),
                &mut num_devs,
                MAX_DEVICES as c_uint,
            );
            if r != SDRPLAY_SUCCESS {
                sdrplay_api_UnlockDeviceApi();
                sdrplay_api_Close();
                return Err(format!("sdrplay_api_GetDevices failed: {}", err_string(r)));
            }
            if num_devs == 0 {
                sdrplay_api_UnlockDeviceApi();
                sdrplay_api_Close();
                return Err("no RSP devices found".to_string());
            }

            let mut index = 0usize;
            if let Some(ref wanted) = cfg.serial {
                let needle = wanted.to_ascii_lowercase();
                let mut found = false;
                for (i, device) in devices.iter().take(num_devs as usize).enumerate() {
                    if serial_of(device).to_ascii_lowercase().contains(&needle) {
                        index = i;
                        found = true;
                    }
                }
                if !found {
                    sdrplay_api_UnlockDeviceApi();
                    sdrplay_api_Close();
                    return Err(format!("device {} not found", wanted));
                }
            }

            let r = sdrplay_api_SelectDevice(&mut devices[index]);
            if r != SDRPLAY_SUCCESS {
                sdrplay_api_UnlockDeviceApi();
                sdrplay_api_Close();
                return Err(format!("sdrplay_api_SelectDevice failed: {}", err_string(r)));
            }

            sdrplay_api_UnlockDeviceApi();

            let mut device = devices[index];
            let mut params: *mut DeviceParamsT = ptr::null_mut();
            let r = sdrplay_api_GetDeviceParams(device.dev, &mut params);
            if r != SDRPLAY_SUCCESS || params.is_null() {
                sdrplay_api_ReleaseDevice(&mut device);
                sdrplay_api_Close();
                return Err(format!(
                    "sdrplay_api_GetDeviceParams failed: {}",
                    err_string(r)
                ));
            }

            (*(*params).dev_params).fs_freq.fs_hz = (cfg.sample_rate << shift) as f64;

            let ch = (*params).rx_channel_a;
            (*ch).tuner_params.rf_freq.rf_hz = cfg.freq_hz as f64;
            (*ch).tuner_params.bw_type = cfg.bandwidth_khz as c_int;
            (*ch).tuner_params.if_type = IF_ZERO;
            (*ch).tuner_params.gain.gr_db = cfg.initial_gr_db;
            (*ch).tuner_params.gain.lna_state = cfg.lna_state;
            (*ch).ctrl_params.decimation.enable = 1;
            (*ch).ctrl_params.decimation.decimation_factor = factor;
            (*ch).ctrl_params.decimation.wide_band_signal = cfg.wideband as u8;
            (*ch).ctrl_params.agc.enable = AGC_DISABLE;

            log::info!(
                "RSP {} (hw {}) tuned to {} Hz, {} S/s (decimation {}), BW {} kHz, LNA {}, GR {} dB",
                serial_of(&device),
                device.hw_ver,
                cfg.freq_hz,
                cfg.sample_rate,
                factor,
                cfg.bandwidth_khz,
                cfg.lna_state,
                cfg.initial_gr_db,
            );

            Ok(Self {
                device,
                params,
                sample_rate: cfg.sample_rate,
            })
        }
    }

    /// Split into the streaming half and the gain-command half. The gain
    /// half stays valid while the source is streaming; once the source has
    /// torn the device down, further updates are rejected by the API.
    pub fn split(self) -> (SdrplaySource, SdrplayGain) {
        let gain = SdrplayGain {
            dev: self.device.dev,
            params: self.params,
        };
        let source = SdrplaySource {
            device: self.device,
            sample_rate: self.sample_rate,
            running: Arc::new(AtomicBool::new(false)),
        };
        (source, gain)
    }
}

/// Streaming half of an opened RSP device
pub struct SdrplaySource {
    device: DeviceT,
    sample_rate: u32,
    running: Arc<AtomicBool>,
}

// Device struct moves to the streaming thread as a single owner
unsafe impl Send for SdrplaySource {}

impl SdrplaySource {
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }
}

impl BlockSource for SdrplaySource {
    fn start(&mut self, tx: Sender<SampleBlock>) -> Result<(), String> {
        self.running.store(true, Ordering::SeqCst);

        unsafe {
            // Heap context handed to the callback; freed after Uninit.
            let ctx = Box::into_raw(Box::new(StreamContext { tx }));

            let mut callbacks = CallbackFnsT {
                stream_a_cb_fn: Some(stream_a_callback),
                stream_b_cb_fn: None,
                event_cb_fn: Some(event_callback),
            };

            let r = sdrplay_api_Init(self.device.dev, &mut callbacks, ctx as *mut c_void);
            if r != SDRPLAY_SUCCESS {
                let _ = Box::from_raw(ctx);
                sdrplay_api_ReleaseDevice(&mut self.device);
                sdrplay_api_Close();
                return Err(format!("sdrplay_api_Init failed: {}", err_string(r)));
            }

            log::info!("RSP streaming started");

            // Block until stopped
            while self.running.load(Ordering::SeqCst) {
                std::thread::sleep(std::time::Duration::from_millis(100));
            }

            sdrplay_api_Uninit(self.device.dev);
            sdrplay_api_ReleaseDevice(&mut self.device);
            sdrplay_api_Close();
            let _ = Box::from_raw(ctx);

            log::info!("RSP streaming stopped");
        }

        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Gain-command half of an opened RSP device
pub struct SdrplayGain {
    dev: Handle,
    params: *mut DeviceParamsT,
}

// Update calls are serialized inside the API
unsafe impl Send for SdrplayGain {}

impl GainControl for SdrplayGain {
    fn set_gain_reduction(&mut self, db: i32) -> Result<(), HardwareError> {
        unsafe {
            let ch = (*self.params).rx_channel_a;
            (*ch).tuner_params.gain.gr_db = db;
            let r = sdrplay_api_Update(self.dev, TUNER_BOTH, UPDATE_TUNER_GR, UPDATE_EXT1_NONE);
            if r != SDRPLAY_SUCCESS {
                return Err(HardwareError {
                    code: r,
                    detail: err_string(r),
                });
            }
        }
        log::debug!("tuner gain reduction set to {} dB", db);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimation_table_reaches_adc_rate() {
        for rate in [96_000u32, 192_000, 384_000, 768_000] {
            let (factor, shift) = decimation_for_rate(rate).unwrap();
            assert_eq!(rate << shift, 3_072_000);
            assert_eq!(factor as u32, 1 << shift);
        }
        assert!(decimation_for_rate(48_000).is_none());
        assert!(decimation_for_rate(1_536_000).is_none());
    }
}
