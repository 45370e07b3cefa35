//! WASAPI microphone input.
//!
//! Opens a capture endpoint in shared mode on a dedicated MMCSS thread,
//! downmixes each packet to mono and re-blocks the stream into fixed
//! `block_len` slices before handing them to the core.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use windows::core::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use whisperguard_core::models::audio_models::{AudioSource, AudioTransportType};
use whisperguard_core::models::error::CaptureError;
use whisperguard_core::processing::wav_format::downmix_to_mono;
use whisperguard_core::traits::audio_input::{AudioInput, RawBlockCallback};

use crate::device_enumerator::{list_input_devices, resolve_capture_device, ComGuard};
use crate::permissions::check_microphone_access;

/// How long `build_graph` waits for the capture thread to report its format.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// 100 ms shared-mode buffer, in 100-ns units.
const BUFFER_DURATION: i64 = 1_000_000;

/// WASAPI shared-mode microphone.
pub struct WasapiMicInput {
    device_id: Option<String>,
    device_name: String,
    transport_type: Option<AudioTransportType>,
    acquired: bool,
    delivering: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    live_rate: Arc<AtomicU32>,
    /// Set by the capture thread when it dies after startup.
    fault: Arc<Mutex<Option<CaptureError>>>,
    capture_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl WasapiMicInput {
    /// The system default microphone.
    pub fn default_device() -> Self {
        Self::new(None, "Default Microphone".into(), None)
    }

    /// A specific microphone by endpoint id.
    pub fn with_device(id: String, name: String, transport: Option<AudioTransportType>) -> Self {
        Self::new(Some(id), name, transport)
    }

    /// Resolve `id` against the active endpoints, falling back to the default.
    pub fn from_config(device_id: Option<&str>) -> Self {
        let Some(id) = device_id else {
            return Self::default_device();
        };
        match list_input_devices() {
            Ok(devices) => match devices.into_iter().find(|d| d.id == id || d.name == id) {
                Some(d) => Self::with_device(d.id, d.name, d.transport_type),
                None => {
                    log::warn!("Microphone '{}' not found; using the default device", id);
                    Self::default_device()
                }
            },
            Err(e) => {
                log::warn!("Device enumeration failed ({}); using the default device", e);
                Self::default_device()
            }
        }
    }

    fn new(device_id: Option<String>, device_name: String, transport_type: Option<AudioTransportType>) -> Self {
        Self {
            device_id,
            device_name,
            transport_type,
            acquired: false,
            delivering: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            live_rate: Arc::new(AtomicU32::new(0)),
            fault: Arc::new(Mutex::new(None)),
            capture_handle: Mutex::new(None),
        }
    }
}

impl AudioInput for WasapiMicInput {
    fn is_available(&self) -> bool {
        list_input_devices().map(|d| !d.is_empty()).unwrap_or(false)
    }

    fn request_input(&mut self) -> std::result::Result<(), CaptureError> {
        check_microphone_access(self.device_id.as_deref())?.into_result()?;
        self.acquired = true;
        Ok(())
    }

    fn build_graph(&mut self, block_len: usize, on_block: RawBlockCallback) -> std::result::Result<(), CaptureError> {
        if !self.acquired {
            return Err(CaptureError::InvalidState("microphone not acquired".into()));
        }
        if self.capture_handle.lock().is_some() {
            return Err(CaptureError::InvalidState("mic capture already running".into()));
        }

        self.delivering.store(true, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        *self.fault.lock() = None;

        let (ready_tx, ready_rx) = mpsc::channel();
        let ctx = CaptureContext {
            running: Arc::clone(&self.running),
            delivering: Arc::clone(&self.delivering),
            live_rate: Arc::clone(&self.live_rate),
            device_id: self.device_id.clone(),
            block_len: block_len.max(1),
            on_block,
        };

        let fault = Arc::clone(&self.fault);
        let handle = thread::Builder::new()
            .name("wasapi-mic-capture".into())
            .spawn(move || {
                let running = Arc::clone(&ctx.running);
                let live_rate = Arc::clone(&ctx.live_rate);
                if let Err(e) = mic_capture_loop(ctx, &ready_tx) {
                    log::error!("Mic capture error: {}", e);
                    if live_rate.load(Ordering::SeqCst) != 0 {
                        *fault.lock() = Some(e);
                    } else {
                        let _ = ready_tx.send(Err(e));
                    }
                }
                live_rate.store(0, Ordering::SeqCst);
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn mic thread: {}", e)))?;

        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(rate)) => {
                log::info!("WASAPI capture started on '{}' at {} Hz", self.device_name, rate);
                *self.capture_handle.lock() = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(CaptureError::ConfigurationFailed("capture thread did not start".into()))
            }
        }
    }

    fn sample_rate(&self) -> Option<u32> {
        match self.live_rate.load(Ordering::SeqCst) {
            0 => None,
            rate => Some(rate),
        }
    }

    fn disconnect_graph(&mut self) -> std::result::Result<(), CaptureError> {
        self.delivering.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop_tracks(&mut self) -> std::result::Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.lock().take() {
            handle
                .join()
                .map_err(|_| CaptureError::Teardown("mic capture thread panicked".into()))?;
        }
        Ok(())
    }

    fn release_device(&mut self) -> std::result::Result<(), CaptureError> {
        self.acquired = false;
        Ok(())
    }

    fn take_fault(&mut self) -> Option<CaptureError> {
        self.fault.lock().take()
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: self.device_id.clone().unwrap_or_else(|| "default-mic".into()),
            name: self.device_name.clone(),
            is_default: self.device_id.is_none(),
            transport_type: self.transport_type,
        }
    }
}

impl Drop for WasapiMicInput {
    fn drop(&mut self) {
        let _ = self.disconnect_graph();
        let _ = self.stop_tracks();
    }
}

struct CaptureContext {
    running: Arc<AtomicBool>,
    delivering: Arc<AtomicBool>,
    live_rate: Arc<AtomicU32>,
    device_id: Option<String>,
    block_len: usize,
    on_block: RawBlockCallback,
}

/// Accumulates mono samples and emits exact `block_len` slices.
struct Reblocker {
    pending: Vec<f32>,
    block_len: usize,
}

impl Reblocker {
    fn new(block_len: usize) -> Self {
        Self {
            pending: Vec::with_capacity(block_len * 2),
            block_len,
        }
    }

    fn push(&mut self, mono: &[f32], emit: impl Fn(&[f32])) {
        self.pending.extend_from_slice(mono);
        let whole = self.pending.len() / self.block_len * self.block_len;
        for block in self.pending[..whole].chunks_exact(self.block_len) {
            emit(block);
        }
        self.pending.drain(..whole);
    }
}

/// Capture thread body.
///
/// Sequence: COM init, resolve endpoint, activate `IAudioClient`, initialize
/// in shared mode with the mix format, report the rate to `build_graph`,
/// register with MMCSS, then poll packets until `running` clears.
fn mic_capture_loop(
    ctx: CaptureContext,
    ready: &mpsc::Sender<std::result::Result<u32, CaptureError>>,
) -> std::result::Result<(), CaptureError> {
    let _com = ComGuard::init()?;
    unsafe {
        let enumerator: IMMDeviceEnumerator =
            CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(|_| CaptureError::DeviceNotAvailable)?;
        let device = resolve_capture_device(&enumerator, ctx.device_id.as_deref())?;

        let audio_client: IAudioClient = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("Activate failed: {}", e)))?;

        let mix_format_ptr = audio_client
            .GetMixFormat()
            .map_err(|e| CaptureError::ConfigurationFailed(format!("GetMixFormat failed: {}", e)))?;
        let mix_format = &*mix_format_ptr;
        let sample_rate = mix_format.nSamplesPerSec;
        let channels = mix_format.nChannels.max(1) as usize;

        let init = audio_client.Initialize(
            AUDCLNT_SHAREMODE_SHARED,
            AUDCLNT_STREAMFLAGS_NOPERSIST,
            BUFFER_DURATION,
            0,
            mix_format,
            None,
        );
        CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));
        init.map_err(|e| CaptureError::ConfigurationFailed(format!("IAudioClient::Initialize failed: {}", e)))?;

        let capture_client: IAudioCaptureClient = audio_client
            .GetService()
            .map_err(|e| CaptureError::ConfigurationFailed(format!("GetService failed: {}", e)))?;

        let mut task_index: u32 = 0;
        let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
        let _mmcss_handle = AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index);

        audio_client
            .Start()
            .map_err(|e| CaptureError::Unknown(format!("IAudioClient::Start failed: {}", e)))?;

        ctx.live_rate.store(sample_rate, Ordering::SeqCst);
        let _ = ready.send(Ok(sample_rate));

        let mut reblocker = Reblocker::new(ctx.block_len);
        let emit = |block: &[f32]| {
            if ctx.delivering.load(Ordering::SeqCst) {
                (ctx.on_block)(block);
            }
        };

        while ctx.running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(10));

            let mut packet_length = capture_client
                .GetNextPacketSize()
                .map_err(|e| CaptureError::Unknown(format!("GetNextPacketSize failed: {}", e)))?;

            while packet_length > 0 {
                let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
                let mut num_frames: u32 = 0;
                let mut flags: u32 = 0;

                capture_client
                    .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                    .map_err(|e| CaptureError::Unknown(format!("GetBuffer failed: {}", e)))?;

                if num_frames > 0 && !buffer_ptr.is_null() {
                    let frames = num_frames as usize;
                    if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                        reblocker.push(&vec![0.0f32; frames], emit);
                    } else {
                        let interleaved = std::slice::from_raw_parts(buffer_ptr as *const f32, frames * channels);
                        reblocker.push(&downmix_to_mono(interleaved, channels), emit);
                    }
                }

                capture_client
                    .ReleaseBuffer(num_frames)
                    .map_err(|e| CaptureError::Unknown(format!("ReleaseBuffer failed: {}", e)))?;

                packet_length = capture_client
                    .GetNextPacketSize()
                    .map_err(|e| CaptureError::Unknown(format!("GetNextPacketSize failed: {}", e)))?;
            }
        }

        let _ = audio_client.Stop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reblocker_emits_exact_blocks_and_keeps_residual() {
        let emitted = Mutex::new(Vec::new());
        let mut reblocker = Reblocker::new(4);

        reblocker.push(&[1.0; 3], |b| emitted.lock().push(b.to_vec()));
        assert!(emitted.lock().is_empty());

        reblocker.push(&[2.0; 6], |b| emitted.lock().push(b.to_vec()));
        let blocks = emitted.lock().clone();
        assert_eq!(blocks, vec![vec![1.0, 1.0, 1.0, 2.0], vec![2.0; 4]]);
        assert_eq!(reblocker.pending, vec![2.0]);
    }

    #[test]
    fn runtime_fault_is_handed_out_once() {
        let mut mic = WasapiMicInput::default_device();
        assert_eq!(mic.take_fault(), None);

        *mic.fault.lock() = Some(CaptureError::DeviceNotAvailable);
        assert_eq!(mic.take_fault(), Some(CaptureError::DeviceNotAvailable));
        assert_eq!(mic.take_fault(), None);
        assert_eq!(mic.sample_rate(), None);
    }
}
