use whisperguard_core::testing::SyntheticInput;
use whisperguard_core::{AudioInput, AudioSource, CaptureConfiguration};

pub type BoxedInput = Box<dyn AudioInput>;

/// Pick the capture backend for this platform.
#[cfg(target_os = "windows")]
pub fn open(config: &CaptureConfiguration, synthetic: bool) -> BoxedInput {
    if synthetic {
        return Box::new(SyntheticInput::new(config.fallback_sample_rate));
    }
    Box::new(whisperguard_windows::WasapiMicInput::from_config(config.mic_device_id.as_deref()))
}

#[cfg(not(target_os = "windows"))]
pub fn open(config: &CaptureConfiguration, synthetic: bool) -> BoxedInput {
    if !synthetic {
        log::warn!("No hardware backend for this platform; using the synthetic tone");
    }
    Box::new(SyntheticInput::new(config.fallback_sample_rate))
}

#[cfg(target_os = "windows")]
pub fn list_devices() -> anyhow::Result<Vec<AudioSource>> {
    Ok(whisperguard_windows::list_input_devices()?)
}

#[cfg(not(target_os = "windows"))]
pub fn list_devices() -> anyhow::Result<Vec<AudioSource>> {
    Ok(vec![SyntheticInput::new(CaptureConfiguration::default().fallback_sample_rate).device_info()])
}
