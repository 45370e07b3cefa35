//! Capture endpoint enumeration via the MMDevice API.

use windows::core::*;
use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Foundation::PROPERTYKEY;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::StructuredStorage::{PropVariantClear, PROPVARIANT};
use windows::Win32::System::Com::*;
use windows::Win32::System::Variant::*;
use windows::Win32::UI::Shell::PropertiesSystem::IPropertyStore;

use whisperguard_core::models::audio_models::{AudioSource, AudioTransportType};
use whisperguard_core::models::error::CaptureError;

/// Balances a successful `CoInitializeEx` on the current thread.
pub(crate) struct ComGuard;

impl ComGuard {
    pub(crate) fn init() -> std::result::Result<Self, CaptureError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| CaptureError::Unknown(format!("CoInitializeEx failed: {}", e)))?;
        }
        Ok(Self)
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}

/// Look up a capture endpoint by id, or the default console capture endpoint.
pub(crate) unsafe fn resolve_capture_device(
    enumerator: &IMMDeviceEnumerator,
    device_id: Option<&str>,
) -> std::result::Result<IMMDevice, CaptureError> {
    match device_id {
        Some(id) => {
            let wide: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
            enumerator
                .GetDevice(PCWSTR(wide.as_ptr()))
                .map_err(|_| CaptureError::DeviceNotAvailable)
        }
        None => enumerator
            .GetDefaultAudioEndpoint(eCapture, eConsole)
            .map_err(|_| CaptureError::DeviceNotAvailable),
    }
}

/// Lists active microphones. Requires COM on the calling thread.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    pub fn new() -> std::result::Result<Self, CaptureError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| CaptureError::Unknown(format!("failed to create enumerator: {}", e)))?;
            Ok(Self { enumerator })
        }
    }

    pub fn default_capture_device_id(&self) -> std::result::Result<String, CaptureError> {
        unsafe {
            let device = resolve_capture_device(&self.enumerator, None)?;
            let id = device
                .GetId()
                .map_err(|e| CaptureError::Unknown(format!("GetId failed: {}", e)))?;
            Ok(id.to_string().unwrap_or_default())
        }
    }

    /// Active capture endpoints, default first.
    pub fn list_capture_devices(&self) -> std::result::Result<Vec<AudioSource>, CaptureError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(eCapture, DEVICE_STATE_ACTIVE)
                .map_err(|e| CaptureError::Unknown(format!("EnumAudioEndpoints failed: {}", e)))?;
            let count = collection
                .GetCount()
                .map_err(|e| CaptureError::Unknown(format!("GetCount failed: {}", e)))?;

            let default_id = self.default_capture_device_id().ok();
            let mut devices = Vec::with_capacity(count as usize);

            for i in 0..count {
                let Ok(device) = collection.Item(i) else { continue };
                let Some(id) = device.GetId().ok().and_then(|id| id.to_string().ok()) else {
                    continue;
                };

                let store = device.OpenPropertyStore(STGM_READ).ok();
                let name = store
                    .as_ref()
                    .and_then(|s| read_string_property(s, &PKEY_Device_FriendlyName))
                    .unwrap_or_else(|| format!("Microphone {}", i));
                let transport = store
                    .as_ref()
                    .and_then(|s| read_string_property(s, &PKEY_Device_EnumeratorName))
                    .map(|bus| transport_from_enumerator_name(&bus))
                    .unwrap_or(AudioTransportType::Unknown);

                devices.push(AudioSource {
                    is_default: default_id.as_deref() == Some(id.as_str()),
                    id,
                    name,
                    transport_type: Some(transport),
                });
            }

            devices.sort_by_key(|d| !d.is_default);
            Ok(devices)
        }
    }
}

/// Initialize COM on this thread and list capture endpoints.
pub fn list_input_devices() -> std::result::Result<Vec<AudioSource>, CaptureError> {
    let _com = ComGuard::init()?;
    DeviceEnumerator::new()?.list_capture_devices()
}

/// Read an `LPWSTR` property, clearing the variant afterwards.
unsafe fn read_string_property(store: &IPropertyStore, key: &PROPERTYKEY) -> Option<String> {
    let mut prop: PROPVARIANT = store.GetValue(key).ok()?;
    let value = if prop.Anonymous.Anonymous.vt == VT_LPWSTR {
        let pwsz = prop.Anonymous.Anonymous.Anonymous.pwszVal;
        if pwsz.is_null() {
            None
        } else {
            let len = (0..).take_while(|&i| *pwsz.offset(i) != 0).count();
            Some(String::from_utf16_lossy(std::slice::from_raw_parts(pwsz, len)))
        }
    } else {
        None
    };
    PropVariantClear(&mut prop).ok();
    value
}

/// Classify a device by its PnP enumerator (bus) name.
pub fn transport_from_enumerator_name(bus: &str) -> AudioTransportType {
    let bus = bus.to_ascii_uppercase();
    if bus.contains("BTHLEENUM") {
        AudioTransportType::BluetoothLE
    } else if bus.contains("BTHENUM") {
        AudioTransportType::Bluetooth
    } else if bus.contains("USB") {
        AudioTransportType::Usb
    } else if bus.contains("SWD") || bus.contains("ROOT") {
        AudioTransportType::Virtual
    } else {
        AudioTransportType::BuiltIn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_bus_names() {
        assert_eq!(transport_from_enumerator_name("BTHENUM"), AudioTransportType::Bluetooth);
        assert_eq!(transport_from_enumerator_name("BTHLEENUM"), AudioTransportType::BluetoothLE);
        assert_eq!(transport_from_enumerator_name("usb"), AudioTransportType::Usb);
        assert_eq!(transport_from_enumerator_name("SWD"), AudioTransportType::Virtual);
        assert_eq!(transport_from_enumerator_name("HDAUDIO"), AudioTransportType::BuiltIn);
    }
}
