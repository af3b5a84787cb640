//! WASAPI host for Windows
//!
//! Direct bindings through the `windows` crate:
//! - IMMDeviceEnumerator for endpoint enumeration and the default device
//! - IPropertyStore for friendly names (PKEY_Device_FriendlyName)
//! - IAudioClient for the session (period, initialize, start/stop/reset)
//! - IAudioRenderClient for GetBuffer/ReleaseBuffer
//!
//! COM references are released by `Drop` on the interface wrappers.
//! This file is only compiled on Windows via #[cfg(target_os = "windows")]

use std::slice;
use std::time::Duration;

use windows::core::{HSTRING, PCWSTR, PWSTR};
use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::Media::Audio::{
    eConsole, eRender, IAudioClient, IAudioRenderClient, IMMDevice, IMMDeviceEnumerator,
    MMDeviceEnumerator, AUDCLNT_SHAREMODE_EXCLUSIVE, AUDCLNT_SHAREMODE_SHARED,
    AUDCLNT_STREAMFLAGS_EVENTCALLBACK, AUDCLNT_STREAMFLAGS_NOPERSIST, DEVICE_STATE_ACTIVE,
    WAVEFORMATEX, WAVEFORMATEXTENSIBLE, WAVEFORMATEXTENSIBLE_0,
};
use windows::Win32::Media::KernelStreaming::{KSDATAFORMAT_SUBTYPE_PCM, WAVE_FORMAT_EXTENSIBLE};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoTaskMemFree, CoUninitialize, CLSCTX_ALL,
    COINIT_MULTITHREADED, STGM_READ,
};
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject};

use crate::audio::check::check;
use crate::audio::error::{AudioBackendError, HostError, HostResult, Result};
use crate::audio::host::{AudioHost, HostClient, HostEndpoint, HostRenderer};
use crate::audio::types::{DeviceState, ExclusiveMode, StreamFormat};

/// Translate a COM error with the system message table
fn host_err(e: windows::core::Error) -> HostError {
    let message = e.message();
    if message.is_empty() {
        HostError::from_code(e.code().0)
    } else {
        HostError::with_message(e.code().0, message.trim_end())
    }
}

/// REFERENCE_TIME is expressed in 100 ns units
fn to_reference_time(period: Duration) -> i64 {
    (period.as_nanos() / 100) as i64
}

fn from_reference_time(hns: i64) -> Duration {
    Duration::from_nanos(hns.max(0) as u64 * 100)
}

fn wave_format(format: &StreamFormat) -> WAVEFORMATEXTENSIBLE {
    WAVEFORMATEXTENSIBLE {
        Format: WAVEFORMATEX {
            wFormatTag: WAVE_FORMAT_EXTENSIBLE as u16,
            nChannels: format.channels,
            nSamplesPerSec: format.sample_rate,
            nAvgBytesPerSec: format.avg_bytes_per_sec(),
            nBlockAlign: format.block_align(),
            wBitsPerSample: format.bits_per_sample,
            cbSize: (std::mem::size_of::<WAVEFORMATEXTENSIBLE>() - std::mem::size_of::<WAVEFORMATEX>())
                as u16,
        },
        Samples: WAVEFORMATEXTENSIBLE_0 {
            wValidBitsPerSample: format.valid_bits_per_sample,
        },
        dwChannelMask: format.channel_mask.0,
        SubFormat: KSDATAFORMAT_SUBTYPE_PCM,
    }
}

/// Balances the CoInitializeEx done in [`WasapiHost::new`]
struct ComApartment;

impl Drop for ComApartment {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}

/// Host backed by the Windows multimedia device API
pub struct WasapiHost {
    enumerator: IMMDeviceEnumerator,
    // Last field: COM is torn down after the enumerator is released
    _apartment: ComApartment,
}

impl WasapiHost {
    /// Initialize COM and create the device enumerator
    pub fn new() -> Result<Self> {
        unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) }
            .ok()
            .map_err(|e| {
                AudioBackendError::Initialization(format!(
                    "Could not initialize COM library: {}",
                    host_err(e)
                ))
            })?;
        let apartment = ComApartment;

        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }.map_err(|e| {
                AudioBackendError::Initialization(format!(
                    "Could not initialize enumerator: {}",
                    host_err(e)
                ))
            })?;

        log::info!("[WASAPI] Host initialized");
        Ok(Self {
            enumerator,
            _apartment: apartment,
        })
    }
}

impl AudioHost for WasapiHost {
    type Endpoint = WasapiEndpoint;
    type Client = WasapiClient;

    fn render_endpoints(&self) -> HostResult<Vec<WasapiEndpoint>> {
        unsafe {
            let devices = self
                .enumerator
                .EnumAudioEndpoints(eRender, DEVICE_STATE_ACTIVE)
                .map_err(host_err)?;
            let count = devices.GetCount().map_err(host_err)?;

            let mut endpoints = Vec::with_capacity(count as usize);
            for i in 0..count {
                let item = devices.Item(i).map_err(host_err);
                if let Some(device) = check("Error retrieving device", item) {
                    endpoints.push(WasapiEndpoint { device });
                }
            }
            Ok(endpoints)
        }
    }

    fn default_render_endpoint(&self) -> HostResult<WasapiEndpoint> {
        let device = unsafe { self.enumerator.GetDefaultAudioEndpoint(eRender, eConsole) }
            .map_err(host_err)?;
        Ok(WasapiEndpoint { device })
    }

    fn endpoint(&self, id: &str) -> HostResult<WasapiEndpoint> {
        let device = unsafe { self.enumerator.GetDevice(&HSTRING::from(id)) }.map_err(host_err)?;
        Ok(WasapiEndpoint { device })
    }
}

pub struct WasapiEndpoint {
    device: IMMDevice,
}

impl HostEndpoint for WasapiEndpoint {
    type Client = WasapiClient;

    fn id(&self) -> HostResult<String> {
        unsafe {
            let raw: PWSTR = self.device.GetId().map_err(host_err)?;
            let id = raw.to_string();
            CoTaskMemFree(Some(raw.0 as *const _));
            id.map_err(|_| HostError::from_code(crate::audio::error::hresult::E_INVALIDARG))
        }
    }

    fn friendly_name(&self) -> HostResult<String> {
        unsafe {
            let store = self.device.OpenPropertyStore(STGM_READ).map_err(host_err)?;
            let value = store.GetValue(&PKEY_Device_FriendlyName).map_err(host_err)?;
            Ok(value.to_string())
        }
    }

    fn state(&self) -> HostResult<DeviceState> {
        let state = unsafe { self.device.GetState() }.map_err(host_err)?;
        Ok(if state == DEVICE_STATE_ACTIVE {
            DeviceState::Active
        } else {
            DeviceState::Inactive
        })
    }

    fn activate(&self) -> HostResult<WasapiClient> {
        let client: IAudioClient =
            unsafe { self.device.Activate(CLSCTX_ALL, None) }.map_err(host_err)?;
        Ok(WasapiClient {
            client,
            event: None,
            block_align: 0,
        })
    }
}

pub struct WasapiClient {
    client: IAudioClient,
    /// Signalled by the host once per period (event-driven scheduling)
    event: Option<HANDLE>,
    block_align: usize,
}

impl HostClient for WasapiClient {
    type Renderer = WasapiRenderer;

    fn device_period(&self) -> HostResult<Duration> {
        let mut minimum: i64 = 0;
        unsafe { self.client.GetDevicePeriod(None, Some(&mut minimum)) }.map_err(host_err)?;
        Ok(from_reference_time(minimum))
    }

    fn initialize(
        &mut self,
        mode: ExclusiveMode,
        period: Duration,
        format: &StreamFormat,
    ) -> HostResult<()> {
        let wave = wave_format(format);
        let duration = to_reference_time(period);
        // Shared mode requires a zero periodicity
        let (share_mode, periodicity) = match mode {
            ExclusiveMode::Exclusive => (AUDCLNT_SHAREMODE_EXCLUSIVE, duration),
            ExclusiveMode::Shared => (AUDCLNT_SHAREMODE_SHARED, 0),
        };

        unsafe {
            self.client
                .Initialize(
                    share_mode,
                    AUDCLNT_STREAMFLAGS_EVENTCALLBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
                    duration,
                    periodicity,
                    &wave as *const WAVEFORMATEXTENSIBLE as *const WAVEFORMATEX,
                    None,
                )
                .map_err(host_err)?;

            let event = CreateEventW(None, false, false, PCWSTR::null()).map_err(host_err)?;
            if let Err(e) = self.client.SetEventHandle(event) {
                let _ = CloseHandle(event);
                return Err(host_err(e));
            }
            self.event = Some(event);
        }

        self.block_align = format.block_align() as usize;
        Ok(())
    }

    fn buffer_size(&self) -> HostResult<u32> {
        unsafe { self.client.GetBufferSize() }.map_err(host_err)
    }

    fn padding(&self) -> HostResult<u32> {
        unsafe { self.client.GetCurrentPadding() }.map_err(host_err)
    }

    fn renderer(&self) -> HostResult<WasapiRenderer> {
        let renderer: IAudioRenderClient =
            unsafe { self.client.GetService() }.map_err(host_err)?;
        Ok(WasapiRenderer {
            renderer,
            block_align: self.block_align,
        })
    }

    fn start(&self) -> HostResult<()> {
        unsafe { self.client.Start() }.map_err(host_err)
    }

    fn stop(&self) -> HostResult<()> {
        unsafe { self.client.Stop() }.map_err(host_err)
    }

    fn reset(&self) -> HostResult<()> {
        unsafe { self.client.Reset() }.map_err(host_err)
    }

    fn wait_for_buffer(&self, timeout: Duration) -> bool {
        let Some(event) = self.event else {
            return false;
        };
        let millis = timeout.as_millis().min(u32::MAX as u128) as u32;
        unsafe { WaitForSingleObject(event, millis) == WAIT_OBJECT_0 }
    }
}

impl Drop for WasapiClient {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            unsafe {
                let _ = CloseHandle(event);
            }
        }
    }
}

pub struct WasapiRenderer {
    renderer: IAudioRenderClient,
    block_align: usize,
}

impl HostRenderer for WasapiRenderer {
    fn get_buffer(&mut self, frames: u32) -> HostResult<&mut [u8]> {
        let data = unsafe { self.renderer.GetBuffer(frames) }.map_err(host_err)?;
        if data.is_null() || frames == 0 {
            return Ok(&mut []);
        }
        // The region stays valid until ReleaseBuffer, which needs &mut self
        Ok(unsafe { slice::from_raw_parts_mut(data, frames as usize * self.block_align) })
    }

    fn release_buffer(&mut self, frames: u32) -> HostResult<()> {
        unsafe { self.renderer.ReleaseBuffer(frames, 0) }.map_err(host_err)
    }
}
