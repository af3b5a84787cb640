//! In-memory host audio subsystem
//!
//! Behaves like the WASAPI host as seen through the [`host`](crate::audio::host)
//! traits, without any hardware: endpoints are declared up front, the host
//! buffer is a ring buffer, and the "device" only consumes frames when
//! [`VirtualHost::drain`] is called. Used for headless runs and for tests.
//!
//! Host rules that matter to the backend are enforced with the same codes the
//! real host returns (double initialize, reset while running, oversized
//! buffer requests, out-of-order buffer calls, ...). Any call can be made to
//! fail with [`VirtualHost::fail`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;

use crate::audio::error::{hresult, HostError, HostResult};
use crate::audio::host::{AudioHost, HostClient, HostEndpoint, HostRenderer};
use crate::audio::types::{DeviceState, ExclusiveMode, StreamFormat};

/// Byte written into freshly acquired regions
pub const UNWRITTEN_BYTE: u8 = 0xCD;

/// Host calls that can be observed and failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCall {
    EnumEndpoints,
    DefaultEndpoint,
    GetDevice,
    GetId,
    OpenPropertyStore,
    GetState,
    Activate,
    GetDevicePeriod,
    Initialize,
    GetBufferSize,
    GetCurrentPadding,
    GetService,
    Start,
    Stop,
    Reset,
    GetBuffer,
    ReleaseBuffer,
}

/// Declaration of a virtual render endpoint
#[derive(Debug, Clone)]
pub struct VirtualEndpoint {
    pub id: String,
    pub name: String,
    pub state: DeviceState,
    /// Minimum device period reported to clients
    pub min_period: Duration,
    /// Host buffer capacity, in periods
    pub buffer_periods: u32,
    pub max_channels: u16,
    pub allow_exclusive: bool,
}

impl VirtualEndpoint {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            state: DeviceState::Active,
            min_period: Duration::from_millis(10),
            buffer_periods: 2,
            max_channels: 8,
            allow_exclusive: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.state = DeviceState::Inactive;
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.min_period = period;
        self
    }

    pub fn with_buffer_periods(mut self, periods: u32) -> Self {
        self.buffer_periods = periods.max(1);
        self
    }

    pub fn with_max_channels(mut self, channels: u16) -> Self {
        self.max_channels = channels;
        self
    }

    pub fn exclusive_allowed(mut self, allowed: bool) -> Self {
        self.allow_exclusive = allowed;
        self
    }
}

struct Shared {
    endpoints: Vec<VirtualEndpoint>,
    default_id: Option<String>,
    failures: HashMap<HostCall, i32>,
    calls: Vec<HostCall>,
    last_session: Option<Arc<Mutex<SessionState>>>,
}

struct SessionState {
    endpoint_id: String,
    init: Option<SessionInit>,
    running: bool,
    resets: usize,
    played: Vec<u8>,
}

struct SessionInit {
    mode: ExclusiveMode,
    format: StreamFormat,
    buffer_frames: u32,
    block_align: usize,
    ring: HeapRb<u8>,
}

impl SessionState {
    fn init(&self) -> HostResult<&SessionInit> {
        self.init
            .as_ref()
            .ok_or_else(|| HostError::from_code(hresult::AUDCLNT_E_NOT_INITIALIZED))
    }

    fn init_mut(&mut self) -> HostResult<&mut SessionInit> {
        self.init
            .as_mut()
            .ok_or_else(|| HostError::from_code(hresult::AUDCLNT_E_NOT_INITIALIZED))
    }
}

impl SessionInit {
    fn queued_frames(&self) -> u32 {
        (self.ring.occupied_len() / self.block_align) as u32
    }

    fn has_space(&self) -> bool {
        self.queued_frames() < self.buffer_frames
    }
}

#[derive(Clone)]
struct Inner {
    shared: Arc<Mutex<Shared>>,
    live: Arc<AtomicUsize>,
}

impl Inner {
    /// Record a call and apply any injected failure
    fn enter(&self, call: HostCall) -> HostResult<()> {
        let mut shared = self.shared.lock();
        shared.calls.push(call);
        match shared.failures.get(&call) {
            Some(&code) => Err(HostError::from_code(code)),
            None => Ok(()),
        }
    }

    fn guard(&self) -> HandleGuard {
        self.live.fetch_add(1, Ordering::SeqCst);
        HandleGuard {
            live: Arc::clone(&self.live),
        }
    }

    fn endpoint_handle(&self, spec: VirtualEndpoint) -> VirtualEndpointHandle {
        VirtualEndpointHandle {
            inner: self.clone(),
            spec,
            _guard: self.guard(),
        }
    }
}

/// Counts one live host handle until dropped
struct HandleGuard {
    live: Arc<AtomicUsize>,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory host. Clones share the same endpoints and sessions.
#[derive(Clone)]
pub struct VirtualHost {
    inner: Inner,
}

impl Default for VirtualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualHost {
    /// A host with no endpoints and no default device
    pub fn new() -> Self {
        Self {
            inner: Inner {
                shared: Arc::new(Mutex::new(Shared {
                    endpoints: Vec::new(),
                    default_id: None,
                    failures: HashMap::new(),
                    calls: Vec::new(),
                    last_session: None,
                })),
                live: Arc::new(AtomicUsize::new(0)),
            },
        }
    }

    /// A host with one active stereo/7.1-capable default endpoint
    pub fn with_default_device(id: &str, name: &str) -> Self {
        Self::new()
            .with_endpoint(VirtualEndpoint::new(id, name))
            .with_default(id)
    }

    pub fn with_endpoint(self, endpoint: VirtualEndpoint) -> Self {
        self.add_endpoint(endpoint);
        self
    }

    pub fn with_default(self, id: &str) -> Self {
        self.set_default(Some(id));
        self
    }

    pub fn add_endpoint(&self, endpoint: VirtualEndpoint) {
        self.inner.shared.lock().endpoints.push(endpoint);
    }

    pub fn remove_endpoint(&self, id: &str) {
        self.inner.shared.lock().endpoints.retain(|e| e.id != id);
    }

    pub fn set_default(&self, id: Option<&str>) {
        self.inner.shared.lock().default_id = id.map(str::to_string);
    }

    /// Make every subsequent `call` fail with `code`
    pub fn fail(&self, call: HostCall, code: i32) {
        self.inner.shared.lock().failures.insert(call, code);
    }

    pub fn clear_failure(&self, call: HostCall) {
        self.inner.shared.lock().failures.remove(&call);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.inner.shared.lock().calls.clone()
    }

    pub fn call_count(&self, call: HostCall) -> usize {
        self.inner
            .shared
            .lock()
            .calls
            .iter()
            .filter(|&&c| c == call)
            .count()
    }

    pub fn clear_calls(&self) {
        self.inner.shared.lock().calls.clear();
    }

    /// Endpoint, client and renderer handles currently alive
    pub fn live_handles(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    fn with_session<T>(&self, f: impl FnOnce(&mut SessionState) -> T) -> Option<T> {
        let session = self.inner.shared.lock().last_session.clone()?;
        let mut state = session.lock();
        Some(f(&mut state))
    }

    /// Endpoint id of the most recently activated session
    pub fn session_endpoint(&self) -> Option<String> {
        self.with_session(|s| s.endpoint_id.clone())
    }

    pub fn session_format(&self) -> Option<StreamFormat> {
        self.with_session(|s| s.init.as_ref().map(|i| i.format))
            .flatten()
    }

    pub fn session_mode(&self) -> Option<ExclusiveMode> {
        self.with_session(|s| s.init.as_ref().map(|i| i.mode))
            .flatten()
    }

    pub fn session_buffer_frames(&self) -> Option<u32> {
        self.with_session(|s| s.init.as_ref().map(|i| i.buffer_frames))
            .flatten()
    }

    pub fn is_running(&self) -> bool {
        self.with_session(|s| s.running).unwrap_or(false)
    }

    pub fn reset_count(&self) -> usize {
        self.with_session(|s| s.resets).unwrap_or(0)
    }

    /// Committed bytes not yet consumed by the device
    pub fn queued_bytes(&self) -> Vec<u8> {
        self.with_session(|s| {
            s.init
                .as_ref()
                .map(|i| i.ring.iter().copied().collect())
                .unwrap_or_default()
        })
        .unwrap_or_default()
    }

    pub fn queued_frames(&self) -> u32 {
        self.with_session(|s| s.init.as_ref().map(SessionInit::queued_frames).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Let the device consume up to `frames` frames; returns the bytes played
    pub fn drain(&self, frames: u32) -> Vec<u8> {
        self.with_session(|s| {
            let Some(init) = s.init.as_mut() else {
                return Vec::new();
            };
            let mut out = vec![0u8; frames as usize * init.block_align];
            let n = init.ring.pop_slice(&mut out);
            out.truncate(n);
            s.played.extend_from_slice(&out);
            out
        })
        .unwrap_or_default()
    }

    /// Everything the device has consumed so far
    pub fn played_bytes(&self) -> Vec<u8> {
        self.with_session(|s| s.played.clone()).unwrap_or_default()
    }
}

impl AudioHost for VirtualHost {
    type Endpoint = VirtualEndpointHandle;
    type Client = VirtualClient;

    fn render_endpoints(&self) -> HostResult<Vec<Self::Endpoint>> {
        self.inner.enter(HostCall::EnumEndpoints)?;
        let specs: Vec<VirtualEndpoint> = self
            .inner
            .shared
            .lock()
            .endpoints
            .iter()
            .filter(|e| e.state == DeviceState::Active)
            .cloned()
            .collect();
        Ok(specs
            .into_iter()
            .map(|spec| self.inner.endpoint_handle(spec))
            .collect())
    }

    fn default_render_endpoint(&self) -> HostResult<Self::Endpoint> {
        self.inner.enter(HostCall::DefaultEndpoint)?;
        let spec = {
            let shared = self.inner.shared.lock();
            shared.default_id.as_ref().and_then(|id| {
                shared
                    .endpoints
                    .iter()
                    .find(|e| &e.id == id && e.state == DeviceState::Active)
                    .cloned()
            })
        };
        spec.map(|spec| self.inner.endpoint_handle(spec))
            .ok_or_else(|| HostError::from_code(hresult::E_NOTFOUND))
    }

    fn endpoint(&self, id: &str) -> HostResult<Self::Endpoint> {
        self.inner.enter(HostCall::GetDevice)?;
        let spec = self
            .inner
            .shared
            .lock()
            .endpoints
            .iter()
            .find(|e| e.id == id)
            .cloned();
        spec.map(|spec| self.inner.endpoint_handle(spec))
            .ok_or_else(|| HostError::from_code(hresult::E_NOTFOUND))
    }
}

pub struct VirtualEndpointHandle {
    inner: Inner,
    spec: VirtualEndpoint,
    _guard: HandleGuard,
}

impl HostEndpoint for VirtualEndpointHandle {
    type Client = VirtualClient;

    fn id(&self) -> HostResult<String> {
        self.inner.enter(HostCall::GetId)?;
        Ok(self.spec.id.clone())
    }

    fn friendly_name(&self) -> HostResult<String> {
        self.inner.enter(HostCall::OpenPropertyStore)?;
        Ok(self.spec.name.clone())
    }

    fn state(&self) -> HostResult<DeviceState> {
        self.inner.enter(HostCall::GetState)?;
        Ok(self.spec.state)
    }

    fn activate(&self) -> HostResult<VirtualClient> {
        self.inner.enter(HostCall::Activate)?;
        if self.spec.state != DeviceState::Active {
            return Err(HostError::from_code(hresult::AUDCLNT_E_DEVICE_INVALIDATED));
        }
        let session = Arc::new(Mutex::new(SessionState {
            endpoint_id: self.spec.id.clone(),
            init: None,
            running: false,
            resets: 0,
            played: Vec::new(),
        }));
        self.inner.shared.lock().last_session = Some(Arc::clone(&session));
        Ok(VirtualClient {
            inner: self.inner.clone(),
            spec: self.spec.clone(),
            session,
            _guard: self.inner.guard(),
        })
    }
}

pub struct VirtualClient {
    inner: Inner,
    spec: VirtualEndpoint,
    session: Arc<Mutex<SessionState>>,
    _guard: HandleGuard,
}

impl HostClient for VirtualClient {
    type Renderer = VirtualRenderer;

    fn device_period(&self) -> HostResult<Duration> {
        self.inner.enter(HostCall::GetDevicePeriod)?;
        Ok(self.spec.min_period)
    }

    fn initialize(
        &mut self,
        mode: ExclusiveMode,
        period: Duration,
        format: &StreamFormat,
    ) -> HostResult<()> {
        self.inner.enter(HostCall::Initialize)?;
        let mut session = self.session.lock();
        if session.init.is_some() {
            return Err(HostError::from_code(hresult::AUDCLNT_E_ALREADY_INITIALIZED));
        }
        if format.channels == 0
            || format.channels > self.spec.max_channels
            || format.channel_mask.channel_count() != format.channels
        {
            return Err(HostError::from_code(hresult::AUDCLNT_E_UNSUPPORTED_FORMAT));
        }
        if mode == ExclusiveMode::Exclusive && !self.spec.allow_exclusive {
            return Err(HostError::from_code(
                hresult::AUDCLNT_E_EXCLUSIVE_MODE_NOT_ALLOWED,
            ));
        }
        if period < self.spec.min_period {
            return Err(HostError::from_code(hresult::AUDCLNT_E_INVALID_DEVICE_PERIOD));
        }

        let period_frames =
            (format.sample_rate as u128 * period.as_micros() / 1_000_000) as u32;
        let buffer_frames = period_frames * self.spec.buffer_periods;
        let block_align = format.block_align() as usize;
        session.init = Some(SessionInit {
            mode,
            format: *format,
            buffer_frames,
            block_align,
            ring: HeapRb::new((buffer_frames as usize * block_align).max(1)),
        });
        Ok(())
    }

    fn buffer_size(&self) -> HostResult<u32> {
        self.inner.enter(HostCall::GetBufferSize)?;
        Ok(self.session.lock().init()?.buffer_frames)
    }

    fn padding(&self) -> HostResult<u32> {
        self.inner.enter(HostCall::GetCurrentPadding)?;
        Ok(self.session.lock().init()?.queued_frames())
    }

    fn renderer(&self) -> HostResult<VirtualRenderer> {
        self.inner.enter(HostCall::GetService)?;
        let block_align = self.session.lock().init()?.block_align;
        Ok(VirtualRenderer {
            inner: self.inner.clone(),
            session: Arc::clone(&self.session),
            block_align,
            region: Vec::new(),
            outstanding: None,
            _guard: self.inner.guard(),
        })
    }

    fn start(&self) -> HostResult<()> {
        self.inner.enter(HostCall::Start)?;
        let mut session = self.session.lock();
        session.init()?;
        if session.running {
            return Err(HostError::from_code(hresult::AUDCLNT_E_NOT_STOPPED));
        }
        session.running = true;
        Ok(())
    }

    fn stop(&self) -> HostResult<()> {
        self.inner.enter(HostCall::Stop)?;
        let mut session = self.session.lock();
        session.init()?;
        session.running = false;
        Ok(())
    }

    fn reset(&self) -> HostResult<()> {
        self.inner.enter(HostCall::Reset)?;
        let mut session = self.session.lock();
        if session.running {
            return Err(HostError::from_code(hresult::AUDCLNT_E_NOT_STOPPED));
        }
        let init = session.init_mut()?;
        let mut scratch = [0u8; 4096];
        while init.ring.pop_slice(&mut scratch) > 0 {}
        session.resets += 1;
        Ok(())
    }

    /// Returns at once while there is room. Otherwise sleeps one period
    /// (capped by `timeout`) and reports whether a drain freed space meanwhile.
    fn wait_for_buffer(&self, timeout: Duration) -> bool {
        let has_space = |session: &SessionState| {
            session.init.as_ref().is_some_and(SessionInit::has_space)
        };
        if !has_space(&self.session.lock()) {
            thread::sleep(timeout.min(self.spec.min_period));
        }
        has_space(&self.session.lock())
    }
}

pub struct VirtualRenderer {
    inner: Inner,
    session: Arc<Mutex<SessionState>>,
    block_align: usize,
    region: Vec<u8>,
    outstanding: Option<u32>,
    _guard: HandleGuard,
}

impl HostRenderer for VirtualRenderer {
    fn get_buffer(&mut self, frames: u32) -> HostResult<&mut [u8]> {
        self.inner.enter(HostCall::GetBuffer)?;
        if self.outstanding.is_some() {
            return Err(HostError::from_code(hresult::AUDCLNT_E_OUT_OF_ORDER));
        }
        {
            let session = self.session.lock();
            let init = session.init()?;
            let free = init.buffer_frames - init.queued_frames();
            if frames > free {
                return Err(HostError::from_code(hresult::AUDCLNT_E_BUFFER_TOO_LARGE));
            }
        }
        self.region.clear();
        self.region
            .resize(frames as usize * self.block_align, UNWRITTEN_BYTE);
        self.outstanding = Some(frames);
        Ok(&mut self.region[..])
    }

    fn release_buffer(&mut self, frames: u32) -> HostResult<()> {
        let requested = self.outstanding.take();
        self.inner.enter(HostCall::ReleaseBuffer)?;
        let requested =
            requested.ok_or_else(|| HostError::from_code(hresult::AUDCLNT_E_OUT_OF_ORDER))?;
        if frames > requested {
            return Err(HostError::from_code(hresult::AUDCLNT_E_INVALID_SIZE));
        }
        let mut session = self.session.lock();
        let init = session.init_mut()?;
        let bytes = frames as usize * self.block_align;
        init.ring.push_slice(&self.region[..bytes]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::build_format;
    use crate::config::OutputConfig;

    fn stereo() -> StreamFormat {
        build_format(&OutputConfig {
            downmix_to_2ch: true,
            ..OutputConfig::default()
        })
    }

    fn initialized(host: &VirtualHost) -> VirtualClient {
        let mut client = host.default_render_endpoint().unwrap().activate().unwrap();
        let period = client.device_period().unwrap();
        client
            .initialize(ExclusiveMode::Shared, period, &stereo())
            .unwrap();
        client
    }

    #[test]
    fn test_enumeration_skips_inactive() {
        let host = VirtualHost::new()
            .with_endpoint(VirtualEndpoint::new("a", "Speakers"))
            .with_endpoint(VirtualEndpoint::new("b", "HDMI").inactive());
        let endpoints = host.render_endpoints().unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].friendly_name().unwrap(), "Speakers");
        assert_eq!(host.live_handles(), 1);
        drop(endpoints);
        assert_eq!(host.live_handles(), 0);
    }

    #[test]
    fn test_missing_default_is_not_found() {
        let host = VirtualHost::new().with_endpoint(VirtualEndpoint::new("a", "Speakers"));
        let err = host.default_render_endpoint().err().unwrap();
        assert_eq!(err.code, hresult::E_NOTFOUND);
    }

    #[test]
    fn test_buffer_sized_from_period() {
        let host = VirtualHost::with_default_device("a", "Speakers");
        let client = initialized(&host);
        // 10 ms at 48 kHz, two periods
        assert_eq!(client.buffer_size().unwrap(), 960);
        assert_eq!(client.padding().unwrap(), 0);
    }

    #[test]
    fn test_double_initialize_rejected() {
        let host = VirtualHost::with_default_device("a", "Speakers");
        let mut client = initialized(&host);
        let err = client
            .initialize(ExclusiveMode::Shared, Duration::from_millis(10), &stereo())
            .unwrap_err();
        assert_eq!(err.code, hresult::AUDCLNT_E_ALREADY_INITIALIZED);
    }

    #[test]
    fn test_reset_requires_stopped_stream() {
        let host = VirtualHost::with_default_device("a", "Speakers");
        let client = initialized(&host);
        client.start().unwrap();
        assert_eq!(
            client.reset().unwrap_err().code,
            hresult::AUDCLNT_E_NOT_STOPPED
        );
        client.stop().unwrap();
        client.reset().unwrap();
        assert_eq!(host.reset_count(), 1);
    }

    #[test]
    fn test_region_rules() {
        let host = VirtualHost::with_default_device("a", "Speakers");
        let client = initialized(&host);
        let mut renderer = client.renderer().unwrap();

        assert_eq!(
            renderer.get_buffer(961).unwrap_err().code,
            hresult::AUDCLNT_E_BUFFER_TOO_LARGE
        );

        let region = renderer.get_buffer(2).unwrap();
        assert_eq!(region, &[UNWRITTEN_BYTE; 8][..]);
        region.copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(
            renderer.get_buffer(1).unwrap_err().code,
            hresult::AUDCLNT_E_OUT_OF_ORDER
        );
    }

    #[test]
    fn test_release_commits_and_drain_consumes() {
        let host = VirtualHost::with_default_device("a", "Speakers");
        let client = initialized(&host);
        let mut renderer = client.renderer().unwrap();

        renderer
            .get_buffer(2)
            .unwrap()
            .copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        renderer.release_buffer(2).unwrap();
        assert_eq!(client.padding().unwrap(), 2);
        assert_eq!(host.queued_bytes(), vec![1, 2, 3, 4, 5, 6, 7, 8]);

        assert_eq!(host.drain(1), vec![1, 2, 3, 4]);
        assert_eq!(host.queued_frames(), 1);
        assert_eq!(host.played_bytes(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_injected_failure() {
        let host = VirtualHost::with_default_device("a", "Speakers");
        host.fail(HostCall::Activate, hresult::AUDCLNT_E_DEVICE_IN_USE);
        let endpoint = host.default_render_endpoint().unwrap();
        assert_eq!(
            endpoint.activate().err().unwrap().code,
            hresult::AUDCLNT_E_DEVICE_IN_USE
        );
        host.clear_failure(HostCall::Activate);
        assert!(endpoint.activate().is_ok());
        assert_eq!(host.call_count(HostCall::Activate), 2);
    }
}
