//! Audio backend abstraction layer
//!
//! This trait is what the output selection layer sees. It picks a backend by
//! [`name`](AudioBackend::name) and [`capabilities`](AudioBackend::capabilities),
//! opens it with the user's [`OutputConfig`] and then drives it from the
//! producer thread.
//!
//! Every operation is best-effort: host failures are logged and show up as a
//! closed stream or a `false` submit, never as a panic.
//!
//! # Important
//!
//! This file must NOT contain any platform-specific imports (windows, etc.).
//! All platform-specific code goes in the host implementation files.

use std::time::Duration;

use crate::audio::devices::device_names;
use crate::audio::error::Result;
use crate::audio::host::AudioHost;
use crate::audio::stream::OutputStream;
use crate::audio::types::*;
use crate::config::OutputConfig;

/// Core audio backend trait
///
/// # Example
///
/// ```ignore
/// let mut backend = create_backend()?;
///
/// // Show the user what can be selected
/// let names = backend.list_available_devices();
///
/// backend.open(&config);
/// backend.play();
/// while running {
///     let frames = backend.available_frames().unwrap_or(0).min(period_frames);
///     backend.submit(&mix(frames), frames);
///     backend.wait_for_buffer(period * 2);
/// }
/// backend.close();
/// ```
pub trait AudioBackend {
    /// Static backend identifier (e.g., "WASAPI")
    fn name(&self) -> &'static str;

    /// Static feature flags of this backend type
    fn capabilities(&self) -> Capabilities;

    // === Lifecycle ===

    /// Open a session with `config`; failure is logged and leaves the backend closed
    fn open(&mut self, config: &OutputConfig);

    /// Stop and release the session
    fn close(&mut self);

    fn play(&mut self);

    fn pause(&mut self);

    /// Discard queued frames without changing play/pause state
    fn flush(&mut self);

    fn state(&self) -> StreamState;

    // === Delivery ===

    /// Copy `frame_count` interleaved frames from `source` into the host buffer
    fn submit(&mut self, source: &[i16], frame_count: u32) -> bool;

    /// Free space in the host buffer, in frames (None when closed)
    fn available_frames(&self) -> Option<u32>;

    /// Expected submit cadence (None when closed)
    fn period(&self) -> Option<Duration>;

    /// Block until the host signals free buffer space, at most `timeout`
    fn wait_for_buffer(&self, timeout: Duration) -> bool;

    /// Negotiated stream format (None when closed)
    fn format(&self) -> Option<StreamFormat>;

    // === Devices ===

    /// Friendly names of the active render endpoints
    fn list_available_devices(&self) -> Vec<String>;
}

/// WASAPI output backend over any host implementation
pub struct WasapiBackend<H: AudioHost> {
    // Declared first so the session is released before the host
    stream: OutputStream<H>,
    host: H,
}

impl<H: AudioHost> WasapiBackend<H> {
    pub const NAME: &'static str = "WASAPI";

    pub const CAPABILITIES: Capabilities = Capabilities(
        Capabilities::DEVICE_SELECTION.0
            | Capabilities::EXCLUSIVE_MODE.0
            | Capabilities::PLAY_PAUSE_FLUSH.0,
    );

    pub fn with_host(host: H) -> Self {
        Self {
            stream: OutputStream::new(),
            host,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}

impl<H: AudioHost> AudioBackend for WasapiBackend<H> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn capabilities(&self) -> Capabilities {
        Self::CAPABILITIES
    }

    fn open(&mut self, config: &OutputConfig) {
        self.stream.open(&self.host, config);
    }

    fn close(&mut self) {
        self.stream.close();
    }

    fn play(&mut self) {
        self.stream.play();
    }

    fn pause(&mut self) {
        self.stream.pause();
    }

    fn flush(&mut self) {
        self.stream.flush();
    }

    fn state(&self) -> StreamState {
        self.stream.state()
    }

    fn submit(&mut self, source: &[i16], frame_count: u32) -> bool {
        self.stream.submit(source, frame_count)
    }

    fn available_frames(&self) -> Option<u32> {
        self.stream.available_frames()
    }

    fn period(&self) -> Option<Duration> {
        self.stream.period()
    }

    fn wait_for_buffer(&self, timeout: Duration) -> bool {
        self.stream.wait_for_buffer(timeout)
    }

    fn format(&self) -> Option<StreamFormat> {
        self.stream.format()
    }

    fn list_available_devices(&self) -> Vec<String> {
        device_names(&self.host)
    }
}

/// Factory function to create the appropriate backend for the current platform
pub fn create_backend() -> Result<Box<dyn AudioBackend>> {
    #[cfg(target_os = "windows")]
    {
        use crate::audio::wasapi_host::WasapiHost;
        Ok(Box::new(WasapiBackend::with_host(WasapiHost::new()?)))
    }

    #[cfg(not(target_os = "windows"))]
    {
        Err(crate::audio::error::AudioBackendError::NotSupported(
            "WASAPI is only available on Windows".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::virtual_host::{VirtualEndpoint, VirtualHost};

    fn backend() -> WasapiBackend<VirtualHost> {
        WasapiBackend::with_host(
            VirtualHost::new()
                .with_endpoint(VirtualEndpoint::new("a", "Speakers"))
                .with_endpoint(VirtualEndpoint::new("b", "Headphones"))
                .with_endpoint(VirtualEndpoint::new("c", "Line Out").inactive())
                .with_default("a"),
        )
    }

    #[test]
    fn test_static_identity() {
        let backend = backend();
        assert_eq!(backend.name(), "WASAPI");
        let caps = backend.capabilities();
        assert!(caps.contains(Capabilities::DEVICE_SELECTION));
        assert!(caps.contains(Capabilities::EXCLUSIVE_MODE));
        assert!(caps.contains(Capabilities::PLAY_PAUSE_FLUSH));
        assert_eq!(caps.bits(), 0x7);
    }

    #[test]
    fn test_list_available_devices() {
        let backend = backend();
        assert_eq!(
            backend.list_available_devices(),
            vec!["Speakers".to_string(), "Headphones".to_string()]
        );
    }

    #[test]
    fn test_lifecycle_through_trait_object() {
        let mut backend: Box<dyn AudioBackend> = Box::new(backend());
        assert_eq!(backend.state(), StreamState::Closed);

        backend.open(&OutputConfig {
            downmix_to_2ch: true,
            ..OutputConfig::default()
        });
        assert_eq!(backend.state(), StreamState::Ready);
        assert_eq!(backend.format().unwrap().channels, 2);
        assert_eq!(backend.period(), Some(Duration::from_millis(10)));

        backend.play();
        let frames = backend.available_frames().unwrap().min(480);
        let tone = vec![1000i16; frames as usize * 2];
        assert!(backend.submit(&tone, frames));

        backend.pause();
        assert_eq!(backend.state(), StreamState::Paused);
        backend.flush();
        backend.play();
        assert_eq!(backend.state(), StreamState::Playing);

        backend.close();
        assert_eq!(backend.state(), StreamState::Closed);
        assert!(!backend.submit(&tone, frames));
    }

    #[test]
    fn test_drop_releases_session() {
        let host = VirtualHost::with_default_device("a", "Speakers");
        let mut backend = WasapiBackend::with_host(host.clone());
        backend.open(&OutputConfig::default());
        assert_eq!(host.live_handles(), 2);
        drop(backend);
        assert_eq!(host.live_handles(), 0);
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_factory_without_wasapi() {
        assert!(matches!(
            create_backend(),
            Err(crate::audio::error::AudioBackendError::NotSupported(_))
        ));
    }
}
