//! Output stream state machine
//!
//! ```text
//! Closed ──open──▶ Opening ──▶ Ready ──play──▶ Playing ◀──play── Paused
//!    ▲                │          │               │  └────pause────▶ │
//!    │                │          └─────pause─────┼─────────────────▶│
//!    └──── failure ───┘                          │                  │
//!    └──────────────────────── close ◀───────────┴──────────────────┘
//! ```
//!
//! Open is a chain of fallible steps. Every handle acquired along the way is
//! a local that drops when a later step fails, so an aborted open leaves
//! nothing behind. A successful open moves the handles into a [`Session`].

use std::time::Duration;

use crate::audio::check::{check, succeeded};
use crate::audio::devices::resolve_preferred;
use crate::audio::error::{AudioBackendError, Result};
use crate::audio::format::build_format;
use crate::audio::host::{AudioHost, HostClient, HostEndpoint};
use crate::audio::submit;
use crate::audio::types::{DeviceDescriptor, DeviceState, ExclusiveMode, StreamFormat, StreamState};
use crate::config::OutputConfig;

/// A live host session. Field order is drop order: renderer before client.
pub struct Session<C: HostClient> {
    device: DeviceDescriptor,
    format: StreamFormat,
    mode: ExclusiveMode,
    period: Duration,
    buffer_frames: u32,
    renderer: C::Renderer,
    client: C,
}

/// Output stream bound to at most one session at a time
pub struct OutputStream<H: AudioHost> {
    state: StreamState,
    session: Option<Session<H::Client>>,
}

impl<H: AudioHost> Default for OutputStream<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: AudioHost> OutputStream<H> {
    pub fn new() -> Self {
        Self {
            state: StreamState::Closed,
            session: None,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Open a session on the preferred (or default) endpoint and start it
    ///
    /// Failure is logged and leaves the stream `Closed`.
    pub fn open(&mut self, host: &H, config: &OutputConfig) {
        if self.session.is_some() {
            log::info!("[WASAPI] Stream already open, closing it first");
            self.close();
        }

        self.state = StreamState::Opening;
        match open_session(host, config) {
            Ok(session) => {
                log::info!(
                    "[WASAPI] Initialized on \"{}\": {}, {:?} mode, period {:?}, buffer {} frames",
                    session.device.name,
                    session.format,
                    session.mode,
                    session.period,
                    session.buffer_frames
                );
                self.session = Some(session);
                self.state = StreamState::Ready;
            }
            Err(e) => {
                log::error!("[WASAPI] Open failed: {}", e);
                self.state = StreamState::Closed;
            }
        }
    }

    /// Stop the session and release every host handle
    pub fn close(&mut self) {
        let Some(session) = self.session.take() else {
            log::debug!("[WASAPI] Close on a closed stream ignored");
            self.state = StreamState::Closed;
            return;
        };

        succeeded("Stop failed", session.client.stop());
        drop(session);
        self.state = StreamState::Closed;
        log::info!("[WASAPI] Closed");
    }

    pub fn play(&mut self) {
        let Some(session) = self.require_session("Play") else {
            return;
        };
        match self.state {
            // Open already started the host stream
            StreamState::Ready => self.state = StreamState::Playing,
            StreamState::Paused => {
                if succeeded("Play failed", session.client.start()) {
                    self.state = StreamState::Playing;
                }
            }
            _ => {}
        }
    }

    pub fn pause(&mut self) {
        let Some(session) = self.require_session("Pause") else {
            return;
        };
        if matches!(self.state, StreamState::Ready | StreamState::Playing)
            && succeeded("Stop failed", session.client.stop())
        {
            self.state = StreamState::Paused;
        }
    }

    /// Drop every queued frame and reset the host position, keeping the state
    pub fn flush(&mut self) {
        let Some(session) = self.require_session("Flush") else {
            return;
        };

        // The host only resets a stopped stream
        let running = matches!(self.state, StreamState::Ready | StreamState::Playing);
        if running && !succeeded("Flush failed", session.client.stop()) {
            return;
        }
        succeeded("Flush failed", session.client.reset());
        if running && !succeeded("Flush failed", session.client.start()) {
            self.state = StreamState::Paused;
        }
    }

    /// Push `frame_count` interleaved frames from `source` to the host buffer
    pub fn submit(&mut self, source: &[i16], frame_count: u32) -> bool {
        if self.require_session("Submit").is_none() {
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        submit::submit(&mut session.renderer, &session.format, source, frame_count)
    }

    /// Free space in the host buffer, in frames
    pub fn available_frames(&self) -> Option<u32> {
        let session = self.session.as_ref()?;
        let padding = check("Could not get buffer padding", session.client.padding())?;
        Some(session.buffer_frames.saturating_sub(padding))
    }

    fn require_session(&self, operation: &str) -> Option<&Session<H::Client>> {
        if self.session.is_none() {
            let err = AudioBackendError::InvalidState(format!("{} on a closed stream", operation));
            log::warn!("[WASAPI] {}, ignored", err);
        }
        self.session.as_ref()
    }

    /// Block until the host has room for more frames, at most `timeout`
    pub fn wait_for_buffer(&self, timeout: Duration) -> bool {
        match &self.session {
            Some(session) => session.client.wait_for_buffer(timeout),
            None => false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == StreamState::Playing
    }

    pub fn device(&self) -> Option<&DeviceDescriptor> {
        self.session.as_ref().map(|s| &s.device)
    }

    pub fn format(&self) -> Option<StreamFormat> {
        self.session.as_ref().map(|s| s.format)
    }

    pub fn share_mode(&self) -> Option<ExclusiveMode> {
        self.session.as_ref().map(|s| s.mode)
    }

    /// Period negotiated at open; the expected submit cadence
    pub fn period(&self) -> Option<Duration> {
        self.session.as_ref().map(|s| s.period)
    }

    pub fn buffer_frames(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.buffer_frames)
    }
}

impl<H: AudioHost> Drop for OutputStream<H> {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.close();
        }
    }
}

fn open_session<H: AudioHost>(host: &H, config: &OutputConfig) -> Result<Session<H::Client>> {
    let format = build_format(config);
    let mode = config.share_mode();

    let (endpoint, device) = bind_endpoint(host, config)?;

    let mut client = check("Could not activate device", endpoint.activate()).ok_or_else(|| {
        AudioBackendError::DeviceActivation(format!("\"{}\" rejected activation", device.name))
    })?;
    drop(endpoint);

    let period = check("Could not get device period", client.device_period()).ok_or_else(|| {
        AudioBackendError::DeviceActivation(format!("no device period for \"{}\"", device.name))
    })?;

    if !succeeded(
        "Could not initialize client",
        client.initialize(mode, period, &format),
    ) {
        return Err(AudioBackendError::FormatNegotiation(format!(
            "{} in {:?} mode",
            format, mode
        )));
    }

    let buffer_frames = check("Could not get buffer size", client.buffer_size())
        .ok_or_else(|| AudioBackendError::FormatNegotiation("no buffer size".to_string()))?;

    let renderer = check("Could not open renderer", client.renderer()).ok_or_else(|| {
        AudioBackendError::DeviceActivation("render service unavailable".to_string())
    })?;

    if !succeeded("Could not start stream", client.start()) {
        return Err(AudioBackendError::DeviceActivation(
            "stream did not start".to_string(),
        ));
    }

    Ok(Session {
        device,
        format,
        mode,
        period,
        buffer_frames,
        renderer,
        client,
    })
}

/// Pick the endpoint to open: the preferred device if it resolves, else the default
fn bind_endpoint<H: AudioHost>(
    host: &H,
    config: &OutputConfig,
) -> Result<(H::Endpoint, DeviceDescriptor)> {
    if let Some(name) = config.preferred_device() {
        match resolve_preferred(host, name) {
            Some(device) => {
                let lookup = host.endpoint(&device.id);
                if let Some(endpoint) = check("Could not open preferred device", lookup) {
                    log::info!("[WASAPI] Using preferred device \"{}\"", device.name);
                    return Ok((endpoint, device));
                }
            }
            None => {
                let err = AudioBackendError::DeviceResolution(format!("\"{}\"", name));
                log::warn!("[WASAPI] Custom device was not found ({})", err);
            }
        }
    }

    log::info!("[WASAPI] Looking for default audio device");
    let endpoint = check("No default audio device found", host.default_render_endpoint())
        .ok_or_else(|| {
            AudioBackendError::DeviceActivation("no default render endpoint".to_string())
        })?;
    let device = DeviceDescriptor {
        id: check("Error retrieving device", endpoint.id()).unwrap_or_default(),
        name: check("Could not open device properties", endpoint.friendly_name())
            .unwrap_or_else(|| "Unknown".to_string()),
        state: DeviceState::Active,
    };
    Ok((endpoint, device))
}
