//! Host audio subsystem abstraction
//!
//! These traits are the only place the backend touches the platform. Each
//! method maps to one host call and returns the raw [`HostResult`]; callers
//! route it through [`check`](crate::audio::check::check).
//!
//! Handles release themselves on drop. A renderer must be dropped before the
//! client it came from.
//!
//! # Important
//!
//! This file must NOT contain any platform-specific imports. Implementations
//! live in `wasapi_host.rs` (Windows) and `virtual_host.rs` (in-memory).

use std::time::Duration;

use crate::audio::error::HostResult;
use crate::audio::types::{DeviceState, ExclusiveMode, StreamFormat};

/// Entry point of a host audio subsystem (the device enumerator)
pub trait AudioHost {
    type Endpoint: HostEndpoint<Client = Self::Client>;
    type Client: HostClient;

    /// Active render endpoints, in host order
    fn render_endpoints(&self) -> HostResult<Vec<Self::Endpoint>>;

    /// The host's default render endpoint for console/media playback
    fn default_render_endpoint(&self) -> HostResult<Self::Endpoint>;

    /// Look up an endpoint by its opaque id
    fn endpoint(&self, id: &str) -> HostResult<Self::Endpoint>;
}

/// A render endpoint handle
pub trait HostEndpoint {
    type Client: HostClient;

    fn id(&self) -> HostResult<String>;

    /// Friendly name, read from the endpoint's property store
    fn friendly_name(&self) -> HostResult<String>;

    fn state(&self) -> HostResult<DeviceState>;

    /// Activate an audio client session on this endpoint
    fn activate(&self) -> HostResult<Self::Client>;
}

/// An audio client session on one endpoint
pub trait HostClient {
    type Renderer: HostRenderer;

    /// Minimum schedulable period of the device
    fn device_period(&self) -> HostResult<Duration>;

    /// Initialize for event-driven rendering of `format` with the given period
    fn initialize(
        &mut self,
        mode: ExclusiveMode,
        period: Duration,
        format: &StreamFormat,
    ) -> HostResult<()>;

    /// Total capacity of the host buffer, in frames
    fn buffer_size(&self) -> HostResult<u32>;

    /// Frames committed but not yet played
    fn padding(&self) -> HostResult<u32>;

    /// Acquire the render service of an initialized client
    fn renderer(&self) -> HostResult<Self::Renderer>;

    fn start(&self) -> HostResult<()>;

    fn stop(&self) -> HostResult<()>;

    /// Drop all pending data and reset the stream position (stream must be stopped)
    fn reset(&self) -> HostResult<()>;

    /// Block until the host signals free buffer space, at most `timeout`
    ///
    /// Returns `false` on timeout or when the client has no event registered.
    fn wait_for_buffer(&self, timeout: Duration) -> bool;
}

/// Render service used to write frames into the host buffer
pub trait HostRenderer {
    /// Acquire a writable region of exactly `frames` frames
    ///
    /// The region is host-owned and stays readable by the host after
    /// [`release_buffer`](HostRenderer::release_buffer) returns.
    fn get_buffer(&mut self, frames: u32) -> HostResult<&mut [u8]>;

    /// Commit the first `frames` frames of the acquired region for playback
    fn release_buffer(&mut self, frames: u32) -> HostResult<()>;
}
