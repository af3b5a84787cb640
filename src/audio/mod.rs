//! WASAPI audio output backend
//!
//! Plays 16-bit PCM at 48 kHz through a Windows render endpoint, in shared or
//! exclusive mode, stereo or 7.1. The host API sits behind the traits in
//! [`host`], so the whole state machine runs against [`virtual_host`] on any
//! platform.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        Output selection / producer           │
//! │  Uses trait AudioBackend, doesn't know      │
//! │  which host implementation is used          │
//! └─────────────┬───────────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────────┐
//! │   WasapiBackend ── OutputStream (states)     │
//! │   devices / format / submit / check          │
//! └─────────────┬───────────────────────────────┘
//!               │ trait AudioHost
//!        ┌──────┴───────────────┐
//!        ▼                      ▼
//! ┌──────────────┐    ┌──────────────┐
//! │ WasapiHost   │    │ VirtualHost  │
//! │ (Windows)    │    │ (in-memory)  │
//! └──────────────┘    └──────────────┘
//! ```

pub mod backend;
pub mod check;
pub mod devices;
pub mod error;
pub mod format;
pub mod host;
pub mod stream;
pub mod submit;
pub mod types;
pub mod virtual_host;

#[cfg(target_os = "windows")]
pub mod wasapi_host;

// Re-exports for convenience
pub use backend::{create_backend, AudioBackend, WasapiBackend};
pub use error::{AudioBackendError, HostError, HostResult, Result};
pub use host::{AudioHost, HostClient, HostEndpoint, HostRenderer};
pub use stream::OutputStream;
pub use types::*;
pub use virtual_host::{VirtualEndpoint, VirtualHost};
