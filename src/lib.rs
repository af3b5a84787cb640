//! Low-latency WASAPI audio output for Noir
//!
//! ```ignore
//! use noir_wasapi::{create_backend, OutputConfig};
//!
//! let config = OutputConfig::load_or_default(path);
//! let mut backend = create_backend()?;
//! backend.open(&config);
//! backend.play();
//! ```

pub mod audio;
pub mod config;

pub use audio::{
    create_backend, AudioBackend, AudioBackendError, Capabilities, DeviceDescriptor,
    ExclusiveMode, OutputStream, StreamFormat, StreamState, WasapiBackend,
};
pub use config::OutputConfig;
