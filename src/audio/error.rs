//! Audio backend error types
//!
//! Two layers live here:
//! - [`HostError`]: a raw failure code returned by the host audio subsystem,
//!   with its translated message.
//! - [`AudioBackendError`]: what a failed backend operation means to the
//!   caller (initialization, device resolution, activation, format, buffer).

use std::fmt;

use thiserror::Error;

/// HRESULT-style codes reported by the host audio subsystem.
pub mod hresult {
    pub const S_OK: i32 = 0;
    pub const E_POINTER: i32 = 0x8000_4003_u32 as i32;
    pub const E_OUTOFMEMORY: i32 = 0x8007_000E_u32 as i32;
    pub const E_INVALIDARG: i32 = 0x8007_0057_u32 as i32;
    pub const E_NOTFOUND: i32 = 0x8007_0490_u32 as i32;
    pub const CO_E_NOTINITIALIZED: i32 = 0x8004_01F0_u32 as i32;

    pub const AUDCLNT_E_NOT_INITIALIZED: i32 = 0x8889_0001_u32 as i32;
    pub const AUDCLNT_E_ALREADY_INITIALIZED: i32 = 0x8889_0002_u32 as i32;
    pub const AUDCLNT_E_WRONG_ENDPOINT_TYPE: i32 = 0x8889_0003_u32 as i32;
    pub const AUDCLNT_E_DEVICE_INVALIDATED: i32 = 0x8889_0004_u32 as i32;
    pub const AUDCLNT_E_NOT_STOPPED: i32 = 0x8889_0005_u32 as i32;
    pub const AUDCLNT_E_BUFFER_TOO_LARGE: i32 = 0x8889_0006_u32 as i32;
    pub const AUDCLNT_E_OUT_OF_ORDER: i32 = 0x8889_0007_u32 as i32;
    pub const AUDCLNT_E_UNSUPPORTED_FORMAT: i32 = 0x8889_0008_u32 as i32;
    pub const AUDCLNT_E_INVALID_SIZE: i32 = 0x8889_0009_u32 as i32;
    pub const AUDCLNT_E_DEVICE_IN_USE: i32 = 0x8889_000A_u32 as i32;
    pub const AUDCLNT_E_BUFFER_OPERATION_PENDING: i32 = 0x8889_000B_u32 as i32;
    pub const AUDCLNT_E_EXCLUSIVE_MODE_NOT_ALLOWED: i32 = 0x8889_000E_u32 as i32;
    pub const AUDCLNT_E_ENDPOINT_CREATE_FAILED: i32 = 0x8889_000F_u32 as i32;
    pub const AUDCLNT_E_SERVICE_NOT_RUNNING: i32 = 0x8889_0010_u32 as i32;
    pub const AUDCLNT_E_EVENTHANDLE_NOT_EXPECTED: i32 = 0x8889_0011_u32 as i32;
    pub const AUDCLNT_E_EXCLUSIVE_MODE_ONLY: i32 = 0x8889_0012_u32 as i32;
    pub const AUDCLNT_E_BUFDURATION_PERIOD_NOT_EQUAL: i32 = 0x8889_0013_u32 as i32;
    pub const AUDCLNT_E_EVENTHANDLE_NOT_SET: i32 = 0x8889_0014_u32 as i32;
    pub const AUDCLNT_E_BUFFER_SIZE_NOT_ALIGNED: i32 = 0x8889_0019_u32 as i32;
    pub const AUDCLNT_E_INVALID_DEVICE_PERIOD: i32 = 0x8889_0020_u32 as i32;
}

/// Translate a host code into a human-readable message.
///
/// Returns `None` for codes outside the known table.
pub fn describe(code: i32) -> Option<&'static str> {
    use hresult::*;

    let msg = match code {
        S_OK => "The operation completed successfully",
        E_POINTER => "Invalid pointer",
        E_OUTOFMEMORY => "Not enough memory resources are available",
        E_INVALIDARG => "One or more arguments are not valid",
        E_NOTFOUND => "Element not found",
        CO_E_NOTINITIALIZED => "CoInitialize has not been called",
        AUDCLNT_E_NOT_INITIALIZED => "The audio client has not been successfully initialized",
        AUDCLNT_E_ALREADY_INITIALIZED => "The audio client has already been initialized",
        AUDCLNT_E_WRONG_ENDPOINT_TYPE => "The endpoint data flow does not match the request",
        AUDCLNT_E_DEVICE_INVALIDATED => "The audio endpoint device has been unplugged or reconfigured",
        AUDCLNT_E_NOT_STOPPED => "The audio stream was not stopped at the time of the call",
        AUDCLNT_E_BUFFER_TOO_LARGE => "The requested buffer size is larger than the available space",
        AUDCLNT_E_OUT_OF_ORDER => "A previous buffer request is still outstanding",
        AUDCLNT_E_UNSUPPORTED_FORMAT => "The requested sound format is not supported",
        AUDCLNT_E_INVALID_SIZE => "The number of frames written exceeds the buffer that was requested",
        AUDCLNT_E_DEVICE_IN_USE => "The endpoint device is already in use",
        AUDCLNT_E_BUFFER_OPERATION_PENDING => "A buffer operation is pending on the stream",
        AUDCLNT_E_EXCLUSIVE_MODE_NOT_ALLOWED => "Exclusive mode is disabled on this device",
        AUDCLNT_E_ENDPOINT_CREATE_FAILED => "The audio endpoint could not be created",
        AUDCLNT_E_SERVICE_NOT_RUNNING => "The audio service is not running",
        AUDCLNT_E_EVENTHANDLE_NOT_EXPECTED => "The stream is not initialized for event-driven buffering",
        AUDCLNT_E_EXCLUSIVE_MODE_ONLY => "The device supports exclusive mode only",
        AUDCLNT_E_BUFDURATION_PERIOD_NOT_EQUAL => "Buffer duration and periodicity must be equal",
        AUDCLNT_E_EVENTHANDLE_NOT_SET => "No event handle was set for an event-driven stream",
        AUDCLNT_E_BUFFER_SIZE_NOT_ALIGNED => "The requested buffer size is not aligned",
        AUDCLNT_E_INVALID_DEVICE_PERIOD => "The requested device period is not valid",
        _ => return None,
    };
    Some(msg)
}

/// Failure code returned by a host audio subsystem call, with its translation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    pub code: i32,
    pub message: String,
}

impl HostError {
    /// Build an error from a raw code using the built-in translation table
    pub fn from_code(code: i32) -> Self {
        let message = describe(code)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Unknown host error 0x{:08X}", code as u32));
        Self { code, message }
    }

    /// Build an error whose message was already translated by the host
    pub fn with_message(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.message, self.code as u32)
    }
}

impl std::error::Error for HostError {}

/// Result of a single host subsystem call
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Unified error type for audio backend operations
#[derive(Debug, Clone, Error)]
pub enum AudioBackendError {
    /// Host audio subsystem or device enumerator could not be created
    #[error("Audio subsystem initialization failed: {0}")]
    Initialization(String),
    /// No endpoint could be bound (no preferred match and no default)
    #[error("Device not found: {0}")]
    DeviceResolution(String),
    /// Default device unavailable, or session activation rejected
    #[error("Device activation failed: {0}")]
    DeviceActivation(String),
    /// Host rejected the requested format or sharing mode
    #[error("Format negotiation failed: {0}")]
    FormatNegotiation(String),
    /// Buffer region acquisition or commit rejected
    #[error("Buffer error: {0}")]
    Buffer(String),
    /// Operation not valid in the current stream state
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// Operation not supported on this platform
    #[error("Not supported: {0}")]
    NotSupported(String),
}

/// Result type alias for audio backend operations
pub type Result<T> = std::result::Result<T, AudioBackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_code_is_translated() {
        let err = HostError::from_code(hresult::AUDCLNT_E_BUFFER_TOO_LARGE);
        assert_eq!(
            err.message,
            "The requested buffer size is larger than the available space"
        );
        assert_eq!(
            err.to_string(),
            "The requested buffer size is larger than the available space (0x88890006)"
        );
    }

    #[test]
    fn test_unknown_code_keeps_hex() {
        let err = HostError::from_code(0x8000_FFFF_u32 as i32);
        assert_eq!(err.message, "Unknown host error 0x8000FFFF");
        assert!(describe(0x1234).is_none());
    }

    #[test]
    fn test_backend_error_display() {
        let err = AudioBackendError::DeviceResolution("Speakers".to_string());
        assert_eq!(err.to_string(), "Device not found: Speakers");
    }
}
