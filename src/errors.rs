// SPDX-License-Identifier: MPL-2.0

//! Error types for device negotiation, capture and recording

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for device and capture operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Result type alias for recording operations
pub type RecordingResult<T> = Result<T, RecordingError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Device or capture errors
    Device(DeviceError),
    /// Recording-related errors
    Recording(RecordingError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

/// Device negotiation and capture errors
///
/// Opening a node and checking its capture capability fail with different
/// variants so callers can tell a busy or missing node from a non-camera one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device node could not be opened
    Unavailable(String),
    /// The device does not report the video capture capability
    NotCaptureDevice(String),
    /// The device reports no usable resolutions
    NoResolutions(String),
    /// No device is currently open
    NotOpen,
    /// The driver rejected the requested format
    UnsupportedFormat(String),
    /// The driver rejected the requested frame interval
    UnsupportedFramerate(String),
}

/// Recording-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    /// `start` was called before `init`
    NotInitialized,
    /// The output directory could not be created or is not a directory
    OutputDirectory(String),
    /// The encoder process could not be spawned
    ProcessLaunch(String),
    /// The in-process encoder could not open its target
    WriterInit(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Device(e) => write!(f, "Device error: {}", e),
            AppError::Recording(e) => write!(f, "Recording error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Unavailable(msg) => write!(f, "Device unavailable: {}", msg),
            DeviceError::NotCaptureDevice(msg) => write!(f, "Not a capture device: {}", msg),
            DeviceError::NoResolutions(msg) => write!(f, "No supported resolutions: {}", msg),
            DeviceError::NotOpen => write!(f, "No device is open"),
            DeviceError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            DeviceError::UnsupportedFramerate(msg) => write!(f, "Unsupported framerate: {}", msg),
        }
    }
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingError::NotInitialized => write!(f, "Recorder has no output directory"),
            RecordingError::OutputDirectory(msg) => write!(f, "Output directory error: {}", msg),
            RecordingError::ProcessLaunch(msg) => {
                write!(f, "Failed to launch encoder process: {}", msg)
            }
            RecordingError::WriterInit(msg) => write!(f, "Failed to open encoder: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for DeviceError {}
impl std::error::Error for RecordingError {}

impl From<DeviceError> for AppError {
    fn from(err: DeviceError) -> Self {
        AppError::Device(err)
    }
}

impl From<RecordingError> for AppError {
    fn from(err: RecordingError) -> Self {
        AppError::Recording(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_wraps_into_app_error() {
        let err: AppError = DeviceError::NotOpen.into();
        assert_eq!(err.to_string(), "Device error: No device is open");
    }

    #[test]
    fn test_open_and_capability_failures_are_distinct() {
        let open = DeviceError::Unavailable("/dev/video9".into());
        let caps = DeviceError::NotCaptureDevice("/dev/video9".into());
        assert_ne!(open, caps);
        assert!(caps.to_string().contains("Not a capture device"));
    }
}
