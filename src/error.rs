//! Error type shared by the measurement pipeline and the control loop.
//!
//! Every fatal variant maps to its own negative process exit code so a
//! supervisor can tell which step failed without parsing logs.

use std::fmt;
use std::time::Duration;

/// Result alias using [`BrightnessError`]
pub type Result<T> = std::result::Result<T, BrightnessError>;

#[derive(Debug, Clone, PartialEq)]
pub enum BrightnessError {
    /// No usable adapter, or the device request was rejected
    DeviceCreation(String),
    /// None of the kernel candidates could be read
    KernelLoad { tried: Vec<String> },
    /// Shader module or compute pipeline failed validation
    KernelCreation(String),
    /// Accumulator or staging buffer could not be created
    BufferCreation(String),
    /// Bind group layout or bind group could not be created
    ViewCreation(String),
    /// The surface source could not hand out a frame
    SurfaceAcquisition(String),
    /// The acquired frame has unusable dimensions
    ResourceQuery(String),
    /// GPU did not signal completion within the timeout
    FenceTimeout(Duration),
    /// Mapping the staging buffer for reading failed
    BufferMap(String),
    /// The mapped range did not contain the accumulator word
    MappedRangeEmpty,
    /// The frame's texture format cannot be sampled as float
    UnsupportedFormat(wgpu::TextureFormat),
    /// Writing to the runtime settings store failed
    Settings(String),
    /// Shutdown was requested while work was in flight
    Cancelled,
}

impl BrightnessError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            BrightnessError::DeviceCreation(_) => -1,
            BrightnessError::KernelLoad { .. } => -2,
            BrightnessError::KernelCreation(_) => -3,
            BrightnessError::BufferCreation(_) => -4,
            BrightnessError::ViewCreation(_) => -5,
            BrightnessError::SurfaceAcquisition(_) => -6,
            BrightnessError::ResourceQuery(_) => -7,
            BrightnessError::FenceTimeout(_) => -8,
            BrightnessError::BufferMap(_) => -9,
            BrightnessError::MappedRangeEmpty => -10,
            BrightnessError::UnsupportedFormat(_) => -11,
            BrightnessError::Settings(_) => -12,
            BrightnessError::Cancelled => 0,
        }
    }
}

impl fmt::Display for BrightnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrightnessError::DeviceCreation(msg) => {
                write!(f, "Failed to create GPU device: {}", msg)
            }
            BrightnessError::KernelLoad { tried } => {
                write!(f, "Failed to load luminance kernel (tried: {})", tried.join(", "))
            }
            BrightnessError::KernelCreation(msg) => {
                write!(f, "Failed to create compute kernel: {}", msg)
            }
            BrightnessError::BufferCreation(msg) => write!(f, "Failed to create buffer: {}", msg),
            BrightnessError::ViewCreation(msg) => {
                write!(f, "Failed to create binding view: {}", msg)
            }
            BrightnessError::SurfaceAcquisition(msg) => {
                write!(f, "Failed to acquire source surface: {}", msg)
            }
            BrightnessError::ResourceQuery(msg) => {
                write!(f, "Failed to query source texture: {}", msg)
            }
            BrightnessError::FenceTimeout(timeout) => {
                write!(f, "GPU did not finish the reduction within {:?}", timeout)
            }
            BrightnessError::BufferMap(msg) => {
                write!(f, "Failed to map accumulator buffer: {}", msg)
            }
            BrightnessError::MappedRangeEmpty => write!(f, "Mapped accumulator range is empty"),
            BrightnessError::UnsupportedFormat(format) => {
                write!(f, "Source texture format {:?} cannot be sampled as float", format)
            }
            BrightnessError::Settings(msg) => {
                write!(f, "Failed to write brightness setting: {}", msg)
            }
            BrightnessError::Cancelled => write!(f, "Cancelled by shutdown request"),
        }
    }
}

impl std::error::Error for BrightnessError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            BrightnessError::DeviceCreation(String::new()),
            BrightnessError::KernelLoad { tried: vec![] },
            BrightnessError::KernelCreation(String::new()),
            BrightnessError::BufferCreation(String::new()),
            BrightnessError::ViewCreation(String::new()),
            BrightnessError::SurfaceAcquisition(String::new()),
            BrightnessError::ResourceQuery(String::new()),
            BrightnessError::FenceTimeout(Duration::from_secs(1)),
            BrightnessError::BufferMap(String::new()),
            BrightnessError::MappedRangeEmpty,
            BrightnessError::UnsupportedFormat(wgpu::TextureFormat::R32Uint),
            BrightnessError::Settings(String::new()),
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_cancelled_is_clean_exit() {
        assert_eq!(BrightnessError::Cancelled.exit_code(), 0);
    }

    #[test]
    fn test_kernel_load_lists_candidates() {
        let err = BrightnessError::KernelLoad {
            tried: vec!["a.wgsl".to_string(), "b.wgsl".to_string()],
        };
        assert!(err.to_string().contains("a.wgsl, b.wgsl"));
    }
}
