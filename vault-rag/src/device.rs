//! Compute device selection for embedding inference.
//!
//! The device is resolved once at startup by [`resolve_device`] and stays
//! fixed for the lifetime of the [`Embedder`](crate::Embedder).

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// The compute device embeddings run on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// A hardware accelerator (GPU), when one is available.
    #[default]
    Accelerated,
    /// The general-purpose CPU path.
    Fallback,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accelerated => f.write_str("accelerated"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// Reports whether an accelerator can be used in this process.
pub trait AcceleratorDetector: Send + Sync {
    /// A short name for logs, e.g. `"cuda"`.
    fn name(&self) -> &str;

    /// Returns `true` if the accelerator is usable.
    fn is_available(&self) -> bool;
}

/// A detector for builds without accelerator support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAccelerator;

impl AcceleratorDetector for NoAccelerator {
    fn name(&self) -> &str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Asks the ONNX runtime whether its CUDA execution provider can be used.
#[cfg(feature = "cuda")]
#[derive(Debug, Clone, Copy, Default)]
pub struct CudaDetector;

#[cfg(feature = "cuda")]
impl AcceleratorDetector for CudaDetector {
    fn name(&self) -> &str {
        "cuda"
    }

    fn is_available(&self) -> bool {
        use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

        CUDAExecutionProvider::default().is_available().unwrap_or(false)
    }
}

/// The detector matching the features this crate was built with.
pub fn default_detector() -> Box<dyn AcceleratorDetector> {
    #[cfg(feature = "cuda")]
    {
        Box::new(CudaDetector)
    }
    #[cfg(not(feature = "cuda"))]
    {
        Box::new(NoAccelerator)
    }
}

/// Resolve the requested device against what the detector reports.
///
/// An unavailable accelerator is not an error: the fallback device is
/// returned and a warning is logged.
pub fn resolve_device(requested: Device, detector: &dyn AcceleratorDetector) -> Device {
    match requested {
        Device::Fallback => {
            info!(device = %Device::Fallback, "using fallback compute device");
            Device::Fallback
        }
        Device::Accelerated if detector.is_available() => {
            info!(
                device = %Device::Accelerated,
                accelerator = detector.name(),
                "using accelerator"
            );
            Device::Accelerated
        }
        Device::Accelerated => {
            warn!(
                accelerator = detector.name(),
                "accelerated device requested but not available, falling back to CPU"
            );
            Device::Fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysAvailable;

    impl AcceleratorDetector for AlwaysAvailable {
        fn name(&self) -> &str {
            "test"
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn falls_back_when_accelerator_missing() {
        assert_eq!(resolve_device(Device::Accelerated, &NoAccelerator), Device::Fallback);
    }

    #[test]
    fn keeps_accelerator_when_available() {
        assert_eq!(resolve_device(Device::Accelerated, &AlwaysAvailable), Device::Accelerated);
        assert_eq!(resolve_device(Device::Fallback, &AlwaysAvailable), Device::Fallback);
    }

    #[test]
    fn device_names_round_trip_through_serde() {
        let parsed: Device = serde_json::from_str("\"fallback\"").unwrap();
        assert_eq!(parsed, Device::Fallback);
        assert_eq!(serde_json::to_string(&Device::Accelerated).unwrap(), "\"accelerated\"");
    }
}
