//! GPU luminance measurement using wgpu
//!
//! Reduces the current eye image to a single brightness scalar with a
//! compute shader and reads it back behind a bounded completion wait.

pub mod context;
pub mod kernel;
pub mod probe;
pub mod reduction;
pub mod synthetic;

pub use context::GpuContext;
pub use kernel::KernelLocator;
pub use probe::GpuProbe;
pub use reduction::DispatchGrid;
pub use synthetic::SyntheticSurface;
