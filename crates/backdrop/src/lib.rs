//! Fluid Backdrop - GPU backend and desktop runner
//!
//! - `gpu`: wgpu compute implementation of [`sim::FluidBackend`] plus the
//!   display compositor
//! - `app`: winit runner presenting every fluid-enabled surface of a
//!   JSON-described page in its own window

pub mod app;
pub mod gpu;
