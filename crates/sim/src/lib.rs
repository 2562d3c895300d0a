//! Fluid Backdrop - Simulation Library
//!
//! 2D stable-fluids backdrop for page sections:
//! - Semi-Lagrangian advection, vorticity confinement, Jacobi pressure projection
//! - Gaussian splats from pointers, touches and scripted shapes
//! - Obstacle fields derived from other page elements
//! - Scroll-linked parameter animation and idle calm-down
//!
//! This crate is framework-agnostic: it owns the config, scheduling and a
//! rayon CPU reference solver. The `backdrop` crate runs the same passes on
//! the GPU through [`FluidBackend`].

pub mod backend;
pub mod bloom;
pub mod calm;
pub mod color;
pub mod config;
pub mod display;
pub mod grid;
pub mod host;
pub mod instance;
pub mod obstacle;
pub mod pointer;
pub mod scheduler;
pub mod scroll;
pub mod shape;
pub mod solver;
pub mod splat;

pub use backend::{FluidBackend, StepParams};
pub use config::{BlendMode, ColorMode, ConfigError, ElementInteraction, ObstacleMode, SimConfig};
pub use display::DisplayParams;
pub use grid::{GridSizes, SurfaceSize};
pub use host::{Layout, Rect, SelectorError, StaticPage, SurfaceRegistry, SurfaceSpec};
pub use instance::{FluidInstance, InstanceSetup};
pub use scheduler::{Clock, Frame, InputEvent, ManualClock, PointerId, SystemClock};
pub use shape::{parse_shapes, Shape};
pub use solver::CpuFluid;
pub use splat::Splat;
