//! Version pipeline compilation and engine execution.
//!
//! | Concern | Module / item |
//! |---|---|
//! | **Crop geometry** | [`calculations`]: `AspectRatio`, `compute_crop` |
//! | **Command model** | `params`: `Quality`, `CommandFragment`, `EngineCommand` |
//! | **Compile** | [`operations`]: `compile_stage`, `compile_pipeline` |
//! | **Execute** | [`backend`]: [`Executor`] trait + [`MagickExecutor`] |
//! | **Identify** | [`identify`](identify::identify): `image` crate header read |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for crop math (unit testable)
//! - **Parameters**: Data structures describing the engine command
//! - **Operations**: The compiler combining calculations + naming
//! - **Backend**: [`Executor`] trait + [`MagickExecutor`]

pub mod backend;
pub mod calculations;
pub mod identify;
pub mod magick_backend;
pub mod operations;
mod params;

pub use backend::{BackendError, Dimensions, ExecOutput, Executor};
pub use calculations::{AspectRatio, CropRect, GeometryError, compute_crop};
pub use identify::{identify, is_supported_image};
pub use magick_backend::MagickExecutor;
pub use operations::{
    CompileError, DEFAULT_PROGRAM, RetainedHandle, StagePosition, compile_pipeline,
    compile_pipeline_with, compile_stage,
};
pub use params::{Arg, CommandFragment, EngineCommand, Quality};
