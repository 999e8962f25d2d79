//! Backend-agnostic GPU layer.
//!
//! A [`GpuContext`] owns a [`GpuBackend`] together with an explicit bind state
//! (program, vertex array, framebuffer, texture units, viewport, raster state).
//! Draws and clears are resolved against that state into self-contained
//! commands, so backends never track bindings themselves.
//!
//! # Invariants
//! - A [`ShaderProgram`] exists only if compile, link and every requested
//!   binding lookup succeeded.
//! - A [`Texture`] is only produced by a completed upload or allocation.
//! - All resources are released through the context that created them.

mod backend;
mod context;
mod error;
mod resource;
mod shader;
mod texture;

pub mod headless;

pub use backend::{
    BoundTexture, Clear, ColorTarget, CullFace, DepthFunc, DepthTarget, DrawCall, GpuBackend,
    RasterState, TargetDesc, TextureDesc, TextureKind, TextureWrite, VertexArrayDesc,
    VertexStream, Viewport,
};
pub use context::{BindState, GpuContext, UnitBinding, MAX_TEXTURE_UNITS};
pub use error::GpuError;
pub use resource::{DepthBufferId, FramebufferId, ProgramId, ResourceId, TextureId, VertexArrayId};
pub use shader::{
    Attribute, BindingKind, ProgramLayout, ProgramSpec, ShaderError, ShaderProgram, Stage,
    StageEntry, TextureSlot, UniformBlock, UniformLocation, UniformMember, UniformType,
    UniformValue,
};
pub use texture::{mip_count, CubeFace, CubeSources, ImageSource, Texture, TextureError};

pub fn crate_info() -> &'static str {
    "kiln-gpu v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("gpu"));
    }
}
