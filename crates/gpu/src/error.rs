use crate::backend::TextureKind;
use crate::resource::{FramebufferId, ResourceId, TextureId};
use crate::shader::UniformType;

/// Errors raised by the context or a backend.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("failed to create {what}: {reason}")]
    ResourceCreation { what: &'static str, reason: String },

    #[error("unknown {0}")]
    UnknownResource(ResourceId),

    #[error("draw issued with no {0} bound")]
    NothingBound(&'static str),

    #[error("texture unit {unit} out of range (limit {limit})")]
    TextureUnit { unit: u32, limit: u32 },

    #[error("{texture} is a {actual:?} texture, not {expected:?}")]
    TargetMismatch {
        texture: TextureId,
        expected: TextureKind,
        actual: TextureKind,
    },

    #[error("uniform expects {expected:?}, got {found:?}")]
    UniformMismatch {
        expected: UniformType,
        found: UniformType,
    },

    #[error("vertex stream at location {location} holds {found} vertices, expected {expected}")]
    StreamLength {
        location: u32,
        expected: usize,
        found: usize,
    },

    #[error("bad texture upload: {0}")]
    BadUpload(String),

    #[error("{0} has no colour attachment")]
    IncompleteFramebuffer(FramebufferId),

    #[error("draw of vertices {first}..{end} exceeds the {available} available")]
    DrawRange { first: u32, end: u32, available: u32 },

    #[error("backend failure: {0}")]
    Backend(String),
}
