use kiln_gpu::{GpuError, ShaderError, TextureError};
use kiln_scene::ObjError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no {kind} registered as `{name}`")]
    Missing { kind: &'static str, name: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Texture(#[from] TextureError),

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error(transparent)]
    Obj(#[from] ObjError),
}
