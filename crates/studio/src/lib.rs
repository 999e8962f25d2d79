//! The render studio.
//!
//! A [`Studio`] owns a GPU context, a program registry, an asset registry and
//! an ordered list of render modules. Each frame it clears the surface and runs
//! every module in registration order. [`Studio::render_cubemap`] re-runs the
//! same loop six times from one position, writing one face of a cube texture
//! per pass.
//!
//! # Invariants
//! - Modules render in the order they were registered; none is ever removed
//!   before teardown.
//! - A module exists only after its factory resolved, so every resource it
//!   uses is loaded.
//! - Rendering a module never changes the caller's camera.
//! - `teardown` (also run on drop) leaves no live GPU object behind.

mod error;
mod lit;
mod module;
mod registry;
mod skybox;
mod studio;

pub mod shaders;

pub use error::{RegistryError, StudioError};
pub use lit::{ItemId, LitModule, Lighting, RenderItem};
pub use module::{ModuleHandle, ModuleKind, Render, RenderModule, StudioFrame};
pub use registry::{AssetRegistry, ProgramRegistry, Registry};
pub use skybox::SkyboxModule;
pub use studio::{Studio, StudioConfig};

pub fn crate_info() -> &'static str {
    "kiln-studio v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("studio"));
    }
}
