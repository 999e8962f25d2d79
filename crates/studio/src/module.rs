use crate::lit::LitModule;
use crate::registry::{AssetRegistry, ProgramRegistry};
use crate::skybox::SkyboxModule;
use kiln_gpu::{GpuBackend, GpuContext, GpuError, Texture, TextureId};
use kiln_scene::Camera;
use std::fmt;
use std::marker::PhantomData;

/// What a module sees of the studio while rendering.
pub struct StudioFrame<'a, B: GpuBackend> {
    pub ctx: &'a mut GpuContext<B>,
    pub programs: &'a ProgramRegistry,
    pub assets: &'a AssetRegistry,
}

/// Draw one pass of a module for `camera`. Must not change the caller's camera.
pub trait Render {
    fn render<B: GpuBackend>(&self, camera: &Camera, frame: &mut StudioFrame<'_, B>) -> Result<(), GpuError>;
}

/// Every kind of module a studio can hold.
#[derive(Debug)]
pub enum RenderModule {
    Lit(LitModule),
    Skybox(SkyboxModule),
}

impl RenderModule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lit(_) => LitModule::NAME,
            Self::Skybox(_) => SkyboxModule::NAME,
        }
    }

    /// Swap texture `old` for `new` wherever this module samples it.
    pub fn retarget_texture(&mut self, old: TextureId, new: Texture) -> usize {
        match self {
            Self::Lit(m) => m.retarget_texture(old, new),
            Self::Skybox(m) => m.retarget_texture(old, new),
        }
    }
}

impl Render for RenderModule {
    fn render<B: GpuBackend>(&self, camera: &Camera, frame: &mut StudioFrame<'_, B>) -> Result<(), GpuError> {
        match self {
            Self::Lit(m) => m.render(camera, frame),
            Self::Skybox(m) => m.render(camera, frame),
        }
    }
}

/// A concrete module type stored inside [`RenderModule`].
pub trait ModuleKind: Render + Sized {
    const NAME: &'static str;

    fn wrap(self) -> RenderModule;

    fn peek(module: &RenderModule) -> Option<&Self>;

    fn peek_mut(module: &mut RenderModule) -> Option<&mut Self>;
}

impl ModuleKind for LitModule {
    const NAME: &'static str = "lit";

    fn wrap(self) -> RenderModule {
        RenderModule::Lit(self)
    }

    fn peek(module: &RenderModule) -> Option<&Self> {
        match module {
            RenderModule::Lit(m) => Some(m),
            _ => None,
        }
    }

    fn peek_mut(module: &mut RenderModule) -> Option<&mut Self> {
        match module {
            RenderModule::Lit(m) => Some(m),
            _ => None,
        }
    }
}

impl ModuleKind for SkyboxModule {
    const NAME: &'static str = "skybox";

    fn wrap(self) -> RenderModule {
        RenderModule::Skybox(self)
    }

    fn peek(module: &RenderModule) -> Option<&Self> {
        match module {
            RenderModule::Skybox(m) => Some(m),
            _ => None,
        }
    }

    fn peek_mut(module: &mut RenderModule) -> Option<&mut Self> {
        match module {
            RenderModule::Skybox(m) => Some(m),
            _ => None,
        }
    }
}

/// Typed index of a registered module.
pub struct ModuleHandle<M> {
    index: usize,
    _kind: PhantomData<fn() -> M>,
}

impl<M> ModuleHandle<M> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            _kind: PhantomData,
        }
    }

    /// Position in render order.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<M> Clone for ModuleHandle<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for ModuleHandle<M> {}

impl<M> PartialEq for ModuleHandle<M> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<M> Eq for ModuleHandle<M> {}

impl<M: ModuleKind> fmt::Debug for ModuleHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleHandle<{}>({})", M::NAME, self.index)
    }
}
