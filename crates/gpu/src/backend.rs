use crate::error::GpuError;
use crate::resource::{DepthBufferId, ProgramId, ResourceId, TextureId, VertexArrayId};
use crate::shader::ProgramLayout;
use std::sync::Arc;

/// Texture target a texture is created for and bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Plane,
    Cube,
}

impl TextureKind {
    pub fn layers(self) -> u32 {
        match self {
            Self::Plane => 1,
            Self::Cube => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
}

/// One tightly packed RGBA8 upload into a layer/mip of a texture.
#[derive(Debug, Clone, Copy)]
pub struct TextureWrite<'a> {
    pub layer: u32,
    pub mip: u32,
    pub width: u32,
    pub height: u32,
    pub rgba: &'a [u8],
}

/// A float attribute stream bound to a shader input location.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexStream {
    pub location: u32,
    /// Floats per vertex, 1 to 4.
    pub components: u32,
    pub data: Vec<f32>,
}

impl VertexStream {
    pub fn new(location: u32, components: u32, data: Vec<f32>) -> Self {
        Self {
            location,
            components,
            data,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.data.len() / self.components.max(1) as usize
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexArrayDesc {
    pub streams: Vec<VertexStream>,
}

/// Origin is the bottom-left corner of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    Less,
    LessEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullFace {
    Front,
    Back,
}

/// Fixed-function state captured into every draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RasterState {
    /// `None` disables the depth test.
    pub depth: Option<DepthFunc>,
    /// `None` disables culling.
    pub cull: Option<CullFace>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorTarget {
    Surface,
    Texture { id: TextureId, layer: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthTarget {
    /// Depth buffer the backend keeps alongside the surface.
    Surface,
    Buffer(DepthBufferId),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetDesc {
    pub color: ColorTarget,
    pub depth: DepthTarget,
}

impl TargetDesc {
    pub const SURFACE: Self = Self {
        color: ColorTarget::Surface,
        depth: DepthTarget::Surface,
    };
}

/// Clear of colour and depth (to 1.0) within the viewport's target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clear {
    pub target: TargetDesc,
    pub color: [f32; 4],
    pub viewport: Viewport,
}

/// Texture resolved for one texture binding of the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundTexture {
    pub binding: u32,
    pub kind: TextureKind,
    pub texture: Option<TextureId>,
}

/// Everything a backend needs to execute one draw, independent of bind state.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub target: TargetDesc,
    pub viewport: Viewport,
    pub raster: RasterState,
    pub program: ProgramId,
    pub vertex_array: VertexArrayId,
    pub first: u32,
    pub count: u32,
    /// Uniform block contents at draw time.
    pub uniforms: Vec<u8>,
    pub textures: Vec<BoundTexture>,
}

/// Executes resolved commands. Ids are allocated by the context and are unique
/// across all kinds for the lifetime of the context.
pub trait GpuBackend {
    fn create_program(&mut self, id: ProgramId, layout: Arc<ProgramLayout>) -> Result<(), GpuError>;

    fn create_texture(&mut self, id: TextureId, desc: &TextureDesc) -> Result<(), GpuError>;

    fn write_texture(&mut self, id: TextureId, write: &TextureWrite<'_>) -> Result<(), GpuError>;

    fn create_vertex_array(
        &mut self,
        id: VertexArrayId,
        desc: &VertexArrayDesc,
    ) -> Result<(), GpuError>;

    fn create_depth_buffer(
        &mut self,
        id: DepthBufferId,
        width: u32,
        height: u32,
    ) -> Result<(), GpuError>;

    /// Never called with a framebuffer id.
    fn release(&mut self, id: ResourceId);

    fn clear(&mut self, clear: &Clear) -> Result<(), GpuError>;

    fn draw(&mut self, call: &DrawCall) -> Result<(), GpuError>;

    /// Size of the default render target in pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Submit everything recorded since the last flush.
    fn flush(&mut self) -> Result<(), GpuError>;

    /// Drop everything recorded since the last flush without submitting it.
    fn discard(&mut self);
}
