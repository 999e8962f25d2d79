use crate::error::StudioError;
use crate::module::{Render, StudioFrame};
use crate::shaders;
use crate::studio::Studio;
use glam::Vec3;
use kiln_gpu::{
    CubeSources, GpuBackend, GpuError, ProgramSpec, ShaderProgram, Texture, TextureId, TextureKind,
    UniformLocation, VertexArrayDesc, VertexArrayId, VertexStream,
};
use kiln_scene::Camera;
use std::sync::Arc;

/// Two triangles covering clip space.
#[rustfmt::skip]
const QUAD: [f32; 12] = [
    -1.0, -1.0,   1.0, -1.0,  -1.0,  1.0,
    -1.0,  1.0,   1.0, -1.0,   1.0,  1.0,
];

const SKYBOX_UNIT: u32 = 0;

/// Cube-mapped background drawn on a full-screen quad at the far plane.
#[derive(Debug)]
pub struct SkyboxModule {
    program: Arc<ShaderProgram>,
    skybox: UniformLocation,
    inverse_view_projection: UniformLocation,
    quad: VertexArrayId,
    cube: Texture,
}

impl SkyboxModule {
    /// Decode the six faces and build the module around them.
    pub async fn load<B: GpuBackend>(studio: &mut Studio<B>, sources: CubeSources) -> Result<Self, StudioError> {
        let cube = Texture::load_cube(studio.ctx_mut(), sources).await?;
        Self::with_texture(studio, cube)
    }

    pub fn with_texture<B: GpuBackend>(studio: &mut Studio<B>, cube: Texture) -> Result<Self, StudioError> {
        if cube.kind != TextureKind::Cube {
            return Err(GpuError::TargetMismatch {
                texture: cube.id,
                expected: TextureKind::Cube,
                actual: cube.kind,
            }
            .into());
        }
        let spec = ProgramSpec::new(&["position"], &["skybox", "inverse_view_projection"]);
        let program = studio.program_or_create(
            "skybox",
            [shaders::SKYBOX_VERTEX, shaders::SKYBOX_FRAGMENT],
            &spec,
        )?;
        let position = program.attribute("position")?;
        let skybox = program.uniform("skybox")?;
        let inverse_view_projection = program.uniform("inverse_view_projection")?;

        let quad = studio.ctx_mut().create_vertex_array(&VertexArrayDesc {
            streams: vec![VertexStream::new(position, 2, QUAD.to_vec())],
        })?;
        tracing::debug!(texture = %cube.id, "skybox module created");
        Ok(Self {
            program,
            skybox,
            inverse_view_projection,
            quad,
            cube,
        })
    }

    pub fn texture(&self) -> Texture {
        self.cube
    }

    /// Show a different cube texture, e.g. a freshly baked one.
    pub fn set_texture(&mut self, cube: Texture) {
        self.cube = cube;
    }

    pub(crate) fn retarget_texture(&mut self, old: TextureId, new: Texture) -> usize {
        if self.cube.id == old {
            self.cube = new;
            1
        } else {
            0
        }
    }
}

impl Render for SkyboxModule {
    fn render<B: GpuBackend>(&self, camera: &Camera, frame: &mut StudioFrame<'_, B>) -> Result<(), GpuError> {
        let ctx = &mut *frame.ctx;
        let centred = Camera {
            position: Vec3::ZERO,
            ..*camera
        };
        let inverse_vp = centred.view_projection().inverse();

        self.program.use_program(ctx)?;
        self.cube.activate(ctx, SKYBOX_UNIT)?;
        self.cube.bind(ctx)?;
        ctx.bind_vertex_array(Some(self.quad))?;
        ctx.set_uniform(self.skybox, SKYBOX_UNIT as i32)?;
        ctx.set_uniform(self.inverse_view_projection, inverse_vp)?;
        ctx.draw_arrays(0, 6)?;

        ctx.bind_vertex_array(None)?;
        ctx.bind_texture(TextureKind::Cube, None)
    }
}
