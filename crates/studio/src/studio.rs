use crate::error::StudioError;
use crate::module::{ModuleHandle, ModuleKind, Render, RenderModule, StudioFrame};
use crate::registry::{AssetRegistry, ProgramRegistry};
use kiln_gpu::{
    CubeFace, CullFace, DepthBufferId, DepthFunc, FramebufferId, GpuBackend, GpuContext,
    ProgramSpec, ShaderProgram, Texture, TextureKind, Viewport,
};
use kiln_scene::Camera;
use std::sync::Arc;

/// Studio-wide settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StudioConfig {
    pub clear_color: [f32; 4],
    /// Edge length of baked cube faces.
    pub bake_size: u32,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            bake_size: 512,
        }
    }
}

/// Owns the GPU context, the shared registries and the ordered module list.
pub struct Studio<B: GpuBackend> {
    ctx: GpuContext<B>,
    programs: ProgramRegistry,
    assets: AssetRegistry,
    modules: Vec<RenderModule>,
    config: StudioConfig,
}

impl<B: GpuBackend> Studio<B> {
    pub fn new(mut ctx: GpuContext<B>, config: StudioConfig) -> Self {
        ctx.set_depth_test(Some(DepthFunc::LessEqual));
        ctx.set_cull_face(Some(CullFace::Back));
        Self {
            ctx,
            programs: ProgramRegistry::new(),
            assets: AssetRegistry::new(),
            modules: Vec::new(),
            config,
        }
    }

    pub fn ctx(&self) -> &GpuContext<B> {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut GpuContext<B> {
        &mut self.ctx
    }

    pub fn programs(&self) -> &ProgramRegistry {
        &self.programs
    }

    pub fn programs_mut(&mut self) -> &mut ProgramRegistry {
        &mut self.programs
    }

    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut AssetRegistry {
        &mut self.assets
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn modules(&self) -> &[RenderModule] {
        &self.modules
    }

    /// The program registered as `name`, compiling and registering it first
    /// if it is not there yet.
    pub fn program_or_create(
        &mut self,
        name: &str,
        sources: [&str; 2],
        spec: &ProgramSpec,
    ) -> Result<Arc<ShaderProgram>, StudioError> {
        if let Ok(program) = self.programs.get(name) {
            return Ok(program);
        }
        let program = Arc::new(ShaderProgram::create(&mut self.ctx, sources, spec)?);
        self.programs.load(name, Arc::clone(&program));
        tracing::debug!(name, id = %program.id(), "program registered");
        Ok(program)
    }

    /// Build a module with `factory` and append it to the render order.
    pub async fn register<M, F>(&mut self, factory: F) -> Result<ModuleHandle<M>, StudioError>
    where
        M: ModuleKind,
        F: AsyncFnOnce(&mut Self) -> Result<M, StudioError>,
    {
        let module = factory(self).await?;
        let index = self.modules.len();
        self.modules.push(module.wrap());
        tracing::debug!(kind = M::NAME, index, "module registered");
        Ok(ModuleHandle::new(index))
    }

    pub fn module<M: ModuleKind>(&self, handle: ModuleHandle<M>) -> Option<&M> {
        self.modules.get(handle.index()).and_then(M::peek)
    }

    pub fn module_mut<M: ModuleKind>(&mut self, handle: ModuleHandle<M>) -> Option<&mut M> {
        self.modules.get_mut(handle.index()).and_then(M::peek_mut)
    }

    /// Draw one frame to the surface.
    pub fn render(&mut self, camera: &Camera) -> Result<(), StudioError> {
        let _span = tracing::debug_span!("render", modules = self.modules.len()).entered();
        let (width, height) = self.ctx.surface_size();
        self.ctx.viewport(Viewport::sized(width, height));
        self.ctx.set_depth_test(Some(DepthFunc::LessEqual));
        self.ctx.set_cull_face(Some(CullFace::Back));
        self.ctx.clear_color(self.config.clear_color);
        let drawn = self
            .ctx
            .clear()
            .map_err(StudioError::from)
            .and_then(|()| self.run_modules(camera));
        if drawn.is_err() {
            self.ctx.discard();
        }
        drawn
    }

    fn run_modules(&mut self, camera: &Camera) -> Result<(), StudioError> {
        let mut frame = StudioFrame {
            ctx: &mut self.ctx,
            programs: &self.programs,
            assets: &self.assets,
        };
        for module in &self.modules {
            tracing::trace!(module = module.name(), "render module");
            module.render(camera, &mut frame)?;
        }
        Ok(())
    }

    /// The six cameras of a bake from `camera`'s position, in layer order.
    pub fn face_cameras(camera: &Camera) -> [Camera; 6] {
        CubeFace::ALL.map(|face| Camera::looking_at_face(camera.position, face.direction(), face.up()))
    }

    /// Render the scene into each face of a new cube texture.
    ///
    /// The returned texture stays owned by the context until teardown.
    pub fn render_cubemap(&mut self, camera: &Camera) -> Result<Texture, StudioError> {
        let size = self.config.bake_size;
        let _span = tracing::info_span!("render_cubemap", size).entered();

        let framebuffer = self.ctx.create_framebuffer();
        let depth = match self.ctx.create_depth_buffer(size, size) {
            Ok(depth) => depth,
            Err(err) => {
                self.release_bake_targets(framebuffer, None);
                return Err(err.into());
            }
        };
        let cube = match Texture::render_target_cube(&mut self.ctx, size) {
            Ok(cube) => cube,
            Err(err) => {
                self.release_bake_targets(framebuffer, Some(depth));
                return Err(err.into());
            }
        };

        let baked = self.bake_faces(camera, framebuffer, depth, cube);
        self.release_bake_targets(framebuffer, Some(depth));
        if let Err(err) = baked {
            self.ctx.discard();
            if let Err(release) = self.ctx.release(cube.id) {
                tracing::warn!(%release, "failed to release bake target");
            }
            return Err(err);
        }
        self.ctx.flush()?;
        tracing::info!(texture = %cube.id, size, "cubemap baked");
        Ok(cube)
    }

    fn bake_faces(
        &mut self,
        camera: &Camera,
        framebuffer: FramebufferId,
        depth: DepthBufferId,
        cube: Texture,
    ) -> Result<(), StudioError> {
        let size = self.config.bake_size;
        self.ctx.attach_depth(framebuffer, depth)?;
        self.ctx.bind_framebuffer(Some(framebuffer))?;
        self.ctx.viewport(Viewport::sized(size, size));
        self.ctx.clear_color(self.config.clear_color);

        let cameras = Self::face_cameras(camera);
        for (face, face_camera) in CubeFace::ALL.into_iter().zip(&cameras) {
            tracing::debug!(face = face.stem(), "bake face");
            self.ctx.attach_color(framebuffer, cube.id, face.layer())?;
            self.ctx.clear()?;
            self.run_modules(face_camera)?;
        }
        Ok(())
    }

    fn release_bake_targets(&mut self, framebuffer: FramebufferId, depth: Option<DepthBufferId>) {
        let unbound = self
            .ctx
            .bind_framebuffer(None)
            .and_then(|()| self.ctx.bind_texture(TextureKind::Cube, None));
        if let Err(err) = unbound {
            tracing::warn!(%err, "failed to unbind bake targets");
        }
        let released = self
            .ctx
            .release(framebuffer)
            .and_then(|()| depth.map_or(Ok(()), |d| self.ctx.release(d)));
        if let Err(err) = released {
            tracing::warn!(%err, "failed to release bake targets");
        }
    }

    /// Point every module sampling `old` at `new`, then release `old`.
    pub fn replace_texture(&mut self, old: Texture, new: Texture) -> Result<(), StudioError> {
        let retargeted: usize = self
            .modules
            .iter_mut()
            .map(|m| m.retarget_texture(old.id, new))
            .sum();
        self.ctx.release(old.id)?;
        tracing::debug!(old = %old.id, new = %new.id, retargeted, "texture replaced");
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), StudioError> {
        Ok(self.ctx.flush()?)
    }

    /// Drop every module, empty both registries and release all GPU objects.
    /// Safe to call more than once.
    pub fn teardown(&mut self) {
        let modules = self.modules.len();
        self.modules.clear();
        self.programs.clear();
        self.assets.clear();
        let released = self.ctx.release_all();
        if modules > 0 || released > 0 {
            tracing::debug!(modules, released, "studio torn down");
        }
    }
}

impl<B: GpuBackend> Drop for Studio<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use kiln_gpu::headless::HeadlessBackend;

    fn studio() -> Studio<HeadlessBackend> {
        Studio::new(GpuContext::new(HeadlessBackend::new(64, 48)), StudioConfig::default())
    }

    #[test]
    fn new_enables_depth_and_culling() {
        let studio = studio();
        let raster = studio.ctx().bind_state().raster;
        assert_eq!(raster.depth, Some(DepthFunc::LessEqual));
        assert_eq!(raster.cull, Some(CullFace::Back));
    }

    #[test]
    fn face_cameras_share_position() {
        let camera = Camera {
            position: Vec3::new(1.0, 2.0, 3.0),
            ..Camera::default()
        };
        let cameras = Studio::<HeadlessBackend>::face_cameras(&camera);
        assert!(cameras.iter().all(|c| c.position == camera.position && c.fov == 90.0));
        assert_eq!(cameras[0].direction, Vec3::X);
        assert_eq!(cameras[2].up, Vec3::Z);
        assert_eq!(cameras[3].up, Vec3::NEG_Z);
        assert_eq!(cameras[5].direction, Vec3::NEG_Z);
    }

    #[test]
    fn render_with_no_modules_only_clears() {
        let mut studio = studio();
        studio.render(&Camera::default()).unwrap();
        let backend = studio.ctx().backend();
        assert_eq!(backend.clears().count(), 1);
        assert_eq!(backend.draws().count(), 0);
        let clear = backend.clears().next().unwrap();
        assert_eq!(clear.viewport, Viewport::sized(64, 48));
        assert_eq!(clear.color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn failed_bake_allocation_leaves_nothing_behind() {
        let mut studio = studio();
        studio.ctx_mut().backend_mut().fail_allocations(true);
        let err = studio.render_cubemap(&Camera::default()).unwrap_err();
        assert!(matches!(err, StudioError::Gpu(kiln_gpu::GpuError::ResourceCreation { .. })));
        assert!(studio.ctx().live_resources().is_empty());
        assert_eq!(studio.ctx().bind_state().framebuffer, None);
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut studio = studio();
        studio.render_cubemap(&Camera::default()).unwrap();
        assert_eq!(studio.ctx().live_resources().len(), 1);
        studio.teardown();
        studio.teardown();
        assert!(studio.ctx().live_resources().is_empty());
        assert!(studio.ctx().backend().live().is_empty());
    }
}
