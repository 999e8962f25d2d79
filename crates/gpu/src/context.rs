use crate::backend::{
    BoundTexture, Clear, ColorTarget, CullFace, DepthFunc, DepthTarget, DrawCall, GpuBackend,
    RasterState, TargetDesc, TextureDesc, TextureKind, TextureWrite, VertexArrayDesc, Viewport,
};
use crate::error::GpuError;
use crate::resource::{
    DepthBufferId, FramebufferId, ProgramId, ResourceId, TextureId, VertexArrayId,
};
use crate::shader::{ProgramLayout, UniformLocation, UniformValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Number of texture units a context exposes.
pub const MAX_TEXTURE_UNITS: u32 = 8;

/// Textures bound to the two targets of one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitBinding {
    pub plane: Option<TextureId>,
    pub cube: Option<TextureId>,
}

impl UnitBinding {
    fn get(&self, kind: TextureKind) -> Option<TextureId> {
        match kind {
            TextureKind::Plane => self.plane,
            TextureKind::Cube => self.cube,
        }
    }

    fn slot(&mut self, kind: TextureKind) -> &mut Option<TextureId> {
        match kind {
            TextureKind::Plane => &mut self.plane,
            TextureKind::Cube => &mut self.cube,
        }
    }
}

/// The ambient state draws and clears are resolved against.
#[derive(Debug, Clone, PartialEq)]
pub struct BindState {
    pub program: Option<ProgramId>,
    pub vertex_array: Option<VertexArrayId>,
    pub framebuffer: Option<FramebufferId>,
    pub active_unit: u32,
    pub units: [UnitBinding; MAX_TEXTURE_UNITS as usize],
    pub viewport: Viewport,
    pub raster: RasterState,
    pub clear_color: [f32; 4],
}

impl BindState {
    fn new(viewport: Viewport) -> Self {
        Self {
            program: None,
            vertex_array: None,
            framebuffer: None,
            active_unit: 0,
            units: [UnitBinding::default(); MAX_TEXTURE_UNITS as usize],
            viewport,
            raster: RasterState::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[derive(Debug)]
struct ProgramState {
    layout: Arc<ProgramLayout>,
    block: Vec<u8>,
    /// Texture unit sampled by each of the layout's texture slots.
    units: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Framebuffer {
    color: Option<(TextureId, u32)>,
    depth: Option<DepthBufferId>,
}

/// Explicit replacement for a global graphics context: owns the backend, the
/// bind state and every live resource.
///
/// # Invariants
/// - Ids are never reused within one context.
/// - Every id reachable from the bind state refers to a live resource.
#[derive(Debug)]
pub struct GpuContext<B: GpuBackend> {
    backend: B,
    next_id: u32,
    state: BindState,
    programs: BTreeMap<ProgramId, ProgramState>,
    textures: BTreeMap<TextureId, TextureDesc>,
    vertex_arrays: BTreeMap<VertexArrayId, u32>,
    depth_buffers: BTreeMap<DepthBufferId, (u32, u32)>,
    framebuffers: BTreeMap<FramebufferId, Framebuffer>,
}

impl<B: GpuBackend> GpuContext<B> {
    pub fn new(backend: B) -> Self {
        let (width, height) = backend.surface_size();
        Self {
            backend,
            next_id: 1,
            state: BindState::new(Viewport::sized(width, height)),
            programs: BTreeMap::new(),
            textures: BTreeMap::new(),
            vertex_arrays: BTreeMap::new(),
            depth_buffers: BTreeMap::new(),
            framebuffers: BTreeMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn bind_state(&self) -> &BindState {
        &self.state
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // --- resources ---

    pub fn create_program(&mut self, layout: Arc<ProgramLayout>) -> Result<ProgramId, GpuError> {
        let id = ProgramId(self.allocate());
        self.backend.create_program(id, Arc::clone(&layout))?;
        let block = vec![0; layout.block_size() as usize];
        let units = vec![0; layout.textures.len()];
        self.programs.insert(
            id,
            ProgramState {
                layout,
                block,
                units,
            },
        );
        Ok(id)
    }

    pub fn create_texture(&mut self, desc: TextureDesc) -> Result<TextureId, GpuError> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(GpuError::ResourceCreation {
                what: "texture",
                reason: format!(
                    "{}x{} with {} mip levels",
                    desc.width, desc.height, desc.mip_levels
                ),
            });
        }
        let id = TextureId(self.allocate());
        self.backend.create_texture(id, &desc)?;
        self.textures.insert(id, desc);
        Ok(id)
    }

    pub fn write_texture(&mut self, id: TextureId, write: &TextureWrite<'_>) -> Result<(), GpuError> {
        let desc = self
            .textures
            .get(&id)
            .ok_or(GpuError::UnknownResource(id.into()))?;
        if write.layer >= desc.kind.layers() || write.mip >= desc.mip_levels {
            return Err(GpuError::BadUpload(format!(
                "layer {} mip {} outside {id}",
                write.layer, write.mip
            )));
        }
        let expected = (desc.width >> write.mip).max(1);
        if write.width != expected || write.height != (desc.height >> write.mip).max(1) {
            return Err(GpuError::BadUpload(format!(
                "mip {} of {id} is {}x{}",
                write.mip, write.width, write.height
            )));
        }
        if write.rgba.len() != (write.width * write.height * 4) as usize {
            return Err(GpuError::BadUpload(format!(
                "{} bytes for a {}x{} RGBA image",
                write.rgba.len(),
                write.width,
                write.height
            )));
        }
        self.backend.write_texture(id, write)
    }

    /// Upload the streams as one vertex array. All streams must hold the same
    /// number of vertices.
    pub fn create_vertex_array(&mut self, desc: &VertexArrayDesc) -> Result<VertexArrayId, GpuError> {
        let count = desc.streams.first().map_or(0, |s| s.vertex_count());
        for stream in &desc.streams {
            let found = stream.vertex_count();
            if found != count || stream.data.len() % stream.components.max(1) as usize != 0 {
                return Err(GpuError::StreamLength {
                    location: stream.location,
                    expected: count,
                    found,
                });
            }
        }
        let id = VertexArrayId(self.allocate());
        self.backend.create_vertex_array(id, desc)?;
        self.vertex_arrays.insert(id, count as u32);
        Ok(id)
    }

    pub fn create_depth_buffer(&mut self, width: u32, height: u32) -> Result<DepthBufferId, GpuError> {
        let id = DepthBufferId(self.allocate());
        self.backend.create_depth_buffer(id, width, height)?;
        self.depth_buffers.insert(id, (width, height));
        Ok(id)
    }

    pub fn create_framebuffer(&mut self) -> FramebufferId {
        let id = FramebufferId(self.allocate());
        self.framebuffers.insert(id, Framebuffer::default());
        id
    }

    pub fn attach_color(
        &mut self,
        framebuffer: FramebufferId,
        texture: TextureId,
        layer: u32,
    ) -> Result<(), GpuError> {
        let desc = self
            .textures
            .get(&texture)
            .ok_or(GpuError::UnknownResource(texture.into()))?;
        if layer >= desc.kind.layers() {
            return Err(GpuError::BadUpload(format!("{texture} has no layer {layer}")));
        }
        let fb = self
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or(GpuError::UnknownResource(framebuffer.into()))?;
        fb.color = Some((texture, layer));
        Ok(())
    }

    pub fn attach_depth(&mut self, framebuffer: FramebufferId, depth: DepthBufferId) -> Result<(), GpuError> {
        if !self.depth_buffers.contains_key(&depth) {
            return Err(GpuError::UnknownResource(depth.into()));
        }
        let fb = self
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or(GpuError::UnknownResource(framebuffer.into()))?;
        fb.depth = Some(depth);
        Ok(())
    }

    /// Release one resource and drop every binding that referred to it.
    pub fn release(&mut self, id: impl Into<ResourceId>) -> Result<(), GpuError> {
        let id = id.into();
        let known = match id {
            ResourceId::ProgramId(p) => {
                if self.state.program == Some(p) {
                    self.state.program = None;
                }
                self.programs.remove(&p).is_some()
            }
            ResourceId::TextureId(t) => {
                for unit in &mut self.state.units {
                    for kind in [TextureKind::Plane, TextureKind::Cube] {
                        if unit.get(kind) == Some(t) {
                            *unit.slot(kind) = None;
                        }
                    }
                }
                for fb in self.framebuffers.values_mut() {
                    if fb.color.is_some_and(|(c, _)| c == t) {
                        fb.color = None;
                    }
                }
                self.textures.remove(&t).is_some()
            }
            ResourceId::VertexArrayId(v) => {
                if self.state.vertex_array == Some(v) {
                    self.state.vertex_array = None;
                }
                self.vertex_arrays.remove(&v).is_some()
            }
            ResourceId::DepthBufferId(d) => {
                for fb in self.framebuffers.values_mut() {
                    if fb.depth == Some(d) {
                        fb.depth = None;
                    }
                }
                self.depth_buffers.remove(&d).is_some()
            }
            ResourceId::FramebufferId(f) => {
                if self.state.framebuffer == Some(f) {
                    self.state.framebuffer = None;
                }
                return match self.framebuffers.remove(&f) {
                    Some(_) => Ok(()),
                    None => Err(GpuError::UnknownResource(id)),
                };
            }
        };
        if !known {
            return Err(GpuError::UnknownResource(id));
        }
        self.backend.release(id);
        Ok(())
    }

    /// Release everything the context still owns. Returns how many objects
    /// were freed.
    pub fn release_all(&mut self) -> usize {
        let live = self.live_resources();
        let count = live.len();
        for id in live {
            if let Err(err) = self.release(id) {
                tracing::warn!(%err, "release during teardown failed");
            }
        }
        count
    }

    pub fn live_resources(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = Vec::new();
        ids.extend(self.programs.keys().map(|&id| ResourceId::from(id)));
        ids.extend(self.textures.keys().map(|&id| ResourceId::from(id)));
        ids.extend(self.vertex_arrays.keys().map(|&id| ResourceId::from(id)));
        ids.extend(self.depth_buffers.keys().map(|&id| ResourceId::from(id)));
        ids.extend(self.framebuffers.keys().map(|&id| ResourceId::from(id)));
        ids
    }

    pub fn texture_desc(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&id)
    }

    // --- bind state ---

    pub fn use_program(&mut self, program: Option<ProgramId>) -> Result<(), GpuError> {
        if let Some(p) = program {
            if !self.programs.contains_key(&p) {
                return Err(GpuError::UnknownResource(p.into()));
            }
        }
        self.state.program = program;
        Ok(())
    }

    /// Set a uniform of the program in use. A sampler location takes the
    /// texture unit as an integer.
    pub fn set_uniform(&mut self, location: UniformLocation, value: impl Into<UniformValue>) -> Result<(), GpuError> {
        let value = value.into();
        let program = self.state.program.ok_or(GpuError::NothingBound("program"))?;
        let state = self
            .programs
            .get_mut(&program)
            .ok_or(GpuError::UnknownResource(program.into()))?;
        match location {
            UniformLocation::Member { offset, ty } => {
                if value.ty() != ty {
                    return Err(GpuError::UniformMismatch {
                        expected: ty,
                        found: value.ty(),
                    });
                }
                let bytes = value.to_bytes();
                let start = offset as usize;
                let Some(dst) = state.block.get_mut(start..start + bytes.len()) else {
                    return Err(GpuError::BadUpload(format!(
                        "uniform at offset {offset} outside the block of {program}"
                    )));
                };
                dst.copy_from_slice(&bytes);
            }
            UniformLocation::Sampler { slot } => {
                let unit = match value {
                    UniformValue::I32(u) if u >= 0 => u as u32,
                    UniformValue::U32(u) => u,
                    other => {
                        return Err(GpuError::UniformMismatch {
                            expected: crate::shader::UniformType::I32,
                            found: other.ty(),
                        });
                    }
                };
                if unit >= MAX_TEXTURE_UNITS {
                    return Err(GpuError::TextureUnit {
                        unit,
                        limit: MAX_TEXTURE_UNITS,
                    });
                }
                let Some(dst) = state.units.get_mut(slot) else {
                    return Err(GpuError::BadUpload(format!(
                        "{program} has no texture slot {slot}"
                    )));
                };
                *dst = unit;
            }
        }
        Ok(())
    }

    pub fn active_texture(&mut self, unit: u32) -> Result<(), GpuError> {
        if unit >= MAX_TEXTURE_UNITS {
            return Err(GpuError::TextureUnit {
                unit,
                limit: MAX_TEXTURE_UNITS,
            });
        }
        self.state.active_unit = unit;
        Ok(())
    }

    /// Bind (or with `None`, unbind) a texture on the active unit's `kind` target.
    pub fn bind_texture(&mut self, kind: TextureKind, texture: Option<TextureId>) -> Result<(), GpuError> {
        if let Some(t) = texture {
            let desc = self
                .textures
                .get(&t)
                .ok_or(GpuError::UnknownResource(t.into()))?;
            if desc.kind != kind {
                return Err(GpuError::TargetMismatch {
                    texture: t,
                    expected: kind,
                    actual: desc.kind,
                });
            }
        }
        *self.state.units[self.state.active_unit as usize].slot(kind) = texture;
        Ok(())
    }

    pub fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) -> Result<(), GpuError> {
        if let Some(v) = vertex_array {
            if !self.vertex_arrays.contains_key(&v) {
                return Err(GpuError::UnknownResource(v.into()));
            }
        }
        self.state.vertex_array = vertex_array;
        Ok(())
    }

    pub fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> Result<(), GpuError> {
        if let Some(f) = framebuffer {
            if !self.framebuffers.contains_key(&f) {
                return Err(GpuError::UnknownResource(f.into()));
            }
        }
        self.state.framebuffer = framebuffer;
        Ok(())
    }

    pub fn viewport(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
    }

    pub fn set_depth_test(&mut self, depth: Option<DepthFunc>) {
        self.state.raster.depth = depth;
    }

    pub fn set_cull_face(&mut self, cull: Option<CullFace>) {
        self.state.raster.cull = cull;
    }

    pub fn clear_color(&mut self, color: [f32; 4]) {
        self.state.clear_color = color;
    }

    // --- commands ---

    fn target(&self) -> Result<TargetDesc, GpuError> {
        let Some(id) = self.state.framebuffer else {
            return Ok(TargetDesc::SURFACE);
        };
        let fb = self
            .framebuffers
            .get(&id)
            .ok_or(GpuError::UnknownResource(id.into()))?;
        let (texture, layer) = fb.color.ok_or(GpuError::IncompleteFramebuffer(id))?;
        Ok(TargetDesc {
            color: ColorTarget::Texture { id: texture, layer },
            depth: fb.depth.map_or(DepthTarget::None, DepthTarget::Buffer),
        })
    }

    /// Clear colour and depth of the bound target.
    pub fn clear(&mut self) -> Result<(), GpuError> {
        let clear = Clear {
            target: self.target()?,
            color: self.state.clear_color,
            viewport: self.state.viewport,
        };
        self.backend.clear(&clear)
    }

    pub fn draw_arrays(&mut self, first: u32, count: u32) -> Result<(), GpuError> {
        let program = self.state.program.ok_or(GpuError::NothingBound("program"))?;
        let vertex_array = self
            .state
            .vertex_array
            .ok_or(GpuError::NothingBound("vertex array"))?;
        let available = self
            .vertex_arrays
            .get(&vertex_array)
            .copied()
            .ok_or(GpuError::UnknownResource(vertex_array.into()))?;
        let end = first.saturating_add(count);
        if end > available {
            return Err(GpuError::DrawRange {
                first,
                end,
                available,
            });
        }
        let state = self
            .programs
            .get(&program)
            .ok_or(GpuError::UnknownResource(program.into()))?;
        let textures = state
            .layout
            .textures
            .iter()
            .zip(&state.units)
            .map(|(slot, &unit)| BoundTexture {
                binding: slot.binding,
                kind: slot.kind,
                texture: self.state.units[unit as usize].get(slot.kind),
            })
            .collect();
        let call = DrawCall {
            target: self.target()?,
            viewport: self.state.viewport,
            raster: self.state.raster,
            program,
            vertex_array,
            first,
            count,
            uniforms: state.block.clone(),
            textures,
        };
        tracing::trace!(%program, %vertex_array, count, "draw");
        self.backend.draw(&call)
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.backend.surface_size()
    }

    pub fn flush(&mut self) -> Result<(), GpuError> {
        self.backend.flush()
    }

    /// Throw away unsubmitted work, e.g. after a pass failed halfway.
    pub fn discard(&mut self) {
        self.backend.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VertexStream;
    use crate::headless::{GpuCommand, HeadlessBackend};
    use crate::shader::UniformType;

    fn ctx() -> GpuContext<HeadlessBackend> {
        GpuContext::new(HeadlessBackend::new(320, 240))
    }

    fn triangle(ctx: &mut GpuContext<HeadlessBackend>) -> VertexArrayId {
        ctx.create_vertex_array(&VertexArrayDesc {
            streams: vec![VertexStream::new(0, 3, vec![0.0; 9])],
        })
        .unwrap()
    }

    fn cube(ctx: &mut GpuContext<HeadlessBackend>) -> TextureId {
        ctx.create_texture(TextureDesc {
            kind: TextureKind::Cube,
            width: 4,
            height: 4,
            mip_levels: 1,
        })
        .unwrap()
    }

    #[test]
    fn viewport_starts_at_surface_size() {
        let ctx = ctx();
        assert_eq!(ctx.bind_state().viewport, Viewport::sized(320, 240));
    }

    #[test]
    fn draw_without_bindings_fails() {
        let mut ctx = ctx();
        assert!(matches!(
            ctx.draw_arrays(0, 3),
            Err(GpuError::NothingBound("program"))
        ));
    }

    #[test]
    fn mismatched_streams_rejected() {
        let mut ctx = ctx();
        let err = ctx
            .create_vertex_array(&VertexArrayDesc {
                streams: vec![
                    VertexStream::new(0, 3, vec![0.0; 9]),
                    VertexStream::new(1, 2, vec![0.0; 4]),
                ],
            })
            .unwrap_err();
        assert!(matches!(
            err,
            GpuError::StreamLength {
                location: 1,
                expected: 3,
                found: 2
            }
        ));
    }

    #[test]
    fn bind_checks_target_kind() {
        let mut ctx = ctx();
        let tex = cube(&mut ctx);
        assert!(matches!(
            ctx.bind_texture(TextureKind::Plane, Some(tex)),
            Err(GpuError::TargetMismatch { .. })
        ));
        ctx.active_texture(3).unwrap();
        ctx.bind_texture(TextureKind::Cube, Some(tex)).unwrap();
        assert_eq!(ctx.bind_state().units[3].cube, Some(tex));
        assert!(ctx.active_texture(MAX_TEXTURE_UNITS).is_err());
    }

    #[test]
    fn framebuffer_target_resolution() {
        let mut ctx = ctx();
        let tex = cube(&mut ctx);
        let depth = ctx.create_depth_buffer(4, 4).unwrap();
        let fb = ctx.create_framebuffer();
        ctx.bind_framebuffer(Some(fb)).unwrap();
        assert!(matches!(ctx.clear(), Err(GpuError::IncompleteFramebuffer(_))));

        ctx.attach_color(fb, tex, 5).unwrap();
        ctx.attach_depth(fb, depth).unwrap();
        ctx.clear().unwrap();
        let last = ctx.backend().commands().last().cloned();
        match last {
            Some(GpuCommand::Clear(clear)) => {
                assert_eq!(clear.target.color, ColorTarget::Texture { id: tex, layer: 5 });
                assert_eq!(clear.target.depth, DepthTarget::Buffer(depth));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(ctx.attach_color(fb, tex, 6).is_err());
    }

    #[test]
    fn release_unbinds_and_forgets() {
        let mut ctx = ctx();
        let tex = cube(&mut ctx);
        let vao = triangle(&mut ctx);
        ctx.bind_texture(TextureKind::Cube, Some(tex)).unwrap();
        ctx.bind_vertex_array(Some(vao)).unwrap();

        ctx.release(tex).unwrap();
        ctx.release(vao).unwrap();
        assert_eq!(ctx.bind_state().units[0].cube, None);
        assert_eq!(ctx.bind_state().vertex_array, None);
        assert!(matches!(ctx.release(tex), Err(GpuError::UnknownResource(_))));
        assert!(ctx.backend().live().is_empty());
    }

    #[test]
    fn release_all_empties_context() {
        let mut ctx = ctx();
        cube(&mut ctx);
        triangle(&mut ctx);
        ctx.create_depth_buffer(8, 8).unwrap();
        ctx.create_framebuffer();
        assert_eq!(ctx.release_all(), 4);
        assert!(ctx.live_resources().is_empty());
        assert!(ctx.backend().live().is_empty());
        assert_eq!(ctx.release_all(), 0);
    }

    #[test]
    fn upload_size_checked() {
        let mut ctx = ctx();
        let tex = cube(&mut ctx);
        let pixels = vec![0u8; 4 * 4 * 4];
        let write = TextureWrite {
            layer: 2,
            mip: 0,
            width: 4,
            height: 4,
            rgba: &pixels,
        };
        ctx.write_texture(tex, &write).unwrap();
        let short = TextureWrite {
            rgba: &pixels[..10],
            ..write
        };
        assert!(matches!(ctx.write_texture(tex, &short), Err(GpuError::BadUpload(_))));
    }

    #[test]
    fn uniform_type_checked() {
        let mut ctx = ctx();
        let loc = UniformLocation::Member {
            offset: 0,
            ty: UniformType::Mat4,
        };
        assert!(matches!(
            ctx.set_uniform(loc, 1.0f32),
            Err(GpuError::NothingBound("program"))
        ));
    }
}
