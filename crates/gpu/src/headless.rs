//! Recording backend with no GPU behind it.

use crate::backend::{Clear, DrawCall, GpuBackend, TextureDesc, TextureWrite, VertexArrayDesc};
use crate::error::GpuError;
use crate::resource::{DepthBufferId, ProgramId, ResourceId, TextureId, VertexArrayId};
use crate::shader::ProgramLayout;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One call received by a [`HeadlessBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateProgram(ProgramId),
    CreateTexture(TextureId, TextureDesc),
    WriteTexture { id: TextureId, layer: u32, mip: u32 },
    CreateVertexArray { id: VertexArrayId, vertex_count: usize },
    CreateDepthBuffer { id: DepthBufferId, width: u32, height: u32 },
    Release(ResourceId),
    Clear(Clear),
    Draw(DrawCall),
    Flush,
    Discard,
}

/// Backend that records commands instead of executing them.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    size: (u32, u32),
    commands: Vec<GpuCommand>,
    live: BTreeSet<ResourceId>,
    fail_allocations: bool,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> {
        self.commands.iter().filter_map(|c| match c {
            GpuCommand::Draw(d) => Some(d),
            _ => None,
        })
    }

    pub fn clears(&self) -> impl Iterator<Item = &Clear> {
        self.commands.iter().filter_map(|c| match c {
            GpuCommand::Clear(c) => Some(c),
            _ => None,
        })
    }

    /// Objects created and not yet released.
    pub fn live(&self) -> &BTreeSet<ResourceId> {
        &self.live
    }

    /// Make every following allocation fail with `ResourceCreation`.
    pub fn fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    pub fn set_surface_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn allocate(&mut self, what: &'static str, id: ResourceId, command: GpuCommand) -> Result<(), GpuError> {
        if self.fail_allocations {
            return Err(GpuError::ResourceCreation {
                what,
                reason: "allocation refused by headless backend".into(),
            });
        }
        self.live.insert(id);
        self.commands.push(command);
        Ok(())
    }
}

impl GpuBackend for HeadlessBackend {
    fn create_program(&mut self, id: ProgramId, _layout: Arc<ProgramLayout>) -> Result<(), GpuError> {
        self.allocate("program", id.into(), GpuCommand::CreateProgram(id))
    }

    fn create_texture(&mut self, id: TextureId, desc: &TextureDesc) -> Result<(), GpuError> {
        self.allocate("texture", id.into(), GpuCommand::CreateTexture(id, *desc))
    }

    fn write_texture(&mut self, id: TextureId, write: &TextureWrite<'_>) -> Result<(), GpuError> {
        self.commands.push(GpuCommand::WriteTexture {
            id,
            layer: write.layer,
            mip: write.mip,
        });
        Ok(())
    }

    fn create_vertex_array(&mut self, id: VertexArrayId, desc: &VertexArrayDesc) -> Result<(), GpuError> {
        let vertex_count = desc.streams.first().map_or(0, |s| s.vertex_count());
        self.allocate(
            "vertex array",
            id.into(),
            GpuCommand::CreateVertexArray { id, vertex_count },
        )
    }

    fn create_depth_buffer(&mut self, id: DepthBufferId, width: u32, height: u32) -> Result<(), GpuError> {
        self.allocate(
            "depth buffer",
            id.into(),
            GpuCommand::CreateDepthBuffer { id, width, height },
        )
    }

    fn release(&mut self, id: ResourceId) {
        self.live.remove(&id);
        self.commands.push(GpuCommand::Release(id));
    }

    fn clear(&mut self, clear: &Clear) -> Result<(), GpuError> {
        self.commands.push(GpuCommand::Clear(*clear));
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), GpuError> {
        self.commands.push(GpuCommand::Draw(call.clone()));
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn flush(&mut self) -> Result<(), GpuError> {
        self.commands.push(GpuCommand::Flush);
        Ok(())
    }

    fn discard(&mut self) {
        self.commands.push(GpuCommand::Discard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TextureKind;
    use crate::context::GpuContext;

    #[test]
    fn refused_allocation_leaves_context_clean() {
        let mut backend = HeadlessBackend::new(16, 16);
        backend.fail_allocations(true);
        let mut ctx = GpuContext::new(backend);
        let err = ctx
            .create_texture(TextureDesc {
                kind: TextureKind::Plane,
                width: 2,
                height: 2,
                mip_levels: 1,
            })
            .unwrap_err();
        assert!(matches!(err, GpuError::ResourceCreation { what: "texture", .. }));
        assert!(ctx.live_resources().is_empty());
        assert!(ctx.backend().commands().is_empty());
    }

    #[test]
    fn take_commands_drains() {
        let mut backend = HeadlessBackend::new(16, 16);
        backend.flush().unwrap();
        assert_eq!(backend.take_commands(), vec![GpuCommand::Flush]);
        assert!(backend.commands().is_empty());
    }
}
