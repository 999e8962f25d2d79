use crate::error::StudioError;
use crate::module::{Render, StudioFrame};
use crate::shaders;
use crate::studio::Studio;
use glam::{Mat4, Vec3};
use kiln_gpu::{
    GpuBackend, GpuContext, GpuError, ProgramSpec, ShaderError, ShaderProgram, Texture,
    TextureId, TextureKind, UniformLocation, VertexArrayDesc, VertexArrayId, VertexStream,
};
use kiln_scene::{Camera, ObjDocument};
use std::sync::Arc;

const PLANE_UNIT: u32 = 0;
const CUBE_UNIT: u32 = 1;
const NORMAL_MAP_UNIT: u32 = 2;

const MODE_UNTEXTURED: i32 = 1;
const MODE_PLANE: i32 = 2;
const MODE_CUBE: i32 = 3;

/// Phong lighting parameters shared by every item of a [`LitModule`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lighting {
    pub color: Vec3,
    pub position: Vec3,
    pub ka: f32,
    pub kd: f32,
    pub ks: f32,
    pub shininess: f32,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            position: Vec3::new(0.0, 0.8, 0.1),
            ka: 0.2,
            kd: 0.7,
            ks: 1.0,
            shininess: 20.0,
        }
    }
}

/// Index of an item within its [`LitModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(pub usize);

/// One drawable object: its vertex arrays plus per-item material state.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    /// Each array with its vertex count.
    pub vertex_arrays: Vec<(VertexArrayId, u32)>,
    pub model: Mat4,
    pub color: Vec3,
    pub texture: Option<Texture>,
    pub cube: Option<Texture>,
    pub normal_map: Option<Texture>,
    pub skip: bool,
}

impl RenderItem {
    pub fn new(vertex_arrays: Vec<(VertexArrayId, u32)>) -> Self {
        Self {
            vertex_arrays,
            model: Mat4::IDENTITY,
            color: Vec3::ONE,
            texture: None,
            cube: None,
            normal_map: None,
            skip: false,
        }
    }

    /// Shading mode the lit program is driven with.
    fn mode(&self, render_textures: bool) -> i32 {
        match (render_textures, self.texture, self.cube) {
            (true, Some(_), _) => MODE_PLANE,
            (true, None, Some(_)) => MODE_CUBE,
            _ => MODE_UNTEXTURED,
        }
    }
}

#[derive(Debug)]
struct LitBindings {
    position: u32,
    normal: u32,
    texcoord: u32,
    mvp: UniformLocation,
    model: UniformLocation,
    normal_matrix: UniformLocation,
    light_color: UniformLocation,
    light_position: UniformLocation,
    view_position: UniformLocation,
    ka: UniformLocation,
    kd: UniformLocation,
    ks: UniformLocation,
    color: UniformLocation,
    shininess: UniformLocation,
    mode: UniformLocation,
    plane_texture: UniformLocation,
    cube_texture: UniformLocation,
    normal_map: UniformLocation,
    use_normal_map: UniformLocation,
}

impl LitBindings {
    fn resolve(program: &ShaderProgram) -> Result<Self, ShaderError> {
        Ok(Self {
            position: program.attribute("position")?,
            normal: program.attribute("normal")?,
            texcoord: program.attribute("texcoord")?,
            mvp: program.uniform("mvp")?,
            model: program.uniform("model")?,
            normal_matrix: program.uniform("normal_matrix")?,
            light_color: program.uniform("light_color")?,
            light_position: program.uniform("light_position")?,
            view_position: program.uniform("view_position")?,
            ka: program.uniform("ka")?,
            kd: program.uniform("kd")?,
            ks: program.uniform("ks")?,
            color: program.uniform("color")?,
            shininess: program.uniform("shininess")?,
            mode: program.uniform("mode")?,
            plane_texture: program.uniform("plane_texture")?,
            cube_texture: program.uniform("cube_texture")?,
            normal_map: program.uniform("normal_map")?,
            use_normal_map: program.uniform("use_normal_map")?,
        })
    }
}

fn lit_spec() -> ProgramSpec {
    ProgramSpec::new(
        &["position", "normal", "texcoord"],
        &[
            "mvp",
            "model",
            "normal_matrix",
            "light_color",
            "light_position",
            "view_position",
            "ka",
            "kd",
            "ks",
            "color",
            "shininess",
            "mode",
            "plane_texture",
            "cube_texture",
            "normal_map",
            "use_normal_map",
        ],
    )
}

/// Phong-shaded meshes, optionally textured, reflective or normal mapped.
#[derive(Debug)]
pub struct LitModule {
    program: Arc<ShaderProgram>,
    bindings: LitBindings,
    pub items: Vec<RenderItem>,
    pub render_textures: bool,
    pub light: Lighting,
}

impl LitModule {
    /// Build the module, sharing the studio's `"lit"` program if one exists.
    pub fn create<B: GpuBackend>(studio: &mut Studio<B>) -> Result<Self, StudioError> {
        let program =
            studio.program_or_create("lit", [shaders::LIT_VERTEX, shaders::LIT_FRAGMENT], &lit_spec())?;
        let bindings = LitBindings::resolve(&program)?;
        tracing::debug!(program = %program.id(), "lit module created");
        Ok(Self {
            program,
            bindings,
            items: Vec::new(),
            render_textures: true,
            light: Lighting::default(),
        })
    }

    /// Upload every geometry of `doc` and append them as one item.
    pub fn add<B: GpuBackend>(&mut self, ctx: &mut GpuContext<B>, doc: &ObjDocument) -> Result<ItemId, GpuError> {
        let mut vertex_arrays = Vec::with_capacity(doc.geometries.len());
        for geometry in &doc.geometries {
            let count = geometry.vertex_count();
            // A skipped face index leaves a trailing partial triangle.
            let drawn = count / 3 * 3;
            if drawn != count {
                tracing::warn!(object = %geometry.object, dropped = count - drawn, "dropping partial triangle");
            }
            if drawn == 0 {
                continue;
            }
            let normals = match geometry.normals() {
                Some(n) if n.len() == count * 3 => n[..drawn * 3].to_vec(),
                _ => {
                    tracing::debug!(object = %geometry.object, "synthesizing flat normals");
                    geometry.flat_normals()
                }
            };
            let mut streams = vec![
                VertexStream::new(self.bindings.position, 3, geometry.positions()[..drawn * 3].to_vec()),
                VertexStream::new(self.bindings.normal, 3, normals),
            ];
            match geometry.texcoords() {
                Some(t) if t.len() == count * 2 => {
                    streams.push(VertexStream::new(self.bindings.texcoord, 2, t[..drawn * 2].to_vec()));
                }
                Some(_) => {
                    tracing::debug!(object = %geometry.object, "texcoord count differs from vertex count, skipping");
                }
                None => {}
            }
            let id = ctx.create_vertex_array(&VertexArrayDesc { streams })?;
            vertex_arrays.push((id, drawn as u32));
        }
        let id = ItemId(self.items.len());
        tracing::debug!(item = id.0, arrays = vertex_arrays.len(), "lit item added");
        self.items.push(RenderItem::new(vertex_arrays));
        Ok(id)
    }

    pub fn item(&self, id: ItemId) -> Option<&RenderItem> {
        self.items.get(id.0)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut RenderItem> {
        self.items.get_mut(id.0)
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    /// Point every item slot holding `old` at `new`. Returns how many changed.
    pub(crate) fn retarget_texture(&mut self, old: TextureId, new: Texture) -> usize {
        let mut changed = 0;
        for item in &mut self.items {
            for slot in [&mut item.texture, &mut item.cube, &mut item.normal_map] {
                if slot.is_some_and(|t| t.id == old) {
                    *slot = Some(new);
                    changed += 1;
                }
            }
        }
        changed
    }
}

impl Render for LitModule {
    fn render<B: GpuBackend>(&self, camera: &Camera, frame: &mut StudioFrame<'_, B>) -> Result<(), GpuError> {
        let ctx = &mut *frame.ctx;
        let b = &self.bindings;
        self.program.use_program(ctx)?;

        ctx.set_uniform(b.light_color, self.light.color)?;
        ctx.set_uniform(b.light_position, self.light.position)?;
        ctx.set_uniform(b.view_position, camera.position)?;
        ctx.set_uniform(b.ka, self.light.ka)?;
        ctx.set_uniform(b.kd, self.light.kd)?;
        ctx.set_uniform(b.ks, self.light.ks)?;
        ctx.set_uniform(b.shininess, self.light.shininess)?;

        let vp = camera.view_projection();
        for item in self.items.iter().filter(|i| !i.skip) {
            let mvp = vp * item.model;
            let normal_matrix = item.model.inverse().transpose();

            ctx.set_uniform(b.color, item.color)?;
            ctx.set_uniform(b.mvp, mvp)?;
            ctx.set_uniform(b.model, item.model)?;
            ctx.set_uniform(b.normal_matrix, normal_matrix)?;

            ctx.set_uniform(b.plane_texture, PLANE_UNIT as i32)?;
            ctx.set_uniform(b.cube_texture, CUBE_UNIT as i32)?;
            let mode = item.mode(self.render_textures);
            ctx.set_uniform(b.mode, mode)?;
            match (mode, item.texture, item.cube) {
                (MODE_PLANE, Some(tex), _) => {
                    tex.activate(ctx, PLANE_UNIT)?;
                    tex.bind(ctx)?;
                }
                (MODE_CUBE, _, Some(cube)) => {
                    cube.activate(ctx, CUBE_UNIT)?;
                    cube.bind(ctx)?;
                }
                _ => {}
            }

            ctx.set_uniform(b.normal_map, NORMAL_MAP_UNIT as i32)?;
            match item.normal_map {
                Some(map) => {
                    ctx.set_uniform(b.use_normal_map, 1i32)?;
                    map.activate(ctx, NORMAL_MAP_UNIT)?;
                    map.bind(ctx)?;
                }
                None => ctx.set_uniform(b.use_normal_map, 0i32)?,
            }

            for &(vao, count) in &item.vertex_arrays {
                ctx.bind_vertex_array(Some(vao))?;
                ctx.draw_arrays(0, count)?;
            }
        }

        for unit in [NORMAL_MAP_UNIT, CUBE_UNIT, PLANE_UNIT] {
            ctx.active_texture(unit)?;
            ctx.bind_texture(TextureKind::Cube, None)?;
            ctx.bind_texture(TextureKind::Plane, None)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tex(kind: TextureKind) -> Texture {
        Texture {
            id: kiln_gpu::TextureId(1),
            kind,
            width: 1,
            height: 1,
            mip_levels: 1,
        }
    }

    #[test]
    fn default_lighting() {
        let light = Lighting::default();
        assert_eq!(light.position, Vec3::new(0.0, 0.8, 0.1));
        assert_eq!((light.ka, light.kd, light.ks, light.shininess), (0.2, 0.7, 1.0, 20.0));
    }

    #[test]
    fn plane_texture_takes_precedence() {
        let mut item = RenderItem::new(Vec::new());
        assert_eq!(item.mode(true), MODE_UNTEXTURED);
        item.cube = Some(tex(TextureKind::Cube));
        assert_eq!(item.mode(true), MODE_CUBE);
        item.texture = Some(tex(TextureKind::Plane));
        assert_eq!(item.mode(true), MODE_PLANE);
        assert_eq!(item.mode(false), MODE_UNTEXTURED);
    }
}
