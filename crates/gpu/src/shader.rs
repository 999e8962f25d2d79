//! WGSL programs: compile, link and binding lookup.
//!
//! Both stages are parsed and validated with naga, then reflected into a
//! [`ProgramLayout`] the backends build pipelines from. The resource layout is
//! fixed: one uniform block at `@group(0) @binding(0)`, textures and samplers
//! in `@group(1)`.

use crate::backend::{GpuBackend, TextureKind};
use crate::context::GpuContext;
use crate::error::GpuError;
use crate::resource::ProgramId;
use glam::{Mat4, Vec2, Vec3, Vec4};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, ImageDimension, Module, ScalarKind, TypeInner};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    fn naga(self) -> naga::ShaderStage {
        match self {
            Self::Vertex => naga::ShaderStage::Vertex,
            Self::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Attribute,
    Uniform,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Attribute => "attribute",
            Self::Uniform => "uniform",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("{stage} shader failed to compile:\n{diagnostic}")]
    Compile { stage: Stage, diagnostic: String },

    #[error("program failed to link: {diagnostic}")]
    Link { diagnostic: String },

    #[error("{kind} `{name}` not found in program")]
    BindingLookup { kind: BindingKind, name: String },

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

fn link_error(diagnostic: impl Into<String>) -> ShaderError {
    ShaderError::Link {
        diagnostic: diagnostic.into(),
    }
}

/// Types a uniform block member may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    F32,
    I32,
    U32,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformType {
    pub fn size(self) -> usize {
        match self {
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
            Self::Mat4 => 64,
        }
    }

    fn from_naga(inner: &TypeInner) -> Option<Self> {
        use naga::VectorSize::{Bi, Quad, Tri};
        match *inner {
            TypeInner::Scalar(s) if s.width == 4 => match s.kind {
                ScalarKind::Float => Some(Self::F32),
                ScalarKind::Sint => Some(Self::I32),
                ScalarKind::Uint => Some(Self::U32),
                _ => None,
            },
            TypeInner::Vector { size, scalar } if scalar == naga::Scalar::F32 => match size {
                Bi => Some(Self::Vec2),
                Tri => Some(Self::Vec3),
                Quad => Some(Self::Vec4),
            },
            TypeInner::Matrix {
                columns: Quad,
                rows: Quad,
                scalar,
            } if scalar == naga::Scalar::F32 => Some(Self::Mat4),
            _ => None,
        }
    }
}

/// Value written into a program's uniform storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    F32(f32),
    I32(i32),
    U32(u32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn ty(&self) -> UniformType {
        match self {
            Self::F32(_) => UniformType::F32,
            Self::I32(_) => UniformType::I32,
            Self::U32(_) => UniformType::U32,
            Self::Vec2(_) => UniformType::Vec2,
            Self::Vec3(_) => UniformType::Vec3,
            Self::Vec4(_) => UniformType::Vec4,
            Self::Mat4(_) => UniformType::Mat4,
        }
    }

    /// Little-endian bytes as laid out in a WGSL uniform block.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::F32(v) => v.to_le_bytes().to_vec(),
            Self::I32(v) => v.to_le_bytes().to_vec(),
            Self::U32(v) => v.to_le_bytes().to_vec(),
            Self::Vec2(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            Self::Vec3(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            Self::Vec4(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            Self::Mat4(m) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(m: Mat4) -> Self {
        Self::Mat4(m)
    }
}

/// Where a named uniform lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformLocation {
    /// Member of the uniform block.
    Member { offset: u32, ty: UniformType },
    /// Texture binding; its value is the texture unit it samples.
    Sampler { slot: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEntry {
    pub source: String,
    pub entry_point: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub location: u32,
    pub components: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformMember {
    pub name: String,
    pub offset: u32,
    pub ty: UniformType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlock {
    /// Padded to a multiple of 16 bytes.
    pub size: u32,
    pub members: Vec<UniformMember>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSlot {
    pub name: String,
    pub binding: u32,
    pub kind: TextureKind,
}

/// Reflected interface of a linked vertex/fragment pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramLayout {
    pub vertex: StageEntry,
    pub fragment: StageEntry,
    pub attributes: Vec<Attribute>,
    pub block: Option<UniformBlock>,
    /// Bindings in `@group(1)`, ordered by binding.
    pub textures: Vec<TextureSlot>,
    pub samplers: Vec<u32>,
}

impl ProgramLayout {
    /// Compile both stages and check they form a usable program.
    pub fn link(sources: [&str; 2]) -> Result<Self, ShaderError> {
        let [vs_src, fs_src] = sources;
        let vs = Reflected::compile(Stage::Vertex, vs_src)?;
        let fs = Reflected::compile(Stage::Fragment, fs_src)?;

        let mut attributes = Vec::with_capacity(vs.inputs.len());
        for input in &vs.inputs {
            let Some(components) = input.float_components else {
                return Err(link_error(format!(
                    "vertex input `{}` must be an f32 scalar or vector",
                    input.name
                )));
            };
            attributes.push(Attribute {
                name: input.name.clone(),
                location: input.location,
                components,
            });
        }

        for input in &fs.inputs {
            let produced = vs.outputs.iter().find(|o| o.location == input.location);
            match produced {
                Some(out) if out.shape == input.shape => {}
                Some(_) => {
                    return Err(link_error(format!(
                        "fragment input `{}` at location {} does not match the vertex output's type",
                        input.name, input.location
                    )));
                }
                None => {
                    return Err(link_error(format!(
                        "fragment input `{}` at location {} is not written by the vertex stage",
                        input.name, input.location
                    )));
                }
            }
        }

        let block = match (vs.block, fs.block) {
            (Some(a), Some(b)) if a != b => {
                return Err(link_error(
                    "uniform block differs between the vertex and fragment stages",
                ));
            }
            (a, b) => a.or(b),
        };

        let mut textures: BTreeMap<u32, TextureSlot> = BTreeMap::new();
        for slot in vs.textures.into_iter().chain(fs.textures) {
            if let Some(existing) = textures.get(&slot.binding).filter(|e| **e != slot) {
                return Err(link_error(format!(
                    "texture binding {} declared as both `{}` and `{}`",
                    slot.binding, existing.name, slot.name
                )));
            }
            textures.insert(slot.binding, slot);
        }
        let mut samplers: Vec<u32> = vs.samplers.into_iter().chain(fs.samplers).collect();
        samplers.sort_unstable();
        samplers.dedup();
        if let Some(clash) = samplers.iter().find(|b| textures.contains_key(*b)) {
            return Err(link_error(format!(
                "@group(1) @binding({clash}) is both a texture and a sampler"
            )));
        }

        Ok(Self {
            vertex: StageEntry {
                source: vs_src.to_string(),
                entry_point: vs.entry_point,
            },
            fragment: StageEntry {
                source: fs_src.to_string(),
                entry_point: fs.entry_point,
            },
            attributes,
            block,
            textures: textures.into_values().collect(),
            samplers,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        if let Some(member) = self
            .block
            .as_ref()
            .and_then(|b| b.members.iter().find(|m| m.name == name))
        {
            return Some(UniformLocation::Member {
                offset: member.offset,
                ty: member.ty,
            });
        }
        self.textures
            .iter()
            .position(|t| t.name == name)
            .map(|slot| UniformLocation::Sampler { slot })
    }

    pub fn block_size(&self) -> u32 {
        self.block.as_ref().map_or(0, |b| b.size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Io {
    name: String,
    location: u32,
    /// Scalar kind and component count; `None` for anything else.
    shape: Option<(ScalarKind, u32)>,
    float_components: Option<u32>,
}

/// Interface of one compiled stage.
struct Reflected {
    entry_point: String,
    inputs: Vec<Io>,
    outputs: Vec<Io>,
    block: Option<UniformBlock>,
    textures: Vec<TextureSlot>,
    samplers: Vec<u32>,
}

impl Reflected {
    fn compile(stage: Stage, source: &str) -> Result<Self, ShaderError> {
        let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::Compile {
            stage,
            diagnostic: e.emit_to_string(source),
        })?;
        Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|e| ShaderError::Compile {
                stage,
                diagnostic: e.emit_to_string(source),
            })?;

        let mut entries = module
            .entry_points
            .iter()
            .filter(|ep| ep.stage == stage.naga());
        let (Some(entry), None) = (entries.next(), entries.next()) else {
            return Err(ShaderError::Compile {
                stage,
                diagnostic: format!("source must declare exactly one @{stage} entry point"),
            });
        };

        let mut inputs = Vec::new();
        for arg in &entry.function.arguments {
            collect_io(&module, arg.name.as_deref(), arg.ty, arg.binding.as_ref(), &mut inputs);
        }
        let mut outputs = Vec::new();
        if let Some(result) = &entry.function.result {
            collect_io(&module, None, result.ty, result.binding.as_ref(), &mut outputs);
        }

        let mut reflected = Self {
            entry_point: entry.name.clone(),
            inputs,
            outputs,
            block: None,
            textures: Vec::new(),
            samplers: Vec::new(),
        };
        reflected.collect_resources(&module)?;
        Ok(reflected)
    }

    fn collect_resources(&mut self, module: &Module) -> Result<(), ShaderError> {
        for (_, var) in module.global_variables.iter() {
            let Some(rb) = &var.binding else {
                continue;
            };
            let name = var.name.clone().unwrap_or_default();
            let inner = &module.types[var.ty].inner;
            match var.space {
                AddressSpace::Uniform => {
                    if (rb.group, rb.binding) != (0, 0) {
                        return Err(link_error(format!(
                            "uniform `{name}` must be declared at @group(0) @binding(0)"
                        )));
                    }
                    self.block = Some(reflect_block(module, &name, inner)?);
                }
                AddressSpace::Handle => {
                    if rb.group != 1 {
                        return Err(link_error(format!(
                            "texture or sampler `{name}` must be declared in @group(1)"
                        )));
                    }
                    match *inner {
                        TypeInner::Image {
                            dim,
                            arrayed: false,
                            ..
                        } => {
                            let kind = match dim {
                                ImageDimension::D2 => TextureKind::Plane,
                                ImageDimension::Cube => TextureKind::Cube,
                                _ => {
                                    return Err(link_error(format!(
                                        "texture `{name}` must be texture_2d or texture_cube"
                                    )));
                                }
                            };
                            self.textures.push(TextureSlot {
                                name,
                                binding: rb.binding,
                                kind,
                            });
                        }
                        TypeInner::Sampler { comparison: false } => self.samplers.push(rb.binding),
                        _ => {
                            return Err(link_error(format!(
                                "unsupported resource type for `{name}`"
                            )));
                        }
                    }
                }
                _ => {
                    return Err(link_error(format!(
                        "`{name}` uses an unsupported address space"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn collect_io(
    module: &Module,
    name: Option<&str>,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    out: &mut Vec<Io>,
) {
    let inner = &module.types[ty].inner;
    match binding {
        Some(Binding::Location { location, .. }) => {
            let shape = match *inner {
                TypeInner::Scalar(s) => Some((s.kind, 1)),
                TypeInner::Vector { size, scalar } => Some((scalar.kind, size as u32)),
                _ => None,
            };
            let float_components = match *inner {
                TypeInner::Scalar(s) if s == naga::Scalar::F32 => Some(1),
                TypeInner::Vector { size, scalar } if scalar == naga::Scalar::F32 => {
                    Some(size as u32)
                }
                _ => None,
            };
            out.push(Io {
                name: name.unwrap_or_default().to_string(),
                location: *location,
                shape,
                float_components,
            });
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = inner {
                for member in members {
                    collect_io(
                        module,
                        member.name.as_deref(),
                        member.ty,
                        member.binding.as_ref(),
                        out,
                    );
                }
            }
        }
    }
}

fn reflect_block(module: &Module, name: &str, inner: &TypeInner) -> Result<UniformBlock, ShaderError> {
    let unsupported = |member: &str| {
        link_error(format!(
            "uniform `{member}` must be f32, i32, u32, vec2/3/4<f32> or mat4x4<f32>"
        ))
    };
    let (members, span) = match inner {
        TypeInner::Struct { members, span } => {
            let mut out = Vec::with_capacity(members.len());
            for m in members {
                let member_name = m.name.clone().unwrap_or_default();
                let ty = UniformType::from_naga(&module.types[m.ty].inner)
                    .ok_or_else(|| unsupported(&member_name))?;
                out.push(UniformMember {
                    name: member_name,
                    offset: m.offset,
                    ty,
                });
            }
            (out, *span)
        }
        // A bare `var<uniform> x: T` is a block with one member named after the variable.
        other => {
            let ty = UniformType::from_naga(other).ok_or_else(|| unsupported(name))?;
            let member = UniformMember {
                name: name.to_string(),
                offset: 0,
                ty,
            };
            (vec![member], ty.size() as u32)
        }
    };
    Ok(UniformBlock {
        size: span.next_multiple_of(16),
        members,
    })
}

/// Names a program must expose; every one is checked at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramSpec {
    pub attributes: Vec<String>,
    pub uniforms: Vec<String>,
}

impl ProgramSpec {
    pub fn new(attributes: &[&str], uniforms: &[&str]) -> Self {
        Self {
            attributes: attributes.iter().map(|s| s.to_string()).collect(),
            uniforms: uniforms.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A linked program whose requested bindings are all known to exist.
#[derive(Debug)]
pub struct ShaderProgram {
    id: ProgramId,
    layout: Arc<ProgramLayout>,
    attributes: BTreeMap<String, u32>,
    uniforms: BTreeMap<String, UniformLocation>,
}

impl ShaderProgram {
    /// Compile, link and resolve every name in `spec`. The backend object is
    /// created only once all lookups have succeeded.
    pub fn create<B: GpuBackend>(
        ctx: &mut GpuContext<B>,
        sources: [&str; 2],
        spec: &ProgramSpec,
    ) -> Result<Self, ShaderError> {
        let layout = ProgramLayout::link(sources)?;

        let attributes = spec
            .attributes
            .iter()
            .map(|name| match layout.attribute(name) {
                Some(a) => Ok((name.clone(), a.location)),
                None => Err(ShaderError::BindingLookup {
                    kind: BindingKind::Attribute,
                    name: name.clone(),
                }),
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        let uniforms = spec
            .uniforms
            .iter()
            .map(|name| match layout.uniform(name) {
                Some(loc) => Ok((name.clone(), loc)),
                None => Err(ShaderError::BindingLookup {
                    kind: BindingKind::Uniform,
                    name: name.clone(),
                }),
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let layout = Arc::new(layout);
        let id = ctx.create_program(Arc::clone(&layout))?;
        tracing::debug!(
            %id,
            attributes = attributes.len(),
            uniforms = uniforms.len(),
            "shader program linked"
        );
        Ok(Self {
            id,
            layout,
            attributes,
            uniforms,
        })
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn layout(&self) -> &ProgramLayout {
        &self.layout
    }

    pub fn use_program<B: GpuBackend>(&self, ctx: &mut GpuContext<B>) -> Result<(), GpuError> {
        ctx.use_program(Some(self.id))
    }

    pub fn attribute(&self, name: &str) -> Result<u32, ShaderError> {
        self.attributes
            .get(name)
            .copied()
            .ok_or_else(|| ShaderError::BindingLookup {
                kind: BindingKind::Attribute,
                name: name.to_string(),
            })
    }

    pub fn uniform(&self, name: &str) -> Result<UniformLocation, ShaderError> {
        self.uniforms
            .get(name)
            .copied()
            .ok_or_else(|| ShaderError::BindingLookup {
                kind: BindingKind::Uniform,
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{GpuCommand, HeadlessBackend};

    const VS: &str = r#"
struct Globals {
    mvp: mat4x4<f32>,
    tint: vec3<f32>,
    strength: f32,
}
@group(0) @binding(0) var<uniform> globals: Globals;

struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) texcoord: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.clip = globals.mvp * vec4<f32>(position, 1.0);
    out.uv = texcoord;
    return out;
}
"#;

    const FS: &str = r#"
struct Globals {
    mvp: mat4x4<f32>,
    tint: vec3<f32>,
    strength: f32,
}
@group(0) @binding(0) var<uniform> globals: Globals;
@group(1) @binding(0) var image: texture_2d<f32>;
@group(1) @binding(1) var image_sampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let c = textureSample(image, image_sampler, uv);
    return vec4<f32>(c.rgb * globals.tint * globals.strength, 1.0);
}
"#;

    fn ctx() -> GpuContext<HeadlessBackend> {
        GpuContext::new(HeadlessBackend::new(64, 64))
    }

    #[test]
    fn reflects_layout() {
        let layout = ProgramLayout::link([VS, FS]).unwrap();
        assert_eq!(layout.vertex.entry_point, "vs_main");
        assert_eq!(layout.attribute("texcoord").unwrap().components, 2);
        let block = layout.block.as_ref().unwrap();
        assert_eq!(block.size, 80);
        assert_eq!(
            layout.uniform("tint"),
            Some(UniformLocation::Member {
                offset: 64,
                ty: UniformType::Vec3
            })
        );
        assert_eq!(
            layout.uniform("strength"),
            Some(UniformLocation::Member {
                offset: 76,
                ty: UniformType::F32
            })
        );
        assert_eq!(layout.uniform("image"), Some(UniformLocation::Sampler { slot: 0 }));
        assert_eq!(layout.samplers, vec![1]);
    }

    #[test]
    fn creates_with_all_lookups() {
        let mut ctx = ctx();
        let spec = ProgramSpec::new(&["position", "texcoord"], &["mvp", "image"]);
        let program = ShaderProgram::create(&mut ctx, [VS, FS], &spec).unwrap();
        assert_eq!(program.attribute("texcoord").unwrap(), 1);
        assert!(matches!(
            program.uniform("mvp").unwrap(),
            UniformLocation::Member { offset: 0, .. }
        ));
        // Only requested names are resolved.
        assert!(program.uniform("tint").is_err());
    }

    #[test]
    fn missing_attribute_creates_nothing() {
        let mut ctx = ctx();
        let spec = ProgramSpec::new(&["position", "normal"], &[]);
        let err = ShaderProgram::create(&mut ctx, [VS, FS], &spec).unwrap_err();
        match err {
            ShaderError::BindingLookup { kind, name } => {
                assert_eq!(kind, BindingKind::Attribute);
                assert_eq!(name, "normal");
            }
            other => panic!("unexpected {other}"),
        }
        assert!(ctx.live_resources().is_empty());
        assert!(!ctx
            .backend()
            .commands()
            .iter()
            .any(|c| matches!(c, GpuCommand::CreateProgram(_))));
    }

    #[test]
    fn missing_uniform_is_reported() {
        let mut ctx = ctx();
        let spec = ProgramSpec::new(&[], &["u_light"]);
        let err = ShaderProgram::create(&mut ctx, [VS, FS], &spec).unwrap_err();
        assert!(matches!(
            err,
            ShaderError::BindingLookup {
                kind: BindingKind::Uniform,
                ..
            }
        ));
    }

    #[test]
    fn compile_error_has_diagnostic() {
        let err = ProgramLayout::link(["fn broken( {", FS]).unwrap_err();
        match err {
            ShaderError::Compile { stage, diagnostic } => {
                assert_eq!(stage, Stage::Vertex);
                assert!(!diagnostic.is_empty());
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn wrong_stage_is_a_compile_error() {
        let err = ProgramLayout::link([FS, FS]).unwrap_err();
        assert!(matches!(
            err,
            ShaderError::Compile {
                stage: Stage::Vertex,
                ..
            }
        ));
    }

    #[test]
    fn unmatched_varying_fails_link() {
        let fs = r#"
@fragment
fn fs_main(@location(3) shade: f32) -> @location(0) vec4<f32> {
    return vec4<f32>(shade);
}
"#;
        let err = ProgramLayout::link([VS, fs]).unwrap_err();
        match err {
            ShaderError::Link { diagnostic } => assert!(diagnostic.contains("shade")),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn uniform_outside_group_zero_fails_link() {
        let vs = r#"
@group(2) @binding(0) var<uniform> mvp: mat4x4<f32>;
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return mvp * vec4<f32>(position, 1.0);
}
"#;
        let fs = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
"#;
        assert!(matches!(
            ProgramLayout::link([vs, fs]),
            Err(ShaderError::Link { .. })
        ));
    }

    #[test]
    fn uniform_value_bytes() {
        let bytes = UniformValue::Vec3(Vec3::new(1.0, 2.0, 3.0)).to_bytes();
        assert_eq!(bytes.len(), UniformType::Vec3.size());
        assert_eq!(&bytes[4..8], &2.0f32.to_le_bytes());
    }
}
