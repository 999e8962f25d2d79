use kiln_gpu::{
    Clear, ColorTarget, CullFace, DepthBufferId, DepthFunc, DepthTarget, DrawCall, GpuBackend,
    GpuError, ProgramId, ProgramLayout, ResourceId, TargetDesc, TextureDesc, TextureId,
    TextureKind, TextureWrite, VertexArrayDesc, VertexArrayId, Viewport,
};
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use wgpu::util::DeviceExt;

const COLOR_TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const INITIAL_UNIFORM_CAPACITY: u64 = 64 * 1024;
/// Stride of the zero buffer feeding attributes a vertex array does not provide.
const ZERO_STRIDE: u64 = 16;

struct GpuProgram {
    layout: Arc<ProgramLayout>,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

struct GpuTexture {
    size: (u32, u32),
    texture: wgpu::Texture,
    /// View sampled by shaders (2D or cube).
    sample_view: wgpu::TextureView,
    /// Single-layer, single-mip views usable as render attachments.
    layer_views: Vec<wgpu::TextureView>,
}

struct GpuVertexArray {
    /// Location → (buffer, components).
    streams: HashMap<u32, (wgpu::Buffer, u32)>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    /// Components supplied for each program attribute, `None` when fed zeros.
    streams: Vec<Option<u32>>,
    color_format: wgpu::TextureFormat,
    has_depth: bool,
    depth: Option<DepthFunc>,
    cull: Option<CullFace>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct TextureGroupKey {
    program: ProgramId,
    textures: Vec<Option<TextureId>>,
}

struct RecordedDraw {
    pipeline: PipelineKey,
    textures: TextureGroupKey,
    uniform_offset: Option<u32>,
    vertex_array: VertexArrayId,
    viewport: Viewport,
    first: u32,
    count: u32,
}

/// Draws sharing one render pass.
struct Segment {
    target: TargetDesc,
    clear: Option<[f32; 4]>,
    draws: Vec<RecordedDraw>,
}

/// [`GpuBackend`] executing on a wgpu device.
///
/// Clears and draws are recorded into pass segments and encoded on
/// [`flush`](GpuBackend::flush). Uniform data for every draw is staged into
/// one buffer bound with dynamic offsets.
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    surface_format: wgpu::TextureFormat,
    surface_size: (u32, u32),
    surface_view: Option<wgpu::TextureView>,
    surface_depth: wgpu::TextureView,

    programs: HashMap<ProgramId, GpuProgram>,
    textures: HashMap<TextureId, GpuTexture>,
    vertex_arrays: HashMap<VertexArrayId, GpuVertexArray>,
    depth_buffers: HashMap<DepthBufferId, wgpu::TextureView>,

    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    texture_groups: HashMap<TextureGroupKey, wgpu::BindGroup>,
    sampler: wgpu::Sampler,
    dummy_plane: wgpu::TextureView,
    dummy_cube: wgpu::TextureView,
    zero_buffer: wgpu::Buffer,

    uniform_alignment: usize,
    uniform_staging: Vec<u8>,
    uniform_buffer: wgpu::Buffer,
    segments: Vec<Segment>,
}

impl WgpuBackend {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("kiln_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let dummy = |kind: TextureKind| {
            let texture = device.create_texture(&texture_descriptor("dummy_texture", kind, 1, 1, 1));
            sample_view(&texture, kind)
        };
        let dummy_plane = dummy(TextureKind::Plane);
        let dummy_cube = dummy(TextureKind::Cube);

        let zero_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("zero_attribute_buffer"),
            contents: &[0u8; ZERO_STRIDE as usize],
            usage: wgpu::BufferUsages::VERTEX,
        });

        let uniform_buffer = create_uniform_buffer(&device, INITIAL_UNIFORM_CAPACITY);
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as usize;
        let surface_depth = create_depth_view(&device, width, height);

        Self {
            device,
            queue,
            surface_format,
            surface_size: (width, height),
            surface_view: None,
            surface_depth,
            programs: HashMap::new(),
            textures: HashMap::new(),
            vertex_arrays: HashMap::new(),
            depth_buffers: HashMap::new(),
            pipelines: HashMap::new(),
            texture_groups: HashMap::new(),
            sampler,
            dummy_plane,
            dummy_cube,
            zero_buffer,
            uniform_alignment,
            uniform_staging: Vec::new(),
            uniform_buffer,
            segments: Vec::new(),
        }
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    /// Provide the view surface-targeted passes render into until the next flush.
    pub fn attach_surface(&mut self, view: wgpu::TextureView) {
        self.surface_view = Some(view);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        self.surface_size = (width, height);
        self.surface_depth = create_depth_view(&self.device, width, height);
    }

    /// Run `create` inside validation and out-of-memory error scopes.
    fn scoped<T>(&self, what: &'static str, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        match validation.or(oom) {
            Some(err) => Err(GpuError::ResourceCreation {
                what,
                reason: err.to_string(),
            }),
            None => Ok(value),
        }
    }

    fn target_format(&self, target: &TargetDesc) -> wgpu::TextureFormat {
        match target.color {
            ColorTarget::Surface => self.surface_format,
            ColorTarget::Texture { .. } => COLOR_TARGET_FORMAT,
        }
    }

    fn target_size(&self, target: &TargetDesc) -> (u32, u32) {
        match target.color {
            ColorTarget::Surface => self.surface_size,
            ColorTarget::Texture { id, .. } => self.textures.get(&id).map_or((1, 1), |t| t.size),
        }
    }

    fn build_pipeline(&self, key: &PipelineKey) -> Result<wgpu::RenderPipeline, GpuError> {
        let program = self
            .programs
            .get(&key.program)
            .ok_or(GpuError::UnknownResource(key.program.into()))?;

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = program
            .layout
            .attributes
            .iter()
            .zip(&key.streams)
            .map(|(attr, supplied)| {
                [wgpu::VertexAttribute {
                    format: vertex_format(supplied.unwrap_or(attr.components)),
                    offset: 0,
                    shader_location: attr.location,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = attributes
            .iter()
            .zip(&key.streams)
            .map(|(attr, supplied)| match supplied {
                Some(components) => wgpu::VertexBufferLayout {
                    array_stride: u64::from(*components) * 4,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: attr,
                },
                None => wgpu::VertexBufferLayout {
                    array_stride: ZERO_STRIDE,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: attr,
                },
            })
            .collect();

        // A disabled depth test neither compares nor writes.
        let depth_stencil = key.has_depth.then(|| wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: key.depth.is_some(),
            depth_compare: match key.depth {
                Some(DepthFunc::Less) => wgpu::CompareFunction::Less,
                Some(DepthFunc::LessEqual) => wgpu::CompareFunction::LessEqual,
                Some(DepthFunc::Always) | None => wgpu::CompareFunction::Always,
            },
            stencil: Default::default(),
            bias: Default::default(),
        });

        self.scoped("pipeline", |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("kiln_pipeline"),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex,
                    entry_point: Some(&program.layout.vertex.entry_point),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment,
                    entry_point: Some(&program.layout.fragment.entry_point),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.color_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: key.cull.map(|c| match c {
                        CullFace::Front => wgpu::Face::Front,
                        CullFace::Back => wgpu::Face::Back,
                    }),
                    ..Default::default()
                },
                depth_stencil,
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
        })
    }

    fn build_texture_group(&self, key: &TextureGroupKey, call: &DrawCall) -> Result<wgpu::BindGroup, GpuError> {
        let program = self
            .programs
            .get(&key.program)
            .ok_or(GpuError::UnknownResource(key.program.into()))?;
        let mut entries = Vec::new();
        for bound in &call.textures {
            let view = match bound.texture {
                Some(id) => {
                    &self
                        .textures
                        .get(&id)
                        .ok_or(GpuError::UnknownResource(id.into()))?
                        .sample_view
                }
                None => match bound.kind {
                    TextureKind::Plane => &self.dummy_plane,
                    TextureKind::Cube => &self.dummy_cube,
                },
            };
            entries.push(wgpu::BindGroupEntry {
                binding: bound.binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        for &binding in &program.layout.samplers {
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });
        }
        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kiln_texture_group"),
            layout: &program.texture_layout,
            entries: &entries,
        }))
    }

    /// Append a draw's uniform block to the staging area; returns its offset.
    fn stage_uniforms(&mut self, bytes: &[u8]) -> Option<u32> {
        if bytes.is_empty() {
            return None;
        }
        let offset = self.uniform_staging.len().next_multiple_of(self.uniform_alignment);
        self.uniform_staging.resize(offset, 0);
        self.uniform_staging.extend_from_slice(bytes);
        Some(offset as u32)
    }

    fn segment_for(&mut self, target: TargetDesc) -> &mut Segment {
        let reuse = self.segments.last().is_some_and(|s| s.target == target);
        if !reuse {
            self.segments.push(Segment {
                target,
                clear: None,
                draws: Vec::new(),
            });
        }
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }

    fn upload_uniforms(&mut self) {
        if self.uniform_staging.is_empty() {
            return;
        }
        let needed = self.uniform_staging.len() as u64;
        if needed > self.uniform_buffer.size() {
            let capacity = needed.next_power_of_two();
            tracing::debug!(capacity, "growing uniform buffer");
            self.uniform_buffer = create_uniform_buffer(&self.device, capacity);
        }
        self.queue.write_buffer(&self.uniform_buffer, 0, &self.uniform_staging);
    }

    fn uniform_group(&self, program: &GpuProgram) -> wgpu::BindGroup {
        let entries = match program.layout.block.as_ref() {
            Some(block) => vec![wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &self.uniform_buffer,
                    offset: 0,
                    size: NonZeroU64::new(u64::from(block.size)),
                }),
            }],
            None => Vec::new(),
        };
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kiln_uniform_group"),
            layout: &program.uniform_layout,
            entries: &entries,
        })
    }
}

impl GpuBackend for WgpuBackend {
    fn create_program(&mut self, id: ProgramId, layout: Arc<ProgramLayout>) -> Result<(), GpuError> {
        let program = self.scoped("program", |device| {
            let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("kiln_vertex"),
                source: wgpu::ShaderSource::Wgsl(layout.vertex.source.as_str().into()),
            });
            let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("kiln_fragment"),
                source: wgpu::ShaderSource::Wgsl(layout.fragment.source.as_str().into()),
            });

            let visibility = wgpu::ShaderStages::VERTEX_FRAGMENT;
            let uniform_entries: Vec<wgpu::BindGroupLayoutEntry> = layout
                .block
                .iter()
                .map(|block| wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(u64::from(block.size)),
                    },
                    count: None,
                })
                .collect();
            let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("kiln_uniform_layout"),
                entries: &uniform_entries,
            });

            let mut texture_entries: Vec<wgpu::BindGroupLayoutEntry> = layout
                .textures
                .iter()
                .map(|slot| wgpu::BindGroupLayoutEntry {
                    binding: slot.binding,
                    visibility,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: match slot.kind {
                            TextureKind::Plane => wgpu::TextureViewDimension::D2,
                            TextureKind::Cube => wgpu::TextureViewDimension::Cube,
                        },
                        multisampled: false,
                    },
                    count: None,
                })
                .collect();
            texture_entries.extend(layout.samplers.iter().map(|&binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            }));
            let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("kiln_texture_layout"),
                entries: &texture_entries,
            });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("kiln_pipeline_layout"),
                bind_group_layouts: &[&uniform_layout, &texture_layout],
                push_constant_ranges: &[],
            });

            GpuProgram {
                layout: Arc::clone(&layout),
                vertex,
                fragment,
                uniform_layout,
                texture_layout,
                pipeline_layout,
            }
        })?;
        self.programs.insert(id, program);
        Ok(())
    }

    fn create_texture(&mut self, id: TextureId, desc: &TextureDesc) -> Result<(), GpuError> {
        let texture = self.scoped("texture", |device| {
            let texture = device.create_texture(&texture_descriptor(
                "kiln_texture",
                desc.kind,
                desc.width,
                desc.height,
                desc.mip_levels,
            ));
            let sample_view = sample_view(&texture, desc.kind);
            let layer_views = (0..desc.kind.layers())
                .map(|layer| {
                    texture.create_view(&wgpu::TextureViewDescriptor {
                        label: Some("kiln_layer_view"),
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        base_mip_level: 0,
                        mip_level_count: Some(1),
                        base_array_layer: layer,
                        array_layer_count: Some(1),
                        ..Default::default()
                    })
                })
                .collect();
            GpuTexture {
                size: (desc.width, desc.height),
                texture,
                sample_view,
                layer_views,
            }
        })?;
        self.textures.insert(id, texture);
        Ok(())
    }

    fn write_texture(&mut self, id: TextureId, write: &TextureWrite<'_>) -> Result<(), GpuError> {
        let texture = self
            .textures
            .get(&id)
            .ok_or(GpuError::UnknownResource(id.into()))?;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: write.mip,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: write.layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            write.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * write.width),
                rows_per_image: Some(write.height),
            },
            wgpu::Extent3d {
                width: write.width,
                height: write.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn create_vertex_array(&mut self, id: VertexArrayId, desc: &VertexArrayDesc) -> Result<(), GpuError> {
        let streams = self.scoped("vertex array", |device| {
            desc.streams
                .iter()
                .map(|stream| {
                    let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("kiln_vertex_buffer"),
                        contents: bytemuck::cast_slice(&stream.data),
                        usage: wgpu::BufferUsages::VERTEX,
                    });
                    (stream.location, (buffer, stream.components))
                })
                .collect()
        })?;
        self.vertex_arrays.insert(id, GpuVertexArray { streams });
        Ok(())
    }

    fn create_depth_buffer(&mut self, id: DepthBufferId, width: u32, height: u32) -> Result<(), GpuError> {
        let view = self.scoped("depth buffer", |device| create_depth_view(device, width, height))?;
        self.depth_buffers.insert(id, view);
        Ok(())
    }

    fn release(&mut self, id: ResourceId) {
        match id {
            ResourceId::ProgramId(p) => {
                self.programs.remove(&p);
                self.pipelines.retain(|k, _| k.program != p);
                self.texture_groups.retain(|k, _| k.program != p);
            }
            ResourceId::TextureId(t) => {
                if let Some(texture) = self.textures.remove(&t) {
                    texture.texture.destroy();
                }
                self.texture_groups.retain(|k, _| !k.textures.contains(&Some(t)));
            }
            ResourceId::VertexArrayId(v) => {
                self.vertex_arrays.remove(&v);
            }
            ResourceId::DepthBufferId(d) => {
                self.depth_buffers.remove(&d);
            }
            ResourceId::FramebufferId(_) => {}
        }
    }

    fn clear(&mut self, clear: &Clear) -> Result<(), GpuError> {
        self.segments.push(Segment {
            target: clear.target,
            clear: Some(clear.color),
            draws: Vec::new(),
        });
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), GpuError> {
        let program = self
            .programs
            .get(&call.program)
            .ok_or(GpuError::UnknownResource(call.program.into()))?;
        let vertex_array = self
            .vertex_arrays
            .get(&call.vertex_array)
            .ok_or(GpuError::UnknownResource(call.vertex_array.into()))?;

        let pipeline = PipelineKey {
            program: call.program,
            streams: program
                .layout
                .attributes
                .iter()
                .map(|a| vertex_array.streams.get(&a.location).map(|(_, c)| *c))
                .collect(),
            color_format: self.target_format(&call.target),
            has_depth: call.target.depth != DepthTarget::None,
            depth: call.raster.depth,
            cull: call.raster.cull,
        };
        if !self.pipelines.contains_key(&pipeline) {
            let built = self.build_pipeline(&pipeline)?;
            self.pipelines.insert(pipeline.clone(), built);
        }

        let textures = TextureGroupKey {
            program: call.program,
            textures: call.textures.iter().map(|t| t.texture).collect(),
        };
        if !self.texture_groups.contains_key(&textures) {
            let group = self.build_texture_group(&textures, call)?;
            self.texture_groups.insert(textures.clone(), group);
        }

        let uniform_offset = self.stage_uniforms(&call.uniforms);
        let draw = RecordedDraw {
            pipeline,
            textures,
            uniform_offset,
            vertex_array: call.vertex_array,
            viewport: call.viewport,
            first: call.first,
            count: call.count,
        };
        self.segment_for(call.target).draws.push(draw);
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn discard(&mut self) {
        if !self.segments.is_empty() {
            tracing::debug!(segments = self.segments.len(), "discarding recorded passes");
        }
        self.segments.clear();
        self.uniform_staging.clear();
    }

    fn flush(&mut self) -> Result<(), GpuError> {
        let segments = std::mem::take(&mut self.segments);
        self.upload_uniforms();
        self.uniform_staging.clear();

        let uniform_groups: HashMap<ProgramId, wgpu::BindGroup> = self
            .programs
            .iter()
            .map(|(&id, program)| (id, self.uniform_group(program)))
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kiln_frame"),
            });

        for segment in &segments {
            let color_view = match segment.target.color {
                ColorTarget::Surface => self
                    .surface_view
                    .as_ref()
                    .ok_or_else(|| GpuError::Backend("no surface view attached".into()))?,
                ColorTarget::Texture { id, layer } => self
                    .textures
                    .get(&id)
                    .and_then(|t| t.layer_views.get(layer as usize))
                    .ok_or(GpuError::UnknownResource(id.into()))?,
            };
            let depth_view = match segment.target.depth {
                DepthTarget::Surface => Some(&self.surface_depth),
                DepthTarget::Buffer(id) => Some(
                    self.depth_buffers
                        .get(&id)
                        .ok_or(GpuError::UnknownResource(id.into()))?,
                ),
                DepthTarget::None => None,
            };

            let load = match segment.clear {
                Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: f64::from(r),
                    g: f64::from(g),
                    b: f64::from(b),
                    a: f64::from(a),
                }),
                None => wgpu::LoadOp::Load,
            };
            let depth_load = match segment.clear {
                Some(_) => wgpu::LoadOp::Clear(1.0),
                None => wgpu::LoadOp::Load,
            };

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kiln_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let target_size = self.target_size(&segment.target);
            for draw in &segment.draws {
                let (Some(pipeline), Some(textures), Some(uniforms), Some(vertex_array), Some(program)) = (
                    self.pipelines.get(&draw.pipeline),
                    self.texture_groups.get(&draw.textures),
                    uniform_groups.get(&draw.pipeline.program),
                    self.vertex_arrays.get(&draw.vertex_array),
                    self.programs.get(&draw.pipeline.program),
                ) else {
                    tracing::warn!("dropping draw whose resources were released before flush");
                    continue;
                };
                pass.set_pipeline(pipeline);
                match draw.uniform_offset {
                    Some(offset) => pass.set_bind_group(0, uniforms, &[offset]),
                    None => pass.set_bind_group(0, uniforms, &[]),
                }
                pass.set_bind_group(1, textures, &[]);
                for (slot, attr) in program.layout.attributes.iter().enumerate() {
                    let buffer = vertex_array
                        .streams
                        .get(&attr.location)
                        .map_or(&self.zero_buffer, |(b, _)| b);
                    pass.set_vertex_buffer(slot as u32, buffer.slice(..));
                }
                let [x, y, w, h] = flip_viewport(draw.viewport, target_size);
                pass.set_viewport(x, y, w, h, 0.0, 1.0);
                pass.draw(draw.first..draw.first + draw.count, 0..1);
            }
        }

        self.queue.submit(Some(encoder.finish()));
        self.surface_view = None;
        Ok(())
    }
}

fn texture_descriptor(
    label: &'static str,
    kind: TextureKind,
    width: u32,
    height: u32,
    mip_levels: u32,
) -> wgpu::TextureDescriptor<'static> {
    wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: kind.layers(),
        },
        mip_level_count: mip_levels,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: COLOR_TARGET_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    }
}

fn sample_view(texture: &wgpu::Texture, kind: TextureKind) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("kiln_sample_view"),
        dimension: Some(match kind {
            TextureKind::Plane => wgpu::TextureViewDimension::D2,
            TextureKind::Cube => wgpu::TextureViewDimension::Cube,
        }),
        ..Default::default()
    })
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("kiln_depth"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_uniform_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("kiln_uniforms"),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

/// Convert a bottom-left-origin viewport to wgpu's top-left origin, clamped to
/// the target.
fn flip_viewport(viewport: Viewport, (target_w, target_h): (u32, u32)) -> [f32; 4] {
    let x = viewport.x.max(0) as u32;
    let bottom = viewport.y.max(0) as u32;
    let width = viewport.width.min(target_w.saturating_sub(x));
    let height = viewport.height.min(target_h.saturating_sub(bottom));
    let top = target_h.saturating_sub(bottom + height);
    [x as f32, top as f32, width.max(1) as f32, height.max(1) as f32]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_viewport_is_unchanged() {
        assert_eq!(
            flip_viewport(Viewport::sized(800, 600), (800, 600)),
            [0.0, 0.0, 800.0, 600.0]
        );
    }

    #[test]
    fn bottom_left_origin_flips() {
        let vp = Viewport {
            x: 10,
            y: 20,
            width: 100,
            height: 50,
        };
        assert_eq!(flip_viewport(vp, (200, 200)), [10.0, 130.0, 100.0, 50.0]);
    }

    #[test]
    fn oversized_viewport_is_clamped() {
        assert_eq!(
            flip_viewport(Viewport::sized(1024, 1024), (512, 512)),
            [0.0, 0.0, 512.0, 512.0]
        );
    }

    #[test]
    fn formats_by_component_count() {
        assert_eq!(vertex_format(2), wgpu::VertexFormat::Float32x2);
        assert_eq!(vertex_format(3), wgpu::VertexFormat::Float32x3);
    }
}
