use std::{collections::HashMap, mem, ops::Range};

use anyhow::Context;
use bytemuck::NoUninit;
use half::f16;
use wgpu::{
    util::{DeviceExt, TextureDataOrder},
    Adapter, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout,
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource, BindingType, BlendComponent,
    BlendFactor, BlendOperation, BlendState, Buffer, BufferBindingType, BufferDescriptor,
    BufferUsages, Color, ColorTargetState, ColorWrites, CommandEncoder, Device, DeviceDescriptor,
    Extent3d, FilterMode, FragmentState, MemoryHints, MultisampleState, Operations,
    PipelineCompilationOptions, PipelineLayout, PipelineLayoutDescriptor, PrimitiveState,
    PrimitiveTopology, Queue, RenderPass, RenderPassColorAttachment, RenderPassDescriptor,
    RenderPipeline, RenderPipelineDescriptor, RequestAdapterOptions, SamplerBindingType,
    SamplerDescriptor, ShaderModule, ShaderModuleDescriptor, ShaderSource, ShaderStages, Texture,
    TextureDescriptor, TextureDimension, TextureFormat, TextureSampleType, TextureUsages,
    TextureViewDimension, VertexState,
};

use crate::{
    brush::BrushTexture,
    math::{vec2, Vec2f, Vec2u},
    pool::{CompositeMode, Stamp},
    stroke::Surface,
};

/// Removes destination coverage by the source alpha and ignores source color.
const ERASE_BLENDING: BlendState = BlendState {
    color: BlendComponent {
        src_factor: BlendFactor::Zero,
        dst_factor: BlendFactor::OneMinusSrcAlpha,
        operation: BlendOperation::Add,
    },
    alpha: BlendComponent {
        src_factor: BlendFactor::Zero,
        dst_factor: BlendFactor::OneMinusSrcAlpha,
        operation: BlendOperation::Add,
    },
};

pub struct Gpu {
    pub adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
    /// Format of the window surface, used as the format of every render target.
    pub format: TextureFormat,

    paint_pipeline: RenderPipeline,
    erase_pipeline: RenderPipeline,
    sampler_bg: BindGroup,

    texture_bgl: BindGroupLayout,
    uniforms_bgl: BindGroupLayout,
    instances_bgl: BindGroupLayout,
}

impl Gpu {
    pub fn new(instance: &wgpu::Instance, surface: &wgpu::Surface<'_>) -> anyhow::Result<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            compatible_surface: Some(surface),
            ..Default::default()
        }))
        .context("failed to find a supported graphics adapter")?;

        // Brush colors are sRGB-encoded values and get blended as such, so render into a
        // non-sRGB target whenever the surface offers one.
        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface is not supported by the graphics adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            memory_hints: MemoryHints::MemoryUsage,
            ..Default::default()
        }))?;

        // Shader
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("shader"),
            source: ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        // BGLs
        let sampler_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("sampler"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                count: None,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
            }],
        });
        let texture_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("texture"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                count: None,
                visibility: ShaderStages::VERTEX_FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
            }],
        });
        let uniforms_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("uniforms"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                count: None,
                visibility: ShaderStages::VERTEX_FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
            }],
        });
        let instances_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("instances"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                count: None,
                visibility: ShaderStages::VERTEX_FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
            }],
        });

        // Pipelines. Painting and erasing only differ in their blend state.
        let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("stamp_pipeline"),
            bind_group_layouts: &[&sampler_bgl, &texture_bgl, &uniforms_bgl, &instances_bgl],
            ..Default::default()
        });
        let paint_pipeline = create_pipeline(
            &device,
            &layout,
            &shader,
            format,
            "paint_pipeline",
            BlendState::PREMULTIPLIED_ALPHA_BLENDING,
        );
        let erase_pipeline = create_pipeline(
            &device,
            &layout,
            &shader,
            format,
            "erase_pipeline",
            ERASE_BLENDING,
        );

        let sampler = device.create_sampler(&SamplerDescriptor {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..Default::default()
        });
        let sampler_bg = device.create_bind_group(&BindGroupDescriptor {
            label: Some("sampler"),
            layout: &sampler_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Sampler(&sampler),
            }],
        });

        Ok(Gpu {
            adapter,
            device,
            queue,
            format,
            paint_pipeline,
            erase_pipeline,
            sampler_bg,
            texture_bgl,
            uniforms_bgl,
            instances_bgl,
        })
    }

    fn pipeline(&self, mode: CompositeMode) -> &RenderPipeline {
        match mode {
            CompositeMode::Normal => &self.paint_pipeline,
            CompositeMode::Erase => &self.erase_pipeline,
        }
    }
}

fn create_pipeline(
    device: &Device,
    layout: &PipelineLayout,
    shader: &ShaderModule,
    format: TextureFormat,
    label: &str,
    blend: BlendState,
) -> RenderPipeline {
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: VertexState {
            module: shader,
            entry_point: Some("vertex"),
            compilation_options: PipelineCompilationOptions::default(),
            buffers: &[],
        },
        primitive: PrimitiveState {
            topology: PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: MultisampleState::default(),
        fragment: Some(FragmentState {
            module: shader,
            entry_point: Some("fragment"),
            compilation_options: PipelineCompilationOptions::default(),
            targets: &[Some(ColorTargetState {
                format,
                blend: Some(blend),
                write_mask: ColorWrites::all(),
            })],
        }),
        multiview: None,
        cache: None,
    })
}

#[derive(Clone, Copy, NoUninit)]
#[repr(C)]
struct Uniforms {
    render_target_size: Vec2u,
    /// Non-zero to clip every instance to the circle inscribed in its quad.
    circle_mask: u32,
    _padding: u32,
}

#[derive(Debug, Clone, Copy, NoUninit)]
#[repr(C)]
pub struct Instance {
    /// Center position in pixel coordinates.
    pos: Vec2f,
    opacity: f32,
    /// Multiplier applied to the texture size.
    scale: f32,
}

impl Instance {
    pub fn new(position: Vec2f, opacity: f32, scale: f32) -> Self {
        Self {
            pos: position,
            opacity,
            scale,
        }
    }
}

pub struct Pass<'a> {
    gpu: &'a Gpu,
    pass: RenderPass<'a>,
}

impl<'a> Pass<'a> {
    pub fn new(
        gpu: &'a Gpu,
        enc: &'a mut CommandEncoder,
        target: &Texture,
        clear: Option<Color>,
    ) -> Self {
        let pass = enc.begin_render_pass(&RenderPassDescriptor {
            color_attachments: &[Some(RenderPassColorAttachment {
                view: &target.create_view(&Default::default()),
                depth_slice: None,
                resolve_target: None,
                ops: Operations {
                    load: match clear {
                        Some(clear) => wgpu::LoadOp::Clear(clear),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                },
            })],
            ..Default::default()
        });

        Self { gpu, pass }
    }

    /// Draws instances `range` of `instances`, each showing `drawable`'s texture.
    pub fn draw(
        &mut self,
        drawable: &Drawable,
        instances: &Instances,
        range: Range<u32>,
        mode: CompositeMode,
    ) {
        self.pass.set_pipeline(self.gpu.pipeline(mode));
        self.pass.set_bind_group(0, &self.gpu.sampler_bg, &[]);
        self.pass.set_bind_group(1, &drawable.texture_bg, &[]);
        self.pass.set_bind_group(2, &instances.uniforms_bg, &[]);
        self.pass.set_bind_group(3, &instances.instances_bg, &[]);
        self.pass.draw(0..4, range);
    }
}

/// A texture that can be drawn, and possibly drawn onto.
pub struct Drawable {
    texture: Texture,
    texture_bg: BindGroup,
}

impl Drawable {
    /// Creates a transparent render target.
    pub fn empty(gpu: &Gpu, width: u32, height: u32) -> Self {
        let texture = gpu.device.create_texture(&TextureDescriptor {
            label: Some("canvas"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: gpu.format,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Self::from_texture(gpu, texture)
    }

    /// Uploads a brush raster.
    pub fn from_brush(gpu: &Gpu, brush: &BrushTexture) -> Self {
        let texels = brush
            .pixels()
            .iter()
            .flatten()
            .map(|&c| f16::from_f32(c))
            .collect::<Vec<_>>();
        let texture = gpu.device.create_texture_with_data(
            &gpu.queue,
            &TextureDescriptor {
                label: Some("brush"),
                size: Extent3d {
                    width: brush.width(),
                    height: brush.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: TextureDimension::D2,
                format: TextureFormat::Rgba16Float,
                usage: TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            bytemuck::cast_slice(&texels),
        );
        Self::from_texture(gpu, texture)
    }

    fn from_texture(gpu: &Gpu, texture: Texture) -> Self {
        let texture_bg = gpu.device.create_bind_group(&BindGroupDescriptor {
            label: None,
            layout: &gpu.texture_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::TextureView(&texture.create_view(&Default::default())),
            }],
        });
        Self {
            texture,
            texture_bg,
        }
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn size(&self) -> Vec2u {
        vec2(self.texture.width(), self.texture.height())
    }
}

/// Per-instance data plus the description of the render target it is drawn onto.
///
/// The buffers are written through the queue, so each `Instances` may only be filled once per
/// submission.
pub struct Instances {
    uniform_buf: Buffer,
    instance_buf: Buffer,
    uniforms_bg: BindGroup,
    instances_bg: BindGroup,
}

impl Instances {
    pub fn new(gpu: &Gpu) -> Self {
        let uniform_buf = gpu.device.create_buffer(&BufferDescriptor {
            label: None,
            size: mem::size_of::<Uniforms>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let instance_buf = Self::create_instance_buf(gpu, 1);
        let uniforms_bg = gpu.device.create_bind_group(&BindGroupDescriptor {
            label: None,
            layout: &gpu.uniforms_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(uniform_buf.as_entire_buffer_binding()),
            }],
        });
        let instances_bg = Self::create_instances_bg(gpu, &instance_buf);

        Self {
            uniform_buf,
            instance_buf,
            uniforms_bg,
            instances_bg,
        }
    }

    fn create_instance_buf(gpu: &Gpu, count: usize) -> Buffer {
        gpu.device.create_buffer(&BufferDescriptor {
            label: None,
            size: (mem::size_of::<Instance>() * count) as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_instances_bg(gpu: &Gpu, instance_buf: &Buffer) -> BindGroup {
        gpu.device.create_bind_group(&BindGroupDescriptor {
            label: None,
            layout: &gpu.instances_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(instance_buf.as_entire_buffer_binding()),
            }],
        })
    }

    pub fn set(
        &mut self,
        gpu: &Gpu,
        render_target_size: Vec2u,
        circle_mask: bool,
        instances: &[Instance],
    ) {
        let uniforms = Uniforms {
            render_target_size,
            circle_mask: circle_mask.into(),
            _padding: 0,
        };
        gpu.queue
            .write_buffer(&self.uniform_buf, 0, bytemuck::bytes_of(&uniforms));

        let size = (mem::size_of::<Instance>() * instances.len()) as u64;
        if self.instance_buf.size() < size {
            log::debug!("growing instance buffer to {} instances", instances.len());
            self.instance_buf = Self::create_instance_buf(gpu, instances.len());
            self.instances_bg = Self::create_instances_bg(gpu, &self.instance_buf);
        }
        gpu.queue
            .write_buffer(&self.instance_buf, 0, bytemuck::cast_slice(instances));
    }
}

/// GPU resources for compositing stamps onto the canvas.
pub struct StampBatcher {
    instances: Instances,
    /// Uploaded brush rasters, by brush id.
    brushes: HashMap<u64, Drawable>,
}

impl StampBatcher {
    pub fn new(gpu: &Gpu) -> Self {
        Self {
            instances: Instances::new(gpu),
            brushes: HashMap::new(),
        }
    }
}

/// The canvas as a [`Surface`] for one frame's command encoder.
pub struct CanvasTarget<'a> {
    pub gpu: &'a Gpu,
    pub enc: &'a mut CommandEncoder,
    pub canvas: &'a Drawable,
    pub batcher: &'a mut StampBatcher,
}

impl Surface for CanvasTarget<'_> {
    fn composite(&mut self, stamps: &[Stamp]) {
        let gpu = self.gpu;
        let batcher = &mut *self.batcher;

        let batches = batches(stamps);
        batcher
            .brushes
            .retain(|id, _| batches.iter().any(|batch| batch.brush == *id));
        for stamp in stamps {
            let Some(brush) = &stamp.texture else {
                continue;
            };
            batcher.brushes.entry(brush.id()).or_insert_with(|| {
                log::debug!("uploading brush #{} ({:?})", brush.id(), brush.params());
                Drawable::from_brush(gpu, brush)
            });
        }

        let instances = stamps
            .iter()
            .map(|stamp| Instance::new(stamp.position, 1.0, 1.0))
            .collect::<Vec<_>>();
        batcher
            .instances
            .set(gpu, self.canvas.size(), false, &instances);

        let mut pass = Pass::new(gpu, self.enc, self.canvas.texture(), None);
        for batch in &batches {
            pass.draw(
                &batcher.brushes[&batch.brush],
                &batcher.instances,
                batch.range.clone(),
                batch.mode,
            );
        }
    }
}

/// A run of consecutive stamps that can go into one draw call.
#[derive(Debug, PartialEq)]
struct Batch {
    range: Range<u32>,
    brush: u64,
    mode: CompositeMode,
}

fn batches(stamps: &[Stamp]) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();
    for (i, stamp) in stamps.iter().enumerate() {
        let Some(brush) = &stamp.texture else {
            continue;
        };
        let i = i as u32;
        match batches.last_mut() {
            Some(last) if last.range.end == i && last.brush == brush.id() && last.mode == stamp.mode => {
                last.range.end += 1;
            }
            _ => batches.push(Batch {
                range: i..i + 1,
                brush: brush.id(),
                mode: stamp.mode,
            }),
        }
    }
    batches
}

/// Converts `0xRRGGBB` into an opaque clear color.
pub fn rgb_color(rgb: u32) -> Color {
    let channel = |shift: u32| f64::from((rgb >> shift) & 0xff) / 255.0;
    Color {
        r: channel(16),
        g: channel(8),
        b: channel(0),
        a: 1.0,
    }
}
