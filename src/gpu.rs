//! wgpu implementation of the simulation's GPU command interface
//!
//! `WgpuBackend` owns the device, queue and window surface, and keeps every
//! texture, render target and program in slot tables indexed by the handles
//! handed out to [`SimulationContext`](crate::sim::SimulationContext).

use std::{collections::HashMap, sync::Arc};

use bytemuck::{Pod, Zeroable};
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, Buffer, BufferUsages, CommandEncoderDescriptor, Device, FragmentState,
    Instance, LoadOp, MultisampleState, Operations, PipelineLayoutDescriptor, PrimitiveState,
    Queue, RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline,
    RenderPipelineDescriptor, Sampler, ShaderStages, StoreOp, Surface, SurfaceConfiguration,
    TextureUsages, TextureView, TextureViewDescriptor, VertexState,
    util::{BufferInitDescriptor, DeviceExt},
};
use winit::window::Window;

use crate::sim::{
    Dimensions, Region,
    backend::{DrawCall, GpuBackend, ProgramId, ProgramOutput, TargetId, TextureId, Uniform},
};

/// Storage format of both cell textures
pub const CELL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// The two WGSL stages of a program
///
/// The vertex module must export `vs_main` and the fragment module `fs_main`.
/// Fragment stages see the input texture at `@group(0) @binding(0)`, its
/// sampler at `@group(0) @binding(1)` and the uniform block at
/// `@group(1) @binding(0)`.
#[derive(Clone, Copy, Debug)]
pub struct WgslProgram {
    pub label: &'static str,
    pub vertex: &'static str,
    pub fragment: &'static str,
}

/// Uniform block shared by every program, matching `struct Uniforms` in WGSL
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
struct ProgramUniforms {
    resolution: [f32; 2],
    time: f32,
    padding: f32,
}

struct CellTexture {
    texture: wgpu::Texture,
    view: TextureView,
}

struct GpuProgram {
    label: &'static str,
    pipeline: RenderPipeline,
    output: ProgramOutput,
    uniforms: ProgramUniforms,
    uniforms_buf: Buffer,
    uniforms_bind_group: BindGroup,
}

pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: Instance, // Keep instance alive for the lifetime of the backend
    device: Device,
    queue: Queue,
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,
    window: Arc<Window>,
    sampler: Sampler,
    input_layout: BindGroupLayout,
    uniforms_layout: BindGroupLayout,
    textures: Vec<CellTexture>,
    targets: Vec<Option<TextureId>>,
    programs: Vec<GpuProgram>,
    /// Input bind groups, built the first time a texture is sampled
    input_bind_groups: HashMap<TextureId, BindGroup>,
}

impl WgpuBackend {
    /// Open a device for `window` and configure its surface at `dims`.
    ///
    /// # Arguments
    /// * `window` - The window to present to
    /// * `dims` - Board size, which is also the surface size
    /// * `power_preference` - Which adapter to ask for
    pub async fn new(
        window: Arc<Window>,
        dims: Dimensions,
        power_preference: wgpu::PowerPreference,
    ) -> Result<Self, anyhow::Error> {
        let instance = Instance::new(&wgpu::InstanceDescriptor::default());

        // Create surface first to find compatible adapter
        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await?;

        log::info!("Using adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("life device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = pick_surface_format(&surface_caps.formats)
            .ok_or_else(|| anyhow::anyhow!("surface reports no supported formats"))?;
        log::debug!("surface format {surface_format:?}");

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: dims.width,
            height: dims.height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        // Cells are discrete: no interpolation between them, no wrap at edges.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("cell sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let input_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("cell input bind group layout"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let uniforms_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("program uniforms bind group layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        Ok(Self {
            instance,
            device,
            queue,
            surface,
            surface_config,
            window,
            sampler,
            input_layout,
            uniforms_layout,
            textures: Vec::new(),
            targets: Vec::new(),
            programs: Vec::new(),
            input_bind_groups: HashMap::new(),
        })
    }

    /// Request a redraw of the window
    /// Call this after presenting to keep the animation loop going
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Reconfigure a lost or outdated surface at its original size
    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.surface_config);
    }

    fn ensure_input_bind_group(&mut self, texture: TextureId) {
        let Self {
            device,
            textures,
            input_layout,
            sampler,
            input_bind_groups,
            ..
        } = self;
        input_bind_groups.entry(texture).or_insert_with(|| {
            device.create_bind_group(&BindGroupDescriptor {
                label: Some("cell input bind group"),
                layout: input_layout,
                entries: &[
                    BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&textures[texture.0].view),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            })
        });
    }

    /// Record one full-surface triangle of `call` into `view` and submit it.
    fn encode_pass(&mut self, call: DrawCall, view: &TextureView, label: &str) {
        self.ensure_input_bind_group(call.input);
        let input_bind_group = &self.input_bind_groups[&call.input];
        let program = &self.programs[call.program.0];

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor { label: Some(label) });
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_viewport(
                0.0,
                0.0,
                call.viewport.width as f32,
                call.viewport.height as f32,
                0.0,
                1.0,
            );
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, input_bind_group, &[]);
            pass.set_bind_group(1, &program.uniforms_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl GpuBackend for WgpuBackend {
    type Shader = WgslProgram;
    type Error = wgpu::SurfaceError;

    fn create_texture(&mut self, dims: Dimensions) -> TextureId {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("cell texture"),
            size: wgpu::Extent3d {
                width: dims.width,
                height: dims.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CELL_FORMAT,
            usage: TextureUsages::TEXTURE_BINDING
                | TextureUsages::RENDER_ATTACHMENT
                | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&TextureViewDescriptor::default());
        self.textures.push(CellTexture { texture, view });
        TextureId(self.textures.len() - 1)
    }

    fn write_texture(&mut self, texture: TextureId, region: Region, pixels: &[u8]) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.textures[texture.0].texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x,
                    y: region.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(region.width * 4),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_render_target(&mut self) -> TargetId {
        self.targets.push(None);
        TargetId(self.targets.len() - 1)
    }

    fn attach_color(&mut self, target: TargetId, texture: TextureId) {
        self.targets[target.0] = Some(texture);
    }

    async fn create_program(
        &mut self,
        shader: &WgslProgram,
        output: ProgramOutput,
    ) -> anyhow::Result<ProgramId> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(shader.label),
                source: wgpu::ShaderSource::Wgsl(shader.vertex.into()),
            });
        let fragment = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(shader.label),
                source: wgpu::ShaderSource::Wgsl(shader.fragment.into()),
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some(shader.label),
                bind_group_layouts: &[&self.input_layout, &self.uniforms_layout],
                push_constant_ranges: &[],
            });

        let format = match output {
            ProgramOutput::CellTexture => CELL_FORMAT,
            ProgramOutput::Surface => self.surface_config.format,
        };

        let pipeline = self
            .device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: Some(shader.label),
                layout: Some(&pipeline_layout),
                vertex: VertexState {
                    module: &vertex,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(FragmentState {
                    module: &fragment,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            });

        if let Some(error) = self.device.pop_error_scope().await {
            log::error!("program `{}` failed to build: {error}", shader.label);
            anyhow::bail!("program `{}` failed to build: {error}", shader.label);
        }

        let uniforms = ProgramUniforms::default();
        let uniforms_buf = self.device.create_buffer_init(&BufferInitDescriptor {
            label: Some("program uniforms buffer"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        let uniforms_bind_group = self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("program uniforms bind group"),
            layout: &self.uniforms_layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: uniforms_buf.as_entire_binding(),
            }],
        });

        self.programs.push(GpuProgram {
            label: shader.label,
            pipeline,
            output,
            uniforms,
            uniforms_buf,
            uniforms_bind_group,
        });
        Ok(ProgramId(self.programs.len() - 1))
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: Uniform) {
        let program = &mut self.programs[program.0];
        match (name, value) {
            ("resolution", Uniform::Vec2(v)) => program.uniforms.resolution = v,
            ("time", Uniform::Float(t)) => program.uniforms.time = t,
            _ => {
                log::warn!(
                    "program `{}` has no uniform `{name}` of type {value:?}",
                    program.label
                );
                return;
            }
        }
        self.queue.write_buffer(
            &program.uniforms_buf,
            0,
            bytemuck::bytes_of(&program.uniforms),
        );
    }

    fn draw(&mut self, call: DrawCall, target: TargetId) {
        let Some(output) = self.targets[target.0] else {
            log::warn!("draw into render target {target:?} with nothing attached");
            return;
        };
        debug_assert_ne!(output, call.input, "a pass cannot read the texture it writes");
        let program = &self.programs[call.program.0];
        if program.output != ProgramOutput::CellTexture {
            log::warn!("`{}` renders to the surface, not a cell texture", program.label);
            return;
        }
        let view = self.textures[output.0].view.clone();
        self.encode_pass(call, &view, "simulation step pass");
    }

    fn present(&mut self, call: DrawCall) -> Result<(), wgpu::SurfaceError> {
        let program = &self.programs[call.program.0];
        if program.output != ProgramOutput::Surface {
            log::warn!("`{}` renders to cell textures, not the surface", program.label);
            return Ok(());
        }
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&TextureViewDescriptor::default());
        self.encode_pass(call, &view, "display pass");
        output.present();
        Ok(())
    }
}

/// Surface format for the display pass.
///
/// The display program copies texels unchanged, so an sRGB surface would
/// re-encode every channel that is neither 0 nor 255.
fn pick_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .find(|f| !f.is_srgb())
        .or_else(|| formats.first())
        .copied()
}
