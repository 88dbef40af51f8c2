//! The wgpu backend.
//!
//! wgpu has no notion of "the program in use" or of uniforms that keep their
//! value between draws, so [`WgpuDevice`] keeps that state on the CPU: every
//! program owns a staging copy of its uniform block, `set_uniform` writes into
//! it, and `draw_arrays` snapshots the block into the frame's uniform stream
//! at a dynamic offset. [`WgpuDevice::present`] uploads the stream once and
//! replays the recorded draws inside a single render pass.
//!
//! Pipelines and texture bind groups are built the first time a combination of
//! program, vertex layout and texture set is drawn, then reused.

use std::{collections::HashMap, num::NonZeroU64, sync::Arc};

use anyhow::{Context, bail};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    data_structures::{
        mesh::VertexLayout,
        texture::{MAX_TEXTURE_UNITS, TextureData},
    },
    gpu::{
        GpuDevice, ProgramHandle, ProgramSource, TextureHandle, UniformLocation, UniformValue,
        VertexArrayHandle, wgsl::UniformBlock,
    },
    pipelines::basic::{self, DEPTH_FORMAT},
};

const INITIAL_UNIFORM_CAPACITY: u64 = 64 * 1024;

struct GpuProgram {
    name: String,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    block: UniformBlock,
    staging: Vec<u8>,
    texture_units: Vec<usize>,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    layout: wgpu::PipelineLayout,
    uniform_group: Option<wgpu::BindGroup>,
}

struct GpuVertexArray {
    buffer: wgpu::Buffer,
    layout: VertexLayout,
    attributes: Vec<wgpu::VertexAttribute>,
}

struct GpuTexture {
    #[allow(unused)]
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// One draw recorded during the frame.
struct DrawPacket {
    program: ProgramHandle,
    vertex_array: VertexArrayHandle,
    textures: Vec<Option<TextureHandle>>,
    uniform_offset: u32,
    vertex_count: u32,
}

type TextureKey = (ProgramHandle, Vec<Option<TextureHandle>>);

pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    fallback: GpuTexture,
    programs: Vec<GpuProgram>,
    textures: Vec<GpuTexture>,
    vertex_arrays: Vec<GpuVertexArray>,
    pipelines: HashMap<(ProgramHandle, VertexLayout), wgpu::RenderPipeline>,
    texture_groups: HashMap<TextureKey, wgpu::BindGroup>,
    uniform_buffer: wgpu::Buffer,
    uniform_capacity: u64,
    uniform_alignment: usize,
    frame_uniforms: Vec<u8>,
    packets: Vec<DrawPacket>,
    clear_color: wgpu::Color,
    current_program: Option<ProgramHandle>,
    current_vertex_array: Option<VertexArrayHandle>,
    units: [Option<TextureHandle>; MAX_TEXTURE_UNITS],
}

impl WgpuDevice {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        log::info!("wgpu setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .context("creating the window surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no adapter can present to the window")?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .context("requesting a device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        // shaders write linear colour, the surface converts
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or(surface_caps.formats.first().copied())
            .context("surface supports no format")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_view = create_depth_view(&device, &config);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });
        let fallback = upload_texture(&device, &queue, &TextureData::solid([255; 4]), "fallback");
        let uniform_buffer = create_uniform_buffer(&device, INITIAL_UNIFORM_CAPACITY);
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as usize;

        Ok(Self {
            surface,
            device,
            queue,
            config,
            depth_view,
            sampler,
            fallback,
            programs: Vec::new(),
            textures: Vec::new(),
            vertex_arrays: Vec::new(),
            pipelines: HashMap::new(),
            texture_groups: HashMap::new(),
            uniform_buffer,
            uniform_capacity: INITIAL_UNIFORM_CAPACITY,
            uniform_alignment,
            frame_uniforms: Vec::new(),
            packets: Vec::new(),
            clear_color: wgpu::Color::BLACK,
            current_program: None,
            current_vertex_array: None,
            units: [None; MAX_TEXTURE_UNITS],
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            self.depth_view = create_depth_view(&self.device, &self.config);
        }
    }

    /// Submit the draws recorded since the last `clear` and show the frame.
    pub fn present(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let packets = std::mem::take(&mut self.packets);
        self.upload_frame_uniforms();
        for packet in &packets {
            self.prepare(packet);
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for packet in &packets {
                let program = &self.programs[packet.program.0 as usize];
                let vertex_array = &self.vertex_arrays[packet.vertex_array.0 as usize];
                let (Some(pipeline), Some(textures), Some(uniforms)) = (
                    self.pipelines
                        .get(&(packet.program, vertex_array.layout.clone())),
                    self.texture_groups
                        .get(&(packet.program, packet.textures.clone())),
                    program.uniform_group.as_ref(),
                ) else {
                    continue;
                };
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, uniforms, &[packet.uniform_offset]);
                render_pass.set_bind_group(1, textures, &[]);
                render_pass.set_vertex_buffer(0, vertex_array.buffer.slice(..));
                render_pass.draw(0..packet.vertex_count, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        self.packets = packets;
        self.packets.clear();
        Ok(())
    }

    fn upload_frame_uniforms(&mut self) {
        let needed = self.frame_uniforms.len() as u64;
        if needed > self.uniform_capacity {
            self.uniform_capacity = needed.next_power_of_two();
            self.uniform_buffer = create_uniform_buffer(&self.device, self.uniform_capacity);
            for program in &mut self.programs {
                program.uniform_group = None;
            }
        }
        if !self.frame_uniforms.is_empty() {
            self.queue
                .write_buffer(&self.uniform_buffer, 0, &self.frame_uniforms);
        }
    }

    /// Build whatever `packet` needs that does not exist yet.
    fn prepare(&mut self, packet: &DrawPacket) {
        let program = &mut self.programs[packet.program.0 as usize];
        if program.uniform_group.is_none() {
            program.uniform_group = Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{} uniforms", program.name)),
                layout: &program.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.uniform_buffer,
                        offset: 0,
                        size: NonZeroU64::new(program.block.size as u64),
                    }),
                }],
            }));
        }

        let vertex_array = &self.vertex_arrays[packet.vertex_array.0 as usize];
        let pipeline_key = (packet.program, vertex_array.layout.clone());
        if !self.pipelines.contains_key(&pipeline_key) {
            log::debug!(
                "building pipeline for {} with {:?}",
                program.name,
                vertex_array.layout.attributes()
            );
            let buffers = [wgpu::VertexBufferLayout {
                array_stride: vertex_array.layout.stride_bytes() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &vertex_array.attributes,
            }];
            let pipeline = basic::mk_render_pipeline(
                &self.device,
                &program.layout,
                self.config.format,
                Some(DEPTH_FORMAT),
                &buffers,
                &program.vertex,
                &program.fragment,
                &program.name,
            );
            self.pipelines.insert(pipeline_key, pipeline);
        }

        let texture_key = (packet.program, packet.textures.clone());
        if !self.texture_groups.contains_key(&texture_key) {
            let mut entries = vec![wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            }];
            for (unit, texture) in program.texture_units.iter().zip(&packet.textures) {
                let view = match texture {
                    Some(handle) => &self.textures[handle.0 as usize].view,
                    None => &self.fallback.view,
                };
                entries.push(wgpu::BindGroupEntry {
                    binding: *unit as u32 + 1,
                    resource: wgpu::BindingResource::TextureView(view),
                });
            }
            let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{} textures", program.name)),
                layout: &program.texture_layout,
                entries: &entries,
            });
            self.texture_groups.insert(texture_key, group);
        }
    }

    fn current(&mut self) -> &mut GpuProgram {
        let Some(program) = self.current_program else {
            panic!("uniform written while no program is in use");
        };
        &mut self.programs[program.0 as usize]
    }
}

impl GpuDevice for WgpuDevice {
    fn compile_program(&mut self, source: &ProgramSource) -> anyhow::Result<ProgramHandle> {
        let block = UniformBlock::reflect_program(source)?;
        let texture_units: Vec<usize> = block.texture_units().collect();
        if let Some(unit) = texture_units.iter().find(|u| **u >= MAX_TEXTURE_UNITS) {
            bail!("{} samples unit {unit}, beyond the last unit", source.name);
        }

        let vertex = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{} vertex", source.name)),
                source: wgpu::ShaderSource::Wgsl(source.vertex.as_str().into()),
            });
        let fragment = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{} fragment", source.name)),
                source: wgpu::ShaderSource::Wgsl(source.fragment.as_str().into()),
            });

        let uniform_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} uniform layout", source.name)),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(block.size as u64),
                    },
                    count: None,
                }],
            });
        let mut texture_entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        }];
        for unit in &texture_units {
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: *unit as u32 + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            });
        }
        let texture_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} texture layout", source.name)),
                entries: &texture_entries,
            });
        let layout =
            basic::mk_program_layout(&self.device, &uniform_layout, &texture_layout, &source.name);

        let program = ProgramHandle(self.programs.len() as u32);
        self.programs.push(GpuProgram {
            name: source.name.clone(),
            vertex,
            fragment,
            staging: vec![0; block.size as usize],
            block,
            texture_units,
            uniform_layout,
            texture_layout,
            layout,
            uniform_group: None,
        });
        Ok(program)
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> UniformLocation {
        self.programs
            .get(program.0 as usize)
            .and_then(|p| p.block.location(name))
            .map_or(UniformLocation::INVALID, |i| UniformLocation(i as i32))
    }

    fn create_texture(&mut self, data: &TextureData) -> anyhow::Result<TextureHandle> {
        if data.width == 0 || data.height == 0 {
            bail!("texture has no pixels");
        }
        let label = format!("texture {}", self.textures.len());
        let texture = upload_texture(&self.device, &self.queue, data, &label);
        self.textures.push(texture);
        Ok(TextureHandle(self.textures.len() as u32 - 1))
    }

    fn create_vertex_array(
        &mut self,
        vertices: &[f32],
        layout: &VertexLayout,
    ) -> anyhow::Result<VertexArrayHandle> {
        if layout.stride() == 0 || vertices.len() % layout.stride() != 0 {
            bail!("vertex stream does not match its layout");
        }
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        self.vertex_arrays.push(GpuVertexArray {
            buffer,
            attributes: basic::vertex_attributes(layout),
            layout: layout.clone(),
        });
        Ok(VertexArrayHandle(self.vertex_arrays.len() as u32 - 1))
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.clear_color = wgpu::Color {
            r: color[0] as f64,
            g: color[1] as f64,
            b: color[2] as f64,
            a: color[3] as f64,
        };
        self.packets.clear();
        self.frame_uniforms.clear();
    }

    fn use_program(&mut self, program: ProgramHandle) {
        assert!(
            (program.0 as usize) < self.programs.len(),
            "program {program:?} was never compiled"
        );
        self.current_program = Some(program);
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        let program = self.current();
        let Some(index) = location.index() else {
            panic!("write to an invalid uniform location");
        };
        if let Err(err) = program.block.write(&mut program.staging, index, value) {
            panic!("program {}: {err:#}", program.name);
        }
    }

    fn set_uniform_vec3_array(&mut self, location: UniformLocation, values: &[[f32; 3]]) {
        let program = self.current();
        let Some(index) = location.index() else {
            panic!("write to an invalid uniform location");
        };
        if let Err(err) = program
            .block
            .write_vec3_array(&mut program.staging, index, values)
        {
            panic!("program {}: {err:#}", program.name);
        }
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        assert!(
            (vertex_array.0 as usize) < self.vertex_arrays.len(),
            "vertex array {vertex_array:?} was never created"
        );
        self.current_vertex_array = Some(vertex_array);
    }

    fn bind_texture(&mut self, unit: usize, texture: TextureHandle) {
        assert!(
            (texture.0 as usize) < self.textures.len(),
            "texture {texture:?} was never created"
        );
        self.units[unit] = Some(texture);
    }

    fn unbind_texture(&mut self, unit: usize) {
        self.units[unit] = None;
    }

    fn draw_arrays(&mut self, vertex_count: u32) {
        let (Some(program), Some(vertex_array)) = (self.current_program, self.current_vertex_array)
        else {
            panic!("draw without a program and a vertex array");
        };
        let gpu_program = &self.programs[program.0 as usize];
        let uniform_offset = self.frame_uniforms.len().next_multiple_of(self.uniform_alignment);
        self.frame_uniforms.resize(uniform_offset, 0);
        self.frame_uniforms.extend_from_slice(&gpu_program.staging);
        let textures = gpu_program
            .texture_units
            .iter()
            .map(|unit| self.units[*unit])
            .collect();
        self.packets.push(DrawPacket {
            program,
            vertex_array,
            textures,
            uniform_offset: uniform_offset as u32,
            vertex_count,
        });
    }
}

fn create_uniform_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Uniform Buffer"),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_depth_view(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width: config.width.max(1),
        height: config.height.max(1),
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[DEPTH_FORMAT],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    data: &TextureData,
    label: &str,
) -> GpuTexture {
    let rgba = data.to_rgba8();
    let size = wgpu::Extent3d {
        width: data.width,
        height: data.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            aspect: wgpu::TextureAspect::All,
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
        },
        &rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * data.width),
            rows_per_image: Some(data.height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture { texture, view }
}
