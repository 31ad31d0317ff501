// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use wgpu::{
    BindGroup, BindGroupLayout, Buffer, BufferUsages, CommandEncoderDescriptor,
    ComputePassDescriptor, ComputePipeline, Device, PipelineCompilationOptions, Queue, Texture,
    TextureAspect, TextureUsages, TextureView, TextureViewDimension,
};

use nublur_shaders::{BindType, BlendMode, ComputeShader, RenderShader};

use crate::barrier::MipStates;
use crate::recording::{
    Command, ImageFormat, ImageProxy, Recording, ResourceId, ResourceProxy, ShaderId,
};
use crate::{Error, Result};

#[derive(Default)]
pub(crate) struct WgpuEngine {
    shaders: Vec<Shader>,
    pool: ResourcePool,
    bind_map: BindMap,
    /// Mirror of the recorder's state machine. wgpu inserts the real hazard
    /// barriers; replaying the recorded transitions here catches recordings
    /// whose ordering the recorder got wrong.
    states: MipStates,
    downloads: HashMap<(ResourceId, u32), ImageDownload>,
    sampler: Option<wgpu::Sampler>,
}

/// The two color formats render pipelines are built for.
const RENDER_FORMATS: [ImageFormat; 2] = [ImageFormat::Rgba8, ImageFormat::Bgra8];

struct RenderPipelines {
    /// One pipeline per entry of [`RENDER_FORMATS`].
    variants: [wgpu::RenderPipeline; 2],
}

impl RenderPipelines {
    fn for_format(&self, format: ImageFormat) -> &wgpu::RenderPipeline {
        match format {
            ImageFormat::Rgba8 => &self.variants[0],
            ImageFormat::Bgra8 => &self.variants[1],
        }
    }
}

enum PipelineState {
    Compute(ComputePipeline),
    Render(RenderPipelines),
}

struct Shader {
    label: String,
    bindings: Vec<BindType>,
    pipeline: PipelineState,
    bind_group_layout: BindGroupLayout,
}

pub(crate) enum ExternalResource<'a> {
    Image(ImageProxy, &'a TextureView),
}

/// One mip level copied out to a mappable buffer.
pub struct ImageDownload {
    pub buffer: Buffer,
    pub width: u32,
    pub height: u32,
    /// Row stride in the buffer; rows are padded up to
    /// [`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`].
    pub padded_bytes_per_row: u32,
}

struct BindMapImage {
    texture: Texture,
    /// One single-level view per mip, so neighboring levels of one texture
    /// can be sampled and written in the same pass.
    mip_views: Vec<TextureView>,
}

#[derive(Default)]
struct BindMap {
    buf_map: HashMap<ResourceId, (Buffer, &'static str)>,
    image_map: HashMap<ResourceId, BindMapImage>,
}

#[derive(Hash, PartialEq, Eq)]
struct BufferProperties {
    size: u64,
    usages: BufferUsages,
    name: &'static str,
}

#[derive(Default)]
struct ResourcePool {
    bufs: HashMap<BufferProperties, Vec<Buffer>>,
}

/// Short-lifetime resources scoped to a single `run_recording()` call,
/// currently just the external images the caller passed in.
#[derive(Default)]
struct TransientBindMap<'a> {
    images: HashMap<ResourceId, &'a TextureView>,
}

impl WgpuEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_compute_shader(
        &mut self,
        device: &Device,
        shader: &ComputeShader<'static>,
    ) -> Result<ShaderId> {
        let label = format!("nublur.{}", shader.name);
        let module = create_shader_module(device, &label, &shader.wgsl);
        let entries = create_bind_group_layout_entries(
            shader.bindings.iter().map(|b| (*b, wgpu::ShaderStages::COMPUTE)),
        );
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: None,
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: None,
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(shader.entry_point),
            compilation_options: PipelineCompilationOptions {
                zero_initialize_workgroup_memory: false,
                ..Default::default()
            },
            cache: None,
        });
        Ok(self.add(Shader {
            label,
            bindings: shader.bindings.to_vec(),
            pipeline: PipelineState::Compute(pipeline),
            bind_group_layout,
        }))
    }

    pub fn add_render_shader(
        &mut self,
        device: &Device,
        shader: &RenderShader<'static>,
    ) -> Result<ShaderId> {
        let label = format!("nublur.{}", shader.name);
        let module = create_shader_module(device, &label, &shader.wgsl);
        let entries = create_bind_group_layout_entries(
            shader
                .bindings
                .iter()
                .map(|b| (*b, wgpu::ShaderStages::FRAGMENT)),
        );
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: None,
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: None,
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let blend = match shader.blend {
            BlendMode::Replace => None,
            BlendMode::NonPremultipliedOver => Some(wgpu::BlendState::ALPHA_BLENDING),
        };
        let variants = RENDER_FORMATS.map(|format| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some(shader.vertex_entry),
                    buffers: &[],
                    compilation_options: PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(shader.fragment_entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: format.to_wgpu(),
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        });
        Ok(self.add(Shader {
            label,
            bindings: shader.bindings.to_vec(),
            pipeline: PipelineState::Render(RenderPipelines { variants }),
            bind_group_layout,
        }))
    }

    fn add(&mut self, shader: Shader) -> ShaderId {
        let id = ShaderId(self.shaders.len());
        self.shaders.push(shader);
        id
    }

    pub fn run_recording(
        &mut self,
        device: &Device,
        queue: &Queue,
        recording: &Recording,
        external_resources: &[ExternalResource<'_>],
        label: &'static str,
    ) -> Result<()> {
        let mut free_bufs: HashSet<ResourceId> = HashSet::default();
        let mut free_images: HashSet<ResourceId> = HashSet::default();
        let transient_map = TransientBindMap::new(external_resources);
        // Cloned out of self so bind group creation below can borrow the
        // bind map mutably; a sampler is a cheap handle.
        let sampler = self.sampler(device).clone();

        let mut encoder =
            device.create_command_encoder(&CommandEncoderDescriptor { label: Some(label) });
        for command in &recording.commands {
            match command {
                Command::UploadUniform(buf_proxy, bytes) => {
                    let usage = BufferUsages::UNIFORM | BufferUsages::COPY_DST;
                    let buf = self
                        .pool
                        .get_buf(buf_proxy.size, buf_proxy.name, usage, device);
                    queue.write_buffer(&buf, 0, bytes);
                    self.bind_map
                        .buf_map
                        .insert(buf_proxy.id, (buf, buf_proxy.name));
                }
                Command::UploadImage(image_proxy, bytes) => {
                    let image = self.bind_map.get_or_create_image(*image_proxy, device);
                    queue.write_texture(
                        wgpu::TexelCopyTextureInfo {
                            texture: &image.texture,
                            mip_level: 0,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: TextureAspect::All,
                        },
                        bytes,
                        wgpu::TexelCopyBufferLayout {
                            offset: 0,
                            bytes_per_row: Some(image_proxy.width * 4),
                            rows_per_image: None,
                        },
                        wgpu::Extent3d {
                            width: image_proxy.width,
                            height: image_proxy.height,
                            depth_or_array_layers: 1,
                        },
                    );
                    self.states
                        .seed(*image_proxy, 0, crate::barrier::ResourceState::ShaderRead);
                }
                Command::Barrier(transitions) => {
                    for transition in transitions {
                        self.states.apply(transition)?;
                    }
                }
                Command::Dispatch(shader_id, wg_size, bindings) => {
                    let (x, y, z) = *wg_size;
                    self.check_binding_states(*shader_id, bindings)?;
                    let shader = &self.shaders[shader_id.0];
                    let bind_group = create_bind_group(
                        &transient_map,
                        &mut self.bind_map,
                        &sampler,
                        device,
                        &shader.bind_group_layout,
                        bindings,
                    )?;
                    let mut cpass = encoder.begin_compute_pass(&ComputePassDescriptor::default());
                    let PipelineState::Compute(pipeline) = &shader.pipeline else {
                        panic!("cannot issue a dispatch with a render pipeline");
                    };
                    cpass.set_pipeline(pipeline);
                    cpass.set_bind_group(0, &bind_group, &[]);
                    cpass.dispatch_workgroups(x, y, z);
                }
                Command::Draw(draw_params) => {
                    self.check_binding_states(draw_params.shader_id, &draw_params.resources)?;
                    self.states.expect(
                        draw_params.target,
                        draw_params.target_level,
                        crate::barrier::ResourceState::ColorTarget,
                    )?;
                    let shader = &self.shaders[draw_params.shader_id.0];
                    let bind_group = create_bind_group(
                        &transient_map,
                        &mut self.bind_map,
                        &sampler,
                        device,
                        &shader.bind_group_layout,
                        &draw_params.resources,
                    )?;
                    let render_target = transient_map.mip_view(
                        &self.bind_map,
                        draw_params.target,
                        draw_params.target_level,
                    )?;
                    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: None,
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: render_target,
                            depth_slice: None,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: match draw_params.clear_color {
                                    Some(c) => wgpu::LoadOp::Clear(wgpu::Color {
                                        r: c[0] as f64,
                                        g: c[1] as f64,
                                        b: c[2] as f64,
                                        a: c[3] as f64,
                                    }),
                                    None => wgpu::LoadOp::Load,
                                },
                                store: wgpu::StoreOp::Store,
                            },
                        })],
                        depth_stencil_attachment: None,
                        occlusion_query_set: None,
                        timestamp_writes: None,
                    });
                    let PipelineState::Render(pipelines) = &shader.pipeline else {
                        panic!("cannot issue a draw with a compute pipeline");
                    };
                    rpass.set_pipeline(pipelines.for_format(draw_params.target.format));
                    rpass.set_bind_group(0, &bind_group, &[]);
                    rpass.draw(0..3, 0..1);
                }
                Command::CopyImage {
                    src,
                    src_level,
                    dst,
                    dst_level,
                } => {
                    self.states
                        .expect(*src, *src_level, crate::barrier::ResourceState::CopySrc)?;
                    self.states
                        .expect(*dst, *dst_level, crate::barrier::ResourceState::CopyDst)?;
                    self.bind_map.get_or_create_image(*src, device);
                    self.bind_map.get_or_create_image(*dst, device);
                    let src_tex = &self.bind_map.image_map[&src.id].texture;
                    let dst_tex = &self.bind_map.image_map[&dst.id].texture;
                    encoder.copy_texture_to_texture(
                        wgpu::TexelCopyTextureInfo {
                            texture: src_tex,
                            mip_level: *src_level,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: TextureAspect::All,
                        },
                        wgpu::TexelCopyTextureInfo {
                            texture: dst_tex,
                            mip_level: *dst_level,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: TextureAspect::All,
                        },
                        wgpu::Extent3d {
                            width: (src.width >> src_level).max(1),
                            height: (src.height >> src_level).max(1),
                            depth_or_array_layers: 1,
                        },
                    );
                }
                Command::Download(proxy, level) => {
                    self.states
                        .expect(*proxy, *level, crate::barrier::ResourceState::CopySrc)?;
                    let image = self.bind_map.get_or_create_image(*proxy, device);
                    let width = (proxy.width >> level).max(1);
                    let height = (proxy.height >> level).max(1);
                    let padded_bytes_per_row =
                        (width * 4).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
                    let size = u64::from(padded_bytes_per_row) * u64::from(height);
                    let usage = BufferUsages::MAP_READ | BufferUsages::COPY_DST;
                    let buf = self.pool.get_buf(size, "download", usage, device);
                    encoder.copy_texture_to_buffer(
                        wgpu::TexelCopyTextureInfo {
                            texture: &image.texture,
                            mip_level: *level,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: TextureAspect::All,
                        },
                        wgpu::TexelCopyBufferInfo {
                            buffer: &buf,
                            layout: wgpu::TexelCopyBufferLayout {
                                offset: 0,
                                bytes_per_row: Some(padded_bytes_per_row),
                                rows_per_image: None,
                            },
                        },
                        wgpu::Extent3d {
                            width,
                            height,
                            depth_or_array_layers: 1,
                        },
                    );
                    self.downloads.insert(
                        (proxy.id, *level),
                        ImageDownload {
                            buffer: buf,
                            width,
                            height,
                            padded_bytes_per_row,
                        },
                    );
                }
                Command::FreeBuffer(proxy) => {
                    free_bufs.insert(proxy.id);
                }
                Command::FreeImage(proxy) => {
                    free_images.insert(proxy.id);
                }
            }
        }
        queue.submit(Some(encoder.finish()));
        for id in free_bufs {
            if let Some((buf, label)) = self.bind_map.buf_map.remove(&id) {
                let props = BufferProperties {
                    size: buf.size(),
                    usages: buf.usage(),
                    name: label,
                };
                self.pool.bufs.entry(props).or_default().push(buf);
            }
        }
        for id in free_images {
            // TODO: have a pool to avoid needless re-allocation
            self.bind_map.image_map.remove(&id);
            self.states.forget(id);
        }
        Ok(())
    }

    pub fn take_download(&mut self, image: ImageProxy, level: u32) -> Option<ImageDownload> {
        self.downloads.remove(&(image.id, level))
    }

    /// Checks every bound mip against the access its binding slot implies.
    fn check_binding_states(&mut self, shader_id: ShaderId, bindings: &[ResourceProxy]) -> Result<()> {
        use crate::barrier::ResourceState;
        debug_assert_eq!(self.shaders[shader_id.0].bindings.len(), bindings.len());
        for index in 0..bindings.len() {
            let ty = self.shaders[shader_id.0].bindings[index];
            if let ResourceProxy::ImageMip { image, level } = bindings[index] {
                let required = match ty {
                    BindType::ImageRead => ResourceState::ShaderRead,
                    BindType::Image => ResourceState::StorageWrite,
                    _ => panic!("image bound to a non-image slot"),
                };
                self.states.expect(image, level, required)?;
            }
        }
        Ok(())
    }

    fn sampler(&mut self, device: &Device) -> &wgpu::Sampler {
        self.sampler.get_or_insert_with(|| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("nublur.linear_clamp"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                ..Default::default()
            })
        })
    }
}

fn create_shader_module(device: &Device, label: &str, wgsl: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(wgsl.into()),
    })
}

fn create_bind_group_layout_entries(
    layout: impl Iterator<Item = (BindType, wgpu::ShaderStages)>,
) -> Vec<wgpu::BindGroupLayoutEntry> {
    layout
        .enumerate()
        .map(|(i, (bind_type, visibility))| match bind_type {
            BindType::Uniform => wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            BindType::ImageRead => wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            // Storage targets are always the working pyramid's format; BGRA
            // output goes through the raster path instead.
            BindType::Image => wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    view_dimension: TextureViewDimension::D2,
                },
                count: None,
            },
            BindType::Sampler => wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        })
        .collect::<Vec<_>>()
}

fn create_bind_group(
    transient_map: &TransientBindMap<'_>,
    bind_map: &mut BindMap,
    sampler: &wgpu::Sampler,
    device: &Device,
    layout: &BindGroupLayout,
    bindings: &[ResourceProxy],
) -> Result<BindGroup> {
    for proxy in bindings {
        if let ResourceProxy::ImageMip { image, .. } = proxy {
            if !transient_map.images.contains_key(&image.id) {
                bind_map.get_or_create_image(*image, device);
            }
        }
    }
    let mut entries = Vec::with_capacity(bindings.len());
    for (i, proxy) in bindings.iter().enumerate() {
        let resource = match proxy {
            ResourceProxy::Buffer(proxy) => {
                let (buf, _) = bind_map
                    .buf_map
                    .get(&proxy.id)
                    .ok_or(Error::UnavailableResourceUsed(proxy.name, "bind group"))?;
                buf.as_entire_binding()
            }
            ResourceProxy::ImageMip { image, level } => {
                let view = transient_map
                    .images
                    .get(&image.id)
                    .copied()
                    .or_else(|| {
                        bind_map
                            .image_map
                            .get(&image.id)
                            .map(|img| &img.mip_views[*level as usize])
                    })
                    .ok_or(Error::UnavailableResourceUsed("image", "bind group"))?;
                wgpu::BindingResource::TextureView(view)
            }
            ResourceProxy::Sampler => wgpu::BindingResource::Sampler(sampler),
        };
        entries.push(wgpu::BindGroupEntry {
            binding: i as u32,
            resource,
        });
    }
    Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: None,
        layout,
        entries: &entries,
    }))
}

impl BindMap {
    fn get_or_create_image(&mut self, proxy: ImageProxy, device: &Device) -> &BindMapImage {
        match self.image_map.entry(proxy.id) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                let format = proxy.format.to_wgpu();
                let mut usage = TextureUsages::TEXTURE_BINDING
                    | TextureUsages::COPY_DST
                    | TextureUsages::COPY_SRC
                    | TextureUsages::RENDER_ATTACHMENT;
                // `Bgra8Unorm` storage requires an optional feature, so BGRA
                // images stay sample/attach only.
                if proxy.format == ImageFormat::Rgba8 {
                    usage |= TextureUsages::STORAGE_BINDING;
                }
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: None,
                    size: wgpu::Extent3d {
                        width: proxy.width,
                        height: proxy.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: proxy.mip_levels,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    usage,
                    format,
                    view_formats: &[],
                });
                let mip_views = (0..proxy.mip_levels)
                    .map(|level| {
                        texture.create_view(&wgpu::TextureViewDescriptor {
                            label: None,
                            usage: None,
                            dimension: Some(TextureViewDimension::D2),
                            aspect: TextureAspect::All,
                            mip_level_count: Some(1),
                            base_mip_level: level,
                            base_array_layer: 0,
                            array_layer_count: None,
                            format: Some(format),
                        })
                    })
                    .collect();
                vacant.insert(BindMapImage { texture, mip_views })
            }
        }
    }
}

const SIZE_CLASS_BITS: u32 = 1;

impl ResourcePool {
    /// Get a buffer from the pool or create one.
    fn get_buf(
        &mut self,
        size: u64,
        name: &'static str,
        usage: BufferUsages,
        device: &Device,
    ) -> Buffer {
        let rounded_size = Self::size_class(size, SIZE_CLASS_BITS);
        let props = BufferProperties {
            size: rounded_size,
            usages: usage,
            name,
        };
        if let Some(buf_vec) = self.bufs.get_mut(&props) {
            if let Some(buf) = buf_vec.pop() {
                return buf;
            }
        }
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(name),
            size: rounded_size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Quantize a size up to the nearest size class.
    fn size_class(x: u64, bits: u32) -> u64 {
        if x > 1 << bits {
            let a = (x - 1).leading_zeros();
            let b = (x - 1) | (((u64::MAX / 2) >> bits) >> a);
            b + 1
        } else {
            1 << bits
        }
    }
}

impl<'a> TransientBindMap<'a> {
    /// Create new transient bind map, seeded from external resources.
    fn new(external_resources: &'a [ExternalResource<'_>]) -> Self {
        let mut images = HashMap::default();
        for resource in external_resources {
            match resource {
                ExternalResource::Image(proxy, gpu_image) => {
                    images.insert(proxy.id, *gpu_image);
                }
            }
        }
        TransientBindMap { images }
    }

    /// Resolves a draw target to a view, preferring external resources.
    fn mip_view(
        &self,
        bind_map: &'a BindMap,
        image: ImageProxy,
        level: u32,
    ) -> Result<&'a TextureView> {
        if let Some(view) = self.images.get(&image.id) {
            return Ok(view);
        }
        bind_map
            .image_map
            .get(&image.id)
            .map(|img| &img.mip_views[level as usize])
            .ok_or(Error::UnavailableResourceUsed("render target", "draw"))
    }
}

#[cfg(test)]
mod tests {
    use super::ResourcePool;

    #[test]
    fn size_classes_round_up() {
        assert_eq!(ResourcePool::size_class(2, 1), 2);
        assert_eq!(ResourcePool::size_class(3, 1), 3);
        assert_eq!(ResourcePool::size_class(33, 1), 48);
        assert_eq!(ResourcePool::size_class(257, 1), 384);
    }
}
