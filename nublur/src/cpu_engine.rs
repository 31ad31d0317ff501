// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A CPU executor for recordings.
//!
//! Runs the same command streams the GPU engine consumes, backed by the CPU
//! shader twins from `nublur_shaders`. Every recorded barrier is replayed
//! against the engine's own state tracker, so a recording with a missing or
//! misordered transition fails here instead of silently reading stale mips.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;

use nublur_shaders::cpu::{CpuBinding, CpuComputeShader, CpuFragmentShader, CpuTexture};
use nublur_shaders::{BindType, BlendMode, ComputeShader, RenderShader};

use crate::barrier::{MipStates, ResourceState};
use crate::recording::{
    Command, DrawParams, ImageFormat, ImageProxy, Recording, ResourceId, ResourceProxy, ShaderId,
};
use crate::{Error, Result};

#[derive(Clone, Copy)]
enum CpuShaderKind {
    Compute(CpuComputeShader),
    Fragment {
        shader: CpuFragmentShader,
        blend: BlendMode,
    },
}

struct CpuShader {
    bindings: Vec<BindType>,
    kind: CpuShaderKind,
}

#[derive(Default)]
struct BindMap {
    buffers: HashMap<ResourceId, Vec<u8>>,
    /// One f32 texture per mip level, materialized zeroed on first use.
    images: HashMap<ResourceId, Vec<RefCell<CpuTexture>>>,
}

impl BindMap {
    fn materialize_image(&mut self, proxy: ImageProxy) -> Result<&[RefCell<CpuTexture>]> {
        if proxy.format != ImageFormat::Rgba8 {
            return Err(Error::UnsupportedFormat(proxy.format));
        }
        Ok(self.images.entry(proxy.id).or_insert_with(|| {
            (0..proxy.mip_levels)
                .map(|level| {
                    let width = (proxy.width >> level).max(1) as usize;
                    let height = (proxy.height >> level).max(1) as usize;
                    RefCell::new(CpuTexture::new(width, height))
                })
                .collect()
        }))
    }

    fn buffer(&self, proxy: &crate::recording::BufferProxy) -> Result<&[u8]> {
        self.buffers
            .get(&proxy.id)
            .map(Vec::as_slice)
            .ok_or(Error::UnavailableResourceUsed(proxy.name, "binding"))
    }

    fn mip(&self, image: ImageProxy, level: u32) -> Result<&RefCell<CpuTexture>> {
        self.images
            .get(&image.id)
            .and_then(|mips| mips.get(level as usize))
            .ok_or(Error::UnavailableResourceUsed("image", "binding"))
    }
}

/// Executes recordings entirely on the CPU.
#[derive(Default)]
pub struct CpuEngine {
    shaders: Vec<CpuShader>,
    bind_map: BindMap,
    states: MipStates,
    downloads: HashMap<(ResourceId, u32), Vec<u8>>,
}

impl CpuEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_compute_shader(
        &mut self,
        shader: &ComputeShader<'_>,
        f: CpuComputeShader,
    ) -> ShaderId {
        let id = ShaderId(self.shaders.len());
        self.shaders.push(CpuShader {
            bindings: shader.bindings.to_vec(),
            kind: CpuShaderKind::Compute(f),
        });
        id
    }

    pub fn add_render_shader(
        &mut self,
        shader: &RenderShader<'_>,
        f: CpuFragmentShader,
    ) -> ShaderId {
        let id = ShaderId(self.shaders.len());
        self.shaders.push(CpuShader {
            bindings: shader.bindings.to_vec(),
            kind: CpuShaderKind::Fragment {
                shader: f,
                blend: shader.blend,
            },
        });
        id
    }

    pub fn run_recording(&mut self, recording: &Recording) -> Result<()> {
        for command in &recording.commands {
            match command {
                Command::UploadUniform(proxy, data) => {
                    self.bind_map.buffers.insert(proxy.id, data.clone());
                }
                Command::UploadImage(proxy, data) => {
                    let mips = self.bind_map.materialize_image(*proxy)?;
                    mips[0].replace(CpuTexture::from_rgba8(
                        proxy.width as usize,
                        proxy.height as usize,
                        data,
                    ));
                    self.states.seed(*proxy, 0, ResourceState::ShaderRead);
                }
                Command::Barrier(transitions) => {
                    for transition in transitions {
                        self.bind_map.materialize_image(transition.image)?;
                        self.states.apply(transition)?;
                    }
                }
                Command::Dispatch(shader_id, wg_count, resources) => {
                    self.dispatch(*shader_id, *wg_count, resources)?;
                }
                Command::Draw(params) => {
                    self.draw(params)?;
                }
                Command::CopyImage {
                    src,
                    src_level,
                    dst,
                    dst_level,
                } => {
                    self.bind_map.materialize_image(*src)?;
                    self.bind_map.materialize_image(*dst)?;
                    self.states.expect(*src, *src_level, ResourceState::CopySrc)?;
                    self.states.expect(*dst, *dst_level, ResourceState::CopyDst)?;
                    let src_tex = self.bind_map.mip(*src, *src_level)?.borrow();
                    let mut dst_tex = self.bind_map.mip(*dst, *dst_level)?.borrow_mut();
                    assert_eq!(
                        (src_tex.width, src_tex.height),
                        (dst_tex.width, dst_tex.height),
                        "copy between mismatched extents"
                    );
                    dst_tex.pixels.copy_from_slice(&src_tex.pixels);
                }
                Command::Download(proxy, level) => {
                    self.states.expect(*proxy, *level, ResourceState::CopySrc)?;
                    let tex = self.bind_map.mip(*proxy, *level)?.borrow();
                    self.downloads.insert((proxy.id, *level), tex.to_rgba8());
                }
                Command::FreeBuffer(proxy) => {
                    self.bind_map.buffers.remove(&proxy.id);
                }
                Command::FreeImage(proxy) => {
                    self.bind_map.images.remove(&proxy.id);
                    self.states.forget(proxy.id);
                }
            }
        }
        Ok(())
    }

    /// Takes a completed download, as tightly packed `rgba8` rows.
    pub fn take_download(&mut self, image: ImageProxy, level: u32) -> Option<Vec<u8>> {
        self.downloads.remove(&(image.id, level))
    }

    fn dispatch(
        &mut self,
        shader_id: ShaderId,
        wg_count: (u32, u32, u32),
        resources: &[ResourceProxy],
    ) -> Result<()> {
        let CpuShaderKind::Compute(f) = self.shaders[shader_id.0].kind else {
            panic!("dispatch of a render shader");
        };
        self.prepare_bindings(shader_id, resources)?;
        let shader = &self.shaders[shader_id.0];
        let sampled = collect_sampled(&self.bind_map, &shader.bindings, resources)?;
        let bindings = build_bindings(&self.bind_map, &shader.bindings, resources, &sampled)?;
        f([wg_count.0, wg_count.1, wg_count.2], &bindings);
        Ok(())
    }

    fn draw(&mut self, params: &DrawParams) -> Result<()> {
        let CpuShaderKind::Fragment { shader: f, blend } = self.shaders[params.shader_id.0].kind
        else {
            panic!("draw of a compute shader");
        };
        self.prepare_bindings(params.shader_id, &params.resources)?;
        self.bind_map.materialize_image(params.target)?;
        self.states
            .expect(params.target, params.target_level, ResourceState::ColorTarget)?;

        let shader = &self.shaders[params.shader_id.0];
        let sampled = collect_sampled(&self.bind_map, &shader.bindings, &params.resources)?;
        let bindings = build_bindings(&self.bind_map, &shader.bindings, &params.resources, &sampled)?;

        let mut target = self
            .bind_map
            .mip(params.target, params.target_level)?
            .borrow_mut();
        if let Some(clear) = params.clear_color {
            target.pixels.fill(clear);
        }
        let (width, height) = (target.width, target.height);
        for y in 0..height {
            for x in 0..width {
                let uv = [
                    (x as f32 + 0.5) / width as f32,
                    (y as f32 + 0.5) / height as f32,
                ];
                let src = f(uv, &bindings);
                let merged = match blend {
                    BlendMode::Replace => src,
                    BlendMode::NonPremultipliedOver => {
                        let dst = target.texel(x, y);
                        let alpha = src[3];
                        [
                            src[0] * alpha + dst[0] * (1.0 - alpha),
                            src[1] * alpha + dst[1] * (1.0 - alpha),
                            src[2] * alpha + dst[2] * (1.0 - alpha),
                            src[3] + dst[3] * (1.0 - alpha),
                        ]
                    }
                };
                target.set_texel(x, y, merged);
            }
        }
        Ok(())
    }

    /// Materializes every bound image and checks mip states against the
    /// access each binding slot implies.
    fn prepare_bindings(&mut self, shader_id: ShaderId, resources: &[ResourceProxy]) -> Result<()> {
        debug_assert_eq!(self.shaders[shader_id.0].bindings.len(), resources.len());
        for index in 0..resources.len() {
            let ty = self.shaders[shader_id.0].bindings[index];
            if let ResourceProxy::ImageMip { image, level } = resources[index] {
                self.bind_map.materialize_image(image)?;
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
}

fn collect_sampled<'a>(
    bind_map: &'a BindMap,
    bindings: &[BindType],
    resources: &[ResourceProxy],
) -> Result<Vec<Ref<'a, CpuTexture>>> {
    let mut sampled = Vec::new();
    for (ty, resource) in bindings.iter().zip(resources) {
        if let (BindType::ImageRead, ResourceProxy::ImageMip { image, level }) = (ty, resource) {
            sampled.push(bind_map.mip(*image, *level)?.borrow());
        }
    }
    Ok(sampled)
}

fn build_bindings<'a>(
    bind_map: &'a BindMap,
    bindings: &[BindType],
    resources: &[ResourceProxy],
    sampled: &'a [Ref<'a, CpuTexture>],
) -> Result<Vec<CpuBinding<'a>>> {
    let mut out = Vec::with_capacity(resources.len());
    let mut next_sampled = 0;
    for (ty, resource) in bindings.iter().zip(resources) {
        out.push(match (ty, resource) {
            (BindType::Uniform, ResourceProxy::Buffer(proxy)) => {
                CpuBinding::Buffer(bind_map.buffer(proxy)?)
            }
            (BindType::Sampler, ResourceProxy::Sampler) => CpuBinding::Sampler,
            (BindType::ImageRead, ResourceProxy::ImageMip { .. }) => {
                let tex = &*sampled[next_sampled];
                next_sampled += 1;
                CpuBinding::Texture(tex)
            }
            (BindType::Image, ResourceProxy::ImageMip { image, level }) => {
                CpuBinding::TextureRW(bind_map.mip(*image, *level)?)
            }
            _ => panic!("recorded resource does not match its shader binding"),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_roundtrips_an_upload() {
        let mut engine = CpuEngine::new();
        let mut recording = Recording::default();
        let data: Vec<u8> = (0..2 * 2 * 4).map(|i| i as u8 * 10).collect();
        let image = recording.upload_image(2, 2, ImageFormat::Rgba8, data.clone());

        let mut states = MipStates::new();
        states.seed(image, 0, ResourceState::ShaderRead);
        let transitions = states
            .transition(image, 0, ResourceState::CopySrc)
            .into_iter()
            .collect();
        recording.barrier(transitions);
        recording.download(image, 0);

        engine.run_recording(&recording).unwrap();
        assert_eq!(engine.take_download(image, 0).unwrap(), data);
        assert!(engine.take_download(image, 0).is_none());
    }

    #[test]
    fn copy_without_barrier_is_rejected() {
        let mut engine = CpuEngine::new();
        let mut recording = Recording::default();
        let data = vec![255u8; 4 * 4 * 4];
        let src = recording.upload_image(4, 4, ImageFormat::Rgba8, data);
        let dst = ImageProxy::new(4, 4, 1, ImageFormat::Rgba8);
        recording.copy_image(src, 0, dst, 0);

        let err = engine.run_recording(&recording).unwrap_err();
        assert!(matches!(err, Error::WrongResourceState { .. }));
    }

    #[test]
    fn bgra_images_are_rejected() {
        let mut engine = CpuEngine::new();
        let mut recording = Recording::default();
        let data = vec![0u8; 4];
        recording.upload_image(1, 1, ImageFormat::Bgra8, data);
        let err = engine.run_recording(&recording).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ImageFormat::Bgra8)));
    }
}
