// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Takes the pyramid geometry and frame parameters and builds recordings for
//! the engines to run.

use nublur_encoding::{Falloff, GaussianParams, PyramidConfig};

use crate::barrier::{MipStates, ResourceState, Transition};
use crate::recording::{
    BufferProxy, Command, DrawParams, ImageFormat, ImageProxy, Recording, ResourceProxy,
};
use crate::shaders::FullShaders;
use crate::{BlurParams, Error, PipelineMode, Result};

/// How one pass of the V-cycle is issued.
#[derive(Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Dispatch,
    Draw,
}

/// Persistent images and recorder state for one source extent.
///
/// Two working pyramids are declared up front: `down` holds the reduction
/// chain when the reconstruction runs on compute (which cannot blend in
/// place), while `pyramid` receives the reconstruction in every mode. The
/// raster modes never touch `down`, and the engines only materialize images a
/// recording actually names, so the unused pyramid costs nothing.
#[derive(Debug)]
pub(crate) struct VCycle {
    config: PyramidConfig,
    falloff: Falloff,
    source: ImageProxy,
    down: ImageProxy,
    pyramid: ImageProxy,
    out: ImageProxy,
    states: MipStates,
}

impl VCycle {
    pub fn new(
        width: u32,
        height: u32,
        falloff: Falloff,
        out_format: ImageFormat,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EmptySourceImage);
        }
        let config = PyramidConfig::new(width, height);
        let num_levels = config.num_levels();
        Ok(Self {
            falloff,
            source: ImageProxy::new(width, height, 1, ImageFormat::Rgba8),
            down: ImageProxy::new(width, height, num_levels, ImageFormat::Rgba8),
            pyramid: ImageProxy::new(width, height, num_levels, ImageFormat::Rgba8),
            out: ImageProxy::new(width, height, 1, out_format),
            states: MipStates::new(),
            config,
        })
    }

    pub fn config(&self) -> &PyramidConfig {
        &self.config
    }

    pub fn out_image(&self) -> ImageProxy {
        self.out
    }

    /// Records the source upload. The upload is sequenced by the queue rather
    /// than the command stream, so the recorder seeds the state directly.
    pub fn record_upload(&mut self, data: &[u8]) -> Result<Recording> {
        let expected = self.source.width as usize * self.source.height as usize * 4;
        if data.len() != expected {
            return Err(Error::SourceSizeMismatch {
                expected,
                got: data.len(),
            });
        }
        let mut recording = Recording::default();
        recording.push(Command::UploadImage(self.source, data.to_vec()));
        self.states.seed(self.source, 0, ResourceState::ShaderRead);
        Ok(recording)
    }

    /// Records one full V-cycle for the given parameters and mode.
    ///
    /// The returned [`MipStates`] is the recorder's view of where the frame
    /// leaves every mip level; the caller passes it to [`adopt`] once the
    /// recording actually ran, so a failed frame leaves the tracked states
    /// untouched.
    ///
    /// [`adopt`]: VCycle::adopt
    pub fn record_frame(
        &self,
        shaders: &FullShaders,
        params: &BlurParams,
        mode: PipelineMode,
    ) -> (Recording, MipStates) {
        let sigma = if params.sigma < 0.0 {
            log::warn!("negative sigma {} clamped to 0", params.sigma);
            0.0
        } else {
            params.sigma
        };
        let num_levels = self.config.num_levels();
        let (down, up) = match mode {
            PipelineMode::Compute => (self.down, self.pyramid),
            PipelineMode::Graphics | PipelineMode::Hybrid => (self.pyramid, self.pyramid),
        };
        let down_kind = match mode {
            PipelineMode::Graphics => PassKind::Draw,
            PipelineMode::Compute | PipelineMode::Hybrid => PassKind::Dispatch,
        };
        let up_kind = match mode {
            PipelineMode::Compute => PassKind::Dispatch,
            PipelineMode::Graphics | PipelineMode::Hybrid => PassKind::Draw,
        };

        let mut frame = FrameBuilder {
            shaders,
            config: &self.config,
            recording: Recording::default(),
            states: self.states.clone(),
            uniforms: Vec::new(),
        };

        // Reduction chain. With a compute reconstruction the coarsest level
        // goes straight into the other pyramid, since that pass samples the
        // chain while writing its results next to it.
        let base_dst = if num_levels == 1 { up } else { down };
        frame.reduce(down_kind, self.source, 0, base_dst, 0);
        for level in 0..num_levels - 1 {
            let dst = if mode == PipelineMode::Compute && level + 1 == num_levels - 1 {
                up
            } else {
                down
            };
            frame.reduce(down_kind, down, level, dst, level + 1);
        }

        // Reconstruction, coarse to fine. The pass writing level 0 reads the
        // sharp source as its fine input instead of the reduced copy.
        for coarse_level in (1..num_levels).rev() {
            let level = coarse_level - 1;
            let gaussian = GaussianParams::new(params.focus, sigma, level, num_levels, self.falloff);
            frame.reconstruct(up_kind, gaussian, self.source, down, up, coarse_level);
        }

        // Resolve into the output image. Same-format output is a plain copy;
        // a BGRA output goes through the raster blit.
        if self.out.format == ImageFormat::Rgba8 {
            frame.barrier(&[
                (up, 0, ResourceState::CopySrc),
                (self.out, 0, ResourceState::CopyDst),
            ]);
            frame.recording.copy_image(up, 0, self.out, 0);
        } else {
            frame.barrier(&[
                (up, 0, ResourceState::ShaderRead),
                (self.out, 0, ResourceState::ColorTarget),
            ]);
            frame.recording.draw(DrawParams {
                shader_id: shaders.resample_draw,
                resources: vec![ResourceProxy::Sampler, up.mip(0)],
                target: self.out,
                target_level: 0,
                clear_color: None,
            });
        }

        frame.finish()
    }

    /// Records a download of the output image.
    ///
    /// Fails at execution time if no frame has been processed yet.
    pub fn record_readback(&self) -> (Recording, MipStates) {
        let mut recording = Recording::default();
        let mut states = self.states.clone();
        let transitions = states
            .transition(self.out, 0, ResourceState::CopySrc)
            .into_iter()
            .collect();
        recording.barrier(transitions);
        recording.download(self.out, 0);
        (recording, states)
    }

    /// Records a blit of the output image into a caller-owned target, such as
    /// a surface texture. The target is released at the end of the recording.
    #[cfg(any(feature = "wgpu", test))]
    pub fn record_blit(&self, shaders: &FullShaders, target: ImageProxy) -> (Recording, MipStates) {
        let mut recording = Recording::default();
        let mut states = self.states.clone();
        let transitions: Vec<Transition> = [
            states.transition(self.out, 0, ResourceState::ShaderRead),
            states.transition(target, 0, ResourceState::ColorTarget),
        ]
        .into_iter()
        .flatten()
        .collect();
        recording.barrier(transitions);
        recording.draw(DrawParams {
            shader_id: shaders.resample_draw,
            resources: vec![ResourceProxy::Sampler, self.out.mip(0)],
            target,
            target_level: 0,
            clear_color: None,
        });
        states.forget(target.id);
        recording.free_image(target);
        (recording, states)
    }

    /// Adopts the recorder states of a recording that ran successfully.
    pub fn adopt(&mut self, states: MipStates) {
        self.states = states;
    }
}

struct FrameBuilder<'a> {
    shaders: &'a FullShaders,
    config: &'a PyramidConfig,
    recording: Recording,
    states: MipStates,
    uniforms: Vec<BufferProxy>,
}

impl FrameBuilder<'_> {
    fn barrier(&mut self, accesses: &[(ImageProxy, u32, ResourceState)]) {
        let transitions: Vec<Transition> = accesses
            .iter()
            .filter_map(|&(image, level, to)| self.states.transition(image, level, to))
            .collect();
        self.recording.barrier(transitions);
    }

    /// One box reduction, `src_level` of `src` into `dst_level` of `dst`.
    fn reduce(
        &mut self,
        kind: PassKind,
        src: ImageProxy,
        src_level: u32,
        dst: ImageProxy,
        dst_level: u32,
    ) {
        match kind {
            PassKind::Dispatch => {
                self.barrier(&[
                    (src, src_level, ResourceState::ShaderRead),
                    (dst, dst_level, ResourceState::StorageWrite),
                ]);
                self.recording.dispatch(
                    self.shaders.resample,
                    self.config.workgroup_count(dst_level),
                    [
                        ResourceProxy::Sampler,
                        src.mip(src_level),
                        dst.mip(dst_level),
                    ],
                );
            }
            PassKind::Draw => {
                self.barrier(&[
                    (src, src_level, ResourceState::ShaderRead),
                    (dst, dst_level, ResourceState::ColorTarget),
                ]);
                self.recording.draw(DrawParams {
                    shader_id: self.shaders.resample_draw,
                    resources: vec![ResourceProxy::Sampler, src.mip(src_level)],
                    target: dst,
                    target_level: dst_level,
                    clear_color: None,
                });
            }
        }
    }

    /// One reconstruction pass, reading `coarse_level` of `up` and writing
    /// the next finer level.
    ///
    /// On compute this samples the reduced fine level explicitly; on raster
    /// the fine content is already sitting in the render target and the blend
    /// state folds it in. The pass writing level 0 mixes the sharp source
    /// instead and replaces the target outright.
    fn reconstruct(
        &mut self,
        kind: PassKind,
        gaussian: GaussianParams,
        source: ImageProxy,
        down: ImageProxy,
        up: ImageProxy,
        coarse_level: u32,
    ) {
        let level = coarse_level - 1;
        let final_pass = level == 0;
        let params = self
            .recording
            .upload_uniform("gaussian_params", bytemuck::bytes_of(&gaussian).to_vec());
        self.uniforms.push(params);
        match kind {
            PassKind::Dispatch => {
                let (fine, fine_level) = if final_pass { (source, 0) } else { (down, level) };
                self.barrier(&[
                    (fine, fine_level, ResourceState::ShaderRead),
                    (up, coarse_level, ResourceState::ShaderRead),
                    (up, level, ResourceState::StorageWrite),
                ]);
                self.recording.dispatch(
                    self.shaders.upsample,
                    self.config.workgroup_count(level),
                    [
                        ResourceProxy::from(params),
                        ResourceProxy::Sampler,
                        fine.mip(fine_level),
                        up.mip(coarse_level),
                        up.mip(level),
                    ],
                );
            }
            PassKind::Draw if final_pass => {
                self.barrier(&[
                    (source, 0, ResourceState::ShaderRead),
                    (up, coarse_level, ResourceState::ShaderRead),
                    (up, 0, ResourceState::ColorTarget),
                ]);
                self.recording.draw(DrawParams {
                    shader_id: self.shaders.upsample_final,
                    resources: vec![
                        ResourceProxy::from(params),
                        ResourceProxy::Sampler,
                        source.mip(0),
                        up.mip(coarse_level),
                    ],
                    target: up,
                    target_level: 0,
                    clear_color: None,
                });
            }
            PassKind::Draw => {
                self.barrier(&[
                    (up, coarse_level, ResourceState::ShaderRead),
                    (up, level, ResourceState::ColorTarget),
                ]);
                self.recording.draw(DrawParams {
                    shader_id: self.shaders.upsample_blend,
                    resources: vec![
                        ResourceProxy::from(params),
                        ResourceProxy::Sampler,
                        up.mip(coarse_level),
                    ],
                    target: up,
                    target_level: level,
                    clear_color: None,
                });
            }
        }
    }

    fn finish(mut self) -> (Recording, MipStates) {
        for params in self.uniforms.drain(..) {
            self.recording.free_buffer(params);
        }
        (self.recording, self.states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_engine::CpuEngine;
    use crate::shaders::full_shaders_cpu;

    fn count(recording: &Recording) -> (usize, usize, usize) {
        let mut dispatches = 0;
        let mut draws = 0;
        let mut copies = 0;
        for command in &recording.commands {
            match command {
                Command::Dispatch(..) => dispatches += 1,
                Command::Draw(_) => draws += 1,
                Command::CopyImage { .. } => copies += 1,
                _ => {}
            }
        }
        (dispatches, draws, copies)
    }

    fn frame(mode: PipelineMode) -> Recording {
        let mut engine = CpuEngine::new();
        let shaders = full_shaders_cpu(&mut engine);
        let vcycle = VCycle::new(8, 8, Falloff::default(), ImageFormat::Rgba8).unwrap();
        let params = BlurParams {
            focus: [0.0, 0.0],
            sigma: 4.0,
        };
        vcycle.record_frame(&shaders, &params, mode).0
    }

    // An 8x8 source has 4 levels: 4 reduction passes (one from the source),
    // 3 reconstruction passes, and the copy into the output image.
    #[test]
    fn compute_frame_is_all_dispatches() {
        assert_eq!(count(&frame(PipelineMode::Compute)), (7, 0, 1));
    }

    #[test]
    fn graphics_frame_is_all_draws() {
        assert_eq!(count(&frame(PipelineMode::Graphics)), (0, 7, 1));
    }

    #[test]
    fn hybrid_frame_mixes_both() {
        assert_eq!(count(&frame(PipelineMode::Hybrid)), (4, 3, 1));
    }

    #[test]
    fn one_pixel_source_degenerates_to_a_blit() {
        let mut engine = CpuEngine::new();
        let shaders = full_shaders_cpu(&mut engine);
        let vcycle = VCycle::new(1, 1, Falloff::default(), ImageFormat::Rgba8).unwrap();
        let params = BlurParams {
            focus: [0.0, 0.0],
            sigma: 100.0,
        };
        let (recording, _) = vcycle.record_frame(&shaders, &params, PipelineMode::Compute);
        assert_eq!(count(&recording), (1, 0, 1));
    }

    #[test]
    fn zero_extent_is_rejected() {
        let err = VCycle::new(16, 0, Falloff::default(), ImageFormat::Rgba8).unwrap_err();
        assert!(matches!(err, Error::EmptySourceImage));
    }

    #[test]
    fn zero_sigma_frame_reproduces_the_source() {
        let mut engine = CpuEngine::new();
        let shaders = full_shaders_cpu(&mut engine);
        let mut vcycle = VCycle::new(4, 4, Falloff::default(), ImageFormat::Rgba8).unwrap();
        let data: Vec<u8> = (0..4 * 4 * 4).map(|i| (i * 3) as u8).collect();
        let upload = vcycle.record_upload(&data).unwrap();
        engine.run_recording(&upload).unwrap();

        let params = BlurParams {
            focus: [0.0, 0.0],
            sigma: 0.0,
        };
        let (recording, states) = vcycle.record_frame(&shaders, &params, PipelineMode::Hybrid);
        engine.run_recording(&recording).unwrap();
        vcycle.adopt(states);

        let (readback, states) = vcycle.record_readback();
        engine.run_recording(&readback).unwrap();
        vcycle.adopt(states);
        let result = engine.take_download(vcycle.out_image(), 0).unwrap();
        assert_eq!(result, data);
    }

    #[test]
    fn blit_recording_draws_into_and_releases_the_target() {
        let mut engine = CpuEngine::new();
        let shaders = full_shaders_cpu(&mut engine);
        let mut vcycle = VCycle::new(4, 4, Falloff::default(), ImageFormat::Rgba8).unwrap();
        let data = vec![200_u8; 4 * 4 * 4];
        let upload = vcycle.record_upload(&data).unwrap();
        engine.run_recording(&upload).unwrap();
        let params = BlurParams {
            focus: [0.0, 0.0],
            sigma: 2.0,
        };
        let (frame, states) = vcycle.record_frame(&shaders, &params, PipelineMode::Hybrid);
        engine.run_recording(&frame).unwrap();
        vcycle.adopt(states);

        // Upscaling blit into a caller-owned image, released at the end.
        let target = ImageProxy::new(8, 8, 1, ImageFormat::Rgba8);
        let (blit, states) = vcycle.record_blit(&shaders, target);
        assert!(matches!(blit.commands.last(), Some(Command::FreeImage(_))));
        engine.run_recording(&blit).unwrap();
        vcycle.adopt(states);

        // The output image survives the blit and can still be read back.
        let (readback, states) = vcycle.record_readback();
        engine.run_recording(&readback).unwrap();
        vcycle.adopt(states);
        assert!(engine.take_download(vcycle.out_image(), 0).is_some());
    }

    #[test]
    fn upload_checks_data_size() {
        let mut vcycle = VCycle::new(4, 4, Falloff::default(), ImageFormat::Rgba8).unwrap();
        let err = vcycle.record_upload(&[0_u8; 7]).unwrap_err();
        assert!(matches!(
            err,
            Error::SourceSizeMismatch {
                expected: 64,
                got: 7
            }
        ));
    }
}
