// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pipeline registration.

#[cfg(feature = "wgpu")]
use wgpu::Device;

use crate::cpu_engine::CpuEngine;
use crate::recording::ShaderId;

#[cfg(feature = "wgpu")]
use crate::{wgpu_engine::WgpuEngine, Error};

/// Handles to every pipeline of the V-cycle.
pub struct FullShaders {
    /// Compute reduction step, also seeding the coarsest write level.
    pub resample: ShaderId,
    /// Raster reduction step.
    pub resample_draw: ShaderId,
    /// Compute reconstruction step.
    pub upsample: ShaderId,
    /// Raster reconstruction step, blended over the finer level.
    pub upsample_blend: ShaderId,
    /// Raster final pass mixing the sharp source back in.
    pub upsample_final: ShaderId,
}

#[cfg(feature = "wgpu")]
pub(crate) fn full_shaders(device: &Device, engine: &mut WgpuEngine) -> Result<FullShaders, Error> {
    let shaders = &nublur_shaders::SHADERS;
    Ok(FullShaders {
        resample: engine.add_compute_shader(device, &shaders.resample)?,
        resample_draw: engine.add_render_shader(device, &shaders.resample_draw)?,
        upsample: engine.add_compute_shader(device, &shaders.upsample)?,
        upsample_blend: engine.add_render_shader(device, &shaders.upsample_blend)?,
        upsample_final: engine.add_render_shader(device, &shaders.upsample_final)?,
    })
}

/// Registers the CPU twin of every pipeline with a [`CpuEngine`].
pub fn full_shaders_cpu(engine: &mut CpuEngine) -> FullShaders {
    use nublur_shaders::cpu;
    let shaders = &nublur_shaders::SHADERS;
    FullShaders {
        resample: engine.add_compute_shader(&shaders.resample, cpu::resample),
        resample_draw: engine.add_render_shader(&shaders.resample_draw, cpu::resample_draw),
        upsample: engine.add_compute_shader(&shaders.upsample, cpu::upsample),
        upsample_blend: engine.add_render_shader(&shaders.upsample_blend, cpu::upsample_blend),
        upsample_final: engine.add_render_shader(&shaders.upsample_final, cpu::upsample_final),
    }
}
