// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPU implementations of the shader pipelines.
//!
//! These operate on mip levels held as f32 texels and form the execution path
//! of the CPU engine. They mirror the WGSL sources closely enough that the
//! two backends agree within rounding.

mod resample;
mod upsample;
pub mod util;

pub use resample::{resample, resample_draw};
pub use upsample::{upsample, upsample_blend, upsample_final};

use std::cell::{RefCell, RefMut};

/// One texture mip level held as RGBA f32 texels.
#[derive(Clone, Debug)]
pub struct CpuTexture {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[f32; 4]>,
}

impl CpuTexture {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 4]; width * height],
        }
    }

    pub fn from_rgba8(width: usize, height: usize, data: &[u8]) -> Self {
        assert_eq!(data.len(), width * height * 4);
        let pixels = data
            .chunks_exact(4)
            .map(|px| {
                [
                    f32::from(px[0]) / 255.0,
                    f32::from(px[1]) / 255.0,
                    f32::from(px[2]) / 255.0,
                    f32::from(px[3]) / 255.0,
                ]
            })
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Quantizes to RGBA8, rounding the way a unorm texture store does.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for px in &self.pixels {
            for c in px {
                out.push((c.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
        }
        out
    }

    pub fn texel(&self, x: usize, y: usize) -> [f32; 4] {
        self.pixels[y * self.width + x]
    }

    pub fn set_texel(&mut self, x: usize, y: usize, color: [f32; 4]) {
        self.pixels[y * self.width + x] = color;
    }
}

/// Type-erased resource slot, resolved by each CPU shader to the resource
/// kind it expects at that binding index.
#[derive(Clone, Copy)]
pub enum CpuBinding<'a> {
    Buffer(&'a [u8]),
    Texture(&'a CpuTexture),
    TextureRW(&'a RefCell<CpuTexture>),
    Sampler,
}

impl<'a> CpuBinding<'a> {
    pub fn as_typed<T: bytemuck::Pod>(&self) -> &'a T {
        match *self {
            Self::Buffer(buf) => bytemuck::from_bytes(&buf[..size_of::<T>()]),
            _ => panic!("expected a buffer binding"),
        }
    }

    pub fn as_texture(&self) -> &'a CpuTexture {
        match *self {
            Self::Texture(tex) => tex,
            _ => panic!("expected a sampled texture binding"),
        }
    }

    pub fn as_texture_rw(&self) -> RefMut<'a, CpuTexture> {
        match *self {
            Self::TextureRW(tex) => tex.borrow_mut(),
            _ => panic!("expected a storage texture binding"),
        }
    }
}

/// Compute pipeline twin; receives the same workgroup counts as the GPU
/// dispatch.
pub type CpuComputeShader = fn(wg_count: [u32; 3], resources: &[CpuBinding]);

/// Fragment stage twin for full-screen draws. Target blending is applied by
/// the engine, matching the fixed-function split on the GPU.
pub type CpuFragmentShader = fn(uv: [f32; 2], resources: &[CpuBinding]) -> [f32; 4];
