// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared helpers for the nublur test suite.

#![warn(unused_crate_dependencies)]

use anyhow::{anyhow, Result};

use nublur::util::RenderContext;
use nublur::{
    BlurParams, Blurrer, BlurrerOptions, CpuBlurrer, Falloff, ImageFormat, PipelineMode,
    SourceImage,
};

/// A single color repeated over the whole image.
pub fn solid_image(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    rgba.repeat((width * height) as usize)
}

/// Opaque image with red and green ramping along the two axes.
pub fn gradient_image(width: u32, height: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            data.push((x * 255 / width.max(1)) as u8);
            data.push((y * 255 / height.max(1)) as u8);
            data.push(128);
            data.push(255);
        }
    }
    data
}

/// Opaque black and white checkerboard with square cells.
pub fn checker_image(width: u32, height: u32, cell: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let on = (x / cell + y / cell) % 2 == 0;
            let v = if on { 255 } else { 0 };
            data.extend_from_slice(&[v, v, v, 255]);
        }
    }
    data
}

/// One blur invocation with everything configurable, runnable on either
/// backend.
pub struct TestFrame {
    pub sigma: f32,
    pub focus: [f32; 2],
    pub mode: PipelineMode,
    pub falloff: Falloff,
}

impl TestFrame {
    pub fn new(sigma: f32) -> Self {
        Self {
            sigma,
            focus: [0.0, 0.0],
            mode: PipelineMode::default(),
            falloff: Falloff::default(),
        }
    }

    fn options(&self) -> BlurrerOptions {
        BlurrerOptions {
            mode: self.mode,
            falloff: self.falloff,
            ..Default::default()
        }
    }

    fn params(&self) -> BlurParams {
        BlurParams {
            focus: self.focus,
            sigma: self.sigma,
        }
    }

    /// Blurs the image on the CPU backend.
    pub fn blur_cpu(&self, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
        let image = SourceImage {
            width,
            height,
            data,
        };
        let mut blurrer = CpuBlurrer::new(image, self.options())?;
        blurrer.process(&self.params())?;
        Ok(blurrer.read_result()?)
    }

    /// Blurs the image on a real device, blocking on the result.
    pub fn blur_gpu(&self, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
        let mut context = RenderContext::new();
        let device_id = pollster::block_on(context.device())
            .ok_or_else(|| anyhow!("no compatible device found"))?;
        let handle = &context.devices[device_id];
        let image = SourceImage {
            width,
            height,
            data,
        };
        let mut blurrer = Blurrer::new(&handle.device, &handle.queue, image, self.options())?;
        blurrer.process(&handle.device, &handle.queue, &self.params())?;
        Ok(blurrer.read_result(&handle.device, &handle.queue)?)
    }

    /// Blurs the image on a real device and fetches the result through the
    /// surface blit path instead of the readback copy.
    pub fn blur_gpu_via_texture(&self, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
        let mut context = RenderContext::new();
        let device_id = pollster::block_on(context.device())
            .ok_or_else(|| anyhow!("no compatible device found"))?;
        let handle = &context.devices[device_id];
        let image = SourceImage {
            width,
            height,
            data,
        };
        let mut blurrer = Blurrer::new(&handle.device, &handle.queue, image, self.options())?;
        blurrer.process(&handle.device, &handle.queue, &self.params())?;

        let target = handle.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("nublur_tests.blit_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());
        blurrer.copy_to_texture(
            &handle.device,
            &handle.queue,
            &view,
            width,
            height,
            ImageFormat::Rgba8,
        )?;
        read_texture(&handle.device, &handle.queue, &target, width, height)
    }
}

/// Copies a texture into a mappable buffer and returns its tightly packed
/// `rgba8` rows.
fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    let padded_bytes_per_row = (width * 4).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("nublur_tests.readback"),
        size: u64::from(padded_bytes_per_row) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder =
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
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
    queue.submit(Some(encoder.finish()));

    let (sender, receiver) = std::sync::mpsc::channel();
    buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::PollType::wait())?;
    receiver.recv()??;
    let row_bytes = (width * 4) as usize;
    let mut data = Vec::with_capacity(row_bytes * height as usize);
    {
        let view = buffer.slice(..).get_mapped_range();
        for row in view.chunks_exact(padded_bytes_per_row as usize) {
            data.extend_from_slice(&row[..row_bytes]);
        }
    }
    buffer.unmap();
    Ok(data)
}

/// Mean absolute channel difference, normalized to 0..1.
pub fn mean_absolute_difference(a: &[u8], b: &[u8]) -> f64 {
    assert_eq!(a.len(), b.len());
    let total: u64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| u64::from(x.abs_diff(*y)))
        .sum();
    total as f64 / (a.len() as f64 * 255.0)
}
