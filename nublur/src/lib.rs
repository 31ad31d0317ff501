// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Real-time non-uniform blur over a mip pyramid.
//!
//! The blur runs as a V-cycle: the source image is reduced level by level
//! down to a single pixel, then reconstructed coarse to fine, blending each
//! coarser level in with a per-pixel alpha derived from a Gaussian of the
//! locally effective sigma. A focus point and a falloff policy make the
//! effective sigma vary across the image, so one cheap linear-time pass
//! yields a spatially varying blur of essentially unbounded radius.
//!
//! [`Blurrer`] owns the GPU resources for one source extent and runs the
//! cycle through `wgpu` in one of three [`PipelineMode`]s; [`CpuBlurrer`] is
//! the same driver over a pure CPU execution path, mainly useful for testing
//! and debugging. Both consume [`BlurParams`] per frame, so the focus and
//! sigma can be animated without touching any resources.

#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]

mod barrier;
mod cpu_engine;
mod recording;
mod render;
mod shaders;
#[cfg(feature = "wgpu")]
pub mod util;
#[cfg(feature = "wgpu")]
mod wgpu_engine;

/// Building blocks underneath the blur drivers, for clients that record and
/// replay command streams by hand.
pub mod low_level {
    pub use crate::barrier::{MipStates, ResourceState, Transition};
    pub use crate::cpu_engine::CpuEngine;
    pub use crate::recording::{
        BufferProxy, Command, DrawParams, ImageProxy, Recording, ResourceId, ResourceProxy,
        ShaderId,
    };
    pub use crate::shaders::{full_shaders_cpu, FullShaders};
}

use thiserror::Error;

use crate::barrier::ResourceState;
use crate::cpu_engine::CpuEngine;
use crate::recording::ResourceId;
use crate::render::VCycle;
use crate::shaders::FullShaders;

#[cfg(feature = "wgpu")]
use wgpu::{Device, Queue, TextureView};

#[cfg(feature = "wgpu")]
use crate::wgpu_engine::{ExternalResource, WgpuEngine};

pub use nublur_encoding::Falloff;
pub use recording::ImageFormat;

/// Errors that can occur in nublur.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// There is no GPU device satisfying the adapter criteria.
    #[cfg(feature = "wgpu")]
    #[error("couldn't find suitable device")]
    NoCompatibleDevice,
    /// The source image has a zero dimension.
    #[error("source image has a zero dimension")]
    EmptySourceImage,
    /// The source data length does not match the declared extent.
    #[error("source data is {got} bytes, expected {expected}")]
    SourceSizeMismatch { expected: usize, got: usize },
    /// A recording touched a mip level outside its tracked state.
    #[error("mip {level} of image {image:?} is in state {found:?}, expected {expected:?}")]
    WrongResourceState {
        image: ResourceId,
        level: u32,
        expected: ResourceState,
        found: ResourceState,
    },
    /// A recording read a mip level nothing has written.
    #[error("mip {level} of image {image:?} read before anything wrote it")]
    ReadBeforeWrite { image: ResourceId, level: u32 },
    /// The image format is not supported on this path.
    #[error("{0:?} images are not supported here")]
    UnsupportedFormat(ImageFormat),
    /// Failed to async map a buffer.
    #[cfg(feature = "wgpu")]
    #[error("failed to async map a buffer")]
    BufferAsyncError(#[from] wgpu::BufferAsyncError),
    /// Failed to download the result.
    #[error("failed to download {0}")]
    DownloadError(&'static str),
    /// Used a resource that was never uploaded or was already freed.
    #[error("{0} used in {1} not available")]
    UnavailableResourceUsed(&'static str, &'static str),
}

#[cfg(feature = "wgpu")]
static_assertions::assert_impl_all!(Error: Send, Sync);

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

/// Per-frame blur parameters; cheap to change between frames.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BlurParams {
    /// Focus point in [-1, 1] image space, (0, 0) being the center.
    pub focus: [f32; 2],
    /// Gaussian standard deviation in pixels at the point of maximum blur.
    /// There is no upper limit; huge sigmas saturate to the coarsest level.
    pub sigma: f32,
}

/// How the V-cycle passes are issued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PipelineMode {
    /// Compute dispatches for every pass, over two working pyramids.
    Compute,
    /// Full-screen draws for every pass, blending in fixed function.
    Graphics,
    /// Compute reduction, raster reconstruction.
    #[default]
    Hybrid,
}

impl PipelineMode {
    /// The next mode in a fixed rotation, for interactive toggling.
    pub fn cycle(self) -> Self {
        match self {
            Self::Hybrid => Self::Graphics,
            Self::Graphics => Self::Compute,
            Self::Compute => Self::Hybrid,
        }
    }
}

/// Construction-time options of a blur driver.
#[derive(Clone, Copy, Debug)]
pub struct BlurrerOptions {
    pub mode: PipelineMode,
    pub falloff: Falloff,
    /// Format of the output image; [`ImageFormat::Bgra8`] adds a conversion
    /// blit and is only available on the GPU driver.
    pub out_format: ImageFormat,
}

impl Default for BlurrerOptions {
    fn default() -> Self {
        Self {
            mode: PipelineMode::default(),
            falloff: Falloff::default(),
            out_format: ImageFormat::Rgba8,
        }
    }
}

/// Borrowed source image data, tightly packed `rgba8` rows.
#[derive(Clone, Copy, Debug)]
pub struct SourceImage<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

/// Blurs one source image on the GPU, any number of times.
///
/// All textures are sized for the source at construction; a new source
/// extent needs a new `Blurrer`.
#[cfg(feature = "wgpu")]
pub struct Blurrer {
    engine: WgpuEngine,
    shaders: FullShaders,
    vcycle: VCycle,
    mode: PipelineMode,
}

#[cfg(feature = "wgpu")]
impl Blurrer {
    /// Creates the pipelines and pyramid for the image and uploads it.
    pub fn new(
        device: &Device,
        queue: &Queue,
        image: SourceImage<'_>,
        options: BlurrerOptions,
    ) -> Result<Self> {
        let mut engine = WgpuEngine::new();
        let shaders = shaders::full_shaders(device, &mut engine)?;
        let mut vcycle = VCycle::new(image.width, image.height, options.falloff, options.out_format)?;
        let recording = vcycle.record_upload(image.data)?;
        engine.run_recording(device, queue, &recording, &[], "nublur.upload")?;
        Ok(Self {
            engine,
            shaders,
            vcycle,
            mode: options.mode,
        })
    }

    /// Runs one V-cycle, leaving the blurred image in the output texture.
    ///
    /// On failure the driver's state tracking is left as it was, so the frame
    /// is dropped and a later `process` starts from the last good frame.
    pub fn process(&mut self, device: &Device, queue: &Queue, params: &BlurParams) -> Result<()> {
        let (recording, states) = self.vcycle.record_frame(&self.shaders, params, self.mode);
        self.engine
            .run_recording(device, queue, &recording, &[], "nublur.frame")?;
        self.vcycle.adopt(states);
        Ok(())
    }

    /// Downloads the output of the last [`process`], blocking until the GPU
    /// is done with it. Tightly packed `rgba8` (or `bgra8`) rows.
    ///
    /// [`process`]: Blurrer::process
    pub fn read_result(&mut self, device: &Device, queue: &Queue) -> Result<Vec<u8>> {
        let (recording, states) = self.vcycle.record_readback();
        self.engine
            .run_recording(device, queue, &recording, &[], "nublur.readback")?;
        self.vcycle.adopt(states);
        let download = self
            .engine
            .take_download(self.vcycle.out_image(), 0)
            .ok_or(Error::DownloadError("output image"))?;

        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        download
            .buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                _ = sender.send(result);
            });
        let Some(mapped) = util::block_on_wgpu(device, receiver.receive()) else {
            return Err(Error::DownloadError("output image"));
        };
        mapped?;

        let row_bytes = download.width as usize * 4;
        let mut data = Vec::with_capacity(row_bytes * download.height as usize);
        {
            let view = download.buffer.slice(..).get_mapped_range();
            for row in view.chunks_exact(download.padded_bytes_per_row as usize) {
                data.extend_from_slice(&row[..row_bytes]);
            }
        }
        download.buffer.unmap();
        Ok(data)
    }

    /// Blits the output of the last [`process`] into a caller-owned texture
    /// view, scaling to its extent. The view must be usable as a render
    /// attachment in the given format.
    ///
    /// [`process`]: Blurrer::process
    pub fn copy_to_texture(
        &mut self,
        device: &Device,
        queue: &Queue,
        texture: &TextureView,
        width: u32,
        height: u32,
        format: ImageFormat,
    ) -> Result<()> {
        let target = recording::ImageProxy::new(width, height, 1, format);
        let (recording, states) = self.vcycle.record_blit(&self.shaders, target);
        let external = [ExternalResource::Image(target, texture)];
        self.engine
            .run_recording(device, queue, &recording, &external, "nublur.blit")?;
        self.vcycle.adopt(states);
        Ok(())
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PipelineMode) {
        self.mode = mode;
    }

    /// Rotates to the next pipeline mode and returns it.
    pub fn cycle_mode(&mut self) -> PipelineMode {
        self.mode = self.mode.cycle();
        self.mode
    }

    /// Number of pyramid levels for the source extent.
    pub fn num_levels(&self) -> u32 {
        self.vcycle.config().num_levels()
    }
}

#[cfg(all(feature = "wgpu", not(target_arch = "wasm32")))]
static_assertions::assert_impl_all!(Blurrer: Send);

/// The same driver as [`Blurrer`], executing on the CPU.
///
/// Runs the very same recordings against reference implementations of the
/// shaders. Only [`ImageFormat::Rgba8`] output is supported.
pub struct CpuBlurrer {
    engine: CpuEngine,
    shaders: FullShaders,
    vcycle: VCycle,
    mode: PipelineMode,
}

impl CpuBlurrer {
    pub fn new(image: SourceImage<'_>, options: BlurrerOptions) -> Result<Self> {
        if options.out_format != ImageFormat::Rgba8 {
            return Err(Error::UnsupportedFormat(options.out_format));
        }
        let mut engine = CpuEngine::new();
        let shaders = shaders::full_shaders_cpu(&mut engine);
        let mut vcycle = VCycle::new(image.width, image.height, options.falloff, options.out_format)?;
        let recording = vcycle.record_upload(image.data)?;
        engine.run_recording(&recording)?;
        Ok(Self {
            engine,
            shaders,
            vcycle,
            mode: options.mode,
        })
    }

    /// Runs one V-cycle; see [`Blurrer::process`].
    pub fn process(&mut self, params: &BlurParams) -> Result<()> {
        let (recording, states) = self.vcycle.record_frame(&self.shaders, params, self.mode);
        self.engine.run_recording(&recording)?;
        self.vcycle.adopt(states);
        Ok(())
    }

    /// The output of the last [`process`], as tightly packed `rgba8` rows.
    ///
    /// [`process`]: CpuBlurrer::process
    pub fn read_result(&mut self) -> Result<Vec<u8>> {
        let (recording, states) = self.vcycle.record_readback();
        self.engine.run_recording(&recording)?;
        self.vcycle.adopt(states);
        self.engine
            .take_download(self.vcycle.out_image(), 0)
            .ok_or(Error::DownloadError("output image"))
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PipelineMode) {
        self.mode = mode;
    }

    /// Rotates to the next pipeline mode and returns it.
    pub fn cycle_mode(&mut self) -> PipelineMode {
        self.mode = self.mode.cycle();
        self.mode
    }

    /// Number of pyramid levels for the source extent.
    pub fn num_levels(&self) -> u32 {
        self.vcycle.config().num_levels()
    }
}

static_assertions::assert_impl_all!(CpuBlurrer: Send);
