// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::barrier::Transition;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct ShaderId(pub usize);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ResourceId(pub NonZeroU64);

impl ResourceId {
    pub fn next() -> Self {
        // We initialize with 1 so that the conversion below succeeds
        static ID_COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(NonZeroU64::new(ID_COUNTER.fetch_add(1, Ordering::Relaxed)).unwrap())
    }
}

/// List of [`Command`]s for an engine to execute in order.
#[derive(Default, Debug)]
pub struct Recording {
    pub commands: Vec<Command>,
}

/// Proxy used as a handle to a uniform buffer.
#[derive(Clone, Copy, Debug)]
pub struct BufferProxy {
    pub size: u64,
    pub id: ResourceId,
    pub name: &'static str,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ImageFormat {
    Rgba8,
    Bgra8,
}

/// Proxy used as a handle to an image and its mip chain.
#[derive(Clone, Copy, Debug)]
pub struct ImageProxy {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: ImageFormat,
    pub id: ResourceId,
}

#[derive(Clone, Copy, Debug)]
pub enum ResourceProxy {
    Buffer(BufferProxy),
    /// A single mip level of an image, bound for sampling or storage.
    ImageMip { image: ImageProxy, level: u32 },
    /// The shared linear clamp-to-edge sampler.
    Sampler,
}

/// Parameters of a full-screen triangle draw into one mip level.
#[derive(Debug)]
pub struct DrawParams {
    pub shader_id: ShaderId,
    pub resources: Vec<ResourceProxy>,
    pub target: ImageProxy,
    pub target_level: u32,
    pub clear_color: Option<[f32; 4]>,
}

/// Single command inside a [`Recording`] to get executed by an engine.
#[derive(Debug)]
pub enum Command {
    /// Commands the data to be uploaded to the given buffer as a uniform.
    UploadUniform(BufferProxy, Vec<u8>),
    /// Commands the data to be uploaded to mip 0 of the given image.
    UploadImage(ImageProxy, Vec<u8>),
    /// Commands a state change of the named mip levels before the next access.
    Barrier(Vec<Transition>),
    Dispatch(ShaderId, (u32, u32, u32), Vec<ResourceProxy>),
    Draw(DrawParams),
    /// Commands a whole-level copy between two images of equal extent.
    CopyImage {
        src: ImageProxy,
        src_level: u32,
        dst: ImageProxy,
        dst_level: u32,
    },
    /// Commands one mip level to be copied out for CPU access.
    Download(ImageProxy, u32),
    /// Commands to free the buffer.
    FreeBuffer(BufferProxy),
    /// Commands to free the image.
    FreeImage(ImageProxy),
}

impl Recording {
    /// Appends a [`Command`] to the back of the [`Recording`].
    pub fn push(&mut self, cmd: Command) {
        self.commands.push(cmd);
    }

    /// Commands to upload the given data to a new buffer as a uniform with the given name.
    /// Returns a [`BufferProxy`] to the buffer.
    pub fn upload_uniform(&mut self, name: &'static str, data: impl Into<Vec<u8>>) -> BufferProxy {
        let data = data.into();
        let buf_proxy = BufferProxy::new(data.len() as u64, name);
        self.push(Command::UploadUniform(buf_proxy, data));
        buf_proxy
    }

    /// Commands to upload the given data to mip 0 of a new image.
    /// Returns an [`ImageProxy`] to the image.
    pub fn upload_image(
        &mut self,
        width: u32,
        height: u32,
        format: ImageFormat,
        data: impl Into<Vec<u8>>,
    ) -> ImageProxy {
        let image_proxy = ImageProxy::new(width, height, 1, format);
        self.push(Command::UploadImage(image_proxy, data.into()));
        image_proxy
    }

    pub fn barrier(&mut self, transitions: Vec<Transition>) {
        if !transitions.is_empty() {
            self.push(Command::Barrier(transitions));
        }
    }

    pub fn dispatch<R>(&mut self, shader: ShaderId, wg_size: (u32, u32, u32), resources: R)
    where
        R: IntoIterator,
        R::Item: Into<ResourceProxy>,
    {
        let r = resources.into_iter().map(|r| r.into()).collect();
        self.push(Command::Dispatch(shader, wg_size, r));
    }

    /// Issue a full-screen triangle draw.
    pub fn draw(&mut self, params: DrawParams) {
        self.push(Command::Draw(params));
    }

    pub fn copy_image(&mut self, src: ImageProxy, src_level: u32, dst: ImageProxy, dst_level: u32) {
        self.push(Command::CopyImage {
            src,
            src_level,
            dst,
            dst_level,
        });
    }

    /// Prepare one mip level for downloading.
    ///
    /// This copies to a download buffer owned by the engine; fetch it with the
    /// engine's `take_download` after the recording ran.
    pub fn download(&mut self, image: ImageProxy, level: u32) {
        self.push(Command::Download(image, level));
    }

    /// Commands to free the given buffer.
    pub fn free_buffer(&mut self, buf: BufferProxy) {
        self.push(Command::FreeBuffer(buf));
    }

    /// Commands to free the given image.
    pub fn free_image(&mut self, image: ImageProxy) {
        self.push(Command::FreeImage(image));
    }

    /// Returns a [`Vec`] containing all the [`Command`]s in order.
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

impl BufferProxy {
    pub fn new(size: u64, name: &'static str) -> Self {
        let id = ResourceId::next();
        debug_assert!(size > 0);
        Self { id, size, name }
    }
}

impl ImageFormat {
    #[cfg(feature = "wgpu")]
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            Self::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
        }
    }

    #[cfg(feature = "wgpu")]
    pub fn from_wgpu(format: wgpu::TextureFormat) -> Option<Self> {
        match format {
            wgpu::TextureFormat::Rgba8Unorm => Some(Self::Rgba8),
            wgpu::TextureFormat::Bgra8Unorm => Some(Self::Bgra8),
            _ => None,
        }
    }
}

impl ImageProxy {
    pub fn new(width: u32, height: u32, mip_levels: u32, format: ImageFormat) -> Self {
        let id = ResourceId::next();
        debug_assert!(mip_levels >= 1);
        Self {
            width,
            height,
            mip_levels,
            format,
            id,
        }
    }

    /// Binds the given mip level of this image.
    pub fn mip(self, level: u32) -> ResourceProxy {
        debug_assert!(level < self.mip_levels);
        ResourceProxy::ImageMip { image: self, level }
    }
}

impl From<BufferProxy> for ResourceProxy {
    fn from(value: BufferProxy) -> Self {
        Self::Buffer(value)
    }
}

impl From<ImageProxy> for ResourceProxy {
    fn from(value: ImageProxy) -> Self {
        value.mip(0)
    }
}
