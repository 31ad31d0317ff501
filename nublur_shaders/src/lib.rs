// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The shader set of the V-cycle blur: WGSL sources assembled from shared
//! snippets at compile time, per-pipeline metadata, and CPU equivalents of
//! every pipeline so the whole algorithm can run without a GPU.
//!
//! API interactions (resource management, command encoding) are left to the
//! client; this crate only provides sources and metadata.

#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]

pub mod cpu;
mod types;

pub use types::{BindType, BlendMode, ComputeShader, RenderShader};

use std::borrow::Cow;

use nublur_encoding::TILE_DIM;

/// Assembled WGSL sources. Files under `shader/shared/` contribute snippets
/// that are prepended to the pipelines using them.
pub mod wgsl {
    pub const RESAMPLE: &str = include_str!("../shader/resample.wgsl");
    pub const RESAMPLE_DRAW: &str = concat!(
        include_str!("../shader/shared/fullscreen.wgsl"),
        include_str!("../shader/resample_draw.wgsl"),
    );
    pub const UPSAMPLE: &str = concat!(
        include_str!("../shader/shared/gaussian.wgsl"),
        include_str!("../shader/upsample.wgsl"),
    );
    pub const UPSAMPLE_BLEND: &str = concat!(
        include_str!("../shader/shared/gaussian.wgsl"),
        include_str!("../shader/shared/fullscreen.wgsl"),
        include_str!("../shader/upsample_blend.wgsl"),
    );
    pub const UPSAMPLE_FINAL: &str = concat!(
        include_str!("../shader/shared/gaussian.wgsl"),
        include_str!("../shader/shared/fullscreen.wgsl"),
        include_str!("../shader/upsample_final.wgsl"),
    );
}

/// The full pipeline set used by one V-cycle.
#[derive(Clone, Debug)]
pub struct Shaders<'a> {
    /// Compute box reduction, also used as the compute blit.
    pub resample: ComputeShader<'a>,
    /// Raster box reduction / blit.
    pub resample_draw: RenderShader<'a>,
    /// Compute reconstruction step (all passes including the final one).
    pub upsample: ComputeShader<'a>,
    /// Raster reconstruction step with fixed-function blending.
    pub upsample_blend: RenderShader<'a>,
    /// Raster final pass folding in the sharp source, no blending.
    pub upsample_final: RenderShader<'a>,
}

pub const SHADERS: Shaders<'static> = Shaders {
    resample: ComputeShader {
        name: Cow::Borrowed("resample"),
        workgroup_size: [TILE_DIM, TILE_DIM, 1],
        bindings: Cow::Borrowed(&[BindType::Sampler, BindType::ImageRead, BindType::Image]),
        wgsl: Cow::Borrowed(wgsl::RESAMPLE),
        entry_point: "cs_main",
    },
    resample_draw: RenderShader {
        name: Cow::Borrowed("resample_draw"),
        bindings: Cow::Borrowed(&[BindType::Sampler, BindType::ImageRead]),
        wgsl: Cow::Borrowed(wgsl::RESAMPLE_DRAW),
        vertex_entry: "vs_main",
        fragment_entry: "fs_main",
        blend: BlendMode::Replace,
    },
    upsample: ComputeShader {
        name: Cow::Borrowed("upsample"),
        workgroup_size: [TILE_DIM, TILE_DIM, 1],
        bindings: Cow::Borrowed(&[
            BindType::Uniform,
            BindType::Sampler,
            BindType::ImageRead,
            BindType::ImageRead,
            BindType::Image,
        ]),
        wgsl: Cow::Borrowed(wgsl::UPSAMPLE),
        entry_point: "cs_main",
    },
    upsample_blend: RenderShader {
        name: Cow::Borrowed("upsample_blend"),
        bindings: Cow::Borrowed(&[BindType::Uniform, BindType::Sampler, BindType::ImageRead]),
        wgsl: Cow::Borrowed(wgsl::UPSAMPLE_BLEND),
        vertex_entry: "vs_main",
        fragment_entry: "fs_main",
        blend: BlendMode::NonPremultipliedOver,
    },
    upsample_final: RenderShader {
        name: Cow::Borrowed("upsample_final"),
        bindings: Cow::Borrowed(&[
            BindType::Uniform,
            BindType::Sampler,
            BindType::ImageRead,
            BindType::ImageRead,
        ]),
        wgsl: Cow::Borrowed(wgsl::UPSAMPLE_FINAL),
        vertex_entry: "vs_main",
        fragment_entry: "fs_main",
        blend: BlendMode::Replace,
    },
};
