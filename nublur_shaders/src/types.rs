// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::borrow::Cow;

/// Resource type of one shader binding, in `@binding` index order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindType {
    /// A small uniform buffer.
    Uniform,
    /// A sampled texture, bound as a single-mip view.
    ImageRead,
    /// A write-only storage texture, bound as a single-mip view.
    Image,
    /// The shared linear clamp-to-edge sampler.
    Sampler,
}

/// Target blend state a render pipeline is built with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendMode {
    /// Overwrite the target.
    Replace,
    /// Non-premultiplied over: `dst = src*a + dst*(1-a)`.
    NonPremultipliedOver,
}

/// Metadata for one compute pipeline.
#[derive(Clone, Debug)]
pub struct ComputeShader<'a> {
    pub name: Cow<'a, str>,
    pub workgroup_size: [u32; 3],
    pub bindings: Cow<'a, [BindType]>,
    pub wgsl: Cow<'a, str>,
    pub entry_point: &'a str,
}

/// Metadata for one full-screen render pipeline.
#[derive(Clone, Debug)]
pub struct RenderShader<'a> {
    pub name: Cow<'a, str>,
    pub bindings: Cow<'a, [BindType]>,
    pub wgsl: Cow<'a, str>,
    pub vertex_entry: &'a str,
    pub fragment_entry: &'a str,
    pub blend: BlendMode,
}
