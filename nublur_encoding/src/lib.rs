// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPU-side derived data for the V-cycle blur: pyramid geometry, per-level
//! Gaussian blend weights and the uniform layouts shared with the shaders.

#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]

mod params;
mod pyramid;
pub mod weights;

pub use params::GaussianParams;
pub use pyramid::{mip_level_count, LevelExtent, PyramidConfig, TILE_DIM};
pub use weights::Falloff;
