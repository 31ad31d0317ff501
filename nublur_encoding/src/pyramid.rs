// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mip pyramid geometry.

/// Side length of one compute tile; dispatches cover each level in
/// `TILE_DIM x TILE_DIM` workgroups.
pub const TILE_DIM: u32 = 8;

/// Extent of one pyramid level in pixels.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LevelExtent {
    pub width: u32,
    pub height: u32,
}

impl LevelExtent {
    /// Extent of the next coarser level.
    pub fn halved(self) -> Self {
        Self {
            width: (self.width / 2).max(1),
            height: (self.height / 2).max(1),
        }
    }
}

/// Number of levels in a full mip chain, `floor(log2(max(w, h))) + 1`.
///
/// Dimensions are clamped to at least 1, so a degenerate extent still yields
/// a single level.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let max_dim = width.max(height).max(1);
    32 - max_dim.leading_zeros()
}

/// Geometry of one image pyramid: per-level extents and dispatch sizes.
///
/// Purely derived from the source extent; the frame driver computes this once
/// at startup and consults it every frame.
#[derive(Clone, Debug)]
pub struct PyramidConfig {
    num_levels: u32,
    levels: Vec<LevelExtent>,
}

impl PyramidConfig {
    pub fn new(width: u32, height: u32) -> Self {
        let num_levels = mip_level_count(width, height);
        let mut levels = Vec::with_capacity(num_levels as usize);
        let mut extent = LevelExtent {
            width: width.max(1),
            height: height.max(1),
        };
        for _ in 0..num_levels {
            levels.push(extent);
            extent = extent.halved();
        }
        Self { num_levels, levels }
    }

    pub fn num_levels(&self) -> u32 {
        self.num_levels
    }

    /// Number of upsample passes in one V-cycle (one per level below the
    /// coarsest; zero for a 1x1 source).
    pub fn num_passes(&self) -> u32 {
        self.num_levels - 1
    }

    pub fn extent(&self, level: u32) -> LevelExtent {
        self.levels[level as usize]
    }

    pub fn levels(&self) -> &[LevelExtent] {
        &self.levels
    }

    /// Workgroup counts covering `level` in `TILE_DIM` square tiles.
    pub fn workgroup_count(&self, level: u32) -> (u32, u32, u32) {
        let extent = self.extent(level);
        (
            (extent.width + TILE_DIM - 1) / TILE_DIM,
            (extent.height + TILE_DIM - 1) / TILE_DIM,
            1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{mip_level_count, PyramidConfig};

    #[test]
    fn level_count_matches_log2() {
        assert_eq!(mip_level_count(512, 512), 10);
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(1000, 1), 10);
        assert_eq!(mip_level_count(1, 1000), 10);
        assert_eq!(mip_level_count(1024, 512), 11);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn levels_halve_down_to_one_pixel() {
        let config = PyramidConfig::new(1000, 384);
        assert_eq!(config.num_levels(), 10);
        let levels = config.levels();
        for i in 1..levels.len() {
            let parent = levels[i - 1];
            assert_eq!(levels[i].width, (parent.width / 2).max(1));
            assert_eq!(levels[i].height, (parent.height / 2).max(1));
        }
        let coarsest = levels[levels.len() - 1];
        assert_eq!((coarsest.width, coarsest.height), (1, 1));
    }

    #[test]
    fn workgroups_cover_every_pixel() {
        let config = PyramidConfig::new(513, 8);
        let (x, y, z) = config.workgroup_count(0);
        assert_eq!((x, y, z), (65, 1, 1));
        let (x, y, _) = config.workgroup_count(1);
        assert_eq!((x, y), (32, 1));
    }
}
