// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-level Gaussian blend weights.
//!
//! Each pyramid level stands in for a band of blur radii around `2^level`
//! pixels. For a given sigma the mass assigned to a level is the slice of a
//! discrete Gaussian that the level covers; the upsample pass walking the
//! pyramid coarse-to-fine consumes a tail-normalized form of that mass as its
//! blend alpha.
//!
//! This module must be kept in sync with the functions in
//! `nublur_shaders/shader/shared/gaussian.wgsl`, which evaluate the same
//! quantities per pixel with a spatially varying effective sigma.

/// Sigma at or below this is treated as no blur.
pub const SIGMA_EPSILON: f32 = 1e-4;

/// Falloff kind uniform value for a spatially constant sigma.
pub const FALLOFF_UNIFORM: u32 = 0;
/// Falloff kind uniform value for radial distance falloff.
pub const FALLOFF_RADIAL: u32 = 1;

/// Cumulative Gaussian contribution at mip `m`, `exp(-2^(2m-1) / (pi sigma^2))`.
///
/// Degenerates to 0 for `m < 0`.
pub fn gaussian_basis(sigma: f32, m: i32) -> f32 {
    gaussian_basis_wide(sigma.into(), m) as f32
}

fn gaussian_basis_wide(sigma: f64, m: i32) -> f64 {
    if m < 0 {
        return 0.0;
    }
    let radius_sq = 2.0_f64.powi(2 * m - 1);
    (-radius_sq / (std::f64::consts::PI * sigma * sigma)).exp()
}

/// Unnormalized weight mass of one level: the Gaussian slice between this
/// level's implicit radius and the next coarser one, scaled by the level's
/// texel footprint.
pub fn level_mass(sigma: f32, level: u32) -> f32 {
    level_mass_wide(sigma.into(), level) as f32
}

/// The slice is taken in f64: for sigmas far beyond the level radius the
/// neighboring basis values agree to more digits than f32 carries and their
/// f32 difference cancels to noise.
fn level_mass_wide(sigma: f64, level: u32) -> f64 {
    let footprint = (1_u64 << (2 * level)) as f64;
    footprint
        * (gaussian_basis_wide(sigma, level as i32) - gaussian_basis_wide(sigma, level as i32 + 1))
}

/// Blend alpha for the upsample pass that writes `level`: this level's mass
/// over the total mass of `level..num_levels`.
///
/// When sigma is (effectively) zero the alpha degenerates to 1 at level 0 and
/// 0 elsewhere, so the output reproduces the sharp source. Otherwise the
/// coarsest level always blends with alpha 1 (its tail is itself), even when
/// every mass in its tail has underflowed; that is what saturates very large
/// sigmas to the coarsest available level. An underflowed tail at a finer
/// level degenerates the same way as zero sigma.
pub fn blend_alpha(sigma: f32, level: u32, num_levels: u32) -> f32 {
    debug_assert!(level < num_levels);
    if sigma <= SIGMA_EPSILON {
        return if level == 0 { 1.0 } else { 0.0 };
    }
    if level == num_levels - 1 {
        return 1.0;
    }
    let mut total = 0.0;
    for m in level..num_levels {
        total += level_mass_wide(sigma.into(), m);
    }
    if total <= 0.0 {
        return if level == 0 { 1.0 } else { 0.0 };
    }
    ((level_mass_wide(sigma.into(), level) / total) as f32).clamp(0.0, 1.0)
}

/// Absolute contribution of every level to the final image.
///
/// Derived from the blend alphas by running the coarse-to-fine composite
/// symbolically: `w[l] = alpha(l) * prod_{m < l} (1 - alpha(m))`. The result
/// sums to 1 for any sigma, with the deliberate saturation that a sigma far
/// beyond the pyramid concentrates everything in the coarsest level.
pub fn level_weights(sigma: f32, num_levels: u32) -> Vec<f32> {
    let mut weights = Vec::with_capacity(num_levels as usize);
    let mut remaining = 1.0;
    for level in 0..num_levels {
        let alpha = blend_alpha(sigma, level, num_levels);
        weights.push(alpha * remaining);
        remaining *= 1.0 - alpha;
    }
    weights
}

/// Effective sigma at an image position, in the encoded form the shaders
/// consume (`kind` is one of the `FALLOFF_*` constants).
///
/// Positions and focus are in [-1, 1] image space; distance saturates at 1 so
/// everything further than half the image span from the focus gets the full
/// sigma.
pub fn effective_sigma(sigma: f32, pos: [f32; 2], focus: [f32; 2], kind: u32, exponent: f32) -> f32 {
    if kind == FALLOFF_UNIFORM {
        return sigma;
    }
    let dx = pos[0] - focus[0];
    let dy = pos[1] - focus[1];
    let dist = (dx * dx + dy * dy).sqrt().min(1.0);
    sigma * dist.powf(exponent)
}

/// Policy for how blur strength varies with distance from the focus point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Falloff {
    /// Constant sigma across the whole image.
    Uniform,
    /// Sigma scaled by `min(1, distance(pos, focus))^exponent`.
    Radial { exponent: f32 },
}

impl Default for Falloff {
    fn default() -> Self {
        Self::Radial { exponent: 2.0 }
    }
}

impl Falloff {
    pub fn kind(self) -> u32 {
        match self {
            Self::Uniform => FALLOFF_UNIFORM,
            Self::Radial { .. } => FALLOFF_RADIAL,
        }
    }

    pub fn exponent(self) -> f32 {
        match self {
            Self::Uniform => 0.0,
            Self::Radial { exponent } => exponent,
        }
    }

    /// Effective sigma at `pos` for this policy.
    pub fn effective_sigma(self, sigma: f32, pos: [f32; 2], focus: [f32; 2]) -> f32 {
        effective_sigma(sigma, pos, focus, self.kind(), self.exponent())
    }
}

#[cfg(test)]
mod tests {
    use super::{blend_alpha, gaussian_basis, level_weights, Falloff};

    fn argmax(weights: &[f32]) -> usize {
        let mut best = 0;
        for (i, w) in weights.iter().enumerate() {
            if *w > weights[best] {
                best = i;
            }
        }
        best
    }

    #[test]
    fn basis_is_zero_for_negative_mips() {
        assert_eq!(gaussian_basis(4.0, -1), 0.0);
        assert!(gaussian_basis(4.0, 0) > 0.0);
    }

    #[test]
    fn weights_normalize_across_sigmas() {
        for num_levels in [1_u32, 2, 5, 10, 14] {
            for sigma in [0.01_f32, 0.5, 1.0, 2.0, 7.3, 32.0, 100.0, 1.0e6] {
                let weights = level_weights(sigma, num_levels);
                let sum: f32 = weights.iter().sum();
                assert!(
                    (sum - 1.0).abs() < 1e-4,
                    "sum {sum} for sigma {sigma}, {num_levels} levels"
                );
            }
        }
    }

    #[test]
    fn zero_sigma_is_identity() {
        let weights = level_weights(0.0, 10);
        assert_eq!(weights[0], 1.0);
        assert!(weights[1..].iter().all(|w| *w == 0.0));
        assert_eq!(blend_alpha(0.0, 0, 10), 1.0);
        assert_eq!(blend_alpha(0.0, 5, 10), 0.0);
    }

    #[test]
    fn weights_concentrate_near_matching_level() {
        let peak_2 = argmax(&level_weights(2.0, 10));
        let peak_8 = argmax(&level_weights(8.0, 10));
        let peak_32 = argmax(&level_weights(32.0, 10));
        assert_eq!(peak_2, 2);
        assert_eq!(peak_8, 4);
        assert_eq!(peak_32, 6);
        assert!(peak_2 < peak_8 && peak_8 < peak_32);
    }

    #[test]
    fn huge_sigma_saturates_to_coarsest() {
        let weights = level_weights(1.0e6, 10);
        assert!(weights[9] > 0.9, "coarsest weight {}", weights[9]);
        // The finer alphas shrink smoothly rather than collapsing to zero.
        let fine = blend_alpha(1.0e6, 8, 10);
        assert!(fine > 0.0 && fine < 0.1, "next-to-coarsest alpha {fine}");
    }

    #[test]
    fn underflowed_tail_degenerates_below_the_coarsest() {
        // Sigma 3 leaves no representable mass at the deep levels; the
        // coarsest still claims its own tail, the ones above it bow out.
        assert_eq!(blend_alpha(3.0, 9, 10), 1.0);
        assert_eq!(blend_alpha(3.0, 8, 10), 0.0);
    }

    #[test]
    fn alpha_cascade_reproduces_weights() {
        let num_levels = 10;
        let sigma = 5.5;
        let weights = level_weights(sigma, num_levels);
        let mut remaining = 1.0_f32;
        for level in 0..num_levels {
            let alpha = blend_alpha(sigma, level, num_levels);
            let expected = alpha * remaining;
            assert!((weights[level as usize] - expected).abs() < 1e-6);
            remaining *= 1.0 - alpha;
        }
        assert!(remaining.abs() < 1e-6);
    }

    #[test]
    fn coarsest_alpha_is_one() {
        assert_eq!(blend_alpha(3.0, 9, 10), 1.0);
    }

    #[test]
    fn uniform_falloff_ignores_position() {
        let f = Falloff::Uniform;
        assert_eq!(f.effective_sigma(8.0, [0.9, -0.7], [0.0, 0.0]), 8.0);
    }

    #[test]
    fn radial_falloff_is_zero_at_focus_and_saturates() {
        let f = Falloff::Radial { exponent: 2.0 };
        assert_eq!(f.effective_sigma(8.0, [0.25, -0.5], [0.25, -0.5]), 0.0);
        let far = f.effective_sigma(8.0, [1.0, 1.0], [-1.0, -1.0]);
        assert!((far - 8.0).abs() < 1e-6);
    }
}
