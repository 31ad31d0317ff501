// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Renders the same frame on a real device and on the CPU backend and checks
//! that they agree. Needs an adapter; run with `NUBLUR_CI_GPU_SUPPORT=yes`.

use nublur::PipelineMode;
use nublur_tests::{gradient_image, mean_absolute_difference, TestFrame};

/// The GPU path quantizes to rgba8 at every pyramid level, the CPU path only
/// at readback, so allow a couple of code values of drift.
const TOLERANCE: f64 = 2.0 / 255.0;

fn compare_backends(mode: PipelineMode) {
    let (width, height) = (96, 64);
    let data = gradient_image(width, height);
    let mut frame = TestFrame::new(8.0);
    frame.focus = [0.25, -0.4];
    frame.mode = mode;

    let cpu = frame.blur_cpu(width, height, &data).unwrap();
    let gpu = frame.blur_gpu(width, height, &data).unwrap();
    let mad = mean_absolute_difference(&cpu, &gpu);
    assert!(
        mad < TOLERANCE,
        "{mode:?}: backends disagree, mean difference {mad}"
    );
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn gpu_matches_cpu_compute() {
    compare_backends(PipelineMode::Compute);
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn gpu_matches_cpu_graphics() {
    compare_backends(PipelineMode::Graphics);
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn gpu_matches_cpu_hybrid() {
    compare_backends(PipelineMode::Hybrid);
}

/// A same-extent blit samples every texel at its center, so the surface path
/// must agree with the plain readback.
#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn texture_blit_matches_readback() {
    let (width, height) = (96, 64);
    let data = gradient_image(width, height);
    let mut frame = TestFrame::new(8.0);
    frame.focus = [0.25, -0.4];

    let direct = frame.blur_gpu(width, height, &data).unwrap();
    let blitted = frame.blur_gpu_via_texture(width, height, &data).unwrap();
    let mad = mean_absolute_difference(&direct, &blitted);
    assert!(
        mad < TOLERANCE,
        "blit path diverges from readback, mean difference {mad}"
    );
}
