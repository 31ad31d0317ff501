// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Properties the blur must hold in every pipeline mode, checked on the CPU
//! backend.

use nublur::PipelineMode;
use nublur_tests::{
    checker_image, gradient_image, mean_absolute_difference, solid_image, TestFrame,
};

const MODES: [PipelineMode; 3] = [
    PipelineMode::Compute,
    PipelineMode::Graphics,
    PipelineMode::Hybrid,
];

#[test]
fn zero_sigma_is_identity() {
    let (width, height) = (64, 48);
    let data = gradient_image(width, height);
    for mode in MODES {
        let mut frame = TestFrame::new(0.0);
        frame.mode = mode;
        let result = frame.blur_cpu(width, height, &data).unwrap();
        assert_eq!(result, data, "{mode:?} at sigma 0 must reproduce the source");
    }
}

#[test]
fn solid_color_is_invariant() {
    let (width, height) = (512, 512);
    let data = solid_image(width, height, [120, 40, 200, 255]);
    for sigma in [0.0, 32.0] {
        let frame = TestFrame::new(sigma);
        let result = frame.blur_cpu(width, height, &data).unwrap();
        assert_eq!(result, data, "solid color changed at sigma {sigma}");
    }
}

#[test]
fn modes_agree_on_gradient() {
    let (width, height) = (96, 64);
    let data = gradient_image(width, height);
    let results: Vec<Vec<u8>> = MODES
        .iter()
        .map(|&mode| {
            let mut frame = TestFrame::new(8.0);
            frame.focus = [0.25, -0.4];
            frame.mode = mode;
            frame.blur_cpu(width, height, &data).unwrap()
        })
        .collect();
    for i in 0..results.len() {
        for j in i + 1..results.len() {
            let mad = mean_absolute_difference(&results[i], &results[j]);
            assert!(
                mad < 1.0 / 255.0,
                "{:?} and {:?} disagree, mean difference {mad}",
                MODES[i],
                MODES[j]
            );
        }
    }
}

#[test]
fn radial_falloff_keeps_focus_sharp() {
    let (width, height) = (256, 256);
    let data = checker_image(width, height, 8);
    let frame = TestFrame::new(24.0);
    let result = frame.blur_cpu(width, height, &data).unwrap();

    let texel = |buf: &[u8], x: u32, y: u32| {
        let i = ((y * width + x) * 4) as usize;
        [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]
    };
    // The default falloff drops the effective sigma to zero at the focus.
    assert_eq!(texel(&result, 128, 128), texel(&data, 128, 128));
    // Far from the focus the full sigma applies and the cells smear out.
    assert_ne!(texel(&result, 8, 8), texel(&data, 8, 8));
}

#[test]
fn larger_sigma_blurs_more() {
    let (width, height) = (128, 128);
    let data = checker_image(width, height, 4);
    let mut spreads = Vec::new();
    for sigma in [2.0, 8.0, 32.0] {
        let mut frame = TestFrame::new(sigma);
        frame.falloff = nublur::Falloff::Uniform;
        let result = frame.blur_cpu(width, height, &data).unwrap();
        // A checker blurred toward its mean has shrinking deviation from 128.
        let spread: u64 = result
            .chunks_exact(4)
            .map(|px| u64::from(px[0].abs_diff(128)))
            .sum();
        spreads.push(spread);
    }
    assert!(
        spreads[0] > spreads[1] && spreads[1] > spreads[2],
        "contrast must fall as sigma grows: {spreads:?}"
    );
}
