// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hand-built recordings against the CPU engine, checking that the per-mip
//! state tracking rejects misordered command streams and accepts correct
//! ones.

use nublur::low_level::{
    full_shaders_cpu, Command, CpuEngine, FullShaders, ImageProxy, MipStates, Recording,
    ResourceProxy, ResourceState,
};
use nublur::{Error, ImageFormat};

fn engine_with_shaders() -> (CpuEngine, FullShaders) {
    let mut engine = CpuEngine::new();
    let shaders = full_shaders_cpu(&mut engine);
    (engine, shaders)
}

#[test]
fn downsample_without_barrier_is_rejected() {
    let (mut engine, shaders) = engine_with_shaders();
    let image = ImageProxy::new(4, 4, 2, ImageFormat::Rgba8);
    let mut recording = Recording::default();
    recording.push(Command::UploadImage(image, vec![255; 4 * 4 * 4]));
    // Mip 1 was never transitioned to a writable state.
    recording.dispatch(
        shaders.resample,
        (1, 1, 1),
        [ResourceProxy::Sampler, image.mip(0), image.mip(1)],
    );

    let err = engine.run_recording(&recording).unwrap_err();
    assert!(
        matches!(err, Error::WrongResourceState { level: 1, .. }),
        "got {err}"
    );
}

#[test]
fn reconstruction_cannot_read_unwritten_levels() {
    let (mut engine, _shaders) = engine_with_shaders();
    let image = ImageProxy::new(8, 8, 4, ImageFormat::Rgba8);
    let mut recording = Recording::default();
    recording.push(Command::UploadImage(image, vec![0; 8 * 8 * 4]));

    // A barrier claiming mip 2 is readable, with nothing having produced it.
    let mut states = MipStates::new();
    let transition = states
        .transition(image, 2, ResourceState::ShaderRead)
        .unwrap();
    recording.barrier(vec![transition]);

    let err = engine.run_recording(&recording).unwrap_err();
    assert!(
        matches!(err, Error::ReadBeforeWrite { level: 2, .. }),
        "got {err}"
    );
}

#[test]
fn well_ordered_reduction_runs_and_averages() {
    let (mut engine, shaders) = engine_with_shaders();
    let image = ImageProxy::new(4, 4, 2, ImageFormat::Rgba8);

    // Four constant 2x2 blocks, so the box reduction is exact in u8.
    let blocks: [[u8; 4]; 4] = [
        [200, 0, 0, 255],
        [0, 100, 0, 255],
        [0, 0, 60, 255],
        [40, 40, 40, 255],
    ];
    let mut data = Vec::with_capacity(4 * 4 * 4);
    for y in 0..4 {
        for x in 0..4 {
            data.extend_from_slice(&blocks[(y / 2) * 2 + x / 2]);
        }
    }

    let mut recording = Recording::default();
    recording.push(Command::UploadImage(image, data));

    let mut states = MipStates::new();
    states.seed(image, 0, ResourceState::ShaderRead);
    let transitions = states
        .transition(image, 1, ResourceState::StorageWrite)
        .into_iter()
        .collect();
    recording.barrier(transitions);
    recording.dispatch(
        shaders.resample,
        (1, 1, 1),
        [ResourceProxy::Sampler, image.mip(0), image.mip(1)],
    );
    let transitions = states
        .transition(image, 1, ResourceState::CopySrc)
        .into_iter()
        .collect();
    recording.barrier(transitions);
    recording.download(image, 1);

    engine.run_recording(&recording).unwrap();
    let result = engine.take_download(image, 1).unwrap();
    let expected: Vec<u8> = blocks.iter().flatten().copied().collect();
    assert_eq!(result, expected);
}
