// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Parses and validates every assembled WGSL source with naga, and checks
//! that the hand-maintained pipeline metadata agrees with shader reflection.

use naga::valid::{Capabilities, ModuleInfo, ValidationFlags};
use naga::{AddressSpace, ImageClass, Module, ShaderStage, StorageAccess, TypeInner};
use nublur_shaders::{BindType, ComputeShader, RenderShader, SHADERS};

fn validate(name: &str, source: &str) -> (Module, ModuleInfo) {
    let module = naga::front::wgsl::parse_str(source)
        .unwrap_or_else(|err| panic!("{name}: WGSL parse failed:\n{}", err.emit_to_string(source)));
    let info = naga::valid::Validator::new(
        ValidationFlags::all() & !ValidationFlags::CONTROL_FLOW_UNIFORMITY,
        Capabilities::all(),
    )
    .validate(&module)
    .unwrap_or_else(|err| panic!("{name}: WGSL validation failed: {err:?}"));
    (module, info)
}

/// Bindings reachable from the given entry points, in `@binding` order.
fn reflect_bindings(module: &Module, info: &ModuleInfo, entries: &[&str]) -> Vec<(u32, BindType)> {
    let mut out = Vec::new();
    for (var_handle, var) in module.global_variables.iter() {
        let used = module.entry_points.iter().enumerate().any(|(i, entry)| {
            entries.contains(&entry.name.as_str()) && !info.get_entry_point(i)[var_handle].is_empty()
        });
        if !used {
            continue;
        }
        let Some(binding) = &var.binding else {
            continue;
        };
        let ty = match &module.types[var.ty].inner {
            TypeInner::Image { class, .. } => match class {
                ImageClass::Storage { access, .. } if access.contains(StorageAccess::STORE) => {
                    BindType::Image
                }
                _ => BindType::ImageRead,
            },
            TypeInner::Sampler { .. } => BindType::Sampler,
            _ => match var.space {
                AddressSpace::Uniform => BindType::Uniform,
                space => panic!("unexpected binding space {space:?}"),
            },
        };
        out.push((binding.binding, ty));
    }
    out.sort_by_key(|(index, _)| *index);
    out
}

fn check_compute(shader: &ComputeShader<'_>) {
    let (module, info) = validate(&shader.name, &shader.wgsl);
    let entry = module
        .entry_points
        .iter()
        .find(|entry| entry.name == shader.entry_point)
        .unwrap_or_else(|| panic!("{}: entry point {} missing", shader.name, shader.entry_point));
    assert_eq!(entry.stage, ShaderStage::Compute);
    assert_eq!(entry.workgroup_size, shader.workgroup_size, "{}", shader.name);
    let reflected = reflect_bindings(&module, &info, &[shader.entry_point]);
    let types: Vec<BindType> = reflected.iter().map(|(_, ty)| *ty).collect();
    assert_eq!(types, shader.bindings.as_ref(), "{}", shader.name);
}

fn check_render(shader: &RenderShader<'_>) {
    let (module, info) = validate(&shader.name, &shader.wgsl);
    for (entry_name, stage) in [
        (shader.vertex_entry, ShaderStage::Vertex),
        (shader.fragment_entry, ShaderStage::Fragment),
    ] {
        let entry = module
            .entry_points
            .iter()
            .find(|entry| entry.name == entry_name)
            .unwrap_or_else(|| panic!("{}: entry point {entry_name} missing", shader.name));
        assert_eq!(entry.stage, stage, "{}", shader.name);
    }
    let reflected = reflect_bindings(
        &module,
        &info,
        &[shader.vertex_entry, shader.fragment_entry],
    );
    let types: Vec<BindType> = reflected.iter().map(|(_, ty)| *ty).collect();
    assert_eq!(types, shader.bindings.as_ref(), "{}", shader.name);
}

#[test]
fn resample_is_valid() {
    check_compute(&SHADERS.resample);
}

#[test]
fn resample_draw_is_valid() {
    check_render(&SHADERS.resample_draw);
}

#[test]
fn upsample_is_valid() {
    check_compute(&SHADERS.upsample);
}

#[test]
fn upsample_blend_is_valid() {
    check_render(&SHADERS.upsample_blend);
}

#[test]
fn upsample_final_is_valid() {
    check_render(&SHADERS.upsample_final);
}

#[test]
fn binding_indices_are_dense() {
    for (name, source, entries) in [
        (
            "resample",
            SHADERS.resample.wgsl.as_ref(),
            vec![SHADERS.resample.entry_point],
        ),
        (
            "upsample",
            SHADERS.upsample.wgsl.as_ref(),
            vec![SHADERS.upsample.entry_point],
        ),
    ] {
        let (module, info) = validate(name, source);
        let entries: Vec<&str> = entries;
        let reflected = reflect_bindings(&module, &info, &entries);
        for (expected, (index, _)) in reflected.iter().enumerate() {
            assert_eq!(*index, expected as u32, "{name}");
        }
    }
}
