// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Build step.

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=NUBLUR_CI_GPU_SUPPORT");
    println!("cargo:rustc-check-cfg=cfg(skip_gpu_tests)");
    // GPU tests are opt-in; many CI runners have no adapter at all.
    match env::var("NUBLUR_CI_GPU_SUPPORT") {
        Ok(mut value) => {
            value.make_ascii_lowercase();
            match &*value {
                "yes" | "y" => {}
                "no" | "n" => {
                    println!("cargo:rustc-cfg=skip_gpu_tests");
                }
                _ => {
                    println!("cargo:warning=NUBLUR_CI_GPU_SUPPORT should be set to yes/y or no/n");
                    println!("cargo:rustc-cfg=skip_gpu_tests");
                }
            }
        }
        Err(_) => {
            println!("cargo:rustc-cfg=skip_gpu_tests");
        }
    }
}
