// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Headless

use std::f32::consts::{FRAC_PI_2, PI};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};

use nublur::util::RenderContext;
use nublur::{
    BlurParams, Blurrer, BlurrerOptions, CpuBlurrer, Falloff, PipelineMode, SourceImage,
};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Input image (PNG); a procedural test card is used when omitted.
    #[arg(long)]
    image: Option<PathBuf>,
    /// Focus point in [-1, 1] image coordinates, (0, 0) being the center.
    #[arg(long, num_args = 2, value_names = ["X", "Y"], allow_negative_numbers = true, default_values_t = [0.0, 0.0])]
    focus: Vec<f32>,
    /// Gaussian standard deviation in pixels at the point of maximum blur.
    #[arg(long, default_value_t = 24.0)]
    sigma: f32,
    /// Apply the full sigma everywhere instead of the radial falloff.
    #[arg(long)]
    uniform: bool,
    /// How the blur passes are issued.
    #[arg(long, value_enum, default_value_t = Mode::Hybrid)]
    mode: Mode,
    /// Number of frames to render; more than one animates the focus and
    /// sigma at 60 fps and numbers the output files.
    #[arg(long, default_value_t = 1)]
    frames: u32,
    /// Run on the CPU backend instead of a GPU device.
    #[arg(long)]
    cpu: bool,
    /// Output path.
    #[arg(long, default_value = "blurred.png")]
    out: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Hybrid,
    Graphics,
    Compute,
}

impl From<Mode> for PipelineMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Hybrid => Self::Hybrid,
            Mode::Graphics => Self::Graphics,
            Mode::Compute => Self::Compute,
        }
    }
}

enum Engine {
    Cpu(CpuBlurrer),
    Gpu {
        context: RenderContext,
        device_id: usize,
        blurrer: Blurrer,
    },
}

impl Engine {
    fn run(&mut self, params: &BlurParams) -> Result<Vec<u8>, nublur::Error> {
        match self {
            Self::Cpu(blurrer) => {
                blurrer.process(params)?;
                blurrer.read_result()
            }
            Self::Gpu {
                context,
                device_id,
                blurrer,
            } => {
                let handle = &context.devices[*device_id];
                blurrer.process(&handle.device, &handle.queue, params)?;
                blurrer.read_result(&handle.device, &handle.queue)
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let (width, height, data) = match &args.image {
        Some(path) => {
            let image = image::open(path)
                .with_context(|| format!("couldn't load {path:?}"))?
                .to_rgba8();
            let (width, height) = image.dimensions();
            (width, height, image.into_raw())
        }
        None => {
            let (width, height) = (512, 512);
            (width, height, test_card(width, height))
        }
    };
    let source = SourceImage {
        width,
        height,
        data: &data,
    };
    let options = BlurrerOptions {
        mode: args.mode.into(),
        falloff: if args.uniform {
            Falloff::Uniform
        } else {
            Falloff::default()
        },
        ..Default::default()
    };

    let mut engine = if args.cpu {
        Engine::Cpu(CpuBlurrer::new(source, options)?)
    } else {
        let mut context = RenderContext::new();
        let device_id = pollster::block_on(context.device())
            .ok_or_else(|| anyhow!("no compatible device found"))?;
        let handle = &context.devices[device_id];
        let blurrer = Blurrer::new(&handle.device, &handle.queue, source, options)?;
        Engine::Gpu {
            context,
            device_id,
            blurrer,
        }
    };

    for frame in 0..args.frames {
        let params = if args.frames == 1 {
            BlurParams {
                focus: [args.focus[0], args.focus[1]],
                sigma: args.sigma,
            }
        } else {
            animate(frame as f32 / 60.0)
        };
        let result = match engine.run(&params) {
            Ok(result) => result,
            Err(err) => {
                log::warn!("dropping frame {frame}: {err}");
                continue;
            }
        };
        let path = if args.frames == 1 {
            args.out.clone()
        } else {
            numbered(&args.out, frame)
        };
        image::save_buffer(&path, &result, width, height, image::ExtendedColorType::Rgba8)
            .with_context(|| format!("couldn't write {path:?}"))?;
        log::info!("wrote {path:?}");
    }
    Ok(())
}

/// Focus orbiting the center with a pulsing sigma.
fn animate(time: f32) -> BlurParams {
    let t = 1.6 * time;
    let r = (FRAC_PI_2 * t).sin() * 0.25 + 0.25;
    BlurParams {
        focus: [r * (PI * t).cos(), r * (PI * t).sin()],
        sigma: 32.0 * (0.5 - 0.5 * t.cos()),
    }
}

/// Checkerboard with concentric rings; enough structure at every scale to
/// make the blur gradient visible.
fn test_card(width: u32, height: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let checker = u8::from((x / 32 + y / 32) % 2 == 0) * 64;
            let dx = x as f32 - width as f32 / 2.0;
            let dy = y as f32 - height as f32 / 2.0;
            let ring = ((dx * dx + dy * dy).sqrt() / 12.0).sin();
            let g = 96 + checker;
            let r = (f32::from(g) + ring * 64.0).clamp(0.0, 255.0) as u8;
            data.extend_from_slice(&[r, g, 255 - r, 255]);
        }
    }
    data
}

fn numbered(out: &Path, frame: u32) -> PathBuf {
    let stem = out.file_stem().and_then(|s| s.to_str()).unwrap_or("frame");
    let ext = out.extension().and_then(|s| s.to_str()).unwrap_or("png");
    out.with_file_name(format!("{stem}_{frame:03}.{ext}"))
}
