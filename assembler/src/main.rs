use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use imgseq_assembler::assemble::{DEFAULT_FPS, DEFAULT_OUTPUT, DEFAULT_QUALITY};
use imgseq_assembler::{assemble, AssembleOptions};
use tracing::{error, warn};

/// Stitch a folder of images into an MJPG AVI video.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Folder to scan for .png/.jpg/.jpeg/.bmp/.tiff images
    folder_path: PathBuf,

    /// Destination video file
    #[arg(default_value = DEFAULT_OUTPUT)]
    output_file: PathBuf,

    /// Frames per second; falls back to the default if not a positive integer
    fps: Option<String>,

    /// JPEG quality of each encoded frame
    #[arg(long, default_value_t = DEFAULT_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,
}

fn parse_fps(raw: Option<&str>) -> u32 {
    let Some(raw) = raw else {
        return DEFAULT_FPS;
    };
    match raw.trim().parse::<u32>() {
        Ok(fps) if fps > 0 => fps,
        _ => {
            warn!(fps = raw, "FPS must be a positive integer. Using default FPS={DEFAULT_FPS}.");
            DEFAULT_FPS
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    imgseq_common::logging::init("info");

    let options = AssembleOptions {
        folder: args.folder_path,
        output: args.output_file,
        fps: parse_fps(args.fps.as_deref()),
        quality: args.quality,
    };

    match assemble(&options) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "video assembly failed");
            ExitCode::FAILURE
        }
    }
}
