use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageError, ImageReader, RgbImage};
use tracing::{debug, info, warn};

use crate::avi::AviWriter;
use crate::scan::{list_frames, ScanError};

pub const DEFAULT_OUTPUT: &str = "output.avi";
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_QUALITY: u8 = 95;

#[derive(Debug, Clone)]
pub struct AssembleOptions {
    pub folder: PathBuf,
    pub output: PathBuf,
    pub fps: u32,
    /// JPEG quality for each encoded frame, 1-100.
    pub quality: u8,
}

impl AssembleOptions {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            fps: DEFAULT_FPS,
            quality: DEFAULT_QUALITY,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyReport {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frames_written: u32,
    pub frames_skipped: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("no images found in {0}")]
    NoImages(String),
    #[error("error reading the first image {0}: {1}")]
    FirstFrame(String, ImageError),
    #[error("fps must be a positive integer, got {0}")]
    InvalidFps(u32),
    #[error("jpeg quality must be within 1..=100, got {0}")]
    InvalidQuality(u8),
    #[error("failed to create output {0}: {1}")]
    CreateOutput(String, std::io::Error),
    #[error("failed to encode frame {0}: {1}")]
    Encode(String, ImageError),
    #[error("failed to write output {0}: {1}")]
    Write(String, std::io::Error),
}

/// Stitch every image in `options.folder` into an MJPG AVI at `options.output`.
///
/// Nothing is written unless at least one image is found and the first one
/// (in name order) decodes. Later frames that fail to decode are skipped;
/// frames of a different size are stretched to the first frame's size.
pub fn assemble(options: &AssembleOptions) -> Result<AssemblyReport, AssembleError> {
    assemble_into(options, |path| File::create(path).map(BufWriter::new))
}

/// [`assemble`] with the output sink supplied by `open`. The file at
/// `options.output` is removed if writing fails after `open` succeeded.
fn assemble_into<W, F>(options: &AssembleOptions, open: F) -> Result<AssemblyReport, AssembleError>
where
    W: Write + Seek,
    F: FnOnce(&Path) -> std::io::Result<W>,
{
    if options.fps == 0 {
        return Err(AssembleError::InvalidFps(options.fps));
    }
    if !(1..=100).contains(&options.quality) {
        return Err(AssembleError::InvalidQuality(options.quality));
    }

    let images = list_frames(&options.folder)?;
    let Some(first) = images.first() else {
        return Err(AssembleError::NoImages(options.folder.display().to_string()));
    };

    let first_frame = decode_frame(first)
        .map_err(|e| AssembleError::FirstFrame(first.display().to_string(), e))?;
    let (width, height) = (first_frame.width(), first_frame.height());
    drop(first_frame);

    info!(width, height, frames = images.len(), "video frame size");

    let output = options.output.as_path();
    let sink =
        open(output).map_err(|e| AssembleError::CreateOutput(output.display().to_string(), e))?;

    match write_video(sink, &images, options, width, height) {
        Ok((frames_written, frames_skipped)) => {
            info!(
                output = output.display().to_string(),
                frames_written, frames_skipped, "video saved"
            );
            Ok(AssemblyReport {
                output: output.to_path_buf(),
                width,
                height,
                frames_written,
                frames_skipped,
            })
        }
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(output) {
                warn!(output = output.display().to_string(), error = %rm, "failed to remove partial output");
            }
            Err(e)
        }
    }
}

fn write_video<W: Write + Seek>(
    out: W,
    images: &[PathBuf],
    options: &AssembleOptions,
    width: u32,
    height: u32,
) -> Result<(u32, u32), AssembleError> {
    let output = options.output.display().to_string();
    let write_err = |e| AssembleError::Write(output.clone(), e);

    let mut writer = AviWriter::new(out, width, height, options.fps).map_err(write_err)?;
    let mut skipped = 0u32;
    let mut jpeg = Vec::new();

    for path in images {
        let frame = match decode_frame(path) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = path.display().to_string(), error = %e, "could not read image, skipping");
                skipped += 1;
                continue;
            }
        };

        let rgb = fit_frame(frame, width, height);

        jpeg.clear();
        let encoder = JpegEncoder::new_with_quality(&mut jpeg, options.quality);
        rgb.write_with_encoder(encoder)
            .map_err(|e| AssembleError::Encode(path.display().to_string(), e))?;

        writer.write_frame(&jpeg).map_err(write_err)?;
        debug!(path = path.display().to_string(), bytes = jpeg.len(), "frame written");
    }

    let written = writer.frame_count();
    writer.finish().map_err(write_err)?;
    Ok((written, skipped))
}

/// Decode by content rather than trusting the extension.
fn decode_frame(path: &Path) -> Result<DynamicImage, ImageError> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}

/// Convert to RGB8 and stretch to `width` x `height` if the size differs.
fn fit_frame(frame: DynamicImage, width: u32, height: u32) -> RgbImage {
    let rgb = frame.into_rgb8();
    if rgb.dimensions() == (width, height) {
        return rgb;
    }
    debug!(
        from_w = rgb.width(),
        from_h = rgb.height(),
        to_w = width,
        to_h = height,
        "resizing frame"
    );
    imageops::resize(&rgb, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avi::parse;
    use image::Rgb;

    fn save_solid(dir: &Path, name: &str, w: u32, h: u32, color: [u8; 3]) {
        RgbImage::from_pixel(w, h, Rgb(color))
            .save(dir.join(name))
            .unwrap();
    }

    fn options_for(dir: &Path, fps: u32) -> AssembleOptions {
        AssembleOptions {
            output: dir.join("out.avi"),
            fps,
            ..AssembleOptions::new(dir.join("frames"))
        }
    }

    fn frames_dir(dir: &Path) -> PathBuf {
        let frames = dir.join("frames");
        std::fs::create_dir(&frames).unwrap();
        frames
    }

    #[test]
    fn mixed_sizes_are_stretched_to_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let frames = frames_dir(dir.path());
        save_solid(&frames, "a.png", 10, 10, [255, 0, 0]);
        save_solid(&frames, "b.jpg", 20, 20, [0, 255, 0]);
        save_solid(&frames, "c.bmp", 10, 10, [0, 0, 255]);

        let options = options_for(dir.path(), 10);
        let report = assemble(&options).unwrap();
        assert_eq!(
            report,
            AssemblyReport {
                output: options.output.clone(),
                width: 10,
                height: 10,
                frames_written: 3,
                frames_skipped: 0,
            }
        );

        let avi = parse::parse(&std::fs::read(&options.output).unwrap());
        assert_eq!((avi.width, avi.height), (10, 10));
        assert_eq!(avi.total_frames, 3);
        assert_eq!(avi.rate, 10);
        assert_eq!(avi.frames.len(), 3);

        for (jpeg, expected) in avi.frames.iter().zip([[255, 0, 0], [0, 255, 0], [0, 0, 255]]) {
            let frame = image::load_from_memory(jpeg).unwrap().into_rgb8();
            assert_eq!(frame.dimensions(), (10, 10));
            let px = frame.get_pixel(5, 5).0;
            for c in 0..3 {
                assert!(
                    (px[c] as i32 - expected[c] as i32).abs() < 40,
                    "pixel {px:?} too far from {expected:?}"
                );
            }
        }
    }

    #[test]
    fn folder_without_images_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let frames = frames_dir(dir.path());
        std::fs::write(frames.join("notes.txt"), b"hello").unwrap();

        let options = options_for(dir.path(), 30);
        assert!(matches!(assemble(&options), Err(AssembleError::NoImages(_))));
        assert!(!options.output.exists());
    }

    #[test]
    fn unreadable_first_frame_aborts_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let frames = frames_dir(dir.path());
        std::fs::write(frames.join("a.png"), b"definitely not a png").unwrap();
        save_solid(&frames, "b.png", 8, 8, [10, 20, 30]);

        let options = options_for(dir.path(), 30);
        assert!(matches!(
            assemble(&options),
            Err(AssembleError::FirstFrame(..))
        ));
        assert!(!options.output.exists());
    }

    #[test]
    fn unreadable_middle_frame_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let frames = frames_dir(dir.path());
        save_solid(&frames, "a.png", 8, 8, [10, 20, 30]);
        std::fs::write(frames.join("b.png"), b"garbage").unwrap();
        save_solid(&frames, "c.png", 8, 8, [30, 20, 10]);

        let options = options_for(dir.path(), 30);
        let report = assemble(&options).unwrap();
        assert_eq!(report.frames_written, 2);
        assert_eq!(report.frames_skipped, 1);

        let avi = parse::parse(&std::fs::read(&options.output).unwrap());
        assert_eq!(avi.total_frames, 2);
        assert_eq!(avi.frames.len(), 2);
    }

    #[test]
    fn content_is_decoded_regardless_of_extension() {
        let dir = tempfile::tempdir().unwrap();
        let frames = frames_dir(dir.path());
        // PNG bytes behind a .jpg name.
        let tmp = dir.path().join("real.png");
        RgbImage::from_pixel(6, 4, Rgb([1, 2, 3])).save(&tmp).unwrap();
        std::fs::copy(&tmp, frames.join("a.jpg")).unwrap();

        let report = assemble(&options_for(dir.path(), 30)).unwrap();
        assert_eq!((report.width, report.height), (6, 4));
        assert_eq!(report.frames_written, 1);
    }

    /// Seekable sink whose writes always fail.
    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "device gone"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for BrokenSink {
        fn seek(&mut self, _pos: std::io::SeekFrom) -> std::io::Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn write_failure_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let frames = frames_dir(dir.path());
        save_solid(&frames, "a.png", 4, 4, [0, 0, 0]);
        save_solid(&frames, "b.png", 4, 4, [9, 9, 9]);

        let options = options_for(dir.path(), 30);
        let result = assemble_into(&options, |path| {
            File::create(path)?;
            Ok(BrokenSink)
        });
        assert!(matches!(result, Err(AssembleError::Write(..))));
        assert!(!options.output.exists());
    }

    #[test]
    fn output_create_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let frames = frames_dir(dir.path());
        save_solid(&frames, "a.png", 4, 4, [0, 0, 0]);

        let options = AssembleOptions {
            output: dir.path().join("no-such-dir").join("out.avi"),
            ..options_for(dir.path(), 30)
        };
        assert!(matches!(
            assemble(&options),
            Err(AssembleError::CreateOutput(..))
        ));
    }

    #[test]
    fn missing_folder_is_a_scan_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_for(dir.path(), 30);
        assert!(matches!(assemble(&options), Err(AssembleError::Scan(_))));
        assert!(!options.output.exists());
    }

    #[test]
    fn invalid_settings_are_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let frames = frames_dir(dir.path());
        save_solid(&frames, "a.png", 4, 4, [0, 0, 0]);

        let options = options_for(dir.path(), 0);
        assert!(matches!(assemble(&options), Err(AssembleError::InvalidFps(0))));

        let options = AssembleOptions {
            quality: 0,
            ..options_for(dir.path(), 30)
        };
        assert!(matches!(
            assemble(&options),
            Err(AssembleError::InvalidQuality(0))
        ));
        assert!(!options.output.exists());
    }
}
