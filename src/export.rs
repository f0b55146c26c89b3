//! # PNG Export
//!
//! A ready-made consumer for emitted captures: PNG encoding with the `image`
//! crate and sequential file persistence. Both are CPU- and I/O-heavy, so they
//! run on a worker fed by a [`ChannelSink`](crate::sink::ChannelSink), never
//! on the render-synchronized context.
//!
//! Files are laid out as
//!
//! ```text
//! <base>/AsyncCapture_<unix-seconds>/AsyncCaptureImage_0.png
//!                                   /AsyncCaptureImage_1.png
//!                                   ...
//! ```
//!
//! numbered in the order the worker receives them.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use image::{DynamicImage, ImageFormat, Rgba32FImage, RgbaImage};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::format::CaptureFormat;
use crate::frame::Capture;

/// Encodes a capture as PNG.
///
/// 8-bit formats are written as they are; float captures are clamped to
/// `0.0..=1.0` and quantized to 8-bit RGBA first.
pub fn encode_png(capture: &Capture) -> Result<Vec<u8>> {
    let image = to_image(capture)?;
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .with_context(|| format!("encoding capture {} as PNG", capture.sequence))?;
    Ok(png)
}

fn to_image(capture: &Capture) -> Result<DynamicImage> {
    let image = match capture.format {
        CaptureFormat::Rgba8Srgb | CaptureFormat::Rgba8Unorm => {
            RgbaImage::from_raw(capture.width, capture.height, capture.data.to_vec())
                .map(DynamicImage::ImageRgba8)
        }
        CaptureFormat::Rgba32Float => {
            let channels: Vec<f32> = capture
                .data
                .chunks_exact(4)
                .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            Rgba32FImage::from_raw(capture.width, capture.height, channels)
                .map(|image| DynamicImage::ImageRgba8(DynamicImage::ImageRgba32F(image).to_rgba8()))
        }
    };

    image.ok_or_else(|| {
        CaptureError::encode(format!(
            "{} bytes do not form a {}x{} {:?} image",
            capture.data.len(),
            capture.width,
            capture.height,
            capture.format
        ))
        .into()
    })
}

/// Writes captures as numbered PNG files into one directory.
#[derive(Debug)]
pub struct CaptureWriter {
    directory: PathBuf,
    next_index: u64,
}

impl CaptureWriter {
    /// Creates a fresh `AsyncCapture_<unix-seconds>` directory under `base`.
    pub fn create(base: impl AsRef<Path>) -> Result<Self> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock is before the unix epoch")?
            .as_secs();
        Self::in_directory(base.as_ref().join(format!("AsyncCapture_{}", stamp)))
    }

    /// Writes into `directory`, creating it if needed.
    pub fn in_directory(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)
            .with_context(|| format!("creating capture directory {}", directory.display()))?;
        info!(directory = %directory.display(), "capture directory ready");
        Ok(Self {
            directory,
            next_index: 0,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Files written so far.
    pub fn written(&self) -> u64 {
        self.next_index
    }

    /// Encodes `capture` and writes it as the next numbered file.
    pub fn write(&mut self, capture: &Capture) -> Result<PathBuf> {
        let png = encode_png(capture)?;
        let path = self
            .directory
            .join(format!("AsyncCaptureImage_{}.png", self.next_index));
        fs::write(&path, png).with_context(|| format!("writing {}", path.display()))?;
        self.next_index += 1;
        debug!(sequence = capture.sequence, path = %path.display(), "capture saved");
        Ok(path)
    }
}

/// Drains `captures` on a blocking worker until every sender is gone.
///
/// Failed writes are logged and skipped. Resolves to the number of files
/// written.
pub fn spawn_export_worker(
    mut writer: CaptureWriter,
    captures: Receiver<Capture>,
) -> JoinHandle<u64> {
    tokio::task::spawn_blocking(move || {
        for capture in captures {
            if let Err(error) = writer.write(&capture) {
                warn!(sequence = capture.sequence, "failed to save capture: {:#}", error);
            }
        }
        writer.written()
    })
}
