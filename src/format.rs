//! # Format Negotiation
//!
//! Maps the pixel format of a capture source onto one of the three formats the
//! capture pipeline can read back, and derives the per-pixel size used to size
//! every staging, host and output buffer.
//!
//! | Source format      | Capture format | Bytes per pixel |
//! |--------------------|----------------|-----------------|
//! | `Rgba8Srgb`        | `Rgba8Srgb`    | 4               |
//! | `Bc7Srgb`          | `Rgba8Srgb`    | 4               |
//! | `Rgba8Unorm`       | `Rgba8Unorm`   | 4               |
//! | `Rgba32Float`      | `Rgba32Float`  | 16              |
//!
//! Every other source format is rejected with
//! [`CaptureError::UnsupportedFormat`]. Negotiation runs once, during
//! initialization, before any buffer is allocated.

use crate::error::{CaptureError, CaptureResult};

/// Pixel formats a host texture or screen grab may present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Rgba8Srgb,
    Rgba8Unorm,
    Rgba32Float,
    /// Block-compressed sRGB; readback goes through an 8-bit sRGB target
    Bc7Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    Rgba16Float,
    R8Unorm,
    Rgb10A2Unorm,
    Depth32Float,
}

/// Formats the readback pipeline produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureFormat {
    /// 8 bits per channel, RGBA order, sRGB encoded
    Rgba8Srgb,
    /// 8 bits per channel, RGBA order, linear
    Rgba8Unorm,
    /// 32-bit float per channel, RGBA order
    Rgba32Float,
}

impl CaptureFormat {
    /// Size of one tightly packed pixel in bytes.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            CaptureFormat::Rgba8Srgb | CaptureFormat::Rgba8Unorm => 32 / 8,
            CaptureFormat::Rgba32Float => 128 / 8,
        }
    }

    /// Size of a tightly packed `width`×`height` frame in bytes.
    pub fn frame_len(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }

    /// The source format a render target of this capture format presents.
    pub const fn as_source(self) -> SourceFormat {
        match self {
            CaptureFormat::Rgba8Srgb => SourceFormat::Rgba8Srgb,
            CaptureFormat::Rgba8Unorm => SourceFormat::Rgba8Unorm,
            CaptureFormat::Rgba32Float => SourceFormat::Rgba32Float,
        }
    }
}

/// Negotiated capture format and its pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub format: CaptureFormat,
    pub bytes_per_pixel: usize,
}

/// Normalizes `source` to a supported capture format.
///
/// # Errors
///
/// Returns [`CaptureError::UnsupportedFormat`] for any format outside the
/// allow-list. This is a configuration error: callers must not allocate
/// capture buffers after it.
pub fn negotiate(source: SourceFormat) -> CaptureResult<Negotiated> {
    let format = match source {
        SourceFormat::Bc7Srgb | SourceFormat::Rgba8Srgb => CaptureFormat::Rgba8Srgb,
        SourceFormat::Rgba8Unorm => CaptureFormat::Rgba8Unorm,
        SourceFormat::Rgba32Float => CaptureFormat::Rgba32Float,
        other => {
            return Err(CaptureError::unsupported_format(other)
                .with_operation("negotiate")
                .with_recovery_suggestion(
                    "Blit the source into an RGBA8 (sRGB or linear) or RGBA32F texture first",
                ));
        }
    };

    Ok(Negotiated {
        format,
        bytes_per_pixel: format.bytes_per_pixel(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_formats() {
        let cases = [
            (SourceFormat::Rgba8Srgb, CaptureFormat::Rgba8Srgb, 4),
            (SourceFormat::Bc7Srgb, CaptureFormat::Rgba8Srgb, 4),
            (SourceFormat::Rgba8Unorm, CaptureFormat::Rgba8Unorm, 4),
            (SourceFormat::Rgba32Float, CaptureFormat::Rgba32Float, 16),
        ];
        for (source, expected, bpp) in cases {
            let negotiated = negotiate(source).unwrap();
            assert_eq!(negotiated.format, expected, "{:?}", source);
            assert_eq!(negotiated.bytes_per_pixel, bpp, "{:?}", source);
        }
    }

    #[test]
    fn test_rejected_formats() {
        for source in [
            SourceFormat::Bgra8Unorm,
            SourceFormat::Bgra8Srgb,
            SourceFormat::Rgba16Float,
            SourceFormat::R8Unorm,
            SourceFormat::Rgb10A2Unorm,
            SourceFormat::Depth32Float,
        ] {
            match negotiate(source) {
                Err(CaptureError::UnsupportedFormat { format, .. }) => assert_eq!(format, source),
                other => panic!("expected UnsupportedFormat for {:?}, got {:?}", source, other),
            }
        }
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(CaptureFormat::Rgba8Unorm.frame_len(4, 2), 32);
        assert_eq!(CaptureFormat::Rgba32Float.frame_len(4, 2), 128);
    }
}
