//! # Captured Frames
//!
//! [`Capture`] is the value handed to consumers for every completed readback.
//! It is a snapshot: its bytes are copied out of the slot's output buffer when
//! the capture is emitted, so later reuse of the slot never changes a capture a
//! consumer already holds. The bytes sit behind an `Arc`, so fanning one
//! capture out to several consumers or moving it to a worker thread does not
//! copy the frame again.

use std::sync::Arc;

use crate::format::CaptureFormat;

/// One captured frame.
///
/// `data` is row-major, top row first, tightly packed in `format`'s channel
/// order, and exactly `width * height * format.bytes_per_pixel()` bytes long.
#[derive(Debug, Clone)]
pub struct Capture {
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: CaptureFormat,
    /// Position of the originating request in issue order. Gaps mean dropped
    /// or failed captures; consumers that need strict order sort on this.
    pub sequence: u64,
}

impl Capture {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: CaptureFormat,
        sequence: u64,
    ) -> Self {
        debug_assert_eq!(data.len(), format.frame_len(width, height));
        Self {
            data: Arc::new(data),
            width,
            height,
            format,
            sequence,
        }
    }

    /// Length of one row in bytes.
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Bytes of row `y`, counted from the top.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let stride = self.stride();
        let start = y as usize * stride;
        self.data.get(start..start + stride)
    }

    /// Bytes of the pixel at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let start = x as usize * bpp;
        self.row(y).and_then(|row| row.get(start..start + bpp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_and_pixel_access() {
        let data: Vec<u8> = (0..32).collect();
        let capture = Capture::new(data, 2, 4, CaptureFormat::Rgba8Srgb, 3);

        assert_eq!(capture.stride(), 8);
        assert_eq!(capture.row(1), Some(&[8, 9, 10, 11, 12, 13, 14, 15][..]));
        assert_eq!(capture.pixel(1, 3), Some(&[28, 29, 30, 31][..]));
        assert_eq!(capture.row(4), None);
        assert_eq!(capture.pixel(2, 0), None);
    }

    #[test]
    fn test_clones_share_bytes() {
        let capture = Capture::new(vec![1u8; 16], 2, 2, CaptureFormat::Rgba8Unorm, 0);
        let other = capture.clone();
        assert!(Arc::ptr_eq(&capture.data, &other.data));
    }
}
