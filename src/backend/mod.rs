//! # Rendering Backend Interface
//!
//! The capture core never talks to a graphics API directly. Everything it
//! needs from the host engine goes through [`RenderBackend`]:
//!
//! - **Render-surface blits**: grabbing the screen into a render target and
//!   copying a source into the forward-facing target that gets read back.
//! - **Readback transport**: allocating device-side staging buffers and issuing
//!   asynchronous device-to-host copies, each represented by a pollable
//!   [`ReadbackRequest`].
//!
//! ## Threading
//!
//! Every method is called from the render-synchronized context that owns the
//! driver. Requests are never awaited in-line; the driver only inspects
//! [`ReadbackRequest::status`] and, once it reports `Done`, copies the mapped
//! bytes out with [`ReadbackRequest::read_mapped`].
//!
//! ## Screen Orientation
//!
//! Screen grabs and texture sampling disagree on the direction of the Y axis,
//! so a screen capture is blitted through [`BlitTransform::FLIP_Y`]
//! (scale `(1, -1)`, offset `(0, 1)`). Texture sources use the identity
//! transform.

pub mod software;

use crate::error::CaptureResult;
use crate::format::{CaptureFormat, SourceFormat};

/// Status of one asynchronous device-to-host copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// The copy has not resolved yet
    Pending,
    /// The copy finished and its mapped bytes can be read
    Done,
    /// The copy resolved with an error; its bytes must not be read
    Error,
}

impl TransferStatus {
    /// Whether the transport has finished with this request, successfully or not.
    pub fn is_done(self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }

    pub fn has_error(self) -> bool {
        matches!(self, TransferStatus::Error)
    }
}

/// A pollable handle to an in-flight readback.
pub trait ReadbackRequest {
    /// Current status. Must not block.
    fn status(&self) -> TransferStatus;

    /// Copies the host-visible mapped bytes into `dst`.
    ///
    /// Only valid once [`status`](Self::status) reports `Done`; errors
    /// otherwise or when `dst` has the wrong length.
    fn read_mapped(&self, dst: &mut [u8]) -> CaptureResult<()>;
}

/// Scale and offset applied to texture coordinates during a blit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlitTransform {
    pub scale: [f32; 2],
    pub offset: [f32; 2],
}

impl BlitTransform {
    pub const IDENTITY: BlitTransform = BlitTransform {
        scale: [1.0, 1.0],
        offset: [0.0, 0.0],
    };

    /// Vertical flip for screen grabs.
    pub const FLIP_Y: BlitTransform = BlitTransform {
        scale: [1.0, -1.0],
        offset: [0.0, 1.0],
    };

    pub fn flips_y(&self) -> bool {
        self.scale[1] < 0.0
    }

    pub fn flips_x(&self) -> bool {
        self.scale[0] < 0.0
    }
}

/// Size and format of a texture as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub format: SourceFormat,
}

/// Host engine services the capture driver depends on.
pub trait RenderBackend {
    /// Texture or render target handle
    type Texture;
    /// Device-side staging buffer a readback lands in
    type Staging;
    /// Handle to one in-flight readback
    type Request: ReadbackRequest;

    /// Size of the rendering surface in pixels.
    fn screen_size(&self) -> (u32, u32);

    /// Pixel format a screen grab is produced in.
    fn screen_format(&self) -> SourceFormat;

    /// Size and format of `texture`; errors for handles the backend does not know.
    fn texture_info(&self, texture: &Self::Texture) -> CaptureResult<TextureInfo>;

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        format: CaptureFormat,
    ) -> CaptureResult<Self::Texture>;

    fn release_render_target(&mut self, target: Self::Texture);

    /// Allocates a staging buffer of exactly `len` bytes.
    fn create_staging(&mut self, len: usize) -> CaptureResult<Self::Staging>;

    fn release_staging(&mut self, staging: Self::Staging);

    /// Grabs the current screen contents into `target`, in screen orientation.
    fn capture_screen_into(&mut self, target: &Self::Texture);

    /// Copies `source` into `target` through `transform`.
    fn blit(&mut self, source: &Self::Texture, target: &Self::Texture, transform: BlitTransform);

    /// Issues an asynchronous copy of `source` into `staging`. Fire-and-forget:
    /// completion is observed through the returned request.
    fn request_readback(
        &mut self,
        source: &Self::Texture,
        staging: &mut Self::Staging,
    ) -> Self::Request;

    /// Blocks until every outstanding request has resolved.
    fn wait_all_requests(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_status_flags() {
        assert!(!TransferStatus::Pending.is_done());
        assert!(TransferStatus::Done.is_done());
        assert!(TransferStatus::Error.is_done());
        assert!(TransferStatus::Error.has_error());
        assert!(!TransferStatus::Done.has_error());
    }

    #[test]
    fn test_blit_transforms() {
        assert!(BlitTransform::FLIP_Y.flips_y());
        assert!(!BlitTransform::FLIP_Y.flips_x());
        assert!(!BlitTransform::IDENTITY.flips_y());
    }
}
