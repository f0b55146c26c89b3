//! # Software Rendering Backend
//!
//! An in-process [`RenderBackend`] that keeps every texture in host memory and
//! simulates asynchronous readbacks. It is the backend the demo binary runs on
//! and the one the test suites drive the scheduler with.
//!
//! ## Behavior
//!
//! - **Screen**: a top-down RGBA framebuffer the host draws into. A screen grab
//!   lands in a render target bottom-up, the way real screen grabs do, so the
//!   driver's vertical-flip blit is exercised.
//! - **Blits**: nearest-neighbour sampling through the blit transform. Source
//!   and target must have the same bytes per pixel.
//! - **Readbacks**: the source texture is snapshotted when the request is
//!   issued. The request resolves after `latency` calls to
//!   [`present`](SoftwareBackend::present) (`Some(0)` resolves immediately,
//!   `None` never resolves on its own). [`fail_request`](SoftwareBackend::fail_request)
//!   makes a chosen request resolve with an error.
//! - **Wait-all**: [`RenderBackend::wait_all_requests`] resolves everything
//!   outstanding. Releasing a staging buffer that an unresolved request still
//!   targets is counted as a release violation.
//!
//! Block-compressed source formats are held decompressed, four bytes per pixel.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{trace, warn};

use crate::backend::{
    BlitTransform, ReadbackRequest, RenderBackend, TextureInfo, TransferStatus,
};
use crate::error::{CaptureError, CaptureResult};
use crate::format::{CaptureFormat, SourceFormat};

/// Handle to a software texture or render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(u32);

/// Device-side staging buffer of the software backend.
#[derive(Debug)]
pub struct SoftwareStaging {
    id: u64,
    len: usize,
}

impl SoftwareStaging {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
struct ReadbackCell {
    status: TransferStatus,
    mapped: Vec<u8>,
}

/// Pollable handle to a simulated readback.
#[derive(Debug, Clone)]
pub struct SoftwareReadback {
    cell: Arc<Mutex<ReadbackCell>>,
}

impl ReadbackRequest for SoftwareReadback {
    fn status(&self) -> TransferStatus {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    fn read_mapped(&self, dst: &mut [u8]) -> CaptureResult<()> {
        let cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        if cell.status != TransferStatus::Done {
            return Err(CaptureError::resource(
                "readback",
                format!("mapped memory read while request is {:?}", cell.status),
            ));
        }
        if cell.mapped.len() != dst.len() {
            return Err(CaptureError::resource(
                "readback",
                format!(
                    "mapped {} bytes into a {} byte buffer",
                    cell.mapped.len(),
                    dst.len()
                ),
            ));
        }
        dst.copy_from_slice(&cell.mapped);
        Ok(())
    }
}

#[derive(Debug)]
struct SoftwareTexture {
    width: u32,
    height: u32,
    format: SourceFormat,
    pixels: Vec<u8>,
}

impl SoftwareTexture {
    fn new(width: u32, height: u32, format: SourceFormat) -> Self {
        Self {
            width,
            height,
            format,
            pixels: vec![0u8; width as usize * height as usize * storage_bpp(format)],
        }
    }
}

#[derive(Debug)]
struct InFlight {
    cell: Arc<Mutex<ReadbackCell>>,
    staging: u64,
    ready_frame: Option<u64>,
    fail: bool,
    payload: Vec<u8>,
}

impl InFlight {
    fn resolve(self) {
        let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        if self.fail {
            cell.status = TransferStatus::Error;
        } else {
            cell.mapped = self.payload;
            cell.status = TransferStatus::Done;
        }
    }
}

/// Host-memory implementation of [`RenderBackend`].
#[derive(Debug)]
pub struct SoftwareBackend {
    screen: SoftwareTexture,
    textures: HashMap<TextureId, SoftwareTexture>,
    render_targets: HashSet<TextureId>,
    next_texture: u32,
    live_staging: HashMap<u64, usize>,
    next_staging: u64,
    in_flight: Vec<InFlight>,
    frame: u64,
    latency: Option<u64>,
    failing: HashSet<u64>,
    requests_issued: u64,
    wait_all_calls: u64,
    release_violations: u64,
}

impl SoftwareBackend {
    /// Creates a backend with a `width`×`height` sRGB screen and one frame of
    /// readback latency.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            screen: SoftwareTexture::new(width, height, SourceFormat::Rgba8Srgb),
            textures: HashMap::new(),
            render_targets: HashSet::new(),
            next_texture: 0,
            live_staging: HashMap::new(),
            next_staging: 0,
            in_flight: Vec::new(),
            frame: 0,
            latency: Some(1),
            failing: HashSet::new(),
            requests_issued: 0,
            wait_all_calls: 0,
            release_violations: 0,
        }
    }

    /// Sets how many presented frames a readback takes; `None` stalls forever.
    pub fn with_latency(mut self, latency: Option<u64>) -> Self {
        self.latency = latency;
        self
    }

    /// Changes the format screen grabs are produced in.
    pub fn with_screen_format(mut self, format: SourceFormat) -> Self {
        self.screen = SoftwareTexture::new(self.screen.width, self.screen.height, format);
        self
    }

    /// Applies to requests issued from now on.
    pub fn set_latency(&mut self, latency: Option<u64>) {
        self.latency = latency;
    }

    /// Makes the `ordinal`-th request (0-based, in issue order) resolve with an error.
    pub fn fail_request(&mut self, ordinal: u64) {
        self.failing.insert(ordinal);
    }

    pub fn create_texture(&mut self, width: u32, height: u32, format: SourceFormat) -> TextureId {
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures
            .insert(id, SoftwareTexture::new(width, height, format));
        id
    }

    pub fn write_texture(&mut self, id: TextureId, pixels: &[u8]) -> CaptureResult<()> {
        let texture = self
            .textures
            .get_mut(&id)
            .ok_or_else(|| unknown_texture(id))?;
        copy_exact(&mut texture.pixels, pixels, "texture")
    }

    pub fn texture_pixels(&self, id: TextureId) -> Option<&[u8]> {
        self.textures.get(&id).map(|t| t.pixels.as_slice())
    }

    pub fn texture_pixels_mut(&mut self, id: TextureId) -> Option<&mut [u8]> {
        self.textures.get_mut(&id).map(|t| t.pixels.as_mut_slice())
    }

    /// Screen framebuffer, top row first.
    pub fn screen_pixels(&self) -> &[u8] {
        &self.screen.pixels
    }

    pub fn screen_pixels_mut(&mut self) -> &mut [u8] {
        &mut self.screen.pixels
    }

    pub fn write_screen(&mut self, pixels: &[u8]) -> CaptureResult<()> {
        copy_exact(&mut self.screen.pixels, pixels, "screen")
    }

    /// Ends a rendered frame and resolves every readback that came due.
    pub fn present(&mut self) {
        self.frame += 1;
        let frame = self.frame;
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .in_flight
            .drain(..)
            .partition(|entry| entry.ready_frame.is_some_and(|ready| ready <= frame));
        self.in_flight = waiting;
        for entry in due {
            entry.resolve();
        }
    }

    /// Frames presented so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn requests_issued(&self) -> u64 {
        self.requests_issued
    }

    /// Readbacks that have not resolved yet.
    pub fn pending_requests(&self) -> usize {
        self.in_flight.len()
    }

    pub fn live_staging(&self) -> usize {
        self.live_staging.len()
    }

    pub fn live_render_targets(&self) -> usize {
        self.render_targets.len()
    }

    pub fn wait_all_calls(&self) -> u64 {
        self.wait_all_calls
    }

    /// Staging buffers released while a request still targeted them.
    pub fn release_violations(&self) -> u64 {
        self.release_violations
    }
}

impl RenderBackend for SoftwareBackend {
    type Texture = TextureId;
    type Staging = SoftwareStaging;
    type Request = SoftwareReadback;

    fn screen_size(&self) -> (u32, u32) {
        (self.screen.width, self.screen.height)
    }

    fn screen_format(&self) -> SourceFormat {
        self.screen.format
    }

    fn texture_info(&self, texture: &TextureId) -> CaptureResult<TextureInfo> {
        let texture = self
            .textures
            .get(texture)
            .ok_or_else(|| unknown_texture(*texture))?;
        Ok(TextureInfo {
            width: texture.width,
            height: texture.height,
            format: texture.format,
        })
    }

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        format: CaptureFormat,
    ) -> CaptureResult<TextureId> {
        if width == 0 || height == 0 {
            return Err(CaptureError::resource(
                "render target",
                format!("cannot create a {}x{} target", width, height),
            ));
        }
        let id = self.create_texture(width, height, format.as_source());
        self.render_targets.insert(id);
        Ok(id)
    }

    fn release_render_target(&mut self, target: TextureId) {
        self.textures.remove(&target);
        self.render_targets.remove(&target);
    }

    fn create_staging(&mut self, len: usize) -> CaptureResult<SoftwareStaging> {
        if len == 0 {
            return Err(CaptureError::resource(
                "staging buffer",
                "cannot allocate an empty staging buffer",
            ));
        }
        let id = self.next_staging;
        self.next_staging += 1;
        self.live_staging.insert(id, len);
        Ok(SoftwareStaging { id, len })
    }

    fn release_staging(&mut self, staging: SoftwareStaging) {
        if self.in_flight.iter().any(|entry| entry.staging == staging.id) {
            self.release_violations += 1;
            warn!(staging = staging.id, "staging buffer released with a readback in flight");
        }
        self.live_staging.remove(&staging.id);
    }

    fn capture_screen_into(&mut self, target: &TextureId) {
        let Some(dst) = self.textures.get_mut(target) else {
            warn!(?target, "screen grab into unknown render target");
            return;
        };
        // Screen grabs arrive bottom-up
        sample(&self.screen, dst, BlitTransform::FLIP_Y);
    }

    fn blit(&mut self, source: &TextureId, target: &TextureId, transform: BlitTransform) {
        if source == target {
            warn!(?source, "blit source and target are the same texture");
            return;
        }
        let Some(mut dst) = self.textures.remove(target) else {
            warn!(?target, "blit into unknown texture");
            return;
        };
        match self.textures.get(source) {
            Some(src) => sample(src, &mut dst, transform),
            None => warn!(?source, "blit from unknown texture"),
        }
        self.textures.insert(*target, dst);
    }

    fn request_readback(
        &mut self,
        source: &TextureId,
        staging: &mut SoftwareStaging,
    ) -> SoftwareReadback {
        let ordinal = self.requests_issued;
        self.requests_issued += 1;

        let mut fail = self.failing.remove(&ordinal);
        let payload = match self.textures.get(source) {
            Some(texture) if texture.pixels.len() == staging.len => texture.pixels.clone(),
            Some(texture) => {
                warn!(
                    texture_len = texture.pixels.len(),
                    staging_len = staging.len,
                    "readback size mismatch"
                );
                fail = true;
                Vec::new()
            }
            None => {
                warn!(?source, "readback from unknown texture");
                fail = true;
                Vec::new()
            }
        };

        let cell = Arc::new(Mutex::new(ReadbackCell {
            status: TransferStatus::Pending,
            mapped: Vec::new(),
        }));
        let entry = InFlight {
            cell: cell.clone(),
            staging: staging.id,
            ready_frame: self.latency.map(|latency| self.frame + latency),
            fail,
            payload,
        };

        trace!(ordinal, staging = staging.id, ready = ?entry.ready_frame, "readback issued");
        if self.latency == Some(0) {
            entry.resolve();
        } else {
            self.in_flight.push(entry);
        }

        SoftwareReadback { cell }
    }

    fn wait_all_requests(&mut self) {
        self.wait_all_calls += 1;
        for entry in self.in_flight.drain(..) {
            entry.resolve();
        }
    }
}

fn unknown_texture(id: TextureId) -> CaptureError {
    CaptureError::resource("texture", format!("unknown texture {:?}", id))
}

fn copy_exact(dst: &mut [u8], src: &[u8], what: &str) -> CaptureResult<()> {
    if dst.len() != src.len() {
        return Err(CaptureError::config(
            what,
            src.len().to_string(),
            format!("expected exactly {} bytes", dst.len()),
        ));
    }
    dst.copy_from_slice(src);
    Ok(())
}

/// Bytes per pixel a software texture of `format` is stored with.
fn storage_bpp(format: SourceFormat) -> usize {
    match format {
        SourceFormat::Rgba32Float => 16,
        SourceFormat::Rgba16Float => 8,
        SourceFormat::R8Unorm => 1,
        SourceFormat::Rgba8Srgb
        | SourceFormat::Rgba8Unorm
        | SourceFormat::Bc7Srgb
        | SourceFormat::Bgra8Unorm
        | SourceFormat::Bgra8Srgb
        | SourceFormat::Rgb10A2Unorm
        | SourceFormat::Depth32Float => 4,
    }
}

/// Nearest-neighbour copy of `src` into `dst` through `transform`.
fn sample(src: &SoftwareTexture, dst: &mut SoftwareTexture, transform: BlitTransform) {
    let bpp = storage_bpp(src.format);
    if bpp != storage_bpp(dst.format) {
        warn!(
            source = ?src.format,
            target = ?dst.format,
            "blit between formats of different pixel size"
        );
        return;
    }
    if src.width == 0 || src.height == 0 {
        return;
    }

    let src_stride = src.width as usize * bpp;
    let dst_stride = dst.width as usize * bpp;
    for y in 0..dst.height {
        let v = (y as f32 + 0.5) / dst.height as f32;
        let sy = texel(v * transform.scale[1] + transform.offset[1], src.height);
        for x in 0..dst.width {
            let u = (x as f32 + 0.5) / dst.width as f32;
            let sx = texel(u * transform.scale[0] + transform.offset[0], src.width);

            let from = sy * src_stride + sx * bpp;
            let to = y as usize * dst_stride + x as usize * bpp;
            dst.pixels[to..to + bpp].copy_from_slice(&src.pixels[from..from + bpp]);
        }
    }
}

fn texel(coord: f32, extent: u32) -> usize {
    ((coord * extent as f32).floor() as i64).clamp(0, i64::from(extent) - 1) as usize
}
