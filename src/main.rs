use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use async_capture::backend::software::SoftwareBackend;
use async_capture::export::{CaptureWriter, spawn_export_worker};
use async_capture::{CaptureDriver, CaptureSource, CaptureStats, ChannelSink, SourceFormat};
use clap::Parser;
use tracing::info;

/// Asynchronous readback demo:
/// renders an animated pattern on the software backend, captures it at a rate
/// independent of the frame rate and saves every capture as a PNG.
#[derive(Parser, Debug)]
#[command(name = "async-cap")]
#[command(about = "Capture frames from a running render loop without stalling it")]
#[command(long_about = "Runs a paced render loop on the in-process software backend and captures it
through a ring of asynchronous readback slots. Captures are encoded and written off the render loop.")]
struct Args {
    /// Captures per second
    #[arg(short, long, default_value_t = 30, help = "Capture rate, clamped to 1-30")]
    rate: u32,

    /// Render frames per second
    #[arg(short, long, default_value_t = 60, help = "Target render frame rate")]
    fps: u32,

    #[arg(long, default_value_t = 640, help = "Screen width in pixels")]
    width: u32,

    #[arg(long, default_value_t = 360, help = "Screen height in pixels")]
    height: u32,

    /// Frames to render before exiting
    #[arg(short = 'n', long, default_value_t = 300)]
    frames: u64,

    /// Base directory for the capture directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Readback latency in rendered frames
    #[arg(short, long, default_value_t = 2)]
    latency: u64,

    /// Capture an offscreen texture instead of the screen
    #[arg(long)]
    texture: bool,

    /// Captures the export worker may fall behind by before frames are dropped
    #[arg(long, default_value_t = 64)]
    queue: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("async_capture=info".parse()?)
                .add_directive("async_cap=info".parse()?),
        )
        .init();

    let args = Args::parse();
    info!("[async-cap] target frame rate: {}", args.fps);

    let writer = CaptureWriter::create(&args.output)?;
    let (sink, captures) = ChannelSink::bounded(args.queue);
    let worker = spawn_export_worker(writer, captures);

    let stats = tokio::task::spawn_blocking(move || render_loop(&args, sink))
        .await
        .context("render loop panicked")??;
    let written = worker.await.context("export worker panicked")?;

    info!(
        emitted = stats.captures_emitted,
        written,
        skipped = stats.backpressure_skips,
        failed = stats.transfer_errors,
        ticks_dropped = stats.ticks_dropped,
        "[async-cap] finished"
    );
    Ok(())
}

/// Renders `args.frames` frames, driving the capture driver once per frame.
fn render_loop(args: &Args, sink: ChannelSink) -> Result<CaptureStats> {
    let mut backend =
        SoftwareBackend::new(args.width, args.height).with_latency(Some(args.latency));
    let source = if args.texture {
        CaptureSource::Texture(backend.create_texture(
            args.width,
            args.height,
            SourceFormat::Rgba8Unorm,
        ))
    } else {
        CaptureSource::Screen
    };
    let texture = match &source {
        CaptureSource::Texture(texture) => Some(*texture),
        CaptureSource::Screen => None,
    };

    let mut driver = CaptureDriver::new(backend);
    driver
        .initialize(source, args.rate)
        .context("initializing capture driver")?;
    driver.subscribe(sink);
    driver.start_auto_capture();

    let fps = args.fps.max(1);
    let frame_time = Duration::from_secs_f64(1.0 / f64::from(fps));

    for frame in 0..args.frames {
        let started = Instant::now();

        let pixels = match texture {
            Some(texture) => driver
                .backend_mut()
                .texture_pixels_mut(texture)
                .ok_or_else(|| anyhow!("capture texture disappeared"))?,
            None => driver.backend_mut().screen_pixels_mut(),
        };
        paint(pixels, args.width, args.height, frame);

        driver.update();
        driver.end_of_frame();
        driver.backend_mut().present();

        if frame % u64::from(fps) == 0 {
            info!(frame, captures = driver.stats().captures_emitted, "[async-cap] frame counter");
        }

        if let Some(rest) = frame_time.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    driver.stop_auto_capture();
    // One more frame lets requests issued on the last frame resolve
    driver.backend_mut().present();
    driver.update();

    let stats = driver.stats();
    driver.dispose();
    Ok(stats)
}

/// Scrolling diagonal gradient with a white bar marking the top rows.
fn paint(pixels: &mut [u8], width: u32, height: u32, frame: u64) {
    let shift = (frame * 4) as u32;
    for (i, pixel) in pixels.chunks_exact_mut(4).enumerate() {
        let x = i as u32 % width.max(1);
        let y = i as u32 / width.max(1);
        if y < height / 16 {
            pixel.copy_from_slice(&[255, 255, 255, 255]);
            continue;
        }
        pixel[0] = (x.wrapping_add(shift) % 256) as u8;
        pixel[1] = (y % 256) as u8;
        pixel[2] = ((x + y).wrapping_add(shift / 2) % 256) as u8;
        pixel[3] = 255;
    }
}
