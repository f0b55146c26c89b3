//! Common test utilities for the capture driver tests
//!
//! Drivers here run without the background clock, so every test controls
//! exactly when ticks, readback completions and polls happen.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_capture::backend::software::SoftwareBackend;
use async_capture::{Capture, CaptureConfig, CaptureDriver, CaptureSource, ClockMode};

pub type Driver = CaptureDriver<SoftwareBackend>;
pub type Captures = Arc<Mutex<Vec<Capture>>>;

/// Screen-capturing driver with manual ticks.
pub fn screen_driver(backend: SoftwareBackend, rate: u32) -> Driver {
    let mut driver = CaptureDriver::new(backend);
    driver
        .initialize_with_config(CaptureSource::Screen, manual(rate))
        .expect("initialize screen driver");
    driver
}

pub fn manual(rate: u32) -> CaptureConfig {
    CaptureConfig::new(rate).with_clock(ClockMode::Manual)
}

/// Subscribes a sink that records every capture.
pub fn collect(driver: &mut Driver) -> Captures {
    let captures: Captures = Arc::new(Mutex::new(Vec::new()));
    let sink = captures.clone();
    driver.subscribe(move |capture: Capture| sink.lock().unwrap().push(capture));
    captures
}

pub fn sequences(captures: &Captures) -> Vec<u64> {
    captures.lock().unwrap().iter().map(|c| c.sequence).collect()
}

/// One rendered frame the way a host drives it: poll, apply ticks, present.
pub fn frame(driver: &mut Driver) -> usize {
    let emitted = driver.update();
    driver.end_of_frame();
    driver.backend_mut().present();
    emitted
}

/// RGBA rows where every byte of row `y` holds `y`.
pub fn row_pattern(width: u32, height: u32) -> Vec<u8> {
    (0..height)
        .flat_map(|y| std::iter::repeat_n(y as u8, width as usize * 4))
        .collect()
}
