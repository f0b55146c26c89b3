//! Background capture clock driving a render loop in real time.
//!
//! Bounds are generous; these tests check that ticks flow and stop, not the
//! timer's precision.

mod common;

use std::thread;
use std::time::{Duration, Instant};

use async_capture::backend::software::SoftwareBackend;
use async_capture::{CaptureDriver, CaptureSource, DriverState};
use common::{collect, frame};

fn run_frames(driver: &mut common::Driver, duration: Duration) {
    let started = Instant::now();
    while started.elapsed() < duration {
        frame(driver);
        thread::sleep(Duration::from_millis(4));
    }
}

#[test]
fn test_clock_ticks_become_captures() {
    let mut driver = CaptureDriver::new(SoftwareBackend::new(8, 8));
    driver.initialize(CaptureSource::Screen, 30).unwrap();
    let captures = collect(&mut driver);

    driver.start_auto_capture();
    assert_eq!(driver.state(), DriverState::Started);
    run_frames(&mut driver, Duration::from_millis(600));
    driver.stop_auto_capture();

    // Let the last requests resolve
    frame(&mut driver);
    frame(&mut driver);

    let count = captures.lock().unwrap().len();
    assert!(count >= 3, "only {} captures in 600ms at 30/s", count);
    assert!(count <= 40, "{} captures in 600ms at 30/s", count);
}

#[test]
fn test_no_requests_while_stopped() {
    let mut driver = CaptureDriver::new(SoftwareBackend::new(8, 8));
    driver.initialize(CaptureSource::Screen, 30).unwrap();

    run_frames(&mut driver, Duration::from_millis(200));
    assert_eq!(driver.processed_frame_count(), 0);
    assert!(driver.stats().ticks_dropped > 0);

    driver.start_auto_capture();
    run_frames(&mut driver, Duration::from_millis(300));
    driver.stop_auto_capture();
    frame(&mut driver);

    let requested = driver.processed_frame_count();
    assert!(requested > 0);

    run_frames(&mut driver, Duration::from_millis(200));
    assert_eq!(driver.processed_frame_count(), requested);
}

#[test]
fn test_drop_stops_the_clock() {
    let mut driver = CaptureDriver::new(SoftwareBackend::new(8, 8));
    driver.initialize(CaptureSource::Screen, 30).unwrap();
    let gate = driver.tick_handle().unwrap();
    driver.start_auto_capture();
    run_frames(&mut driver, Duration::from_millis(100));

    drop(driver);
    // Disposal switched auto capture off for good
    assert_eq!(gate.fire(), async_capture::core::clock::TickOutcome::DroppedInactive);
}
