//! Readback scheduler and completion poller scenarios, driven frame by frame
//! over the software backend.

mod common;

use std::sync::Arc;

use async_capture::backend::software::SoftwareBackend;
use async_capture::core::slot::SlotStatus;
use async_capture::{
    CaptureDriver, CaptureFormat, CaptureSource, ChannelSink, DriverState, RequestOutcome,
    SourceFormat,
};
use common::{collect, frame, manual, row_pattern, screen_driver, sequences};

#[test]
fn test_screen_at_rate_15_uses_two_slots() {
    let mut driver = screen_driver(SoftwareBackend::new(8, 8).with_latency(Some(1)), 15);
    assert_eq!(driver.slot_count(), 2);
    assert_eq!(driver.format(), Some(CaptureFormat::Rgba8Srgb));

    assert_eq!(
        driver.request_capture(),
        RequestOutcome::Issued { slot: 0, sequence: 0 }
    );
    assert_eq!(
        driver.request_capture(),
        RequestOutcome::Issued { slot: 1, sequence: 1 }
    );
    // Slot 0 has not completed yet
    assert_eq!(driver.request_capture(), RequestOutcome::Skipped { slot: 0 });

    driver.backend_mut().present();
    assert_eq!(
        driver.request_capture(),
        RequestOutcome::Issued { slot: 1, sequence: 3 }
    );
    assert_eq!(
        driver.request_capture(),
        RequestOutcome::Issued { slot: 0, sequence: 4 }
    );
}

#[test]
fn test_failed_transfer_emits_nothing_and_slot_recovers() {
    let mut backend = SoftwareBackend::new(8, 8).with_latency(Some(1));
    let texture = backend.create_texture(4, 4, SourceFormat::Rgba8Srgb);
    // The second request ever issued goes to slot 1
    backend.fail_request(1);

    let mut driver = CaptureDriver::new(backend);
    driver
        .initialize_with_config(CaptureSource::Texture(texture), manual(30))
        .unwrap();
    assert_eq!(driver.slot_count(), 3);
    let captures = collect(&mut driver);

    for _ in 0..3 {
        driver.request_capture();
    }
    driver.backend_mut().present();
    assert_eq!(driver.update(), 2);
    assert_eq!(sequences(&captures), vec![0, 2]);
    assert_eq!(driver.stats().transfer_errors, 1);
    assert_eq!(driver.slot_status(1), Some(SlotStatus::Idle));

    driver.request_capture();
    assert_eq!(
        driver.request_capture(),
        RequestOutcome::Issued { slot: 1, sequence: 4 }
    );
    driver.request_capture();
    driver.backend_mut().present();

    assert_eq!(driver.update(), 3);
    assert_eq!(sequences(&captures), vec![0, 2, 3, 4, 5]);
}

#[test]
fn test_every_tick_for_a_free_slot_is_captured() {
    let mut driver = screen_driver(SoftwareBackend::new(4, 4).with_latency(Some(1)), 30);
    let captures = collect(&mut driver);
    let gate = driver.tick_handle().unwrap();
    driver.start_auto_capture();

    for _ in 0..20 {
        gate.fire();
        frame(&mut driver);
    }
    driver.update();

    assert_eq!(sequences(&captures), (0..20).collect::<Vec<_>>());
    let stats = driver.stats();
    assert_eq!(stats.ticks_accepted, 20);
    assert_eq!(stats.backpressure_skips, 0);
    assert_eq!(stats.captures_emitted, 20);
}

#[test]
fn test_stalled_transport_skips_every_later_tick() {
    let mut driver = screen_driver(SoftwareBackend::new(4, 4).with_latency(None), 30);
    let captures = collect(&mut driver);

    let outcomes: Vec<_> = (0..10).map(|_| driver.request_capture()).collect();
    let issued = outcomes
        .iter()
        .filter(|o| matches!(o, RequestOutcome::Issued { .. }))
        .count();

    assert_eq!(issued, 3);
    assert_eq!(driver.backend().requests_issued(), 3);
    assert_eq!(driver.stats().backpressure_skips, 7);
    assert_eq!(driver.update(), 0);
    assert!(captures.lock().unwrap().is_empty());
}

#[test]
fn test_slot_never_holds_two_transfers() {
    let mut driver = screen_driver(SoftwareBackend::new(4, 4).with_latency(Some(4)), 30);
    let gate = driver.tick_handle().unwrap();
    driver.start_auto_capture();

    for _ in 0..40 {
        gate.fire();
        gate.fire();
        frame(&mut driver);
        assert!(driver.backend().pending_requests() <= driver.slot_count());
    }

    let stats = driver.stats();
    assert_eq!(stats.requests_issued, driver.backend().requests_issued());
    assert!(stats.backpressure_skips > 0);
}

#[test]
fn test_stop_does_not_cancel_in_flight_transfers() {
    let mut driver = screen_driver(SoftwareBackend::new(4, 4).with_latency(Some(1)), 10);
    let captures = collect(&mut driver);
    let gate = driver.tick_handle().unwrap();

    driver.start_auto_capture();
    gate.fire();
    assert_eq!(driver.end_of_frame(), 1);

    driver.stop_auto_capture();
    driver.stop_auto_capture();
    assert_eq!(driver.state(), DriverState::Stopped);

    driver.backend_mut().present();
    assert_eq!(driver.update(), 1);
    assert_eq!(captures.lock().unwrap().len(), 1);

    gate.fire();
    assert_eq!(driver.end_of_frame(), 0);
}

#[test]
fn test_dispose_releases_everything_after_wait_all() {
    let mut driver = screen_driver(SoftwareBackend::new(4, 4).with_latency(None), 30);
    for _ in 0..3 {
        driver.request_capture();
    }
    assert_eq!(driver.backend().pending_requests(), 3);

    driver.dispose();

    let backend = driver.backend();
    assert_eq!(backend.wait_all_calls(), 1);
    assert_eq!(backend.pending_requests(), 0);
    assert_eq!(backend.release_violations(), 0);
    assert_eq!(backend.live_staging(), 0);
    assert_eq!(backend.live_render_targets(), 0);
}

#[test]
fn test_screen_capture_is_top_row_first() {
    let mut backend = SoftwareBackend::new(3, 4).with_latency(Some(0));
    backend.write_screen(&row_pattern(3, 4)).unwrap();
    let mut driver = screen_driver(backend, 1);
    let captures = collect(&mut driver);

    driver.request_capture();
    driver.update();

    let captures = captures.lock().unwrap();
    assert_eq!(captures[0].data.as_slice(), row_pattern(3, 4).as_slice());
    assert_eq!((captures[0].width, captures[0].height), (3, 4));
}

#[test]
fn test_float_texture_keeps_full_precision() {
    let mut backend = SoftwareBackend::new(8, 8).with_latency(Some(0));
    let texture = backend.create_texture(2, 1, SourceFormat::Rgba32Float);
    let pixels: Vec<u8> = [0.25f32, 0.5, 0.75, 1.0, 2.0, -1.0, 0.0, 1.0]
        .iter()
        .flat_map(|v| v.to_ne_bytes())
        .collect();
    backend.write_texture(texture, &pixels).unwrap();

    let mut driver = CaptureDriver::new(backend);
    driver
        .initialize_with_config(CaptureSource::Texture(texture), manual(10))
        .unwrap();
    let captures = collect(&mut driver);

    driver.request_capture();
    driver.update();

    let captures = captures.lock().unwrap();
    assert_eq!(captures[0].format, CaptureFormat::Rgba32Float);
    assert_eq!(captures[0].data.as_slice(), pixels.as_slice());
}

#[test]
fn test_compressed_texture_captures_as_srgb() {
    let mut backend = SoftwareBackend::new(8, 8).with_latency(Some(0));
    let texture = backend.create_texture(4, 4, SourceFormat::Bc7Srgb);
    let mut driver = CaptureDriver::new(backend);
    driver
        .initialize_with_config(CaptureSource::Texture(texture), manual(10))
        .unwrap();
    let captures = collect(&mut driver);

    assert_eq!(driver.format(), Some(CaptureFormat::Rgba8Srgb));
    driver.request_capture();
    driver.update();
    assert_eq!(captures.lock().unwrap()[0].data.len(), 4 * 4 * 4);
}

#[test]
fn test_capture_rate_is_clamped() {
    let cases = [
        (0, 1, 1),
        (1, 1, 1),
        (10, 10, 1),
        (11, 11, 2),
        (15, 15, 2),
        (30, 30, 3),
        (31, 30, 3),
        (1000, 30, 3),
    ];
    for (requested, effective, slots) in cases {
        let driver = screen_driver(SoftwareBackend::new(2, 2), requested);
        assert_eq!(driver.capture_rate(), Some(effective), "rate {}", requested);
        assert_eq!(driver.slot_count(), slots, "rate {}", requested);
        assert_eq!(driver.backend().live_staging(), slots);
    }
}

#[test]
fn test_consumers_share_one_snapshot() {
    let mut driver = screen_driver(SoftwareBackend::new(2, 2).with_latency(Some(0)), 10);
    let first = collect(&mut driver);
    let second = collect(&mut driver);

    driver.request_capture();
    driver.update();

    let a = first.lock().unwrap();
    let b = second.lock().unwrap();
    assert!(Arc::ptr_eq(&a[0].data, &b[0].data));
}

#[test]
fn test_unsubscribed_consumer_stops_receiving() {
    let mut driver = screen_driver(SoftwareBackend::new(2, 2).with_latency(Some(0)), 10);
    let (sink, receiver) = ChannelSink::bounded(8);
    let id = driver.subscribe(sink);

    driver.request_capture();
    driver.update();
    assert!(driver.unsubscribe(id));

    driver.request_capture();
    driver.update();

    assert_eq!(receiver.try_iter().count(), 1);
    assert_eq!(driver.stats().captures_emitted, 2);
}
