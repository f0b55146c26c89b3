//! End to end: driver → channel sink → export worker → PNG files.

#![cfg(feature = "png-export")]

mod common;

use async_capture::ChannelSink;
use async_capture::backend::software::SoftwareBackend;
use async_capture::export::{CaptureWriter, spawn_export_worker};
use common::{row_pattern, screen_driver};

#[tokio::test]
async fn test_captures_are_written_as_numbered_pngs() {
    let temp = tempfile::tempdir().unwrap();
    let writer = CaptureWriter::in_directory(temp.path().join("AsyncCapture_test")).unwrap();
    let directory = writer.directory().to_path_buf();

    let (sink, captures) = ChannelSink::bounded(16);
    let worker = spawn_export_worker(writer, captures);

    let mut backend = SoftwareBackend::new(4, 3).with_latency(Some(0));
    backend.write_screen(&row_pattern(4, 3)).unwrap();
    let mut driver = screen_driver(backend, 10);
    driver.subscribe(sink);

    for _ in 0..5 {
        driver.request_capture();
        driver.update();
    }
    // Dropping the driver drops the sink and ends the worker
    drop(driver);

    let written = worker.await.unwrap();
    assert_eq!(written, 5);

    for index in 0..5 {
        let path = directory.join(format!("AsyncCaptureImage_{}.png", index));
        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.as_raw(), &row_pattern(4, 3));
    }
}
