//! Integration tests for the process-wide log buffer
//!
//! The `log` facade accepts a single logger per process, so the whole global
//! flow runs in one test.

use partial_circular_buffer::{
    init_log_buffer, install_logger, log_buffer, BufferError, LogBuffer, LogBufferConfig,
    MappedBuffer, ReadCursor,
};
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tempfile::{tempdir, TempDir};

struct TestContext {
    _temp_dir: TempDir,
    buffer_path: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = tempdir().unwrap();
        let buffer_path = temp_dir.path().join("test_integration.dat");

        Self {
            _temp_dir: temp_dir,
            buffer_path,
        }
    }
}

/// Test the complete flow of initialization, logging, and post-mortem reading
#[test]
fn test_full_system_flow() {
    let context = TestContext::new();

    assert!(log_buffer().is_none());
    assert!(matches!(install_logger(), Err(BufferError::NotInitialized)));

    let config = LogBufferConfig {
        size: 8 * 1024,
        wrap_position: Some(512),
        level: LevelFilter::Info,
        path: Some(context.buffer_path.clone()),
        append: false,
    };
    let buffer = init_log_buffer(config.clone()).unwrap();
    install_logger().unwrap();

    assert!(Arc::ptr_eq(&buffer, &log_buffer().unwrap()));
    assert!(matches!(
        init_log_buffer(config),
        Err(BufferError::AlreadyInitialized)
    ));

    log::info!(target: "startup", "build 1234 starting");

    // Log from several threads, enough to wrap the ring many times
    let handles: Vec<_> = (0..4)
        .map(|thread_id| {
            thread::spawn(move || {
                for i in 0..500 {
                    log::info!("thread {} record {}", thread_id, i);
                    log::debug!("filtered out {}", i);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    log::warn!(target: "shutdown", "last words");
    log::logger().flush();

    let text = String::from_utf8_lossy(&buffer.snapshot()).into_owned();
    assert!(text.contains("[startup] build 1234 starting\n"), "Prologue should survive");
    assert!(text.ends_with("[shutdown] last words\n"), "Newest record should be last");
    assert!(!text.contains("filtered out"), "Debug records should be filtered");
    assert!(buffer.total_written() as usize > 8 * 1024);

    // The file decodes on its own, as a post-mortem reader would see it
    let reader = MappedBuffer::open_read_only(&context.buffer_path).unwrap();
    assert_eq!(reader.contents(), buffer.snapshot());
}

/// Test tailing a standalone log buffer shared between threads
#[test]
fn test_shared_tailing() {
    let sink = Arc::new(
        LogBuffer::new(&LogBufferConfig {
            size: 12 + 4096,
            wrap_position: Some(0),
            ..LogBufferConfig::default()
        })
        .unwrap(),
    );

    let writer = {
        let sink = sink.clone();
        thread::spawn(move || {
            for i in 0..100 {
                sink.write(format!("{:03}\n", i).as_bytes());
            }
        })
    };
    writer.join().unwrap();

    let mut cursor = ReadCursor::start();
    let mut out = vec![0u8; 8192];
    let read = sink.read_with(&mut cursor, &mut out);
    let text = String::from_utf8(out[..read].to_vec()).unwrap();
    assert_eq!(text.lines().count(), 100);
    assert!(text.starts_with("000\n"));
    assert!(text.ends_with("099\n"));
}
