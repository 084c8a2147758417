//! Basic usage example for partial circular buffers
//!
//! This example demonstrates:
//! 1. Initializing the process-wide log buffer and routing `log` into it
//! 2. Logging from multiple threads concurrently
//! 3. Snapshotting the log: the session prologue plus the most recent lines
//! 4. Writing a file-backed buffer and reading it back read-only, the way a
//!    crash-log post-processor would
//!
//! It uses a temporary file which is cleaned up at the end.

use partial_circular_buffer::{
    init_log_buffer, install_logger, LogBufferConfig, MappedBuffer, ReadCursor,
};

use log::{info, warn, LevelFilter};
use std::thread;
use std::time::Duration;

fn main() {
    // 64 KiB log, the first 4 KiB of the session are kept for good
    let config = LogBufferConfig {
        size: 64 * 1024,
        wrap_position: Some(4096),
        level: LevelFilter::Debug,
        path: None,
        append: false,
    };

    let log_buffer = init_log_buffer(config).expect("Failed to create log buffer");
    install_logger().expect("Failed to install logger");

    info!("session started, pid {}", std::process::id());

    let num_threads = 4;
    let logs_per_thread = 1000;

    println!(
        "Starting {} threads, each writing {} logs",
        num_threads, logs_per_thread
    );

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            thread::spawn(move || {
                for i in 0..logs_per_thread {
                    if i % 250 == 0 {
                        warn!("thread {} checkpoint {}", thread_id, i);
                    } else {
                        info!("thread {} message {}", thread_id, i);
                    }

                    if i % 100 == 0 {
                        thread::sleep(Duration::from_millis(10));
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = log_buffer.snapshot();
    let text = String::from_utf8_lossy(&snapshot);
    println!(
        "Logged {} bytes, {} retained",
        log_buffer.total_written(),
        snapshot.len()
    );
    println!("First line: {}", text.lines().next().unwrap_or_default());
    println!("Last line:  {}", text.lines().last().unwrap_or_default());

    // File-backed buffer: write in one "session", read back read-only
    let disk_path = std::env::temp_dir().join("partial_circular_buffer_example.dat");
    println!("Using buffer file at: {:?}", disk_path);

    {
        let mut buffer =
            MappedBuffer::create(&disk_path, 4096, 256).expect("Failed to create buffer file");
        buffer.write(b"crash report header\n");
        for i in 0..500 {
            buffer.write(format!("event {}\n", i).as_bytes());
        }
        buffer.flush().expect("Failed to flush buffer file");
    }

    let reader = MappedBuffer::open_read_only(&disk_path).expect("Failed to open buffer file");
    let mut cursor = ReadCursor::start();
    let mut chunk = [0u8; 512];
    let mut recovered = Vec::new();
    loop {
        let read = reader.read_with(&mut cursor, &mut chunk);
        if read == 0 {
            break;
        }
        recovered.extend_from_slice(&chunk[..read]);
    }

    println!(
        "Recovered {} of {} bytes ({} overwritten, reader skipped {})",
        recovered.len(),
        reader.total_written(),
        reader.overwritten_len(),
        cursor.skipped()
    );

    std::fs::remove_file(&disk_path).ok();
    println!("Example completed successfully");
}
