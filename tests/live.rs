//! Round-trips against the session's real display server.
//!
//! These need a running Wayland compositor or X server and mutate the actual
//! clipboard, so they are ignored by default:
//!
//! ```text
//! cargo test -- --ignored
//! ```

use linger_clipboard::{Clipboard, ClipboardFormat, Error};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
#[ignore]
fn short_text_round_trip() {
    init_logging();
    let mut clipboard = Clipboard::new().unwrap();
    clipboard.write(b"hello", ClipboardFormat::Text).unwrap();
    let data = clipboard.read(ClipboardFormat::Text).unwrap();
    assert_eq!(data.bytes(), b"hello");
    assert_eq!(data.format(), ClipboardFormat::Text);
    clipboard.clear().unwrap();
}

#[test]
#[ignore]
fn large_image_round_trip() {
    init_logging();
    // large enough to force INCR on any X server
    let mut payload = Vec::with_capacity(1_000_000);
    payload.extend_from_slice(b"\x89PNG\r\n\x1a\n");
    while payload.len() < 1_000_000 {
        payload.push((payload.len() % 251) as u8);
    }

    let mut clipboard = Clipboard::new().unwrap();
    clipboard.write(&payload, ClipboardFormat::Image).unwrap();
    let data = clipboard.read(ClipboardFormat::Image).unwrap();
    assert_eq!(data.bytes(), &payload[..]);
    clipboard.clear().unwrap();
}

#[test]
#[ignore]
fn formats_follow_the_written_payload() {
    init_logging();
    let mut clipboard = Clipboard::new().unwrap();
    clipboard.write(b"<b>rich</b>", ClipboardFormat::Html).unwrap();
    let formats = clipboard.available_formats().unwrap();
    assert!(formats.contains(&ClipboardFormat::Html));
    clipboard.clear().unwrap();
}

#[test]
#[ignore]
fn cleared_clipboard_reads_as_empty() {
    init_logging();
    let mut clipboard = Clipboard::new().unwrap();
    clipboard.write(b"soon gone", ClipboardFormat::Text).unwrap();
    clipboard.clear().unwrap();
    match clipboard.read(ClipboardFormat::Text) {
        // another client may legitimately own the selection on a live desktop
        Err(Error::NoData) | Ok(_) => {}
        Err(err) => panic!("unexpected error: {}", err),
    }
}
