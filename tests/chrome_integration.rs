//! End-to-end captures against a real headless Chrome.
//!
//! Run with `cargo test -- --ignored` on a machine with Chrome installed.

#![cfg(feature = "cdp")]

use std::sync::Once;

use htmlcap::convert::Converter;
use htmlcap::encoder::GifEncoder;
use htmlcap::options::ConversionOptions;
use htmlcap::render::{RenderDriver, Target};
use htmlcap::EngineConfig;
use tiny_http::{Response, Server};

static INIT: Once = Once::new();

const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Test Page</title>
<style>
  body { margin: 0; background: #fff; }
  .box { width: 120px; height: 120px; background: #c33; animation: spin 1s linear infinite; }
  @keyframes spin { to { transform: rotate(360deg); } }
</style>
</head>
<body>
<h1>Hello from Test Server</h1>
<div class="box"></div>
<div style="height: 2000px"></div>
</body>
</html>"#;

/// Start a simple test HTTP server
fn start_test_server() -> String {
    INIT.call_once(|| {
        std::thread::spawn(|| {
            let server = Server::http("127.0.0.1:18081").unwrap();
            for request in server.incoming_requests() {
                let response = match request.url() {
                    "/" => Response::from_string(PAGE).with_header(
                        "Content-Type: text/html; charset=utf-8"
                            .parse::<tiny_http::Header>()
                            .unwrap(),
                    ),
                    _ => Response::from_string("Not Found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });
        std::thread::sleep(std::time::Duration::from_millis(100));
    });

    "http://127.0.0.1:18081/".to_string()
}

fn converter(frames_root: &std::path::Path) -> Converter {
    let driver = RenderDriver::new(htmlcap::default_launcher(), EngineConfig::default());
    Converter::new(driver, GifEncoder::default(), frames_root)
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_png_is_full_page() {
    let url = start_test_server();
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("page.png");

    converter(dir.path())
        .convert(&Target::parse(&url), &output, &ConversionOptions::from_json(r#"{"type":"png"}"#).unwrap())
        .await
        .expect("conversion failed");

    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    // IHDR height, big endian, after the 8 byte signature and 8 byte chunk header.
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    assert!(height > 2000, "expected full-page capture, got height {}", height);
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_jpeg_from_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let page = dir.path().join("page.html");
    std::fs::write(&page, PAGE).unwrap();
    let output = dir.path().join("page.jpeg");

    converter(dir.path())
        .convert(&Target::File(page), &output, &ConversionOptions::from_json(r#"{"quality":80}"#).unwrap())
        .await
        .expect("conversion failed");

    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(&bytes[..2], b"\xFF\xD8");
}

#[tokio::test]
#[ignore] // Requires Chrome and ffmpeg to be installed
async fn test_gif_from_animated_page() {
    let url = start_test_server();
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("anim.gif");
    let frames_root = dir.path().join("frames");

    let result = converter(&frames_root)
        .convert(
            &Target::parse(&url),
            &output,
            &ConversionOptions::from_json(r#"{"type":"gif","duration":1000,"fps":5,"width":320,"height":240}"#)
                .unwrap(),
        )
        .await
        .expect("conversion failed");

    assert_eq!(result.frames, Some(5));
    assert_eq!(&std::fs::read(&output).unwrap()[..3], b"GIF");
    assert_eq!(std::fs::read_dir(&frames_root).unwrap().count(), 0);
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_unreachable_url_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = converter(dir.path())
        .convert(
            &Target::parse("http://127.0.0.1:1/"),
            &dir.path().join("x.jpeg"),
            &ConversionOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Failed to load HTML"));
}
