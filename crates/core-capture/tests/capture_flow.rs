//! Capture loop end-to-end: scripted byte source in, files on disk out.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use core_capture::{ByteSource, CaptureSession, run_capture};
use core_config::{
    CaptureConfigFile, ImageFormat, ImgSection, Parity, PortSection, RenderConfigFile, TextEntry,
};
use core_font::StickFont;
use core_render::RenderOptions;

/// Replays scripted chunks, then reports end-of-stream.
struct ScriptedSource {
    chunks: VecDeque<Vec<u8>>,
}

impl ScriptedSource {
    fn new<I: IntoIterator<Item = &'static [u8]>>(chunks: I) -> Self {
        Self {
            chunks: chunks.into_iter().map(<[u8]>::to_vec).collect(),
        }
    }
}

impl ByteSource for ScriptedSource {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

fn stick_options() -> Arc<RenderOptions> {
    let config = RenderConfigFile {
        crop: None,
        text: TextEntry {
            font: "stick_font".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };
    RenderOptions::with_font(&config, Arc::new(StickFont::new())).expect("valid config")
}

fn capture_config(image: &str, dump: Option<&str>, format: ImageFormat) -> CaptureConfigFile {
    CaptureConfigFile {
        img: ImgSection {
            format,
            filename: image.to_string(),
        },
        dump_filename: dump.map(str::to_string),
        port: PortSection {
            name: "/dev/null".to_string(),
            baud: 9600,
            parity: Parity::None,
            rtscts: false,
            dsrdtr: false,
            xonxoff: false,
        },
    }
}

#[tokio::test]
async fn scripted_plot_produces_image_and_dump() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = capture_config("plot.png", Some("plot.hpgl"), ImageFormat::Png);
    let mut session =
        CaptureSession::new(stick_options(), &config, Some(dir.path())).expect("session");

    let source = ScriptedSource::new([
        b"IN;SP1;PU5".as_slice(),
        b"00,4000;PD5000,4000;".as_slice(),
        b"PU;DF;".as_slice(),
    ]);
    run_capture(Box::new(source), &mut session)
        .await
        .expect("capture run");

    let image = std::fs::read(dir.path().join("plot.png")).expect("image written");
    assert_eq!(&image[..8], b"\x89PNG\r\n\x1a\n");
    let dump = std::fs::read(dir.path().join("plot.hpgl")).expect("dump written");
    assert_eq!(dump, b"IN;SP1;PU500,4000;PD5000,4000;PU;");
}

#[tokio::test]
async fn truncated_stream_still_flushes_the_open_plot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = capture_config("partial.pdf", None, ImageFormat::Pdf);
    let mut session =
        CaptureSession::new(stick_options(), &config, Some(dir.path())).expect("session");

    // The plotter disappears before sending DF.
    let source = ScriptedSource::new([b"IN;SP1;PU0,0;PD1000,1000;PU;".as_slice()]);
    run_capture(Box::new(source), &mut session)
        .await
        .expect("capture run");

    assert!(!session.is_plot_active());
    let pdf = std::fs::read(dir.path().join("partial.pdf")).expect("pdf written");
    assert_eq!(&pdf[..5], b"%PDF-");
}

#[tokio::test]
async fn stream_without_plot_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = capture_config("never.png", Some("never.hpgl"), ImageFormat::Png);
    let mut session =
        CaptureSession::new(stick_options(), &config, Some(dir.path())).expect("session");

    let source = ScriptedSource::new([b"SP1;PU0,0;PD100,100;PU;".as_slice()]);
    run_capture(Box::new(source), &mut session)
        .await
        .expect("capture run");

    assert!(!dir.path().join("never.png").exists());
    assert!(!dir.path().join("never.hpgl").exists());
}

#[test]
fn invalid_filename_pattern_fails_at_construction() {
    let config = capture_config("plot-%Q.png", None, ImageFormat::Png);
    assert!(CaptureSession::new(stick_options(), &config, None).is_err());
}
