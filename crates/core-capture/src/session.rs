//! Plot session driver: filename resolution on `IN`, teardown on `DF`,
//! and the async loop tying the reader thread to the stream parser.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::format::{Item, StrftimeItems};
use core_config::{CaptureConfigFile, ImageFormat};
use core_parser::{CommandHooks, HpglStreamParser, PlotDirective};
use core_render::RenderOptions;
use tracing::{debug, error, info, trace, warn};

use crate::source::{ByteSource, SourceEvent, spawn_reader};

const CHUNK_CHANNEL_CAP: usize = 1024;

/// Hooks wired into the stream parser: start a plot on `IN` with filenames
/// resolved against the current timestamp, finish it on `DF`.
struct SessionHooks {
    options: Arc<RenderOptions>,
    format: ImageFormat,
    image_pattern: String,
    dump_pattern: Option<String>,
    image_path: Option<PathBuf>,
    dump_path: Option<PathBuf>,
}

impl CommandHooks for SessionHooks {
    fn on_command(&mut self, cmd: &str) -> Option<PlotDirective> {
        let opcode = cmd.as_bytes().get(..2)?;
        if opcode.eq_ignore_ascii_case(b"IN") {
            let now = chrono::Local::now();
            self.image_path = Some(PathBuf::from(now.format(&self.image_pattern).to_string()));
            self.dump_path = self
                .dump_pattern
                .as_ref()
                .map(|p| PathBuf::from(now.format(p).to_string()));
            debug!(
                target: "capture",
                image = ?self.image_path,
                dump = ?self.dump_path,
                "plot_filenames_resolved"
            );
            Some(PlotDirective::Start {
                options: Arc::clone(&self.options),
            })
        } else if opcode.eq_ignore_ascii_case(b"DF") {
            Some(PlotDirective::Finish {
                image: self.image_path.clone(),
                format: self.format,
                dump: self.dump_path.clone(),
            })
        } else {
            None
        }
    }
}

pub struct CaptureSession {
    parser: HpglStreamParser<SessionHooks>,
}

impl CaptureSession {
    /// Build a session from resolved render options and the capture config.
    /// Relative filename patterns are prefixed with `out_dir` when given;
    /// patterns are validated up front so a typo fails at startup instead of
    /// at the first `IN`.
    pub fn new(
        options: Arc<RenderOptions>,
        capture: &CaptureConfigFile,
        out_dir: Option<&Path>,
    ) -> Result<Self> {
        let image_pattern = prefix_dir(out_dir, &capture.img.filename);
        validate_pattern(&image_pattern)?;
        let dump_pattern = capture
            .dump_filename
            .as_ref()
            .map(|p| prefix_dir(out_dir, p));
        if let Some(pattern) = &dump_pattern {
            validate_pattern(pattern)?;
        }
        Ok(Self {
            parser: HpglStreamParser::with_hooks(SessionHooks {
                options,
                format: capture.img.format,
                image_pattern,
                dump_pattern,
                image_path: None,
                dump_path: None,
            }),
        })
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.parser.feed(bytes);
    }

    pub fn is_plot_active(&self) -> bool {
        self.parser.is_active()
    }

    /// Finish the in-flight plot, if any. Idempotent; used on interrupt and
    /// at end of stream.
    pub fn finish(&mut self) {
        let image = self.parser.hooks.image_path.clone();
        let dump = self.parser.hooks.dump_path.clone();
        let format = self.parser.hooks.format;
        self.parser.finish_plot(image.as_deref(), format, dump.as_deref());
    }
}

fn prefix_dir(out_dir: Option<&Path>, pattern: &str) -> String {
    match out_dir {
        Some(dir) if !Path::new(pattern).is_absolute() => {
            dir.join(pattern).to_string_lossy().into_owned()
        }
        _ => pattern.to_string(),
    }
}

/// Reject strftime patterns chrono cannot format; rendering them later
/// would fail at the moment a plot arrives.
fn validate_pattern(pattern: &str) -> Result<()> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        bail!("invalid strftime pattern {pattern:?}");
    }
    Ok(())
}

/// Drive the capture until the source is exhausted, fails, or ctrl-c
/// arrives. A clean stop (including interrupt) flushes the open plot and
/// returns `Ok`; a source failure propagates without flushing.
pub async fn run_capture(
    source: Box<dyn ByteSource>,
    session: &mut CaptureSession,
) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::channel(CHUNK_CHANNEL_CAP);
    let stop = Arc::new(AtomicBool::new(false));
    let reader = spawn_reader(source, tx, Arc::clone(&stop)).context("spawning reader thread")?;
    info!(target: "capture", "capture_started");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ctrl_c_armed = true;
    let outcome = loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(SourceEvent::Data(bytes)) => session.feed(&bytes),
                Some(SourceEvent::Failed(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    info!(target: "capture", "end_of_stream");
                    break Ok(());
                }
                Some(SourceEvent::Failed(e)) => {
                    break Err(anyhow::Error::new(e).context("reading byte source"));
                }
                None => break Ok(()),
            },
            signal = &mut ctrl_c, if ctrl_c_armed => match signal {
                Ok(()) => {
                    info!(target: "runtime.shutdown", reason = "interrupt", "shutdown_stage");
                    break Ok(());
                }
                Err(e) => {
                    // Keep capturing without an interrupt handler.
                    warn!(target: "runtime.shutdown", error = %e, "ctrl_c_unavailable");
                    ctrl_c_armed = false;
                }
            },
        }
    };

    stop.store(true, Ordering::Relaxed);
    rx.close();
    drop(rx);

    if outcome.is_ok() {
        session.finish();
    }

    // Reap the reader; it notices the stop flag within one idle timeout.
    let join = tokio::task::spawn_blocking(move || reader.join());
    match tokio::time::timeout(Duration::from_secs(2), join).await {
        Ok(Ok(Ok(()))) => trace!(target: "runtime.shutdown", "reader_thread_joined"),
        Ok(Ok(Err(_))) => error!(target: "runtime.shutdown", "reader_thread_panicked"),
        Ok(Err(e)) => error!(target: "runtime.shutdown", error = %e, "reader_join_failed"),
        Err(_) => warn!(target: "runtime.shutdown", "reader_join_timeout"),
    }
    info!(target: "capture", "capture_stopped");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_strftime_pattern_is_rejected() {
        assert!(validate_pattern("plot-%Y%m%d.png").is_ok());
        assert!(validate_pattern("plot.png").is_ok());
        assert!(validate_pattern("plot-%Q.png").is_err());
    }

    #[test]
    fn out_dir_prefixes_relative_patterns_only() {
        let dir = Path::new("/plots");
        assert_eq!(prefix_dir(Some(dir), "a-%Y.png"), "/plots/a-%Y.png");
        assert_eq!(prefix_dir(Some(dir), "/abs/a.png"), "/abs/a.png");
        assert_eq!(prefix_dir(None, "a.png"), "a.png");
    }
}
