//! Byte-oriented HPGL stream parser with error resynchronization.
//!
//! The parser consumes a continuous serial feed in arbitrary chunks and
//! extracts complete commands. Ordinary commands end at `;`; label commands
//! (`LB`, `BL`) end at a session terminator byte that `DT` can change at
//! runtime. Garbage never stalls the stream: an opcode that is not two
//! Latin letters switches the machine into resync, which discards input up
//! to and including the next `;`.
//!
//! The parser also frames plots. While a plot is active it owns a
//! [`PlotCanvas`] and a raw-byte dump sink; framing is idempotent at both
//! ends because real plotters happily emit `IN` twice or get unplugged
//! mid-plot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use core_config::ImageFormat;
use core_render::{PlotCanvas, RenderOptions};
use tracing::{debug, error, info, warn};

/// Default label terminator: ETX.
pub const DEFAULT_TERMINATOR: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Waiting for enough bytes to classify the next command.
    WaitCmd,
    /// Inside an ordinary command, waiting for `;`.
    WaitSemicolon,
    /// Inside a label command, waiting for the session terminator.
    WaitTerm,
    /// Discarding garbage up to and including the next `;`.
    Resync,
}

/// Instruction returned by a command hook, applied before the command is
/// dumped or rendered. This is how a capture driver opens a plot on `IN`
/// (so the `IN` itself reaches the fresh canvas) and closes it on `DF`
/// (so the `DF` does not land in the dump of the finished plot).
pub enum PlotDirective {
    Start { options: Arc<RenderOptions> },
    Finish {
        image: Option<PathBuf>,
        format: ImageFormat,
        dump: Option<PathBuf>,
    },
}

/// Observer invoked with every complete command, terminator included.
pub trait CommandHooks {
    fn on_command(&mut self, _cmd: &str) -> Option<PlotDirective> {
        None
    }
}

/// Default hooks: observe nothing, frame nothing.
pub struct NoopHooks;

impl CommandHooks for NoopHooks {}

pub struct HpglStreamParser<H: CommandHooks = NoopHooks> {
    pub hooks: H,
    buffer: Vec<u8>,
    state: ParseState,
    term: u8,
    active: bool,
    canvas: Option<PlotCanvas>,
    dump: Option<Vec<u8>>,
}

impl HpglStreamParser<NoopHooks> {
    pub fn new() -> Self {
        Self::with_hooks(NoopHooks)
    }
}

impl Default for HpglStreamParser<NoopHooks> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: CommandHooks> HpglStreamParser<H> {
    pub fn with_hooks(hooks: H) -> Self {
        Self {
            hooks,
            buffer: Vec::new(),
            state: ParseState::WaitCmd,
            term: DEFAULT_TERMINATOR,
            active: false,
            canvas: None,
            dump: None,
        }
    }

    /// Buffer a chunk and extract every complete command in it. Null bytes
    /// are line noise on half-wired serial links and are stripped first.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes.iter().filter(|&&b| b != 0x00));
        self.extract_cmd();
    }

    /// Active label terminator byte.
    pub fn terminator(&self) -> u8 {
        self.term
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Open a plot: fresh canvas, fresh dump sink. No-op while active.
    pub fn start_plot(&mut self, options: Arc<RenderOptions>) {
        if self.active {
            return;
        }
        info!(target: "parser", "plot_started");
        self.active = true;
        self.canvas = Some(PlotCanvas::new(options));
        self.dump = Some(Vec::new());
    }

    /// Close a plot: flush the dump, save the image, release both. No-op
    /// while inactive. Output failures drop the plot but not the process.
    pub fn finish_plot(
        &mut self,
        image: Option<&Path>,
        format: ImageFormat,
        dump: Option<&Path>,
    ) {
        if !self.active {
            return;
        }
        info!(target: "parser", "plot_finished");
        self.active = false;
        let collected = self.dump.take().unwrap_or_default();
        if let Some(path) = dump
            && let Err(e) = std::fs::write(path, &collected)
        {
            error!(target: "parser", path = %path.display(), error = %e, "dump_write_failed");
        }
        if let Some(canvas) = self.canvas.take()
            && let Some(path) = image
            && let Err(e) = canvas.save(path, format)
        {
            error!(target: "parser", path = %path.display(), error = %e, "image_save_failed");
        }
    }

    fn resync(&mut self) {
        warn!(target: "parser.resync", "parser_panic_resyncing");
        self.state = ParseState::Resync;
    }

    /// Drive the state machine until it needs more input. Every iteration
    /// either consumes buffered bytes or returns, so progress is guaranteed.
    fn extract_cmd(&mut self) {
        loop {
            match self.state {
                ParseState::WaitCmd => {
                    if self.buffer.len() < 2 {
                        return;
                    }
                    let a = self.buffer[0].to_ascii_uppercase();
                    let b = self.buffer[1].to_ascii_uppercase();
                    if !(a.is_ascii_uppercase() && b.is_ascii_uppercase()) {
                        error!(
                            target: "parser",
                            opcode = %String::from_utf8_lossy(&self.buffer[..2]),
                            "invalid_command"
                        );
                        self.resync();
                        continue;
                    }
                    self.state = if matches!(&[a, b], b"LB" | b"BL") {
                        ParseState::WaitTerm
                    } else {
                        ParseState::WaitSemicolon
                    };
                }
                ParseState::Resync => {
                    match self.buffer.iter().position(|&b| b == b';') {
                        None => {
                            self.buffer.clear();
                            return;
                        }
                        Some(idx) => {
                            self.buffer.drain(..=idx);
                            self.state = ParseState::WaitCmd;
                        }
                    }
                }
                ParseState::WaitSemicolon | ParseState::WaitTerm => {
                    let term = if self.state == ParseState::WaitTerm {
                        self.term
                    } else {
                        b';'
                    };
                    let Some(idx) = self.buffer.iter().position(|&b| b == term) else {
                        return;
                    };
                    self.state = ParseState::WaitCmd;
                    let cmd: Vec<u8> = self.buffer.drain(..=idx).collect();
                    self.handle_command(&cmd);
                }
            }
        }
    }

    /// Dispatch one complete command: hook first (a returned directive is
    /// applied immediately), then the dump sink, then the canvas, then the
    /// parser-level terminator opcodes. Render errors are logged and
    /// swallowed here; the stream goes on.
    fn handle_command(&mut self, cmd: &[u8]) {
        let text = String::from_utf8_lossy(cmd).into_owned();
        debug!(target: "parser", cmd = ?text, "command");

        if let Some(directive) = self.hooks.on_command(&text) {
            self.apply_directive(directive);
        }

        if let Some(dump) = &mut self.dump {
            dump.extend_from_slice(cmd);
        }

        let body = &cmd[..cmd.len() - 1];
        if let Some(canvas) = &mut self.canvas {
            let body_text = String::from_utf8_lossy(body);
            if let Err(e) = canvas.process_command(&body_text) {
                error!(
                    target: "parser",
                    cmd = ?text,
                    error = %e,
                    "drawing_failed"
                );
            }
        }

        let opcode = [
            cmd[0].to_ascii_uppercase(),
            cmd.get(1).copied().unwrap_or(0).to_ascii_uppercase(),
        ];
        match &opcode {
            b"IN" => self.term = DEFAULT_TERMINATOR,
            b"DT" => {
                let args = &body[2..];
                match args.len() {
                    1 => self.term = args[0],
                    0 => self.term = DEFAULT_TERMINATOR,
                    _ => {
                        error!(target: "parser", cmd = ?text, "bad_terminator_command");
                    }
                }
            }
            _ => {}
        }
    }

    fn apply_directive(&mut self, directive: PlotDirective) {
        match directive {
            PlotDirective::Start { options } => self.start_plot(options),
            PlotDirective::Finish {
                image,
                format,
                dump,
            } => self.finish_plot(image.as_deref(), format, dump.as_deref()),
        }
    }
}
