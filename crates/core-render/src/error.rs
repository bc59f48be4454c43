use thiserror::Error;

/// Per-command rendering failures. None of these abort a plot: the stream
/// parser logs them at its command boundary and the canvas state is left
/// unchanged.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid arguments for {opcode}: {args:?}")]
    InvalidArgs { opcode: String, args: String },
    #[error("unknown opcode {0:?}")]
    UnknownOpcode(String),
    #[error("degenerate scaling anchors: P1 and P2 coincide on an axis")]
    InvalidCoords,
}

impl RenderError {
    pub(crate) fn invalid_args(opcode: &str, args: &str) -> Self {
        RenderError::InvalidArgs {
            opcode: opcode.to_string(),
            args: args.trim().to_string(),
        }
    }
}
