//! Stateful HPGL rendering onto a resolution-independent recording surface.
//!
//! [`PlotCanvas`] interprets one command at a time and accumulates stroked
//! polylines in page millimeters. Nothing is rasterized until
//! [`PlotCanvas::save`], which replays the recording through the PNG or PDF
//! backend, so a single plot can be emitted at any dpi or as vectors.

mod engine;
mod error;
mod options;
mod surface;

pub use core_config::ImageFormat;
pub use engine::{HPGL_UNIT_MM, PlotCanvas};
pub use error::RenderError;
pub use options::{PenStyle, RenderOptions};
pub use surface::{RecordingSurface, StrokedPath};
