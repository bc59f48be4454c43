//! Resolved rendering options: the immutable record a plot is created from.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use core_config::{RenderConfigFile, Rgba};
use core_font::{Font, load_font};
use tracing::warn;

/// Stroke appearance of one logical pen.
#[derive(Debug, Clone, PartialEq)]
pub struct PenStyle {
    pub color: Rgba,
    /// Width in mm on paper.
    pub line_width: f64,
}

/// Pen 0: fully transparent, zero width. Selecting any pen not present in
/// the table falls back to this.
static NO_PEN: PenStyle = PenStyle {
    color: Rgba::TRANSPARENT,
    line_width: 0.0,
};

pub struct RenderOptions {
    pub paper_w: f64,
    pub paper_h: f64,
    pub crop_t: f64,
    pub crop_l: f64,
    pub crop_b: f64,
    pub crop_r: f64,
    pub dpi: f64,
    pub background: Rgba,
    pens: HashMap<u32, PenStyle>,
    pub text_font: Arc<dyn Font>,
    pub text_line_width: Option<f64>,
    pub text_color: Option<Rgba>,
}

impl RenderOptions {
    /// Resolve a config record, loading the configured font from disk.
    pub fn from_config(config: &RenderConfigFile) -> Result<Arc<Self>> {
        let font = load_font(&config.text.font, &config.text.font_dir)
            .with_context(|| format!("loading text font {:?}", config.text.font))?;
        Self::with_font(config, font)
    }

    /// Resolve a config record against an already-constructed font.
    pub fn with_font(config: &RenderConfigFile, font: Arc<dyn Font>) -> Result<Arc<Self>> {
        let [paper_w, paper_h] = config.paper;
        let [crop_t, crop_l, crop_b, crop_r] = config.crop.unwrap_or_default();
        if paper_w - crop_l - crop_r <= 0.0 || paper_h - crop_t - crop_b <= 0.0 {
            bail!(
                "crop margins {:?} leave no drawable area on {paper_w}×{paper_h} mm paper",
                config.crop
            );
        }

        let mut pens = HashMap::new();
        for (key, entry) in &config.pens {
            let number: u32 = match key.trim().parse() {
                Ok(n) => n,
                Err(_) => {
                    warn!(target: "config", key = key.as_str(), "ignoring_non_numeric_pen_key");
                    continue;
                }
            };
            if number == 0 {
                warn!(target: "config", "ignoring_pen_zero_override");
                continue;
            }
            pens.insert(
                number,
                PenStyle {
                    color: entry.color.resolve()?,
                    line_width: entry.line_width,
                },
            );
        }

        let text_color = match &config.text.color {
            Some(spec) => Some(spec.resolve()?),
            None => None,
        };

        Ok(Arc::new(Self {
            paper_w,
            paper_h,
            crop_t,
            crop_l,
            crop_b,
            crop_r,
            dpi: config.dpi,
            background: config.background_color.resolve()?,
            pens,
            text_font: font,
            text_line_width: config.text.line_width,
            text_color,
        }))
    }

    /// Style for a pen number; unknown or negative pens are the no-pen.
    pub fn pen(&self, number: i64) -> &PenStyle {
        u32::try_from(number)
            .ok()
            .and_then(|n| self.pens.get(&n))
            .unwrap_or(&NO_PEN)
    }

    /// Drawable area after cropping: (origin x, origin y, width, height) mm.
    pub fn draw_extents(&self) -> (f64, f64, f64, f64) {
        (
            self.crop_l,
            self.crop_t,
            self.paper_w - self.crop_l - self.crop_r,
            self.paper_h - self.crop_t - self.crop_b,
        )
    }
}
