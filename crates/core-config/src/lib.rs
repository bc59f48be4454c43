//! Configuration records for rendering and capture.
//!
//! Both config files are TOML. Parsing is tolerant where a field has an
//! obvious default (paper size, dpi, pens) and strict where guessing would
//! hide a broken setup (port name, image filename). Color values accept
//! `"#RRGGBB"` strings, packed integers, or explicit RGBA component arrays.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// Straight-alpha color with components in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn opaque(r: f32, g: f32, b: f32) -> Rgba {
        Rgba { r, g, b, a: 1.0 }
    }

    fn from_packed(packed: u32) -> Rgba {
        let r = ((packed >> 16) & 0xFF) as f32 / 255.0;
        let g = ((packed >> 8) & 0xFF) as f32 / 255.0;
        let b = (packed & 0xFF) as f32 / 255.0;
        Rgba::opaque(r, g, b)
    }

    pub fn is_visible(&self) -> bool {
        self.a > 0.0
    }
}

/// Color as written in a config file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ColorSpec {
    Hex(String),
    Packed(u32),
    Components([f32; 4]),
}

impl ColorSpec {
    pub fn resolve(&self) -> Result<Rgba> {
        match self {
            ColorSpec::Hex(text) => {
                let digits = text.trim().trim_start_matches('#');
                let packed = u32::from_str_radix(digits, 16)
                    .with_context(|| format!("invalid color specification {text:?}"))?;
                Ok(Rgba::from_packed(packed))
            }
            ColorSpec::Packed(packed) => Ok(Rgba::from_packed(*packed)),
            ColorSpec::Components([r, g, b, a]) => Ok(Rgba {
                r: *r,
                g: *g,
                b: *b,
                a: *a,
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PenEntry {
    pub color: ColorSpec,
    pub line_width: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TextEntry {
    /// `stick_font` or `hershey:VARIANT`.
    #[serde(default = "TextEntry::default_font")]
    pub font: String,
    /// Directory searched for Hershey variants.
    #[serde(default = "TextEntry::default_font_dir")]
    pub font_dir: PathBuf,
    #[serde(default)]
    pub line_width: Option<f64>,
    #[serde(default)]
    pub color: Option<ColorSpec>,
}

impl TextEntry {
    fn default_font() -> String {
        "hershey:rowmans".to_string()
    }

    fn default_font_dir() -> PathBuf {
        PathBuf::from("fonts")
    }
}

impl Default for TextEntry {
    fn default() -> Self {
        Self {
            font: Self::default_font(),
            font_dir: Self::default_font_dir(),
            line_width: Some(0.5),
            color: Some(ColorSpec::Hex("#EB9605".to_string())),
        }
    }
}

/// Render configuration file contents.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RenderConfigFile {
    /// Paper size in mm, width × height.
    #[serde(default = "RenderConfigFile::default_paper")]
    pub paper: [f64; 2],
    /// Margins stripped from the image in mm: top, left, bottom, right.
    #[serde(default)]
    pub crop: Option<[f64; 4]>,
    /// Raster resolution; irrelevant for PDF output.
    #[serde(default = "RenderConfigFile::default_dpi")]
    pub dpi: f64,
    #[serde(default = "RenderConfigFile::default_background")]
    pub background_color: ColorSpec,
    /// Pen table keyed by decimal pen number. Pen 0 is reserved.
    #[serde(default)]
    pub pens: BTreeMap<String, PenEntry>,
    #[serde(default)]
    pub text: TextEntry,
}

impl RenderConfigFile {
    fn default_paper() -> [f64; 2] {
        [297.0, 210.0]
    }

    fn default_dpi() -> f64 {
        400.0
    }

    fn default_background() -> ColorSpec {
        ColorSpec::Hex("#000000".to_string())
    }

    fn default_pens() -> BTreeMap<String, PenEntry> {
        let mut pens = BTreeMap::new();
        for (key, color, line_width) in [
            ("1", "#00FA9A", 0.3),
            ("2", "#1E90FF", 0.5),
            ("3", "#7B68EE", 0.5),
            ("4", "#F5F5DC", 0.5),
            ("5", "#DB7093", 0.5),
        ] {
            pens.insert(
                key.to_string(),
                PenEntry {
                    color: ColorSpec::Hex(color.to_string()),
                    line_width,
                },
            );
        }
        pens
    }
}

impl Default for RenderConfigFile {
    fn default() -> Self {
        Self {
            paper: Self::default_paper(),
            crop: Some([25.0, 10.0, 5.0, 15.0]),
            dpi: Self::default_dpi(),
            background_color: Self::default_background(),
            pens: Self::default_pens(),
            text: TextEntry::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Pdf,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ImgSection {
    pub format: ImageFormat,
    /// strftime-style pattern resolved when a plot starts.
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PortSection {
    pub name: String,
    pub baud: u32,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub rtscts: bool,
    #[serde(default)]
    pub dsrdtr: bool,
    #[serde(default)]
    pub xonxoff: bool,
}

/// Capture configuration file contents.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CaptureConfigFile {
    pub img: ImgSection,
    /// Optional raw HPGL dump, also a strftime-style pattern.
    #[serde(default)]
    pub dump_filename: Option<String>,
    pub port: PortSection,
}

pub fn load_render_config(path: &Path) -> Result<RenderConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading render config {}", path.display()))?;
    let config: RenderConfigFile = toml::from_str(&content)
        .with_context(|| format!("parsing render config {}", path.display()))?;
    if config.paper[0] <= 0.0 || config.paper[1] <= 0.0 {
        bail!("paper size must be positive, got {:?}", config.paper);
    }
    if config.dpi <= 0.0 {
        bail!("dpi must be positive, got {}", config.dpi);
    }
    tracing::debug!(
        target: "config",
        path = %path.display(),
        pens = config.pens.len(),
        font = config.text.font.as_str(),
        "render_config_loaded"
    );
    Ok(config)
}

pub fn load_capture_config(path: &Path) -> Result<CaptureConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading capture config {}", path.display()))?;
    let config: CaptureConfigFile = toml::from_str(&content)
        .with_context(|| format!("parsing capture config {}", path.display()))?;
    tracing::debug!(
        target: "config",
        path = %path.display(),
        port = config.port.name.as_str(),
        baud = config.port.baud,
        "capture_config_loaded"
    );
    Ok(config)
}
