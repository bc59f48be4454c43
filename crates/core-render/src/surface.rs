//! Recording surface and the raster / vector backends that replay it.
//!
//! Coordinates are page millimeters with the origin at the paper's top-left
//! corner and y growing downward. The surface covers only the cropped
//! drawable area; content outside it is clipped at replay time by the
//! backends' viewports.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use core_config::{ImageFormat, Rgba};
use printpdf::{Line, Mm, PdfDocument, Point, Polygon};
use tiny_skia::{LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};

const MM_TO_PT: f64 = 72.0 / 25.4;

/// One recorded polyline, stroked with round caps and joins.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokedPath {
    /// Vertices in page mm; always at least two.
    pub points: Vec<(f64, f64)>,
    pub color: Rgba,
    /// Stroke width in mm.
    pub width: f64,
}

impl StrokedPath {
    fn is_visible(&self) -> bool {
        self.color.is_visible() && self.width > 0.0
    }
}

pub struct RecordingSurface {
    origin_x: f64,
    origin_y: f64,
    width: f64,
    height: f64,
    background: Rgba,
    paths: Vec<StrokedPath>,
}

impl RecordingSurface {
    pub fn new(origin_x: f64, origin_y: f64, width: f64, height: f64, background: Rgba) -> Self {
        Self {
            origin_x,
            origin_y,
            width,
            height,
            background,
            paths: Vec::new(),
        }
    }

    /// (origin x, origin y, width, height) in mm.
    pub fn extents(&self) -> (f64, f64, f64, f64) {
        (self.origin_x, self.origin_y, self.width, self.height)
    }

    pub fn paths(&self) -> &[StrokedPath] {
        &self.paths
    }

    /// Record a polyline. Fewer than two vertices is a no-op: a lone point
    /// has no stroke extent.
    pub fn push_polyline(&mut self, points: Vec<(f64, f64)>, color: Rgba, width: f64) {
        if points.len() < 2 {
            return;
        }
        self.paths.push(StrokedPath {
            points,
            color,
            width,
        });
    }

    pub fn save(&self, path: &Path, format: ImageFormat, dpi: f64) -> Result<()> {
        match format {
            ImageFormat::Png => self.write_png(path, dpi),
            ImageFormat::Pdf => self.write_pdf(path),
        }
    }

    fn write_png(&self, path: &Path, dpi: f64) -> Result<()> {
        let dots_per_mm = dpi / 25.4;
        let img_w = ((self.width * dots_per_mm) as u32).max(1);
        let img_h = ((self.height * dots_per_mm) as u32).max(1);
        let mut pixmap = Pixmap::new(img_w, img_h)
            .with_context(|| format!("allocating {img_w}×{img_h} raster surface"))?;
        pixmap.fill(skia_color(self.background));

        // Remap mm to pixels so the crop origin lands at the top-left pixel.
        let sx = img_w as f32 / self.width as f32;
        let sy = img_h as f32 / self.height as f32;
        let transform = Transform::from_row(
            sx,
            0.0,
            0.0,
            sy,
            -(self.origin_x as f32) * sx,
            -(self.origin_y as f32) * sy,
        );

        for record in self.paths.iter().filter(|p| p.is_visible()) {
            let mut builder = PathBuilder::new();
            let (x0, y0) = record.points[0];
            builder.move_to(x0 as f32, y0 as f32);
            for &(x, y) in &record.points[1..] {
                builder.line_to(x as f32, y as f32);
            }
            let Some(skia_path) = builder.finish() else {
                continue;
            };
            let mut paint = Paint::default();
            paint.anti_alias = true;
            paint.set_color(skia_color(record.color));
            let stroke = Stroke {
                width: record.width as f32,
                line_cap: LineCap::Round,
                line_join: LineJoin::Round,
                ..Stroke::default()
            };
            pixmap.stroke_path(&skia_path, &paint, &stroke, transform, None);
        }

        pixmap
            .save_png(path)
            .with_context(|| format!("writing {}", path.display()))
    }

    fn write_pdf(&self, path: &Path) -> Result<()> {
        let (doc, page_index, layer_index) = PdfDocument::new(
            "plot",
            Mm(self.width as f32),
            Mm(self.height as f32),
            "plot",
        );
        let layer = doc.get_page(page_index).get_layer(layer_index);

        // PDF y grows upward from the bottom-left page corner.
        let place = |x: f64, y: f64| {
            Point::new(
                Mm((x - self.origin_x) as f32),
                Mm((self.height - (y - self.origin_y)) as f32),
            )
        };

        if self.background.is_visible() {
            layer.set_fill_color(pdf_color(self.background));
            layer.add_polygon(Polygon {
                rings: vec![vec![
                    (Point::new(Mm(0.0), Mm(0.0)), false),
                    (Point::new(Mm(self.width as f32), Mm(0.0)), false),
                    (
                        Point::new(Mm(self.width as f32), Mm(self.height as f32)),
                        false,
                    ),
                    (Point::new(Mm(0.0), Mm(self.height as f32)), false),
                ]],
                mode: printpdf::path::PaintMode::Fill,
                winding_order: printpdf::path::WindingOrder::NonZero,
            });
        }

        layer.set_line_cap_style(printpdf::LineCapStyle::Round);
        layer.set_line_join_style(printpdf::LineJoinStyle::Round);
        for record in self.paths.iter().filter(|p| p.is_visible()) {
            layer.set_outline_color(pdf_color(record.color));
            layer.set_outline_thickness((record.width * MM_TO_PT) as f32);
            layer.add_line(Line {
                points: record
                    .points
                    .iter()
                    .map(|&(x, y)| (place(x, y), false))
                    .collect(),
                is_closed: false,
            });
        }

        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        doc.save(&mut BufWriter::new(file))
            .with_context(|| format!("writing {}", path.display()))
    }
}

fn skia_color(color: Rgba) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba(
        color.r.clamp(0.0, 1.0),
        color.g.clamp(0.0, 1.0),
        color.b.clamp(0.0, 1.0),
        color.a.clamp(0.0, 1.0),
    )
    .unwrap_or(tiny_skia::Color::BLACK)
}

fn pdf_color(color: Rgba) -> printpdf::Color {
    printpdf::Color::Rgb(printpdf::Rgb::new(color.r, color.g, color.b, None))
}
