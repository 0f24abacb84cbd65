//! PNG rendering with `image` and `imageproc`: map images for ground
//! overlays, point icons for KMZ archives, and legend swatches.

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_polygon_mut,
};
use imageproc::point::Point;
use imageproc::rect::Rect;
use kml_common::style::{Fill, PointSymbolizer, Stroke};
use kml_common::{Color, Coordinate, Envelope, Filter, Geometry, MapLayer, Style, Symbolizer};
use kml_encoder::render::{IconRenderer, RenderError, TileRenderer};
use kml_encoder::request::MAX_SIZE;
use kml_encoder::rules::{layer_rules, select_rules, symbolizers_of};
use kml_encoder::source::FeatureQuery;
use kml_encoder::FeatureSource;
use tracing::debug;

use crate::layer_config::Catalog;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const DEFAULT_RASTER: Rgba<u8> = Rgba([70, 130, 180, 160]);
const DEFAULT_MARK_SIZE: f64 = 16.0;
const LEGEND_ROW: u32 = 20;
const LEGEND_SWATCH: u32 = 16;

/// Pixel mapping of a geographic box onto an image.
#[derive(Debug, Clone, Copy)]
struct Viewport {
    envelope: Envelope,
    width: f64,
    height: f64,
}

impl Viewport {
    fn to_pixel(&self, c: &Coordinate) -> (f32, f32) {
        let x = (c.x - self.envelope.min_x) / self.envelope.width() * self.width;
        let y = (self.envelope.max_y - c.y) / self.envelope.height() * self.height;
        (x as f32, y as f32)
    }
}

pub struct ImageRenderer {
    catalog: Arc<Catalog>,
}

impl ImageRenderer {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Draw `layers` bottom to top into one transparent PNG.
    pub fn render_map(
        &self,
        layers: &[(&MapLayer, &Style)],
        envelope: &Envelope,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, RenderError> {
        if width == 0 || height == 0 || width > MAX_SIZE || height > MAX_SIZE {
            return Err(RenderError::InvalidSize { width, height });
        }
        let mut img = RgbaImage::from_pixel(width, height, TRANSPARENT);
        if envelope.is_null() || envelope.width() <= 0.0 || envelope.height() <= 0.0 {
            return encode_png(&img);
        }
        let viewport = Viewport {
            envelope: *envelope,
            width: width as f64,
            height: height as f64,
        };

        for (layer, style) in layers {
            if layer.is_vector() {
                self.draw_vector_layer(&mut img, &viewport, layer, style)?;
            } else {
                let color = layer
                    .raster_color
                    .as_ref()
                    .map(|c| rgba(c, None))
                    .unwrap_or(DEFAULT_RASTER);
                draw_raster_layer(&mut img, &viewport, layer, color);
            }
        }
        encode_png(&img)
    }

    fn draw_vector_layer(
        &self,
        img: &mut RgbaImage,
        viewport: &Viewport,
        layer: &MapLayer,
        style: &Style,
    ) -> Result<(), RenderError> {
        let entry = self.catalog.layer(layer.id.as_str()).map_err(|e| RenderError::Layer {
            layer: layer.id.to_string(),
            message: e.to_string(),
        })?;
        let Some(source) = entry.source.as_ref() else {
            return Ok(());
        };

        // Scale checks use the image's own scale, like the KML output does.
        let scale = viewport.envelope.width() * kml_encoder::context::METRES_PER_DEGREE
            / (viewport.width * kml_encoder::context::PIXEL_SIZE);
        let query = FeatureQuery::new(viewport.envelope, Filter::Include);
        let cursor = source.features(&query).map_err(|e| RenderError::Layer {
            layer: layer.id.to_string(),
            message: e.to_string(),
        })?;

        let mut drawn = 0usize;
        for feature in cursor {
            let feature = feature.map_err(|e| RenderError::Layer {
                layer: layer.id.to_string(),
                message: e.to_string(),
            })?;
            let rules = select_rules(style, layer.feature_type_name(), &feature, scale);
            for symbolizer in symbolizers_of(&rules) {
                draw_geometry(img, viewport, &feature.geometry, symbolizer);
            }
            drawn += 1;
        }
        debug!(layer = %layer.id, features = drawn, "Rendered vector layer");
        Ok(())
    }

    /// One swatch per rule of the style, top to bottom.
    pub fn render_legend(&self, layer: &MapLayer, style: &Style) -> Result<Vec<u8>, RenderError> {
        let rules = layer_rules(style, layer.feature_type_name());
        let rows = rules.len().max(1) as u32;
        let mut img = RgbaImage::from_pixel(LEGEND_ROW * 2, rows * LEGEND_ROW, TRANSPARENT);

        for (i, rule) in rules.iter().enumerate() {
            let top = (i as u32 * LEGEND_ROW + (LEGEND_ROW - LEGEND_SWATCH) / 2) as i32;
            let rect = Rect::at(2, top).of_size(LEGEND_SWATCH, LEGEND_SWATCH);
            let (fill, outline) = swatch_colors(&rule.symbolizers);
            if let Some(fill) = fill {
                draw_filled_rect_mut(&mut img, rect, fill);
            }
            if let Some(outline) = outline {
                draw_hollow_rect_mut(&mut img, rect, outline);
            }
        }
        encode_png(&img)
    }
}

impl TileRenderer for ImageRenderer {
    fn render_tile(
        &self,
        layer: &MapLayer,
        style: &str,
        envelope: &Envelope,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, RenderError> {
        let style = self
            .catalog
            .resolve_style(layer, style)
            .map_err(|e| RenderError::Layer {
                layer: layer.id.to_string(),
                message: e.to_string(),
            })?;
        self.render_map(&[(layer, style)], envelope, width, height)
    }
}

impl IconRenderer for ImageRenderer {
    fn render_icon(&self, symbolizer: &PointSymbolizer) -> Result<Vec<u8>, RenderError> {
        let size = symbolizer.size.unwrap_or(DEFAULT_MARK_SIZE).clamp(1.0, 256.0).ceil() as u32;
        let mut img = RgbaImage::from_pixel(size, size, TRANSPARENT);
        draw_mark(&mut img, symbolizer, (size as f32 / 2.0, size as f32 / 2.0), size as f32);
        encode_png(&img)
    }
}

fn draw_raster_layer(img: &mut RgbaImage, viewport: &Viewport, layer: &MapLayer, color: Rgba<u8>) {
    let area = layer
        .bounds
        .and_then(|b| b.intersection(&viewport.envelope))
        .unwrap_or(viewport.envelope);
    let (x0, y1) = viewport.to_pixel(&Coordinate::new(area.min_x, area.min_y));
    let (x1, y0) = viewport.to_pixel(&Coordinate::new(area.max_x, area.max_y));
    let w = (x1 - x0).round().max(1.0) as u32;
    let h = (y1 - y0).round().max(1.0) as u32;
    draw_filled_rect_mut(img, Rect::at(x0.round() as i32, y0.round() as i32).of_size(w, h), color);
}

fn draw_geometry(
    img: &mut RgbaImage,
    viewport: &Viewport,
    geometry: &Geometry,
    symbolizer: &Symbolizer,
) {
    match (geometry, symbolizer) {
        (_, Symbolizer::Text(_)) => {}
        (Geometry::GeometryCollection(members), _) => {
            for member in members {
                draw_geometry(img, viewport, member, symbolizer);
            }
        }
        (Geometry::Point(c), Symbolizer::Point(p)) => draw_point(img, viewport, c, p),
        (Geometry::MultiPoint(cs), Symbolizer::Point(p)) => {
            cs.iter().for_each(|c| draw_point(img, viewport, c, p))
        }
        (_, Symbolizer::Point(p)) => {
            if let Some(c) = geometry.centroid() {
                draw_point(img, viewport, &c, p);
            }
        }
        (Geometry::Polygon(poly), Symbolizer::Polygon(s)) => draw_polygon(
            img,
            viewport,
            &poly.exterior,
            s.fill.as_ref(),
            s.stroke.as_ref(),
        ),
        (Geometry::MultiPolygon(polys), Symbolizer::Polygon(s)) => {
            for poly in polys {
                draw_polygon(img, viewport, &poly.exterior, s.fill.as_ref(), s.stroke.as_ref());
            }
        }
        (Geometry::LineString(cs), Symbolizer::Line(l)) => {
            draw_line(img, viewport, cs, l.stroke.as_ref())
        }
        (Geometry::MultiLineString(lines), Symbolizer::Line(l)) => {
            lines.iter().for_each(|cs| draw_line(img, viewport, cs, l.stroke.as_ref()))
        }
        (Geometry::Polygon(poly), Symbolizer::Line(l)) => {
            draw_line(img, viewport, &poly.exterior, l.stroke.as_ref())
        }
        (Geometry::MultiPolygon(polys), Symbolizer::Line(l)) => {
            polys.iter().for_each(|p| draw_line(img, viewport, &p.exterior, l.stroke.as_ref()))
        }
        _ => {}
    }
}

fn draw_point(
    img: &mut RgbaImage,
    viewport: &Viewport,
    c: &Coordinate,
    symbolizer: &PointSymbolizer,
) {
    let size = symbolizer.size.unwrap_or(DEFAULT_MARK_SIZE) as f32;
    draw_mark(img, symbolizer, viewport.to_pixel(c), size);
}

fn draw_mark(img: &mut RgbaImage, symbolizer: &PointSymbolizer, centre: (f32, f32), size: f32) {
    let fill = symbolizer
        .fill
        .as_ref()
        .map(|f| rgba(&f.color, f.opacity.or(symbolizer.opacity)))
        .unwrap_or(Rgba([128, 128, 128, 255]));
    let half = (size / 2.0).max(1.0);
    let (cx, cy) = centre;

    match symbolizer.mark.as_deref().unwrap_or("square") {
        "circle" => draw_filled_circle_mut(img, (cx as i32, cy as i32), half as i32, fill),
        "triangle" => {
            let points = [
                Point::new(cx as i32, (cy - half) as i32),
                Point::new((cx + half) as i32, (cy + half) as i32),
                Point::new((cx - half) as i32, (cy + half) as i32),
            ];
            draw_polygon_mut(img, &points, fill);
        }
        "star" => {
            let points: Vec<Point<i32>> = (0..10)
                .map(|i| {
                    let r = if i % 2 == 0 { half } else { half * 0.4 };
                    let angle =
                        std::f32::consts::PI * (i as f32 / 5.0) - std::f32::consts::FRAC_PI_2;
                    Point::new(
                        (cx + r * angle.cos()).round() as i32,
                        (cy + r * angle.sin()).round() as i32,
                    )
                })
                .collect();
            draw_polygon_mut(img, &points, fill);
        }
        "cross" | "x" => {
            let stroke = stroke_color(symbolizer.stroke.as_ref()).unwrap_or(fill);
            let (a, b) = if symbolizer.mark.as_deref() == Some("x") {
                (
                    ((cx - half, cy - half), (cx + half, cy + half)),
                    ((cx - half, cy + half), (cx + half, cy - half)),
                )
            } else {
                (((cx - half, cy), (cx + half, cy)), ((cx, cy - half), (cx, cy + half)))
            };
            draw_line_segment_mut(img, a.0, a.1, stroke);
            draw_line_segment_mut(img, b.0, b.1, stroke);
        }
        _ => {
            let side = (half * 2.0).max(1.0) as u32;
            draw_filled_rect_mut(
                img,
                Rect::at((cx - half) as i32, (cy - half) as i32).of_size(side, side),
                fill,
            );
        }
    }
}

fn draw_polygon(
    img: &mut RgbaImage,
    viewport: &Viewport,
    ring: &[Coordinate],
    fill: Option<&Fill>,
    stroke: Option<&Stroke>,
) {
    if let Some(fill) = fill {
        let mut points: Vec<Point<i32>> = ring
            .iter()
            .map(|c| {
                let (x, y) = viewport.to_pixel(c);
                Point::new(x.round() as i32, y.round() as i32)
            })
            .collect();
        points.dedup();
        // Closed rings repeat the first point; the drawing routine rejects that.
        while points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        if points.len() >= 3 {
            draw_polygon_mut(img, &points, rgba(&fill.color, fill.opacity));
        }
    }
    if stroke.is_some() {
        draw_line(img, viewport, ring, stroke);
    }
}

fn draw_line(
    img: &mut RgbaImage,
    viewport: &Viewport,
    coords: &[Coordinate],
    stroke: Option<&Stroke>,
) {
    let color = stroke_color(stroke).unwrap_or(Rgba([0, 0, 0, 255]));
    for pair in coords.windows(2) {
        draw_line_segment_mut(img, viewport.to_pixel(&pair[0]), viewport.to_pixel(&pair[1]), color);
    }
}

fn stroke_color(stroke: Option<&Stroke>) -> Option<Rgba<u8>> {
    let stroke = stroke?;
    Some(rgba(stroke.color.as_ref()?, stroke.opacity))
}

/// Fill and outline of the first polygon, line or point symbolizer.
fn swatch_colors(symbolizers: &[Symbolizer]) -> (Option<Rgba<u8>>, Option<Rgba<u8>>) {
    for symbolizer in symbolizers {
        match symbolizer {
            Symbolizer::Polygon(p) => {
                return (
                    p.fill.as_ref().map(|f| rgba(&f.color, f.opacity)),
                    stroke_color(p.stroke.as_ref()),
                )
            }
            Symbolizer::Line(l) => return (stroke_color(l.stroke.as_ref()), None),
            Symbolizer::Point(p) => {
                return (
                    p.fill.as_ref().map(|f| rgba(&f.color, f.opacity)),
                    stroke_color(p.stroke.as_ref()),
                )
            }
            Symbolizer::Text(_) => {}
        }
    }
    (None, None)
}

fn rgba(color: &Color, opacity: Option<f64>) -> Rgba<u8> {
    let (r, g, b, a) = color.to_rgba();
    let a = match opacity {
        Some(o) => (255.0 * o.clamp(0.0, 1.0)).round() as u8,
        None => a,
    };
    Rgba([r, g, b, a])
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(bytes)
}
