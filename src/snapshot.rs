//! Cropped, cursor-annotated snapshots around a pointed-at location.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use crate::error::{ErrorContext, Result};
use crate::models::{COORDINATE_GRID_MAX, Coordinate};

/// Side of the square cursor glyph drawn onto the crop.
pub const CURSOR_SIZE: u32 = 50;
/// Bias applied to the glyph origin so its hotspot lands on the point.
pub const CURSOR_OFFSET_X: f64 = 5.0;
pub const CURSOR_OFFSET_Y: f64 = -5.0;

// ============================================================================
// Region geometry
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotShape {
    /// Crop height as a percentage of the image height.
    pub size_percent_y: f64,
    /// Crop width percentage relative to `size_percent_y`.
    pub x_to_y_ratio: f64,
}

impl Default for SnapshotShape {
    fn default() -> Self {
        Self {
            size_percent_y: 15.0,
            x_to_y_ratio: 2.5,
        }
    }
}

/// Pixel-space crop window, always inside the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// The pointed-at location in source pixel space.
    pub point_x: f64,
    pub point_y: f64,
}

impl SnapshotRegion {
    /// `None` when either coordinate component is negative.
    pub fn compute(
        coordinate: Coordinate,
        image_width: u32,
        image_height: u32,
        shape: SnapshotShape,
    ) -> Option<Self> {
        if coordinate.is_negative() {
            return None;
        }

        let size_percent_x = shape.size_percent_y * shape.x_to_y_ratio;
        let width = output_size(image_width, size_percent_x);
        let height = output_size(image_height, shape.size_percent_y);

        let point_x = coordinate.x as f64 / COORDINATE_GRID_MAX * image_width as f64;
        let point_y = coordinate.y as f64 / COORDINATE_GRID_MAX * image_height as f64;

        Some(Self {
            x: clamp_origin(point_x - width as f64 / 2.0, image_width - width),
            y: clamp_origin(point_y - height as f64 / 2.0, image_height - height),
            width,
            height,
            point_x,
            point_y,
        })
    }

    /// Top-left of the cursor glyph, relative to the crop origin.
    pub fn cursor_origin(&self) -> (i64, i64) {
        (
            (self.point_x - self.x as f64 + CURSOR_OFFSET_X).round() as i64,
            (self.point_y - self.y as f64 + CURSOR_OFFSET_Y).round() as i64,
        )
    }
}

fn output_size(dimension: u32, percent: f64) -> u32 {
    let size = (dimension as f64 * percent / 100.0).round() as u32;
    size.clamp(1.min(dimension), dimension)
}

fn clamp_origin(origin: f64, max: u32) -> u32 {
    origin.round().clamp(0.0, max as f64) as u32
}

// ============================================================================
// Cursor glyph
// ============================================================================

#[derive(Debug, Clone, Default)]
pub enum CursorGlyph {
    /// Arrow pointer drawn in code.
    #[default]
    Builtin,
    /// Encoded raster (PNG, JPEG, ...).
    Encoded(Bytes),
}

impl CursorGlyph {
    fn decode(&self) -> Result<RgbaImage> {
        let glyph = match self {
            Self::Builtin => builtin_arrow(),
            Self::Encoded(data) => image::load_from_memory(data)
                .context("cursor glyph")?
                .to_rgba8(),
        };
        Ok(imageops::resize(&glyph, CURSOR_SIZE, CURSOR_SIZE, FilterType::Lanczos3))
    }
}

const ARROW: [(f64, f64); 7] = [
    (2.0, 2.0),
    (2.0, 40.0),
    (12.0, 31.0),
    (19.0, 46.0),
    (26.0, 43.0),
    (19.0, 28.0),
    (32.0, 28.0),
];

fn builtin_arrow() -> RgbaImage {
    let inside = |x: u32, y: u32| point_in_polygon(x as f64 + 0.5, y as f64 + 0.5, &ARROW);

    RgbaImage::from_fn(CURSOR_SIZE, CURSOR_SIZE, |x, y| {
        if !inside(x, y) {
            return Rgba([0, 0, 0, 0]);
        }
        let edge = x == 0
            || y == 0
            || !inside(x - 1, y)
            || !inside(x + 1, y)
            || !inside(x, y - 1)
            || !inside(x, y + 1);
        if edge {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    })
}

fn point_in_polygon(px: f64, py: f64, polygon: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

// ============================================================================
// Encoded image helpers
// ============================================================================

/// Accepts `data:<mime>;base64,<payload>` or a bare base64 payload.
pub fn decode_image_data(encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.split_once(";base64,") {
        Some((header, payload)) if header.starts_with("data:") => payload,
        _ => encoded,
    };
    Ok(STANDARD.decode(payload.trim())?)
}

pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

fn encode_png(image: RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(image).write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
    Ok(buffer)
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    pub shape: SnapshotShape,
    pub cursor: CursorGlyph,
}

impl SnapshotBuilder {
    pub fn new(shape: SnapshotShape, cursor: CursorGlyph) -> Self {
        Self { shape, cursor }
    }

    /// Crop `screenshot` around `coordinate` and draw the cursor on it.
    ///
    /// Returns a PNG data URL, or `None` for a negative coordinate. Failure to
    /// decode either the screenshot or the cursor glyph is an error.
    pub async fn build(&self, screenshot: &str, coordinate: Coordinate) -> Result<Option<String>> {
        if coordinate.is_negative() {
            return Ok(None);
        }

        let source_bytes = decode_image_data(screenshot)?;
        let cursor = self.cursor.clone();

        let source = tokio::task::spawn_blocking(move || -> Result<RgbaImage> {
            Ok(image::load_from_memory(&source_bytes)
                .context("screenshot")?
                .to_rgba8())
        });
        let glyph = tokio::task::spawn_blocking(move || cursor.decode());

        let (source, glyph) = tokio::try_join!(source, glyph)?;
        let (source, glyph) = (source?, glyph?);

        let shape = self.shape;
        let png = tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>> {
            let Some(region) =
                SnapshotRegion::compute(coordinate, source.width(), source.height(), shape)
            else {
                return Ok(None);
            };
            log::debug!("snapshot region {:?} for {:?}", region, coordinate);
            encode_png(render(&source, &glyph, &region)).map(Some)
        })
        .await??;

        Ok(png.map(|png| png_data_url(&png)))
    }
}

fn render(source: &RgbaImage, glyph: &RgbaImage, region: &SnapshotRegion) -> RgbaImage {
    let mut canvas =
        imageops::crop_imm(source, region.x, region.y, region.width, region.height).to_image();
    let (cursor_x, cursor_y) = region.cursor_origin();
    imageops::overlay(&mut canvas, glyph, cursor_x, cursor_y);
    canvas
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn contained(r: &SnapshotRegion, w: u32, h: u32) -> bool {
        r.x + r.width <= w && r.y + r.height <= h
    }

    fn solid_png(w: u32, h: u32, color: [u8; 4]) -> Vec<u8> {
        encode_png(RgbaImage::from_pixel(w, h, Rgba(color))).unwrap()
    }

    #[test]
    fn test_centered_region() {
        let r = SnapshotRegion::compute(Coordinate::new(500, 500), 1000, 1000, SnapshotShape::default())
            .unwrap();

        assert_eq!((r.width, r.height), (375, 150));
        assert!(contained(&r, 1000, 1000));
        let center_x = r.x as f64 + r.width as f64 / 2.0;
        let center_y = r.y as f64 + r.height as f64 / 2.0;
        assert!((center_x - r.point_x).abs() <= 1.0);
        assert!((center_y - r.point_y).abs() <= 1.0);
    }

    #[test]
    fn test_region_clamps_to_origin() {
        let r = SnapshotRegion::compute(Coordinate::new(0, 0), 1000, 1000, SnapshotShape::default())
            .unwrap();
        assert_eq!((r.x, r.y), (0, 0));
        assert!(contained(&r, 1000, 1000));
    }

    #[test]
    fn test_region_clamps_to_far_edge() {
        let r = SnapshotRegion::compute(Coordinate::new(999, 999), 1920, 1080, SnapshotShape::default())
            .unwrap();
        assert_eq!(r.x + r.width, 1920);
        assert_eq!(r.y + r.height, 1080);
    }

    #[test]
    fn test_oversized_shape_stays_inside() {
        let shape = SnapshotShape {
            size_percent_y: 60.0,
            x_to_y_ratio: 2.5,
        };
        let r = SnapshotRegion::compute(Coordinate::new(300, 700), 800, 600, shape).unwrap();
        assert_eq!(r.width, 800);
        assert!(contained(&r, 800, 600));
    }

    #[test]
    fn test_negative_coordinate_rejected() {
        let shape = SnapshotShape::default();
        assert!(SnapshotRegion::compute(Coordinate::new(-1, 10), 100, 100, shape).is_none());
        assert!(SnapshotRegion::compute(Coordinate::new(10, -1), 100, 100, shape).is_none());
    }

    #[test]
    fn test_cursor_origin_bias() {
        let r = SnapshotRegion::compute(Coordinate::new(0, 999), 1000, 1000, SnapshotShape::default())
            .unwrap();
        // point sits at the left edge and bottom edge of the crop
        assert_eq!(r.cursor_origin(), (5, r.height as i64 - 5));
    }

    #[test]
    fn test_decode_image_data_accepts_both_forms() {
        let png = solid_png(2, 2, [1, 2, 3, 255]);
        let url = png_data_url(&png);
        assert_eq!(decode_image_data(&url).unwrap(), png);
        assert_eq!(decode_image_data(&STANDARD.encode(&png)).unwrap(), png);
        assert!(decode_image_data("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn test_builtin_arrow_has_tip_and_transparency() {
        let arrow = builtin_arrow();
        assert_eq!(arrow.dimensions(), (CURSOR_SIZE, CURSOR_SIZE));
        assert_eq!(arrow.get_pixel(49, 0)[3], 0);
        assert_eq!(arrow.get_pixel(10, 25)[3], 255);
    }

    #[tokio::test]
    async fn test_build_snapshot_dimensions() {
        let image = png_data_url(&solid_png(1000, 1000, [0, 128, 255, 255]));
        let builder = SnapshotBuilder::default();

        let out = builder
            .build(&image, Coordinate::new(500, 500))
            .await
            .unwrap()
            .unwrap();
        assert!(out.starts_with("data:image/png;base64,"));

        let decoded = image::load_from_memory(&decode_image_data(&out).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (375, 150));
    }

    #[tokio::test]
    async fn test_build_snapshot_copies_source_pixels() {
        let source = RgbaImage::from_fn(1000, 1000, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
        });
        let image = png_data_url(&encode_png(source.clone()).unwrap());
        let coordinate = Coordinate::new(500, 500);
        let region =
            SnapshotRegion::compute(coordinate, 1000, 1000, SnapshotShape::default()).unwrap();

        let out = SnapshotBuilder::default()
            .build(&image, coordinate)
            .await
            .unwrap()
            .unwrap();
        let decoded = image::load_from_memory(&decode_image_data(&out).unwrap())
            .unwrap()
            .to_rgba8();

        // corners are far from the cursor and must match the source 1:1
        for (cx, cy) in [(0, 0), (region.width - 1, region.height - 1), (0, region.height - 1)] {
            assert_eq!(
                decoded.get_pixel(cx, cy),
                source.get_pixel(region.x + cx, region.y + cy)
            );
        }
    }

    #[tokio::test]
    async fn test_build_snapshot_draws_cursor() {
        let image = png_data_url(&solid_png(1000, 1000, [0, 0, 0, 255]));
        let glyph = CursorGlyph::Encoded(Bytes::from(solid_png(50, 50, [255, 0, 0, 255])));
        let builder = SnapshotBuilder::new(SnapshotShape::default(), glyph);

        let out = builder
            .build(&image, Coordinate::new(0, 0))
            .await
            .unwrap()
            .unwrap();
        let decoded = image::load_from_memory(&decode_image_data(&out).unwrap())
            .unwrap()
            .to_rgba8();

        // glyph starts at (5, -5) relative to the crop
        let cursor_px = decoded.get_pixel(10, 10);
        assert!(cursor_px[0] > 200 && cursor_px[1] < 50);
        assert_eq!(decoded.get_pixel(2, 10), &Rgba([0, 0, 0, 255]));
        assert_eq!(decoded.get_pixel(10, 60), &Rgba([0, 0, 0, 255]));
    }

    #[tokio::test]
    async fn test_build_snapshot_negative_coordinate() {
        let builder = SnapshotBuilder::default();
        let out = builder.build("not even decoded", Coordinate::new(-1, -1)).await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_build_snapshot_bad_glyph_is_fatal() {
        let image = png_data_url(&solid_png(100, 100, [0, 0, 0, 255]));
        let builder = SnapshotBuilder::new(
            SnapshotShape::default(),
            CursorGlyph::Encoded(Bytes::from_static(b"not an image")),
        );
        let err = builder.build(&image, Coordinate::new(10, 10)).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ImageProcessing);
    }

    #[tokio::test]
    async fn test_build_snapshot_bad_source_is_fatal() {
        let builder = SnapshotBuilder::default();
        let image = png_data_url(b"garbage");
        assert!(builder.build(&image, Coordinate::new(10, 10)).await.is_err());
    }
}
