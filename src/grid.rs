use crate::command::{BoxId, GRID_COLS, GRID_ROWS};
use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use std::io::Cursor;
use std::path::Path;
use tracing::warn;

/// Physical screen the grid maps to; tap midpoints are computed against this.
pub const SCREEN_WIDTH: u32 = 1084;
pub const SCREEN_HEIGHT: u32 = 2412;

/// Screenshots are normalized to this size before the overlay is drawn.
pub const OVERLAY_WIDTH: u32 = 720;
pub const OVERLAY_HEIGHT: u32 = 1600;

const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL: Rgb<u8> = Rgb([255, 0, 255]);
const SHADOW: Rgb<u8> = Rgb([0, 0, 0]);
const LABEL_SCALE: f32 = 40.0;
const SHADOW_OFFSET: i32 = 2;

/// Pixel midpoint of a grid cell on the physical screen. The transport layer
/// attaches this to tap commands so the client does not need grid knowledge.
pub fn cell_midpoint(box_id: &BoxId) -> (u32, u32) {
    let cell_w = SCREEN_WIDTH as f64 / GRID_COLS as f64;
    let cell_h = SCREEN_HEIGHT as f64 / GRID_ROWS as f64;
    let x = (box_id.col() as f64 + 0.5) * cell_w;
    let y = (box_id.row() as f64 + 0.5) * cell_h;
    (x as u32, y as u32)
}

/// Draws the 20x10 labeled grid the locator model is prompted against:
/// lime cell outlines, magenta labels with a black drop shadow.
pub struct GridRenderer {
    font: Option<Font<'static>>,
}

impl GridRenderer {
    pub fn new(font: Option<Font<'static>>) -> Self {
        if font.is_none() {
            warn!("no label font loaded, grid overlay will draw outlines only");
        }
        Self { font }
    }

    pub fn from_font_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let font = match std::fs::read(path) {
            Ok(bytes) => Font::try_from_vec(bytes),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read grid label font");
                None
            }
        };
        Self::new(font)
    }

    /// Loads the font from `GRID_FONT_PATH` or the first present candidate.
    pub fn from_env() -> Self {
        if let Ok(path) = std::env::var("GRID_FONT_PATH") {
            return Self::from_font_path(path);
        }
        let candidates = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/Library/Fonts/Arial.ttf",
            "C:/Windows/Fonts/Arial.ttf",
        ];
        for candidate in candidates {
            if Path::new(candidate).exists() {
                return Self::from_font_path(candidate);
            }
        }
        Self::new(None)
    }

    /// Decodes a screenshot, normalizes it to 720x1600, draws the grid, and
    /// re-encodes as PNG.
    pub fn annotate(&self, screenshot: &[u8]) -> Result<Vec<u8>, image::ImageError> {
        let decoded = image::load_from_memory(screenshot)?;
        let mut canvas: RgbImage = image::imageops::resize(
            &decoded.to_rgb8(),
            OVERLAY_WIDTH,
            OVERLAY_HEIGHT,
            FilterType::Triangle,
        );
        self.draw_grid(&mut canvas);

        let mut out = Vec::new();
        DynamicImage::ImageRgb8(canvas).write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)?;
        Ok(out)
    }

    fn draw_grid(&self, canvas: &mut RgbImage) {
        let cell_w = canvas.width() / GRID_COLS as u32;
        let cell_h = canvas.height() / GRID_ROWS as u32;
        let scale = Scale::uniform(LABEL_SCALE);

        for row in 0..GRID_ROWS {
            for col in 0..GRID_COLS {
                let x0 = col as u32 * cell_w;
                let y0 = row as u32 * cell_h;
                // 2 px outline: hollow rect plus a 1 px inset copy
                draw_hollow_rect_mut(
                    canvas,
                    Rect::at(x0 as i32, y0 as i32).of_size(cell_w, cell_h),
                    OUTLINE,
                );
                if cell_w > 2 && cell_h > 2 {
                    draw_hollow_rect_mut(
                        canvas,
                        Rect::at(x0 as i32 + 1, y0 as i32 + 1).of_size(cell_w - 2, cell_h - 2),
                        OUTLINE,
                    );
                }

                if let Some(font) = &self.font {
                    let label = format!("{}{}", (b'a' + row) as char, col);
                    let (tw, th) = text_size(scale, font, &label);
                    let tx = x0 as i32 + (cell_w as i32 - tw) / 2;
                    let ty = y0 as i32 + (cell_h as i32 - th) / 2;
                    draw_text_mut(
                        canvas,
                        SHADOW,
                        tx + SHADOW_OFFSET,
                        ty + SHADOW_OFFSET,
                        scale,
                        font,
                        &label,
                    );
                    draw_text_mut(canvas, LABEL, tx, ty, scale, font, &label);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoint_matches_grid_math() {
        // b3: row 1, col 3 on a 108.4 x 120.6 cell grid
        let b3: BoxId = "b3".parse().unwrap();
        assert_eq!(cell_midpoint(&b3), (379, 180));

        let a0: BoxId = "a0".parse().unwrap();
        assert_eq!(cell_midpoint(&a0), (54, 60));

        let t9: BoxId = "t9".parse().unwrap();
        assert_eq!(cell_midpoint(&t9), (1029, 2351));
    }

    #[test]
    fn midpoints_stay_on_screen() {
        for row in 0..20u8 {
            for col in 0..10u8 {
                let b = BoxId::new(row, col).unwrap();
                let (x, y) = cell_midpoint(&b);
                assert!(x < SCREEN_WIDTH && y < SCREEN_HEIGHT, "{b} out of bounds");
            }
        }
    }

    #[test]
    fn annotate_normalizes_dimensions() {
        let source = RgbImage::from_pixel(360, 800, Rgb([120, 130, 140]));
        let mut raw = Vec::new();
        DynamicImage::ImageRgb8(source)
            .write_to(&mut Cursor::new(&mut raw), ImageOutputFormat::Png)
            .unwrap();

        let renderer = GridRenderer::new(None);
        let annotated = renderer.annotate(&raw).unwrap();
        let decoded = image::load_from_memory(&annotated).unwrap().to_rgb8();
        assert_eq!(decoded.width(), OVERLAY_WIDTH);
        assert_eq!(decoded.height(), OVERLAY_HEIGHT);
        // grid outline is present at the top-left corner
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([0, 255, 0]));
    }

    #[test]
    fn annotate_rejects_garbage_bytes() {
        let renderer = GridRenderer::new(None);
        assert!(renderer.annotate(b"not an image").is_err());
    }
}
