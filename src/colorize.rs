use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

use crate::error::DecodeError;
use crate::palette::{Palette, PaletteName, Rgb};
use crate::raster::RasterImage;

const PLACEHOLDER_BLOCK: u32 = 32;
const PLACEHOLDER_DARK: Rgb = Rgb::new(30, 60, 30);
const PLACEHOLDER_LIGHT: Rgb = Rgb::new(0, 180, 0);

/// RGBA image produced from a raster; replaced wholesale, never edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorImage {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 4]>,
}

impl ColorImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[[u8; 4]] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    /// Paints a rectangle, clipped to the image.
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: [u8; 4]) {
        let right = x.saturating_add(width).min(self.width);
        let bottom = y.saturating_add(height).min(self.height);
        for py in y.min(bottom)..bottom {
            let row = py as usize * self.width as usize;
            for px in x.min(right)..right {
                self.pixels[row + px as usize] = color;
            }
        }
    }

    /// One-pixel rectangle outline, clipped to the image.
    pub fn stroke_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: [u8; 4]) {
        if width == 0 || height == 0 {
            return;
        }
        self.fill_rect(x, y, width, 1, color);
        self.fill_rect(x, y + height - 1, width, 1, color);
        self.fill_rect(x, y, 1, height, color);
        self.fill_rect(x + width - 1, y, 1, height, color);
    }

    /// Copies `source` with its top-left corner at `(x, y)`.
    pub fn blit(&mut self, source: &ColorImage, x: u32, y: u32) {
        for sy in 0..source.height {
            for sx in 0..source.width {
                let (px, py) = (x + sx, y + sy);
                if px < self.width && py < self.height {
                    self.pixels[py as usize * self.width as usize + px as usize] =
                        source.pixels[sy as usize * source.width as usize + sx as usize];
                }
            }
        }
    }

    /// Flat RGBA bytes, row-major.
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flatten().copied().collect()
    }

    pub fn to_png(&self) -> Result<Vec<u8>, DecodeError> {
        let image = RgbaImage::from_raw(self.width, self.height, self.to_rgba_bytes()).ok_or(
            DecodeError::SampleCount {
                expected: self.width as usize * self.height as usize * 4,
                actual: self.pixels.len() * 4,
            },
        )?;
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    /// Green gradient shown in place of a layer that could not be loaded.
    pub fn placeholder(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let block_y = y - y % PLACEHOLDER_BLOCK;
            for x in 0..width {
                let block_x = x - x % PLACEHOLDER_BLOCK;
                let v = (block_x as f64 / width as f64) * 0.7 + (block_y as f64 / height as f64) * 0.3;
                let step = (v * 100.0).floor().clamp(0.0, 100.0);
                pixels.push(interpolate(PLACEHOLDER_DARK, PLACEHOLDER_LIGHT, step / 100.0).to_rgba());
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }
}

fn interpolate(from: Rgb, to: Rgb, t: f64) -> Rgb {
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round().clamp(0.0, 255.0) as u8;
    Rgb::new(lerp(from.r, to.r), lerp(from.g, to.g), lerp(from.b, to.b))
}

/// Maps every sample through the palette's lookup table; alpha is always opaque.
pub fn colorize(raster: &RasterImage, palette: PaletteName) -> ColorImage {
    let table = Palette::get(palette);
    let pixels = raster
        .channel()
        .iter()
        .map(|&sample| table.color(sample).to_rgba())
        .collect();
    ColorImage {
        width: raster.width(),
        height: raster.height(),
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_matches_input_dimensions_and_is_opaque() {
        let raster = RasterImage::from_fn(5, 3, |col, row| (col * 50 + row) as u8).unwrap();
        let image = colorize(&raster, PaletteName::Magma);
        assert_eq!((image.width(), image.height()), (5, 3));
        assert_eq!(image.pixels().len(), 15);
        assert!(image.pixels().iter().all(|px| px[3] == u8::MAX));
    }

    #[test]
    fn each_pixel_uses_the_palette_entry() {
        let raster = RasterImage::new(2, 1, vec![0, 128]).unwrap();
        let image = colorize(&raster, PaletteName::Viridis);
        assert_eq!(image.pixel(0, 0), Some([68, 1, 204, 255]));
        assert_eq!(image.pixel(1, 0), Some([118, 91, 144, 255]));
        assert_eq!(image.pixel(2, 0), None);
    }

    #[test]
    fn placeholder_is_blocky_and_deterministic() {
        let a = ColorImage::placeholder(64, 64);
        let b = ColorImage::placeholder(64, 64);
        assert_eq!(a, b);
        assert_eq!(a.pixel(0, 0), Some([30, 60, 30, 255]));
        assert_eq!(a.pixel(0, 0), a.pixel(31, 31));
        assert_ne!(a.pixel(0, 0), a.pixel(32, 0));
    }

    #[test]
    fn drawing_is_clipped_to_the_image() {
        let mut image = ColorImage::filled(4, 4, [0, 0, 0, 255]);
        image.fill_rect(2, 2, 10, 10, [9, 9, 9, 255]);
        assert_eq!(image.pixel(3, 3), Some([9, 9, 9, 255]));
        assert_eq!(image.pixel(1, 1), Some([0, 0, 0, 255]));
        image.stroke_rect(0, 0, 3, 3, [1, 2, 3, 255]);
        assert_eq!(image.pixel(0, 2), Some([1, 2, 3, 255]));
        assert_eq!(image.pixel(1, 1), Some([0, 0, 0, 255]));
    }

    #[test]
    fn png_export_has_png_signature() {
        let raster = RasterImage::new(1, 1, vec![200]).unwrap();
        let png = colorize(&raster, PaletteName::Viridis).to_png().unwrap();
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
    }
}
