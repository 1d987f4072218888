//! Single-channel rasters and their numeric counterpart.
//!
//! `RasterImage` is the 8-bit form that travels over the wire and feeds the
//! colorizer. `LayerField` holds the same grid in physical units so that
//! server deltas can be applied without compounding quantisation error.

use std::io::Cursor;

use image::{GrayImage, ImageFormat};

use crate::error::DecodeError;
use crate::layer::ValueScale;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    channel: Vec<u8>,
}

impl RasterImage {
    pub fn new(width: u32, height: u32, channel: Vec<u8>) -> Result<Self, DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::EmptyRaster { width, height });
        }
        let expected = width as usize * height as usize;
        if channel.len() != expected {
            return Err(DecodeError::SampleCount {
                expected,
                actual: channel.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channel,
        })
    }

    /// Builds a raster from a per-pixel function, row-major.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut sample: impl FnMut(u32, u32) -> u8,
    ) -> Result<Self, DecodeError> {
        let mut channel = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height {
            for col in 0..width {
                channel.push(sample(col, row));
            }
        }
        Self::new(width, height, channel)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channel(&self) -> &[u8] {
        &self.channel
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn sample(&self, col: u32, row: u32) -> Option<u8> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.channel
            .get(row as usize * self.width as usize + col as usize)
            .copied()
    }

    pub fn to_png(&self) -> Result<Vec<u8>, DecodeError> {
        let image = GrayImage::from_raw(self.width, self.height, self.channel.clone()).ok_or(
            DecodeError::SampleCount {
                expected: self.width as usize * self.height as usize,
                actual: self.channel.len(),
            },
        )?;
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }
}

/// Decodes raster bytes in any format the image codecs understand.
/// Colour inputs are reduced to luma, so a grey PNG keeps its exact samples.
pub fn decode_raster(bytes: &[u8]) -> Result<RasterImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Codec("empty raster payload".to_string()));
    }
    let decoded = image::load_from_memory(bytes)?;
    let luma = decoded.to_luma8();
    let (width, height) = luma.dimensions();
    RasterImage::new(width, height, luma.into_raw())
}

/// A layer's samples in physical units.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerField {
    width: u32,
    height: u32,
    scale: ValueScale,
    values: Vec<f32>,
}

impl LayerField {
    pub fn from_raster(raster: &RasterImage, scale: ValueScale) -> Self {
        Self {
            width: raster.width,
            height: raster.height,
            scale,
            values: raster.channel.iter().map(|&b| scale.decode(b)).collect(),
        }
    }

    pub fn from_values(
        width: u32,
        height: u32,
        scale: ValueScale,
        values: Vec<f32>,
    ) -> Result<Self, DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::EmptyRaster { width, height });
        }
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(DecodeError::SampleCount {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            width,
            height,
            scale,
            values: values.into_iter().map(|v| scale.clamp(v)).collect(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn scale(&self) -> ValueScale {
        self.scale
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn value(&self, idx: usize) -> Option<f32> {
        self.values.get(idx).copied()
    }

    pub fn mean(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }

    /// Returns a new field with every `(idx, delta)` added and clamped to the scale.
    /// Deltas are validated as a batch first, so a bad index leaves nothing applied.
    pub fn with_deltas(&self, deltas: &[(usize, f32)]) -> Result<Self, DecodeError> {
        let cells = self.values.len();
        if let Some(&(idx, _)) = deltas.iter().find(|(idx, _)| *idx >= cells) {
            return Err(DecodeError::DeltaOutOfGrid { idx, cells });
        }
        let mut values = self.values.clone();
        for &(idx, delta) in deltas {
            values[idx] = self.scale.clamp(values[idx] + delta);
        }
        Ok(Self {
            width: self.width,
            height: self.height,
            scale: self.scale,
            values,
        })
    }

    pub fn to_raster(&self) -> RasterImage {
        RasterImage {
            width: self.width,
            height: self.height,
            channel: self.values.iter().map(|&v| self.scale.encode(v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> ValueScale {
        ValueScale::new(0.0, 1.0)
    }

    #[test]
    fn rejects_zero_sized_and_short_rasters() {
        assert_eq!(
            RasterImage::new(0, 4, Vec::new()),
            Err(DecodeError::EmptyRaster {
                width: 0,
                height: 4
            })
        );
        assert!(matches!(
            RasterImage::new(2, 2, vec![0; 3]),
            Err(DecodeError::SampleCount {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn png_bytes_decode_back_to_the_same_samples() {
        let raster = RasterImage::from_fn(7, 3, |col, row| (col * 30 + row) as u8).unwrap();
        let png = raster.to_png().unwrap();
        assert_eq!(decode_raster(&png).unwrap(), raster);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        assert!(matches!(
            decode_raster(b"not an image"),
            Err(DecodeError::Codec(_))
        ));
        assert!(matches!(decode_raster(&[]), Err(DecodeError::Codec(_))));
    }

    #[test]
    fn deltas_are_added_then_clamped() {
        let mut values = vec![0.0_f32; 100];
        values[22] = 0.40;
        values[23] = 0.98;
        let field = LayerField::from_values(10, 10, unit(), values).unwrap();

        let next = field.with_deltas(&[(22, 0.05), (23, 0.05)]).unwrap();
        assert!((next.value(22).unwrap() - 0.45).abs() < 1e-6);
        assert_eq!(next.value(23), Some(1.0));
        // the source field is untouched
        assert!((field.value(22).unwrap() - 0.40).abs() < 1e-6);
    }

    #[test]
    fn out_of_grid_delta_applies_nothing() {
        let field = LayerField::from_values(2, 2, unit(), vec![0.5; 4]).unwrap();
        let err = field.with_deltas(&[(0, 0.1), (4, 0.1)]).unwrap_err();
        assert_eq!(err, DecodeError::DeltaOutOfGrid { idx: 4, cells: 4 });
    }

    #[test]
    fn field_quantises_back_to_raster() {
        let raster = RasterImage::new(2, 1, vec![0, 255]).unwrap();
        let field = LayerField::from_raster(&raster, ValueScale::new(-3.0, 3.0));
        assert_eq!(field.values(), &[-3.0, 3.0]);
        assert_eq!(field.to_raster(), raster);
    }
}
