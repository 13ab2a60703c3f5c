//! PNG and TIFF predictors for Flate and LZW streams.
//!
//! Predictors store differences between neighbouring samples; decoding adds
//! the neighbours back after decompression.

use crate::error::{Error, Result};
use crate::object::PdfDictionary;

/// Predictor parameters from a `DecodeParms` dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of samples per row
    pub columns: usize,
    /// Number of color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Read predictor entries, falling back to the defaults for missing ones.
    pub fn from_dict(dict: Option<&PdfDictionary>) -> Self {
        let Some(dict) = dict else {
            return Self::default();
        };
        let positive = |key: &str, default: i64| -> usize {
            dict.get_integer(key).filter(|v| *v > 0).unwrap_or(default) as usize
        };
        Self {
            predictor: dict.get_integer_or("Predictor", 1),
            columns: positive("Columns", 1),
            colors: positive("Colors", 1),
            bits_per_component: positive("BitsPerComponent", 8),
        }
    }

    /// Bytes of sample data per row (without the PNG tag byte).
    pub fn pixel_bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    /// Bytes per complete pixel, at least 1.
    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Reverse the predictor named in `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff_predictor(data, params),
        10..=15 => decode_png_predictor(data, params),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

/// TIFF Predictor 2 (8-bit components): each sample is the difference from
/// the same component of the pixel to its left.
fn decode_tiff_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(Error::Decode(format!(
            "TIFF predictor with {} bits per component is not supported",
            params.bits_per_component
        )));
    }
    let row_len = params.pixel_bytes_per_row();
    let colors = params.colors;
    let mut output = data.to_vec();
    for row in output.chunks_mut(row_len) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    Ok(output)
}

/// PNG predictors: every row starts with a tag byte selecting the filter.
fn decode_png_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let pixel_bytes = params.pixel_bytes_per_row();
    let row_len = pixel_bytes + 1;
    let bpp = params.bytes_per_pixel();

    let mut output = Vec::with_capacity(data.len() / row_len * pixel_bytes);
    let mut previous = vec![0u8; pixel_bytes];

    for row in data.chunks(row_len) {
        if row.len() < 2 {
            break;
        }
        let tag = row[0];
        let mut current = row[1..].to_vec();
        current.resize(pixel_bytes, 0);

        for i in 0..pixel_bytes {
            let left = if i >= bpp { current[i - bpp] } else { 0 };
            let up = previous[i];
            let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth_predictor(left, up, up_left),
                _ => {
                    return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", tag)));
                },
            };
            current[i] = current[i].wrapping_add(predicted);
        }

        output.extend_from_slice(&current);
        previous = current;
    }

    Ok(output)
}

/// Paeth predictor function from the PNG specification.
fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let (a16, b16, c16) = (a as i16, b as i16, c as i16);
    let p = a16 + b16 - c16;
    let pa = (p - a16).abs();
    let pb = (p - b16).abs();
    let pc = (p - c16).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;

    fn png(columns: usize) -> DecodeParams {
        DecodeParams {
            predictor: 12,
            columns,
            ..Default::default()
        }
    }

    #[test]
    fn test_from_dict_defaults() {
        let dict = PdfDictionary::new()
            .with("Predictor", 12)
            .with("Columns", 4)
            .with("Colors", Object::name("bad"));
        let params = DecodeParams::from_dict(Some(&dict));
        assert_eq!(params.predictor, 12);
        assert_eq!(params.columns, 4);
        assert_eq!(params.colors, 1);
        assert_eq!(DecodeParams::from_dict(None), DecodeParams::default());
    }

    #[test]
    fn test_png_up_predictor() {
        // Two rows of three bytes, both tagged "Up".
        let data = [2, 1, 2, 3, 2, 1, 1, 1];
        let out = decode_predictor(&data, &png(3)).unwrap();
        assert_eq!(out, vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn test_png_sub_predictor() {
        let data = [1, 5, 1, 1];
        let out = decode_predictor(&data, &png(3)).unwrap();
        assert_eq!(out, vec![5, 6, 7]);
    }

    #[test]
    fn test_png_invalid_tag() {
        assert!(decode_predictor(&[9, 0, 0, 0], &png(3)).is_err());
    }

    #[test]
    fn test_tiff_predictor() {
        let params = DecodeParams {
            predictor: 2,
            columns: 3,
            ..Default::default()
        };
        let out = decode_predictor(&[10, 1, 1], &params).unwrap();
        assert_eq!(out, vec![10, 11, 12]);
    }

    #[test]
    fn test_paeth() {
        assert_eq!(paeth_predictor(10, 20, 10), 20);
        assert_eq!(paeth_predictor(0, 0, 0), 0);
    }
}
